//! Protection Planner — threat records → prioritized protective actions
//!
//! Design:
//!     - Slippage multiplier: max over threats of
//!       {Critical→3.0, High→2.0, Medium→1.5, Low→1.2}, 1.0 with no threats
//!     - Adjusted slippage = base × multiplier, hard-capped at the configured
//!       maximum (default 300 bps) — never returned higher
//!     - Action ladder, priority ascending (1 = most urgent):
//!         1. RouteViaPrivateRelay on High/Critical (private routing enabled)
//!         1. AbortTransaction on High/Critical Sandwich (abort enabled;
//!            supersedes private routing — they coexist only when abort is off)
//!         2/3. AdjustSlippage with the computed multiplier
//!         4. DelayExecution when only Medium threats are present
//!         5. Residual AdjustSlippage ×1.1 when only Low threats matched
//!     - Output sorted by priority ascending, ties by insertion order

use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use tracing::debug;

use crate::config::ShieldConfig;
use crate::types::{ActionKind, ProtectionAction, ThreatRecord, ThreatSeverity, ThreatType};

/// Decision-cycle output: ordered actions + the severity-derived multiplier.
#[derive(Debug, Clone)]
pub struct ProtectionPlan {
    pub actions: Vec<ProtectionAction>,
    pub slippage_multiplier: Decimal,
}

impl ProtectionPlan {
    pub fn leading_action(&self) -> Option<&ProtectionAction> {
        self.actions.first()
    }

    pub fn should_abort(&self) -> bool {
        self.actions
            .iter()
            .any(|a| a.kind == ActionKind::AbortTransaction)
    }

    pub fn wants_private_routing(&self) -> bool {
        self.actions
            .iter()
            .any(|a| a.kind == ActionKind::RouteViaPrivateRelay)
    }

    pub fn delay_blocks(&self) -> Option<u64> {
        self.actions.iter().find_map(|a| match a.kind {
            ActionKind::DelayExecution { blocks } => Some(blocks),
            _ => None,
        })
    }
}

pub struct ProtectionPlanner {
    private_routing_enabled: bool,
    abort_on_sandwich: bool,
    delay_blocks: u64,
    max_slippage_bps: u32,
}

impl ProtectionPlanner {
    pub fn new(config: &ShieldConfig) -> Self {
        Self {
            private_routing_enabled: config.private_routing_enabled,
            abort_on_sandwich: config.abort_on_sandwich,
            delay_blocks: config.delay_blocks,
            max_slippage_bps: config.max_slippage_bps,
        }
    }

    /// Map threats to a prioritized action list and slippage multiplier.
    pub fn plan(&self, threats: &[ThreatRecord]) -> ProtectionPlan {
        let multiplier = slippage_multiplier(threats);

        let has_high = threats
            .iter()
            .any(|t| t.severity >= ThreatSeverity::High);
        let has_medium = threats
            .iter()
            .any(|t| t.severity == ThreatSeverity::Medium);
        let sandwich_high = threats.iter().any(|t| {
            t.threat_type == ThreatType::Sandwich && t.severity >= ThreatSeverity::High
        });

        let abort = sandwich_high && self.abort_on_sandwich;
        let mut actions = Vec::new();

        if has_high && self.private_routing_enabled && !abort {
            actions.push(ProtectionAction {
                kind: ActionKind::RouteViaPrivateRelay,
                priority: 1,
            });
        }

        if has_high || has_medium {
            actions.push(ProtectionAction {
                kind: ActionKind::AdjustSlippage { multiplier },
                priority: if has_high { 2 } else { 3 },
            });
        }

        if abort {
            actions.push(ProtectionAction {
                kind: ActionKind::AbortTransaction,
                priority: 1,
            });
        }

        if has_medium && !has_high {
            actions.push(ProtectionAction {
                kind: ActionKind::DelayExecution {
                    blocks: self.delay_blocks,
                },
                priority: 4,
            });
        }

        // Residual: threats exist but nothing above matched (Low only)
        if actions.is_empty() && !threats.is_empty() {
            actions.push(ProtectionAction {
                kind: ActionKind::AdjustSlippage {
                    multiplier: Decimal::new(11, 1), // 1.1
                },
                priority: 5,
            });
        }

        // Stable: ties keep insertion order
        actions.sort_by_key(|a| a.priority);

        debug!(
            "Protection plan: {} actions, multiplier {}",
            actions.len(),
            multiplier
        );

        ProtectionPlan {
            actions,
            slippage_multiplier: multiplier,
        }
    }

    /// Final adjusted slippage in basis points: base × multiplier, capped.
    pub fn adjusted_slippage_bps(&self, base_bps: u32, plan: &ProtectionPlan) -> u32 {
        let adjusted = Decimal::from(base_bps) * plan.slippage_multiplier;
        let adjusted = adjusted.round().to_u32().unwrap_or(u32::MAX);
        adjusted.min(self.max_slippage_bps)
    }
}

/// Severity → multiplier table; max over all threats, 1.0 when none.
pub fn slippage_multiplier(threats: &[ThreatRecord]) -> Decimal {
    threats
        .iter()
        .map(|t| match t.severity {
            ThreatSeverity::Critical => Decimal::new(30, 1), // 3.0
            ThreatSeverity::High => Decimal::new(20, 1),     // 2.0
            ThreatSeverity::Medium => Decimal::new(15, 1),   // 1.5
            ThreatSeverity::Low => Decimal::new(12, 1),      // 1.2
        })
        .max()
        .unwrap_or(Decimal::ONE)
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy::primitives::TxHash;
    use chrono::Utc;
    use rust_decimal_macros::dec;

    use crate::types::ThreatDetail;

    fn threat(threat_type: ThreatType, severity: ThreatSeverity) -> ThreatRecord {
        ThreatRecord {
            id: 1,
            threat_type,
            severity,
            confidence: 0.8,
            detected_at: Utc::now(),
            offending_tx: TxHash::ZERO,
            detail: ThreatDetail::PatternMatch {
                pattern_name: "test".to_string(),
                matched_hash: TxHash::ZERO,
            },
            extra: Default::default(),
            post_hoc: false,
        }
    }

    fn planner() -> ProtectionPlanner {
        ProtectionPlanner::new(&ShieldConfig::default())
    }

    #[test]
    fn test_multiplier_monotonic_in_severity() {
        assert_eq!(slippage_multiplier(&[]), dec!(1.0));
        assert_eq!(
            slippage_multiplier(&[threat(ThreatType::Frontrun, ThreatSeverity::Low)]),
            dec!(1.2)
        );
        assert_eq!(
            slippage_multiplier(&[threat(ThreatType::Frontrun, ThreatSeverity::Medium)]),
            dec!(1.5)
        );
        assert_eq!(
            slippage_multiplier(&[threat(ThreatType::Sandwich, ThreatSeverity::High)]),
            dec!(2.0)
        );
        assert_eq!(
            slippage_multiplier(&[threat(ThreatType::Sandwich, ThreatSeverity::Critical)]),
            dec!(3.0)
        );
        // Max over mixed severities
        assert_eq!(
            slippage_multiplier(&[
                threat(ThreatType::Frontrun, ThreatSeverity::Low),
                threat(ThreatType::Sandwich, ThreatSeverity::High),
            ]),
            dec!(2.0)
        );
    }

    #[test]
    fn test_no_threats_no_actions() {
        let plan = planner().plan(&[]);
        assert!(plan.actions.is_empty());
        assert_eq!(plan.slippage_multiplier, dec!(1.0));
    }

    #[test]
    fn test_high_threat_leads_with_private_routing() {
        let plan = planner().plan(&[threat(ThreatType::Sandwich, ThreatSeverity::High)]);
        assert_eq!(
            plan.leading_action().unwrap().kind,
            ActionKind::RouteViaPrivateRelay
        );
        assert_eq!(plan.leading_action().unwrap().priority, 1);
        assert_eq!(plan.slippage_multiplier, dec!(2.0));
        // AdjustSlippage follows at priority 2
        assert_eq!(plan.actions[1].priority, 2);
        assert!(matches!(
            plan.actions[1].kind,
            ActionKind::AdjustSlippage { .. }
        ));
    }

    #[test]
    fn test_abort_supersedes_private_routing() {
        let config = ShieldConfig {
            abort_on_sandwich: true,
            ..Default::default()
        };
        let plan = ProtectionPlanner::new(&config)
            .plan(&[threat(ThreatType::Sandwich, ThreatSeverity::High)]);
        assert!(plan.should_abort());
        assert!(!plan.wants_private_routing());
        assert_eq!(plan.leading_action().unwrap().priority, 1);
    }

    #[test]
    fn test_abort_not_triggered_by_frontrun() {
        let config = ShieldConfig {
            abort_on_sandwich: true,
            ..Default::default()
        };
        let plan = ProtectionPlanner::new(&config)
            .plan(&[threat(ThreatType::Frontrun, ThreatSeverity::High)]);
        assert!(!plan.should_abort());
        assert!(plan.wants_private_routing());
    }

    #[test]
    fn test_medium_only_delays_execution() {
        let plan = planner().plan(&[threat(ThreatType::Frontrun, ThreatSeverity::Medium)]);
        assert!(!plan.wants_private_routing());
        assert_eq!(plan.delay_blocks(), Some(2));
        // AdjustSlippage at priority 3, delay at 4
        assert_eq!(plan.actions[0].priority, 3);
        assert_eq!(plan.actions[1].priority, 4);
    }

    #[test]
    fn test_low_only_residual_adjustment() {
        let plan = planner().plan(&[threat(ThreatType::ArbitrageContention, ThreatSeverity::Low)]);
        assert_eq!(plan.actions.len(), 1);
        assert_eq!(plan.actions[0].priority, 5);
        assert_eq!(
            plan.actions[0].kind,
            ActionKind::AdjustSlippage {
                multiplier: dec!(1.1)
            }
        );
        // Returned multiplier still follows the severity table
        assert_eq!(plan.slippage_multiplier, dec!(1.2));
    }

    #[test]
    fn test_adjusted_slippage_capped() {
        let p = planner();
        let plan = p.plan(&[threat(ThreatType::Sandwich, ThreatSeverity::Critical)]);
        // 50 bps × 3.0 = 150 bps, under the 300 cap
        assert_eq!(p.adjusted_slippage_bps(50, &plan), 150);
        // 200 bps × 3.0 = 600 bps, capped at 300
        assert_eq!(p.adjusted_slippage_bps(200, &plan), 300);
    }
}
