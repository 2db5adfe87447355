// Core data structures for the MEV protection pipeline.
// Value and gas quantities are U256 (profit I256) — never floats.

use alloy::primitives::{keccak256, Address, Bytes, TxHash, B256, I256, U256};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::fmt;

/// A not-yet-confirmed transaction observed from the pending feed.
/// Immutable once observed.
#[derive(Debug, Clone)]
pub struct CandidateTransaction {
    pub from: Address,
    pub to: Address,
    pub value: U256,
    pub gas_price: U256,
    pub gas_limit: u64,
    pub input: Bytes,
    /// Hash as reported by the feed. May be absent for locally built candidates.
    pub hash: Option<TxHash>,
}

impl CandidateTransaction {
    /// First 4 bytes of calldata, if any.
    pub fn selector(&self) -> Option<[u8; 4]> {
        if self.input.len() < 4 {
            return None;
        }
        let mut sel = [0u8; 4];
        sel.copy_from_slice(&self.input[..4]);
        Some(sel)
    }

    /// Reported hash, or a deterministic hash over the observable fields
    /// when the feed did not supply one.
    pub fn effective_hash(&self) -> TxHash {
        if let Some(h) = self.hash {
            return h;
        }
        let mut buf = Vec::with_capacity(20 + 20 + 32 + 32 + 8 + self.input.len());
        buf.extend_from_slice(self.from.as_slice());
        buf.extend_from_slice(self.to.as_slice());
        buf.extend_from_slice(&self.value.to_be_bytes::<32>());
        buf.extend_from_slice(&self.gas_price.to_be_bytes::<32>());
        buf.extend_from_slice(&self.gas_limit.to_be_bytes());
        buf.extend_from_slice(&self.input);
        keccak256(&buf)
    }
}

/// Adversarial pattern classes we detect
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ThreatType {
    Sandwich,
    Frontrun,
    Backrun,
    ArbitrageContention,
    Liquidation,
}

impl fmt::Display for ThreatType {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            ThreatType::Sandwich => write!(f, "Sandwich"),
            ThreatType::Frontrun => write!(f, "Frontrun"),
            ThreatType::Backrun => write!(f, "Backrun"),
            ThreatType::ArbitrageContention => write!(f, "ArbitrageContention"),
            ThreatType::Liquidation => write!(f, "Liquidation"),
        }
    }
}

/// Per-record severity. Ord: Low < Medium < High < Critical.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum ThreatSeverity {
    Low,
    Medium,
    High,
    Critical,
}

/// Aggregate threat level for a whole analysis pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ThreatLevel {
    None,
    Low,
    Medium,
    High,
    Critical,
}

/// Typed per-threat metadata. Each variant carries only the fields that
/// threat type needs; free-form audit data goes in ThreatRecord::extra.
#[derive(Debug, Clone)]
pub enum ThreatDetail {
    Sandwich {
        attacker: Address,
        front_hash: TxHash,
        back_hash: TxHash,
    },
    Frontrun {
        selector: [u8; 4],
        competing_hash: TxHash,
        competing_gas_price: U256,
    },
    GasAnomaly {
        candidate_gas_price: U256,
        standard_gas_price: U256,
    },
    PatternMatch {
        pattern_name: String,
        matched_hash: TxHash,
    },
}

/// A single detected threat. References the offending pending transaction
/// by hash — the record never owns store state.
#[derive(Debug, Clone)]
pub struct ThreatRecord {
    pub id: u64,
    pub threat_type: ThreatType,
    pub severity: ThreatSeverity,
    /// 0.0–1.0
    pub confidence: f64,
    pub detected_at: DateTime<Utc>,
    pub offending_tx: TxHash,
    pub detail: ThreatDetail,
    /// Free-form key/value side-table, audit only.
    pub extra: HashMap<String, String>,
    /// True for already-mined sandwich detections (pattern tuning path).
    pub post_hoc: bool,
}

/// Output of one analysis pass.
#[derive(Debug, Clone)]
pub struct ThreatReport {
    pub level: ThreatLevel,
    pub threats: Vec<ThreatRecord>,
    /// True when the analyzer hit its time budget or failed internally and
    /// fell back to the conservative Medium default.
    pub degraded: bool,
}

impl ThreatReport {
    /// Report for a pass that never ran: no detections, not degraded.
    pub fn empty() -> Self {
        Self {
            level: ThreatLevel::None,
            threats: Vec::new(),
            degraded: false,
        }
    }

    /// Conservative fallback used when analysis cannot complete: callers must
    /// not block the critical path on analysis failure.
    pub fn degraded() -> Self {
        Self {
            level: ThreatLevel::Medium,
            threats: Vec::new(),
            degraded: true,
        }
    }

    pub fn has_severity_at_least(&self, min: ThreatSeverity) -> bool {
        self.threats.iter().any(|t| t.severity >= min)
    }
}

/// Protective action kinds with their parameters.
#[derive(Debug, Clone, PartialEq)]
pub enum ActionKind {
    AdjustSlippage { multiplier: Decimal },
    DelayExecution { blocks: u64 },
    RouteViaPrivateRelay,
    AbortTransaction,
    UseAlternativeRoute { reason: String },
}

/// A protective action. Lower priority = more urgent.
/// Derived per decision cycle, never persisted.
#[derive(Debug, Clone, PartialEq)]
pub struct ProtectionAction {
    pub kind: ActionKind,
    pub priority: u8,
}

/// One signed transaction inside a bundle.
#[derive(Debug, Clone)]
pub struct BundleLeg {
    /// Raw signed transaction bytes, produced by the external signer.
    pub payload: Bytes,
    pub sender: Address,
    pub nonce: u64,
    pub gas_price: U256,
    pub gas_limit: u64,
    pub target: Address,
    pub value: U256,
    pub input: Bytes,
    pub chain_id: u64,
    /// True when this leg is allowed to revert without failing the bundle.
    pub may_revert: bool,
}

impl BundleLeg {
    /// Leg hash = keccak256 of the signed payload.
    pub fn hash(&self) -> TxHash {
        keccak256(&self.payload)
    }
}

/// An atomic, ordered set of signed legs. Immutable after creation;
/// re-pricing builds a new Bundle carrying a `replaces` reference.
#[derive(Debug, Clone)]
pub struct Bundle {
    /// Identity hash: deterministic over the ordered leg hashes.
    pub id: B256,
    pub legs: Vec<BundleLeg>,
    pub target_block: u64,
    pub min_timestamp: Option<u64>,
    pub max_timestamp: Option<u64>,
    /// Leg hashes allowed to revert without failing the whole bundle.
    pub revertible: HashSet<TxHash>,
    pub replaces: Option<B256>,
}

impl Bundle {
    pub fn leg_hashes(&self) -> Vec<TxHash> {
        self.legs.iter().map(|leg| leg.hash()).collect()
    }
}

/// Per-leg outcome from a dry run.
#[derive(Debug, Clone)]
pub struct LegOutcome {
    pub leg_hash: TxHash,
    pub success: bool,
    pub gas_used: u64,
    /// Revert tolerated because the leg was marked revertible.
    pub reverted_tolerated: bool,
    pub error: Option<String>,
}

/// Beneficiary-visible balance movement, part of the state-diff summary.
#[derive(Debug, Clone)]
pub struct StateChange {
    pub address: Address,
    pub balance_before: U256,
    pub balance_after: U256,
}

/// One immutable simulation attempt. A bundle may be simulated multiple
/// times (e.g., after re-pricing) — each attempt is a new record.
#[derive(Debug, Clone)]
pub struct SimulationResult {
    pub bundle_id: B256,
    pub target_block: u64,
    pub total_gas_used: u64,
    pub success: bool,
    /// May be negative: balance delta minus gas cost at the simulated price.
    pub profit: I256,
    pub leg_outcomes: Vec<LegOutcome>,
    pub state_diff: Vec<StateChange>,
    pub errors: Vec<String>,
}

impl SimulationResult {
    /// The pipeline-level gate: only successful, strictly profitable bundles
    /// may reach the submitter.
    pub fn is_submittable(&self) -> bool {
        self.success && self.profit > I256::ZERO
    }
}

/// A private distribution endpoint with its rolling quality stats.
/// Mutated only by the submission feedback loop.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RelayProfile {
    pub name: String,
    pub endpoint: String,
    /// Relay-specific signed request header, treated as opaque.
    #[serde(default)]
    pub auth_header: Option<String>,
    /// 0–100
    pub reputation: f64,
    /// 0.0–1.0, exponential moving average
    pub success_rate: f64,
    /// Rolling average latency in milliseconds
    pub avg_latency_ms: f64,
    #[serde(default)]
    pub capabilities: Vec<String>,
    #[serde(default = "default_active")]
    pub active: bool,
}

fn default_active() -> bool {
    true
}

impl RelayProfile {
    /// Selection score: reputation × success rate, both normalized.
    pub fn score(&self) -> f64 {
        (self.reputation / 100.0) * self.success_rate
    }
}

/// One submission attempt against one relay.
#[derive(Debug, Clone)]
pub struct SubmissionOutcome {
    pub bundle_id: B256,
    pub relay: String,
    pub accepted: bool,
    pub error: Option<String>,
    pub latency_ms: u64,
}

/// Result of fanning a bundle out to the selected relay set.
#[derive(Debug, Clone)]
pub struct SubmissionReport {
    pub bundle_id: B256,
    /// Quorum of 1: at least one accepting relay means the bundle is live.
    pub accepted: bool,
    pub outcomes: Vec<SubmissionOutcome>,
}

/// Inclusion-monitoring state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InclusionState {
    Pending,
    PartiallyIncluded,
    FullyIncluded,
    Expired,
}

impl fmt::Display for InclusionState {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            InclusionState::Pending => write!(f, "Pending"),
            InclusionState::PartiallyIncluded => write!(f, "PartiallyIncluded"),
            InclusionState::FullyIncluded => write!(f, "FullyIncluded"),
            InclusionState::Expired => write!(f, "Expired"),
        }
    }
}

/// Snapshot of inclusion progress for a submitted bundle.
#[derive(Debug, Clone)]
pub struct InclusionStatus {
    pub bundle_id: B256,
    pub state: InclusionState,
    pub blocks_observed: u64,
    pub legs_included: Vec<TxHash>,
}

/// New block header + transaction hash list, as delivered by the block feed.
#[derive(Debug, Clone)]
pub struct BlockInfo {
    pub number: u64,
    pub timestamp: u64,
    pub tx_hashes: Vec<TxHash>,
}
