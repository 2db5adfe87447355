//! Bundle Simulator
//!
//! Dry-runs a bundle leg-by-leg against a single consistent chain-state
//! snapshot supplied by an external collaborator. Legs execute strictly in
//! order; a failing leg that is not marked revertible aborts the whole
//! simulation with success=false.
//!
//! Profit = beneficiary balance after the final leg − balance before the
//! first leg − gas cost at the simulated gas prices. Signed (I256): a
//! negative number is a loss, and the pipeline discards anything ≤ 0.

use alloy::primitives::{Address, U256, I256};
use anyhow::Result;
use async_trait::async_trait;
use std::sync::Arc;
use tracing::{debug, warn};

use crate::types::{Bundle, BundleLeg, LegOutcome, SimulationResult, StateChange};

/// Execution outcome of one leg inside a snapshot.
#[derive(Debug, Clone)]
pub struct LegExecution {
    pub success: bool,
    pub gas_used: u64,
    pub error: Option<String>,
}

/// Chain-state query collaborator. Also serves the standard gas price used
/// by the analyzer's anomaly check.
#[async_trait]
pub trait ChainStateClient: Send + Sync {
    /// Open a consistent snapshot at the given block.
    async fn open_snapshot(&self, block: u64) -> Result<Box<dyn StateSnapshot>>;

    /// Current network standard gas price.
    async fn standard_gas_price(&self) -> Result<U256>;
}

/// One consistent view of chain state. Mutating executes against the
/// snapshot only — never against the live chain.
#[async_trait]
pub trait StateSnapshot: Send {
    async fn execute(&mut self, leg: &BundleLeg) -> Result<LegExecution>;
    async fn balance(&self, address: Address) -> Result<U256>;
}

pub struct BundleSimulator {
    chain: Arc<dyn ChainStateClient>,
    /// Address whose balance delta defines bundle profit.
    beneficiary: Address,
}

impl BundleSimulator {
    pub fn new(chain: Arc<dyn ChainStateClient>, beneficiary: Address) -> Self {
        Self { chain, beneficiary }
    }

    /// Simulate every leg in order against one snapshot. Each call produces
    /// a new immutable result — re-priced bundles are simulated afresh.
    pub async fn simulate(&self, bundle: &Bundle) -> Result<SimulationResult> {
        let mut snapshot = self.chain.open_snapshot(bundle.target_block).await?;
        let balance_before = snapshot.balance(self.beneficiary).await?;

        let mut leg_outcomes = Vec::with_capacity(bundle.legs.len());
        let mut errors = Vec::new();
        let mut total_gas_used = 0u64;
        let mut gas_cost = U256::ZERO;
        let mut aborted = false;

        for leg in &bundle.legs {
            let leg_hash = leg.hash();
            let exec = snapshot.execute(leg).await?;
            total_gas_used += exec.gas_used;
            gas_cost += leg.gas_price * U256::from(exec.gas_used);

            if exec.success {
                leg_outcomes.push(LegOutcome {
                    leg_hash,
                    success: true,
                    gas_used: exec.gas_used,
                    reverted_tolerated: false,
                    error: None,
                });
                continue;
            }

            let tolerated = leg.may_revert || bundle.revertible.contains(&leg_hash);
            let error = exec
                .error
                .unwrap_or_else(|| "execution reverted".to_string());

            leg_outcomes.push(LegOutcome {
                leg_hash,
                success: false,
                gas_used: exec.gas_used,
                reverted_tolerated: tolerated,
                error: Some(error.clone()),
            });

            if tolerated {
                debug!("Leg {:?} reverted (tolerated, marked revertible)", leg_hash);
                continue;
            }

            warn!(
                "Bundle {:?}: leg {:?} reverted — aborting simulation: {}",
                bundle.id, leg_hash, error
            );
            errors.push(format!("leg {:?} reverted: {}", leg_hash, error));
            aborted = true;
            break;
        }

        if aborted {
            return Ok(SimulationResult {
                bundle_id: bundle.id,
                target_block: bundle.target_block,
                total_gas_used,
                success: false,
                profit: I256::ZERO,
                leg_outcomes,
                state_diff: Vec::new(),
                errors,
            });
        }

        let balance_after = snapshot.balance(self.beneficiary).await?;
        let profit = to_signed(balance_after) - to_signed(balance_before) - to_signed(gas_cost);

        debug!(
            "Bundle {:?} simulated: gas={}, profit={}",
            bundle.id, total_gas_used, profit
        );

        Ok(SimulationResult {
            bundle_id: bundle.id,
            target_block: bundle.target_block,
            total_gas_used,
            success: true,
            profit,
            leg_outcomes,
            state_diff: vec![StateChange {
                address: self.beneficiary,
                balance_before,
                balance_after,
            }],
            errors,
        })
    }
}

/// Balances fit comfortably in I256; saturate rather than panic on the
/// theoretical overflow.
fn to_signed(value: U256) -> I256 {
    I256::try_from(value).unwrap_or(I256::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bundle::builder::{BundleBuilder, BundleOptions};
    use alloy::primitives::Bytes;

    /// Scripted chain state: per-payload leg outcomes and a balance that
    /// jumps once all scripted legs have executed.
    struct MockChain {
        failing_payloads: Vec<Vec<u8>>,
        balance_before: U256,
        balance_after: U256,
    }

    struct MockSnapshot {
        failing_payloads: Vec<Vec<u8>>,
        balance_before: U256,
        balance_after: U256,
        executed: usize,
    }

    #[async_trait]
    impl ChainStateClient for MockChain {
        async fn open_snapshot(&self, _block: u64) -> Result<Box<dyn StateSnapshot>> {
            Ok(Box::new(MockSnapshot {
                failing_payloads: self.failing_payloads.clone(),
                balance_before: self.balance_before,
                balance_after: self.balance_after,
                executed: 0,
            }))
        }

        async fn standard_gas_price(&self) -> Result<U256> {
            Ok(U256::from(30u64))
        }
    }

    #[async_trait]
    impl StateSnapshot for MockSnapshot {
        async fn execute(&mut self, leg: &BundleLeg) -> Result<LegExecution> {
            self.executed += 1;
            let fails = self.failing_payloads.iter().any(|p| p[..] == leg.payload[..]);
            Ok(LegExecution {
                success: !fails,
                gas_used: 100_000,
                error: fails.then(|| "mock revert".to_string()),
            })
        }

        async fn balance(&self, _address: Address) -> Result<U256> {
            if self.executed == 0 {
                Ok(self.balance_before)
            } else {
                Ok(self.balance_after)
            }
        }
    }

    fn leg(payload: &[u8], gas_price: u64, may_revert: bool) -> BundleLeg {
        BundleLeg {
            payload: Bytes::copy_from_slice(payload),
            sender: Address::repeat_byte(1),
            nonce: 0,
            gas_price: U256::from(gas_price),
            gas_limit: 300_000,
            target: Address::repeat_byte(2),
            value: U256::ZERO,
            input: Bytes::new(),
            chain_id: 137,
            may_revert,
        }
    }

    fn bundle(legs: Vec<BundleLeg>) -> Bundle {
        BundleBuilder::build(legs, 100, BundleOptions::default()).unwrap()
    }

    #[tokio::test]
    async fn test_profitable_bundle() {
        let chain = Arc::new(MockChain {
            failing_payloads: vec![],
            balance_before: U256::from(1_000_000u64),
            // Gain of 700_000; gas cost = 3 legs × 100_000 gas × 1 wei
            balance_after: U256::from(1_700_000u64),
        });
        let simulator = BundleSimulator::new(chain, Address::repeat_byte(9));

        let b = bundle(vec![
            leg(b"draw", 1, false),
            leg(b"swap", 1, false),
            leg(b"repay", 1, false),
        ]);
        let result = simulator.simulate(&b).await.unwrap();

        assert!(result.success);
        assert_eq!(result.total_gas_used, 300_000);
        assert_eq!(result.profit, I256::try_from(400_000).unwrap());
        assert!(result.is_submittable());
        assert_eq!(result.leg_outcomes.len(), 3);
    }

    #[tokio::test]
    async fn test_middle_leg_revert_aborts() {
        let chain = Arc::new(MockChain {
            failing_payloads: vec![b"swap".to_vec()],
            balance_before: U256::from(1_000_000u64),
            balance_after: U256::from(2_000_000u64),
        });
        let simulator = BundleSimulator::new(chain, Address::repeat_byte(9));

        let b = bundle(vec![
            leg(b"draw", 1, false),
            leg(b"swap", 1, false),
            leg(b"repay", 1, false),
        ]);
        let result = simulator.simulate(&b).await.unwrap();

        assert!(!result.success);
        assert_eq!(result.profit, I256::ZERO);
        // Third leg never executed
        assert_eq!(result.leg_outcomes.len(), 2);
        assert!(!result.is_submittable());
        assert!(!result.errors.is_empty());
    }

    #[tokio::test]
    async fn test_revertible_leg_tolerated() {
        let chain = Arc::new(MockChain {
            failing_payloads: vec![b"bait".to_vec()],
            balance_before: U256::from(1_000_000u64),
            balance_after: U256::from(2_000_000u64),
        });
        let simulator = BundleSimulator::new(chain, Address::repeat_byte(9));

        let b = bundle(vec![
            leg(b"bait", 1, true),
            leg(b"core", 1, false),
        ]);
        let result = simulator.simulate(&b).await.unwrap();

        assert!(result.success);
        assert!(result.leg_outcomes[0].reverted_tolerated);
        assert!(result.leg_outcomes[1].success);
    }

    #[tokio::test]
    async fn test_unprofitable_bundle_not_submittable() {
        let chain = Arc::new(MockChain {
            failing_payloads: vec![],
            balance_before: U256::from(1_000_000u64),
            // Balance gain exactly equals gas cost → profit 0
            balance_after: U256::from(1_100_000u64),
        });
        let simulator = BundleSimulator::new(chain, Address::repeat_byte(9));

        let b = bundle(vec![leg(b"only", 1, false)]);
        let result = simulator.simulate(&b).await.unwrap();

        assert!(result.success);
        assert_eq!(result.profit, I256::ZERO);
        assert!(!result.is_submittable());
    }
}
