//! Bundle Builder
//!
//! Assembles an ordered sequence of pre-signed legs into an immutable
//! Bundle. The core never holds private keys — legs arrive signed from the
//! external signing collaborator.
//!
//! Identity hash = keccak256 over the concatenation of leg hashes in order.
//! Determinism is a correctness requirement: idempotent replacement and
//! cancellation key off this hash, so rebuilding from the same ordered legs
//! must yield the same identity.

use alloy::primitives::{keccak256, TxHash, B256};
use anyhow::{bail, Result};
use std::collections::HashSet;
use tracing::debug;

use crate::types::{Bundle, BundleLeg};

/// Optional bundle parameters.
#[derive(Debug, Clone, Default)]
pub struct BundleOptions {
    /// Leg hashes allowed to revert without failing the whole bundle
    /// (adversary-bait legs — never the arbitrage core legs).
    pub revertible: HashSet<TxHash>,
    pub min_timestamp: Option<u64>,
    pub max_timestamp: Option<u64>,
}

pub struct BundleBuilder;

impl BundleBuilder {
    /// Assemble legs into a bundle targeting `target_block`.
    pub fn build(legs: Vec<BundleLeg>, target_block: u64, options: BundleOptions) -> Result<Bundle> {
        if legs.is_empty() {
            bail!("Bundle must contain at least one leg");
        }

        let leg_hashes: Vec<TxHash> = legs.iter().map(|leg| leg.hash()).collect();
        for revertible in &options.revertible {
            if !leg_hashes.contains(revertible) {
                bail!("Revertible hash {:?} is not a leg of this bundle", revertible);
            }
        }

        let id = identity_hash(&leg_hashes);
        debug!(
            "Built bundle {:?}: {} legs, target block {}",
            id,
            legs.len(),
            target_block
        );

        Ok(Bundle {
            id,
            legs,
            target_block,
            min_timestamp: options.min_timestamp,
            max_timestamp: options.max_timestamp,
            revertible: options.revertible,
            replaces: None,
        })
    }

    /// Re-priced replacement: a new bundle referencing the superseded
    /// identity. The original is never mutated.
    pub fn build_replacement(
        legs: Vec<BundleLeg>,
        target_block: u64,
        options: BundleOptions,
        replaces: &Bundle,
    ) -> Result<Bundle> {
        let mut bundle = Self::build(legs, target_block, options)?;
        bundle.replaces = Some(replaces.id);
        Ok(bundle)
    }
}

/// Deterministic identity over the ordered leg hashes.
fn identity_hash(leg_hashes: &[TxHash]) -> B256 {
    let mut buf = Vec::with_capacity(leg_hashes.len() * 32);
    for hash in leg_hashes {
        buf.extend_from_slice(hash.as_slice());
    }
    keccak256(&buf)
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy::primitives::{Address, Bytes, U256};

    fn leg(payload: &[u8], may_revert: bool) -> BundleLeg {
        BundleLeg {
            payload: Bytes::copy_from_slice(payload),
            sender: Address::repeat_byte(1),
            nonce: 0,
            gas_price: U256::from(30_000_000_000u64),
            gas_limit: 300_000,
            target: Address::repeat_byte(2),
            value: U256::ZERO,
            input: Bytes::new(),
            chain_id: 137,
            may_revert,
        }
    }

    #[test]
    fn test_build_deterministic() {
        let legs = vec![leg(b"draw", false), leg(b"swap", false), leg(b"repay", false)];
        let a = BundleBuilder::build(legs.clone(), 100, BundleOptions::default()).unwrap();
        let b = BundleBuilder::build(legs, 100, BundleOptions::default()).unwrap();
        assert_eq!(a.id, b.id);
    }

    #[test]
    fn test_leg_order_changes_identity() {
        let ordered = vec![leg(b"draw", false), leg(b"swap", false)];
        let reversed = vec![leg(b"swap", false), leg(b"draw", false)];
        let a = BundleBuilder::build(ordered, 100, BundleOptions::default()).unwrap();
        let b = BundleBuilder::build(reversed, 100, BundleOptions::default()).unwrap();
        assert_ne!(a.id, b.id);
    }

    #[test]
    fn test_empty_bundle_rejected() {
        assert!(BundleBuilder::build(vec![], 100, BundleOptions::default()).is_err());
    }

    #[test]
    fn test_revertible_must_reference_a_leg() {
        let bait = leg(b"bait", true);
        let bait_hash = bait.hash();
        let legs = vec![bait, leg(b"core", false)];

        let mut options = BundleOptions::default();
        options.revertible.insert(bait_hash);
        let bundle = BundleBuilder::build(legs.clone(), 100, options).unwrap();
        assert!(bundle.revertible.contains(&bait_hash));

        let mut bad = BundleOptions::default();
        bad.revertible.insert(TxHash::repeat_byte(0xff));
        assert!(BundleBuilder::build(legs, 100, bad).is_err());
    }

    #[test]
    fn test_replacement_references_original() {
        let original =
            BundleBuilder::build(vec![leg(b"v1", false)], 100, BundleOptions::default()).unwrap();
        let replacement = BundleBuilder::build_replacement(
            vec![leg(b"v2", false)],
            101,
            BundleOptions::default(),
            &original,
        )
        .unwrap();
        assert_eq!(replacement.replaces, Some(original.id));
        assert_ne!(replacement.id, original.id);
    }
}
