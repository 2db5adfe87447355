//! Pattern Library — declarative catalogue of known adversarial signatures
//!
//! Patterns are address-prefix heuristics and function-selector families
//! observed in prior MEV activity. Matching is advisory: a hit produces a
//! ThreatRecord with fixed confidence 0.6; severity and type come from the
//! pattern itself.
//!
//! The post-hoc mined-sandwich path appends attacker address prefixes here
//! (tuning only — the live detection path never depends on it having run).

use alloy::primitives::Address;
use once_cell::sync::Lazy;
use std::sync::RwLock;
use tracing::debug;

use crate::types::{CandidateTransaction, ThreatSeverity, ThreatType};

/// Confidence assigned to every pattern-library match.
pub const PATTERN_MATCH_CONFIDENCE: f64 = 0.6;

/// What a pattern matches on.
#[derive(Debug, Clone, PartialEq)]
pub enum PatternKind {
    /// Leading bytes of a sender address (vanity prefixes, known bot ranges).
    AddressPrefix(Vec<u8>),
    /// A family of function selectors used together by one adversary class.
    SelectorFamily(Vec<[u8; 4]>),
}

/// One catalogued adversary signature.
#[derive(Debug, Clone)]
pub struct AdversaryPattern {
    pub name: String,
    pub kind: PatternKind,
    pub threat_type: ThreatType,
    pub severity: ThreatSeverity,
}

impl AdversaryPattern {
    /// Does this pattern match the given transaction?
    pub fn matches(&self, tx: &CandidateTransaction) -> bool {
        match &self.kind {
            PatternKind::AddressPrefix(prefix) => {
                !prefix.is_empty() && tx.from.as_slice().starts_with(prefix)
            }
            PatternKind::SelectorFamily(selectors) => match tx.selector() {
                Some(sel) => selectors.contains(&sel),
                None => false,
            },
        }
    }
}

/// Built-in signatures. Selector families cover the common public router
/// entry points adversary bots race on; address prefixes cover known
/// vanity-address bot ranges.
static BUILTIN_PATTERNS: Lazy<Vec<AdversaryPattern>> = Lazy::new(|| {
    vec![
        AdversaryPattern {
            name: "v2-router-swap-family".to_string(),
            kind: PatternKind::SelectorFamily(vec![
                [0x38, 0xed, 0x17, 0x39], // swapExactTokensForTokens
                [0x7f, 0xf3, 0x6a, 0xb5], // swapExactETHForTokens
                [0x18, 0xcb, 0xaf, 0xe5], // swapExactTokensForETH
            ]),
            threat_type: ThreatType::ArbitrageContention,
            severity: ThreatSeverity::Low,
        },
        AdversaryPattern {
            name: "liquidation-call-family".to_string(),
            kind: PatternKind::SelectorFamily(vec![
                [0x00, 0xa7, 0x18, 0xa9], // liquidationCall (Aave V2)
                [0xe8, 0xed, 0xa9, 0xdf], // liquidationCall (Aave V3 pool)
            ]),
            threat_type: ThreatType::Liquidation,
            severity: ThreatSeverity::Medium,
        },
        AdversaryPattern {
            name: "vanity-bot-0x0000".to_string(),
            kind: PatternKind::AddressPrefix(vec![0x00, 0x00]),
            threat_type: ThreatType::Frontrun,
            severity: ThreatSeverity::Medium,
        },
    ]
});

/// Catalogue of adversary signatures. Constructed once at host startup and
/// shared read-mostly; additions (the tuning path) take the single writer
/// lock briefly.
#[derive(Debug)]
pub struct PatternLibrary {
    patterns: RwLock<Vec<AdversaryPattern>>,
}

impl PatternLibrary {
    /// Library seeded with the built-in catalogue.
    pub fn builtin() -> Self {
        Self {
            patterns: RwLock::new(BUILTIN_PATTERNS.clone()),
        }
    }

    /// Empty library (tests, or hosts that seed their own catalogue).
    pub fn empty() -> Self {
        Self {
            patterns: RwLock::new(Vec::new()),
        }
    }

    /// Append a pattern (post-hoc tuning path). Duplicate names are skipped
    /// so repeated sightings of one attacker don't grow the catalogue.
    pub fn add_pattern(&self, pattern: AdversaryPattern) {
        let mut patterns = match self.patterns.write() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        if patterns.iter().any(|p| p.name == pattern.name) {
            return;
        }
        debug!("Pattern library: added '{}'", pattern.name);
        patterns.push(pattern);
    }

    /// Convenience for the post-hoc sandwich path: catalogue an observed
    /// attacker by address prefix.
    pub fn add_attacker_prefix(&self, attacker: Address, prefix_len: usize) {
        let prefix = attacker.as_slice()[..prefix_len.min(20)].to_vec();
        self.add_pattern(AdversaryPattern {
            name: format!("observed-sandwich-{:x}", attacker),
            kind: PatternKind::AddressPrefix(prefix),
            threat_type: ThreatType::Sandwich,
            severity: ThreatSeverity::High,
        });
    }

    /// All patterns matching a transaction.
    pub fn matches_for(&self, tx: &CandidateTransaction) -> Vec<AdversaryPattern> {
        let patterns = match self.patterns.read() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        patterns.iter().filter(|p| p.matches(tx)).cloned().collect()
    }

    pub fn len(&self) -> usize {
        match self.patterns.read() {
            Ok(guard) => guard.len(),
            Err(poisoned) => poisoned.into_inner().len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy::primitives::{Bytes, U256};

    fn tx(from: Address, input: &[u8]) -> CandidateTransaction {
        CandidateTransaction {
            from,
            to: Address::repeat_byte(0xbb),
            value: U256::ZERO,
            gas_price: U256::from(50u64),
            gas_limit: 21_000,
            input: Bytes::copy_from_slice(input),
            hash: None,
        }
    }

    #[test]
    fn test_selector_family_match() {
        let lib = PatternLibrary::builtin();
        let swap = tx(Address::repeat_byte(5), &[0x38, 0xed, 0x17, 0x39, 0x00]);
        let hits = lib.matches_for(&swap);
        assert!(hits.iter().any(|p| p.name == "v2-router-swap-family"));
    }

    #[test]
    fn test_address_prefix_match() {
        let lib = PatternLibrary::empty();
        lib.add_pattern(AdversaryPattern {
            name: "test-prefix".to_string(),
            kind: PatternKind::AddressPrefix(vec![0xde, 0xad]),
            threat_type: ThreatType::Frontrun,
            severity: ThreatSeverity::High,
        });

        let mut addr_bytes = [0u8; 20];
        addr_bytes[0] = 0xde;
        addr_bytes[1] = 0xad;
        let hit = tx(Address::from(addr_bytes), &[]);
        let miss = tx(Address::repeat_byte(0x11), &[]);

        assert_eq!(lib.matches_for(&hit).len(), 1);
        assert!(lib.matches_for(&miss).is_empty());
    }

    #[test]
    fn test_add_pattern_deduplicates() {
        let lib = PatternLibrary::empty();
        let attacker = Address::repeat_byte(0xcc);
        lib.add_attacker_prefix(attacker, 4);
        lib.add_attacker_prefix(attacker, 4);
        assert_eq!(lib.len(), 1);
    }
}
