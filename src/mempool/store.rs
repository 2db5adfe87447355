//! Pending Transaction Store
//!
//! Bounded, time-indexed store of observed not-yet-confirmed transactions.
//! Thread-safe via DashMap; every mutation is a short, bounded operation
//! (insert, evict, mark) — callers never wait on external I/O here.
//!
//! Eviction runs on a fixed interval (host loop) and opportunistically
//! before each analysis pass. Entries also leave the store when their hash
//! shows up in a confirmed block.

use alloy::primitives::{Address, TxHash};
use dashmap::DashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::debug;

use crate::types::CandidateTransaction;

/// A stored observation. Owned exclusively by the store.
#[derive(Debug, Clone)]
pub struct PendingTxRecord {
    pub tx: CandidateTransaction,
    /// Monotonic observation stamp.
    pub observed_at: Instant,
    /// Tie-break for equal Instants (coarse clocks); strictly increasing.
    pub seq: u64,
    pub analyzed: bool,
}

/// Thread-safe pending transaction store.
///
/// Clone shares the underlying map: cheap handles for concurrent readers,
/// serialized per-entry mutation inside DashMap shards.
#[derive(Debug)]
pub struct PendingTxStore {
    entries: Arc<DashMap<TxHash, PendingTxRecord>>,
    seq: Arc<AtomicU64>,
    ttl: Duration,
}

impl PendingTxStore {
    pub fn new(ttl: Duration) -> Self {
        Self {
            entries: Arc::new(DashMap::new()),
            seq: Arc::new(AtomicU64::new(0)),
            ttl,
        }
    }

    /// Insert a newly observed transaction, keyed by hash. Idempotent:
    /// re-recording a known hash keeps the original observation stamp so
    /// analysis ordering never shifts under at-least-once delivery.
    pub fn record(&self, tx: CandidateTransaction) {
        let hash = tx.effective_hash();
        if self.entries.contains_key(&hash) {
            return;
        }
        let record = PendingTxRecord {
            tx,
            observed_at: Instant::now(),
            seq: self.seq.fetch_add(1, Ordering::Relaxed),
            analyzed: false,
        };
        debug!("Pending store: recorded {:?} (seq {})", hash, record.seq);
        self.entries.insert(hash, record);
    }

    /// All pending transactions sharing `destination`, observed within
    /// `window`. Deterministic order: earliest first, ties broken by
    /// sequence then hash lexical order.
    pub fn recent_to(&self, destination: Address, window: Duration) -> Vec<PendingTxRecord> {
        let cutoff = Instant::now().checked_sub(window);
        let mut records: Vec<(TxHash, PendingTxRecord)> = self
            .entries
            .iter()
            .filter(|entry| entry.value().tx.to == destination)
            .filter(|entry| match cutoff {
                Some(c) => entry.value().observed_at >= c,
                None => true,
            })
            .map(|entry| (*entry.key(), entry.value().clone()))
            .collect();

        records.sort_by(|(ha, a), (hb, b)| {
            a.observed_at
                .cmp(&b.observed_at)
                .then(a.seq.cmp(&b.seq))
                .then(ha.cmp(hb))
        });

        records.into_iter().map(|(_, r)| r).collect()
    }

    /// All pending transactions observed within `window`, regardless of
    /// destination, in the same deterministic order as `recent_to`.
    pub fn recent(&self, window: Duration) -> Vec<PendingTxRecord> {
        let cutoff = Instant::now().checked_sub(window);
        let mut records: Vec<(TxHash, PendingTxRecord)> = self
            .entries
            .iter()
            .filter(|entry| match cutoff {
                Some(c) => entry.value().observed_at >= c,
                None => true,
            })
            .map(|entry| (*entry.key(), entry.value().clone()))
            .collect();

        records.sort_by(|(ha, a), (hb, b)| {
            a.observed_at
                .cmp(&b.observed_at)
                .then(a.seq.cmp(&b.seq))
                .then(ha.cmp(hb))
        });

        records.into_iter().map(|(_, r)| r).collect()
    }

    /// Remove entries older than the TTL. Returns the number evicted.
    pub fn evict_expired(&self, now: Instant) -> usize {
        let before = self.entries.len();
        let ttl = self.ttl;
        self.entries
            .retain(|_, record| now.duration_since(record.observed_at) < ttl);
        let evicted = before - self.entries.len();
        if evicted > 0 {
            debug!("Pending store: evicted {} expired entries", evicted);
        }
        evicted
    }

    /// Drop transactions confirmed in a new block. Idempotent; unknown
    /// hashes are a no-op. Returns the number removed.
    pub fn mark_included(&self, hashes: &[TxHash]) -> usize {
        let mut removed = 0;
        for hash in hashes {
            if self.entries.remove(hash).is_some() {
                removed += 1;
            }
        }
        if removed > 0 {
            debug!("Pending store: {} entries confirmed on-chain", removed);
        }
        removed
    }

    /// Flip the analyzed flag on a record (no-op on unknown hashes).
    pub fn mark_analyzed(&self, hash: &TxHash) {
        if let Some(mut entry) = self.entries.get_mut(hash) {
            entry.analyzed = true;
        }
    }

    pub fn get(&self, hash: &TxHash) -> Option<PendingTxRecord> {
        self.entries.get(hash).map(|entry| entry.value().clone())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl Clone for PendingTxStore {
    fn clone(&self) -> Self {
        Self {
            entries: Arc::clone(&self.entries),
            seq: Arc::clone(&self.seq),
            ttl: self.ttl,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy::primitives::{Bytes, U256};

    fn tx(to: Address, gas_price: u64, tag: u8) -> CandidateTransaction {
        CandidateTransaction {
            from: Address::repeat_byte(0xaa),
            to,
            value: U256::ZERO,
            gas_price: U256::from(gas_price),
            gas_limit: 21_000,
            input: Bytes::copy_from_slice(&[tag]),
            hash: Some(TxHash::repeat_byte(tag)),
        }
    }

    #[test]
    fn test_record_idempotent() {
        let store = PendingTxStore::new(Duration::from_secs(300));
        let t = tx(Address::repeat_byte(1), 50, 7);
        store.record(t.clone());
        let first = store.get(&t.effective_hash()).unwrap();
        store.record(t.clone());
        let second = store.get(&t.effective_hash()).unwrap();
        assert_eq!(store.len(), 1);
        assert_eq!(first.seq, second.seq);
    }

    #[test]
    fn test_recent_to_observation_order() {
        let store = PendingTxStore::new(Duration::from_secs(300));
        let dest = Address::repeat_byte(1);
        store.record(tx(dest, 60, 3));
        store.record(tx(dest, 40, 1));
        store.record(tx(dest, 50, 2));
        // Unrelated destination excluded
        store.record(tx(Address::repeat_byte(9), 99, 4));

        let records = store.recent_to(dest, Duration::from_secs(60));
        assert_eq!(records.len(), 3);
        // Observation order, not gas-price order
        assert_eq!(records[0].tx.gas_price, U256::from(60u64));
        assert_eq!(records[1].tx.gas_price, U256::from(40u64));
        assert_eq!(records[2].tx.gas_price, U256::from(50u64));
    }

    #[test]
    fn test_evict_expired() {
        let store = PendingTxStore::new(Duration::from_millis(0));
        store.record(tx(Address::repeat_byte(1), 50, 1));
        // TTL of zero: everything is expired at the next eviction pass
        let evicted = store.evict_expired(Instant::now() + Duration::from_millis(1));
        assert_eq!(evicted, 1);
        assert!(store.is_empty());
    }

    #[test]
    fn test_mark_included_idempotent() {
        let store = PendingTxStore::new(Duration::from_secs(300));
        let t = tx(Address::repeat_byte(1), 50, 1);
        let hash = t.effective_hash();
        store.record(t);

        assert_eq!(store.mark_included(&[hash]), 1);
        // Unknown / already-removed hashes are a no-op
        assert_eq!(store.mark_included(&[hash, TxHash::repeat_byte(0xff)]), 0);
    }

    #[test]
    fn test_mark_analyzed() {
        let store = PendingTxStore::new(Duration::from_secs(300));
        let t = tx(Address::repeat_byte(1), 50, 1);
        let hash = t.effective_hash();
        store.record(t);
        assert!(!store.get(&hash).unwrap().analyzed);
        store.mark_analyzed(&hash);
        assert!(store.get(&hash).unwrap().analyzed);
    }
}
