//! Threat Analyzer
//!
//! Consumes a candidate transaction + PendingTxStore + PatternLibrary and
//! produces zero or more threat records plus an aggregate threat level.
//!
//! Two distinct detection paths (kept deliberately separate):
//!   - `analyze`: the live mempool path protecting an in-flight candidate
//!   - `analyze_mined_block`: post-hoc bracketing detection over an
//!     already-mined block, used only to tune the pattern library
//!
//! The live path runs under a hard time budget (default 200ms). On timeout
//! or internal failure it returns the conservative degraded report instead
//! of propagating an error — callers must not block the critical path on
//! analysis failure.
//!
//! Gas-price comparisons use U256 integer ratios, never floats:
//!   front >= 1.10 × candidate  ⇔  front × 10 >= candidate × 11
//!   candidate > 1.5 × standard ⇔  candidate × 2 > standard × 3

use alloy::primitives::{Address, TxHash, U256};
use anyhow::Result;
use chrono::Utc;
use std::collections::HashSet;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};
use std::time::{Duration, Instant};
use tracing::{debug, warn};

use crate::types::{
    CandidateTransaction, ThreatDetail, ThreatLevel, ThreatRecord, ThreatReport, ThreatSeverity,
    ThreatType,
};

use super::patterns::{PatternLibrary, PATTERN_MATCH_CONFIDENCE};
use super::store::{PendingTxRecord, PendingTxStore};

/// Optional pool context for an analysis pass. The standard gas price is
/// queried by the caller so the analyzer itself never touches I/O.
#[derive(Debug, Clone, Default)]
pub struct AnalysisContext {
    pub token_in: Option<Address>,
    pub token_out: Option<Address>,
    pub amount_in: Option<U256>,
    pub standard_gas_price: Option<U256>,
}

/// TTL-retained log of emitted threat records, kept for audit and for the
/// post-hoc tuning path. Read-mostly; purge takes the writer lock briefly.
#[derive(Debug)]
pub struct ThreatHistory {
    entries: RwLock<Vec<(Instant, ThreatRecord)>>,
    ttl: Duration,
}

impl ThreatHistory {
    pub fn new(ttl: Duration) -> Self {
        Self {
            entries: RwLock::new(Vec::new()),
            ttl,
        }
    }

    pub fn push(&self, record: ThreatRecord) {
        let mut entries = match self.entries.write() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        entries.push((Instant::now(), record));
    }

    /// Drop records older than the retention window.
    pub fn purge_expired(&self, now: Instant) -> usize {
        let mut entries = match self.entries.write() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        let before = entries.len();
        let ttl = self.ttl;
        entries.retain(|(at, _)| now.duration_since(*at) < ttl);
        before - entries.len()
    }

    pub fn recent(&self) -> Vec<ThreatRecord> {
        let entries = match self.entries.read() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        entries.iter().map(|(_, r)| r.clone()).collect()
    }

    pub fn len(&self) -> usize {
        match self.entries.read() {
            Ok(guard) => guard.len(),
            Err(poisoned) => poisoned.into_inner().len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

pub struct ThreatAnalyzer {
    store: PendingTxStore,
    patterns: Arc<PatternLibrary>,
    history: Arc<ThreatHistory>,
    /// Lookback window for pending-tx correlation.
    window: Duration,
    /// Hard time budget for one live analysis pass.
    budget: Duration,
    next_id: AtomicU64,
}

impl ThreatAnalyzer {
    pub fn new(
        store: PendingTxStore,
        patterns: Arc<PatternLibrary>,
        window: Duration,
        budget: Duration,
    ) -> Self {
        Self {
            store,
            patterns,
            history: Arc::new(ThreatHistory::new(window)),
            window,
            budget,
            next_id: AtomicU64::new(1),
        }
    }

    pub fn history(&self) -> Arc<ThreatHistory> {
        Arc::clone(&self.history)
    }

    /// Live analysis pass. Never fails: on budget exhaustion or internal
    /// error, returns the conservative Medium degraded report.
    pub async fn analyze(
        &self,
        candidate: &CandidateTransaction,
        ctx: &AnalysisContext,
    ) -> ThreatReport {
        // Opportunistic cleanup before the pass
        self.store.evict_expired(Instant::now());
        self.history.purge_expired(Instant::now());

        match tokio::time::timeout(self.budget, self.detect(candidate, ctx)).await {
            Ok(Ok(report)) => report,
            Ok(Err(e)) => {
                warn!("Threat analysis aborted: {} — degrading to Medium", e);
                ThreatReport::degraded()
            }
            Err(_) => {
                warn!(
                    "Threat analysis exceeded {}ms budget — degrading to Medium",
                    self.budget.as_millis()
                );
                ThreatReport::degraded()
            }
        }
    }

    async fn detect(
        &self,
        candidate: &CandidateTransaction,
        ctx: &AnalysisContext,
    ) -> Result<ThreatReport> {
        // The detectors are synchronous, so the outer timeout alone cannot
        // interrupt them; an explicit deadline check between detectors
        // enforces the budget for CPU-bound passes.
        let deadline = Instant::now() + self.budget;

        let mut threats = Vec::new();
        let candidate_hash = candidate.effective_hash();

        let same_dest = self.store.recent_to(candidate.to, self.window);
        let all_recent = self.store.recent(self.window);

        check_deadline(deadline)?;
        self.detect_sandwich(candidate, candidate_hash, &same_dest, ctx, &mut threats);
        check_deadline(deadline)?;
        self.detect_frontrun(candidate, candidate_hash, &all_recent, &mut threats);
        check_deadline(deadline)?;
        self.detect_gas_anomaly(candidate, candidate_hash, ctx, &mut threats);
        check_deadline(deadline)?;
        self.detect_pattern_matches(candidate, candidate_hash, &all_recent, &mut threats);

        let level = aggregate_level(&threats);
        for threat in &threats {
            debug!(
                "Threat: {} severity={:?} confidence={:.2} offender={:?}",
                threat.threat_type, threat.severity, threat.confidence, threat.offending_tx
            );
            self.history.push(threat.clone());
        }

        Ok(ThreatReport {
            level,
            threats,
            degraded: false,
        })
    }

    /// Live sandwich rule: a pending front F targeting the candidate's
    /// destination with gasPrice(F) >= 1.10 × gasPrice(candidate), and a
    /// pending back B from the same sender, observed strictly after F,
    /// with gasPrice(B) < gasPrice(candidate).
    fn detect_sandwich(
        &self,
        candidate: &CandidateTransaction,
        candidate_hash: TxHash,
        same_dest: &[PendingTxRecord],
        ctx: &AnalysisContext,
        threats: &mut Vec<ThreatRecord>,
    ) {
        let mut seen_attackers: HashSet<Address> = HashSet::new();

        for (i, front) in same_dest.iter().enumerate() {
            if front.tx.effective_hash() == candidate_hash {
                continue;
            }
            // front >= 1.10 × candidate, integer ratio
            if front.tx.gas_price * U256::from(10u64) < candidate.gas_price * U256::from(11u64) {
                continue;
            }
            if seen_attackers.contains(&front.tx.from) {
                continue;
            }

            // Back leg: same sender, observed strictly after the front,
            // priced below the candidate so it lands behind the victim.
            let back = same_dest.iter().skip(i + 1).find(|b| {
                b.tx.from == front.tx.from
                    && b.tx.effective_hash() != candidate_hash
                    && (b.observed_at, b.seq) > (front.observed_at, front.seq)
                    && b.tx.gas_price < candidate.gas_price
            });

            if let Some(back) = back {
                let attacker = front.tx.from;
                seen_attackers.insert(attacker);

                let mut record = self.make_record(
                    ThreatType::Sandwich,
                    ThreatSeverity::High,
                    0.85,
                    front.tx.effective_hash(),
                    ThreatDetail::Sandwich {
                        attacker,
                        front_hash: front.tx.effective_hash(),
                        back_hash: back.tx.effective_hash(),
                    },
                    false,
                );
                record
                    .extra
                    .insert("pool_address".to_string(), format!("{:?}", candidate.to));
                if let Some(amount_in) = ctx.amount_in {
                    record
                        .extra
                        .insert("victim_amount_in".to_string(), amount_in.to_string());
                }
                threats.push(record);
            }
        }
    }

    /// Frontrun rule: a pending transaction shares the candidate's selector
    /// and carries a strictly higher gas price. Confidence 0.70 for an exact
    /// selector + price-posture match (equal parameter length), graded down
    /// by parameter-length similarity otherwise.
    fn detect_frontrun(
        &self,
        candidate: &CandidateTransaction,
        candidate_hash: TxHash,
        recent: &[PendingTxRecord],
        threats: &mut Vec<ThreatRecord>,
    ) {
        let selector = match candidate.selector() {
            Some(sel) => sel,
            None => return,
        };

        for record in recent {
            if record.tx.effective_hash() == candidate_hash {
                continue;
            }
            if record.tx.selector() != Some(selector) {
                continue;
            }
            if record.tx.gas_price <= candidate.gas_price {
                continue;
            }

            let confidence = frontrun_confidence(candidate.input.len(), record.tx.input.len());
            threats.push(self.make_record(
                ThreatType::Frontrun,
                ThreatSeverity::Medium,
                confidence,
                record.tx.effective_hash(),
                ThreatDetail::Frontrun {
                    selector,
                    competing_hash: record.tx.effective_hash(),
                    competing_gas_price: record.tx.gas_price,
                },
                false,
            ));
        }
    }

    /// Weak independent signal, never a veto: candidate priced above 1.5×
    /// the current network standard gas price.
    fn detect_gas_anomaly(
        &self,
        candidate: &CandidateTransaction,
        candidate_hash: TxHash,
        ctx: &AnalysisContext,
        threats: &mut Vec<ThreatRecord>,
    ) {
        let standard = match ctx.standard_gas_price {
            Some(std) if std > U256::ZERO => std,
            _ => return,
        };

        if candidate.gas_price * U256::from(2u64) > standard * U256::from(3u64) {
            threats.push(self.make_record(
                ThreatType::Frontrun,
                ThreatSeverity::Medium,
                0.5,
                candidate_hash,
                ThreatDetail::GasAnomaly {
                    candidate_gas_price: candidate.gas_price,
                    standard_gas_price: standard,
                },
                false,
            ));
        }
    }

    /// Pattern-library matches against the candidate and recent pendings.
    fn detect_pattern_matches(
        &self,
        candidate: &CandidateTransaction,
        candidate_hash: TxHash,
        recent: &[PendingTxRecord],
        threats: &mut Vec<ThreatRecord>,
    ) {
        let mut seen: HashSet<(String, TxHash)> = HashSet::new();

        let mut scan = |tx: &CandidateTransaction, hash: TxHash, threats: &mut Vec<ThreatRecord>| {
            for pattern in self.patterns.matches_for(tx) {
                if !seen.insert((pattern.name.clone(), hash)) {
                    continue;
                }
                threats.push(self.make_record(
                    pattern.threat_type,
                    pattern.severity,
                    PATTERN_MATCH_CONFIDENCE,
                    hash,
                    ThreatDetail::PatternMatch {
                        pattern_name: pattern.name.clone(),
                        matched_hash: hash,
                    },
                    false,
                ));
            }
        };

        scan(candidate, candidate_hash, threats);
        for record in recent {
            let hash = record.tx.effective_hash();
            if hash != candidate_hash {
                scan(&record.tx, hash, threats);
            }
        }
    }

    /// Post-hoc path: detect same-sender bracketing in an already-mined
    /// block sequence (front at i, victim at i+1, back at i+2, same
    /// destination, front.gasPrice > victim.gasPrice > back.gasPrice,
    /// front.sender == back.sender != victim.sender).
    ///
    /// Records are marked post_hoc and feed the pattern library; they never
    /// block a live candidate.
    pub fn analyze_mined_block(&self, block_txs: &[CandidateTransaction]) -> Vec<ThreatRecord> {
        let mut records = Vec::new();

        for window in block_txs.windows(3) {
            let (front, victim, back) = (&window[0], &window[1], &window[2]);

            if front.to != victim.to || victim.to != back.to {
                continue;
            }
            if front.from != back.from || front.from == victim.from {
                continue;
            }
            if !(front.gas_price > victim.gas_price && victim.gas_price > back.gas_price) {
                continue;
            }

            let mut record = self.make_record(
                ThreatType::Sandwich,
                ThreatSeverity::High,
                0.85,
                front.effective_hash(),
                ThreatDetail::Sandwich {
                    attacker: front.from,
                    front_hash: front.effective_hash(),
                    back_hash: back.effective_hash(),
                },
                true,
            );
            record
                .extra
                .insert("victim_tx".to_string(), format!("{:?}", victim.effective_hash()));

            debug!(
                "Post-hoc sandwich: attacker {:?} bracketing {:?}",
                front.from,
                victim.effective_hash()
            );
            // Tuning only: catalogue the attacker's full address
            self.patterns.add_attacker_prefix(front.from, 20);
            self.history.push(record.clone());
            records.push(record);
        }

        records
    }

    fn make_record(
        &self,
        threat_type: ThreatType,
        severity: ThreatSeverity,
        confidence: f64,
        offending_tx: TxHash,
        detail: ThreatDetail,
        post_hoc: bool,
    ) -> ThreatRecord {
        ThreatRecord {
            id: self.next_id.fetch_add(1, Ordering::Relaxed),
            threat_type,
            severity,
            confidence,
            detected_at: Utc::now(),
            offending_tx,
            detail,
            extra: Default::default(),
            post_hoc,
        }
    }
}

fn check_deadline(deadline: Instant) -> Result<()> {
    if Instant::now() >= deadline {
        anyhow::bail!("analysis budget exhausted");
    }
    Ok(())
}

/// Confidence grading for frontrun matches: 0.70 on equal parameter length,
/// otherwise 0.65 plus up to 0.05 for length similarity.
fn frontrun_confidence(candidate_len: usize, competing_len: usize) -> f64 {
    if candidate_len == competing_len {
        return 0.70;
    }
    let (small, large) = if candidate_len < competing_len {
        (candidate_len, competing_len)
    } else {
        (competing_len, candidate_len)
    };
    if large == 0 {
        return 0.65;
    }
    0.65 + 0.05 * (small as f64 / large as f64)
}

/// Aggregate threat level over one pass:
/// Critical if any Critical; else High if a High-severity Sandwich is
/// present, >=2 High, or >=1 High alongside >=1 Medium; else Medium if
/// >=1 High or >=2 Medium; else Low if any record exists; else None.
///
/// A lone High Sandwich outranks a lone High of any other type: bracketing
/// evidence names a specific attacker, so corroboration is not required.
pub fn aggregate_level(threats: &[ThreatRecord]) -> ThreatLevel {
    let critical = threats
        .iter()
        .filter(|t| t.severity == ThreatSeverity::Critical)
        .count();
    let high = threats
        .iter()
        .filter(|t| t.severity == ThreatSeverity::High)
        .count();
    let medium = threats
        .iter()
        .filter(|t| t.severity == ThreatSeverity::Medium)
        .count();
    let high_sandwich = threats.iter().any(|t| {
        t.threat_type == ThreatType::Sandwich && t.severity >= ThreatSeverity::High
    });

    if critical >= 1 {
        ThreatLevel::Critical
    } else if high_sandwich || high >= 2 || (high >= 1 && medium >= 1) {
        ThreatLevel::High
    } else if high >= 1 || medium >= 2 {
        ThreatLevel::Medium
    } else if !threats.is_empty() {
        ThreatLevel::Low
    } else {
        ThreatLevel::None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy::primitives::Bytes;

    fn analyzer_with_store() -> (ThreatAnalyzer, PendingTxStore) {
        let store = PendingTxStore::new(Duration::from_secs(300));
        let analyzer = ThreatAnalyzer::new(
            store.clone(),
            Arc::new(PatternLibrary::empty()),
            Duration::from_secs(300),
            Duration::from_millis(200),
        );
        (analyzer, store)
    }

    fn tx(from: u8, to: u8, gas_price: u64, input: &[u8], tag: u8) -> CandidateTransaction {
        CandidateTransaction {
            from: Address::repeat_byte(from),
            to: Address::repeat_byte(to),
            value: U256::ZERO,
            gas_price: U256::from(gas_price),
            gas_limit: 200_000,
            input: Bytes::copy_from_slice(input),
            hash: Some(TxHash::repeat_byte(tag)),
        }
    }

    #[tokio::test]
    async fn test_sandwich_detected() {
        let (analyzer, store) = analyzer_with_store();
        let candidate = tx(0x01, 0x0f, 50, &[], 0x10);
        // front: sender S, gas 60 >= 1.10 × 50
        store.record(tx(0x02, 0x0f, 60, &[], 0x11));
        // back: sender S, observed after front, gas 40 < 50
        store.record(tx(0x02, 0x0f, 40, &[], 0x12));

        let report = analyzer.analyze(&candidate, &AnalysisContext::default()).await;
        assert_eq!(report.level, ThreatLevel::High);
        assert!(!report.degraded);
        let sandwich = report
            .threats
            .iter()
            .find(|t| t.threat_type == ThreatType::Sandwich)
            .expect("sandwich record");
        assert_eq!(sandwich.severity, ThreatSeverity::High);
        assert!((sandwich.confidence - 0.85).abs() < f64::EPSILON);
    }

    #[tokio::test]
    async fn test_no_sandwich_when_back_priced_high() {
        let (analyzer, store) = analyzer_with_store();
        let candidate = tx(0x01, 0x0f, 50, &[], 0x10);
        store.record(tx(0x02, 0x0f, 60, &[], 0x11));
        // back priced above the candidate — lands ahead, not behind
        store.record(tx(0x02, 0x0f, 55, &[], 0x12));

        let report = analyzer.analyze(&candidate, &AnalysisContext::default()).await;
        assert!(report
            .threats
            .iter()
            .all(|t| t.threat_type != ThreatType::Sandwich));
    }

    #[tokio::test]
    async fn test_front_ratio_boundary() {
        let (analyzer, store) = analyzer_with_store();
        let candidate = tx(0x01, 0x0f, 100, &[], 0x10);
        // 109 < 1.10 × 100: not a front
        store.record(tx(0x02, 0x0f, 109, &[], 0x11));
        store.record(tx(0x02, 0x0f, 40, &[], 0x12));
        let report = analyzer.analyze(&candidate, &AnalysisContext::default()).await;
        assert!(report
            .threats
            .iter()
            .all(|t| t.threat_type != ThreatType::Sandwich));

        // exactly 110 = 1.10 × 100: qualifies
        store.record(tx(0x03, 0x0f, 110, &[], 0x13));
        store.record(tx(0x03, 0x0f, 40, &[], 0x14));
        let report = analyzer.analyze(&candidate, &AnalysisContext::default()).await;
        assert!(report
            .threats
            .iter()
            .any(|t| t.threat_type == ThreatType::Sandwich));
    }

    #[tokio::test]
    async fn test_exhausted_budget_degrades_to_medium() {
        let store = PendingTxStore::new(Duration::from_secs(300));
        let analyzer = ThreatAnalyzer::new(
            store,
            Arc::new(PatternLibrary::empty()),
            Duration::from_secs(300),
            Duration::from_millis(0),
        );
        let candidate = tx(0x01, 0x0f, 50, &[], 0x10);
        let report = analyzer.analyze(&candidate, &AnalysisContext::default()).await;
        assert!(report.degraded);
        assert_eq!(report.level, ThreatLevel::Medium);
        assert!(report.threats.is_empty());
    }

    #[tokio::test]
    async fn test_empty_store_no_threats() {
        let (analyzer, _store) = analyzer_with_store();
        let candidate = tx(0x01, 0x0f, 50, &[], 0x10);
        let report = analyzer.analyze(&candidate, &AnalysisContext::default()).await;
        assert_eq!(report.level, ThreatLevel::None);
        assert!(report.threats.is_empty());
        assert!(!report.degraded);
    }

    #[tokio::test]
    async fn test_frontrun_confidence_grading() {
        let (analyzer, store) = analyzer_with_store();
        let sel = [0x38, 0xed, 0x17, 0x39];
        let mut input = sel.to_vec();
        input.extend_from_slice(&[0u8; 64]);

        let candidate = tx(0x01, 0x0f, 50, &input, 0x10);
        // Same selector + same parameter length, higher gas: 0.70
        store.record(tx(0x02, 0x0f, 70, &input, 0x11));

        let report = analyzer.analyze(&candidate, &AnalysisContext::default()).await;
        let frontrun = report
            .threats
            .iter()
            .find(|t| t.threat_type == ThreatType::Frontrun)
            .expect("frontrun record");
        assert_eq!(frontrun.severity, ThreatSeverity::Medium);
        assert!((frontrun.confidence - 0.70).abs() < f64::EPSILON);
    }

    #[test]
    fn test_frontrun_confidence_length_similarity() {
        assert!((frontrun_confidence(68, 68) - 0.70).abs() < f64::EPSILON);
        let graded = frontrun_confidence(68, 132);
        assert!(graded >= 0.65 && graded < 0.70);
        assert!((frontrun_confidence(4, 0) - 0.65).abs() < f64::EPSILON);
    }

    #[tokio::test]
    async fn test_gas_anomaly() {
        let (analyzer, _store) = analyzer_with_store();
        let candidate = tx(0x01, 0x0f, 151, &[], 0x10);
        let ctx = AnalysisContext {
            standard_gas_price: Some(U256::from(100u64)),
            ..Default::default()
        };
        let report = analyzer.analyze(&candidate, &ctx).await;
        let anomaly = report
            .threats
            .iter()
            .find(|t| matches!(t.detail, ThreatDetail::GasAnomaly { .. }))
            .expect("gas anomaly record");
        assert!((anomaly.confidence - 0.5).abs() < f64::EPSILON);

        // Exactly 1.5× is not an anomaly (strictly greater required)
        let at_limit = tx(0x01, 0x0f, 150, &[], 0x11);
        let report = analyzer.analyze(&at_limit, &ctx).await;
        assert!(report
            .threats
            .iter()
            .all(|t| !matches!(t.detail, ThreatDetail::GasAnomaly { .. })));
    }

    #[test]
    fn test_aggregate_level_tiers() {
        let (analyzer, _store) = analyzer_with_store();
        let rec = |sev| {
            analyzer.make_record(
                ThreatType::Frontrun,
                sev,
                0.5,
                TxHash::ZERO,
                ThreatDetail::PatternMatch {
                    pattern_name: "t".to_string(),
                    matched_hash: TxHash::ZERO,
                },
                false,
            )
        };

        assert_eq!(aggregate_level(&[]), ThreatLevel::None);
        assert_eq!(aggregate_level(&[rec(ThreatSeverity::Low)]), ThreatLevel::Low);
        // A lone High of a non-sandwich type stays Medium: one uncorroborated
        // signal is not enough to escalate
        assert_eq!(
            aggregate_level(&[rec(ThreatSeverity::High)]),
            ThreatLevel::Medium
        );
        assert_eq!(
            aggregate_level(&[rec(ThreatSeverity::Medium), rec(ThreatSeverity::Medium)]),
            ThreatLevel::Medium
        );
        assert_eq!(
            aggregate_level(&[rec(ThreatSeverity::High), rec(ThreatSeverity::Medium)]),
            ThreatLevel::High
        );
        assert_eq!(
            aggregate_level(&[rec(ThreatSeverity::High), rec(ThreatSeverity::High)]),
            ThreatLevel::High
        );
        assert_eq!(
            aggregate_level(&[rec(ThreatSeverity::Critical)]),
            ThreatLevel::Critical
        );
    }

    #[test]
    fn test_lone_high_sandwich_aggregates_high() {
        let (analyzer, _store) = analyzer_with_store();
        let sandwich = analyzer.make_record(
            ThreatType::Sandwich,
            ThreatSeverity::High,
            0.85,
            TxHash::repeat_byte(0x11),
            ThreatDetail::Sandwich {
                attacker: Address::repeat_byte(0x02),
                front_hash: TxHash::repeat_byte(0x11),
                back_hash: TxHash::repeat_byte(0x12),
            },
            false,
        );
        assert_eq!(aggregate_level(&[sandwich.clone()]), ThreatLevel::High);

        // Severity below High never triggers the sandwich elevation
        let mut weak = sandwich;
        weak.severity = ThreatSeverity::Medium;
        assert_eq!(aggregate_level(&[weak]), ThreatLevel::Low);
    }

    #[test]
    fn test_post_hoc_sandwich_feeds_patterns() {
        let patterns = Arc::new(PatternLibrary::empty());
        let store = PendingTxStore::new(Duration::from_secs(300));
        let analyzer = ThreatAnalyzer::new(
            store,
            Arc::clone(&patterns),
            Duration::from_secs(300),
            Duration::from_millis(200),
        );

        let block = vec![
            tx(0x02, 0x0f, 80, &[], 0x21), // front (attacker)
            tx(0x01, 0x0f, 50, &[], 0x22), // victim
            tx(0x02, 0x0f, 30, &[], 0x23), // back (attacker)
        ];
        let records = analyzer.analyze_mined_block(&block);
        assert_eq!(records.len(), 1);
        assert!(records[0].post_hoc);
        assert_eq!(records[0].threat_type, ThreatType::Sandwich);
        // Attacker now catalogued for future live matching
        assert_eq!(patterns.len(), 1);
    }

    #[test]
    fn test_post_hoc_requires_distinct_victim_sender() {
        let (analyzer, _store) = analyzer_with_store();
        // All three from the same sender: not a sandwich
        let block = vec![
            tx(0x02, 0x0f, 80, &[], 0x21),
            tx(0x02, 0x0f, 50, &[], 0x22),
            tx(0x02, 0x0f, 30, &[], 0x23),
        ];
        assert!(analyzer.analyze_mined_block(&block).is_empty());
    }

    #[test]
    fn test_threat_history_purge() {
        let history = ThreatHistory::new(Duration::from_millis(0));
        let (analyzer, _store) = analyzer_with_store();
        history.push(analyzer.make_record(
            ThreatType::Frontrun,
            ThreatSeverity::Low,
            0.5,
            TxHash::ZERO,
            ThreatDetail::PatternMatch {
                pattern_name: "t".to_string(),
                matched_hash: TxHash::ZERO,
            },
            false,
        ));
        assert_eq!(history.len(), 1);
        let purged = history.purge_expired(Instant::now() + Duration::from_millis(1));
        assert_eq!(purged, 1);
        assert!(history.is_empty());
    }
}
