//! Mempool observation and threat analysis
//!
//! PendingTxStore holds observed not-yet-confirmed transactions with TTL
//! eviction; PatternLibrary is the declarative catalogue of known adversary
//! signatures; ThreatAnalyzer turns a candidate + store + library into a
//! ThreatReport.

pub mod analyzer;
pub mod patterns;
pub mod store;

pub use analyzer::{AnalysisContext, ThreatAnalyzer, ThreatHistory};
pub use patterns::{AdversaryPattern, PatternKind, PatternLibrary};
pub use store::{PendingTxRecord, PendingTxStore};
