//! MEV Shield Bot Library
//!
//! Components for mempool threat detection and protected bundle submission.
//! Observes pending transactions, scores sandwich/frontrun/gas-anomaly
//! threats, plans protective actions, and routes pre-signed bundles to
//! private relays with simulation gating and bounded inclusion monitoring.

pub mod bundle;
pub mod chain;
pub mod config;
pub mod errors;
pub mod mempool;
pub mod pipeline;
pub mod protection;
pub mod types;

// Re-export commonly used types
pub use config::{load_config_from_file, ShieldConfig};
pub use errors::ShieldError;
pub use mempool::{AnalysisContext, PatternLibrary, PendingTxStore, ThreatAnalyzer};
pub use pipeline::{OpportunityPipeline, PipelineOutcome, PipelineReport};
pub use protection::{ProtectionPlan, ProtectionPlanner};
pub use types::{
    Bundle, BundleLeg, CandidateTransaction, SimulationResult, ThreatLevel, ThreatRecord,
    ThreatReport, ThreatSeverity, ThreatType,
};
