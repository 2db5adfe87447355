//! Typed failure taxonomy for the protection pipeline.
//!
//! Internal component failures are converted to these typed outcomes at
//! component boundaries; no unhandled failure crosses into shared state
//! before the owning component finishes its own bookkeeping (e.g., relay
//! feedback is applied even when the overall submission fails).

use alloy::primitives::B256;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ShieldError {
    /// Analyzer hit its time budget or failed internally. Never fatal:
    /// callers receive the conservative Medium default instead.
    #[error("analysis degraded: {0}")]
    AnalysisDegraded(String),

    /// A leg reverted (not marked revertible) or profit ≤ 0. The bundle is
    /// discarded; reported as "not profitable", not propagated as a panic.
    #[error("simulation failed: {0}")]
    SimulationFailed(String),

    /// A single relay rejected the bundle. Tolerated while quorum of 1 holds.
    #[error("relay '{relay}' rejected bundle: {reason}")]
    RelayRejected { relay: String, reason: String },

    /// Every selected relay rejected or timed out. No automatic retry —
    /// the caller decides whether to rebuild with adjusted parameters.
    #[error("all selected relays rejected the bundle")]
    AllRelaysFailed,

    /// Monitoring exhausted its block budget without full inclusion.
    #[error("inclusion window expired after {0} observed blocks")]
    InclusionTimeout(u64),

    /// Cooperative cancellation: the pipeline unwinds without side effects
    /// on shared store/directory state.
    #[error("cancellation requested")]
    CancellationRequested,

    /// A submission for this bundle identity is already in flight.
    #[error("submission already in flight for bundle {0}")]
    SubmissionInFlight(B256),
}
