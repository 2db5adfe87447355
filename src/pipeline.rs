//! Opportunity pipeline
//!
//! Chains one candidate through the full protected path:
//!     analyze → plan → build → simulate → submit → monitor
//!
//! Hard gates:
//!     - An Abort action rejects the candidate before any bundle exists
//!     - A simulation with success=false or profit <= 0 never reaches the
//!       submitter
//!     - A submission rejected by every relay never reaches the monitor
//!
//! Cancellation is checked at stage boundaries and raced against the
//! long-lived submit and monitor stages; a cancelled pipeline stops at the
//! next suspension point without completing the in-flight stage.

use anyhow::Result;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{debug, info, warn};

use alloy::primitives::B256;

use crate::bundle::{
    BlockFeed, BundleBuilder, BundleOptions, BundleSimulator, BundleSubmitter, InclusionMonitor,
};
use crate::config::ShieldConfig;
use crate::mempool::{AnalysisContext, ThreatAnalyzer};
use crate::protection::{ProtectionPlan, ProtectionPlanner};
use crate::types::{
    BundleLeg, CandidateTransaction, InclusionState, InclusionStatus, SimulationResult,
    SubmissionReport, ThreatReport,
};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PipelineOutcome {
    /// Bundle fully included on-chain.
    Executed,
    /// Stopped before or at a gate; the reason names the gate.
    Rejected(String),
    /// Submitted but not fully included within the monitoring window.
    Expired,
    /// Cancellation observed at a stage boundary or mid-stage.
    Cancelled,
}

/// Everything the pipeline learned about one candidate, terminal outcome
/// included. Stages that were never reached stay None.
#[derive(Debug, Clone)]
pub struct PipelineReport {
    pub outcome: PipelineOutcome,
    pub threat: ThreatReport,
    pub plan: Option<ProtectionPlan>,
    pub adjusted_slippage_bps: Option<u32>,
    pub bundle_id: Option<B256>,
    pub simulation: Option<SimulationResult>,
    pub submission: Option<SubmissionReport>,
    pub inclusion: Option<InclusionStatus>,
}

impl PipelineReport {
    fn new(threat: ThreatReport) -> Self {
        Self {
            outcome: PipelineOutcome::Rejected("incomplete".to_string()),
            threat,
            plan: None,
            adjusted_slippage_bps: None,
            bundle_id: None,
            simulation: None,
            submission: None,
            inclusion: None,
        }
    }
}

pub struct OpportunityPipeline {
    analyzer: Arc<ThreatAnalyzer>,
    planner: ProtectionPlanner,
    simulator: Arc<BundleSimulator>,
    submitter: Arc<BundleSubmitter>,
    monitor: InclusionMonitor,
    base_slippage_bps: u32,
    simulation_timeout: Duration,
    submission_budget: Duration,
    cancel: watch::Receiver<bool>,
}

impl OpportunityPipeline {
    pub fn new(
        analyzer: Arc<ThreatAnalyzer>,
        simulator: Arc<BundleSimulator>,
        submitter: Arc<BundleSubmitter>,
        config: &ShieldConfig,
        cancel: watch::Receiver<bool>,
    ) -> Self {
        Self {
            analyzer,
            planner: ProtectionPlanner::new(config),
            simulator,
            submitter,
            monitor: InclusionMonitor::new(config),
            base_slippage_bps: config.base_slippage_bps,
            simulation_timeout: Duration::from_secs(config.simulation_timeout_secs),
            submission_budget: Duration::from_secs(config.submission_budget_secs),
            cancel,
        }
    }

    fn cancelled(&self) -> bool {
        *self.cancel.borrow()
    }

    /// Run one candidate end to end. Transport failures bubble up as Err;
    /// every gate decision comes back as a report with a terminal outcome.
    pub async fn run<F: BlockFeed>(
        &self,
        candidate: &CandidateTransaction,
        ctx: &AnalysisContext,
        legs: Vec<BundleLeg>,
        target_block: u64,
        options: BundleOptions,
        feed: &mut F,
    ) -> Result<PipelineReport> {
        if self.cancelled() {
            // Analysis never ran; the audit trail carries an empty report
            let mut report = PipelineReport::new(ThreatReport::empty());
            report.outcome = PipelineOutcome::Cancelled;
            return Ok(report);
        }

        // Stage 1: threat analysis (never fails, may come back degraded)
        let threat = self.analyzer.analyze(candidate, ctx).await;
        let mut report = PipelineReport::new(threat);
        if report.threat.degraded {
            warn!(
                "Analysis degraded for candidate {:?} — proceeding at Medium",
                candidate.effective_hash()
            );
        }

        // Stage 2: protection plan
        let plan = self.planner.plan(&report.threat.threats);
        let adjusted = self.planner.adjusted_slippage_bps(self.base_slippage_bps, &plan);
        report.adjusted_slippage_bps = Some(adjusted);
        debug!(
            "Candidate {:?}: level={:?}, {} actions, slippage {} bps",
            candidate.effective_hash(),
            report.threat.level,
            plan.actions.len(),
            adjusted
        );

        if plan.should_abort() {
            report.plan = Some(plan);
            report.outcome =
                PipelineOutcome::Rejected("aborted: high-severity sandwich threat".to_string());
            return Ok(report);
        }

        // DelayExecution shifts the bundle's target block
        let effective_target = target_block + plan.delay_blocks().unwrap_or(0);
        report.plan = Some(plan);

        if self.cancelled() {
            report.outcome = PipelineOutcome::Cancelled;
            return Ok(report);
        }

        // Stage 3: build
        let bundle = BundleBuilder::build(legs, effective_target, options)?;
        report.bundle_id = Some(bundle.id);

        // Stage 4: simulate; failure or non-positive profit stops here
        let simulation =
            match tokio::time::timeout(self.simulation_timeout, self.simulator.simulate(&bundle))
                .await
            {
                Ok(result) => result?,
                Err(_) => {
                    report.outcome =
                        PipelineOutcome::Rejected("simulation timed out".to_string());
                    return Ok(report);
                }
            };
        let submittable = simulation.is_submittable();
        let profit = simulation.profit;
        let sim_success = simulation.success;
        report.simulation = Some(simulation);

        if !submittable {
            let reason = if sim_success {
                format!("unprofitable after gas: {}", profit)
            } else {
                "simulation failed".to_string()
            };
            info!("Bundle {:?} rejected: {}", bundle.id, reason);
            report.outcome = PipelineOutcome::Rejected(reason);
            return Ok(report);
        }

        if self.cancelled() {
            report.outcome = PipelineOutcome::Cancelled;
            return Ok(report);
        }

        // Stage 5: submit, racing the cancellation flag
        let submission = tokio::select! {
            result = tokio::time::timeout(self.submission_budget, self.submitter.submit(&bundle)) => {
                match result {
                    Ok(result) => result?,
                    Err(_) => {
                        report.outcome =
                            PipelineOutcome::Rejected("submission budget exhausted".to_string());
                        return Ok(report);
                    }
                }
            }
            _ = cancelled_wait(self.cancel.clone()) => {
                report.outcome = PipelineOutcome::Cancelled;
                return Ok(report);
            }
        };
        let accepted = submission.accepted;
        report.submission = Some(submission);

        if !accepted {
            report.outcome = PipelineOutcome::Rejected("rejected by all relays".to_string());
            return Ok(report);
        }

        // Stage 6: monitor until terminal, racing the cancellation flag
        let inclusion = tokio::select! {
            result = self.monitor.monitor(&bundle, feed, None) => result?,
            _ = cancelled_wait(self.cancel.clone()) => {
                report.outcome = PipelineOutcome::Cancelled;
                return Ok(report);
            }
        };
        report.outcome = match inclusion.state {
            InclusionState::FullyIncluded => PipelineOutcome::Executed,
            _ => PipelineOutcome::Expired,
        };
        report.inclusion = Some(inclusion);

        Ok(report)
    }
}

/// Resolves when the cancellation flag flips to true. Pends forever when the
/// sender is gone without cancelling, so a dropped host never aborts an
/// in-flight stage.
async fn cancelled_wait(mut cancel: watch::Receiver<bool>) {
    if cancel.wait_for(|flag| *flag).await.is_err() {
        std::future::pending::<()>().await;
    }
}
