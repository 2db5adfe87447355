//! Inclusion Monitor
//!
//! Watches new blocks after submission for the bundle's leg hashes. The
//! watch is bounded: after max_monitor_blocks blocks at or past the target
//! block without full inclusion, the bundle is declared Expired. Terminal
//! states are FullyIncluded and Expired only; Pending and PartiallyIncluded
//! are progress snapshots emitted on the optional channel.

use anyhow::Result;
use async_trait::async_trait;
use std::collections::HashSet;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use alloy::primitives::TxHash;

use crate::config::ShieldConfig;
use crate::types::{BlockInfo, Bundle, InclusionState, InclusionStatus};

/// New-block source. None means the underlying subscription ended.
#[async_trait]
pub trait BlockFeed: Send {
    async fn next_block(&mut self) -> Result<Option<BlockInfo>>;
}

pub struct InclusionMonitor {
    max_blocks: u64,
}

impl InclusionMonitor {
    pub fn new(config: &ShieldConfig) -> Self {
        Self {
            max_blocks: config.max_monitor_blocks,
        }
    }

    /// Watch blocks until the bundle is fully included or the window runs
    /// out. Blocks before the target block are ignored; they count neither
    /// toward inclusion nor toward the expiry window.
    pub async fn monitor<F: BlockFeed>(
        &self,
        bundle: &Bundle,
        feed: &mut F,
        progress: Option<mpsc::UnboundedSender<InclusionStatus>>,
    ) -> Result<InclusionStatus> {
        let wanted: HashSet<TxHash> = bundle.leg_hashes().into_iter().collect();
        let mut legs_included: Vec<TxHash> = Vec::new();
        let mut blocks_observed = 0u64;

        while let Some(block) = feed.next_block().await? {
            if block.number < bundle.target_block {
                continue;
            }
            blocks_observed += 1;

            for hash in &block.tx_hashes {
                if wanted.contains(hash) && !legs_included.contains(hash) {
                    legs_included.push(*hash);
                    debug!(
                        "Bundle {:?}: leg {:?} included in block {}",
                        bundle.id, hash, block.number
                    );
                }
            }

            if legs_included.len() == wanted.len() {
                info!(
                    "Bundle {:?} fully included after {} blocks",
                    bundle.id, blocks_observed
                );
                return Ok(InclusionStatus {
                    bundle_id: bundle.id,
                    state: InclusionState::FullyIncluded,
                    blocks_observed,
                    legs_included,
                });
            }

            if blocks_observed >= self.max_blocks {
                warn!(
                    "Bundle {:?} expired: {}/{} legs included after {} blocks",
                    bundle.id,
                    legs_included.len(),
                    wanted.len(),
                    blocks_observed
                );
                return Ok(InclusionStatus {
                    bundle_id: bundle.id,
                    state: InclusionState::Expired,
                    blocks_observed,
                    legs_included,
                });
            }

            if let Some(sender) = &progress {
                let state = if legs_included.is_empty() {
                    InclusionState::Pending
                } else {
                    InclusionState::PartiallyIncluded
                };
                // Receiver may have hung up; monitoring carries on regardless
                let _ = sender.send(InclusionStatus {
                    bundle_id: bundle.id,
                    state,
                    blocks_observed,
                    legs_included: legs_included.clone(),
                });
            }
        }

        // Feed ended before a terminal state; no more blocks will arrive
        warn!(
            "Block feed ended while monitoring bundle {:?} ({} blocks observed)",
            bundle.id, blocks_observed
        );
        Ok(InclusionStatus {
            bundle_id: bundle.id,
            state: InclusionState::Expired,
            blocks_observed,
            legs_included,
        })
    }
}
