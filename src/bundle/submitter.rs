//! Bundle Submitter
//!
//! Fans a simulated-profitable bundle out to the top-scored active relays
//! concurrently, with a per-relay timeout. Quorum of 1: a single accepting
//! relay makes the submission a success. Every attempt is reported back to
//! the RelayDirectory so selection quality improves over time, including
//! attempts that land after the quorum is already met.
//!
//! Duplicate protection: a bundle identity can only be in flight once.

use alloy::primitives::B256;
use anyhow::Result;
use async_trait::async_trait;
use dashmap::DashMap;
use futures::future::join_all;
use serde_json::json;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

use crate::bundle::relay::RelayDirectory;
use crate::config::ShieldConfig;
use crate::errors::ShieldError;
use crate::types::{Bundle, RelayProfile, SubmissionOutcome, SubmissionReport};

/// Transport seam for relay submission. Ok(()) means the relay accepted the
/// bundle; Err carries the rejection or transport failure reason.
#[async_trait]
pub trait RelayApi: Send + Sync {
    async fn send_bundle(&self, relay: &RelayProfile, bundle: &Bundle) -> Result<()>;
}

/// JSON-RPC eth_sendBundle over HTTPS.
pub struct HttpRelayApi {
    client: reqwest::Client,
}

impl HttpRelayApi {
    pub fn new() -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()?;
        Ok(Self { client })
    }
}

#[async_trait]
impl RelayApi for HttpRelayApi {
    async fn send_bundle(&self, relay: &RelayProfile, bundle: &Bundle) -> Result<()> {
        // Bytes displays as 0x-prefixed hex
        let txs: Vec<String> = bundle
            .legs
            .iter()
            .map(|leg| leg.payload.to_string())
            .collect();
        let reverting: Vec<String> = bundle
            .revertible
            .iter()
            .map(|hash| format!("{:?}", hash))
            .collect();

        let mut params = json!({
            "txs": txs,
            "blockNumber": format!("0x{:x}", bundle.target_block),
            "revertingTxHashes": reverting,
        });
        if let Some(min) = bundle.min_timestamp {
            params["minTimestamp"] = json!(min);
        }
        if let Some(max) = bundle.max_timestamp {
            params["maxTimestamp"] = json!(max);
        }

        let body = json!({
            "jsonrpc": "2.0",
            "id": 1,
            "method": "eth_sendBundle",
            "params": [params],
        });

        let mut request = self.client.post(&relay.endpoint).json(&body);
        // Relay-signed request header, opaque to the core
        if let Some(auth) = &relay.auth_header {
            request = request.header("X-Flashbots-Signature", auth);
        }

        let response = request.send().await?;
        let status = response.status();
        if !status.is_success() {
            anyhow::bail!("Relay returned HTTP {}", status);
        }

        let payload: serde_json::Value = response.json().await?;
        if let Some(error) = payload.get("error") {
            anyhow::bail!("Relay rejected bundle: {}", error);
        }
        Ok(())
    }
}

/// Removes the bundle id from the in-flight set on every exit path.
struct InFlightGuard {
    in_flight: Arc<DashMap<B256, ()>>,
    id: B256,
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        self.in_flight.remove(&self.id);
    }
}

pub struct BundleSubmitter {
    directory: RelayDirectory,
    api: Arc<dyn RelayApi>,
    in_flight: Arc<DashMap<B256, ()>>,
    relay_count: usize,
    relay_timeout: Duration,
}

impl BundleSubmitter {
    pub fn new(directory: RelayDirectory, api: Arc<dyn RelayApi>, config: &ShieldConfig) -> Self {
        Self {
            directory,
            api,
            in_flight: Arc::new(DashMap::new()),
            relay_count: config.submit_relay_count,
            relay_timeout: Duration::from_secs(config.relay_timeout_secs),
        }
    }

    /// Submit to the top relays concurrently. Err(SubmissionInFlight) when
    /// the same bundle identity is already being submitted; the identity is
    /// released once this call returns.
    pub async fn submit(&self, bundle: &Bundle) -> Result<SubmissionReport> {
        if self.in_flight.insert(bundle.id, ()).is_some() {
            return Err(ShieldError::SubmissionInFlight(bundle.id).into());
        }
        let _guard = InFlightGuard {
            in_flight: Arc::clone(&self.in_flight),
            id: bundle.id,
        };

        let relays = self.directory.select_top(self.relay_count);
        if relays.is_empty() {
            warn!("No active relays available for bundle {:?}", bundle.id);
            return Err(ShieldError::AllRelaysFailed.into());
        }

        debug!(
            "Submitting bundle {:?} to {} relays (target block {})",
            bundle.id,
            relays.len(),
            bundle.target_block
        );

        let attempts = relays.iter().map(|relay| self.attempt(relay, bundle));
        let outcomes = join_all(attempts).await;

        for outcome in &outcomes {
            self.directory
                .record_outcome(&outcome.relay, outcome.accepted, outcome.latency_ms);
        }

        let accepted = outcomes.iter().any(|o| o.accepted);
        if accepted {
            info!(
                "Bundle {:?} accepted by {}/{} relays",
                bundle.id,
                outcomes.iter().filter(|o| o.accepted).count(),
                outcomes.len()
            );
        } else {
            warn!("Bundle {:?} rejected by all {} relays", bundle.id, outcomes.len());
        }

        Ok(SubmissionReport {
            bundle_id: bundle.id,
            accepted,
            outcomes,
        })
    }

    async fn attempt(&self, relay: &RelayProfile, bundle: &Bundle) -> SubmissionOutcome {
        let started = Instant::now();
        let result = tokio::time::timeout(
            self.relay_timeout,
            self.api.send_bundle(relay, bundle),
        )
        .await;
        let latency_ms = started.elapsed().as_millis() as u64;

        let (accepted, error) = match result {
            Ok(Ok(())) => (true, None),
            Ok(Err(e)) => (false, Some(e.to_string())),
            Err(_) => (
                false,
                Some(format!("Timed out after {:?}", self.relay_timeout)),
            ),
        };

        SubmissionOutcome {
            bundle_id: bundle.id,
            relay: relay.name.clone(),
            accepted,
            error,
            latency_ms,
        }
    }
}
