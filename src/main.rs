//! MEV Shield Bot (mempool threat detection + protected submission host)
//!
//! Main entry point. Watches the pending-transaction feed, maintains the
//! TTL'd pending store, and launches the full protection pipeline
//! (analyze → plan → simulate → submit → monitor) for every pending
//! transaction addressed to a protected destination, carrying the observed
//! signed payload as the bundle's single leg. Mined blocks clear included
//! hashes from the store and feed the post-hoc sandwich detector that tunes
//! the pattern library.
//!
//! Architecture:
//! - Loads .env.<chain> at startup, relays.toml for the relay directory
//! - Two WS connections: one for RPC calls, one dedicated to subscriptions
//! - Main loop: select! over pending txs, new blocks, eviction tick, signals
//! - SIGINT/SIGTERM flips the shared cancellation flag and drains
//! - Auto-exit on WS stream end (restart via tmux/supervisor)

use anyhow::{Context, Result};
use clap::Parser;
use futures::StreamExt;
use signal_hook::consts::{SIGINT, SIGTERM};
use signal_hook_tokio::Signals;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn, Level};

use alloy::consensus::Transaction as _;
use alloy::eips::eip2718::Encodable2718;
use alloy::primitives::{Address, TxHash, U256};
use alloy::providers::{Provider, ProviderBuilder, WsConnect};
use alloy::rpc::types::Transaction;

use mevshield_bot::bundle::{
    BundleOptions, BundleSimulator, BundleSubmitter, HttpRelayApi, RelayApi, RelayDirectory,
};
use mevshield_bot::chain::{PollingBlockFeed, RpcChainState};
use mevshield_bot::config::load_config_from_file;
use mevshield_bot::mempool::{AnalysisContext, PatternLibrary, PendingTxStore, ThreatAnalyzer};
use mevshield_bot::pipeline::{OpportunityPipeline, PipelineOutcome};
use mevshield_bot::types::{BundleLeg, CandidateTransaction};

/// MEV Shield Bot — Multi-Chain (Polygon, Base)
#[derive(Parser)]
#[command(name = "mevshield-bot")]
struct Args {
    /// Chain to run on (polygon, base)
    #[arg(short, long, env = "CHAIN", default_value = "polygon")]
    chain: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_max_level(Level::INFO)
        .with_target(false)
        .init();

    // Parse CLI args (--chain polygon|base, or CHAIN env var)
    let args = Args::parse();
    let chain = args.chain.to_lowercase();

    match chain.as_str() {
        "polygon" | "base" => {}
        _ => anyhow::bail!("Unsupported chain: '{}'. Supported: polygon, base", chain),
    }

    info!("MEV Shield Bot Starting — chain: {}", chain);

    // Load chain-specific .env file (e.g., .env.polygon, .env.base)
    let env_file = format!(".env.{}", chain);
    let config = load_config_from_file(&env_file)?;
    info!(
        "Configuration loaded from {} (chain_id: {})",
        env_file, config.chain_id
    );
    info!("RPC URL: {}", &config.rpc_url[..40.min(config.rpc_url.len())]);
    info!("Protected destinations: {}", config.protected_addresses.len());
    info!(
        "Analysis budget: {}ms | pending TTL: {}s | monitor window: {} blocks",
        config.analysis_budget_ms, config.pending_ttl_secs, config.max_monitor_blocks
    );

    // Relay directory from seed file (selection + feedback state)
    let directory = match &config.relays_file {
        Some(path) => RelayDirectory::from_file(path)?,
        None => {
            warn!("RELAYS_FILE not set — relay directory starts empty");
            RelayDirectory::new()
        }
    };
    info!("Relay directory: {} profiles", directory.len());
    for relay in directory.select_top(config.submit_relay_count) {
        info!(
            "  Relay '{}' score={:.3} latency={:.0}ms",
            relay.name,
            relay.score(),
            relay.avg_latency_ms
        );
    }

    // Two WS connections to avoid subscription contention:
    // Provider 1: RPC calls (gas price, block bodies)
    // Provider 2: subscriptions only (newPendingTransactions + newHeads)
    info!(
        "Connecting to {} via WebSocket (RPC + subscription)...",
        config.chain_name
    );
    let provider = ProviderBuilder::new()
        .connect_ws(WsConnect::new(&config.rpc_url))
        .await
        .context("Failed to connect RPC WebSocket")?;
    let sub_provider = ProviderBuilder::new()
        .connect_ws(WsConnect::new(&config.rpc_url))
        .await
        .context("Failed to connect subscription WebSocket")?;

    let current_block = provider.get_block_number().await?;
    info!("Connected! Current block: {} (2 WS connections)", current_block);

    // Shared components
    let store = PendingTxStore::new(Duration::from_secs(config.pending_ttl_secs));
    let patterns = Arc::new(PatternLibrary::builtin());
    let analyzer = Arc::new(ThreatAnalyzer::new(
        store.clone(),
        Arc::clone(&patterns),
        Duration::from_secs(config.threat_ttl_secs),
        Duration::from_millis(config.analysis_budget_ms),
    ));
    let protected: HashSet<Address> = config.protected_addresses.iter().copied().collect();

    if protected.is_empty() {
        warn!("No protected destinations configured — observe-only mode");
    }

    // Cancellation flag shared with every pipeline instance
    let (cancel_tx, cancel_rx) = tokio::sync::watch::channel(false);

    // Protection pipeline: RPC-backed simulation, HTTPS relay fan-out,
    // polling inclusion monitor
    let relay_api: Arc<dyn RelayApi> = Arc::new(HttpRelayApi::new()?);
    let submitter = Arc::new(BundleSubmitter::new(directory.clone(), relay_api, &config));
    let chain_state = Arc::new(RpcChainState::new(provider.clone()));
    let simulator = Arc::new(BundleSimulator::new(chain_state, config.beneficiary));
    let pipeline = Arc::new(OpportunityPipeline::new(
        Arc::clone(&analyzer),
        simulator,
        submitter,
        &config,
        cancel_rx.clone(),
    ));

    // Subscriptions
    info!("Subscribing to pending transactions and new blocks...");
    let mut pending_stream = sub_provider
        .subscribe_full_pending_transactions()
        .await
        .context("Pending transaction subscription failed")?
        .into_stream();
    let mut block_stream = sub_provider
        .subscribe_blocks()
        .await
        .context("Block subscription failed")?
        .into_stream();
    info!("Subscriptions active — watching the mempool in real-time");

    let mut signals = Signals::new([SIGINT, SIGTERM])?;
    let mut evict_interval =
        tokio::time::interval(Duration::from_secs(config.evict_interval_secs));
    // First tick fires immediately; skip it
    evict_interval.tick().await;

    let mut observed: u64 = 0;
    let mut analyzed: u64 = 0;

    loop {
        tokio::select! {
            maybe_tx = pending_stream.next() => {
                let Some(tx) = maybe_tx else {
                    error!("Pending transaction stream ended — exiting for restart");
                    break;
                };
                let Some(candidate) = to_candidate(&tx) else {
                    // Contract creations have no destination to correlate on
                    continue;
                };
                store.record(candidate.clone());
                observed += 1;
                if observed % 1000 == 0 {
                    info!(
                        "Observed {} pending txs | store size {} | {} analyzed",
                        observed, store.len(), analyzed
                    );
                }

                if !protected.contains(&candidate.to) {
                    continue;
                }
                analyzed += 1;

                let pipeline = Arc::clone(&pipeline);
                let store = store.clone();
                let rpc = provider.clone();
                let cancel = cancel_rx.clone();
                let chain_id = config.chain_id;
                tokio::spawn(async move {
                    if *cancel.borrow() {
                        return;
                    }
                    let hash = candidate.effective_hash();
                    let Some(leg) = to_leg(&tx, chain_id) else {
                        return;
                    };
                    let standard_gas_price = match rpc.get_gas_price().await {
                        Ok(gp) => Some(U256::from(gp)),
                        Err(e) => {
                            warn!("Gas price query failed: {} — anomaly check skipped", e);
                            None
                        }
                    };
                    let ctx = AnalysisContext {
                        standard_gas_price,
                        ..Default::default()
                    };

                    let target_block = match rpc.get_block_number().await {
                        Ok(head) => head + 1,
                        Err(e) => {
                            warn!("Head query failed for {:?}: {}", hash, e);
                            return;
                        }
                    };
                    let mut feed = PollingBlockFeed::new(
                        rpc,
                        target_block - 1,
                        Duration::from_millis(500),
                    );

                    let result = pipeline
                        .run(
                            &candidate,
                            &ctx,
                            vec![leg],
                            target_block,
                            BundleOptions::default(),
                            &mut feed,
                        )
                        .await;
                    store.mark_analyzed(&hash);

                    let report = match result {
                        Ok(report) => report,
                        Err(e) => {
                            warn!("Pipeline failed for {:?}: {}", hash, e);
                            return;
                        }
                    };

                    if !report.threat.threats.is_empty() || report.threat.degraded {
                        warn!(
                            "🛡 Threats for {:?}: level={:?}{} | {} records | slippage {:?} bps",
                            hash,
                            report.threat.level,
                            if report.threat.degraded { " (degraded)" } else { "" },
                            report.threat.threats.len(),
                            report.adjusted_slippage_bps
                        );
                        for threat in &report.threat.threats {
                            info!(
                                "  {} severity={:?} confidence={:.2} offender={:?}",
                                threat.threat_type, threat.severity, threat.confidence,
                                threat.offending_tx
                            );
                        }
                    }
                    match &report.outcome {
                        PipelineOutcome::Executed => info!(
                            "Bundle {:?} for {:?} fully included",
                            report.bundle_id, hash
                        ),
                        PipelineOutcome::Expired => warn!(
                            "Bundle {:?} for {:?} expired without full inclusion",
                            report.bundle_id, hash
                        ),
                        PipelineOutcome::Rejected(reason) => {
                            debug!("Candidate {:?} stopped: {}", hash, reason)
                        }
                        PipelineOutcome::Cancelled => {
                            debug!("Candidate {:?} pipeline cancelled", hash)
                        }
                    }
                });
            }

            maybe_header = block_stream.next() => {
                let Some(header) = maybe_header else {
                    error!("Block stream ended — exiting for restart");
                    break;
                };
                let block_number = header.number;

                let store = store.clone();
                let analyzer = Arc::clone(&analyzer);
                let rpc = provider.clone();
                tokio::spawn(async move {
                    match rpc.get_block_by_number(block_number.into()).full().await {
                        Ok(Some(block)) => {
                            let txs: Vec<Transaction> =
                                block.transactions.into_transactions().collect();
                            let hashes: Vec<TxHash> =
                                txs.iter().map(|t| *t.inner.tx_hash()).collect();
                            let cleared = store.mark_included(&hashes);
                            if cleared > 0 {
                                info!(
                                    "Block {}: {} pending txs confirmed",
                                    block_number, cleared
                                );
                            }

                            // Post-hoc sandwich scan feeds the pattern library
                            let candidates: Vec<CandidateTransaction> =
                                txs.iter().filter_map(to_candidate).collect();
                            let found = analyzer.analyze_mined_block(&candidates);
                            if !found.is_empty() {
                                warn!(
                                    "Block {}: {} mined sandwich patterns recorded",
                                    block_number,
                                    found.len()
                                );
                            }
                        }
                        Ok(None) => warn!("Block {} not found on fetch", block_number),
                        Err(e) => warn!("Block {} fetch failed: {}", block_number, e),
                    }
                });
            }

            _ = evict_interval.tick() => {
                let evicted = store.evict_expired(Instant::now());
                if evicted > 0 {
                    info!("Evicted {} expired pending txs ({} remain)", evicted, store.len());
                }
            }

            maybe_signal = signals.next() => {
                if let Some(signal) = maybe_signal {
                    info!("Received signal {} — shutting down", signal);
                    let _ = cancel_tx.send(true);
                    break;
                }
            }
        }
    }

    info!(
        "Shutdown: {} pending txs observed, {} analyzed, store size {}",
        observed, analyzed, store.len()
    );
    Ok(())
}

/// Pending-feed transaction → single protected bundle leg carrying the raw
/// signed payload. None for contract creations.
fn to_leg(tx: &Transaction, default_chain_id: u64) -> Option<BundleLeg> {
    let target = tx.inner.to()?;
    let gas_price = tx
        .inner
        .gas_price()
        .unwrap_or_else(|| tx.inner.max_fee_per_gas());
    Some(BundleLeg {
        payload: tx.inner.inner().encoded_2718().into(),
        sender: tx.inner.signer(),
        nonce: tx.inner.nonce(),
        gas_price: U256::from(gas_price),
        gas_limit: tx.inner.gas_limit(),
        target,
        value: tx.inner.value(),
        input: tx.inner.input().clone(),
        chain_id: tx.inner.chain_id().unwrap_or(default_chain_id),
        may_revert: false,
    })
}

/// Pending-feed transaction → candidate. None for contract creations.
fn to_candidate(tx: &Transaction) -> Option<CandidateTransaction> {
    let to = tx.inner.to()?;
    let gas_price = tx
        .inner
        .gas_price()
        .unwrap_or_else(|| tx.inner.max_fee_per_gas());
    Some(CandidateTransaction {
        from: tx.inner.signer(),
        to,
        value: tx.inner.value(),
        gas_price: U256::from(gas_price),
        gas_limit: tx.inner.gas_limit(),
        input: tx.inner.input().clone(),
        hash: Some(*tx.inner.tx_hash()),
    })
}
