//! Provider-backed collaborators
//!
//! Adapters from the WS provider to the simulator and monitor seams.
//! `RpcChainState` approximates leg execution with eth_estimateGas against
//! the node's latest state — legs do not observe each other's effects, so
//! inter-leg dependencies only surface in a relay-side simulation.
//! `PollingBlockFeed` walks the chain head one block at a time for the
//! inclusion monitor, never skipping a block even when the head jumps.

use anyhow::Result;
use async_trait::async_trait;
use std::time::Duration;

use alloy::consensus::Transaction as _;
use alloy::primitives::{Address, TxKind, U256};
use alloy::providers::Provider;
use alloy::rpc::types::{TransactionInput, TransactionRequest};

use crate::bundle::{BlockFeed, ChainStateClient, LegExecution, StateSnapshot};
use crate::types::{BlockInfo, BundleLeg};

/// Chain-state queries over the RPC provider.
pub struct RpcChainState<P> {
    provider: P,
}

impl<P> RpcChainState<P> {
    pub fn new(provider: P) -> Self {
        Self { provider }
    }
}

#[async_trait]
impl<P: Provider + Clone + 'static> ChainStateClient for RpcChainState<P> {
    async fn open_snapshot(&self, _block: u64) -> Result<Box<dyn StateSnapshot>> {
        Ok(Box::new(RpcSnapshot {
            provider: self.provider.clone(),
        }))
    }

    async fn standard_gas_price(&self) -> Result<U256> {
        Ok(U256::from(self.provider.get_gas_price().await?))
    }
}

struct RpcSnapshot<P> {
    provider: P,
}

#[async_trait]
impl<P: Provider + 'static> StateSnapshot for RpcSnapshot<P> {
    async fn execute(&mut self, leg: &BundleLeg) -> Result<LegExecution> {
        let request = TransactionRequest {
            from: Some(leg.sender),
            to: Some(TxKind::Call(leg.target)),
            gas: Some(leg.gas_limit),
            value: Some(leg.value),
            input: TransactionInput::new(leg.input.clone()),
            ..Default::default()
        };
        match self.provider.estimate_gas(request).await {
            Ok(gas_used) => Ok(LegExecution {
                success: true,
                gas_used,
                error: None,
            }),
            Err(e) => Ok(LegExecution {
                success: false,
                gas_used: leg.gas_limit,
                error: Some(e.to_string()),
            }),
        }
    }

    async fn balance(&self, address: Address) -> Result<U256> {
        Ok(self.provider.get_balance(address).await?)
    }
}

/// Block feed over plain RPC polling. Dedicated subscriptions per pipeline
/// would multiply WS load, so the monitor path polls the head instead.
pub struct PollingBlockFeed<P> {
    provider: P,
    last_seen: u64,
    poll_interval: Duration,
}

impl<P> PollingBlockFeed<P> {
    /// `start_after`: the last block the caller has already seen; the feed
    /// yields `start_after + 1` onward.
    pub fn new(provider: P, start_after: u64, poll_interval: Duration) -> Self {
        Self {
            provider,
            last_seen: start_after,
            poll_interval,
        }
    }
}

#[async_trait]
impl<P: Provider + 'static> BlockFeed for PollingBlockFeed<P> {
    async fn next_block(&mut self) -> Result<Option<BlockInfo>> {
        loop {
            let head = self.provider.get_block_number().await?;
            if head > self.last_seen {
                let number = self.last_seen + 1;
                if let Some(block) = self
                    .provider
                    .get_block_by_number(number.into())
                    .full()
                    .await?
                {
                    self.last_seen = number;
                    let tx_hashes = block
                        .transactions
                        .into_transactions()
                        .map(|tx| *tx.inner.tx_hash())
                        .collect();
                    return Ok(Some(BlockInfo {
                        number,
                        timestamp: block.header.timestamp,
                        tx_hashes,
                    }));
                }
                // Head advanced but the block body lags on this endpoint;
                // retry on the next poll
            }
            tokio::time::sleep(self.poll_interval).await;
        }
    }
}
