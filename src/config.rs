//! Configuration management
//!
//! Loads an immutable configuration snapshot from a chain-specific .env file
//! (e.g., .env.polygon). Live updates apply to subsequently created pipeline
//! instances only — there is no mid-flight reconfiguration.

use anyhow::{Context, Result};
use std::str::FromStr;

use alloy::primitives::Address;

/// Immutable configuration snapshot, captured at pipeline-host startup.
#[derive(Debug, Clone)]
pub struct ShieldConfig {
    // Network
    pub rpc_url: String,
    pub chain_id: u64,
    pub chain_name: String,

    // Address receiving bundle profits (simulation beneficiary)
    pub beneficiary: Address,

    // Destinations we protect: pending transactions to these addresses get a
    // live analysis pass. Empty list means observe-only.
    pub protected_addresses: Vec<Address>,

    // Protection parameters
    /// Base slippage tolerance in basis points (50 = 0.5%)
    pub base_slippage_bps: u32,
    /// Hard cap on adjusted slippage in basis points (300 = 3%)
    pub max_slippage_bps: u32,
    pub abort_on_sandwich: bool,
    pub private_routing_enabled: bool,
    /// Blocks to delay execution when only Medium threats are present
    pub delay_blocks: u64,

    // TTLs / intervals
    /// Pending transaction TTL in seconds
    pub pending_ttl_secs: u64,
    /// Threat record retention window in seconds
    pub threat_ttl_secs: u64,
    /// Fixed eviction interval for the pending store
    pub evict_interval_secs: u64,

    // Timeouts
    /// Analyzer time budget in milliseconds
    pub analysis_budget_ms: u64,
    /// Bundle simulation timeout in seconds
    pub simulation_timeout_secs: u64,
    /// Per-relay submission timeout in seconds
    pub relay_timeout_secs: u64,
    /// Overall submission budget in seconds
    pub submission_budget_secs: u64,

    // Submission / monitoring
    /// Number of top-scored relays to fan out to
    pub submit_relay_count: usize,
    /// Blocks beyond the target block to watch for inclusion
    pub max_monitor_blocks: u64,
    /// Relay seed file (TOML)
    pub relays_file: Option<String>,
}

/// Load configuration from a chain-specific .env file.
pub fn load_config_from_file(env_file: &str) -> Result<ShieldConfig> {
    dotenv::from_filename(env_file)
        .with_context(|| format!("Failed to load env file: {}", env_file))?;

    Ok(ShieldConfig {
        rpc_url: std::env::var("RPC_URL").context("RPC_URL not set")?,
        chain_id: env_parse("CHAIN_ID")?,
        chain_name: std::env::var("CHAIN_NAME").unwrap_or_else(|_| "polygon".to_string()),

        beneficiary: Address::from_str(
            &std::env::var("BENEFICIARY_ADDRESS").context("BENEFICIARY_ADDRESS not set")?,
        )
        .context("BENEFICIARY_ADDRESS is not a valid address")?,

        protected_addresses: parse_address_list(
            &std::env::var("PROTECTED_ADDRESSES").unwrap_or_default(),
        )?,

        base_slippage_bps: env_parse_or("BASE_SLIPPAGE_BPS", 50)?,
        max_slippage_bps: env_parse_or("MAX_SLIPPAGE_BPS", 300)?,
        abort_on_sandwich: env_parse_or("ABORT_ON_SANDWICH", false)?,
        private_routing_enabled: env_parse_or("PRIVATE_ROUTING_ENABLED", true)?,
        delay_blocks: env_parse_or("DELAY_BLOCKS", 2)?,

        pending_ttl_secs: env_parse_or("PENDING_TTL_SECS", 300)?,
        threat_ttl_secs: env_parse_or("THREAT_TTL_SECS", 300)?,
        evict_interval_secs: env_parse_or("EVICT_INTERVAL_SECS", 60)?,

        analysis_budget_ms: env_parse_or("ANALYSIS_BUDGET_MS", 200)?,
        simulation_timeout_secs: env_parse_or("SIMULATION_TIMEOUT_SECS", 10)?,
        relay_timeout_secs: env_parse_or("RELAY_TIMEOUT_SECS", 5)?,
        submission_budget_secs: env_parse_or("SUBMISSION_BUDGET_SECS", 15)?,

        submit_relay_count: env_parse_or("SUBMIT_RELAY_COUNT", 3)?,
        max_monitor_blocks: env_parse_or("MAX_MONITOR_BLOCKS", 5)?,
        relays_file: std::env::var("RELAYS_FILE").ok(),
    })
}

/// Comma-separated address list; whitespace tolerated, empty string allowed.
fn parse_address_list(raw: &str) -> Result<Vec<Address>> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| {
            Address::from_str(s)
                .with_context(|| format!("PROTECTED_ADDRESSES entry '{}' is not a valid address", s))
        })
        .collect()
}

fn env_parse<T: FromStr>(key: &str) -> Result<T>
where
    T::Err: std::error::Error + Send + Sync + 'static,
{
    std::env::var(key)
        .with_context(|| format!("{} not set", key))?
        .parse::<T>()
        .with_context(|| format!("{} is not valid", key))
}

fn env_parse_or<T: FromStr>(key: &str, default: T) -> Result<T>
where
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match std::env::var(key) {
        Ok(raw) => raw
            .parse::<T>()
            .with_context(|| format!("{} is not valid", key)),
        Err(_) => Ok(default),
    }
}

impl Default for ShieldConfig {
    /// Production defaults; used directly by module tests.
    fn default() -> Self {
        Self {
            rpc_url: String::new(),
            chain_id: 137,
            chain_name: "polygon".to_string(),
            beneficiary: Address::ZERO,
            protected_addresses: Vec::new(),
            base_slippage_bps: 50,
            max_slippage_bps: 300,
            abort_on_sandwich: false,
            private_routing_enabled: true,
            delay_blocks: 2,
            pending_ttl_secs: 300,
            threat_ttl_secs: 300,
            evict_interval_secs: 60,
            analysis_budget_ms: 200,
            simulation_timeout_secs: 10,
            relay_timeout_secs: 5,
            submission_budget_secs: 15,
            submit_relay_count: 3,
            max_monitor_blocks: 5,
            relays_file: None,
        }
    }
}
