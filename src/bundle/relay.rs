//! Relay Directory
//!
//! Registry of private relay endpoints with live quality feedback. The
//! submitter asks for the top-N relays by score (reputation × success rate)
//! and reports every attempt back so the scores track reality.
//!
//! Feedback uses an exponential moving average with a 0.95/0.05 split, so a
//! single flaky response nudges a relay down instead of burying it.

use anyhow::{Context, Result};
use dashmap::DashMap;
use serde::Deserialize;
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::types::RelayProfile;

const EMA_KEEP: f64 = 0.95;
const EMA_SAMPLE: f64 = 0.05;
// Latency moves faster than quality; it is a tie-breaker, not a score input.
const LATENCY_KEEP: f64 = 0.8;

/// Seed entry in relays.toml. New relays start at neutral reputation with a
/// clean success rate so they get a chance to be selected.
#[derive(Debug, Deserialize)]
struct RelaySeed {
    name: String,
    endpoint: String,
    #[serde(default)]
    auth_header: Option<String>,
    #[serde(default = "default_reputation")]
    reputation: f64,
    #[serde(default = "default_success_rate")]
    success_rate: f64,
    #[serde(default)]
    capabilities: Vec<String>,
    #[serde(default = "default_active")]
    active: bool,
}

fn default_reputation() -> f64 {
    50.0
}

fn default_success_rate() -> f64 {
    1.0
}

fn default_active() -> bool {
    true
}

#[derive(Debug, Deserialize)]
struct RelaysFile {
    relay: Vec<RelaySeed>,
}

/// Thread-safe relay registry. Clone shares the underlying map.
#[derive(Clone)]
pub struct RelayDirectory {
    relays: Arc<DashMap<String, RelayProfile>>,
}

impl RelayDirectory {
    pub fn new() -> Self {
        Self {
            relays: Arc::new(DashMap::new()),
        }
    }

    /// Load seed profiles from a relays.toml file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read relay file {}", path.display()))?;
        let directory = Self::from_toml(&raw)
            .with_context(|| format!("Failed to parse relay file {}", path.display()))?;
        info!(
            "Loaded {} relay profiles from {}",
            directory.len(),
            path.display()
        );
        Ok(directory)
    }

    pub fn from_toml(raw: &str) -> Result<Self> {
        let file: RelaysFile = toml::from_str(raw)?;
        let directory = Self::new();
        for seed in file.relay {
            directory.register(RelayProfile {
                name: seed.name,
                endpoint: seed.endpoint,
                auth_header: seed.auth_header,
                reputation: seed.reputation,
                success_rate: seed.success_rate,
                avg_latency_ms: 0.0,
                capabilities: seed.capabilities,
                active: seed.active,
            });
        }
        Ok(directory)
    }

    /// Insert or replace a profile keyed by relay name.
    pub fn register(&self, profile: RelayProfile) {
        debug!(
            "Registered relay '{}' at {} (score {:.3})",
            profile.name,
            profile.endpoint,
            profile.score()
        );
        self.relays.insert(profile.name.clone(), profile);
    }

    /// Top-N active relays: score descending, latency ascending on ties,
    /// then name for a deterministic order.
    pub fn select_top(&self, n: usize) -> Vec<RelayProfile> {
        let mut active: Vec<RelayProfile> = self
            .relays
            .iter()
            .filter(|entry| entry.value().active)
            .map(|entry| entry.value().clone())
            .collect();

        active.sort_by(|a, b| {
            b.score()
                .partial_cmp(&a.score())
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| {
                    a.avg_latency_ms
                        .partial_cmp(&b.avg_latency_ms)
                        .unwrap_or(std::cmp::Ordering::Equal)
                })
                .then_with(|| a.name.cmp(&b.name))
        });

        active.truncate(n);
        active
    }

    /// Fold one submission attempt into the relay's running averages.
    /// Called for every attempt whether or not the quorum was already met.
    pub fn record_outcome(&self, name: &str, accepted: bool, latency_ms: u64) {
        let Some(mut entry) = self.relays.get_mut(name) else {
            warn!("Outcome reported for unknown relay '{}'", name);
            return;
        };

        let sample = if accepted { 1.0 } else { 0.0 };
        entry.success_rate = EMA_KEEP * entry.success_rate + EMA_SAMPLE * sample;
        entry.reputation = EMA_KEEP * entry.reputation + EMA_SAMPLE * sample * 100.0;
        entry.avg_latency_ms = if entry.avg_latency_ms == 0.0 {
            latency_ms as f64
        } else {
            LATENCY_KEEP * entry.avg_latency_ms + (1.0 - LATENCY_KEEP) * latency_ms as f64
        };

        debug!(
            "Relay '{}' feedback: accepted={}, success_rate={:.4}, reputation={:.2}, latency={:.0}ms",
            name, accepted, entry.success_rate, entry.reputation, entry.avg_latency_ms
        );
    }

    pub fn set_active(&self, name: &str, active: bool) {
        if let Some(mut entry) = self.relays.get_mut(name) {
            entry.active = active;
        }
    }

    pub fn get(&self, name: &str) -> Option<RelayProfile> {
        self.relays.get(name).map(|entry| entry.value().clone())
    }

    pub fn len(&self) -> usize {
        self.relays.len()
    }

    pub fn is_empty(&self) -> bool {
        self.relays.is_empty()
    }
}

impl Default for RelayDirectory {
    fn default() -> Self {
        Self::new()
    }
}
