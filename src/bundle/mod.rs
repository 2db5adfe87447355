//! Bundle construction, simulation, submission, and inclusion monitoring
//!
//! BundleBuilder assembles pre-signed legs into an immutable bundle with a
//! deterministic identity hash; BundleSimulator dry-runs it against a chain
//! state snapshot; RelayDirectory + BundleSubmitter fan it out to the
//! highest-scored private relays; InclusionMonitor watches the chain head
//! for the legs over a bounded block window.

pub mod builder;
pub mod monitor;
pub mod relay;
pub mod simulator;
pub mod submitter;

pub use builder::{BundleBuilder, BundleOptions};
pub use monitor::{BlockFeed, InclusionMonitor};
pub use relay::RelayDirectory;
pub use simulator::{BundleSimulator, ChainStateClient, LegExecution, StateSnapshot};
pub use submitter::{BundleSubmitter, HttpRelayApi, RelayApi};
