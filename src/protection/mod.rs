//! Protection planning
//!
//! Maps threat records to a prioritized list of protective actions plus a
//! slippage adjustment, per the severity ladder.

pub mod planner;

pub use planner::{ProtectionPlan, ProtectionPlanner};
