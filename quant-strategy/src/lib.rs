//! Pure decision logic for the perpetual-futures market maker.
//!
//! Everything in this crate is a pure function or a small, explicitly-owned
//! state machine: no I/O, no clocks besides the `now_ms` passed in by the
//! caller, no async. The stateful orchestration (market-data cache, order
//! tracker, venue adapters, the tick loop itself) lives in `quant-core`,
//! which depends on this crate rather than the other way around.

pub mod decision;
pub mod features;
pub mod overlay;
pub mod params;
pub mod planner;
pub mod types;

#[cfg(test)]
pub mod test_helpers;

pub use decision::{DecisionEngine, DecisionOutput};
pub use features::FeatureEngine;
pub use overlay::{OverlayConfig, ParamsOverlay};
pub use params::StrategyParams;
pub use planner::ExecutionPlanner;
pub use types::*;
