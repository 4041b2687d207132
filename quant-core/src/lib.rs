//! quant-core: the stateful orchestration around `quant-strategy`'s pure
//! decision logic — the market-data cache, order and position trackers,
//! venue adapters, the tick loop, and the ambient stack (runtime config,
//! Prometheus metrics, the persisted-event queue) a deployable agent needs.
//!
//! `quant-strategy` never depends on this crate; this crate depends on it.

pub mod cache;
pub mod config;
pub mod engine;
pub mod errors;
pub mod metrics;
pub mod persistence;
pub mod position;
pub mod resilience;
pub mod tracker;
pub mod venue;

pub use cache::MarketDataCache;
pub use config::RuntimeConfig;
pub use engine::{ParamsSource, StaticParamsSource, TickLoop, TickLoopConfig, TickOutcome};
pub use errors::{InitError, InvariantViolation, VenueError};
pub use metrics::Metrics;
pub use persistence::{EventQueue, EventSink, FileEventSink, InMemoryEventSink, PersistedEventRecord};
pub use position::PositionTracker;
pub use tracker::{OrderTracker, TrackedOrder};
pub use venue::VenuePort;
