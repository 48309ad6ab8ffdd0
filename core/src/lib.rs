//! Shared domain layer for the DC trading pipeline
//!
//! Holds the types every stage speaks (ticks, DC events, orders, execution
//! records), the latency statistics used by all three stages, and the time
//! utilities backing latency measurement.

pub mod events;
pub mod stats;
pub mod time;

// Re-export the domain vocabulary at the crate root
pub use events::{
    DcEvent, DcEventKind, ExecutionRecord, ExecutionStatus, Order, Side, Symbol, Tick, Trend,
};
pub use stats::LatencyStats;
pub use time::{Clock, LatencyTimer, ScopedLatency, SystemClock};
