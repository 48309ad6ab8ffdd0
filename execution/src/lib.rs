//! Execution stage
//!
//! Consumes orders, fills them (simulated, or handed to a live adapter),
//! keeps the append-only trade history, and maintains performance metrics
//! under a single critical section per order.

pub mod adapter;
pub mod error;
pub mod metrics;
pub mod pnl;
pub mod simulator;
pub mod stage;

pub use adapter::{AdapterError, ExecutionAdapter, FillDetails, OrderHandle};
pub use error::ExecutionError;
pub use metrics::{PerformanceMetrics, PerformanceTracker};
pub use pnl::{LastPricePnl, PnlModel};
pub use simulator::SimulatedExecutor;
pub use stage::{ExecutionConfig, ExecutionStage};
