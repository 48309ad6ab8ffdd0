//! Market-data stage
//!
//! Consumes serialized ticks, drives the online directional-change detector,
//! and publishes a DC signal downstream whenever a reversal is confirmed.

pub mod detector;
pub mod error;
pub mod stage;

pub use detector::DcDetector;
pub use error::MarketDataError;
pub use stage::{MarketDataConfig, MarketDataStage, MarketDataStatistics};
