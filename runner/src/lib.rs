//! Pipeline orchestration
//!
//! Wires the three stages over in-process channels, supervises their
//! lifecycle, and aggregates read-only statistics snapshots. The stages
//! never reference each other; all coupling goes through the transport.

pub mod config;
pub mod pipeline;
pub mod sim;

pub use config::{ConfigError, SystemConfig};
pub use pipeline::{Pipeline, PipelineError, PipelineOptions, PipelineSnapshot};
pub use sim::{TickFeed, TickFeedConfig};
