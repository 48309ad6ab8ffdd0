//! Infrastructure layer - concrete transport implementations
//!
//! Channel: in-process pub/sub via crossbeam bounded channels, the default
//! for single-process pipelines and simulation.

pub mod channel;
pub mod config;

pub use channel::{channel_pair, ChannelPublication, ChannelSubscription};
pub use config::EndpointConfig;
