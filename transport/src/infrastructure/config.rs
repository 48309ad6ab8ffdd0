//! Transport endpoint configuration

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// One stage's outbound endpoint.
///
/// `channel` and `stream_id` identify the endpoint; `directory` names the
/// shared-memory directory for transports that need one; `timeout_ms` bounds
/// how long `initialize` waits for the endpoint to connect.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EndpointConfig {
    #[serde(default = "default_channel")]
    pub channel: String,
    #[serde(default = "default_stream_id")]
    pub stream_id: i32,
    #[serde(default = "default_directory")]
    pub directory: String,
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: i64,
}

fn default_channel() -> String {
    "inproc".to_string()
}

fn default_stream_id() -> i32 {
    1001
}

fn default_directory() -> String {
    "/tmp/dc-pipeline".to_string()
}

fn default_timeout_ms() -> i64 {
    5_000
}

impl Default for EndpointConfig {
    fn default() -> Self {
        Self {
            channel: default_channel(),
            stream_id: default_stream_id(),
            directory: default_directory(),
            timeout_ms: default_timeout_ms(),
        }
    }
}

impl EndpointConfig {
    pub fn with_stream_id(stream_id: i32) -> Self {
        Self {
            stream_id,
            ..Default::default()
        }
    }

    /// Connection timeout as a duration (non-positive values mean zero).
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms.max(0) as u64)
    }
}
