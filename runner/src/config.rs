//! System configuration
//!
//! Loaded once from JSON, read-only afterwards, and passed by value into
//! each stage's constructor. A missing or malformed file yields the
//! documented defaults alongside the failure so the caller can decide to
//! abort.

use dc_transport::EndpointConfig;
use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config file {path}: {source}")]
    Parse {
        path: String,
        #[source]
        source: serde_json::Error,
    },
}

/// Per-stage transport endpoints.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransportSection {
    #[serde(default = "default_market_data_endpoint")]
    pub market_data: EndpointConfig,
    #[serde(default = "default_strategy_endpoint")]
    pub strategy: EndpointConfig,
    #[serde(default = "default_execution_endpoint")]
    pub execution: EndpointConfig,
    /// Bounded channel capacity (back-pressure threshold)
    #[serde(default = "default_channel_capacity")]
    pub channel_capacity: usize,
}

fn default_market_data_endpoint() -> EndpointConfig {
    EndpointConfig::with_stream_id(1001)
}

fn default_strategy_endpoint() -> EndpointConfig {
    EndpointConfig::with_stream_id(1002)
}

fn default_execution_endpoint() -> EndpointConfig {
    EndpointConfig::with_stream_id(1003)
}

fn default_channel_capacity() -> usize {
    100_000
}

impl Default for TransportSection {
    fn default() -> Self {
        Self {
            market_data: default_market_data_endpoint(),
            strategy: default_strategy_endpoint(),
            execution: default_execution_endpoint(),
            channel_capacity: default_channel_capacity(),
        }
    }
}

/// DC detector settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DcStrategySection {
    #[serde(default = "default_theta")]
    pub theta: f64,
    #[serde(default = "default_true")]
    pub enable_tmv_calculation: bool,
    #[serde(default = "default_true")]
    pub enable_time_adjustment: bool,
}

fn default_theta() -> f64 {
    0.004
}

fn default_true() -> bool {
    true
}

impl Default for DcStrategySection {
    fn default() -> Self {
        Self {
            theta: default_theta(),
            enable_tmv_calculation: true,
            enable_time_adjustment: true,
        }
    }
}

/// Strategy stage settings.
///
/// `hmm_states` and `hmm_max_iterations` are accepted for the future HMM
/// regime detector; the shipped threshold classifier does not consume them.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StrategySettingsSection {
    #[serde(default = "default_strategy_name")]
    pub name: String,
    #[serde(default)]
    pub enable_hmm: bool,
    #[serde(default = "default_hmm_states")]
    pub hmm_states: u32,
    #[serde(default = "default_hmm_max_iterations")]
    pub hmm_max_iterations: u32,
    #[serde(default = "default_leverage_factor")]
    pub leverage_factor: f64,
}

fn default_strategy_name() -> String {
    "dc-strategy-v1".to_string()
}

fn default_hmm_states() -> u32 {
    2
}

fn default_hmm_max_iterations() -> u32 {
    200
}

fn default_leverage_factor() -> f64 {
    1.0
}

impl Default for StrategySettingsSection {
    fn default() -> Self {
        Self {
            name: default_strategy_name(),
            enable_hmm: false,
            hmm_states: default_hmm_states(),
            hmm_max_iterations: default_hmm_max_iterations(),
            leverage_factor: default_leverage_factor(),
        }
    }
}

/// Performance reporting settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PerformanceSection {
    #[serde(default = "default_true")]
    pub enable_latency_tracking: bool,
    #[serde(default = "default_true")]
    pub enable_performance_metrics: bool,
    #[serde(default = "default_output_file")]
    pub output_file: String,
}

fn default_output_file() -> String {
    "performance_report.json".to_string()
}

impl Default for PerformanceSection {
    fn default() -> Self {
        Self {
            enable_latency_tracking: true,
            enable_performance_metrics: true,
            output_file: default_output_file(),
        }
    }
}

/// Root system configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SystemConfig {
    #[serde(default)]
    pub transport: TransportSection,
    #[serde(default)]
    pub dc_strategy: DcStrategySection,
    #[serde(default)]
    pub strategy_settings: StrategySettingsSection,
    #[serde(default)]
    pub performance: PerformanceSection,
}

impl SystemConfig {
    /// Load from a JSON file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        serde_json::from_str(&text).map_err(|source| ConfigError::Parse {
            path: path.display().to_string(),
            source,
        })
    }

    /// Load from a JSON file, falling back to defaults on failure.
    ///
    /// The error is returned alongside the defaults so the caller can log
    /// it and abort; no worker should start on a failed load.
    pub fn load_or_default(path: impl AsRef<Path>) -> (Self, Option<ConfigError>) {
        match Self::load(path) {
            Ok(config) => (config, None),
            Err(err) => (Self::default(), Some(err)),
        }
    }
}
