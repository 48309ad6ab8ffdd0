//! Volatility-regime classification
//!
//! A threshold classifier on the per-second move rate of incoming DC
//! signals. This is a deliberate stand-in for a two-state HMM: the interface
//! (state enum, leverage mapping) is what downstream code depends on, so a
//! real HMM can replace the classification without touching callers.

use dc_transport::DcSignalMessage;
use serde::{Deserialize, Serialize};

const LOW_VOLATILITY_THRESHOLD: f64 = 0.1;
const HIGH_VOLATILITY_THRESHOLD: f64 = 0.5;

/// Coarse market volatility state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum MarketState {
    #[default]
    Unknown,
    LowVolatility,
    HighVolatility,
}

impl MarketState {
    /// Leverage multiplier applied to order sizing in this state.
    pub fn leverage(self) -> f64 {
        match self {
            MarketState::LowVolatility => 1.5,
            MarketState::HighVolatility => 0.5,
            MarketState::Unknown => 1.0,
        }
    }
}

/// Threshold-based regime classifier.
#[derive(Debug, Clone, Default)]
pub struct RegimeClassifier {
    state: MarketState,
}

impl RegimeClassifier {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fold one DC signal into the regime state and return the new state.
    ///
    /// The volatility indicator is the absolute move extent per second.
    /// Values between the two thresholds (or an unusable duration) retain
    /// the prior state.
    pub fn observe(&mut self, signal: &DcSignalMessage) -> MarketState {
        if signal.duration_ns > 0 {
            let duration_seconds = signal.duration_ns as f64 / 1e9;
            let volatility = signal.tmv_ext.abs() / duration_seconds;

            let new_state = if volatility < LOW_VOLATILITY_THRESHOLD {
                MarketState::LowVolatility
            } else if volatility > HIGH_VOLATILITY_THRESHOLD {
                MarketState::HighVolatility
            } else {
                self.state
            };

            if new_state != self.state {
                tracing::info!(
                    target: "Strategy",
                    from = ?self.state,
                    to = ?new_state,
                    volatility,
                    "market state changed"
                );
                self.state = new_state;
            }
        }
        self.state
    }

    #[inline]
    pub fn state(&self) -> MarketState {
        self.state
    }

    /// Leverage multiplier for the current state.
    #[inline]
    pub fn leverage(&self) -> f64 {
        self.state.leverage()
    }

    pub fn reset(&mut self) {
        self.state = MarketState::Unknown;
    }
}
