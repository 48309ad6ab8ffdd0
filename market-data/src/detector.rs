//! Online directional-change detector
//!
//! Tracks one running extreme at a time and confirms a reversal once price
//! has moved against it by at least `theta`. O(1) per tick, no history kept.
//! Single-threaded by contract; the stage owns its detector exclusively.

use crate::error::MarketDataError;
use dc_core::{DcEvent, DcEventKind, Tick, Trend};

/// Directional-change detector state machine.
///
/// Confirmed events strictly alternate between upturns and downturns, and at
/// most one event is emitted per tick. `time_adjusted_return` carries the
/// sign of the move: positive for upturns, negative for downturns.
#[derive(Debug, Clone)]
pub struct DcDetector {
    theta: f64,
    trend: Trend,
    extreme_price: f64,
    extreme_ts: i64,
    last_dc_price: f64,
    last_dc_ts: i64,
    last_event: Option<DcEvent>,
}

impl DcDetector {
    /// Create a detector with the given threshold (e.g. 0.004 for 0.4%).
    pub fn new(theta: f64) -> Result<Self, MarketDataError> {
        validate_theta(theta)?;
        Ok(Self {
            theta,
            trend: Trend::Unknown,
            extreme_price: f64::NAN,
            extreme_ts: 0,
            last_dc_price: f64::NAN,
            last_dc_ts: 0,
            last_event: None,
        })
    }

    /// Process one tick. Returns the confirmed event, if any.
    pub fn update(
        &mut self,
        timestamp_ns: i64,
        price: f64,
    ) -> Result<Option<DcEvent>, MarketDataError> {
        if !price.is_finite() {
            return Err(MarketDataError::InvalidInput(format!(
                "non-finite price: {}",
                price
            )));
        }

        // First tick seeds the extreme and the DC anchor
        if self.extreme_price.is_nan() {
            self.extreme_price = price;
            self.extreme_ts = timestamp_ns;
            self.last_dc_price = price;
            self.last_dc_ts = timestamp_ns;
            return Ok(None);
        }

        let confirmed = match self.trend {
            Trend::Unknown | Trend::Up => {
                if price > self.extreme_price {
                    self.extreme_price = price;
                    self.extreme_ts = timestamp_ns;
                    None
                } else if (self.extreme_price - price) / self.extreme_price >= self.theta {
                    Some(DcEventKind::Downturn)
                } else {
                    None
                }
            }
            Trend::Down => {
                if price < self.extreme_price {
                    self.extreme_price = price;
                    self.extreme_ts = timestamp_ns;
                    None
                } else if (price - self.extreme_price) / self.extreme_price >= self.theta {
                    Some(DcEventKind::Upturn)
                } else {
                    None
                }
            }
        };

        let Some(kind) = confirmed else {
            return Ok(None);
        };

        let event = self.confirm(kind, timestamp_ns, price);
        Ok(Some(event))
    }

    /// Process one tick given as a domain record.
    pub fn process_tick(&mut self, tick: &Tick) -> Result<Option<DcEvent>, MarketDataError> {
        self.update(tick.timestamp_ns, tick.price)
    }

    fn confirm(&mut self, kind: DcEventKind, timestamp_ns: i64, price: f64) -> DcEvent {
        let tmv_ext = self.total_move_extent(price);
        let duration_ns = self.extreme_ts.saturating_sub(self.last_dc_ts);
        let time_adjusted_return = self.time_adjusted_return(kind, tmv_ext, duration_ns);

        let event = DcEvent {
            kind,
            timestamp_ns,
            price,
            tmv_ext,
            duration_ns,
            time_adjusted_return,
        };

        // The extreme that just reversed becomes the DC anchor, and the
        // confirming tick opens the new trend's extreme.
        self.last_dc_price = self.extreme_price;
        self.last_dc_ts = self.extreme_ts;
        self.extreme_price = price;
        self.extreme_ts = timestamp_ns;
        self.trend = match kind {
            DcEventKind::Upturn => Trend::Up,
            DcEventKind::Downturn => Trend::Down,
        };
        self.last_event = Some(event);

        event
    }

    /// TMV_EXT(n) = |P(n) - P_EXT(n-1)| / (P_EXT(n-1) * theta)
    fn total_move_extent(&self, price: f64) -> f64 {
        let previous_extreme = self.extreme_price;
        if previous_extreme.is_nan() || previous_extreme == 0.0 {
            return 0.0;
        }
        (price - previous_extreme).abs() / (previous_extreme * self.theta)
    }

    /// R(n) = (TMV_EXT(n) / T_seconds(n)) * theta, signed by direction.
    fn time_adjusted_return(&self, kind: DcEventKind, tmv_ext: f64, duration_ns: i64) -> f64 {
        if duration_ns <= 0 {
            return 0.0;
        }
        let duration_seconds = duration_ns as f64 / 1e9;
        let magnitude = (tmv_ext / duration_seconds) * self.theta;
        match kind {
            DcEventKind::Upturn => magnitude,
            DcEventKind::Downturn => -magnitude,
        }
    }

    /// Replace the threshold. Takes effect on the next tick.
    pub fn set_theta(&mut self, theta: f64) -> Result<(), MarketDataError> {
        validate_theta(theta)?;
        self.theta = theta;
        Ok(())
    }

    #[inline]
    pub fn theta(&self) -> f64 {
        self.theta
    }

    #[inline]
    pub fn trend(&self) -> Trend {
        self.trend
    }

    pub fn last_event(&self) -> Option<&DcEvent> {
        self.last_event.as_ref()
    }

    /// Price anchor of the most recent confirmation: the reversed extreme,
    /// or the seed tick's price before any confirmation. NaN before the
    /// first tick.
    pub fn last_dc_price(&self) -> f64 {
        self.last_dc_price
    }

    /// Timestamp paired with [`DcDetector::last_dc_price`].
    pub fn last_dc_ts(&self) -> i64 {
        self.last_dc_ts
    }

    /// Clear all state. The next tick re-seeds the extreme.
    pub fn reset(&mut self) {
        self.trend = Trend::Unknown;
        self.extreme_price = f64::NAN;
        self.extreme_ts = 0;
        self.last_dc_price = f64::NAN;
        self.last_dc_ts = 0;
        self.last_event = None;
    }
}

fn validate_theta(theta: f64) -> Result<(), MarketDataError> {
    if !theta.is_finite() || theta <= 0.0 {
        return Err(MarketDataError::InvalidInput(format!(
            "theta must be finite and positive, got {}",
            theta
        )));
    }
    Ok(())
}
