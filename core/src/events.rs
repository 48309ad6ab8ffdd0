//! Domain events and records shared across the pipeline stages

use serde::{Deserialize, Serialize};
use std::fmt;

/// Fixed-width 16-byte ASCII symbol identifier.
///
/// Stored NUL-padded so it maps 1:1 onto the wire layout. Constructors
/// truncate longer inputs; rendering trims the padding.
#[derive(Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Symbol([u8; 16]);

impl Symbol {
    pub const LEN: usize = 16;

    /// Create a symbol from a string, truncating to 16 bytes.
    pub fn new(s: &str) -> Self {
        let mut buf = [0u8; Self::LEN];
        let bytes = s.as_bytes();
        let n = bytes.len().min(Self::LEN);
        buf[..n].copy_from_slice(&bytes[..n]);
        Symbol(buf)
    }

    /// Reconstruct a symbol from its raw wire bytes.
    pub fn from_bytes(bytes: [u8; 16]) -> Self {
        Symbol(bytes)
    }

    /// Raw NUL-padded bytes, as laid out on the wire.
    pub fn as_bytes(&self) -> &[u8; 16] {
        &self.0
    }

    /// The symbol text without trailing padding.
    pub fn as_str(&self) -> &str {
        let end = self.0.iter().position(|&b| b == 0).unwrap_or(Self::LEN);
        std::str::from_utf8(&self.0[..end]).unwrap_or("")
    }

    pub fn is_empty(&self) -> bool {
        self.0[0] == 0
    }
}

impl fmt::Debug for Symbol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Symbol({})", self.as_str())
    }
}

impl fmt::Display for Symbol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<&str> for Symbol {
    fn from(s: &str) -> Self {
        Symbol::new(s)
    }
}

/// A single market data point. Immutable once produced.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Tick {
    /// Nanoseconds since epoch
    pub timestamp_ns: i64,
    pub price: f64,
    pub volume: f64,
    pub symbol: Symbol,
}

impl Tick {
    pub fn new(timestamp_ns: i64, price: f64, volume: f64, symbol: Symbol) -> Self {
        Self {
            timestamp_ns,
            price,
            volume,
            symbol,
        }
    }
}

/// Current trend direction tracked by the DC detector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Trend {
    #[default]
    Unknown,
    Up,
    Down,
}

/// Kind of a confirmed directional change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DcEventKind {
    /// Price recovered by at least theta from the extreme low
    Upturn,
    /// Price fell by at least theta from the extreme high
    Downturn,
}

impl DcEventKind {
    /// Wire code (0 is reserved for "no event").
    pub fn code(self) -> i32 {
        match self {
            DcEventKind::Upturn => 1,
            DcEventKind::Downturn => 2,
        }
    }

    pub fn from_code(code: i32) -> Option<Self> {
        match code {
            1 => Some(DcEventKind::Upturn),
            2 => Some(DcEventKind::Downturn),
            _ => None,
        }
    }
}

/// A confirmed directional-change event.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DcEvent {
    pub kind: DcEventKind,
    /// Timestamp of the confirming tick
    pub timestamp_ns: i64,
    /// Price of the confirming tick
    pub price: f64,
    /// Total move extent, normalized by previous_extreme * theta
    pub tmv_ext: f64,
    /// Time from the prior confirmation to the extremum that reversed
    pub duration_ns: i64,
    /// (tmv_ext / duration_seconds) * theta; 0.0 when duration <= 0
    pub time_adjusted_return: f64,
}

/// Order side produced by the strategy stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Side {
    Buy,
    Sell,
    Hold,
}

impl Side {
    /// Wire code (0 is reserved for "no order").
    pub fn code(self) -> i32 {
        match self {
            Side::Buy => 1,
            Side::Sell => 2,
            Side::Hold => 3,
        }
    }

    pub fn from_code(code: i32) -> Option<Self> {
        match code {
            1 => Some(Side::Buy),
            2 => Some(Side::Sell),
            3 => Some(Side::Hold),
            _ => None,
        }
    }
}

/// A trading order emitted by the strategy stage.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Order {
    pub timestamp_ns: i64,
    pub side: Side,
    pub price: f64,
    pub quantity: f64,
    pub symbol: Symbol,
    /// Time from DC signal emission to order generation, clamped at zero
    pub strategy_latency_ns: i64,
}

/// Lifecycle state of an execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ExecutionStatus {
    Pending,
    Filled,
    PartiallyFilled,
    Rejected,
    Cancelled,
}

/// One entry of the execution stage's append-only trade history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionRecord {
    pub timestamp_ns: i64,
    pub order_id: String,
    pub side: Side,
    pub filled_price: f64,
    pub filled_quantity: f64,
    pub status: ExecutionStatus,
    pub symbol: Symbol,
    /// Wall-clock time from execution enter to exit
    pub execution_latency_ns: i64,
}
