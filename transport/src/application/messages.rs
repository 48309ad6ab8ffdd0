//! Fixed-layout wire messages
//!
//! Every message crossing a stage boundary is a positional, native-byte-order
//! record with no serialization framework in between. Receivers reject any
//! frame shorter than the declared record size; round-trips are bit-exact
//! for every field.

use super::error::TransportError;
use dc_core::{DcEvent, DcEventKind, Order, Side, Symbol};

#[inline]
fn read_i64(data: &[u8], offset: usize) -> i64 {
    let mut buf = [0u8; 8];
    buf.copy_from_slice(&data[offset..offset + 8]);
    i64::from_ne_bytes(buf)
}

#[inline]
fn read_i32(data: &[u8], offset: usize) -> i32 {
    let mut buf = [0u8; 4];
    buf.copy_from_slice(&data[offset..offset + 4]);
    i32::from_ne_bytes(buf)
}

#[inline]
fn read_f64(data: &[u8], offset: usize) -> f64 {
    let mut buf = [0u8; 8];
    buf.copy_from_slice(&data[offset..offset + 8]);
    f64::from_ne_bytes(buf)
}

#[inline]
fn read_symbol(data: &[u8], offset: usize) -> [u8; 16] {
    let mut buf = [0u8; 16];
    buf.copy_from_slice(&data[offset..offset + 16]);
    buf
}

#[inline]
fn check_len(data: &[u8], expected: usize) -> Result<(), TransportError> {
    if data.len() < expected {
        return Err(TransportError::InvalidFrame {
            expected,
            actual: data.len(),
        });
    }
    Ok(())
}

/// Market data tick, 40 bytes on the wire.
///
/// Layout: `i64 timestamp_ns | f64 price | f64 volume | u8[16] symbol`
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TickMessage {
    pub timestamp_ns: i64,
    pub price: f64,
    pub volume: f64,
    pub symbol: [u8; 16],
}

impl TickMessage {
    pub const SIZE: usize = 40;

    pub fn new(timestamp_ns: i64, price: f64, volume: f64, symbol: Symbol) -> Self {
        Self {
            timestamp_ns,
            price,
            volume,
            symbol: *symbol.as_bytes(),
        }
    }

    pub fn encode(&self) -> [u8; Self::SIZE] {
        let mut buf = [0u8; Self::SIZE];
        buf[0..8].copy_from_slice(&self.timestamp_ns.to_ne_bytes());
        buf[8..16].copy_from_slice(&self.price.to_ne_bytes());
        buf[16..24].copy_from_slice(&self.volume.to_ne_bytes());
        buf[24..40].copy_from_slice(&self.symbol);
        buf
    }

    pub fn decode(data: &[u8]) -> Result<Self, TransportError> {
        check_len(data, Self::SIZE)?;
        Ok(Self {
            timestamp_ns: read_i64(data, 0),
            price: read_f64(data, 8),
            volume: read_f64(data, 16),
            symbol: read_symbol(data, 24),
        })
    }

    pub fn symbol(&self) -> Symbol {
        Symbol::from_bytes(self.symbol)
    }
}

/// Directional-change signal, 60 bytes on the wire.
///
/// Layout: `i64 timestamp_ns | i32 event_type | f64 price | f64 tmv_ext |
/// i64 duration_ns | f64 time_adjusted_return | u8[16] symbol`
///
/// `event_type`: 0 = none, 1 = upturn, 2 = downturn. The market-data stage
/// only ever publishes non-zero events.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DcSignalMessage {
    pub timestamp_ns: i64,
    pub event_type: i32,
    pub price: f64,
    pub tmv_ext: f64,
    pub duration_ns: i64,
    pub time_adjusted_return: f64,
    pub symbol: [u8; 16],
}

impl DcSignalMessage {
    pub const SIZE: usize = 60;

    pub fn from_event(event: &DcEvent, symbol: Symbol) -> Self {
        Self {
            timestamp_ns: event.timestamp_ns,
            event_type: event.kind.code(),
            price: event.price,
            tmv_ext: event.tmv_ext,
            duration_ns: event.duration_ns,
            time_adjusted_return: event.time_adjusted_return,
            symbol: *symbol.as_bytes(),
        }
    }

    pub fn encode(&self) -> [u8; Self::SIZE] {
        let mut buf = [0u8; Self::SIZE];
        buf[0..8].copy_from_slice(&self.timestamp_ns.to_ne_bytes());
        buf[8..12].copy_from_slice(&self.event_type.to_ne_bytes());
        buf[12..20].copy_from_slice(&self.price.to_ne_bytes());
        buf[20..28].copy_from_slice(&self.tmv_ext.to_ne_bytes());
        buf[28..36].copy_from_slice(&self.duration_ns.to_ne_bytes());
        buf[36..44].copy_from_slice(&self.time_adjusted_return.to_ne_bytes());
        buf[44..60].copy_from_slice(&self.symbol);
        buf
    }

    pub fn decode(data: &[u8]) -> Result<Self, TransportError> {
        check_len(data, Self::SIZE)?;
        Ok(Self {
            timestamp_ns: read_i64(data, 0),
            event_type: read_i32(data, 8),
            price: read_f64(data, 12),
            tmv_ext: read_f64(data, 20),
            duration_ns: read_i64(data, 28),
            time_adjusted_return: read_f64(data, 36),
            symbol: read_symbol(data, 44),
        })
    }

    /// The event kind, if the type code names one.
    pub fn event_kind(&self) -> Option<DcEventKind> {
        DcEventKind::from_code(self.event_type)
    }

    pub fn symbol(&self) -> Symbol {
        Symbol::from_bytes(self.symbol)
    }
}

/// Trading order, 52 bytes on the wire.
///
/// Layout: `i64 timestamp_ns | i32 side | f64 price | f64 quantity |
/// u8[16] symbol | i64 strategy_latency_ns`
///
/// `side`: 0 = none, 1 = buy, 2 = sell, 3 = hold.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct OrderMessage {
    pub timestamp_ns: i64,
    pub side: i32,
    pub price: f64,
    pub quantity: f64,
    pub symbol: [u8; 16],
    pub strategy_latency_ns: i64,
}

impl OrderMessage {
    pub const SIZE: usize = 52;

    pub fn from_order(order: &Order) -> Self {
        Self {
            timestamp_ns: order.timestamp_ns,
            side: order.side.code(),
            price: order.price,
            quantity: order.quantity,
            symbol: *order.symbol.as_bytes(),
            strategy_latency_ns: order.strategy_latency_ns,
        }
    }

    pub fn encode(&self) -> [u8; Self::SIZE] {
        let mut buf = [0u8; Self::SIZE];
        buf[0..8].copy_from_slice(&self.timestamp_ns.to_ne_bytes());
        buf[8..12].copy_from_slice(&self.side.to_ne_bytes());
        buf[12..20].copy_from_slice(&self.price.to_ne_bytes());
        buf[20..28].copy_from_slice(&self.quantity.to_ne_bytes());
        buf[28..44].copy_from_slice(&self.symbol);
        buf[44..52].copy_from_slice(&self.strategy_latency_ns.to_ne_bytes());
        buf
    }

    pub fn decode(data: &[u8]) -> Result<Self, TransportError> {
        check_len(data, Self::SIZE)?;
        Ok(Self {
            timestamp_ns: read_i64(data, 0),
            side: read_i32(data, 8),
            price: read_f64(data, 12),
            quantity: read_f64(data, 20),
            symbol: read_symbol(data, 28),
            strategy_latency_ns: read_i64(data, 44),
        })
    }

    /// The order side, if the code names one.
    pub fn order_side(&self) -> Option<Side> {
        Side::from_code(self.side)
    }

    /// Convert into the domain order. Returns None for an unknown side code.
    pub fn to_order(&self) -> Option<Order> {
        Some(Order {
            timestamp_ns: self.timestamp_ns,
            side: self.order_side()?,
            price: self.price,
            quantity: self.quantity,
            symbol: Symbol::from_bytes(self.symbol),
            strategy_latency_ns: self.strategy_latency_ns,
        })
    }

    pub fn symbol(&self) -> Symbol {
        Symbol::from_bytes(self.symbol)
    }
}
