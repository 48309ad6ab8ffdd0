//! Live execution adapter interface
//!
//! The stage never implements a broker; it consumes this capability. A live
//! order produces a `Pending` record and a handle; the adapter (or the venue
//! behind it) later reports the fill through `ExecutionStage::on_fill`.

use dc_core::Order;
use thiserror::Error;

/// Errors surfaced by a live adapter. A failed submit becomes a `Rejected`
/// execution record; the stage itself never crashes on adapter failures.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum AdapterError {
    #[error("order submission failed: {0}")]
    Submit(String),

    #[error("adapter unavailable")]
    Unavailable,
}

/// Opaque handle correlating a submitted order with its eventual fill.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct OrderHandle(pub u64);

/// Fill details reported back by the adapter.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FillDetails {
    pub price: f64,
    pub quantity: f64,
    pub timestamp_ns: i64,
}

/// A live order-routing capability.
pub trait ExecutionAdapter: Send {
    /// Hand an order to the venue. Returns a handle the venue's fill
    /// callback will reference.
    fn submit(&mut self, order: &Order) -> Result<OrderHandle, AdapterError>;
}
