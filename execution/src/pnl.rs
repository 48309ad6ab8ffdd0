//! Trade P&L models
//!
//! The stage computes per-trade P&L behind this trait so the bookkeeping
//! model can be replaced without touching the stage.

use dc_core::Side;

/// Per-trade realized P&L.
pub trait PnlModel: Send {
    /// P&L attributed to one fill. Called once per filled execution, in
    /// fill order.
    fn trade_pnl(&mut self, side: Side, filled_price: f64, filled_quantity: f64) -> f64;

    fn reset(&mut self);
}

/// Last-price P&L: the documented simplification.
///
/// A buy opens or accumulates and realizes nothing. A sell realizes
/// `(filled_price - last_price) * quantity` against the most recent fill's
/// price. Every fill, regardless of side, becomes the new last price. The
/// very first fill has no reference and realizes nothing.
///
/// Owned by a single execution stage and meaningful for a single symbol
/// only.
#[derive(Debug, Clone, Default)]
pub struct LastPricePnl {
    last_price: Option<f64>,
}

impl LastPricePnl {
    pub fn new() -> Self {
        Self::default()
    }
}

impl PnlModel for LastPricePnl {
    fn trade_pnl(&mut self, side: Side, filled_price: f64, filled_quantity: f64) -> f64 {
        let pnl = match (side, self.last_price) {
            (Side::Sell, Some(last)) => (filled_price - last) * filled_quantity,
            _ => 0.0,
        };
        self.last_price = Some(filled_price);
        pnl
    }

    fn reset(&mut self) {
        self.last_price = None;
    }
}
