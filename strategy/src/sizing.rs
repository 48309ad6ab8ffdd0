//! Order sizing

/// Maximum notional per trade
const MAX_NOTIONAL: f64 = 10_000.0;
/// Base order quantity before leverage
const BASE_QUANTITY: f64 = 100.0;

/// Size an order: base quantity scaled by leverage and the regime factor,
/// capped at the maximum notional, floored at one unit.
///
/// A non-positive price cannot be capped by notional and falls back to the
/// un-capped product.
pub fn order_quantity(price: f64, leverage_factor: f64, regime_factor: f64) -> f64 {
    let mut quantity = BASE_QUANTITY * leverage_factor * regime_factor;
    if price > 0.0 {
        quantity = quantity.min(MAX_NOTIONAL / price);
    }
    quantity.max(1.0)
}
