//! DC signal to order-side mapping

use dc_core::{DcEventKind, Side};
use dc_transport::DcSignalMessage;

/// The base decision rule.
///
/// An upturn with positive time-adjusted return buys; a downturn with
/// negative time-adjusted return sells; anything else stands aside. A zero
/// return (including signals whose duration made the return unusable) never
/// trades.
pub fn decide(signal: &DcSignalMessage) -> Option<Side> {
    match signal.event_kind()? {
        DcEventKind::Upturn if signal.time_adjusted_return > 0.0 => Some(Side::Buy),
        DcEventKind::Downturn if signal.time_adjusted_return < 0.0 => Some(Side::Sell),
        _ => None,
    }
}
