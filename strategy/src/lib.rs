//! Strategy stage
//!
//! Maps DC signals to trading orders: a direct decision rule on the
//! time-adjusted return, an optional volatility-regime gate scaling
//! leverage, and notional-capped sizing.

pub mod decision;
pub mod error;
pub mod regime;
pub mod sizing;
pub mod stage;

pub use decision::decide;
pub use error::StrategyError;
pub use regime::{MarketState, RegimeClassifier};
pub use sizing::order_quantity;
pub use stage::{StrategyConfig, StrategyStage, StrategyStatistics};
