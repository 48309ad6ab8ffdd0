//! Market-data stage errors

use dc_transport::TransportError;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum MarketDataError {
    /// Rejected at the boundary: non-finite price or invalid threshold
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// Endpoint setup failed or timed out; fatal to the stage
    #[error("transport initialization failed: {0}")]
    TransportInit(TransportError),
}
