//! Strategy stage errors

use dc_transport::TransportError;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum StrategyError {
    /// Endpoint setup failed or timed out; fatal to the stage
    #[error("transport initialization failed: {0}")]
    TransportInit(TransportError),

    /// Rejected at the boundary
    #[error("invalid input: {0}")]
    InvalidInput(String),
}
