//! Transport error types

use thiserror::Error;

/// Error type for transport operations
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransportError {
    /// The remote endpoint is not (or no longer) attached
    #[error("not connected")]
    NotConnected,

    /// The consumer has not caught up; the caller may retry
    #[error("back pressured")]
    BackPressured,

    /// The session is gone for good
    #[error("connection closed")]
    Closed,

    /// Inbound frame shorter than the declared record size
    #[error("invalid frame: expected {expected} bytes, got {actual}")]
    InvalidFrame { expected: usize, actual: usize },

    /// Endpoint did not connect within the configured window
    #[error("timeout waiting for endpoint")]
    Timeout,
}

impl TransportError {
    /// Transient errors are worth a bounded retry; everything else is not.
    pub fn is_transient(&self) -> bool {
        matches!(self, TransportError::BackPressured)
    }
}
