//! Transport traits
//!
//! Core abstractions for offering frames downstream and polling frames from
//! upstream. All implementations must be thread-safe (Send + Sync).

use super::error::TransportError;

/// Outbound endpoint of a stage.
pub trait Publication: Send + Sync {
    /// Offer one frame to the channel.
    ///
    /// Returns the number of bytes accepted (> 0) on success.
    /// `BackPressured` means the consumer has not caught up and the offer
    /// may be retried; `NotConnected` means there is no attached consumer.
    fn offer(&self, data: &[u8]) -> Result<usize, TransportError>;

    /// Whether the publication currently has an attached consumer.
    ///
    /// Conservative default: implementations that cannot probe the far end
    /// report connected and rely on `offer` to surface failures.
    fn is_connected(&self) -> bool {
        true
    }
}

/// Inbound endpoint of a stage.
pub trait Subscription: Send + Sync {
    /// Poll for frames, invoking `handler` once per frame, up to
    /// `max_fragments` frames.
    ///
    /// Returns the number of frames handled. Non-blocking: returns 0 when
    /// nothing is queued. A lost session surfaces as `Err(Closed)`.
    fn poll(
        &self,
        handler: &mut dyn FnMut(&[u8]),
        max_fragments: usize,
    ) -> Result<usize, TransportError>;

    /// Non-blocking check whether frames are queued.
    ///
    /// Default is conservative (always poll).
    fn has_messages(&self) -> bool {
        true
    }

    /// Whether the subscription currently has an attached producer.
    fn is_connected(&self) -> bool {
        true
    }
}

/// Boxed publication for dynamic dispatch
pub type BoxPublication = Box<dyn Publication>;

/// Boxed subscription for dynamic dispatch
pub type BoxSubscription = Box<dyn Subscription>;
