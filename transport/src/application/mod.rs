//! Application layer - transport abstractions
//!
//! The traits and wire formats the stages depend on. Stage crates import
//! these, never the concrete channel implementation.

pub mod error;
pub mod messages;
pub mod retry;
pub mod traits;

pub use error::TransportError;
pub use messages::{DcSignalMessage, OrderMessage, TickMessage};
pub use retry::{
    await_publication_connected, await_subscription_connected, offer_with_retry, RetryPolicy,
};
pub use traits::{BoxPublication, BoxSubscription, Publication, Subscription};
