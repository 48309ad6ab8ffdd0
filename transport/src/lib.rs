//! Transport layer for the DC pipeline
//!
//! Abstract `Publication` / `Subscription` traits with an in-process
//! crossbeam-channel implementation. Messages cross stages as fixed-layout
//! byte records; the publish side reports back-pressure explicitly so
//! callers can apply a bounded retry.
//!
//! Semantics:
//! - `offer` returns the number of bytes accepted, or `BackPressured` /
//!   `NotConnected` as transient and connection failures
//! - `poll` drains up to `max_fragments` frames into a handler; a lost
//!   connection surfaces as `Closed`
//! - delivery is at-least-once within a connected session, FIFO per
//!   publisher

pub mod application;
pub mod infrastructure;

pub use application::{
    await_publication_connected, await_subscription_connected, offer_with_retry, BoxPublication,
    BoxSubscription, DcSignalMessage, OrderMessage, Publication, RetryPolicy, Subscription,
    TickMessage, TransportError,
};
pub use infrastructure::{channel_pair, ChannelPublication, ChannelSubscription, EndpointConfig};
