//! Channel transport implementation
//!
//! In-process pub/sub over crossbeam bounded channels. The bounded capacity
//! is the back-pressure threshold: a full channel surfaces as
//! `BackPressured` on offer.

use crate::application::error::TransportError;
use crate::application::traits::{Publication, Subscription};
use crossbeam_channel::{bounded, Receiver, Sender, TryRecvError, TrySendError};

/// Channel-backed publication
#[derive(Clone)]
pub struct ChannelPublication {
    tx: Sender<Vec<u8>>,
}

impl ChannelPublication {
    pub fn new(tx: Sender<Vec<u8>>) -> Self {
        Self { tx }
    }
}

impl Publication for ChannelPublication {
    fn offer(&self, data: &[u8]) -> Result<usize, TransportError> {
        match self.tx.try_send(data.to_vec()) {
            Ok(()) => Ok(data.len()),
            Err(TrySendError::Full(_)) => Err(TransportError::BackPressured),
            Err(TrySendError::Disconnected(_)) => Err(TransportError::NotConnected),
        }
    }

    fn is_connected(&self) -> bool {
        // Crossbeam senders don't expose the far end; disconnection is
        // detected on offer.
        true
    }
}

/// Channel-backed subscription
pub struct ChannelSubscription {
    rx: Receiver<Vec<u8>>,
}

impl ChannelSubscription {
    pub fn new(rx: Receiver<Vec<u8>>) -> Self {
        Self { rx }
    }
}

impl Subscription for ChannelSubscription {
    fn poll(
        &self,
        handler: &mut dyn FnMut(&[u8]),
        max_fragments: usize,
    ) -> Result<usize, TransportError> {
        let mut count = 0;
        while count < max_fragments {
            match self.rx.try_recv() {
                Ok(data) => {
                    handler(&data);
                    count += 1;
                }
                Err(TryRecvError::Empty) => break,
                Err(TryRecvError::Disconnected) => {
                    // Drain what was buffered before reporting the loss
                    if count == 0 {
                        return Err(TransportError::Closed);
                    }
                    break;
                }
            }
        }
        Ok(count)
    }

    fn has_messages(&self) -> bool {
        !self.rx.is_empty()
    }
}

/// Create a connected publication/subscription pair.
///
/// `capacity` is the bounded channel size, i.e. the back-pressure threshold.
pub fn channel_pair(capacity: usize) -> (ChannelPublication, ChannelSubscription) {
    let (tx, rx) = bounded(capacity);
    (ChannelPublication::new(tx), ChannelSubscription::new(rx))
}
