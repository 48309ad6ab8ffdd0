//! Connection waits and bounded back-pressure retry

use super::error::TransportError;
use super::traits::{Publication, Subscription};
use std::time::{Duration, Instant};

/// Bounded retry policy for back-pressured offers.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    /// Maximum number of re-offers after the first attempt
    pub max_retries: u32,
    /// Micro-sleep between attempts
    pub backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 16,
            backoff: Duration::from_micros(50),
        }
    }
}

/// Offer a frame, retrying a bounded number of times on back-pressure.
///
/// Transient `BackPressured` results are retried with a micro-sleep between
/// attempts; once the bound is exhausted the last error is returned and the
/// caller decides whether to drop the frame. Non-transient errors return
/// immediately.
pub fn offer_with_retry(
    publication: &dyn Publication,
    data: &[u8],
    policy: RetryPolicy,
) -> Result<usize, TransportError> {
    let mut attempt = 0;
    loop {
        match publication.offer(data) {
            Ok(n) => return Ok(n),
            Err(err) if err.is_transient() && attempt < policy.max_retries => {
                attempt += 1;
                std::thread::sleep(policy.backoff);
            }
            Err(err) => return Err(err),
        }
    }
}

const CONNECT_POLL_INTERVAL: Duration = Duration::from_millis(1);

/// Block until the publication reports connected, or time out.
pub fn await_publication_connected(
    publication: &dyn Publication,
    timeout: Duration,
) -> Result<(), TransportError> {
    let deadline = Instant::now() + timeout;
    while !publication.is_connected() {
        if Instant::now() >= deadline {
            return Err(TransportError::Timeout);
        }
        std::thread::sleep(CONNECT_POLL_INTERVAL);
    }
    Ok(())
}

/// Block until the subscription reports connected, or time out.
pub fn await_subscription_connected(
    subscription: &dyn Subscription,
    timeout: Duration,
) -> Result<(), TransportError> {
    let deadline = Instant::now() + timeout;
    while !subscription.is_connected() {
        if Instant::now() >= deadline {
            return Err(TransportError::Timeout);
        }
        std::thread::sleep(CONNECT_POLL_INTERVAL);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    /// Rejects the first `reject` offers with back-pressure, then accepts.
    struct FlakyPublication {
        reject: u32,
        offers: AtomicU32,
    }

    impl Publication for FlakyPublication {
        fn offer(&self, data: &[u8]) -> Result<usize, TransportError> {
            let n = self.offers.fetch_add(1, Ordering::SeqCst);
            if n < self.reject {
                Err(TransportError::BackPressured)
            } else {
                Ok(data.len())
            }
        }
    }

    #[test]
    fn test_retry_succeeds_within_bound() {
        let publication = FlakyPublication {
            reject: 3,
            offers: AtomicU32::new(0),
        };
        let policy = RetryPolicy {
            max_retries: 5,
            backoff: Duration::from_micros(1),
        };
        assert_eq!(offer_with_retry(&publication, b"frame", policy), Ok(5));
        assert_eq!(publication.offers.load(Ordering::SeqCst), 4);
    }

    #[test]
    fn test_retry_gives_up_after_bound() {
        let publication = FlakyPublication {
            reject: u32::MAX,
            offers: AtomicU32::new(0),
        };
        let policy = RetryPolicy {
            max_retries: 4,
            backoff: Duration::from_micros(1),
        };
        assert_eq!(
            offer_with_retry(&publication, b"frame", policy),
            Err(TransportError::BackPressured)
        );
        // First attempt plus four retries
        assert_eq!(publication.offers.load(Ordering::SeqCst), 5);
    }

    #[test]
    fn test_non_transient_error_not_retried() {
        struct DeadPublication;
        impl Publication for DeadPublication {
            fn offer(&self, _data: &[u8]) -> Result<usize, TransportError> {
                Err(TransportError::NotConnected)
            }
        }
        assert_eq!(
            offer_with_retry(&DeadPublication, b"x", RetryPolicy::default()),
            Err(TransportError::NotConnected)
        );
    }

    #[test]
    fn test_await_connected_times_out() {
        struct NeverConnected;
        impl Publication for NeverConnected {
            fn offer(&self, _data: &[u8]) -> Result<usize, TransportError> {
                Err(TransportError::NotConnected)
            }
            fn is_connected(&self) -> bool {
                false
            }
        }
        let result = await_publication_connected(&NeverConnected, Duration::from_millis(5));
        assert_eq!(result, Err(TransportError::Timeout));
    }

    #[test]
    fn test_await_connected_returns_immediately_when_up() {
        struct AlwaysConnected;
        impl Subscription for AlwaysConnected {
            fn poll(
                &self,
                _handler: &mut dyn FnMut(&[u8]),
                _max_fragments: usize,
            ) -> Result<usize, TransportError> {
                Ok(0)
            }
        }
        assert!(await_subscription_connected(&AlwaysConnected, Duration::ZERO).is_ok());
    }
}
