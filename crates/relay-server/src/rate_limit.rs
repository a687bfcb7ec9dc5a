//! Token-bucket admission control.
//!
//! One instance throttles every broadcast; each session owns another that
//! paces its inbound frames. Neither drops work: callers wait for a token or
//! give up when their cancellation token fires.

use std::num::NonZeroU32;
use std::time::Duration;

use governor::clock::DefaultClock;
use governor::state::{InMemoryState, NotKeyed};
use governor::{Quota, RateLimiter as GovernorLimiter};
use thiserror::Error;
use tokio_util::sync::CancellationToken;

use crate::config::RateLimitConfig;

type DirectLimiter = GovernorLimiter<NotKeyed, InMemoryState, DefaultClock>;

/// Why a token could not be acquired.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum RateLimitError {
    /// The caller's cancellation token fired while waiting.
    #[error("rate limiter wait cancelled")]
    Cancelled,
    /// More tokens requested than the bucket can ever hold.
    #[error("requested {requested} tokens but the bucket holds at most {burst}")]
    InsufficientCapacity {
        /// Tokens requested.
        requested: u32,
        /// Bucket capacity.
        burst: u32,
    },
}

/// One token every `interval`, at most `burst` stored.
pub struct RateLimiter {
    limiter: DirectLimiter,
    interval: Duration,
    burst: NonZeroU32,
}

impl RateLimiter {
    /// Create a limiter. A zero `burst` is raised to one and a zero
    /// `interval` to one millisecond.
    pub fn new(interval: Duration, burst: u32) -> Self {
        let burst = NonZeroU32::new(burst).unwrap_or(NonZeroU32::MIN);
        let interval = interval.max(Duration::from_millis(1));
        let quota = Quota::with_period(interval)
            .map_or_else(|| Quota::per_second(burst), |q| q.allow_burst(burst));
        Self {
            limiter: GovernorLimiter::direct(quota),
            interval,
            burst,
        }
    }

    /// Build from config.
    pub fn from_config(config: &RateLimitConfig) -> Self {
        Self::new(config.interval(), config.burst)
    }

    /// Wait for a single token.
    pub async fn acquire(&self, cancel: &CancellationToken) -> Result<(), RateLimitError> {
        self.acquire_n(1, cancel).await
    }

    /// Wait for `n` tokens. `n == 0` succeeds immediately.
    pub async fn acquire_n(&self, n: u32, cancel: &CancellationToken) -> Result<(), RateLimitError> {
        let Some(tokens) = NonZeroU32::new(n) else {
            return Ok(());
        };
        if tokens > self.burst {
            return Err(RateLimitError::InsufficientCapacity {
                requested: n,
                burst: self.burst.get(),
            });
        }
        tokio::select! {
            biased;
            () = cancel.cancelled() => Err(RateLimitError::Cancelled),
            res = self.limiter.until_n_ready(tokens) => match res {
                Ok(()) => Ok(()),
                Err(_) => Err(RateLimitError::InsufficientCapacity {
                    requested: n,
                    burst: self.burst.get(),
                }),
            },
        }
    }

    /// Take a token if one is available right now.
    pub fn try_acquire(&self) -> bool {
        self.limiter.check().is_ok()
    }

    /// Refill interval.
    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Bucket capacity.
    pub fn burst(&self) -> u32 {
        self.burst.get()
    }
}

impl std::fmt::Debug for RateLimiter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RateLimiter")
            .field("interval", &self.interval)
            .field("burst", &self.burst)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Instant;

    #[test]
    fn burst_is_available_immediately() {
        let limiter = RateLimiter::new(Duration::from_secs(10), 3);
        assert!(limiter.try_acquire());
        assert!(limiter.try_acquire());
        assert!(limiter.try_acquire());
        assert!(!limiter.try_acquire());
    }

    #[test]
    fn zero_burst_is_clamped() {
        let limiter = RateLimiter::new(Duration::ZERO, 0);
        assert_eq!(limiter.burst(), 1);
        assert_eq!(limiter.interval(), Duration::from_millis(1));
    }

    #[test]
    fn from_config_copies_parameters() {
        let limiter = RateLimiter::from_config(&RateLimitConfig {
            interval_ms: 250,
            burst: 4,
        });
        assert_eq!(limiter.interval(), Duration::from_millis(250));
        assert_eq!(limiter.burst(), 4);
    }

    #[tokio::test]
    async fn acquire_waits_for_refill() {
        let limiter = RateLimiter::new(Duration::from_millis(50), 1);
        let cancel = CancellationToken::new();
        limiter.acquire(&cancel).await.unwrap();

        let start = Instant::now();
        limiter.acquire(&cancel).await.unwrap();
        assert!(start.elapsed() >= Duration::from_millis(30));
    }

    #[tokio::test]
    async fn acquire_zero_is_immediate() {
        let limiter = RateLimiter::new(Duration::from_secs(10), 1);
        let cancel = CancellationToken::new();
        assert!(limiter.try_acquire());
        limiter.acquire_n(0, &cancel).await.unwrap();
    }

    #[tokio::test]
    async fn acquire_more_than_burst_fails() {
        let limiter = RateLimiter::new(Duration::from_millis(10), 2);
        let cancel = CancellationToken::new();
        let err = limiter.acquire_n(3, &cancel).await.unwrap_err();
        assert_eq!(
            err,
            RateLimitError::InsufficientCapacity {
                requested: 3,
                burst: 2
            }
        );
    }

    #[tokio::test]
    async fn cancelled_token_fails_fast() {
        let limiter = RateLimiter::new(Duration::from_secs(10), 1);
        let cancel = CancellationToken::new();
        cancel.cancel();
        assert_eq!(
            limiter.acquire(&cancel).await,
            Err(RateLimitError::Cancelled)
        );
    }

    #[tokio::test]
    async fn cancel_interrupts_wait() {
        let limiter = std::sync::Arc::new(RateLimiter::new(Duration::from_secs(60), 1));
        assert!(limiter.try_acquire());
        let cancel = CancellationToken::new();

        let waiter = {
            let limiter = limiter.clone();
            let cancel = cancel.clone();
            tokio::spawn(async move { limiter.acquire(&cancel).await })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;
        cancel.cancel();

        let res = tokio::time::timeout(Duration::from_secs(2), waiter)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(res, Err(RateLimitError::Cancelled));
    }
}
