//! Retry policy and the sleep seam.
//!
//! The orchestrator never calls `tokio::time::sleep` directly; it waits
//! through a [`Sleeper`] so tests can run the retry loop without real
//! delays.

use std::sync::Arc;
use std::time::Duration;

/// Default number of attempts before a pass gives up.
pub const DEFAULT_MAX_RETRIES: u32 = 3;

/// Default delay before the first retry.
pub const DEFAULT_BASE_DELAY: Duration = Duration::from_secs(1);

/// Waits for a duration.
pub trait Sleeper: Send + Sync {
    fn sleep(&self, duration: Duration) -> impl std::future::Future<Output = ()> + Send;
}

/// Real timer.
#[derive(Debug, Clone, Copy, Default)]
pub struct TokioSleeper;

impl Sleeper for TokioSleeper {
    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
}

impl<S: Sleeper> Sleeper for Arc<S> {
    async fn sleep(&self, duration: Duration) {
        (**self).sleep(duration).await;
    }
}

/// Bounded exponential backoff.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Bound on the retry counter, which counts every failed attempt.
    ///
    /// The pass gives up once this many attempts have failed, so a remote
    /// that never recovers sees exactly `max_retries` attempts.
    pub max_retries: u32,
    pub base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: DEFAULT_MAX_RETRIES,
            base_delay: DEFAULT_BASE_DELAY,
        }
    }
}

impl RetryPolicy {
    #[must_use]
    pub const fn new(max_retries: u32, base_delay: Duration) -> Self {
        Self {
            max_retries,
            base_delay,
        }
    }

    /// Whether another attempt is allowed after `failures` failed attempts.
    #[must_use]
    pub const fn allows_retry(&self, failures: u32) -> bool {
        failures < self.max_retries
    }

    /// Delay before retry number `attempt` (1-based): `base × 2^(attempt-1)`.
    ///
    /// Saturates instead of overflowing.
    #[must_use]
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(31);
        self.base_delay.saturating_mul(1 << exponent)
    }
}

#[cfg(test)]
pub use testing::RecordingSleeper;
