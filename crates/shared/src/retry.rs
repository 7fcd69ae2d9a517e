//! Exponential backoff with jitter for calls to hosted services.

use std::future::Future;
use std::time::Duration;

use tracing::warn;

/// Retry policy: exponential backoff, capped delay, capped attempt count.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Retries after the first attempt.
    pub max_retries: u32,
    /// Delay before the first retry.
    pub base_delay: Duration,
    /// Upper bound for any single delay (before jitter).
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay: Duration::from_millis(250),
            max_delay: Duration::from_secs(4),
        }
    }
}

impl RetryPolicy {
    /// A policy that never retries.
    #[must_use]
    pub const fn none() -> Self {
        Self {
            max_retries: 0,
            base_delay: Duration::ZERO,
            max_delay: Duration::ZERO,
        }
    }

    /// Backoff delay for the given retry number (0-based), without jitter.
    #[must_use]
    pub fn backoff_delay(&self, retry: u32) -> Duration {
        let factor = 1u32.checked_shl(retry).unwrap_or(u32::MAX);
        self.base_delay
            .checked_mul(factor)
            .unwrap_or(self.max_delay)
            .min(self.max_delay)
    }

    /// Backoff delay plus a random jitter of up to half the delay.
    #[must_use]
    pub fn jittered_delay(&self, retry: u32) -> Duration {
        let delay = self.backoff_delay(retry);
        let half_ms = u64::try_from(delay.as_millis() / 2).unwrap_or(u64::MAX);
        let jitter = if half_ms == 0 {
            0
        } else {
            rand::random_range(0..=half_ms)
        };
        delay + Duration::from_millis(jitter)
    }

    /// Runs `op`, retrying transient failures according to this policy.
    ///
    /// # Errors
    ///
    /// Returns the last error once retries are exhausted, or the first
    /// non-transient error immediately.
    pub async fn run<T, E, F, Fut, P>(&self, mut op: F, is_transient: P) -> Result<T, E>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        P: Fn(&E) -> bool,
        E: std::fmt::Display,
    {
        let mut retry = 0;
        loop {
            match op().await {
                Ok(value) => return Ok(value),
                Err(e) if retry < self.max_retries && is_transient(&e) => {
                    let delay = self.jittered_delay(retry);
                    warn!(error = %e, retry = retry + 1, delay_ms = delay.as_millis() as u64, "Transient failure, retrying");
                    tokio::time::sleep(delay).await;
                    retry += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }
}
