//! Bounded retry for transient provider failures.

use std::time::Duration;

use nastro_core::NastroError;
use rand::Rng;

/// Base delay plus a random jitter slice, in milliseconds.
#[must_use]
pub fn jitter_ms(base_ms: u64, jitter_percent: u8) -> u64 {
    let jitter_range = if jitter_percent == 0 {
        1
    } else {
        std::cmp::max(1, base_ms.saturating_mul(u64::from(jitter_percent)) / 100)
    };
    let mut rng = rand::rng();
    base_ms + rng.random_range(0..jitter_range)
}

/// Exponential backoff applied to transient failures only.
///
/// Permanent errors (`Provider`, `NotFound`, `InvalidArg`, ...) and
/// cancellation surface immediately; transient errors (`Transient`,
/// `RateLimited`, `Timeout`) are retried up to `max_attempts` total tries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total tries, including the first.
    pub max_attempts: u32,
    /// First retry delay.
    pub base_delay: Duration,
    /// Delay multiplier per failed attempt.
    pub multiplier: u32,
    /// Random jitter percentage [0, 100] added to each delay.
    pub jitter_percent: u8,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_millis(500),
            multiplier: 2,
            jitter_percent: 20,
        }
    }
}

impl RetryPolicy {
    /// A policy that never retries.
    #[must_use]
    pub const fn none() -> Self {
        Self {
            max_attempts: 1,
            base_delay: Duration::ZERO,
            multiplier: 1,
            jitter_percent: 0,
        }
    }

    /// Run `op` under this policy. The closure receives the 1-based attempt
    /// number, mostly for logging.
    pub async fn run<T, F, Fut>(&self, op: F) -> Result<T, NastroError>
    where
        F: Fn(u32) -> Fut,
        Fut: Future<Output = Result<T, NastroError>>,
    {
        let mut delay_ms = self.base_delay.as_millis() as u64;
        let mut attempt = 1;
        loop {
            match op(attempt).await {
                Ok(value) => return Ok(value),
                Err(err) if err.is_transient() && attempt < self.max_attempts => {
                    let wait = jitter_ms(delay_ms, self.jitter_percent);
                    tracing::debug!(attempt, wait_ms = wait, error = %err, "retrying transient failure");
                    tokio::time::sleep(Duration::from_millis(wait)).await;
                    delay_ms = delay_ms.saturating_mul(u64::from(self.multiplier));
                    attempt += 1;
                }
                Err(err) => return Err(err),
            }
        }
    }
}
