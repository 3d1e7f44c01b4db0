//! Circuit breaker guarding the connect path.

use std::time::Duration;

use nastro_types::ConnectBreakerConfig;
use tokio::time::Instant;

/// Counts consecutive connect failures and rejects attempts while open.
///
/// After `open_duration` the next check lets one attempt through; a failure
/// there re-opens immediately, a success resets everything.
#[derive(Debug)]
pub struct ConnectBreaker {
    config: ConnectBreakerConfig,
    consecutive_failures: u32,
    opened_at: Option<Instant>,
}

impl ConnectBreaker {
    /// Closed breaker with the given thresholds.
    #[must_use]
    pub const fn new(config: ConnectBreakerConfig) -> Self {
        Self {
            config,
            consecutive_failures: 0,
            opened_at: None,
        }
    }

    /// Whether an attempt may proceed. `Err` carries the remaining open time.
    pub fn check(&mut self) -> Result<(), Duration> {
        let Some(opened_at) = self.opened_at else {
            return Ok(());
        };
        let elapsed = opened_at.elapsed();
        if elapsed < self.config.open_duration {
            return Err(self.config.open_duration - elapsed);
        }
        // Half-open: allow one probe; one more failure re-opens at once.
        self.opened_at = None;
        self.consecutive_failures = self.config.failure_threshold.saturating_sub(1);
        Ok(())
    }

    /// Record a failed attempt.
    pub fn record_failure(&mut self) {
        self.consecutive_failures += 1;
        if self.consecutive_failures >= self.config.failure_threshold {
            self.opened_at = Some(Instant::now());
            tracing::warn!(
                failures = self.consecutive_failures,
                open_secs = self.config.open_duration.as_secs(),
                "connect circuit opened"
            );
        }
    }

    /// Record a successful attempt, closing the breaker.
    pub fn record_success(&mut self) {
        self.consecutive_failures = 0;
        self.opened_at = None;
    }
}
