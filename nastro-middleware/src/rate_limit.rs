//! Token-bucket rate limiting for historical providers.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::NaiveDate;
use nastro_core::{HistoricalProvider, NastroError};
use nastro_types::{Bar, HistoricalCapabilities, RateLimitSpec};
use tokio::time::Instant;

/// Wrapper that paces calls to the inner provider according to its declared
/// [`RateLimitSpec`]: at most `max_requests_per_window` per window, never two
/// requests closer than `min_delay`.
///
/// Callers are suspended, not failed; by construction the wait is bounded by
/// the window length.
pub struct RateLimited {
    inner: Arc<dyn HistoricalProvider>,
    spec: RateLimitSpec,
    runtime: Mutex<Runtime>,
}

#[derive(Debug)]
struct Runtime {
    window_start: Instant,
    calls_in_window: u32,
    last_request: Option<Instant>,
}

impl RateLimited {
    /// Wrap `inner` using its own declared rate limit.
    #[must_use]
    pub fn new(inner: Arc<dyn HistoricalProvider>) -> Self {
        let spec = inner.rate_limit();
        Self::with_spec(inner, spec)
    }

    /// Wrap `inner` with an explicit budget, overriding its declared one.
    #[must_use]
    pub fn with_spec(inner: Arc<dyn HistoricalProvider>, spec: RateLimitSpec) -> Self {
        Self {
            inner,
            spec,
            runtime: Mutex::new(Runtime {
                window_start: Instant::now(),
                calls_in_window: 0,
                last_request: None,
            }),
        }
    }

    /// Access the wrapped provider.
    #[must_use]
    pub fn inner(&self) -> &Arc<dyn HistoricalProvider> {
        &self.inner
    }

    /// Take one token, sleeping until the budget allows it.
    async fn acquire(&self) {
        loop {
            let delay = {
                let mut rt = self.runtime.lock().expect("mutex poisoned");
                let now = Instant::now();

                // Reset the window if it elapsed.
                if now.duration_since(rt.window_start) >= self.spec.window {
                    rt.window_start = now;
                    rt.calls_in_window = 0;
                }

                let spacing_wait = rt
                    .last_request
                    .map(|last| {
                        self.spec
                            .min_delay
                            .saturating_sub(now.duration_since(last))
                    })
                    .unwrap_or(Duration::ZERO);

                let window_wait = if rt.calls_in_window >= self.spec.max_requests_per_window {
                    self.spec
                        .window
                        .saturating_sub(now.duration_since(rt.window_start))
                } else {
                    Duration::ZERO
                };

                let delay = spacing_wait.max(window_wait);
                if delay.is_zero() {
                    rt.calls_in_window += 1;
                    rt.last_request = Some(now);
                    return;
                }
                delay
            };
            tracing::debug!(
                provider = self.inner.name(),
                delay_ms = delay.as_millis() as u64,
                "rate limit pacing"
            );
            tokio::time::sleep(delay).await;
        }
    }
}

#[async_trait]
impl HistoricalProvider for RateLimited {
    fn name(&self) -> &'static str {
        self.inner.name()
    }

    fn display_name(&self) -> &'static str {
        self.inner.display_name()
    }

    fn description(&self) -> &'static str {
        self.inner.description()
    }

    fn priority(&self) -> u32 {
        self.inner.priority()
    }

    fn capabilities(&self) -> HistoricalCapabilities {
        self.inner.capabilities()
    }

    fn rate_limit(&self) -> RateLimitSpec {
        self.spec
    }

    fn is_available(&self) -> bool {
        self.inner.is_available()
    }

    async fn daily_bars(
        &self,
        symbol: &str,
        from: Option<NaiveDate>,
        to: Option<NaiveDate>,
    ) -> Result<Vec<Bar>, NastroError> {
        self.acquire().await;
        self.inner.daily_bars(symbol, from, to).await
    }

    async fn adjusted_daily_bars(
        &self,
        symbol: &str,
        from: Option<NaiveDate>,
        to: Option<NaiveDate>,
    ) -> Result<Vec<Bar>, NastroError> {
        self.acquire().await;
        self.inner.adjusted_daily_bars(symbol, from, to).await
    }

    async fn intraday_bars(
        &self,
        symbol: &str,
        interval_minutes: u32,
        from: Option<NaiveDate>,
        to: Option<NaiveDate>,
    ) -> Result<Vec<Bar>, NastroError> {
        self.acquire().await;
        self.inner
            .intraday_bars(symbol, interval_minutes, from, to)
            .await
    }
}
