use std::sync::Arc;
use std::time::Duration;

use nastro_core::HistoricalProvider;
use nastro_middleware::RateLimited;
use nastro_mock::MockHistorical;
use nastro_types::RateLimitSpec;

fn limited(max: u32, window: Duration, min_delay: Duration) -> (Arc<MockHistorical>, RateLimited) {
    let inner = Arc::new(MockHistorical::new("mock", 10));
    let wrapper = RateLimited::with_spec(
        Arc::clone(&inner) as Arc<dyn HistoricalProvider>,
        RateLimitSpec {
            max_requests_per_window: max,
            window,
            min_delay,
        },
    );
    (inner, wrapper)
}

#[tokio::test(start_paused = true)]
async fn window_budget_suspends_until_reset() {
    let (inner, wrapper) = limited(2, Duration::from_secs(60), Duration::ZERO);

    wrapper.daily_bars("AAPL", None, None).await.unwrap();
    wrapper.daily_bars("AAPL", None, None).await.unwrap();
    assert_eq!(inner.calls(), 2);

    // Third call must park until the window rolls over. Paused-clock tokio
    // auto-advances through the sleep, so it completes, and the elapsed time
    // proves the wait happened.
    let before = tokio::time::Instant::now();
    wrapper.daily_bars("AAPL", None, None).await.unwrap();
    let waited = tokio::time::Instant::now().duration_since(before);
    assert!(waited >= Duration::from_secs(60), "waited only {waited:?}");
    assert_eq!(inner.calls(), 3);
}

#[tokio::test(start_paused = true)]
async fn min_delay_spaces_consecutive_calls() {
    let (inner, wrapper) = limited(100, Duration::from_secs(60), Duration::from_millis(250));

    let before = tokio::time::Instant::now();
    wrapper.daily_bars("AAPL", None, None).await.unwrap();
    wrapper.daily_bars("MSFT", None, None).await.unwrap();
    let waited = tokio::time::Instant::now().duration_since(before);

    assert!(waited >= Duration::from_millis(250), "waited only {waited:?}");
    assert_eq!(inner.calls(), 2);
}

#[tokio::test]
async fn delegates_identity_and_budget() {
    let (_, wrapper) = limited(5, Duration::from_secs(1), Duration::ZERO);
    assert_eq!(wrapper.name(), "mock");
    assert_eq!(wrapper.priority(), 10);
    assert_eq!(wrapper.rate_limit().max_requests_per_window, 5);
}
