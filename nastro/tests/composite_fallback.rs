use std::sync::Arc;

use chrono::NaiveDate;
use nastro::backfill::BackfillService;
use nastro::composite::CompositeHistorical;
use nastro::pipeline::EventPipeline;
use nastro_core::{HistoricalProvider, NastroError, SystemClock};
use nastro_middleware::RetryPolicy;
use nastro_mock::{MemorySink, MockHistorical};
use nastro_types::{BackfillRequest, EventKind, FullMode, PipelinePolicy};

fn range() -> (NaiveDate, NaiveDate) {
    // Fri 2024-03-01 .. Tue 2024-03-05: three trading days.
    (
        NaiveDate::from_ymd_opt(2024, 3, 1).unwrap(),
        NaiveDate::from_ymd_opt(2024, 3, 5).unwrap(),
    )
}

// Stooq (priority 10) answers empty for XYZ without throwing; Yahoo
// (priority 20) serves three bars. The bars flow through a backfill stamped
// with the serving provider, and no symbol is recorded failed.
#[tokio::test]
async fn falls_through_empty_to_next_provider() {
    let stooq = Arc::new(MockHistorical::new("stooq", 10).with_empty_symbols(["XYZ"]));
    let yahoo = Arc::new(MockHistorical::new("yahoo", 20));
    let composite = CompositeHistorical::new(vec![
        Arc::clone(&stooq) as Arc<dyn HistoricalProvider>,
        Arc::clone(&yahoo) as Arc<dyn HistoricalProvider>,
    ]);

    let (from, to) = range();
    let sink = Arc::new(MemorySink::new());
    let pipeline = EventPipeline::builder(Arc::clone(&sink) as Arc<dyn nastro_core::StorageSink>)
        .policy(PipelinePolicy {
            capacity: 1_000,
            full_mode: FullMode::Wait,
            enable_metrics: false,
        })
        .flush_interval(None)
        .build();

    let service = BackfillService::new(Arc::new(SystemClock));
    let request = BackfillRequest {
        provider: "composite".into(),
        symbols: vec!["XYZ".into()],
        from: Some(from),
        to: Some(to),
    };
    let result = service
        .run(&composite, &request, &pipeline, None, None)
        .await
        .unwrap();

    assert!(result.success);
    assert_eq!(result.bars_written, 3);
    assert!(result.error.is_none());
    assert_eq!(stooq.calls(), 1);
    assert_eq!(yahoo.calls(), 1);

    pipeline.complete();
    for _ in 0..20 {
        tokio::task::yield_now().await;
    }
    let events = sink.events();
    assert_eq!(events.len(), 3);
    for event in &events {
        assert_eq!(event.source, "YAHOO");
        assert_eq!(event.kind(), EventKind::HistoricalBar);
        assert_eq!(event.symbol, "XYZ");
    }
}

// Transient failures on the first provider are retried, then failed over.
#[tokio::test(start_paused = true)]
async fn transient_failure_fails_over_after_retries() {
    let flaky = Arc::new(MockHistorical::new("stooq", 10).with_failing_symbols(["ABC"]));
    let solid = Arc::new(MockHistorical::new("yahoo", 20));
    let composite = CompositeHistorical::new(vec![
        Arc::clone(&flaky) as Arc<dyn HistoricalProvider>,
        Arc::clone(&solid) as Arc<dyn HistoricalProvider>,
    ])
    .with_retry(RetryPolicy {
        max_attempts: 3,
        jitter_percent: 0,
        ..RetryPolicy::default()
    });

    let (from, to) = range();
    let (served_by, bars) = composite
        .daily_bars_attributed("ABC", Some(from), Some(to))
        .await
        .unwrap();

    assert_eq!(served_by, "yahoo");
    assert_eq!(bars.len(), 3);
    // The flaky provider was retried to exhaustion before failing over.
    assert_eq!(flaky.calls(), 3);
    assert_eq!(solid.calls(), 1);
}

// Permanent errors skip the provider without retries.
#[tokio::test]
async fn permanent_error_skips_without_retry() {
    let broken = Arc::new(MockHistorical::new("stooq", 10));
    let solid = Arc::new(MockHistorical::new("yahoo", 20));
    let composite = CompositeHistorical::new(vec![
        Arc::clone(&broken) as Arc<dyn HistoricalProvider>,
        Arc::clone(&solid) as Arc<dyn HistoricalProvider>,
    ]);

    // "MISSING" is a permanent not-found on every mock; yahoo also returns
    // it, so the composite surfaces the aggregate failure.
    let err = composite.daily_bars("MISSING", None, None).await.unwrap_err();
    assert!(matches!(err, NastroError::AllProvidersFailed(_)));
    assert_eq!(broken.calls(), 1);
    assert_eq!(solid.calls(), 1);
}

// Unavailable providers are skipped entirely.
#[tokio::test]
async fn unavailable_provider_is_skipped() {
    let dark = Arc::new(MockHistorical::new("stooq", 10));
    dark.set_available(false);
    let solid = Arc::new(MockHistorical::new("yahoo", 20));
    let composite = CompositeHistorical::new(vec![
        Arc::clone(&dark) as Arc<dyn HistoricalProvider>,
        Arc::clone(&solid) as Arc<dyn HistoricalProvider>,
    ]);

    let (from, to) = range();
    let (served_by, _) = composite
        .daily_bars_attributed("AAPL", Some(from), Some(to))
        .await
        .unwrap();
    assert_eq!(served_by, "yahoo");
    assert_eq!(dark.calls(), 0);
}
