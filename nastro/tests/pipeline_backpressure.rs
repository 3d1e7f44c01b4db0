use std::sync::Arc;

use chrono::{TimeZone, Utc};
use nastro::pipeline::{EventPipeline, REASON_QUEUE_FULL};
use nastro_core::DroppedEventAudit;
use nastro_mock::{MemoryAudit, MemorySink};
use nastro_types::{EventPayload, FullMode, MarketEvent, PipelinePolicy, Trade};
use rust_decimal::Decimal;

fn trade(n: u64) -> MarketEvent {
    let at = Utc.with_ymd_and_hms(2024, 3, 1, 14, 30, 0).unwrap();
    MarketEvent::new(
        "alpaca",
        format!("SYM{n}"),
        EventPayload::Trade(Trade {
            price: Decimal::new(10_000 + n as i64, 2),
            size: Decimal::from(1),
            venue: None,
            conditions: vec![],
        }),
        at,
    )
    .with_sequence(n)
}

// Capacity 4, drop-oldest, consumer not yet scheduled: ten publishes all
// succeed, the six displaced events are counted and audited, and the
// consumer then drains exactly the last four.
#[tokio::test]
async fn drop_oldest_displaces_and_audits() {
    let sink = Arc::new(MemorySink::new());
    let audit = Arc::new(MemoryAudit::new());
    let pipeline = EventPipeline::builder(Arc::clone(&sink) as Arc<dyn nastro_core::StorageSink>)
        .policy(PipelinePolicy {
            capacity: 4,
            full_mode: FullMode::DropOldest,
            enable_metrics: true,
        })
        .flush_interval(None)
        .audit(Arc::clone(&audit) as Arc<dyn DroppedEventAudit>)
        .build();

    // Single-threaded runtime: no await between publishes, so the consumer
    // task has not run yet and cannot steal events mid-sequence.
    for n in 1..=10 {
        assert!(pipeline.try_publish(trade(n)), "publish {n} must succeed");
    }

    let metrics = pipeline.metrics();
    assert_eq!(metrics.published, 10);
    assert_eq!(metrics.dropped, 6);
    assert_eq!(metrics.queue_depth, 4);

    let records = audit.records();
    assert_eq!(records.len(), 6);
    for (i, (event, reason)) in records.iter().enumerate() {
        assert_eq!(*reason, REASON_QUEUE_FULL);
        assert_eq!(event.sequence, i as u64 + 1, "displaced oldest-first");
    }
    assert_eq!(audit.recorded(), 6);

    // Let the consumer drain, then verify exactly e7..e10 reached the sink.
    pipeline.complete();
    for _ in 0..20 {
        tokio::task::yield_now().await;
    }
    let seen: Vec<u64> = sink.events().iter().map(|e| e.sequence).collect();
    assert_eq!(seen, vec![7, 8, 9, 10]);

    let metrics = pipeline.metrics();
    assert_eq!(metrics.consumed, 4);
    assert_eq!(metrics.queue_depth, 0);
}

// Queue depth never exceeds capacity, whatever the publish pressure.
#[tokio::test]
async fn depth_is_bounded_by_capacity() {
    let sink = Arc::new(MemorySink::new());
    let pipeline = EventPipeline::builder(sink as Arc<dyn nastro_core::StorageSink>)
        .policy(PipelinePolicy {
            capacity: 8,
            full_mode: FullMode::DropOldest,
            enable_metrics: true,
        })
        .flush_interval(None)
        .build();

    for n in 0..1_000 {
        pipeline.try_publish(trade(n));
        assert!(pipeline.metrics().queue_depth <= 8);
    }
}

// Publishing into a completed pipeline is the only way try_publish returns
// false under drop-oldest.
#[tokio::test]
async fn completed_pipeline_rejects() {
    let sink = Arc::new(MemorySink::new());
    let pipeline = EventPipeline::builder(sink as Arc<dyn nastro_core::StorageSink>)
        .policy(PipelinePolicy {
            capacity: 4,
            full_mode: FullMode::DropOldest,
            enable_metrics: true,
        })
        .flush_interval(None)
        .build();

    assert!(pipeline.try_publish(trade(1)));
    pipeline.complete();
    assert!(!pipeline.try_publish(trade(2)));
    assert!(!pipeline.publish(trade(3)).await);
}
