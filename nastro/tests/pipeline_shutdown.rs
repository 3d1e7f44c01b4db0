use std::sync::Arc;

use chrono::{TimeZone, Utc};
use nastro::pipeline::EventPipeline;
use nastro_mock::MemorySink;
use nastro_types::{EventPayload, FullMode, MarketEvent, PipelinePolicy};

fn heartbeat(n: u64) -> MarketEvent {
    let at = Utc.with_ymd_and_hms(2024, 3, 1, 14, 30, 0).unwrap();
    MarketEvent::new("alpaca", "AAPL", EventPayload::Heartbeat, at).with_sequence(n)
}

// close() drains the queue, runs the final flush, and closes the sink.
#[tokio::test]
async fn close_drains_and_flushes() {
    let sink = Arc::new(MemorySink::new());
    let pipeline = EventPipeline::builder(Arc::clone(&sink) as Arc<dyn nastro_core::StorageSink>)
        .policy(PipelinePolicy {
            capacity: 1_000,
            full_mode: FullMode::DropOldest,
            enable_metrics: true,
        })
        .flush_interval(None)
        .build();

    for n in 0..250 {
        assert!(pipeline.try_publish(heartbeat(n)));
    }
    pipeline.close().await;

    assert_eq!(sink.appended(), 250);
    // Final flush plus the sink-close flush.
    assert!(sink.flushes() >= 1);
    assert!(pipeline.metrics().last_flush.is_some());
}

// Wait-mode publishers suspend on a full queue and resume as the consumer
// frees space; every event arrives.
#[tokio::test]
async fn wait_mode_suspends_until_space() {
    let sink = Arc::new(MemorySink::new());
    let pipeline = Arc::new(
        EventPipeline::builder(Arc::clone(&sink) as Arc<dyn nastro_core::StorageSink>)
            .policy(PipelinePolicy::MAINTENANCE_QUEUE.with_capacity(8))
            .batch_size(4)
            .flush_interval(None)
            .build(),
    );

    let publisher = Arc::clone(&pipeline);
    let produce = tokio::spawn(async move {
        for n in 0..200 {
            assert!(publisher.publish(heartbeat(n)).await);
        }
    });
    produce.await.unwrap();

    pipeline.close().await;
    assert_eq!(sink.appended(), 200);
    assert_eq!(pipeline.metrics().dropped, 0);

    let sequences: Vec<u64> = sink.events().iter().map(|e| e.sequence).collect();
    let expected: Vec<u64> = (0..200).collect();
    assert_eq!(sequences, expected, "single-producer FIFO preserved");
}

// A sink append failure stops the consumer; the pipeline reports failed and
// publishes keep counting drops once the queue backs up.
#[tokio::test]
async fn sink_failure_stops_consumer() {
    let sink = Arc::new(MemorySink::new());
    sink.fail_appends(true);
    let pipeline = EventPipeline::builder(Arc::clone(&sink) as Arc<dyn nastro_core::StorageSink>)
        .policy(PipelinePolicy {
            capacity: 4,
            full_mode: FullMode::DropOldest,
            enable_metrics: true,
        })
        .flush_interval(None)
        .build();

    assert!(pipeline.try_publish(heartbeat(0)));
    for _ in 0..20 {
        tokio::task::yield_now().await;
    }
    assert!(pipeline.is_failed());
    assert_eq!(sink.appended(), 0);

    // The dead consumer no longer drains; the queue fills and displaces.
    for n in 1..=10 {
        assert!(pipeline.try_publish(heartbeat(n)));
    }
    assert!(pipeline.metrics().dropped >= 6);
}

// The periodic flusher keeps stamping flushes while the pipeline is idle.
#[tokio::test(start_paused = true)]
async fn periodic_flusher_runs() {
    let sink = Arc::new(MemorySink::new());
    let _pipeline = EventPipeline::builder(Arc::clone(&sink) as Arc<dyn nastro_core::StorageSink>)
        .policy(PipelinePolicy::LOGGING)
        .flush_interval(Some(std::time::Duration::from_secs(5)))
        .build();

    tokio::time::advance(std::time::Duration::from_secs(16)).await;
    tokio::task::yield_now().await;
    assert!(sink.flushes() >= 3);
}
