use std::sync::Arc;

use chrono::{TimeZone, Utc};
use nastro::pipeline::EventPipeline;
use nastro_mock::MemorySink;
use nastro_types::{EventPayload, FullMode, MarketEvent, PipelinePolicy};
use proptest::prelude::*;

fn heartbeat(n: u64) -> MarketEvent {
    let at = Utc.with_ymd_and_hms(2024, 3, 1, 14, 30, 0).unwrap();
    MarketEvent::new("alpaca", "AAPL", EventPayload::Heartbeat, at).with_sequence(n)
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    // With no displacement (capacity >= publishes) every accepted publish is
    // eventually consumed: published = consumed + queue depth at every
    // steady-state observation, and nothing is dropped.
    #[test]
    fn published_equals_consumed_plus_queued(total in 1usize..400) {
        let rt = tokio::runtime::Builder::new_current_thread()
            .enable_time()
            .build()
            .expect("runtime");
        rt.block_on(async move {
            let sink = Arc::new(MemorySink::new());
            let pipeline = EventPipeline::builder(
                Arc::clone(&sink) as Arc<dyn nastro_core::StorageSink>
            )
            .policy(PipelinePolicy {
                capacity: 1_024,
                full_mode: FullMode::DropOldest,
                enable_metrics: true,
            })
            .flush_interval(None)
            .build();

            for n in 0..total {
                prop_assert!(pipeline.try_publish(heartbeat(n as u64)));
                let m = pipeline.metrics();
                prop_assert_eq!(m.published, m.consumed + m.queue_depth as u64);
            }

            pipeline.complete();
            for _ in 0..64 {
                tokio::task::yield_now().await;
            }

            let m = pipeline.metrics();
            prop_assert_eq!(m.published, total as u64);
            prop_assert_eq!(m.consumed, total as u64);
            prop_assert_eq!(m.dropped, 0);
            prop_assert_eq!(m.queue_depth, 0);
            prop_assert_eq!(sink.appended(), total);
            Ok(())
        })?;
    }

    // Under drop-oldest with capacity C, the displaced count makes the books
    // balance: published = consumed + queued + dropped.
    #[test]
    fn displacement_accounting_balances(total in 1usize..200, capacity in 1usize..16) {
        let rt = tokio::runtime::Builder::new_current_thread()
            .enable_time()
            .build()
            .expect("runtime");
        rt.block_on(async move {
            let sink = Arc::new(MemorySink::new());
            let pipeline = EventPipeline::builder(
                Arc::clone(&sink) as Arc<dyn nastro_core::StorageSink>
            )
            .policy(PipelinePolicy {
                capacity,
                full_mode: FullMode::DropOldest,
                enable_metrics: true,
            })
            .flush_interval(None)
            .build();

            // No awaits: the consumer is never scheduled while publishing.
            for n in 0..total {
                prop_assert!(pipeline.try_publish(heartbeat(n as u64)));
                let m = pipeline.metrics();
                prop_assert!(m.queue_depth <= capacity);
                prop_assert_eq!(m.published, m.consumed + m.queue_depth as u64 + m.dropped);
            }

            pipeline.complete();
            for _ in 0..64 {
                tokio::task::yield_now().await;
            }

            let m = pipeline.metrics();
            prop_assert_eq!(m.published, total as u64);
            prop_assert_eq!(m.dropped, total.saturating_sub(capacity) as u64);
            prop_assert_eq!(m.consumed, total.min(capacity) as u64);
            Ok(())
        })?;
    }
}
