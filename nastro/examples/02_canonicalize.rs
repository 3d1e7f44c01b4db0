//! Dual-write canonicalization through a bounded pipeline.
//!
//! ```bash
//! cargo run -p nastro --example 02_canonicalize
//! ```

use std::sync::Arc;

use chrono::Utc;
use nastro::pipeline::EventPipeline;
use nastro::publish::{AtomicCanonMetrics, CanonicalizingPublisher, EventPublisher};
use nastro_core::canon::{Canonicalizer, MappingTable};
use nastro_mock::MemorySink;
use nastro_types::{CanonicalizeConfig, EventPayload, MarketEvent, PipelinePolicy, Trade};
use rust_decimal::Decimal;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let venues =
        MappingTable::from_json_str(r#"{"version":1,"mappings":{"ALPACA":{"V":"XNYS"}}}"#)?;
    let canon = Arc::new(Canonicalizer::new(
        MappingTable::empty(),
        venues,
        MappingTable::empty(),
    ));

    let sink = Arc::new(MemorySink::new());
    let pipeline = EventPipeline::builder(Arc::clone(&sink) as Arc<dyn nastro_core::StorageSink>)
        .policy(PipelinePolicy::HIGH_THROUGHPUT)
        .build();

    let metrics = Arc::new(AtomicCanonMetrics::new());
    let publisher = CanonicalizingPublisher::new(
        pipeline,
        canon,
        CanonicalizeConfig {
            pilot_symbols: Some(["AAPL".to_string()].into_iter().collect()),
            dual_write: true,
            version: 1,
        },
        Arc::clone(&metrics) as Arc<dyn nastro::publish::CanonMetricsSink>,
    );

    for (symbol, cents) in [("AAPL", 18950i64), ("MSFT", 40312), ("AAPL", 18962)] {
        let event = MarketEvent::new(
            "alpaca",
            symbol,
            EventPayload::Trade(Trade {
                price: Decimal::new(cents, 2),
                size: Decimal::from(100),
                venue: Some("V".into()),
                conditions: vec![],
            }),
            Utc::now(),
        );
        publisher.publish(event).await;
    }

    publisher.inner().close().await;

    for event in sink.events() {
        println!(
            "{} {} v{} canonical={:?} venue={:?}",
            event.source,
            event.symbol,
            event.canonicalization_version,
            event.canonical_symbol,
            event.canonical_venue
        );
    }
    let snap = metrics.snapshot();
    println!(
        "canonicalized={} skipped={} dual_writes={} avg_us={}",
        snap.canonicalized, snap.skipped, snap.dual_writes, snap.avg_duration_micros
    );
    Ok(())
}
