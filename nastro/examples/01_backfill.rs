//! Run a composite backfill over the mock providers and print the result.
//!
//! ```bash
//! cargo run -p nastro --example 01_backfill
//! ```

use std::sync::Arc;

use chrono::NaiveDate;
use nastro::backfill::BackfillCoordinator;
use nastro::composite::CompositeHistorical;
use nastro_core::HistoricalProvider;
use nastro_mock::{MemorySink, MockHistorical};
use nastro_types::BackfillRequest;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    // Stooq answers nothing for MSFT, so the chain falls through to Yahoo.
    let stooq = Arc::new(MockHistorical::new("stooq", 10).with_empty_symbols(["MSFT"]));
    let yahoo = Arc::new(MockHistorical::new("yahoo", 20));
    let composite = Arc::new(CompositeHistorical::new(vec![
        stooq as Arc<dyn HistoricalProvider>,
        yahoo as Arc<dyn HistoricalProvider>,
    ]));

    let data_root = std::env::temp_dir().join("nastro-example");
    let coordinator = BackfillCoordinator::builder(
        || Arc::new(MemorySink::new()) as Arc<dyn nastro_core::StorageSink>,
        &data_root,
    )
    .provider(composite)
    .build();

    let result = coordinator
        .run(BackfillRequest {
            provider: "composite".into(),
            symbols: vec!["AAPL".into(), "MSFT".into()],
            from: NaiveDate::from_ymd_opt(2024, 3, 1),
            to: NaiveDate::from_ymd_opt(2024, 3, 8),
        })
        .await?;

    println!(
        "success={} bars={} window={:?}..{:?}",
        result.success, result.bars_written, result.from, result.to
    );

    for job in coordinator.tracker().list() {
        println!(
            "job {} [{:?}] {}/{} symbols, {} bars",
            job.progress.job_id,
            job.progress.status,
            job.progress.completed_symbols,
            job.progress.symbols.len(),
            job.progress.total_bars_written
        );
    }

    println!("status file: {:?}", data_root.join(".mdc/backfill_status.json"));
    Ok(())
}
