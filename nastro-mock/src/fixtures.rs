//! Deterministic OHLCV fixtures.

use chrono::{Datelike, Duration, NaiveDate, TimeZone, Utc};
use nastro_types::Bar;
use rust_decimal::Decimal;

/// Deterministic daily bars for `symbol` over `[from, to]` (inclusive),
/// weekends skipped. The same inputs always produce the same series, so
/// assertions can be written against exact values.
#[must_use]
pub fn daily_bars(symbol: &str, from: NaiveDate, to: NaiveDate) -> Vec<Bar> {
    let seed = symbol
        .bytes()
        .fold(7u64, |acc, b| acc.wrapping_mul(31).wrapping_add(u64::from(b)));
    let base_cents = 1_000 + i64::try_from(seed % 49_000).unwrap_or(0);

    let mut bars = Vec::new();
    let mut day = from;
    let mut i = 0i64;
    while day <= to {
        if !matches!(day.weekday(), chrono::Weekday::Sat | chrono::Weekday::Sun) {
            let drift = (i % 7) - 3; // small deterministic wiggle, in cents
            let open = Decimal::new(base_cents + drift * 5, 2);
            let close = Decimal::new(base_cents + drift * 5 + 10, 2);
            let high = open.max(close) + Decimal::new(25, 2);
            let low = open.min(close) - Decimal::new(25, 2);
            bars.push(Bar {
                start: Utc
                    .from_utc_datetime(&day.and_hms_opt(0, 0, 0).expect("midnight exists")),
                open,
                high,
                low,
                close,
                volume: Decimal::from(10_000 + (seed % 90_000) + (i as u64 % 1_000)),
            });
            i += 1;
        }
        day += Duration::days(1);
    }
    bars
}
