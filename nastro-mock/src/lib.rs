//! nastro-mock
//!
//! Deterministic collaborators for tests and examples: a scripted
//! [`MockHistorical`] provider, an in-memory [`MemorySink`], and a recording
//! [`MemoryAudit`] trail.

pub mod fixtures;

use std::collections::HashSet;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use async_trait::async_trait;
use chrono::NaiveDate;
use nastro_core::{DroppedEventAudit, HistoricalProvider, NastroError, StorageSink};
use nastro_types::{Bar, HistoricalCapabilities, MarketEvent, RateLimitSpec};

/// Scripted historical provider with deterministic fixture data.
///
/// Symbol conventions, mirroring forced-failure symbols used across the test
/// suites:
/// - `"FAIL"` returns a transient error on every call.
/// - `"MISSING"` returns a permanent not-found error.
/// - symbols listed in `empty_symbols` return an empty series without error.
/// - everything else returns bars from [`fixtures::daily_bars`].
pub struct MockHistorical {
    name: &'static str,
    priority: u32,
    available: AtomicBool,
    empty_symbols: HashSet<String>,
    failing_symbols: HashSet<String>,
    rate_limit: RateLimitSpec,
    calls: AtomicU64,
}

impl MockHistorical {
    /// Provider with the given name and selection priority.
    #[must_use]
    pub fn new(name: &'static str, priority: u32) -> Self {
        Self {
            name,
            priority,
            available: AtomicBool::new(true),
            empty_symbols: HashSet::new(),
            failing_symbols: HashSet::new(),
            rate_limit: RateLimitSpec::unlimited(),
            calls: AtomicU64::new(0),
        }
    }

    /// Script the given symbols to return empty series.
    #[must_use]
    pub fn with_empty_symbols<I: IntoIterator<Item = S>, S: Into<String>>(
        mut self,
        symbols: I,
    ) -> Self {
        self.empty_symbols = symbols.into_iter().map(Into::into).collect();
        self
    }

    /// Script the given symbols to fail transiently on this instance only.
    #[must_use]
    pub fn with_failing_symbols<I: IntoIterator<Item = S>, S: Into<String>>(
        mut self,
        symbols: I,
    ) -> Self {
        self.failing_symbols = symbols.into_iter().map(Into::into).collect();
        self
    }

    /// Declare a rate-limit budget for middleware tests.
    #[must_use]
    pub const fn with_rate_limit(mut self, spec: RateLimitSpec) -> Self {
        self.rate_limit = spec;
        self
    }

    /// Toggle availability, simulating missing configuration.
    pub fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::SeqCst);
    }

    /// Number of `daily_bars` calls observed.
    #[must_use]
    pub fn calls(&self) -> u64 {
        self.calls.load(Ordering::SeqCst)
    }

    fn default_range(from: Option<NaiveDate>, to: Option<NaiveDate>) -> (NaiveDate, NaiveDate) {
        let to = to.unwrap_or_else(|| NaiveDate::from_ymd_opt(2024, 3, 29).expect("valid date"));
        let from =
            from.unwrap_or_else(|| NaiveDate::from_ymd_opt(2024, 3, 1).expect("valid date"));
        (from, to)
    }
}

#[async_trait]
impl HistoricalProvider for MockHistorical {
    fn name(&self) -> &'static str {
        self.name
    }

    fn display_name(&self) -> &'static str {
        "Mock"
    }

    fn description(&self) -> &'static str {
        "Deterministic fixture data for tests and examples"
    }

    fn priority(&self) -> u32 {
        self.priority
    }

    fn capabilities(&self) -> HistoricalCapabilities {
        HistoricalCapabilities {
            adjusted_prices: false,
            intraday: false,
            dividends: false,
            splits: false,
            quotes: false,
            trades: false,
            auctions: false,
            supported_markets: vec!["XNYS".into(), "XNAS".into()],
        }
    }

    fn rate_limit(&self) -> RateLimitSpec {
        self.rate_limit
    }

    fn is_available(&self) -> bool {
        self.available.load(Ordering::SeqCst)
    }

    async fn daily_bars(
        &self,
        symbol: &str,
        from: Option<NaiveDate>,
        to: Option<NaiveDate>,
    ) -> Result<Vec<Bar>, NastroError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        match symbol {
            "FAIL" => Err(NastroError::transient(self.name, "forced failure")),
            "MISSING" => Err(NastroError::not_found(format!("daily bars for {symbol}"))),
            _ if self.failing_symbols.contains(symbol) => {
                Err(NastroError::transient(self.name, "scripted failure"))
            }
            _ if self.empty_symbols.contains(symbol) => Ok(Vec::new()),
            _ => {
                let (from, to) = Self::default_range(from, to);
                Ok(fixtures::daily_bars(symbol, from, to))
            }
        }
    }
}

/// In-memory sink recording everything appended to it.
#[derive(Default)]
pub struct MemorySink {
    events: Mutex<Vec<MarketEvent>>,
    flushes: AtomicU64,
    fail_appends: AtomicBool,
}

impl MemorySink {
    /// Empty sink.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Make subsequent appends fail with a storage error, for consumer
    /// failure-path tests.
    pub fn fail_appends(&self, fail: bool) {
        self.fail_appends.store(fail, Ordering::SeqCst);
    }

    /// Copy of everything appended so far.
    ///
    /// # Panics
    /// Panics if the internal mutex is poisoned.
    #[must_use]
    pub fn events(&self) -> Vec<MarketEvent> {
        self.events.lock().expect("mutex poisoned").clone()
    }

    /// Number of appended events.
    ///
    /// # Panics
    /// Panics if the internal mutex is poisoned.
    #[must_use]
    pub fn appended(&self) -> usize {
        self.events.lock().expect("mutex poisoned").len()
    }

    /// Number of flushes observed.
    #[must_use]
    pub fn flushes(&self) -> u64 {
        self.flushes.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl StorageSink for MemorySink {
    async fn append(&self, event: &MarketEvent) -> Result<(), NastroError> {
        if self.fail_appends.load(Ordering::SeqCst) {
            return Err(NastroError::storage("forced append failure"));
        }
        self.events.lock().expect("mutex poisoned").push(event.clone());
        Ok(())
    }

    async fn flush(&self) -> Result<(), NastroError> {
        self.flushes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// Audit trail retaining dropped events in memory.
#[derive(Default)]
pub struct MemoryAudit {
    records: Mutex<Vec<(MarketEvent, &'static str)>>,
}

impl MemoryAudit {
    /// Empty trail.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Copy of every `(event, reason)` recorded so far.
    ///
    /// # Panics
    /// Panics if the internal mutex is poisoned.
    #[must_use]
    pub fn records(&self) -> Vec<(MarketEvent, &'static str)> {
        self.records.lock().expect("mutex poisoned").clone()
    }
}

impl DroppedEventAudit for MemoryAudit {
    fn record(&self, event: &MarketEvent, reason: &'static str) {
        self.records
            .lock()
            .expect("mutex poisoned")
            .push((event.clone(), reason));
    }

    fn recorded(&self) -> u64 {
        self.records.lock().expect("mutex poisoned").len() as u64
    }
}
