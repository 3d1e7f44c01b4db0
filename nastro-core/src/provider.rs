//! Historical-data role traits.
//!
//! Wire adapters for concrete vendors live outside this workspace; they
//! participate by implementing these traits. The composite router in the
//! `nastro` crate orders implementations by [`priority`](HistoricalProvider::priority)
//! and fails over between them.

use async_trait::async_trait;
use chrono::NaiveDate;
use nastro_types::{Bar, HistoricalCapabilities, RateLimitSpec, SymbolSpec};

use crate::NastroError;

/// A source of historical bars.
#[async_trait]
pub trait HistoricalProvider: Send + Sync {
    /// A stable lowercase identifier for priority lists (e.g. "stooq").
    fn name(&self) -> &'static str;

    /// Human-friendly name for UIs.
    fn display_name(&self) -> &'static str {
        self.name()
    }

    /// One-line description for UIs.
    fn description(&self) -> &'static str {
        ""
    }

    /// Selection order among providers; lower is tried first.
    fn priority(&self) -> u32;

    /// What this provider can serve.
    fn capabilities(&self) -> HistoricalCapabilities;

    /// Declared request budget. Enforced by the rate-limiting wrapper in
    /// `nastro-middleware`, not by callers.
    fn rate_limit(&self) -> RateLimitSpec {
        RateLimitSpec::default()
    }

    /// Whether the provider has the configuration it needs (credentials,
    /// endpoints). Unavailable providers are skipped without error.
    fn is_available(&self) -> bool {
        true
    }

    /// Fetch daily bars for a symbol over an optional inclusive date range.
    ///
    /// An empty vector is a valid answer ("no data for that range") and does
    /// not count as a failure.
    async fn daily_bars(
        &self,
        symbol: &str,
        from: Option<NaiveDate>,
        to: Option<NaiveDate>,
    ) -> Result<Vec<Bar>, NastroError>;

    /// Fetch daily bars together with the name of the provider that actually
    /// served them.
    ///
    /// For plain providers the attribution is the provider itself; routing
    /// providers (the composite) override this to surface which member of
    /// the chain answered.
    async fn daily_bars_attributed(
        &self,
        symbol: &str,
        from: Option<NaiveDate>,
        to: Option<NaiveDate>,
    ) -> Result<(String, Vec<Bar>), NastroError> {
        let bars = self.daily_bars(symbol, from, to).await?;
        Ok((self.name().to_string(), bars))
    }

    /// Fetch split/dividend-adjusted daily bars, where supported.
    async fn adjusted_daily_bars(
        &self,
        symbol: &str,
        from: Option<NaiveDate>,
        to: Option<NaiveDate>,
    ) -> Result<Vec<Bar>, NastroError> {
        let _ = (symbol, from, to);
        Err(NastroError::unsupported("adjusted_daily_bars"))
    }

    /// Fetch intraday bars at the given interval in minutes, where supported.
    async fn intraday_bars(
        &self,
        symbol: &str,
        interval_minutes: u32,
        from: Option<NaiveDate>,
        to: Option<NaiveDate>,
    ) -> Result<Vec<Bar>, NastroError> {
        let _ = (symbol, interval_minutes, from, to);
        Err(NastroError::unsupported("intraday_bars"))
    }
}

/// Maps raw tickers to the ticker a given provider expects.
///
/// Backed by an OpenFIGI-like service in production; the composite router
/// treats resolution as optional and falls back to the raw symbol.
#[async_trait]
pub trait SymbolResolver: Send + Sync {
    /// Resolve `symbol` for `provider`. `Ok(None)` means "no mapping known";
    /// callers then use the raw symbol unchanged.
    async fn resolve(&self, provider: &str, symbol: &str)
    -> Result<Option<String>, NastroError>;
}

/// Applies a symbol's streaming configuration, forcing an unsubscribe and
/// resubscribe on the live connection.
///
/// Implemented by the streaming layer; consumed by the auto-resubscribe
/// policy when integrity findings call for recovery.
#[async_trait]
pub trait SubscriptionManager: Send + Sync {
    /// Re-apply the given spec on the live connection.
    async fn apply(&self, spec: &SymbolSpec) -> Result<(), NastroError>;
}
