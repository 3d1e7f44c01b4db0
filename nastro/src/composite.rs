//! Priority-ordered fallback across historical providers.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::NaiveDate;
use nastro_core::{HistoricalProvider, NastroError, SymbolResolver};
use nastro_middleware::RetryPolicy;
use nastro_types::{Bar, HistoricalCapabilities, RateLimitSpec};

/// Routes each request through an ordered provider chain.
///
/// Providers are sorted by ascending [`priority`](HistoricalProvider::priority)
/// at construction. For each call the chain is walked in order: unavailable
/// providers are skipped, transient failures are retried per the policy
/// before failing over, permanent failures are recorded and skipped, and the
/// first non-empty result wins. An empty result is not an error; it just
/// moves the walk along.
pub struct CompositeHistorical {
    providers: Vec<Arc<dyn HistoricalProvider>>,
    resolver: Option<Arc<dyn SymbolResolver>>,
    retry: RetryPolicy,
}

impl CompositeHistorical {
    /// Build a chain from the given providers, sorted by priority.
    #[must_use]
    pub fn new(mut providers: Vec<Arc<dyn HistoricalProvider>>) -> Self {
        providers.sort_by_key(|p| p.priority());
        Self {
            providers,
            resolver: None,
            retry: RetryPolicy::default(),
        }
    }

    /// Run raw tickers through `resolver` before each provider call.
    #[must_use]
    pub fn with_resolver(mut self, resolver: Arc<dyn SymbolResolver>) -> Self {
        self.resolver = Some(resolver);
        self
    }

    /// Retry policy applied to transient provider failures.
    #[must_use]
    pub const fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// The ordered chain, highest priority first.
    #[must_use]
    pub fn providers(&self) -> &[Arc<dyn HistoricalProvider>] {
        &self.providers
    }

    async fn provider_symbol(&self, provider: &str, symbol: &str) -> String {
        let Some(resolver) = &self.resolver else {
            return symbol.to_string();
        };
        match resolver.resolve(provider, symbol).await {
            Ok(Some(mapped)) => mapped,
            Ok(None) => symbol.to_string(),
            Err(e) => {
                tracing::warn!(provider, symbol, error = %e, "symbol resolution failed, using raw");
                symbol.to_string()
            }
        }
    }
}

#[async_trait]
impl HistoricalProvider for CompositeHistorical {
    fn name(&self) -> &'static str {
        "composite"
    }

    fn display_name(&self) -> &'static str {
        "Composite"
    }

    fn description(&self) -> &'static str {
        "Priority-ordered fallback across the registered historical providers"
    }

    fn priority(&self) -> u32 {
        0
    }

    /// Union of the chain's capabilities.
    fn capabilities(&self) -> HistoricalCapabilities {
        let mut caps = HistoricalCapabilities::default();
        for p in &self.providers {
            let c = p.capabilities();
            caps.adjusted_prices |= c.adjusted_prices;
            caps.intraday |= c.intraday;
            caps.dividends |= c.dividends;
            caps.splits |= c.splits;
            caps.quotes |= c.quotes;
            caps.trades |= c.trades;
            caps.auctions |= c.auctions;
            for market in c.supported_markets {
                if !caps.supported_markets.contains(&market) {
                    caps.supported_markets.push(market);
                }
            }
        }
        caps
    }

    fn rate_limit(&self) -> RateLimitSpec {
        // Members pace themselves; the chain adds no budget of its own.
        RateLimitSpec::unlimited()
    }

    fn is_available(&self) -> bool {
        self.providers.iter().any(|p| p.is_available())
    }

    async fn daily_bars(
        &self,
        symbol: &str,
        from: Option<NaiveDate>,
        to: Option<NaiveDate>,
    ) -> Result<Vec<Bar>, NastroError> {
        let (_, bars) = self.daily_bars_attributed(symbol, from, to).await?;
        Ok(bars)
    }

    async fn daily_bars_attributed(
        &self,
        symbol: &str,
        from: Option<NaiveDate>,
        to: Option<NaiveDate>,
    ) -> Result<(String, Vec<Bar>), NastroError> {
        let mut failures: Vec<NastroError> = Vec::new();

        for provider in &self.providers {
            if !provider.is_available() {
                tracing::debug!(provider = provider.name(), "skipping unavailable provider");
                continue;
            }
            let effective = self.provider_symbol(provider.name(), symbol).await;
            let attempt = self
                .retry
                .run(|_| provider.daily_bars(&effective, from, to))
                .await;
            match attempt {
                Ok(bars) if bars.is_empty() => {
                    tracing::debug!(
                        provider = provider.name(),
                        symbol,
                        "empty series, trying next provider"
                    );
                }
                Ok(bars) => return Ok((provider.name().to_string(), bars)),
                Err(e) if e.is_skippable() => {
                    tracing::debug!(provider = provider.name(), error = %e, "provider skipped");
                }
                Err(e) => {
                    tracing::warn!(provider = provider.name(), symbol, error = %e, "provider failed");
                    failures.push(e);
                }
            }
        }

        if failures.is_empty() {
            Err(NastroError::not_found(format!("daily bars for {symbol}")))
        } else if failures.len() == 1 {
            Err(failures.remove(0))
        } else {
            Err(NastroError::AllProvidersFailed(failures))
        }
    }
}
