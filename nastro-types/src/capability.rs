//! Provider capability and rate-limit descriptors.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// What a historical provider can serve.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoricalCapabilities {
    /// Split/dividend-adjusted price series.
    pub adjusted_prices: bool,
    /// Intraday bars.
    pub intraday: bool,
    /// Dividend events.
    pub dividends: bool,
    /// Split events.
    pub splits: bool,
    /// Historical quotes.
    pub quotes: bool,
    /// Historical trades.
    pub trades: bool,
    /// Auction prints.
    pub auctions: bool,
    /// Market identifiers (MICs or vendor labels) the provider covers.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub supported_markets: Vec<String>,
}

/// What a streaming provider can serve.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StreamingCapabilities {
    /// Trade prints.
    pub trades: bool,
    /// Top-of-book quotes.
    pub quotes: bool,
    /// Order-book depth.
    pub depth: bool,
    /// Depth levels cap, when the provider limits it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_depth_levels: Option<u32>,
    /// Symbols-per-subscription cap, when the provider limits it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_symbols_per_subscription: Option<u32>,
}

/// Declared request budget for a provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RateLimitSpec {
    /// Requests allowed per window.
    pub max_requests_per_window: u32,
    /// Accounting window.
    pub window: Duration,
    /// Minimum delay between consecutive requests.
    pub min_delay: Duration,
}

impl Default for RateLimitSpec {
    fn default() -> Self {
        Self {
            max_requests_per_window: 60,
            window: Duration::from_secs(60),
            min_delay: Duration::ZERO,
        }
    }
}

impl RateLimitSpec {
    /// An effectively unlimited budget (local/mock providers).
    #[must_use]
    pub const fn unlimited() -> Self {
        Self {
            max_requests_per_window: u32::MAX,
            window: Duration::from_secs(1),
            min_delay: Duration::ZERO,
        }
    }
}
