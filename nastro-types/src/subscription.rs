//! Streaming subscription records.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// The stream a subscription attaches to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[non_exhaustive]
pub enum SubscriptionKind {
    /// Trade prints.
    Trades,
    /// Order-book depth.
    Depth,
    /// Top-of-book quotes.
    Quotes,
}

impl SubscriptionKind {
    /// Stable lowercase identifier for logs and wire messages.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Trades => "trades",
            Self::Depth => "depth",
            Self::Quotes => "quotes",
        }
    }
}

impl core::fmt::Display for SubscriptionKind {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A live subscription as tracked by the registry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Subscription {
    /// Process-unique id, monotonically allocated from the registry's base.
    pub id: u64,
    /// Raw symbol.
    pub symbol: String,
    /// Stream kind.
    pub kind: SubscriptionKind,
    /// Allocation timestamp.
    pub created_at: DateTime<Utc>,
}

/// Per-symbol streaming configuration handed to providers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SymbolSpec {
    /// Raw symbol to subscribe.
    pub symbol: String,
    /// Subscribe the trades stream.
    pub subscribe_trades: bool,
    /// Subscribe the depth stream.
    pub subscribe_depth: bool,
    /// Requested depth levels, where the provider supports a cap.
    pub depth_levels: Option<u32>,
    /// Security type hint (e.g. "STK").
    pub security_type: String,
    /// Routing exchange hint.
    pub exchange: String,
    /// Currency hint.
    pub currency: String,
    /// Primary listing exchange, when disambiguation is needed.
    pub primary_exchange: Option<String>,
}

impl SymbolSpec {
    /// Equity spec subscribing trades only, with conventional defaults.
    #[must_use]
    pub fn trades(symbol: impl Into<String>) -> Self {
        Self {
            symbol: symbol.into(),
            subscribe_trades: true,
            subscribe_depth: false,
            depth_levels: None,
            security_type: "STK".to_string(),
            exchange: "SMART".to_string(),
            currency: "USD".to_string(),
            primary_exchange: None,
        }
    }

    /// Equity spec subscribing trades and depth.
    #[must_use]
    pub fn trades_and_depth(symbol: impl Into<String>, depth_levels: u32) -> Self {
        let mut spec = Self::trades(symbol);
        spec.subscribe_depth = true;
        spec.depth_levels = Some(depth_levels);
        spec
    }
}
