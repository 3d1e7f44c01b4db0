use thiserror::Error;

/// Unified error type for the nastro workspace.
///
/// Variants are grouped by how callers recover: configuration problems make a
/// provider skippable, transient problems are retried or failed over,
/// permanent provider errors are recorded per symbol, and storage errors are
/// fatal to the consuming pipeline.
#[derive(Debug, Error)]
pub enum NastroError {
    /// The requested capability is not implemented by the target provider.
    #[error("unsupported capability: {capability}")]
    Unsupported {
        /// Capability label (e.g. "intraday_bars").
        capability: &'static str,
    },

    /// Invalid input argument.
    #[error("invalid argument: {0}")]
    InvalidArg(String),

    /// A required credential or endpoint is missing; the provider reports
    /// itself unavailable and callers skip it.
    #[error("not configured: {what}")]
    NotConfigured {
        /// Description of the missing configuration.
        what: String,
    },

    /// A provider failed permanently for this request (4xx other than 429,
    /// malformed response, unknown symbol).
    #[error("{provider} failed: {msg}")]
    Provider {
        /// Provider name that failed.
        provider: String,
        /// Human-readable error message.
        msg: String,
    },

    /// A provider failed in a way that is expected to heal (timeout, 5xx,
    /// socket read/write error). Recovered locally by retry or reconnect.
    #[error("{provider} transient failure: {msg}")]
    Transient {
        /// Provider name that failed.
        provider: String,
        /// Human-readable error message.
        msg: String,
    },

    /// A provider's request budget is exhausted.
    #[error("{provider} rate limited, retry in {retry_in_ms}ms")]
    RateLimited {
        /// Provider name that throttled.
        provider: String,
        /// Time until the budget frees up, in milliseconds.
        retry_in_ms: u64,
    },

    /// An individual operation exceeded its timeout.
    #[error("timed out: {operation} via {provider}")]
    Timeout {
        /// Provider name that timed out.
        provider: String,
        /// Operation label (e.g. "daily_bars", "connect").
        operation: &'static str,
    },

    /// A resource or symbol could not be found.
    #[error("not found: {what}")]
    NotFound {
        /// Description of the missing resource, e.g. "daily bars for XYZ".
        what: String,
    },

    /// All selected providers failed; contains the individual failures.
    #[error("all providers failed: {0:?}")]
    AllProvidersFailed(Vec<NastroError>),

    /// Durable sink failure. Fatal to the consuming pipeline.
    #[error("storage failure: {0}")]
    Storage(String),

    /// The operation was canceled by its owner. Propagated, not logged.
    #[error("canceled")]
    Canceled,

    /// Unknown/opaque error.
    #[error("unknown error: {0}")]
    Other(String),
}

impl NastroError {
    /// Helper: build an `Unsupported` error for a capability label.
    #[must_use]
    pub const fn unsupported(capability: &'static str) -> Self {
        Self::Unsupported { capability }
    }

    /// Helper: build a `NotConfigured` error.
    pub fn not_configured(what: impl Into<String>) -> Self {
        Self::NotConfigured { what: what.into() }
    }

    /// Helper: build a permanent `Provider` error.
    pub fn provider(provider: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::Provider {
            provider: provider.into(),
            msg: msg.into(),
        }
    }

    /// Helper: build a `Transient` error.
    pub fn transient(provider: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::Transient {
            provider: provider.into(),
            msg: msg.into(),
        }
    }

    /// Helper: build a `RateLimited` error.
    pub fn rate_limited(provider: impl Into<String>, retry_in_ms: u64) -> Self {
        Self::RateLimited {
            provider: provider.into(),
            retry_in_ms,
        }
    }

    /// Helper: build a `Timeout` error.
    pub fn timeout(provider: impl Into<String>, operation: &'static str) -> Self {
        Self::Timeout {
            provider: provider.into(),
            operation,
        }
    }

    /// Helper: build a `NotFound` error.
    pub fn not_found(what: impl Into<String>) -> Self {
        Self::NotFound { what: what.into() }
    }

    /// Helper: build a `Storage` error.
    pub fn storage(msg: impl Into<String>) -> Self {
        Self::Storage(msg.into())
    }

    /// Whether retrying the same operation may succeed without intervention.
    ///
    /// Transient socket/5xx failures, rate limits, and timeouts qualify;
    /// everything else requires either configuration or different input.
    #[must_use]
    pub const fn is_transient(&self) -> bool {
        matches!(
            self,
            Self::Transient { .. } | Self::RateLimited { .. } | Self::Timeout { .. }
        )
    }

    /// Whether the failure should disqualify the provider for this call
    /// without counting as a data error (missing credentials, capability gap).
    #[must_use]
    pub const fn is_skippable(&self) -> bool {
        matches!(self, Self::NotConfigured { .. } | Self::Unsupported { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transient_classification() {
        assert!(NastroError::transient("stooq", "503").is_transient());
        assert!(NastroError::rate_limited("stooq", 500).is_transient());
        assert!(NastroError::timeout("stooq", "daily_bars").is_transient());
        assert!(!NastroError::provider("stooq", "404").is_transient());
        assert!(!NastroError::not_found("bars for XYZ").is_transient());
        assert!(!NastroError::Canceled.is_transient());
    }

    #[test]
    fn skippable_classification() {
        assert!(NastroError::not_configured("STOOQ_API_KEY").is_skippable());
        assert!(NastroError::unsupported("intraday_bars").is_skippable());
        assert!(!NastroError::provider("stooq", "boom").is_skippable());
    }
}
