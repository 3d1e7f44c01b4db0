//! Configuration records with the defaults the core components document.

use std::collections::HashSet;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::integrity::IntegritySeverity;

/// Auto-resubscribe policy tuning.
///
/// Defaults follow the documented recovery contract: a symbol that just
/// recovered is left alone for `symbol_cooldown`, attempts are spaced by
/// `min_resubscribe_interval`, and repeated failures open first the symbol's
/// circuit and then the global one.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResubscribeConfig {
    /// Findings below this severity are ignored.
    pub min_severity: IntegritySeverity,
    /// Deny attempts for a symbol this soon after a success.
    pub symbol_cooldown: Duration,
    /// Deny attempts for a symbol this soon after any attempt.
    pub min_resubscribe_interval: Duration,
    /// Consecutive failures before a symbol's circuit opens.
    pub symbol_circuit_breaker_threshold: u32,
    /// How long an open symbol circuit stays open.
    pub symbol_circuit_breaker_duration: Duration,
    /// Consecutive failures before the global circuit opens.
    pub circuit_breaker_threshold: u32,
    /// How long the global circuit stays open before a half-open test.
    pub circuit_breaker_duration: Duration,
    /// Minimum spacing between half-open test attempts.
    pub half_open_test_interval: Duration,
    /// Cadence of the stale-state sweep.
    pub sweep_interval: Duration,
    /// Symbol states idle longer than this are evicted by the sweep.
    pub state_expiry: Duration,
}

impl Default for ResubscribeConfig {
    fn default() -> Self {
        Self {
            min_severity: IntegritySeverity::Error,
            symbol_cooldown: Duration::from_secs(30),
            min_resubscribe_interval: Duration::from_secs(5),
            symbol_circuit_breaker_threshold: 3,
            symbol_circuit_breaker_duration: Duration::from_secs(120),
            circuit_breaker_threshold: 5,
            circuit_breaker_duration: Duration::from_secs(60),
            half_open_test_interval: Duration::from_secs(5),
            sweep_interval: Duration::from_secs(300),
            state_expiry: Duration::from_secs(3600),
        }
    }
}

/// Gap-fill trigger tuning.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GapFillConfig {
    /// Master switch.
    pub enabled: bool,
    /// Reconnect gaps shorter than this are ignored.
    pub minimum_gap: Duration,
}

impl Default for GapFillConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            minimum_gap: Duration::from_secs(10),
        }
    }
}

/// Exponential backoff for the streaming connect path.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectRetryConfig {
    /// First retry delay.
    pub base_delay: Duration,
    /// Delay multiplier per failed attempt.
    pub multiplier: u32,
    /// Attempts before giving up (including the first).
    pub max_attempts: u32,
    /// Random jitter percentage [0, 100] added to each delay.
    pub jitter_percent: u8,
    /// Per-attempt cap covering socket open plus authentication.
    pub attempt_timeout: Duration,
}

impl Default for ConnectRetryConfig {
    fn default() -> Self {
        Self {
            base_delay: Duration::from_secs(2),
            multiplier: 2,
            max_attempts: 5,
            jitter_percent: 20,
            attempt_timeout: Duration::from_secs(30),
        }
    }
}

/// Circuit breaker guarding the streaming connect path.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectBreakerConfig {
    /// Consecutive connect failures before the breaker opens.
    pub failure_threshold: u32,
    /// How long the breaker rejects connect attempts once open.
    pub open_duration: Duration,
}

impl Default for ConnectBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            open_duration: Duration::from_secs(30),
        }
    }
}

/// Streaming liveness probe tuning.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HeartbeatConfig {
    /// Probe cadence.
    pub interval: Duration,
    /// Per-probe timeout.
    pub probe_timeout: Duration,
    /// Consecutive probe failures before the connection is declared lost.
    pub failure_threshold: u32,
}

impl Default for HeartbeatConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(30),
            probe_timeout: Duration::from_secs(10),
            failure_threshold: 3,
        }
    }
}

/// Canonicalization rollout configuration for the enriching publisher.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CanonicalizeConfig {
    /// When set, only these raw symbols are enriched; everything else is
    /// forwarded untouched.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pilot_symbols: Option<HashSet<String>>,
    /// Emit the raw event before the enriched one so consumers can compare.
    pub dual_write: bool,
    /// Version stamped on enriched events. Must be non-zero.
    pub version: u32,
}

impl Default for CanonicalizeConfig {
    fn default() -> Self {
        Self {
            pilot_symbols: None,
            dual_write: false,
            version: 1,
        }
    }
}

impl CanonicalizeConfig {
    /// Whether enrichment applies to this raw symbol under the pilot filter.
    #[must_use]
    pub fn symbol_in_pilot(&self, symbol: &str) -> bool {
        self.pilot_symbols
            .as_ref()
            .is_none_or(|pilot| pilot.contains(symbol))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resubscribe_defaults_match_contract() {
        let cfg = ResubscribeConfig::default();
        assert_eq!(cfg.min_severity, IntegritySeverity::Error);
        assert_eq!(cfg.symbol_cooldown, Duration::from_secs(30));
        assert_eq!(cfg.min_resubscribe_interval, Duration::from_secs(5));
        assert_eq!(cfg.symbol_circuit_breaker_threshold, 3);
        assert_eq!(cfg.circuit_breaker_threshold, 5);
    }

    #[test]
    fn pilot_filter_absent_means_all() {
        let cfg = CanonicalizeConfig::default();
        assert!(cfg.symbol_in_pilot("ANY"));

        let cfg = CanonicalizeConfig {
            pilot_symbols: Some(["AAPL".to_string()].into_iter().collect()),
            ..CanonicalizeConfig::default()
        };
        assert!(cfg.symbol_in_pilot("AAPL"));
        assert!(!cfg.symbol_in_pilot("MSFT"));
    }
}
