//! Reconnect notifications emitted by streaming clients.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Published to the reconnect channel after a streaming client recovers its
/// connection. The gap window drives gap-fill backfills.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReconnectEvent {
    /// Streaming provider name.
    pub provider: String,
    /// When the connection was observed lost.
    pub disconnected_at: DateTime<Utc>,
    /// When streaming resumed.
    pub reconnected_at: DateTime<Utc>,
}

impl ReconnectEvent {
    /// Length of the outage window. Clamped to zero if clocks disagree.
    #[must_use]
    pub fn gap(&self) -> std::time::Duration {
        (self.reconnected_at - self.disconnected_at)
            .to_std()
            .unwrap_or(std::time::Duration::ZERO)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn gap_duration() {
        let down = Utc.with_ymd_and_hms(2024, 3, 1, 14, 30, 0).unwrap();
        let up = Utc.with_ymd_and_hms(2024, 3, 1, 14, 30, 45).unwrap();
        let evt = ReconnectEvent {
            provider: "ALPACA".into(),
            disconnected_at: down,
            reconnected_at: up,
        };
        assert_eq!(evt.gap(), std::time::Duration::from_secs(45));
    }

    #[test]
    fn gap_clamps_on_clock_skew() {
        let down = Utc.with_ymd_and_hms(2024, 3, 1, 14, 30, 45).unwrap();
        let up = Utc.with_ymd_and_hms(2024, 3, 1, 14, 30, 0).unwrap();
        let evt = ReconnectEvent {
            provider: "ALPACA".into(),
            disconnected_at: down,
            reconnected_at: up,
        };
        assert_eq!(evt.gap(), std::time::Duration::ZERO);
    }
}
