//! The canonical market event carried from ingress to the storage sink.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::integrity::IntegrityReport;

/// Enrichment tier of an event. Monotonic: an event may move from `Raw` to
/// `Enriched`, never back.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Tier {
    /// As delivered by the provider; no canonical identifiers attached.
    #[default]
    Raw,
    /// Canonical symbol/venue resolved and a canonicalization version stamped.
    Enriched,
}

/// Discriminant of an event's payload, used for routing and metrics without
/// matching the full payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[non_exhaustive]
pub enum EventKind {
    /// Executed trade print.
    Trade,
    /// Top-of-book quote.
    Quote,
    /// Aggregated level-2 depth snapshot.
    L2Snapshot,
    /// Full limit-order-book snapshot.
    LobSnapshot,
    /// OHLCV bar produced by a historical backfill.
    HistoricalBar,
    /// Provider liveness signal; never enriched, never persisted as a bar.
    Heartbeat,
    /// Data-quality finding observed upstream (gap, out-of-order, stale).
    Integrity,
    /// Data-quality finding specific to depth feeds (invalid position).
    DepthIntegrity,
}

/// Executed trade print.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Trade {
    /// Execution price.
    pub price: Decimal,
    /// Executed size.
    pub size: Decimal,
    /// Raw venue identifier as delivered by the provider, if any.
    pub venue: Option<String>,
    /// Raw condition codes as delivered by the provider.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub conditions: Vec<String>,
}

/// Top-of-book quote.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Quote {
    /// Best bid price.
    pub bid: Decimal,
    /// Size available at the best bid.
    pub bid_size: Decimal,
    /// Best ask price.
    pub ask: Decimal,
    /// Size available at the best ask.
    pub ask_size: Decimal,
    /// Raw venue identifier as delivered by the provider, if any.
    pub venue: Option<String>,
}

/// One price level of a depth snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DepthLevel {
    /// Level price.
    pub price: Decimal,
    /// Aggregate size at this level.
    pub size: Decimal,
}

/// Aggregated level-2 depth snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct L2Snapshot {
    /// Bid levels, best first.
    pub bids: Vec<DepthLevel>,
    /// Ask levels, best first.
    pub asks: Vec<DepthLevel>,
    /// Raw venue identifier as delivered by the provider, if any.
    pub venue: Option<String>,
}

/// Full limit-order-book snapshot with the provider's book sequence.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LobSnapshot {
    /// Bid levels, best first.
    pub bids: Vec<DepthLevel>,
    /// Ask levels, best first.
    pub asks: Vec<DepthLevel>,
    /// Provider book sequence number for the snapshot.
    pub book_sequence: u64,
    /// Raw venue identifier as delivered by the provider, if any.
    pub venue: Option<String>,
}

/// OHLCV record for a symbol over a time bucket.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Bar {
    /// Bucket start.
    pub start: DateTime<Utc>,
    /// Open price.
    pub open: Decimal,
    /// High price.
    pub high: Decimal,
    /// Low price.
    pub low: Decimal,
    /// Close price.
    pub close: Decimal,
    /// Traded volume over the bucket.
    pub volume: Decimal,
}

/// Tagged payload carried by a [`MarketEvent`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
#[non_exhaustive]
pub enum EventPayload {
    /// Executed trade print.
    Trade(Trade),
    /// Top-of-book quote.
    Quote(Quote),
    /// Aggregated level-2 depth snapshot.
    L2Snapshot(L2Snapshot),
    /// Full limit-order-book snapshot.
    LobSnapshot(LobSnapshot),
    /// OHLCV bar produced by a historical backfill.
    HistoricalBar(Bar),
    /// Provider liveness signal.
    Heartbeat,
    /// Data-quality finding observed upstream.
    Integrity(IntegrityReport),
    /// Data-quality finding specific to depth feeds.
    DepthIntegrity(IntegrityReport),
}

impl EventPayload {
    /// Discriminant of this payload.
    #[must_use]
    pub const fn kind(&self) -> EventKind {
        match self {
            Self::Trade(_) => EventKind::Trade,
            Self::Quote(_) => EventKind::Quote,
            Self::L2Snapshot(_) => EventKind::L2Snapshot,
            Self::LobSnapshot(_) => EventKind::LobSnapshot,
            Self::HistoricalBar(_) => EventKind::HistoricalBar,
            Self::Heartbeat => EventKind::Heartbeat,
            Self::Integrity(_) => EventKind::Integrity,
            Self::DepthIntegrity(_) => EventKind::DepthIntegrity,
        }
    }

    /// Raw venue tag carried by the payload variant, if the variant has one.
    #[must_use]
    pub fn venue(&self) -> Option<&str> {
        match self {
            Self::Trade(t) => t.venue.as_deref(),
            Self::Quote(q) => q.venue.as_deref(),
            Self::L2Snapshot(s) => s.venue.as_deref(),
            Self::LobSnapshot(s) => s.venue.as_deref(),
            Self::HistoricalBar(_) | Self::Heartbeat | Self::Integrity(_) | Self::DepthIntegrity(_) => {
                None
            }
        }
    }
}

/// The common value carried end-to-end through the ingestion core.
///
/// `symbol` is the raw identifier exactly as delivered by the provider and is
/// never rewritten; enrichment attaches `canonical_symbol`/`canonical_venue`
/// alongside it. `source` is normalized to uppercase at construction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MarketEvent {
    /// Stamped at ingress from the local clock.
    pub receive_time: DateTime<Utc>,
    /// Provider timestamp, when the wire format carries one.
    pub event_time: Option<DateTime<Utc>>,
    /// Uppercase provider identifier.
    pub source: String,
    /// Raw symbol as delivered; immutable after creation.
    pub symbol: String,
    /// Tagged payload.
    pub payload: EventPayload,
    /// Canonical symbol, attached by enrichment.
    pub canonical_symbol: Option<String>,
    /// Canonical venue (ISO 10383 MIC), attached by enrichment.
    pub canonical_venue: Option<String>,
    /// Enrichment tier. Monotonic.
    pub tier: Tier,
    /// 0 for raw events; > 0 iff `tier >= Enriched`.
    pub canonicalization_version: u32,
    /// Sequence number assigned by the emitting source.
    pub sequence: u64,
}

impl MarketEvent {
    /// Build a raw event stamped with the given receive time.
    ///
    /// The source is uppercased; tier starts at `Raw` with version 0.
    #[must_use]
    pub fn new(
        source: impl AsRef<str>,
        symbol: impl Into<String>,
        payload: EventPayload,
        receive_time: DateTime<Utc>,
    ) -> Self {
        Self {
            receive_time,
            event_time: None,
            source: source.as_ref().to_uppercase(),
            symbol: symbol.into(),
            payload,
            canonical_symbol: None,
            canonical_venue: None,
            tier: Tier::Raw,
            canonicalization_version: 0,
            sequence: 0,
        }
    }

    /// Set the provider timestamp.
    #[must_use]
    pub const fn with_event_time(mut self, at: DateTime<Utc>) -> Self {
        self.event_time = Some(at);
        self
    }

    /// Set the emitter-assigned sequence number.
    #[must_use]
    pub const fn with_sequence(mut self, seq: u64) -> Self {
        self.sequence = seq;
        self
    }

    /// Discriminant of the payload.
    #[must_use]
    pub const fn kind(&self) -> EventKind {
        self.payload.kind()
    }

    /// Whether this is a liveness heartbeat.
    #[must_use]
    pub const fn is_heartbeat(&self) -> bool {
        matches!(self.payload, EventPayload::Heartbeat)
    }

    /// Whether enrichment already ran for this event.
    #[must_use]
    pub const fn is_enriched(&self) -> bool {
        self.canonicalization_version > 0
    }

    /// Produce the enriched form of this event.
    ///
    /// The raw `symbol` and payload are untouched; the tier only ever moves
    /// forward and the stamped version must be non-zero.
    #[must_use]
    pub fn enriched(
        &self,
        canonical_symbol: Option<String>,
        canonical_venue: Option<String>,
        version: u32,
    ) -> Self {
        debug_assert!(version > 0, "enriched events carry a non-zero version");
        let mut next = self.clone();
        next.canonical_symbol = canonical_symbol;
        next.canonical_venue = canonical_venue;
        next.canonicalization_version = version;
        next.tier = next.tier.max(Tier::Enriched);
        next
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use rust_decimal::Decimal;

    fn trade_event() -> MarketEvent {
        let at = Utc.with_ymd_and_hms(2024, 3, 1, 14, 30, 0).unwrap();
        MarketEvent::new(
            "alpaca",
            "AAPL",
            EventPayload::Trade(Trade {
                price: Decimal::new(18950, 2),
                size: Decimal::from(100),
                venue: Some("V".into()),
                conditions: vec!["@".into()],
            }),
            at,
        )
    }

    #[test]
    fn source_is_uppercased() {
        assert_eq!(trade_event().source, "ALPACA");
    }

    #[test]
    fn enrichment_is_tier_monotonic() {
        let raw = trade_event();
        let enriched = raw.enriched(Some("AAPL".into()), Some("XNYS".into()), 1);
        assert_eq!(enriched.tier, Tier::Enriched);
        assert_eq!(enriched.canonicalization_version, 1);
        assert_eq!(enriched.symbol, raw.symbol);

        // Re-enriching never regresses the tier.
        let again = enriched.enriched(Some("AAPL".into()), None, 2);
        assert_eq!(again.tier, Tier::Enriched);
    }

    #[test]
    fn payload_venue_extraction() {
        assert_eq!(trade_event().payload.venue(), Some("V"));
        assert_eq!(EventPayload::Heartbeat.venue(), None);
    }
}
