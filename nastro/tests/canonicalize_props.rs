use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use nastro::publish::{CanonicalizingPublisher, EventPublisher, NoopCanonMetrics};
use nastro_core::NastroError;
use nastro_core::canon::{Canonicalizer, MappingTable};
use nastro_types::{CanonicalizeConfig, EventPayload, MarketEvent, Quote, Tier, Trade};
use proptest::prelude::*;
use rust_decimal::Decimal;

/// Captures everything published, in order.
#[derive(Default)]
struct RecordingPublisher {
    events: Mutex<Vec<MarketEvent>>,
}

impl RecordingPublisher {
    fn take(&self) -> Vec<MarketEvent> {
        std::mem::take(&mut self.events.lock().unwrap())
    }
}

#[async_trait]
impl EventPublisher for RecordingPublisher {
    fn try_publish(&self, event: MarketEvent) -> bool {
        self.events.lock().unwrap().push(event);
        true
    }

    async fn publish(&self, event: MarketEvent) -> bool {
        self.try_publish(event)
    }

    async fn flush(&self) -> Result<(), NastroError> {
        Ok(())
    }
}

fn canonicalizer() -> Arc<Canonicalizer> {
    let symbols = MappingTable::from_json_str(
        r#"{"version":1,"mappings":{"POLYGON":{"BRK-B":"BRK.B"},"*":{"GOOGL":"GOOG"}}}"#,
    )
    .unwrap();
    let venues = MappingTable::from_json_str(
        r#"{"version":1,"mappings":{"POLYGON":{"4":"XNAS","N":"XNYS"}}}"#,
    )
    .unwrap();
    Arc::new(Canonicalizer::new(symbols, venues, MappingTable::empty()))
}

fn payload_strategy() -> impl Strategy<Value = EventPayload> {
    prop_oneof![
        (1i64..1_000_000, proptest::option::of("[4N7]")).prop_map(|(cents, venue)| {
            EventPayload::Trade(Trade {
                price: Decimal::new(cents, 2),
                size: Decimal::from(100),
                venue,
                conditions: vec![],
            })
        }),
        (1i64..1_000_000).prop_map(|cents| {
            EventPayload::Quote(Quote {
                bid: Decimal::new(cents, 2),
                bid_size: Decimal::from(10),
                ask: Decimal::new(cents + 1, 2),
                ask_size: Decimal::from(10),
                venue: None,
            })
        }),
        Just(EventPayload::Heartbeat),
    ]
}

fn event_strategy() -> impl Strategy<Value = MarketEvent> {
    ("[A-Z]{1,5}", payload_strategy(), any::<u64>()).prop_map(|(symbol, payload, seq)| {
        let at = Utc.with_ymd_and_hms(2024, 3, 1, 14, 30, 0).unwrap();
        MarketEvent::new("polygon", symbol, payload, at).with_sequence(seq)
    })
}

fn publisher() -> CanonicalizingPublisher<Arc<RecordingPublisher>> {
    CanonicalizingPublisher::new(
        Arc::new(RecordingPublisher::default()),
        canonicalizer(),
        CanonicalizeConfig::default(),
        Arc::new(NoopCanonMetrics),
    )
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    // canonicalize(canonicalize(e)) == canonicalize(e): publishing the
    // enriched output again forwards it unchanged.
    #[test]
    fn canonicalization_is_idempotent(event in event_strategy()) {
        let publisher = publisher();

        prop_assert!(publisher.try_publish(event));
        let first_pass = publisher.inner().take();
        prop_assert_eq!(first_pass.len(), 1);
        let once = first_pass.into_iter().next().unwrap();

        prop_assert!(publisher.try_publish(once.clone()));
        let second_pass = publisher.inner().take();
        prop_assert_eq!(second_pass.len(), 1);
        prop_assert_eq!(&second_pass[0], &once);
    }

    // Heartbeats come out exactly as they went in.
    #[test]
    fn heartbeats_pass_unchanged(symbol in "[A-Z]{1,5}", seq in any::<u64>()) {
        let publisher = publisher();
        let at = Utc.with_ymd_and_hms(2024, 3, 1, 14, 30, 0).unwrap();
        let hb = MarketEvent::new("polygon", symbol, EventPayload::Heartbeat, at)
            .with_sequence(seq);

        prop_assert!(publisher.try_publish(hb.clone()));
        let out = publisher.inner().take();
        prop_assert_eq!(out.len(), 1);
        prop_assert_eq!(&out[0], &hb);
    }

    // Enrichment never rewrites the raw symbol and the tier only moves
    // forward.
    #[test]
    fn raw_symbol_immutable_and_tier_monotonic(event in event_strategy()) {
        let publisher = publisher();
        let raw_symbol = event.symbol.clone();
        let raw_tier = event.tier;

        prop_assert!(publisher.try_publish(event));
        let out = publisher.inner().take().into_iter().next().unwrap();
        prop_assert_eq!(out.symbol, raw_symbol);
        prop_assert!(out.tier >= raw_tier);
        if out.tier == Tier::Enriched {
            prop_assert!(out.canonicalization_version > 0);
        } else {
            prop_assert_eq!(out.canonicalization_version, 0);
        }
    }
}
