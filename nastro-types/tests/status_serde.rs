use chrono::{NaiveDate, TimeZone, Utc};
use nastro_types::{BackfillResult, EventPayload, MarketEvent, Trade};
use rust_decimal::Decimal;

#[test]
fn backfill_result_uses_camel_case_layout() {
    let result = BackfillResult {
        success: true,
        provider: "composite".into(),
        symbols: vec!["AAPL".into(), "MSFT".into()],
        from: Some(NaiveDate::from_ymd_opt(2024, 2, 1).unwrap()),
        to: Some(NaiveDate::from_ymd_opt(2024, 3, 1).unwrap()),
        bars_written: 42,
        started_at: Utc.with_ymd_and_hms(2024, 3, 1, 14, 30, 0).unwrap(),
        completed_at: Utc.with_ymd_and_hms(2024, 3, 1, 14, 30, 9).unwrap(),
        error: None,
    };

    let json = serde_json::to_value(&result).unwrap();
    assert_eq!(json["success"], true);
    assert_eq!(json["provider"], "composite");
    assert_eq!(json["barsWritten"], 42);
    assert!(json.get("startedAt").is_some());
    assert!(json.get("completedAt").is_some());
    // Absent error is omitted entirely, not serialized as null.
    assert!(json.get("error").is_none());

    let back: BackfillResult = serde_json::from_value(json).unwrap();
    assert_eq!(back, result);
}

#[test]
fn event_payload_is_internally_tagged() {
    let at = Utc.with_ymd_and_hms(2024, 3, 1, 14, 30, 0).unwrap();
    let evt = MarketEvent::new(
        "polygon",
        "AAPL",
        EventPayload::Trade(Trade {
            price: Decimal::new(18950, 2),
            size: Decimal::from(10),
            venue: None,
            conditions: vec![],
        }),
        at,
    );

    let json = serde_json::to_value(&evt).unwrap();
    assert_eq!(json["payload"]["type"], "trade");
    assert_eq!(json["source"], "POLYGON");

    let back: MarketEvent = serde_json::from_value(json).unwrap();
    assert_eq!(back, evt);
}

#[test]
fn heartbeat_round_trips() {
    let at = Utc.with_ymd_and_hms(2024, 3, 1, 14, 30, 0).unwrap();
    let evt = MarketEvent::new("alpaca", "AAPL", EventPayload::Heartbeat, at);
    let json = serde_json::to_string(&evt).unwrap();
    let back: MarketEvent = serde_json::from_str(&json).unwrap();
    assert!(back.is_heartbeat());
    assert_eq!(back.canonicalization_version, 0);
}
