//! Message normalizer.
//!
//! Turns one raw inbound frame into at most one [`FeedEvent`]. Shapes are
//! tested in a fixed order and the first match wins:
//!
//! 1. `[ {...}, ... ]` — instrument list → [`FeedEvent::Bulk`]
//! 2. `{"type": "tradingData", "payload": [...]}` → [`FeedEvent::Bulk`]
//! 3. `{"symbol": "...", ...}` → [`FeedEvent::Instrument`]
//! 4. `{"EURUSD": {"bid": ...}, ...}` — quote map, enriched → [`FeedEvent::Bulk`]
//!
//! Anything else is logged and dropped.

use ahash::AHashSet;
use mf_core::{ChangeColor, FeedError, TradingInstrument};
use serde_json::Value;
use tracing::{debug, warn};

use crate::enrichment::Enricher;
use crate::json_util::is_quote_map;
use crate::protocol::{TRADING_DATA_FIELD, TRADING_DATA_TAG};
use crate::registry::FeedEvent;

/// Which inbound shape a decoded payload matched.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PayloadShape {
    InstrumentList,
    TaggedBulk,
    SingleInstrument,
    QuoteMap,
    Unrecognized,
}

/// Classify a decoded payload. Rules are tested in priority order.
pub fn classify(v: &Value) -> PayloadShape {
    match v {
        Value::Array(_) => PayloadShape::InstrumentList,
        Value::Object(map) => {
            let tagged = map.get("type").and_then(Value::as_str) == Some(TRADING_DATA_TAG)
                && map.get(TRADING_DATA_FIELD).is_some_and(Value::is_array);
            if tagged {
                PayloadShape::TaggedBulk
            } else if map.contains_key("symbol") {
                PayloadShape::SingleInstrument
            } else if is_quote_map(map) {
                PayloadShape::QuoteMap
            } else {
                PayloadShape::Unrecognized
            }
        }
        _ => PayloadShape::Unrecognized,
    }
}

/// Stateful only through its enricher's random source.
#[derive(Debug, Default)]
pub struct Normalizer {
    enricher: Enricher,
}

impl Normalizer {
    pub fn new(enricher: Enricher) -> Self {
        Self { enricher }
    }

    /// Normalize a raw frame, logging and swallowing anything unusable.
    pub fn normalize(&mut self, raw: &str) -> Option<FeedEvent> {
        match self.decode(raw) {
            Ok(event) => Some(event),
            Err(FeedError::Parse(e)) => {
                warn!("[normalizer] dropping undecodable frame ({} bytes): {e}", raw.len());
                None
            }
            Err(e) => {
                warn!("[normalizer] dropping frame: {e}");
                None
            }
        }
    }

    /// Decode and classify a raw frame.
    pub fn decode(&mut self, raw: &str) -> Result<FeedEvent, FeedError> {
        let v: Value = serde_json::from_str(raw)?;
        self.normalize_value(v)
    }

    /// Classify an already-decoded payload.
    pub fn normalize_value(&mut self, v: Value) -> Result<FeedEvent, FeedError> {
        match (classify(&v), v) {
            (PayloadShape::InstrumentList, Value::Array(items)) => Ok(FeedEvent::Bulk(admit_batch(items))),
            (PayloadShape::TaggedBulk, Value::Object(mut map)) => {
                let items = match map.remove(TRADING_DATA_FIELD) {
                    Some(Value::Array(items)) => items,
                    _ => Vec::new(),
                };
                Ok(FeedEvent::Bulk(admit_batch(items)))
            }
            (PayloadShape::SingleInstrument, v) => {
                let instrument: TradingInstrument = serde_json::from_value(v)?;
                admit(instrument)
                    .map(FeedEvent::Instrument)
                    .ok_or_else(|| FeedError::UnrecognizedPayload("instrument update with empty symbol".into()))
            }
            (PayloadShape::QuoteMap, Value::Object(map)) => {
                let batch = map
                    .iter()
                    .map(|(symbol, quote)| self.enricher.enrich(symbol, quote))
                    .collect::<Vec<_>>();
                debug!("[normalizer] synthesized {} instruments from quote map", batch.len());
                Ok(FeedEvent::Bulk(batch))
            }
            (_, v) => Err(FeedError::UnrecognizedPayload(describe(&v))),
        }
    }
}

/// Deserialize a bulk list, keeping only admissible records with unique symbols.
fn admit_batch(items: Vec<Value>) -> Vec<TradingInstrument> {
    let total = items.len();
    let mut seen = AHashSet::with_capacity(total);
    let mut batch = Vec::with_capacity(total);

    for item in items {
        let instrument = match serde_json::from_value::<TradingInstrument>(item) {
            Ok(i) => i,
            Err(e) => {
                debug!("[normalizer] skipping malformed record: {e}");
                continue;
            }
        };
        let Some(instrument) = admit(instrument) else {
            debug!("[normalizer] skipping record with empty symbol");
            continue;
        };
        if !seen.insert(instrument.symbol.clone()) {
            debug!("[normalizer] skipping duplicate symbol {}", instrument.symbol);
            continue;
        }
        batch.push(instrument);
    }

    if batch.len() != total {
        warn!("[normalizer] kept {}/{} records of bulk update", batch.len(), total);
    }
    batch
}

/// Enforce instrument invariants; `None` if the record has no usable symbol.
fn admit(mut instrument: TradingInstrument) -> Option<TradingInstrument> {
    if instrument.symbol.trim().is_empty() {
        return None;
    }
    if instrument.sparkline.len() == 1 {
        instrument.sparkline.clear();
    }
    if let Some(p) = instrument.change_percent {
        instrument.change_color = ChangeColor::from_percent(p);
    }
    Some(instrument)
}

fn describe(v: &Value) -> String {
    match v {
        Value::Null => "null".into(),
        Value::Bool(_) => "boolean".into(),
        Value::Number(_) => "number".into(),
        Value::String(_) => "string".into(),
        Value::Array(_) => "array".into(),
        Value::Object(map) => format!("object with {} keys", map.len()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mf_core::InstrumentIcon;
    use serde_json::json;

    fn normalizer() -> Normalizer {
        Normalizer::new(Enricher::seeded(11))
    }

    fn bulk(event: Option<FeedEvent>) -> Vec<TradingInstrument> {
        match event {
            Some(FeedEvent::Bulk(list)) => list,
            other => panic!("expected Bulk, got {other:?}"),
        }
    }

    #[test]
    fn classify_priority() {
        assert_eq!(classify(&json!([])), PayloadShape::InstrumentList);
        assert_eq!(classify(&json!({"type": "tradingData", "payload": []})), PayloadShape::TaggedBulk);
        // Tag wins over the symbol rule.
        assert_eq!(
            classify(&json!({"type": "tradingData", "payload": [], "symbol": "EURUSD"})),
            PayloadShape::TaggedBulk
        );
        assert_eq!(classify(&json!({"symbol": "EURUSD", "price": "1.1"})), PayloadShape::SingleInstrument);
        assert_eq!(classify(&json!({"EURUSD": {"bid": 1.1}})), PayloadShape::QuoteMap);
        // Nested objects without a bid are not quotes.
        assert_eq!(classify(&json!({"error": {"code": 500}})), PayloadShape::Unrecognized);
        assert_eq!(classify(&json!({"meta": {"server": "v2"}})), PayloadShape::Unrecognized);
        // Tag without a list payload is not a bulk update.
        assert_eq!(classify(&json!({"type": "tradingData", "payload": {}})), PayloadShape::Unrecognized);
        assert_eq!(classify(&json!({})), PayloadShape::Unrecognized);
        assert_eq!(classify(&json!(42)), PayloadShape::Unrecognized);
        assert_eq!(classify(&json!(null)), PayloadShape::Unrecognized);
        assert_eq!(classify(&json!("hello")), PayloadShape::Unrecognized);
    }

    #[test]
    fn quote_map_example() {
        let list = bulk(normalizer().normalize(r#"{"EURUSD": {"bid": 1.1721}}"#));
        assert_eq!(list.len(), 1);
        assert_eq!(list[0].symbol, "EURUSD");
        assert_eq!(list[0].price, "1.1721");
        assert_eq!(list[0].sparkline.len(), 12);
    }

    #[test]
    fn quote_map_one_instrument_per_key() {
        let raw = r#"{
            "EURUSD": {"bid": 1.1721, "ask": 1.1723},
            "BTCUSD": {"bid": 64000.5, "ask": 64010.0},
            "USTEC": {"bid": 18000},
            "AAPL": {"bid": 190.12}
        }"#;
        let list = bulk(normalizer().normalize(raw));
        let mut symbols: Vec<_> = list.iter().map(|i| i.symbol.as_str()).collect();
        symbols.sort_unstable();
        assert_eq!(symbols, vec!["AAPL", "BTCUSD", "EURUSD", "USTEC"]);
        for inst in &list {
            let p = inst.change_percent.unwrap();
            assert_eq!(inst.change_color, ChangeColor::from_percent(p));
        }
        let btc = list.iter().find(|i| i.symbol == "BTCUSD").unwrap();
        assert_eq!(btc.icon, InstrumentIcon::Crypto);
    }

    #[test]
    fn quote_map_record_without_bid_gets_default_price() {
        let list = bulk(normalizer().normalize(r#"{"EURUSD": {"bid": 1.17}, "GBPUSD": {"ask": 1.27}}"#));
        assert_eq!(list.len(), 2);
        let gbp = list.iter().find(|i| i.symbol == "GBPUSD").unwrap();
        assert_eq!(gbp.price, crate::enrichment::MISSING_PRICE);
    }

    #[test]
    fn null_display_fields_fall_back_to_defaults() {
        let raw = r#"[
            {"symbol": "EURUSD", "name": null, "price": "1.17"},
            {"symbol": "BTC", "icon": null},
            {"symbol": "AAPL", "price": "190"},
            {"symbol": "XAUUSD", "subtitle": null, "changeColor": null, "sparkline": null, "isFavorite": null}
        ]"#;
        let list = bulk(normalizer().normalize(raw));
        let symbols: Vec<_> = list.iter().map(|i| i.symbol.as_str()).collect();
        assert_eq!(symbols, vec!["EURUSD", "BTC", "AAPL", "XAUUSD"]);
        assert_eq!(list[0].name, "");
        assert_eq!(list[0].price, "1.17");
        assert_eq!(list[1].icon, InstrumentIcon::Flag);
        assert_eq!(list[3].change_color, ChangeColor::Negative);
        assert!(list[3].sparkline.is_empty());
        assert!(!list[3].is_favorite);

        match normalizer().normalize(r#"{"symbol": "EURUSD", "name": null, "price": "1.18"}"#) {
            Some(FeedEvent::Instrument(inst)) => assert_eq!(inst.price, "1.18"),
            other => panic!("expected Instrument, got {other:?}"),
        }
    }

    #[test]
    fn array_passes_through_unchanged() {
        let record = json!({
            "symbol": "BTC",
            "name": "BTC",
            "subtitle": "Bitcoin",
            "price": "64000.00",
            "change": "+1.10%",
            "changePercent": 1.1,
            "changeColor": "positive",
            "icon": "bitcoin",
            "sparkline": [1.0, 2.0, 3.0],
            "isFavorite": true
        });
        let expected: TradingInstrument = serde_json::from_value(record.clone()).unwrap();
        let list = bulk(normalizer().normalize(&json!([record]).to_string()));
        assert_eq!(list, vec![expected]);
    }

    #[test]
    fn array_keeps_length_and_symbols() {
        let raw = json!([
            {"symbol": "EURUSD", "price": 1.1},
            {"symbol": "GBPUSD", "price": "1.27"},
            {"symbol": "USDJPY"}
        ])
        .to_string();
        let list = bulk(normalizer().normalize(&raw));
        let symbols: Vec<_> = list.iter().map(|i| i.symbol.as_str()).collect();
        assert_eq!(symbols, vec!["EURUSD", "GBPUSD", "USDJPY"]);
    }

    #[test]
    fn tagged_bulk_unwraps_payload() {
        let raw = json!({"type": "tradingData", "payload": [{"symbol": "EURUSD"}, {"symbol": "AAPL"}]}).to_string();
        let list = bulk(normalizer().normalize(&raw));
        assert_eq!(list.len(), 2);
        assert_eq!(list[1].symbol, "AAPL");
    }

    #[test]
    fn bulk_hygiene() {
        let raw = json!([
            {"symbol": "EURUSD", "changePercent": -0.2, "changeColor": "positive", "sparkline": [1.0]},
            {"symbol": "EURUSD", "price": "dup"},
            {"symbol": ""},
            {"name": "no symbol"},
            7
        ])
        .to_string();
        let list = bulk(normalizer().normalize(&raw));
        assert_eq!(list.len(), 1);
        assert_eq!(list[0].change_color, ChangeColor::Negative);
        assert!(list[0].sparkline.is_empty());
        assert_eq!(list[0].price, "");
    }

    #[test]
    fn single_instrument_update() {
        let event = normalizer().normalize(r#"{"symbol": "XAUUSD", "price": 2350.1, "changePercent": 0.4}"#);
        match event {
            Some(FeedEvent::Instrument(inst)) => {
                assert_eq!(inst.symbol, "XAUUSD");
                assert_eq!(inst.price, "2350.1");
                assert_eq!(inst.change_color, ChangeColor::Positive);
            }
            other => panic!("expected Instrument, got {other:?}"),
        }
    }

    #[test]
    fn bad_single_instrument_is_dropped() {
        let mut n = normalizer();
        assert!(n.normalize(r#"{"symbol": ""}"#).is_none());
        assert!(n.normalize(r#"{"symbol": 12}"#).is_none());
    }

    #[test]
    fn unknown_shapes_are_dropped() {
        let mut n = normalizer();
        for raw in [
            "42",
            "null",
            "\"text\"",
            "true",
            "{}",
            r#"{"status": "ok"}"#,
            r#"{"error": {"code": 500, "message": "internal"}}"#,
            r#"{"meta": {"server": "v2"}, "heartbeat": {"ts": 1}}"#,
            "not json",
            "",
        ] {
            assert!(n.normalize(raw).is_none(), "{raw} should be dropped");
        }
        assert!(matches!(n.decode("{oops"), Err(FeedError::Parse(_))));
        assert!(matches!(n.decode("null"), Err(FeedError::UnrecognizedPayload(_))));
    }
}
