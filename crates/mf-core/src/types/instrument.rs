//! The canonical unit of market data delivered to feed listeners.

use serde::{Deserialize, Deserializer, Serialize};

use super::enums::{ChangeColor, InstrumentIcon};

/// One tradable instrument as presented to the UI layer.
///
/// The wire format is camelCase JSON. Deserialization is lenient so that
/// server-shaped records pass through untouched: `price` and `change` accept
/// strings or numbers (numbers keep the precision the server emitted),
/// `changePercent` accepts a number or a numeric string, and an explicit
/// `null` on any field but `symbol` reads as the field's default.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TradingInstrument {
    /// Natural key, e.g. `"EURUSD"`.
    pub symbol: String,
    #[serde(default, deserialize_with = "null_default")]
    pub name: String,
    #[serde(default, deserialize_with = "null_default")]
    pub subtitle: String,
    /// Display-formatted quote. Never re-parsed.
    #[serde(default, deserialize_with = "display_text")]
    pub price: String,
    #[serde(default, deserialize_with = "display_text")]
    pub change: String,
    #[serde(default, deserialize_with = "lenient_f64", skip_serializing_if = "Option::is_none")]
    pub change_percent: Option<f64>,
    #[serde(default, deserialize_with = "null_default")]
    pub change_color: ChangeColor,
    #[serde(default, deserialize_with = "null_default")]
    pub icon: InstrumentIcon,
    /// Trend samples, oldest first. Empty means "no trend available".
    #[serde(default, deserialize_with = "null_default")]
    pub sparkline: Vec<f64>,
    #[serde(default, deserialize_with = "null_default")]
    pub is_favorite: bool,
}

impl TradingInstrument {
    /// A bare instrument carrying only its symbol. Everything else defaults.
    pub fn new(symbol: impl Into<String>) -> Self {
        Self {
            symbol: symbol.into(),
            name: String::new(),
            subtitle: String::new(),
            price: String::new(),
            change: String::new(),
            change_percent: None,
            change_color: ChangeColor::default(),
            icon: InstrumentIcon::default(),
            sparkline: Vec::new(),
            is_favorite: false,
        }
    }

    /// Whether the sparkline can be drawn (a single point has no trend).
    pub fn has_trend(&self) -> bool {
        self.sparkline.len() >= 2
    }

    /// Whether `change_color` agrees with the sign of `change_percent`.
    ///
    /// Instruments without a percentage are always consistent.
    pub fn is_color_consistent(&self) -> bool {
        match self.change_percent {
            Some(p) => ChangeColor::from_percent(p) == self.change_color,
            None => true,
        }
    }
}

// ---------------------------------------------------------------------------
// Lenient field deserializers
// ---------------------------------------------------------------------------

#[derive(Deserialize)]
#[serde(untagged)]
enum TextOrNumber {
    Text(String),
    Number(serde_json::Number),
}

fn display_text<'de, D: Deserializer<'de>>(d: D) -> Result<String, D::Error> {
    Ok(match Option::<TextOrNumber>::deserialize(d)? {
        Some(TextOrNumber::Text(s)) => s,
        Some(TextOrNumber::Number(n)) => n.to_string(),
        None => String::new(),
    })
}

/// `null` reads as `T::default()`.
fn null_default<'de, D, T>(d: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de> + Default,
{
    Ok(Option::<T>::deserialize(d)?.unwrap_or_default())
}

fn lenient_f64<'de, D: Deserializer<'de>>(d: D) -> Result<Option<f64>, D::Error> {
    Ok(match Option::<TextOrNumber>::deserialize(d)? {
        Some(TextOrNumber::Text(s)) => s.trim().trim_end_matches('%').parse().ok(),
        Some(TextOrNumber::Number(n)) => n.as_f64(),
        None => None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn deserialize_full_record() {
        let json = r#"{
            "symbol": "BTCUSD",
            "name": "BTC",
            "subtitle": "Bitcoin vs US Dollar",
            "price": "64250.10",
            "change": "+1.20%",
            "changePercent": 1.2,
            "changeColor": "positive",
            "icon": "bitcoin",
            "sparkline": [1.0, 2.0, 3.0],
            "isFavorite": true
        }"#;
        let inst: TradingInstrument = serde_json::from_str(json).unwrap();
        assert_eq!(inst.symbol, "BTCUSD");
        assert_eq!(inst.price, "64250.10");
        assert_eq!(inst.change_percent, Some(1.2));
        assert_eq!(inst.change_color, ChangeColor::Positive);
        assert_eq!(inst.icon, InstrumentIcon::Crypto);
        assert!(inst.has_trend());
        assert!(inst.is_favorite);
        assert!(inst.is_color_consistent());
    }

    #[test]
    fn numeric_price_keeps_server_precision() {
        let inst: TradingInstrument =
            serde_json::from_str(r#"{"symbol":"EURUSD","price":1.17210,"changePercent":"-0.05%"}"#).unwrap();
        assert_eq!(inst.price, "1.1721");
        assert_eq!(inst.change_percent, Some(-0.05));
        assert_eq!(inst.icon, InstrumentIcon::Flag);
        assert!(!inst.has_trend());
    }

    #[test]
    fn missing_symbol_is_rejected() {
        assert!(serde_json::from_str::<TradingInstrument>(r#"{"name":"x"}"#).is_err());
        assert!(serde_json::from_str::<TradingInstrument>(r#"{"symbol":null}"#).is_err());
    }

    #[test]
    fn null_fields_read_as_defaults() {
        let json = r#"{
            "symbol": "EURUSD",
            "name": null,
            "subtitle": null,
            "price": null,
            "change": null,
            "changePercent": null,
            "changeColor": null,
            "icon": null,
            "sparkline": null,
            "isFavorite": null
        }"#;
        let inst: TradingInstrument = serde_json::from_str(json).unwrap();
        assert_eq!(inst, TradingInstrument::new("EURUSD"));
    }

    #[test]
    fn serializes_camel_case() {
        let mut inst = TradingInstrument::new("AAPL");
        inst.is_favorite = true;
        let v = serde_json::to_value(&inst).unwrap();
        assert_eq!(v["isFavorite"], true);
        assert_eq!(v["changeColor"], "negative");
        assert!(v.get("changePercent").is_none());
    }
}
