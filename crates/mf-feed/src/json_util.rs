//! Small JSON helpers shared by the normalizer and the enrichment step.

use serde_json::Value;

/// Parse a JSON value (string or number) as `f64`.
///
/// Price servers are inconsistent about quoting numbers, so both
/// `"1.1721"` and `1.1721` are accepted.
#[inline]
pub fn parse_str_f64(v: Option<&Value>) -> Option<f64> {
    let v = v?;
    if let Some(s) = v.as_str() {
        fast_float2::parse(s.trim()).ok()
    } else {
        v.as_f64()
    }
}

/// Render a JSON scalar as display text without re-formatting it.
///
/// Numbers keep the digits the server sent (`1.1721` stays `"1.1721"`),
/// strings are returned as-is. Anything else yields `None`.
#[inline]
pub fn display_text(v: Option<&Value>) -> Option<String> {
    match v? {
        Value::String(s) if !s.trim().is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// Whether an object is a symbol → quote map.
///
/// Every value must be an object and at least one of them must carry a
/// numeric `bid`. Individual records may still lack one.
pub fn is_quote_map(map: &serde_json::Map<String, Value>) -> bool {
    !map.is_empty()
        && map.values().all(Value::is_object)
        && map.values().any(|q| parse_str_f64(q.get("bid")).is_some())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn parse_string_or_number() {
        assert_eq!(parse_str_f64(Some(&json!("1.25"))), Some(1.25));
        assert_eq!(parse_str_f64(Some(&json!(1.25))), Some(1.25));
        assert_eq!(parse_str_f64(Some(&json!("abc"))), None);
        assert_eq!(parse_str_f64(Some(&json!(null))), None);
        assert_eq!(parse_str_f64(None), None);
    }

    #[test]
    fn display_text_keeps_server_digits() {
        assert_eq!(display_text(Some(&json!(1.1721))).as_deref(), Some("1.1721"));
        assert_eq!(display_text(Some(&json!(150))).as_deref(), Some("150"));
        assert_eq!(display_text(Some(&json!("0.98765"))).as_deref(), Some("0.98765"));
        assert_eq!(display_text(Some(&json!(""))), None);
        assert_eq!(display_text(Some(&json!(true))), None);
    }

    #[test]
    fn quote_map_detection() {
        let v = json!({"EURUSD": {"bid": 1.0}, "GBPUSD": {"bid": "1.2"}});
        assert!(is_quote_map(v.as_object().unwrap()));
        // One priced record is enough.
        let v = json!({"EURUSD": {"bid": 1.0}, "GBPUSD": {"ask": 1.2}});
        assert!(is_quote_map(v.as_object().unwrap()));
        let v = json!({"EURUSD": {"bid": 1.0}, "note": "x"});
        assert!(!is_quote_map(v.as_object().unwrap()));
        let v = json!({"error": {"code": 500, "message": "internal"}});
        assert!(!is_quote_map(v.as_object().unwrap()));
        let v = json!({"meta": {"server": "v2"}, "heartbeat": {"ts": 1}});
        assert!(!is_quote_map(v.as_object().unwrap()));
        let v = json!({"EURUSD": {"bid": "n/a"}});
        assert!(!is_quote_map(v.as_object().unwrap()));
        assert!(!is_quote_map(&serde_json::Map::new()));
    }
}
