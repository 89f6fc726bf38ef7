//! Wire protocol of the price server.
//!
//! Outbound frames are small JSON objects built with `serde_json::json!`.
//! Inbound shapes are classified by [`crate::normalizer`].

use mf_core::ws::{CLOSE_GOING_AWAY, CLOSE_NORMAL};

/// `type` tag of a wrapped bulk update: `{"type": "tradingData", "payload": [...]}`.
pub const TRADING_DATA_TAG: &str = "tradingData";

/// Field holding the instrument list of a wrapped bulk update.
pub const TRADING_DATA_FIELD: &str = "payload";

/// Reason sent with the close frame when the application stops the feed.
pub const CLIENT_CLOSE_REASON: &str = "client initiated";

/// Whether a close code means the peer closed on purpose.
///
/// Only `1000` (normal) and `1001` (going away) qualify; every other code
/// is treated as a dropped connection and triggers reconnection.
#[inline]
pub fn is_intentional_close(code: u16) -> bool {
    code == CLOSE_NORMAL || code == CLOSE_GOING_AWAY
}

/// First frame after every successful open. `limit: 0` means no volume cap.
pub fn build_handshake(client_id: &str, version: &str) -> String {
    serde_json::json!({
        "type": "handshake",
        "client": client_id,
        "version": version,
        "config": {
            "limit": 0,
            "fullData": true
        }
    })
    .to_string()
}

/// Ask the server to push a full instrument snapshot now.
pub fn build_data_request() -> String {
    serde_json::json!({
        "action": "getTradingData",
        "limit": 0
    })
    .to_string()
}

pub fn build_instrument_subscribe(symbol: &str) -> String {
    serde_json::json!({
        "action": "subscribeInstrument",
        "symbol": symbol
    })
    .to_string()
}

pub fn build_instrument_unsubscribe(symbol: &str) -> String {
    serde_json::json!({
        "action": "unsubscribeInstrument",
        "symbol": symbol
    })
    .to_string()
}
