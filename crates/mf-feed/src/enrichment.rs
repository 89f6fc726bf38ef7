//! Synthetic enrichment for quote-map payloads.
//!
//! A quote map (`{"EURUSD": {"bid": 1.1721, "ask": 1.1723}, ...}`) carries
//! prices but no display metadata. [`Enricher`] fills the gaps so the UI
//! always has something to draw:
//!
//! - `price` — the bid, as the server wrote it (`"0.0"` when missing)
//! - `changePercent` — uniform in `[-0.5, 0.5]`, a placeholder since a quote
//!   map has no reference price
//! - `changeColor` — from the sign of `changePercent`
//! - `subtitle` / `icon` — from fixed symbol tables
//! - `sparkline` — 12 points trending in the same direction as the change
//!
//! The random source is injected, so a seeded enricher is fully deterministic.

use mf_core::{ChangeColor, InstrumentIcon, TradingInstrument};
use rand::rngs::StdRng;
use rand::{Rng, RngCore, SeedableRng};
use serde_json::Value;

use crate::json_util::{display_text, parse_str_f64};

/// Number of points in a synthesized sparkline.
pub const SPARKLINE_POINTS: usize = 12;

/// First point of every synthesized sparkline.
pub const SPARKLINE_BASE: f64 = 100.0;

/// Bounds of the synthesized percentage change.
pub const CHANGE_PERCENT_RANGE: f64 = 0.5;

/// Price text used when a quote has no usable bid.
pub const MISSING_PRICE: &str = "0.0";

const SUBTITLES: &[(&str, &str)] = &[
    ("EURUSD", "Euro vs US Dollar"),
    ("GBPUSD", "Great Britain Pound vs US Dollar"),
    ("USDJPY", "US Dollar vs Japanese Yen"),
    ("USDCHF", "US Dollar vs Swiss Franc"),
    ("AUDUSD", "Australian Dollar vs US Dollar"),
    ("USDCAD", "US Dollar vs Canadian Dollar"),
    ("NZDUSD", "New Zealand Dollar vs US Dollar"),
    ("XAUUSD", "Gold vs US Dollar"),
    ("BTCUSD", "Bitcoin vs US Dollar"),
    ("ETHUSD", "Ethereum vs US Dollar"),
    ("USTEC", "US Tech 100 Index"),
    ("AAPL", "Apple Inc."),
];

/// Human-readable description for a symbol.
pub fn subtitle_for(symbol: &str) -> String {
    SUBTITLES
        .iter()
        .find(|(s, _)| *s == symbol)
        .map(|(_, d)| (*d).to_string())
        .unwrap_or_else(|| format!("{symbol} Instrument"))
}

/// Icon category by substring match. First matching rule wins.
pub fn icon_for(symbol: &str) -> InstrumentIcon {
    if symbol.contains("BTC") || symbol.contains("ETH") {
        InstrumentIcon::Crypto
    } else if symbol.contains("USTEC") {
        InstrumentIcon::Trend
    } else if symbol.contains("AAPL") {
        InstrumentIcon::Equity
    } else {
        InstrumentIcon::Flag
    }
}

/// Builds display-ready instruments from raw quotes.
pub struct Enricher {
    rng: Box<dyn RngCore + Send>,
}

impl Enricher {
    /// Enricher seeded from the operating system.
    pub fn new() -> Self {
        Self::with_rng(StdRng::from_os_rng())
    }

    /// Deterministic enricher for tests and replays.
    pub fn seeded(seed: u64) -> Self {
        Self::with_rng(StdRng::seed_from_u64(seed))
    }

    pub fn with_rng(rng: impl RngCore + Send + 'static) -> Self {
        Self { rng: Box::new(rng) }
    }

    /// Synthesize one instrument from a `(symbol, quote)` pair.
    pub fn enrich(&mut self, symbol: &str, quote: &Value) -> TradingInstrument {
        let bid = quote.get("bid");
        let price = match parse_str_f64(bid) {
            Some(_) => display_text(bid).unwrap_or_else(|| MISSING_PRICE.to_string()),
            None => MISSING_PRICE.to_string(),
        };

        let raw: f64 = self.rng.random_range(-CHANGE_PERCENT_RANGE..=CHANGE_PERCENT_RANGE);
        let change_percent = (raw * 100.0).round() / 100.0;
        let change_color = ChangeColor::from_percent(change_percent);

        TradingInstrument {
            symbol: symbol.to_string(),
            name: symbol.to_string(),
            subtitle: subtitle_for(symbol),
            price,
            change: format!("{change_percent:+.2}%"),
            change_percent: Some(change_percent),
            change_color,
            icon: icon_for(symbol),
            sparkline: self.sparkline(change_color.is_positive()),
            is_favorite: true,
        }
    }

    /// Strictly monotonic walk from [`SPARKLINE_BASE`]; step `i` moves by
    /// `i + jitter` with jitter in `[0.1, 0.5)`.
    fn sparkline(&mut self, rising: bool) -> Vec<f64> {
        let direction = if rising { 1.0 } else { -1.0 };
        let mut value = SPARKLINE_BASE;
        let mut points = Vec::with_capacity(SPARKLINE_POINTS);
        points.push(value);
        for i in 1..SPARKLINE_POINTS {
            let jitter: f64 = self.rng.random_range(0.1..0.5);
            value += direction * (i as f64 + jitter);
            points.push(value);
        }
        points
    }
}

impl Default for Enricher {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for Enricher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Enricher").finish_non_exhaustive()
    }
}
