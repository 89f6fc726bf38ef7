//! Enumerations used throughout the market feed client.

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Connection state
// ---------------------------------------------------------------------------

/// Lifecycle state of the feed client's single transport connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ConnectionState {
    #[default]
    Disconnected,
    Connecting,
    Connected,
}

impl std::fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Disconnected => write!(f, "disconnected"),
            Self::Connecting => write!(f, "connecting"),
            Self::Connected => write!(f, "connected"),
        }
    }
}

// ---------------------------------------------------------------------------
// Presentation hints
// ---------------------------------------------------------------------------

/// Tint hint for an instrument's change indicator.
///
/// Deserialization is lenient: `"positive"`, `"up"` and `"green"` map to
/// [`ChangeColor::Positive`], anything else to [`ChangeColor::Negative`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase", from = "String")]
pub enum ChangeColor {
    Positive,
    #[default]
    Negative,
}

impl ChangeColor {
    /// Tint for a signed percentage change. Zero counts as negative.
    pub fn from_percent(percent: f64) -> Self {
        if percent > 0.0 { Self::Positive } else { Self::Negative }
    }

    pub fn is_positive(self) -> bool {
        self == Self::Positive
    }
}

impl From<String> for ChangeColor {
    fn from(s: String) -> Self {
        match s.to_ascii_lowercase().as_str() {
            "positive" | "up" | "green" => Self::Positive,
            _ => Self::Negative,
        }
    }
}

/// Glyph category used to pick an instrument's icon.
///
/// Unknown wire values deserialize as [`InstrumentIcon::Flag`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum InstrumentIcon {
    #[serde(rename = "bitcoin")]
    Crypto,
    #[serde(rename = "trending-up")]
    Trend,
    #[serde(rename = "apple")]
    Equity,
    #[default]
    #[serde(rename = "flag", other)]
    Flag,
}
