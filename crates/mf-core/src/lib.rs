//! # mf-core
//!
//! Core crate for the market feed client, providing:
//!
//! - **Types** (`types`) — the canonical [`TradingInstrument`] and its display enums
//! - **Configuration** (`config`) — JSON config deserialization and validation
//! - **Error types** (`error`) — domain-specific `FeedError` via thiserror
//! - **WebSocket** (`ws`) — transport abstraction plus the tokio-tungstenite transport
//! - **Logging** (`logging`) — tracing-based structured logging

pub mod config;
pub mod error;
pub mod logging;
pub mod types;
pub mod ws;

// Re-export types at crate root for convenience.
pub use error::FeedError;
pub use types::*;
