//! # mf-feed
//!
//! Real-time market data feed client.
//!
//! [`FeedClient`] keeps one WebSocket-style connection to a price server alive,
//! turns every inbound frame into [`TradingInstrument`](mf_core::TradingInstrument)
//! values and fans them out to typed listeners:
//!
//! - [`client`] — connection lifecycle, reconnect with linear backoff, control messages
//! - [`normalizer`] — payload shape detection and batch cleanup
//! - [`enrichment`] — synthetic display fields for bare quote maps
//! - [`registry`] — bulk and per-instrument listeners with failure isolation
//! - [`protocol`] — outbound frame builders and close-code rules

pub mod client;
pub mod enrichment;
pub mod json_util;
pub mod normalizer;
pub mod protocol;
pub mod registry;

pub use client::FeedClient;
pub use enrichment::Enricher;
pub use normalizer::Normalizer;
pub use registry::{FeedEvent, ListenerId, Topic};
