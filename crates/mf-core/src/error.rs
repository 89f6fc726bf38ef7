//! Typed error definitions for the market feed client.
//!
//! [`FeedError`] covers the failures that can occur inside the feed path.
//! Most of them never reach the caller of the feed client: they are logged and
//! the offending frame or control message is dropped. They still get a proper
//! type so parsers and transports can return `Result` and use `?`.

use thiserror::Error;

/// Domain-specific errors for the market feed client.
#[derive(Debug, Error)]
pub enum FeedError {
    /// Configuration parsing or validation error.
    #[error("config error: {0}")]
    Config(String),

    /// WebSocket connection, handshake, or communication error.
    #[error("websocket error: {0}")]
    WebSocket(String),

    /// Inbound payload is not valid JSON.
    #[error("parse error: {0}")]
    Parse(#[from] serde_json::Error),

    /// Inbound payload is valid JSON but matches no known message shape.
    #[error("unrecognized payload: {0}")]
    UnrecognizedPayload(String),

    /// A control message was sent while the transport was not open.
    #[error("transport not connected")]
    NotConnected,

    /// The transport refused an outbound message.
    #[error("send error: {0}")]
    Send(String),
}
