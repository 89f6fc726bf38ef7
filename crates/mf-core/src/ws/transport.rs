//! The seam between the feed client and whatever carries its frames.

use std::sync::Arc;

use crate::error::FeedError;

/// Normal closure.
pub const CLOSE_NORMAL: u16 = 1000;
/// Endpoint is going away (server shutdown, app backgrounded).
pub const CLOSE_GOING_AWAY: u16 = 1001;
/// Close frame without a status code.
pub const CLOSE_NO_STATUS: u16 = 1005;
/// Connection dropped without a close frame.
pub const CLOSE_ABNORMAL: u16 = 1006;

/// Something that happened on one transport connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportEvent {
    /// The connection is established and can carry frames.
    Open,
    /// An inbound text frame.
    Message(String),
    /// A transport-level error. Always followed by `Closed`.
    Error(String),
    /// The connection is finished. No further events follow.
    Closed { code: u16, reason: String },
}

/// Callback receiving the events of one connection, in order.
pub type EventSink = Arc<dyn Fn(TransportEvent) + Send + Sync>;

/// Opens connections.
pub trait Transport: Send + Sync + 'static {
    /// Begin opening a connection to `url` and return its handle immediately.
    ///
    /// Implementations must not call `sink` from inside `open`; every event is
    /// delivered later, from the transport's own task.
    fn open(&self, url: &str, sink: EventSink) -> Box<dyn Connection>;
}

/// Handle to one open or opening connection.
pub trait Connection: Send + Sync {
    /// Queue a text frame. Fails if the connection is not open.
    fn send(&self, text: String) -> Result<(), FeedError>;

    /// Request a graceful close with the given code and reason.
    fn close(&self, code: u16, reason: &str);
}
