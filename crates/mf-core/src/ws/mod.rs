//! Transport abstraction and the WebSocket transport.
//!
//! The feed client never talks to a socket directly: it asks a [`Transport`]
//! to open one connection per attempt and receives [`TransportEvent`]s through
//! the sink it handed over. Reconnection policy lives in the feed client, so a
//! transport connection is single-shot: once it reports `Closed` it is done.

pub mod client;
pub mod transport;

pub use client::{WsConnection, WsTransport};
pub use transport::{CLOSE_ABNORMAL, CLOSE_GOING_AWAY, CLOSE_NO_STATUS, CLOSE_NORMAL, Connection, EventSink, Transport, TransportEvent};
