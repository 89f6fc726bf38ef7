//! WebSocket transport built on tokio-tungstenite.
//!
//! Each [`WsTransport::open`] spawns one tokio task that:
//! 1. Connects to the endpoint (TLS when the URL is `wss://`).
//! 2. Reports `Open`, then forwards every text frame to the sink.
//! 3. Writes queued outbound frames and optional keep-alive pings.
//! 4. Reports exactly one `Closed` and exits. There is no retry here; the
//!    feed client decides whether to open another connection.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use parking_lot::Mutex;
use tokio::sync::{mpsc, oneshot};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::{HeaderName, HeaderValue};
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tracing::{debug, info, warn};

use super::transport::{CLOSE_ABNORMAL, CLOSE_NO_STATUS, CLOSE_NORMAL, Connection, EventSink, Transport, TransportEvent};
use crate::config::FeedConfig;
use crate::error::FeedError;

type WsStream = tokio_tungstenite::WebSocketStream<tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>>;

/// Opens tokio-tungstenite connections. Must be used inside a tokio runtime.
#[derive(Debug, Clone, Default)]
pub struct WsTransport {
    /// Extra HTTP headers for the handshake.
    extra_headers: HashMap<String, String>,
    /// Interval between WebSocket ping frames.
    ping_interval: Option<Duration>,
}

impl WsTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Transport configured from the feed settings (headers, ping interval).
    pub fn from_config(config: &FeedConfig) -> Self {
        Self {
            extra_headers: config.extra_headers.clone(),
            ping_interval: config.ping_interval(),
        }
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.extra_headers.insert(name.into(), value.into());
        self
    }

    pub fn with_ping_interval(mut self, interval: Duration) -> Self {
        self.ping_interval = Some(interval);
        self
    }
}

impl Transport for WsTransport {
    fn open(&self, url: &str, sink: EventSink) -> Box<dyn Connection> {
        let (outbound_tx, outbound_rx) = mpsc::unbounded_channel::<String>();
        let (close_tx, close_rx) = oneshot::channel::<CloseRequest>();
        let open = Arc::new(AtomicBool::new(false));

        let task = ConnectionTask {
            url: url.to_string(),
            extra_headers: self.extra_headers.clone(),
            ping_interval: self.ping_interval,
            sink,
            open: Arc::clone(&open),
        };
        tokio::spawn(task.run(outbound_rx, close_rx));

        Box::new(WsConnection {
            outbound_tx,
            close_tx: Mutex::new(Some(close_tx)),
            open,
        })
    }
}

#[derive(Debug)]
struct CloseRequest {
    code: u16,
    reason: String,
}

/// Handle to one tokio-tungstenite connection task.
///
/// Dropping the handle closes the connection with a normal close code.
pub struct WsConnection {
    outbound_tx: mpsc::UnboundedSender<String>,
    close_tx: Mutex<Option<oneshot::Sender<CloseRequest>>>,
    open: Arc<AtomicBool>,
}

impl Connection for WsConnection {
    fn send(&self, text: String) -> Result<(), FeedError> {
        if !self.open.load(Ordering::Acquire) {
            return Err(FeedError::NotConnected);
        }
        self.outbound_tx
            .send(text)
            .map_err(|_| FeedError::Send("connection task has ended".into()))
    }

    fn close(&self, code: u16, reason: &str) {
        if let Some(tx) = self.close_tx.lock().take() {
            let _ = tx.send(CloseRequest { code, reason: reason.to_string() });
        }
    }
}

struct ConnectionTask {
    url: String,
    extra_headers: HashMap<String, String>,
    ping_interval: Option<Duration>,
    sink: EventSink,
    open: Arc<AtomicBool>,
}

impl ConnectionTask {
    async fn run(self, outbound_rx: mpsc::UnboundedReceiver<String>, mut close_rx: oneshot::Receiver<CloseRequest>) {
        let url = self.url.clone();
        debug!("[ws] connecting to {url}");

        let connected = tokio::select! {
            res = connect_ws(&url, &self.extra_headers) => res,
            req = &mut close_rx => {
                let req = req.unwrap_or_else(|_| dropped_handle());
                debug!("[ws] close requested before {url} opened");
                (self.sink)(TransportEvent::Closed { code: req.code, reason: req.reason });
                return;
            }
        };

        let ws_stream = match connected {
            Ok(s) => s,
            Err(e) => {
                warn!("[ws] connection to {url} failed: {e}");
                (self.sink)(TransportEvent::Error(e.to_string()));
                (self.sink)(TransportEvent::Closed { code: CLOSE_ABNORMAL, reason: "connect failed".into() });
                return;
            }
        };

        self.open.store(true, Ordering::Release);
        info!("[ws] connected to {url}");
        (self.sink)(TransportEvent::Open);

        let closed = self.pump(ws_stream, outbound_rx, close_rx).await;
        self.open.store(false, Ordering::Release);
        if let TransportEvent::Closed { code, reason } = &closed {
            info!("[ws] {url} closed (code={code}, reason='{reason}')");
        }
        (self.sink)(closed);
    }

    /// Read/write loop for an open connection. Returns the final `Closed` event.
    async fn pump(
        &self,
        ws_stream: WsStream,
        mut outbound_rx: mpsc::UnboundedReceiver<String>,
        mut close_rx: oneshot::Receiver<CloseRequest>,
    ) -> TransportEvent {
        let (mut ws_write, mut ws_read) = ws_stream.split();
        let mut ping = self
            .ping_interval
            .map(|d| tokio::time::interval_at(tokio::time::Instant::now() + d, d));

        loop {
            tokio::select! {
                // Close requested by the owner (or its handle was dropped)
                req = &mut close_rx => {
                    let req = req.unwrap_or_else(|_| dropped_handle());
                    let frame = CloseFrame { code: CloseCode::from(req.code), reason: req.reason.clone().into() };
                    if let Err(e) = ws_write.send(Message::Close(Some(frame))).await {
                        debug!("[ws] close frame not sent: {e}");
                    }
                    let _ = ws_write.close().await;
                    return TransportEvent::Closed { code: req.code, reason: req.reason };
                }

                // Incoming frame
                msg = ws_read.next() => {
                    match msg {
                        Some(Ok(Message::Text(text))) => {
                            (self.sink)(TransportEvent::Message(text.as_str().to_owned()));
                        }
                        Some(Ok(Message::Binary(data))) => match std::str::from_utf8(&data) {
                            Ok(text) => (self.sink)(TransportEvent::Message(text.to_owned())),
                            Err(_) => debug!("[ws] dropping non-UTF-8 binary frame ({} bytes)", data.len()),
                        },
                        Some(Ok(Message::Ping(data))) => {
                            let _ = ws_write.send(Message::Pong(data)).await;
                        }
                        Some(Ok(Message::Close(frame))) => {
                            let (code, reason) = frame
                                .map(|f| (u16::from(f.code), f.reason.as_str().to_owned()))
                                .unwrap_or((CLOSE_NO_STATUS, String::new()));
                            return TransportEvent::Closed { code, reason };
                        }
                        Some(Err(e)) => {
                            (self.sink)(TransportEvent::Error(e.to_string()));
                            return TransportEvent::Closed { code: CLOSE_ABNORMAL, reason: e.to_string() };
                        }
                        None => {
                            return TransportEvent::Closed { code: CLOSE_ABNORMAL, reason: "stream ended".into() };
                        }
                        _ => {} // Pong, Frame
                    }
                }

                // Outbound frame from the feed client
                Some(text) = outbound_rx.recv() => {
                    if let Err(e) = ws_write.send(Message::Text(text.into())).await {
                        (self.sink)(TransportEvent::Error(e.to_string()));
                        return TransportEvent::Closed { code: CLOSE_ABNORMAL, reason: format!("send failed: {e}") };
                    }
                }

                // Keep-alive
                _ = next_ping(&mut ping) => {
                    if let Err(e) = ws_write.send(Message::Ping(Vec::new().into())).await {
                        (self.sink)(TransportEvent::Error(e.to_string()));
                        return TransportEvent::Closed { code: CLOSE_ABNORMAL, reason: format!("ping failed: {e}") };
                    }
                }
            }
        }
    }
}

fn dropped_handle() -> CloseRequest {
    CloseRequest { code: CLOSE_NORMAL, reason: "connection handle dropped".into() }
}

async fn next_ping(ping: &mut Option<tokio::time::Interval>) {
    match ping {
        Some(interval) => {
            interval.tick().await;
        }
        None => std::future::pending::<()>().await,
    }
}

/// Establish a WebSocket connection, adding the configured headers.
async fn connect_ws(url: &str, extra_headers: &HashMap<String, String>) -> Result<WsStream, FeedError> {
    let mut request = url
        .into_client_request()
        .map_err(|e| FeedError::WebSocket(format!("bad request for {url}: {e}")))?;

    for (key, value) in extra_headers {
        let name = HeaderName::from_bytes(key.as_bytes())
            .map_err(|e| FeedError::Config(format!("invalid header name '{key}': {e}")))?;
        let value = HeaderValue::from_str(value)
            .map_err(|e| FeedError::Config(format!("invalid value for header '{key}': {e}")))?;
        request.headers_mut().insert(name, value);
    }

    let (stream, _response) = tokio_tungstenite::connect_async(request)
        .await
        .map_err(|e| FeedError::WebSocket(e.to_string()))?;
    Ok(stream)
}
