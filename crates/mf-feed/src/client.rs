//! Feed client — owns the single transport connection and its lifecycle.
//!
//! # Lifecycle
//!
//! ```text
//!            start()                 Open
//! Disconnected ──────► Connecting ──────────► Connected
//!      ▲                   │ timeout              │ Closed (code != 1000/1001)
//!      │                   ▼                      ▼
//!      └──────────── tryReconnect: attempt n waits n × base_delay, max N
//! ```
//!
//! Every connection attempt gets a fresh generation number. Transport events
//! and timers carry the generation they were created for and are discarded
//! when it no longer matches, so a late `Open` from an abandoned attempt or a
//! frame arriving after [`FeedClient::stop`] has no effect.
//!
//! Nothing on this path returns an error to the caller. Failed attempts are
//! retried with linear backoff until the attempt budget is spent, after which
//! the client stays `Disconnected` until [`FeedClient::start`] is called again.

use std::sync::{Arc, Weak};

use mf_core::config::FeedConfig;
use mf_core::ws::{CLOSE_NORMAL, Connection, EventSink, Transport, TransportEvent};
use mf_core::{ConnectionState, TradingInstrument};
use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, trace, warn};

use crate::normalizer::Normalizer;
use crate::protocol::{
    CLIENT_CLOSE_REASON, build_data_request, build_handshake, build_instrument_subscribe, build_instrument_unsubscribe,
    is_intentional_close,
};
use crate::registry::{ListenerId, SubscriptionRegistry, Topic};

/// Handle to a market data feed client.
///
/// Cloning is cheap and every clone drives the same connection, so the
/// embedding application creates one client and passes clones to whoever
/// needs it. All methods must be called from within a tokio runtime.
#[derive(Clone)]
pub struct FeedClient {
    shared: Arc<Shared>,
}

struct Shared {
    config: FeedConfig,
    transport: Arc<dyn Transport>,
    session: Mutex<Session>,
    registry: Mutex<SubscriptionRegistry>,
    normalizer: Mutex<Normalizer>,
}

#[derive(Default)]
struct Session {
    state: ConnectionState,
    /// Bumped whenever the current connection attempt is abandoned or ends.
    generation: u64,
    attempts: u32,
    connection: Option<Box<dyn Connection>>,
    connect_timeout: Option<JoinHandle<()>>,
    reconnect_timer: Option<JoinHandle<()>>,
}

impl Session {
    fn cancel_connect_timeout(&mut self) {
        if let Some(t) = self.connect_timeout.take() {
            t.abort();
        }
    }

    fn cancel_reconnect(&mut self) {
        if let Some(t) = self.reconnect_timer.take() {
            t.abort();
        }
    }

    /// Best-effort control message. Only sent while connected.
    fn send(&self, text: String, what: &str) {
        match &self.connection {
            Some(conn) if self.state == ConnectionState::Connected => match conn.send(text) {
                Ok(()) => debug!("[feed] sent {what}"),
                Err(e) => warn!("[feed] {what} not sent: {e}"),
            },
            _ => trace!("[feed] {what} skipped, not connected"),
        }
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        self.cancel_connect_timeout();
        self.cancel_reconnect();
    }
}

impl FeedClient {
    /// Create a client with an OS-seeded normalizer. Does not connect.
    pub fn new(config: FeedConfig, transport: Arc<dyn Transport>) -> Self {
        Self::with_normalizer(config, transport, Normalizer::default())
    }

    /// Create a client with a caller-provided normalizer (e.g. a seeded one).
    pub fn with_normalizer(config: FeedConfig, transport: Arc<dyn Transport>, normalizer: Normalizer) -> Self {
        Self {
            shared: Arc::new(Shared {
                config,
                transport,
                session: Mutex::new(Session::default()),
                registry: Mutex::new(SubscriptionRegistry::new()),
                normalizer: Mutex::new(normalizer),
            }),
        }
    }

    pub fn config(&self) -> &FeedConfig {
        &self.shared.config
    }

    /// Open the connection. No-op while connecting or connected.
    ///
    /// Also resets the reconnect budget, so calling this after the client has
    /// given up starts a fresh series of attempts.
    pub fn start(&self) {
        let mut session = self.shared.session.lock();
        if session.state == ConnectionState::Disconnected {
            session.attempts = 0;
        }
        self.shared.start_locked(&mut session);
    }

    /// Close the connection and cancel pending timers. Idempotent.
    pub fn stop(&self) {
        self.shared.stop();
    }

    pub fn is_connected(&self) -> bool {
        self.state() == ConnectionState::Connected
    }

    pub fn state(&self) -> ConnectionState {
        self.shared.session.lock().state
    }

    /// Whether a reconnect attempt is scheduled.
    pub fn is_reconnecting(&self) -> bool {
        self.shared.session.lock().reconnect_timer.is_some()
    }

    /// Reconnect attempts made since the last successful open.
    pub fn reconnect_attempts(&self) -> u32 {
        self.shared.session.lock().attempts
    }

    /// Listen to full instrument snapshots.
    ///
    /// When already connected, asks the server for a fresh snapshot so the
    /// new listener does not wait for the next push.
    pub fn subscribe<F>(&self, listener: F) -> ListenerId
    where
        F: Fn(&[TradingInstrument]) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        let id = self.shared.registry.lock().subscribe(listener);
        self.shared.session.lock().send(build_data_request(), "data request");
        id
    }

    /// Remove one listener added with [`subscribe`](Self::subscribe) or
    /// [`subscribe_to_instrument`](Self::subscribe_to_instrument).
    pub fn unsubscribe(&self, id: ListenerId) -> bool {
        self.shared.registry.lock().unsubscribe(id)
    }

    /// Listen to targeted updates for `symbol`.
    pub fn subscribe_to_instrument<F>(&self, symbol: &str, listener: F) -> ListenerId
    where
        F: Fn(&TradingInstrument) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        let id = self.shared.registry.lock().subscribe_instrument(symbol, listener);
        self.shared
            .session
            .lock()
            .send(build_instrument_subscribe(symbol), "instrument subscribe");
        id
    }

    /// Drop every listener on `symbol` and tell the server to stop sending it.
    pub fn unsubscribe_from_instrument(&self, symbol: &str) {
        let removed = self.shared.registry.lock().unsubscribe_instrument(symbol);
        debug!("[feed] removed {removed} listener(s) for {symbol}");
        self.shared
            .session
            .lock()
            .send(build_instrument_unsubscribe(symbol), "instrument unsubscribe");
    }

    pub fn remove_all_listeners(&self) {
        self.shared.registry.lock().remove_all();
    }

    pub fn listener_count(&self, topic: &Topic) -> usize {
        self.shared.registry.lock().listener_count(topic)
    }
}

impl Shared {
    fn start_locked(self: &Arc<Self>, session: &mut Session) {
        if session.state != ConnectionState::Disconnected {
            warn!("[feed] start ignored, already {}", session.state);
            return;
        }
        session.cancel_reconnect();
        session.generation += 1;
        session.state = ConnectionState::Connecting;
        let generation = session.generation;

        info!("[feed] connecting to {} (generation {generation})", self.config.endpoint);
        session.connection = Some(self.transport.open(&self.config.endpoint, self.event_sink(generation)));

        let weak = Arc::downgrade(self);
        let timeout = self.config.connect_timeout();
        session.connect_timeout = Some(tokio::spawn(async move {
            tokio::time::sleep(timeout).await;
            if let Some(shared) = weak.upgrade() {
                shared.on_connect_timeout(generation);
            }
        }));
    }

    fn stop(&self) {
        let mut session = self.session.lock();
        session.cancel_reconnect();
        session.cancel_connect_timeout();
        session.generation += 1;
        session.attempts = 0;
        session.state = ConnectionState::Disconnected;
        match session.connection.take() {
            Some(conn) => {
                conn.close(CLOSE_NORMAL, CLIENT_CLOSE_REASON);
                info!("[feed] stopped");
            }
            None => debug!("[feed] stop: already disconnected"),
        }
    }

    fn event_sink(self: &Arc<Self>, generation: u64) -> EventSink {
        let weak: Weak<Self> = Arc::downgrade(self);
        Arc::new(move |event| {
            if let Some(shared) = weak.upgrade() {
                shared.handle_event(generation, event);
            }
        })
    }

    fn handle_event(self: &Arc<Self>, generation: u64, event: TransportEvent) {
        let mut session = self.session.lock();
        if session.generation != generation {
            trace!("[feed] ignoring stale event from generation {generation} (current {})", session.generation);
            return;
        }
        match event {
            TransportEvent::Open => self.on_open(&mut session),
            TransportEvent::Message(raw) => {
                drop(session);
                self.on_message(&raw);
            }
            TransportEvent::Error(e) => warn!("[feed] transport error: {e}"),
            TransportEvent::Closed { code, reason } => self.on_close(&mut session, code, &reason),
        }
    }

    fn on_open(&self, session: &mut Session) {
        if session.state != ConnectionState::Connecting {
            debug!("[feed] open while {}, ignoring", session.state);
            return;
        }
        session.cancel_connect_timeout();
        session.state = ConnectionState::Connected;
        session.attempts = 0;
        info!("[feed] connected to {}", self.config.endpoint);

        session.send(build_handshake(self.config.client_id(), &self.config.client_version), "handshake");

        // Resume whatever the listeners were receiving before a reconnect.
        let (wants_bulk, symbols) = {
            let registry = self.registry.lock();
            (registry.has_listeners(&Topic::Bulk), registry.instrument_symbols())
        };
        if wants_bulk {
            session.send(build_data_request(), "data request");
        }
        for symbol in &symbols {
            session.send(build_instrument_subscribe(symbol), "instrument subscribe");
        }
    }

    fn on_message(&self, raw: &str) {
        let Some(event) = self.normalizer.lock().normalize(raw) else {
            return;
        };
        let topic = event.topic();
        let Some(dispatch) = self.registry.lock().prepare(event) else {
            trace!("[feed] no listeners on {topic}");
            return;
        };
        let report = dispatch.run();
        if report.failed > 0 {
            debug!("[feed] {topic}: {} delivered, {} failed", report.delivered, report.failed);
        }
    }

    fn on_close(self: &Arc<Self>, session: &mut Session, code: u16, reason: &str) {
        session.cancel_connect_timeout();
        session.connection = None;
        session.state = ConnectionState::Disconnected;
        session.generation += 1;

        if is_intentional_close(code) {
            info!("[feed] closed by server (code={code}, reason='{reason}'), not reconnecting");
            return;
        }
        warn!("[feed] connection lost (code={code}, reason='{reason}')");
        self.try_reconnect(session);
    }

    fn on_connect_timeout(self: &Arc<Self>, generation: u64) {
        let mut session = self.session.lock();
        if session.generation != generation || session.state != ConnectionState::Connecting {
            return;
        }
        warn!("[feed] no open within {:?}, abandoning attempt", self.config.connect_timeout());
        // This task is the timeout; just forget its handle.
        session.connect_timeout = None;
        session.generation += 1;
        session.state = ConnectionState::Disconnected;
        if let Some(conn) = session.connection.take() {
            conn.close(CLOSE_NORMAL, "connect timeout");
        }
        self.try_reconnect(&mut session);
    }

    fn try_reconnect(self: &Arc<Self>, session: &mut Session) {
        let policy = &self.config.reconnect;
        if session.attempts >= policy.max_attempts {
            error!(
                "[feed] giving up after {} reconnect attempts, staying disconnected until started again",
                session.attempts
            );
            return;
        }
        session.attempts += 1;
        let delay = policy.delay_for(session.attempts);
        let generation = session.generation;
        info!("[feed] reconnect attempt {}/{} in {delay:?}", session.attempts, policy.max_attempts);

        session.cancel_reconnect();
        let weak = Arc::downgrade(self);
        session.reconnect_timer = Some(tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            if let Some(shared) = weak.upgrade() {
                shared.on_reconnect_due(generation);
            }
        }));
    }

    fn on_reconnect_due(self: &Arc<Self>, generation: u64) {
        let mut session = self.session.lock();
        if session.generation != generation || session.state != ConnectionState::Disconnected {
            trace!("[feed] stale reconnect timer for generation {generation}");
            return;
        }
        // This task is the timer; just forget its handle.
        session.reconnect_timer = None;
        self.start_locked(&mut session);
    }
}
