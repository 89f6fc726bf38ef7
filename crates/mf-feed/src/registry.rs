//! Subscription registry — typed publish/subscribe between the normalizer and
//! the UI layer.
//!
//! Two topic kinds exist: the general bulk feed, and one topic per instrument
//! symbol. Each kind has its own listener signature, so a bulk listener can
//! never be handed a single-instrument update.
//!
//! Dispatch is split in two steps. [`SubscriptionRegistry::prepare`] snapshots
//! the listeners of the event's topic, and [`Dispatch::run`] invokes them. The
//! feed client prepares under its registry lock and runs after releasing it,
//! so a listener may subscribe or unsubscribe without deadlocking.

use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;

use ahash::AHashMap;
use mf_core::TradingInstrument;
use tracing::{error, trace, warn};

/// Receives every bulk snapshot.
pub type BulkListener = Arc<dyn Fn(&[TradingInstrument]) -> anyhow::Result<()> + Send + Sync>;

/// Receives updates for one instrument.
pub type InstrumentListener = Arc<dyn Fn(&TradingInstrument) -> anyhow::Result<()> + Send + Sync>;

/// Handle returned by `subscribe*`, used to remove a single listener.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

/// A registry channel.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Topic {
    /// Full instrument snapshots.
    Bulk,
    /// Targeted updates for one symbol.
    Instrument(String),
}

impl std::fmt::Display for Topic {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Bulk => write!(f, "bulk"),
            Self::Instrument(symbol) => write!(f, "instrument:{symbol}"),
        }
    }
}

/// A normalized inbound update.
#[derive(Debug, Clone, PartialEq)]
pub enum FeedEvent {
    /// Full replacement set of instruments.
    Bulk(Vec<TradingInstrument>),
    /// One instrument, routed to its symbol's topic.
    Instrument(TradingInstrument),
}

impl FeedEvent {
    pub fn topic(&self) -> Topic {
        match self {
            Self::Bulk(_) => Topic::Bulk,
            Self::Instrument(i) => Topic::Instrument(i.symbol.clone()),
        }
    }
}

/// Outcome of one dispatch.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DispatchReport {
    pub delivered: usize,
    pub failed: usize,
}

/// Listeners snapshotted for one event, ready to be invoked.
pub enum Dispatch {
    Bulk {
        batch: Vec<TradingInstrument>,
        listeners: Vec<BulkListener>,
    },
    Instrument {
        update: TradingInstrument,
        listeners: Vec<InstrumentListener>,
    },
}

impl Dispatch {
    /// Invoke every listener in subscription order.
    ///
    /// A listener that returns an error or panics is logged and skipped; the
    /// remaining listeners still run.
    pub fn run(self) -> DispatchReport {
        let mut report = DispatchReport::default();
        match self {
            Self::Bulk { batch, listeners } => {
                for (idx, listener) in listeners.iter().enumerate() {
                    report.record(invoke(&Topic::Bulk, idx, || listener(batch.as_slice())));
                }
            }
            Self::Instrument { update, listeners } => {
                let topic = Topic::Instrument(update.symbol.clone());
                for (idx, listener) in listeners.iter().enumerate() {
                    report.record(invoke(&topic, idx, || listener(&update)));
                }
            }
        }
        report
    }
}

impl DispatchReport {
    fn record(&mut self, ok: bool) {
        if ok {
            self.delivered += 1;
        } else {
            self.failed += 1;
        }
    }
}

fn invoke(topic: &Topic, idx: usize, f: impl FnOnce() -> anyhow::Result<()>) -> bool {
    match catch_unwind(AssertUnwindSafe(f)) {
        Ok(Ok(())) => true,
        Ok(Err(e)) => {
            warn!("[registry] listener #{idx} on {topic} failed: {e:#}");
            false
        }
        Err(panic) => {
            let msg = panic
                .downcast_ref::<&str>()
                .map(|s| (*s).to_string())
                .or_else(|| panic.downcast_ref::<String>().cloned())
                .unwrap_or_else(|| "non-string panic payload".into());
            error!("[registry] listener #{idx} on {topic} panicked: {msg}");
            false
        }
    }
}

/// Topic → ordered listener table.
///
/// Topics with no listeners are not stored.
#[derive(Default)]
pub struct SubscriptionRegistry {
    next_id: u64,
    bulk: Vec<(ListenerId, BulkListener)>,
    instruments: AHashMap<String, Vec<(ListenerId, InstrumentListener)>>,
}

impl SubscriptionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn next_id(&mut self) -> ListenerId {
        self.next_id += 1;
        ListenerId(self.next_id)
    }

    /// Append a bulk listener.
    pub fn subscribe<F>(&mut self, listener: F) -> ListenerId
    where
        F: Fn(&[TradingInstrument]) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        let id = self.next_id();
        let listener: BulkListener = Arc::new(listener);
        self.bulk.push((id, listener));
        id
    }

    /// Append a listener on `symbol`'s topic.
    pub fn subscribe_instrument<F>(&mut self, symbol: &str, listener: F) -> ListenerId
    where
        F: Fn(&TradingInstrument) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        let id = self.next_id();
        let listener: InstrumentListener = Arc::new(listener);
        self.instruments.entry(symbol.to_string()).or_default().push((id, listener));
        id
    }

    /// Remove one listener from whichever topic holds it.
    pub fn unsubscribe(&mut self, id: ListenerId) -> bool {
        if let Some(pos) = self.bulk.iter().position(|(i, _)| *i == id) {
            self.bulk.remove(pos);
            return true;
        }
        let mut emptied = None;
        let mut found = false;
        for (symbol, listeners) in self.instruments.iter_mut() {
            if let Some(pos) = listeners.iter().position(|(i, _)| *i == id) {
                listeners.remove(pos);
                found = true;
                if listeners.is_empty() {
                    emptied = Some(symbol.clone());
                }
                break;
            }
        }
        if let Some(symbol) = emptied {
            self.instruments.remove(&symbol);
        }
        found
    }

    /// Drop every listener on `symbol`'s topic. Returns how many were removed.
    pub fn unsubscribe_instrument(&mut self, symbol: &str) -> usize {
        self.instruments.remove(symbol).map_or(0, |l| l.len())
    }

    /// Drop every listener on every topic.
    pub fn remove_all(&mut self) {
        self.bulk.clear();
        self.instruments.clear();
    }

    pub fn listener_count(&self, topic: &Topic) -> usize {
        match topic {
            Topic::Bulk => self.bulk.len(),
            Topic::Instrument(symbol) => self.instruments.get(symbol).map_or(0, Vec::len),
        }
    }

    pub fn has_listeners(&self, topic: &Topic) -> bool {
        self.listener_count(topic) > 0
    }

    /// Symbols that currently have at least one listener.
    pub fn instrument_symbols(&self) -> Vec<String> {
        let mut symbols: Vec<String> = self.instruments.keys().cloned().collect();
        symbols.sort_unstable();
        symbols
    }

    /// Snapshot the listeners for `event`. `None` when its topic is empty.
    pub fn prepare(&self, event: FeedEvent) -> Option<Dispatch> {
        match event {
            FeedEvent::Bulk(batch) => {
                if self.bulk.is_empty() {
                    trace!("[registry] no bulk listeners, dropping {} instruments", batch.len());
                    return None;
                }
                let listeners = self.bulk.iter().map(|(_, l)| Arc::clone(l)).collect();
                Some(Dispatch::Bulk { batch, listeners })
            }
            FeedEvent::Instrument(update) => {
                let listeners: Vec<_> = self
                    .instruments
                    .get(&update.symbol)?
                    .iter()
                    .map(|(_, l)| Arc::clone(l))
                    .collect();
                Some(Dispatch::Instrument { update, listeners })
            }
        }
    }

    /// Prepare and run in one step.
    pub fn dispatch(&self, event: FeedEvent) -> DispatchReport {
        self.prepare(event).map(Dispatch::run).unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::bail;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn batch(symbols: &[&str]) -> FeedEvent {
        FeedEvent::Bulk(symbols.iter().map(|s| TradingInstrument::new(*s)).collect())
    }

    #[test]
    fn failing_listener_does_not_block_others() {
        let mut reg = SubscriptionRegistry::new();
        let second = Arc::new(AtomicUsize::new(0));
        reg.subscribe(|_| bail!("boom"));
        let s = Arc::clone(&second);
        reg.subscribe(move |_| {
            s.fetch_add(1, Ordering::SeqCst);
            Ok(())
        });

        let report = reg.dispatch(batch(&["EURUSD"]));
        assert_eq!(report, DispatchReport { delivered: 1, failed: 1 });
        assert_eq!(second.load(Ordering::SeqCst), 1);

        reg.dispatch(batch(&["EURUSD"]));
        assert_eq!(second.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn panicking_listener_is_isolated() {
        let mut reg = SubscriptionRegistry::new();
        let hits = Arc::new(AtomicUsize::new(0));
        reg.subscribe_instrument("EURUSD", |_| panic!("listener bug"));
        let h = Arc::clone(&hits);
        reg.subscribe_instrument("EURUSD", move |_| {
            h.fetch_add(1, Ordering::SeqCst);
            Ok(())
        });

        let report = reg.dispatch(FeedEvent::Instrument(TradingInstrument::new("EURUSD")));
        assert_eq!(report, DispatchReport { delivered: 1, failed: 1 });
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn insertion_order() {
        let mut reg = SubscriptionRegistry::new();
        let order = Arc::new(Mutex::new(Vec::new()));
        for n in 0..4 {
            let o = Arc::clone(&order);
            reg.subscribe(move |_| {
                o.lock().unwrap().push(n);
                Ok(())
            });
        }
        reg.dispatch(batch(&["AAPL"]));
        assert_eq!(*order.lock().unwrap(), vec![0, 1, 2, 3]);
    }

    #[test]
    fn instrument_updates_only_reach_their_symbol() {
        let mut reg = SubscriptionRegistry::new();
        let eur = Arc::new(AtomicUsize::new(0));
        let e = Arc::clone(&eur);
        reg.subscribe_instrument("EURUSD", move |i| {
            assert_eq!(i.symbol, "EURUSD");
            e.fetch_add(1, Ordering::SeqCst);
            Ok(())
        });
        reg.subscribe(|_| bail!("bulk listener must not see instrument updates"));

        assert!(reg.prepare(FeedEvent::Instrument(TradingInstrument::new("GBPUSD"))).is_none());
        let report = reg.dispatch(FeedEvent::Instrument(TradingInstrument::new("EURUSD")));
        assert_eq!(report.delivered, 1);
        assert_eq!(report.failed, 0);
        assert_eq!(eur.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn empty_topics_cost_nothing() {
        let reg = SubscriptionRegistry::new();
        assert!(reg.prepare(batch(&["EURUSD"])).is_none());
        assert_eq!(reg.dispatch(batch(&["EURUSD"])), DispatchReport::default());
    }

    #[test]
    fn unsubscribe_variants() {
        let mut reg = SubscriptionRegistry::new();
        let a = reg.subscribe(|_| Ok(()));
        let b = reg.subscribe(|_| Ok(()));
        let c = reg.subscribe_instrument("BTCUSD", |_| Ok(()));
        reg.subscribe_instrument("BTCUSD", |_| Ok(()));
        reg.subscribe_instrument("ETHUSD", |_| Ok(()));

        assert!(reg.unsubscribe(a));
        assert!(!reg.unsubscribe(a));
        assert_eq!(reg.listener_count(&Topic::Bulk), 1);

        assert!(reg.unsubscribe(c));
        assert_eq!(reg.listener_count(&Topic::Instrument("BTCUSD".into())), 1);

        assert_eq!(reg.unsubscribe_instrument("BTCUSD"), 1);
        assert_eq!(reg.unsubscribe_instrument("BTCUSD"), 0);
        assert_eq!(reg.instrument_symbols(), vec!["ETHUSD".to_string()]);

        reg.remove_all();
        assert!(!reg.has_listeners(&Topic::Bulk));
        assert!(reg.instrument_symbols().is_empty());
        assert!(!reg.unsubscribe(b));
    }

    #[test]
    fn removing_last_listener_drops_topic() {
        let mut reg = SubscriptionRegistry::new();
        let id = reg.subscribe_instrument("AAPL", |_| Ok(()));
        assert!(reg.unsubscribe(id));
        assert!(reg.instrument_symbols().is_empty());
    }

    #[test]
    fn topic_display() {
        assert_eq!(Topic::Bulk.to_string(), "bulk");
        assert_eq!(Topic::Instrument("EURUSD".into()).to_string(), "instrument:EURUSD");
        assert_eq!(batch(&[]).topic(), Topic::Bulk);
    }
}
