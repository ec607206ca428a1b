//! Subscription lifecycle
//!
//! [`SubscriptionManager`] keeps the set of pairs the caller wants, retries
//! every subscribe/unsubscribe intent until the venue acknowledges it, replays
//! the desired set after each reconnect and feeds decoded books to a
//! [`GlobalTracker`].
//!
//! Retry loops are keyed by `(pair, action)`. Starting an intent for a pair
//! replaces the loop with the same key and cancels the loop of the opposite
//! action, which the new intent makes obsolete.

use crate::dispatcher::GlobalTracker;
use crate::errors::FeedError;
use crate::messages::{
    BookMessage, FeedMessage, SubscriptionAction, SubscriptionRequest, SubscriptionState,
    SubscriptionStatus, decode,
};
use crate::transport::{Transport, TransportEvent, TransportEvents};
use parking_lot::Mutex;
use rustc_hash::{FxHashMap, FxHashSet};
use services_common::FeedConfig;
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::runtime::Handle;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, trace, warn};

/// Identity of a retry loop
pub type RetryKey = (String, SubscriptionAction);

/// One subscribe or unsubscribe request, resent until acknowledged
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubscriptionIntent {
    pub pair: String,
    pub action: SubscriptionAction,
    pub depth: usize,
}

impl SubscriptionIntent {
    pub fn new(pair: impl Into<String>, action: SubscriptionAction, depth: usize) -> Self {
        Self {
            pair: pair.into(),
            action,
            depth,
        }
    }

    pub fn key(&self) -> RetryKey {
        (self.pair.clone(), self.action)
    }

    /// Wire text of the request
    pub fn encode(&self) -> Result<String, serde_json::Error> {
        SubscriptionRequest::book(self.action, &self.pair, self.depth).to_json()
    }
}

struct Inner<T, G> {
    transport: T,
    tracker: Mutex<G>,
    desired: Mutex<FxHashSet<String>>,
    retries: Mutex<FxHashMap<RetryKey, oneshot::Sender<()>>>,
    depth: usize,
    retry_interval: Duration,
}

impl<T: Transport, G: GlobalTracker> Inner<T, G> {
    fn start_intent(self: &Arc<Self>, pair: &str, action: SubscriptionAction) {
        let intent = SubscriptionIntent::new(pair, action, self.depth);
        let payload = match intent.encode() {
            Ok(payload) => payload,
            Err(e) => {
                error!(pair, ?action, error = %e, "Failed to encode subscription request");
                return;
            }
        };
        let Ok(runtime) = Handle::try_current() else {
            error!(pair, ?action, "No Tokio runtime, retry loop not started");
            return;
        };

        let (cancel_tx, mut cancel_rx) = oneshot::channel();
        {
            let mut retries = self.retries.lock();
            // dropping a sender ends its loop
            retries.remove(&(pair.to_string(), action.opposite()));
            retries.insert(intent.key(), cancel_tx);
        }

        let weak = Arc::downgrade(self);
        let interval = self.retry_interval;
        debug!(pair, ?action, "Starting retry loop");
        runtime.spawn(async move {
            loop {
                let Some(inner) = weak.upgrade() else { break };
                trace!(pair = %intent.pair, action = ?intent.action, "Sending intent");
                if let Err(e) = inner.transport.send(payload.clone()) {
                    warn!(pair = %intent.pair, error = %e, "Failed to send intent, will retry");
                }
                drop(inner);

                tokio::select! {
                    _ = &mut cancel_rx => break,
                    () = tokio::time::sleep(interval) => {}
                }
            }
            debug!(pair = %intent.pair, action = ?intent.action, "Retry loop finished");
        });
    }

    fn cancel_intent(&self, pair: &str, action: SubscriptionAction) -> bool {
        self.retries
            .lock()
            .remove(&(pair.to_string(), action))
            .is_some()
    }

    fn handle_event(self: &Arc<Self>, event: TransportEvent) {
        match event {
            TransportEvent::Message(text) => self.handle_message(&text),
            TransportEvent::Reconnected(reason) => self.handle_reconnect(&reason),
            TransportEvent::Disconnected(reason) => warn!(%reason, "Transport disconnected"),
        }
    }

    fn handle_reconnect(self: &Arc<Self>, reason: &str) {
        let pairs: Vec<String> = self.desired.lock().iter().cloned().collect();
        info!(reason, pairs = pairs.len(), "Transport connected, replaying subscriptions");
        for pair in pairs {
            self.start_intent(&pair, SubscriptionAction::Subscribe);
        }
    }

    fn handle_message(self: &Arc<Self>, raw: &str) {
        match decode(raw) {
            Ok(FeedMessage::Heartbeat) => trace!("Heartbeat"),
            Ok(FeedMessage::Close) => debug!("Connection closed by venue"),
            Ok(FeedMessage::SystemStatus(status)) => info!(
                connection_id = status.connection_id,
                status = %status.status,
                version = %status.version,
                "System status"
            ),
            Ok(FeedMessage::SubscriptionStatus(status)) => self.handle_status(&status),
            Ok(FeedMessage::Book(book)) => self.handle_book(&book),
            Err(e @ FeedError::UnknownControlMessage(_)) => error!(error = %e, "Dropping message"),
            Err(e) => warn!(error = %e, "Dropping message"),
        }
    }

    fn handle_status(&self, status: &SubscriptionStatus) {
        let Some(pair) = status.pair.as_deref() else {
            debug!(status = %status.status, "Subscription status without pair");
            return;
        };
        match status.state() {
            SubscriptionState::Subscribed => {
                let cancelled = self.cancel_intent(pair, SubscriptionAction::Subscribe);
                debug!(pair, cancelled, channel = ?status.channel_name, "Subscribed");
            }
            SubscriptionState::Unsubscribed => {
                let cancelled = self.cancel_intent(pair, SubscriptionAction::Unsubscribe);
                debug!(pair, cancelled, "Unsubscribed");
            }
            SubscriptionState::Error => warn!(
                pair,
                error = status.error_message.as_deref().unwrap_or("unspecified"),
                "Subscription rejected"
            ),
            SubscriptionState::Other => debug!(pair, status = %status.status, "Subscription status"),
        }
    }

    fn handle_book(self: &Arc<Self>, book: &BookMessage) {
        if !book.is_snapshot() {
            self.tracker.lock().new_update(book);
            return;
        }

        let wanted = self.desired.lock().contains(&book.pair);
        if wanted {
            self.tracker.lock().new_snapshot(book);
        } else {
            info!(pair = %book.pair, "Snapshot for unwanted pair, unsubscribing");
            self.start_intent(&book.pair, SubscriptionAction::Unsubscribe);
            self.tracker.lock().new_unsubscribe(&book.pair);
        }
    }

    fn handle_snapshot_request(self: &Arc<Self>, pair: &str) {
        if !self.desired.lock().contains(pair) {
            debug!(pair, "Ignoring snapshot request for unwanted pair");
            return;
        }
        info!(pair, "Requesting fresh snapshot");
        self.start_intent(pair, SubscriptionAction::Subscribe);
    }
}

/// Keeps the venue subscriptions in line with the desired set
///
/// Retry loops and the event loop run on the ambient Tokio runtime. Outside
/// one, intents still update the desired set but nothing is sent until a
/// reconnect replays them from inside a runtime.
pub struct SubscriptionManager<T, G> {
    inner: Arc<Inner<T, G>>,
    events: Mutex<Option<TransportEvents>>,
    event_loop: Mutex<Option<JoinHandle<()>>>,
}

impl<T: Transport, G: GlobalTracker> SubscriptionManager<T, G> {
    /// Wire a transport and its event channel to a tracker
    pub fn new(transport: T, events: TransportEvents, tracker: G, config: &FeedConfig) -> Self {
        let inner = Arc::new(Inner {
            transport,
            tracker: Mutex::new(tracker),
            desired: Mutex::new(FxHashSet::default()),
            retries: Mutex::new(FxHashMap::default()),
            depth: config.depth,
            retry_interval: config.retry_interval(),
        });

        let weak: Weak<Inner<T, G>> = Arc::downgrade(&inner);
        inner
            .tracker
            .lock()
            .set_snapshot_request_handler(Box::new(move |pair: &str| {
                if let Some(inner) = weak.upgrade() {
                    inner.handle_snapshot_request(pair);
                }
            }));

        Self {
            inner,
            events: Mutex::new(Some(events)),
            event_loop: Mutex::new(None),
        }
    }

    /// Add `pair` to the desired set
    pub fn subscribe(&self, pair: &str) {
        let added = self.inner.desired.lock().insert(pair.to_string());
        if added {
            info!(pair, "Subscribing");
            self.inner.start_intent(pair, SubscriptionAction::Subscribe);
        }
    }

    /// Remove `pair` from the desired set and drop its book
    pub fn unsubscribe(&self, pair: &str) {
        let removed = self.inner.desired.lock().remove(pair);
        if removed {
            info!(pair, "Unsubscribing");
            self.inner.start_intent(pair, SubscriptionAction::Unsubscribe);
            self.inner.tracker.lock().new_unsubscribe(pair);
        }
    }

    /// Start the transport and process its events in the background
    pub fn run(&self) -> Result<(), FeedError> {
        let runtime = Handle::try_current()
            .map_err(|e| FeedError::Transport(format!("no Tokio runtime: {e}")))?;
        let Some(mut events) = self.events.lock().take() else {
            return Err(FeedError::Transport("manager already running".to_string()));
        };
        self.inner.transport.start()?;

        let weak = Arc::downgrade(&self.inner);
        let handle = runtime.spawn(async move {
            while let Some(event) = events.recv().await {
                let Some(inner) = weak.upgrade() else { break };
                inner.handle_event(event);
            }
            debug!("Transport event stream ended");
        });
        *self.event_loop.lock() = Some(handle);
        Ok(())
    }

    /// Clear the desired set, cancel every retry and close the transport
    pub async fn stop(&self) -> bool {
        self.inner.desired.lock().clear();
        let cancelled = {
            let mut retries = self.inner.retries.lock();
            let count = retries.len();
            retries.clear();
            count
        };
        info!(cancelled, "Stopping subscription manager");

        let stopped = self.inner.transport.stop().await;
        if let Some(handle) = self.event_loop.lock().take() {
            handle.abort();
        }
        stopped
    }

    /// Process one raw inbound message
    pub fn handle_message(&self, raw: &str) {
        self.inner.handle_message(raw);
    }

    /// Replay the desired set as after a transport reconnect
    pub fn handle_reconnect(&self, reason: &str) {
        self.inner.handle_reconnect(reason);
    }

    /// Desired pairs, sorted
    pub fn desired_pairs(&self) -> Vec<String> {
        let mut pairs: Vec<String> = self.inner.desired.lock().iter().cloned().collect();
        pairs.sort();
        pairs
    }

    /// Keys of the retry loops still waiting for acknowledgement, sorted
    pub fn pending_intents(&self) -> Vec<RetryKey> {
        let mut keys: Vec<RetryKey> = self.inner.retries.lock().keys().cloned().collect();
        keys.sort();
        keys
    }

    /// Run `f` against the tracker
    pub fn with_tracker<R>(&self, f: impl FnOnce(&G) -> R) -> R {
        f(&self.inner.tracker.lock())
    }
}
