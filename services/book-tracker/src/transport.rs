//! Transport contract consumed by the subscription manager

use crate::errors::FeedError;
use async_trait::async_trait;
use parking_lot::Mutex;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use tokio::sync::mpsc;

/// Everything a transport reports, in arrival order
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportEvent {
    /// A connection was (re)established; carries the reason
    Reconnected(String),
    /// The connection dropped; carries the reason
    Disconnected(String),
    /// One inbound text frame
    Message(String),
}

/// Receiving half handed to the subscription manager
pub type TransportEvents = mpsc::UnboundedReceiver<TransportEvent>;

/// Persistent connection to the venue
///
/// Implementations deliver their [`TransportEvent`]s on a single ordered
/// channel created alongside the transport.
#[async_trait]
pub trait Transport: Send + Sync + 'static {
    /// Begin connecting in the background
    fn start(&self) -> Result<(), FeedError>;

    /// Queue one outbound text frame
    fn send(&self, text: String) -> Result<(), FeedError>;

    /// Close the connection, returns whether a running connection was stopped
    async fn stop(&self) -> bool;
}

/// In-memory transport that records outbound frames
///
/// Clones share state, so a test can keep one handle while the manager owns
/// another.
#[derive(Debug, Clone)]
pub struct MockTransport {
    sent: Arc<Mutex<Vec<String>>>,
    events: mpsc::UnboundedSender<TransportEvent>,
    started: Arc<AtomicBool>,
    stop_calls: Arc<AtomicUsize>,
}

impl MockTransport {
    /// Create the transport and its event channel
    pub fn new() -> (Self, TransportEvents) {
        let (events, rx) = mpsc::unbounded_channel();
        let transport = Self {
            sent: Arc::new(Mutex::new(Vec::new())),
            events,
            started: Arc::new(AtomicBool::new(false)),
            stop_calls: Arc::new(AtomicUsize::new(0)),
        };
        (transport, rx)
    }

    /// Push an event as if it came from the venue
    pub fn inject(&self, event: TransportEvent) {
        // receiver gone means the manager is stopped
        let _ = self.events.send(event);
    }

    /// Frames sent so far
    pub fn sent(&self) -> Vec<String> {
        self.sent.lock().clone()
    }

    /// Frames sent so far, clearing the record
    pub fn take_sent(&self) -> Vec<String> {
        std::mem::take(&mut *self.sent.lock())
    }

    pub fn is_started(&self) -> bool {
        self.started.load(Ordering::Acquire)
    }

    pub fn stop_calls(&self) -> usize {
        self.stop_calls.load(Ordering::Acquire)
    }
}

#[async_trait]
impl Transport for MockTransport {
    fn start(&self) -> Result<(), FeedError> {
        self.started.store(true, Ordering::Release);
        Ok(())
    }

    fn send(&self, text: String) -> Result<(), FeedError> {
        self.sent.lock().push(text);
        Ok(())
    }

    async fn stop(&self) -> bool {
        self.stop_calls.fetch_add(1, Ordering::AcqRel);
        self.started.swap(false, Ordering::AcqRel)
    }
}
