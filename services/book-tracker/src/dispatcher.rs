//! Routes book messages to per-pair trackers

use crate::messages::BookMessage;
use crate::tracker::{BookConsumer, PairTracker, UpdateOutcome};
use rustc_hash::FxHashMap;
use std::fmt;
use tracing::{debug, info, trace};

/// Callback asking the subscription layer for a fresh snapshot of a pair
pub type SnapshotRequestHandler = Box<dyn Fn(&str) + Send + Sync>;

/// Book sink driven by the subscription manager
pub trait GlobalTracker: Send + 'static {
    /// A snapshot for a pair the caller wants
    fn new_snapshot(&mut self, book: &BookMessage);

    /// A delta for any pair
    fn new_update(&mut self, book: &BookMessage);

    /// Forget everything about `pair`
    fn new_unsubscribe(&mut self, pair: &str);

    /// Register the one handler for snapshot requests, replacing any previous
    fn set_snapshot_request_handler(&mut self, handler: SnapshotRequestHandler);
}

/// [`GlobalTracker`] keeping one [`PairTracker`] per pair
///
/// Trackers are created on the first snapshot of a pair using `factory`,
/// which receives the pair name and depth and returns the pair's consumer.
pub struct TrackerDispatcher<C, F> {
    trackers: FxHashMap<String, PairTracker<C>>,
    factory: F,
    depth: usize,
    on_snapshot_request: Option<SnapshotRequestHandler>,
}

impl<C, F> TrackerDispatcher<C, F>
where
    C: BookConsumer,
    F: FnMut(&str, usize) -> C,
{
    pub fn new(depth: usize, factory: F) -> Self {
        Self {
            trackers: FxHashMap::default(),
            factory,
            depth,
            on_snapshot_request: None,
        }
    }

    /// Tracker for `pair`, if one exists
    pub fn tracker(&self, pair: &str) -> Option<&PairTracker<C>> {
        self.trackers.get(pair)
    }

    /// Pairs with a live tracker, sorted
    pub fn pairs(&self) -> Vec<String> {
        let mut pairs: Vec<String> = self.trackers.keys().cloned().collect();
        pairs.sort();
        pairs
    }

    pub fn len(&self) -> usize {
        self.trackers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.trackers.is_empty()
    }

    fn request_snapshot(&self, pair: &str) {
        match &self.on_snapshot_request {
            Some(handler) => handler(pair),
            None => debug!(pair, "Snapshot wanted but no handler registered"),
        }
    }
}

impl<C, F> GlobalTracker for TrackerDispatcher<C, F>
where
    C: BookConsumer + Send + 'static,
    F: FnMut(&str, usize) -> C + Send + 'static,
{
    fn new_snapshot(&mut self, book: &BookMessage) {
        let depth = self.depth;
        let factory = &mut self.factory;
        self.trackers
            .entry(book.pair.clone())
            .or_insert_with(|| {
                info!(pair = %book.pair, depth, "Tracking new pair");
                PairTracker::new(book.pair.clone(), depth, factory(&book.pair, depth))
            })
            .apply_snapshot(book);
    }

    fn new_update(&mut self, book: &BookMessage) {
        let Some(tracker) = self.trackers.get_mut(&book.pair) else {
            debug!(pair = %book.pair, "Delta for untracked pair");
            self.request_snapshot(&book.pair);
            return;
        };

        match tracker.apply_delta(book) {
            Ok(UpdateOutcome::Published) => {}
            Ok(UpdateOutcome::Skipped) => trace!(pair = %book.pair, "Delta ignored until snapshot"),
            Err(mismatch) => self.request_snapshot(&mismatch.pair),
        }
    }

    fn new_unsubscribe(&mut self, pair: &str) {
        if self.trackers.remove(pair).is_some() {
            info!(pair, "Stopped tracking pair");
        }
    }

    fn set_snapshot_request_handler(&mut self, handler: SnapshotRequestHandler) {
        self.on_snapshot_request = Some(handler);
    }
}

impl<C, F> fmt::Debug for TrackerDispatcher<C, F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut pairs: Vec<&String> = self.trackers.keys().collect();
        pairs.sort();
        f.debug_struct("TrackerDispatcher")
            .field("depth", &self.depth)
            .field("pairs", &pairs)
            .field("has_handler", &self.on_snapshot_request.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::ChecksumMismatch;
    use crate::messages::PriceLevel;
    use crate::side::OrderedSide;
    use parking_lot::Mutex;
    use std::sync::Arc;

    #[derive(Debug, Default)]
    struct Counter {
        pair: String,
        books: usize,
        mismatches: usize,
    }

    impl BookConsumer for Counter {
        fn on_book_available(&mut self, _timestamp: &str, _asks: &OrderedSide, _bids: &OrderedSide) {
            self.books += 1;
        }

        fn on_checksum_mismatch(&mut self, _mismatch: &ChecksumMismatch) {
            self.mismatches += 1;
        }
    }

    type Requests = Arc<Mutex<Vec<String>>>;

    fn dispatcher() -> (TrackerDispatcher<Counter, impl FnMut(&str, usize) -> Counter>, Requests) {
        let requests: Requests = Arc::default();
        let mut dispatcher = TrackerDispatcher::new(10, |pair: &str, _depth| Counter {
            pair: pair.to_string(),
            ..Counter::default()
        });
        let sink = Arc::clone(&requests);
        dispatcher.set_snapshot_request_handler(Box::new(move |pair: &str| sink.lock().push(pair.to_string())));
        (dispatcher, requests)
    }

    fn level(price: &str) -> PriceLevel {
        PriceLevel::from_fields(&[price, "1.0", "1.0"]).expect("valid level")
    }

    fn snapshot(pair: &str) -> BookMessage {
        BookMessage::snapshot(1, "book-10", pair, vec![level("2.0")], vec![level("1.0")])
    }

    fn delta(pair: &str, checksum: &str) -> BookMessage {
        BookMessage::delta(1, "book-10", pair, vec![level("2.5")], vec![], checksum)
    }

    #[test]
    fn snapshot_creates_tracker_lazily() {
        let (mut dispatcher, requests) = dispatcher();
        assert!(dispatcher.is_empty());

        dispatcher.new_snapshot(&snapshot("XBT/USD"));
        dispatcher.new_snapshot(&snapshot("ETH/USD"));
        dispatcher.new_snapshot(&snapshot("XBT/USD"));

        assert_eq!(dispatcher.pairs(), vec!["ETH/USD".to_string(), "XBT/USD".to_string()]);
        let tracker = dispatcher.tracker("XBT/USD").expect("tracker exists");
        assert_eq!(tracker.consumer().pair, "XBT/USD");
        assert_eq!(tracker.consumer().books, 2);
        assert_eq!(tracker.depth(), 10);
        assert!(requests.lock().is_empty());
    }

    #[test]
    fn delta_for_unknown_pair_requests_snapshot() {
        let (mut dispatcher, requests) = dispatcher();
        dispatcher.new_update(&delta("XBT/USD", "0"));

        assert!(dispatcher.is_empty());
        assert_eq!(*requests.lock(), vec!["XBT/USD".to_string()]);
    }

    #[test]
    fn mismatch_requests_snapshot_once() {
        let (mut dispatcher, requests) = dispatcher();
        dispatcher.new_snapshot(&snapshot("XBT/USD"));

        dispatcher.new_update(&delta("XBT/USD", "1"));
        dispatcher.new_update(&delta("XBT/USD", "1"));

        assert_eq!(*requests.lock(), vec!["XBT/USD".to_string()]);
        let tracker = dispatcher.tracker("XBT/USD").expect("tracker kept");
        assert!(!tracker.is_initialized());
        assert_eq!(tracker.consumer().mismatches, 1);
    }

    #[test]
    fn unsubscribe_drops_tracker() {
        let (mut dispatcher, requests) = dispatcher();
        dispatcher.new_snapshot(&snapshot("XBT/USD"));
        dispatcher.new_unsubscribe("XBT/USD");
        dispatcher.new_unsubscribe("XBT/USD");

        assert!(dispatcher.tracker("XBT/USD").is_none());
        dispatcher.new_update(&delta("XBT/USD", "0"));
        assert_eq!(*requests.lock(), vec!["XBT/USD".to_string()]);
    }

    #[test]
    fn works_without_handler() {
        let mut dispatcher = TrackerDispatcher::new(10, |_: &str, _| Counter::default());
        dispatcher.new_update(&delta("XBT/USD", "0"));
        assert!(dispatcher.is_empty());
    }
}
