//! Per-pair book replica
//!
//! A [`PairTracker`] owns both sides of one pair's book. Snapshots replace the
//! replica wholesale; deltas amend it, trim it to the subscribed depth and are
//! verified against the venue checksum before the book is published to the
//! tracker's [`BookConsumer`].

use crate::errors::ChecksumMismatch;
use crate::messages::{BookMessage, PriceLevel};
use crate::side::{OrderedSide, Side};
use services_common::CHECKSUM_LEVELS;
use tracing::{debug, warn};

/// Timestamp of a tracker that has not seen any data yet
pub const INITIAL_TIMESTAMP: &str = "0";

/// Receives every verified book
pub trait BookConsumer {
    /// Called synchronously after a snapshot or a verified delta
    fn on_book_available(&mut self, timestamp: &str, asks: &OrderedSide, bids: &OrderedSide);

    /// Called when a delta fails verification
    fn on_checksum_mismatch(&mut self, _mismatch: &ChecksumMismatch) {}
}

/// Result of feeding a delta to a tracker
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdateOutcome {
    /// Delta applied, verified and published
    Published,
    /// Tracker is waiting for a snapshot, delta ignored
    Skipped,
}

/// CRC32 over the best levels of both sides
///
/// Asks are taken best first (ascending), then bids best first (descending).
/// Each level contributes its price digits followed by its volume digits.
pub fn book_checksum(asks: &OrderedSide, bids: &OrderedSide, levels: usize) -> u32 {
    let mut payload = String::with_capacity(levels * 2 * 16);
    for (book_side, side) in [(asks, Side::Ask), (bids, Side::Bid)] {
        for (price, volume) in book_side.iter_best(side).take(levels) {
            payload.push_str(&price.checksum_digits());
            payload.push_str(&volume.checksum_digits());
        }
    }
    crc32fast::hash(payload.as_bytes())
}

fn max_timestamp<'a>(levels: &'a [PriceLevel], include_republish: bool) -> Option<&'a str> {
    levels
        .iter()
        .filter(|level| include_republish || !level.republish)
        .map(|level| level.timestamp.as_str())
        .max()
}

/// Replica of one pair's book
#[derive(Debug)]
pub struct PairTracker<C> {
    pair: String,
    depth: usize,
    initialized: bool,
    asks: OrderedSide,
    bids: OrderedSide,
    last_timestamp: String,
    consumer: C,
}

impl<C: BookConsumer> PairTracker<C> {
    /// Uninitialized tracker for `pair`, trimming to `depth` levels per side
    pub fn new(pair: impl Into<String>, depth: usize, consumer: C) -> Self {
        Self {
            pair: pair.into(),
            depth,
            initialized: false,
            asks: OrderedSide::new(),
            bids: OrderedSide::new(),
            last_timestamp: INITIAL_TIMESTAMP.to_string(),
            consumer,
        }
    }

    /// Replace the replica with a snapshot and publish it
    pub fn apply_snapshot(&mut self, book: &BookMessage) {
        self.asks = book
            .asks
            .iter()
            .map(|level| (level.price, level.volume))
            .collect();
        self.bids = book
            .bids
            .iter()
            .map(|level| (level.price, level.volume))
            .collect();

        let newest = max_timestamp(&book.asks, true).max(max_timestamp(&book.bids, true));
        self.last_timestamp = newest.unwrap_or(INITIAL_TIMESTAMP).to_string();
        self.initialized = true;

        debug!(
            pair = %self.pair,
            asks = self.asks.len(),
            bids = self.bids.len(),
            timestamp = %self.last_timestamp,
            "Snapshot applied"
        );
        self.publish();
    }

    /// Amend the replica with a delta, verify it and publish it
    ///
    /// Returns [`UpdateOutcome::Skipped`] while no snapshot has been applied
    /// since creation or since the last mismatch. A mismatch leaves the
    /// tracker uninitialized.
    pub fn apply_delta(&mut self, book: &BookMessage) -> Result<UpdateOutcome, ChecksumMismatch> {
        if !self.initialized {
            return Ok(UpdateOutcome::Skipped);
        }

        for level in &book.asks {
            self.asks.apply(level.price, level.volume);
        }
        for level in &book.bids {
            self.bids.apply(level.price, level.volume);
        }

        // republished levels carry stale times
        let candidate = max_timestamp(&book.asks, false).max(max_timestamp(&book.bids, false));
        if let Some(candidate) = candidate {
            if candidate >= self.last_timestamp.as_str() {
                self.last_timestamp = candidate.to_string();
            }
        }

        self.asks.trim(self.depth, Side::Ask);
        self.bids.trim(self.depth, Side::Bid);

        let actual = self.checksum().to_string();
        let expected = book.checksum().unwrap_or_default();
        if actual != expected {
            self.initialized = false;
            let mismatch = ChecksumMismatch {
                pair: self.pair.clone(),
                expected: expected.to_string(),
                actual,
            };
            warn!(%mismatch, "Book replica diverged, waiting for snapshot");
            self.consumer.on_checksum_mismatch(&mismatch);
            return Err(mismatch);
        }

        self.publish();
        Ok(UpdateOutcome::Published)
    }

    /// Checksum of the current replica
    pub fn checksum(&self) -> u32 {
        book_checksum(&self.asks, &self.bids, self.depth.min(CHECKSUM_LEVELS))
    }

    fn publish(&mut self) {
        self.consumer
            .on_book_available(&self.last_timestamp, &self.asks, &self.bids);
    }

    /// Pair name
    pub fn pair(&self) -> &str {
        &self.pair
    }

    /// Levels kept per side
    pub fn depth(&self) -> usize {
        self.depth
    }

    /// True between a snapshot and the next mismatch
    pub fn is_initialized(&self) -> bool {
        self.initialized
    }

    /// Newest accepted venue timestamp
    pub fn last_timestamp(&self) -> &str {
        &self.last_timestamp
    }

    pub fn asks(&self) -> &OrderedSide {
        &self.asks
    }

    pub fn bids(&self) -> &OrderedSide {
        &self.bids
    }

    pub fn consumer(&self) -> &C {
        &self.consumer
    }
}
