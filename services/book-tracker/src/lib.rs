//! # Book Tracker
//!
//! Keeps a verified local replica of venue order books from a websocket
//! snapshot/delta feed.
//!
//! ## Pipeline
//!
//! 1. A [`Transport`] delivers raw text frames and connection events
//! 2. [`SubscriptionManager`] decodes them, keeps subscriptions alive and
//!    replays them after reconnects
//! 3. [`TrackerDispatcher`] routes books to one [`PairTracker`] per pair
//! 4. Each tracker applies snapshots and deltas to two [`OrderedSide`]s keyed
//!    by [`ExactDecimal`], verifies the venue CRC32 checksum and hands the
//!    book to its [`BookConsumer`]
//!
//! A checksum mismatch resets the tracker and asks the manager for a fresh
//! snapshot.

pub mod decimal;
pub mod dispatcher;
pub mod errors;
pub mod messages;
pub mod side;
pub mod subscription;
pub mod tracker;
pub mod transport;
pub mod websocket;

// Re-exports for convenience
pub use crate::decimal::ExactDecimal;
pub use crate::dispatcher::{GlobalTracker, SnapshotRequestHandler, TrackerDispatcher};
pub use crate::errors::{ChecksumMismatch, FeedError};
pub use crate::messages::{
    BookKind, BookMessage, FeedMessage, PriceLevel, SubscriptionAction, SubscriptionRequest,
    SubscriptionState, SubscriptionStatus, SystemStatus, decode,
};
pub use crate::side::{BestLevels, OrderedSide, Side};
pub use crate::subscription::{RetryKey, SubscriptionIntent, SubscriptionManager};
pub use crate::tracker::{BookConsumer, PairTracker, UpdateOutcome, book_checksum};
pub use crate::transport::{MockTransport, Transport, TransportEvent, TransportEvents};
pub use crate::websocket::WebSocketTransport;
