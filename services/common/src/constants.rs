//! Common constants used across the feed services
//!
//! COMPLIANCE: Single source of truth for all magic numbers

// Venue endpoints
/// Public websocket endpoint of the book feed
pub const DEFAULT_WS_URL: &str = "wss://ws.kraken.com";

// Book constants
/// Default number of price levels retained per side
pub const DEFAULT_BOOK_DEPTH: usize = 10;
/// Number of best levels per side folded into the feed checksum
pub const CHECKSUM_LEVELS: usize = 10;
/// Subscription channel name for order book data
pub const BOOK_CHANNEL: &str = "book";

// Retry constants
/// Interval between retransmissions of an unacknowledged subscription intent
pub const DEFAULT_RETRY_INTERVAL_MS: u64 = 1000;
/// Delay before the transport attempts to re-establish a dropped connection
pub const DEFAULT_RECONNECT_DELAY_MS: u64 = 3000;

// Environment keys
pub const ENV_WS_URL: &str = "BOOK_TRACKER_WS_URL";
pub const ENV_DEPTH: &str = "BOOK_TRACKER_DEPTH";
pub const ENV_RETRY_MS: &str = "BOOK_TRACKER_RETRY_MS";
pub const ENV_RECONNECT_MS: &str = "BOOK_TRACKER_RECONNECT_MS";
