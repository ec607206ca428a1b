//! Feed message types and the text decoder
//!
//! Book data arrives as JSON arrays whose arity depends on which sides are
//! present:
//!
//! ```text
//! [id, {"as": [...], "bs": [...]}, "book-10", "XBT/USDT"]            snapshot
//! [id, {"a": [...], "c": "123"}, "book-10", "XBT/USDT"]              ask delta
//! [id, {"b": [...], "c": "123"}, "book-10", "XBT/USDT"]              bid delta
//! [id, {"a": [...]}, {"b": [...], "c": "123"}, "book-10", "XBT/USDT"] both
//! ```
//!
//! The decoder classifies by key presence and never by element count alone.

use crate::decimal::ExactDecimal;
use crate::errors::FeedError;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use services_common::BOOK_CHANNEL;

/// Heartbeat literal sent by the venue
pub const HEARTBEAT: &str = r#"{"event":"heartbeat"}"#;
/// Literal the transport emits for a close frame
pub const CLOSE: &str = "close";

const SNAPSHOT_ASKS: &str = "as";
const SNAPSHOT_BIDS: &str = "bs";
const DELTA_ASKS: &str = "a";
const DELTA_BIDS: &str = "b";
const CHECKSUM: &str = "c";
const REPUBLISH_MARKER: &str = "r";

/// One price level as carried on the wire
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PriceLevel {
    /// Level price
    pub price: ExactDecimal,
    /// Resting volume, zero means delete
    pub volume: ExactDecimal,
    /// Venue event time, fixed-width seconds with fractional part
    pub timestamp: String,
    /// Re-sent without a real change
    pub republish: bool,
}

impl PriceLevel {
    /// Parse `[price, volume, timestamp]` or `[price, volume, timestamp, "r"]`
    pub fn from_fields<S: AsRef<str>>(fields: &[S]) -> Result<Self, FeedError> {
        if !(3..=4).contains(&fields.len()) {
            return Err(FeedError::malformed(
                format!("price level has {} fields", fields.len()),
                &fields
                    .iter()
                    .map(|f| f.as_ref())
                    .collect::<Vec<_>>()
                    .join(","),
            ));
        }
        Ok(Self {
            price: fields[0].as_ref().parse()?,
            volume: fields[1].as_ref().parse()?,
            timestamp: fields[2].as_ref().to_string(),
            republish: fields.get(3).is_some_and(|f| f.as_ref() == REPUBLISH_MARKER),
        })
    }
}

/// Whether a book message replaces or amends the replica
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BookKind {
    /// Full replacement, no checksum
    Snapshot,
    /// Incremental change with the checksum of the resulting top levels
    Delta {
        /// CRC32 as an unsigned decimal string
        checksum: String,
    },
}

/// Snapshot or delta for one pair
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BookMessage {
    /// Venue channel id
    pub channel_id: u64,
    /// Channel name, e.g. `book-10`
    pub channel_name: String,
    /// Pair name, e.g. `XBT/USDT`
    pub pair: String,
    /// Ask levels (possibly empty on a delta)
    pub asks: Vec<PriceLevel>,
    /// Bid levels (possibly empty on a delta)
    pub bids: Vec<PriceLevel>,
    /// Snapshot or delta
    pub kind: BookKind,
}

impl BookMessage {
    /// Build a snapshot record
    pub fn snapshot(
        channel_id: u64,
        channel_name: impl Into<String>,
        pair: impl Into<String>,
        asks: Vec<PriceLevel>,
        bids: Vec<PriceLevel>,
    ) -> Self {
        Self {
            channel_id,
            channel_name: channel_name.into(),
            pair: pair.into(),
            asks,
            bids,
            kind: BookKind::Snapshot,
        }
    }

    /// Build a delta record
    pub fn delta(
        channel_id: u64,
        channel_name: impl Into<String>,
        pair: impl Into<String>,
        asks: Vec<PriceLevel>,
        bids: Vec<PriceLevel>,
        checksum: impl Into<String>,
    ) -> Self {
        Self {
            channel_id,
            channel_name: channel_name.into(),
            pair: pair.into(),
            asks,
            bids,
            kind: BookKind::Delta {
                checksum: checksum.into(),
            },
        }
    }

    /// Is this a full snapshot
    #[inline]
    pub fn is_snapshot(&self) -> bool {
        matches!(self.kind, BookKind::Snapshot)
    }

    /// Published checksum, deltas only
    #[inline]
    pub fn checksum(&self) -> Option<&str> {
        match &self.kind {
            BookKind::Snapshot => None,
            BookKind::Delta { checksum } => Some(checksum),
        }
    }
}

/// Connection-level status pushed once after connect
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct SystemStatus {
    /// Connection id assigned by the venue
    #[serde(rename = "connectionID")]
    pub connection_id: u64,
    /// `online`, `maintenance`, ...
    pub status: String,
    /// API version
    pub version: String,
}

/// Subscription descriptor echoed back in status messages
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct SubscriptionInfo {
    /// Channel kind, `book` for this feed
    pub name: String,
    /// Requested depth
    pub depth: Option<usize>,
}

/// Reply to a subscribe or unsubscribe request
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubscriptionStatus {
    /// Channel id, absent on errors
    #[serde(rename = "channelID")]
    pub channel_id: Option<u64>,
    /// Channel name, absent on errors
    pub channel_name: Option<String>,
    /// Pair the reply refers to
    pub pair: Option<String>,
    /// `subscribed`, `unsubscribed` or `error`
    pub status: String,
    /// Echo of the request
    pub subscription: Option<SubscriptionInfo>,
    /// Populated when `status` is `error`
    pub error_message: Option<String>,
}

/// Interpreted value of [`SubscriptionStatus::status`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubscriptionState {
    Subscribed,
    Unsubscribed,
    Error,
    Other,
}

impl SubscriptionStatus {
    /// Status as an enum
    pub fn state(&self) -> SubscriptionState {
        match self.status.as_str() {
            "subscribed" => SubscriptionState::Subscribed,
            "unsubscribed" => SubscriptionState::Unsubscribed,
            "error" => SubscriptionState::Error,
            _ => SubscriptionState::Other,
        }
    }
}

/// Every message family the feed can deliver
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FeedMessage {
    /// Keep-alive
    Heartbeat,
    /// Socket close notice from the transport
    Close,
    /// Connection status
    SystemStatus(SystemStatus),
    /// Subscription acknowledgement or error
    SubscriptionStatus(SubscriptionStatus),
    /// Snapshot or delta
    Book(BookMessage),
}

/// Classify and parse one raw text message
pub fn decode(raw: &str) -> Result<FeedMessage, FeedError> {
    let text = raw.trim();
    if text == HEARTBEAT {
        return Ok(FeedMessage::Heartbeat);
    }
    if text == CLOSE {
        return Ok(FeedMessage::Close);
    }
    if text.starts_with('[') {
        return decode_book(text).map(FeedMessage::Book);
    }
    decode_control(text)
}

fn decode_control(raw: &str) -> Result<FeedMessage, FeedError> {
    let value: Value = serde_json::from_str(raw)
        .map_err(|_| FeedError::UnknownControlMessage(raw.to_string()))?;
    let object = value
        .as_object()
        .ok_or_else(|| FeedError::UnknownControlMessage(raw.to_string()))?;
    let event = object
        .get("event")
        .and_then(Value::as_str)
        .ok_or_else(|| FeedError::malformed("missing event discriminant", raw))?;

    match event {
        "heartbeat" => Ok(FeedMessage::Heartbeat),
        "systemStatus" => SystemStatus::deserialize(&value)
            .map(FeedMessage::SystemStatus)
            .map_err(|e| FeedError::malformed(format!("systemStatus: {e}"), raw)),
        "subscriptionStatus" => SubscriptionStatus::deserialize(&value)
            .map(FeedMessage::SubscriptionStatus)
            .map_err(|e| FeedError::malformed(format!("subscriptionStatus: {e}"), raw)),
        _ => Err(FeedError::UnknownControlMessage(raw.to_string())),
    }
}

fn decode_book(raw: &str) -> Result<BookMessage, FeedError> {
    let value: Value = serde_json::from_str(raw)
        .map_err(|e| FeedError::malformed(format!("invalid json: {e}"), raw))?;
    let items = value
        .as_array()
        .ok_or_else(|| FeedError::malformed("expected array", raw))?;

    let channel_id = items
        .first()
        .and_then(Value::as_u64)
        .ok_or_else(|| FeedError::malformed("missing channel id", raw))?;
    let first = items
        .get(1)
        .and_then(Value::as_object)
        .ok_or_else(|| FeedError::malformed("missing book payload", raw))?;

    let has_snapshot = first.contains_key(SNAPSHOT_ASKS) || first.contains_key(SNAPSHOT_BIDS);
    let has_delta = first.contains_key(DELTA_ASKS) || first.contains_key(DELTA_BIDS);

    // `tail` is the index of the channel name; the pair follows it
    let (asks, bids, kind, tail) = match (has_snapshot, has_delta) {
        (true, true) => {
            return Err(FeedError::malformed("both snapshot and delta keys", raw));
        }
        (false, false) => return Err(FeedError::malformed("no book keys", raw)),
        (true, false) => {
            let asks = parse_levels(first.get(SNAPSHOT_ASKS), raw)?;
            let bids = parse_levels(first.get(SNAPSHOT_BIDS), raw)?;
            (asks, bids, BookKind::Snapshot, 2)
        }
        (false, true) => {
            let asks = parse_levels(first.get(DELTA_ASKS), raw)?;
            match items.get(2).and_then(Value::as_object) {
                Some(second) if first.contains_key(DELTA_ASKS) => {
                    if !second.contains_key(DELTA_BIDS) {
                        return Err(FeedError::malformed("second payload without bids", raw));
                    }
                    if first.contains_key(DELTA_BIDS) {
                        return Err(FeedError::malformed("bids in both payloads", raw));
                    }
                    if second.contains_key(DELTA_ASKS) {
                        return Err(FeedError::malformed("asks in both payloads", raw));
                    }
                    let bids = parse_levels(second.get(DELTA_BIDS), raw)?;
                    let checksum = parse_checksum(second, raw)?;
                    (asks, bids, BookKind::Delta { checksum }, 3)
                }
                _ => {
                    let bids = parse_levels(first.get(DELTA_BIDS), raw)?;
                    let checksum = parse_checksum(first, raw)?;
                    (asks, bids, BookKind::Delta { checksum }, 2)
                }
            }
        }
    };

    if items.len() != tail + 2 {
        return Err(FeedError::malformed(
            format!("unexpected element count {}", items.len()),
            raw,
        ));
    }
    let channel_name = items[tail]
        .as_str()
        .ok_or_else(|| FeedError::malformed("channel name is not a string", raw))?;
    let pair = items[tail + 1]
        .as_str()
        .ok_or_else(|| FeedError::malformed("pair is not a string", raw))?;

    Ok(BookMessage {
        channel_id,
        channel_name: channel_name.to_string(),
        pair: pair.to_string(),
        asks,
        bids,
        kind,
    })
}

fn parse_checksum(payload: &Map<String, Value>, raw: &str) -> Result<String, FeedError> {
    payload
        .get(CHECKSUM)
        .and_then(Value::as_str)
        .map(str::to_string)
        .ok_or_else(|| FeedError::malformed("delta without checksum", raw))
}

fn parse_levels(levels: Option<&Value>, raw: &str) -> Result<Vec<PriceLevel>, FeedError> {
    let Some(levels) = levels else {
        return Ok(Vec::new());
    };
    let entries = levels
        .as_array()
        .ok_or_else(|| FeedError::malformed("levels are not an array", raw))?;

    entries
        .iter()
        .map(|entry| {
            let fields = entry
                .as_array()
                .ok_or_else(|| FeedError::malformed("level is not an array", raw))?
                .iter()
                .map(|field| {
                    field
                        .as_str()
                        .ok_or_else(|| FeedError::malformed("level field is not a string", raw))
                })
                .collect::<Result<Vec<&str>, FeedError>>()?;
            PriceLevel::from_fields(fields.as_slice()).map_err(|e| match e {
                FeedError::MalformedMessage { reason, .. } => FeedError::malformed(reason, raw),
                other => other,
            })
        })
        .collect()
}

/// Outbound subscription action, lower-cased on the wire
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SubscriptionAction {
    Subscribe,
    Unsubscribe,
}

impl SubscriptionAction {
    /// The action that undoes this one
    pub fn opposite(self) -> Self {
        match self {
            Self::Subscribe => Self::Unsubscribe,
            Self::Unsubscribe => Self::Subscribe,
        }
    }
}

/// Channel descriptor of an outbound request
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SubscriptionChannel {
    /// Always `book`
    pub name: &'static str,
    /// Levels per side
    pub depth: usize,
}

/// Outbound subscribe/unsubscribe request
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SubscriptionRequest {
    /// Subscribe or unsubscribe
    pub event: SubscriptionAction,
    /// Single pair, as a list on the wire
    pub pair: Vec<String>,
    /// Book channel and depth
    pub subscription: SubscriptionChannel,
}

impl SubscriptionRequest {
    /// Book request for one pair
    pub fn book(event: SubscriptionAction, pair: &str, depth: usize) -> Self {
        Self {
            event,
            pair: vec![pair.to_string()],
            subscription: SubscriptionChannel {
                name: BOOK_CHANNEL,
                depth,
            },
        }
    }

    /// JSON text sent to the venue
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}
