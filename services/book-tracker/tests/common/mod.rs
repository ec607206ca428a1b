//! Shared fixtures: a 10-level XBT/USDT book and deltas with venue checksums

#![allow(dead_code)]

use book_tracker::{
    BookConsumer, BookMessage, ChecksumMismatch, FeedMessage, OrderedSide, TrackerDispatcher,
    decode,
};

pub const PAIR: &str = "XBT/USDT";
pub const SNAPSHOT_TIMESTAMP: &str = "1615680100.357494";
pub const SNAPSHOT_CHECKSUM: u32 = 3_011_578_195;

const ASKS: &str = r#"[["61074.90000","0.03300000","1615680100.357494"],["61076.90000","0.15000000","1615680100.316398"],["61083.90000","0.08189270","1615680100.270453"],["61091.90000","0.03226286","1615680094.993643"],["61092.00000","0.15000000","1615680093.894549"],["61093.20000","0.12283571","1615680097.383483"],["61097.90000","0.06983296","1615680100.335221"],["61098.00000","0.20000000","1615680095.828050"],["61100.40000","0.08446000","1615680089.209693"],["61102.50000","0.12281758","1615680091.383754"]]"#;
const BIDS: &str = r#"[["61064.70000","0.08189044","1615680096.384581"],["61059.70000","0.16360772","1615680058.895440"],["61047.20000","0.12282923","1615680094.966206"],["61033.00000","0.10000000","1615680098.967141"],["61032.80000","0.10000000","1615680099.376576"],["61028.70000","0.30000000","1615680099.363348"],["61028.60000","0.16371139","1615680084.251615"],["61025.80000","0.03411080","1615680091.509969"],["61025.30000","0.16371961","1615680085.974857"],["61023.90000","0.00474282","1615680072.457932"]]"#;

const ASK_UPDATE: &str = r#"[["61100.40000","2.0","1700000001.000000"],["61102.50000","1.0","1700000000.000000"]]"#;
const ASK_REPUBLISH: &str = r#"[["61100.40000","2.0","1700000001.000000","r"],["61102.50000","1.0","1700000000.000000"]]"#;
const ASK_DELETE: &str = r#"[["61102.50000","0.00000000","1700000000.000000"]]"#;
const NEW_BEST: &str = r#"[["61066.70000","2.0","1700000001.000000"],["61065.70000","1.0","1700000000.000000"]]"#;
const BID_UPDATE: &str = r#"[["61033.00000","2.0","1700000001.000000"],["61028.70000","1.0","1700000000.000000"]]"#;

pub fn snapshot_text() -> String {
    snapshot_text_for(PAIR)
}

pub fn snapshot_text_for(pair: &str) -> String {
    format!(r#"[2304,{{"as":{ASKS},"bs":{BIDS}}},"book-10","{pair}"]"#)
}

fn ask_delta(levels: &str, checksum: &str) -> String {
    format!(r#"[2304,{{"a":{levels},"c":"{checksum}"}},"book-10","{PAIR}"]"#)
}

fn bid_delta(levels: &str, checksum: &str) -> String {
    format!(r#"[2304,{{"b":{levels},"c":"{checksum}"}},"book-10","{PAIR}"]"#)
}

/// Replaces the volume of two existing asks
pub fn ask_update_text(checksum: &str) -> String {
    ask_delta(ASK_UPDATE, checksum)
}

pub fn ask_update_correct() -> String {
    ask_update_text("3904097099")
}

pub fn ask_republish_text() -> String {
    ask_delta(ASK_REPUBLISH, "3904097099")
}

pub fn ask_delete_text() -> String {
    ask_delta(ASK_DELETE, "400301931")
}

/// Two new best asks, pushing the two worst out of a depth-10 book
pub fn ask_adding_text() -> String {
    ask_delta(NEW_BEST, "2354439088")
}

pub fn bid_update_text(checksum: &str) -> String {
    bid_delta(BID_UPDATE, checksum)
}

pub fn bid_update_correct() -> String {
    bid_update_text("435180619")
}

/// Two new best bids, pushing the two worst out of a depth-10 book
pub fn bid_adding_text() -> String {
    bid_delta(NEW_BEST, "3197673906")
}

/// Both sides in one message, checksum in the second payload
pub fn ask_bid_update_text() -> String {
    format!(
        r#"[2304,{{"a":{ASK_UPDATE}}},{{"b":{BID_UPDATE},"c":"601930136"}},"book-10","{PAIR}"]"#
    )
}

pub fn subscription_status(status: &str, pair: &str) -> String {
    format!(
        r#"{{"channelID":2304,"channelName":"book-10","event":"subscriptionStatus","pair":"{pair}","status":"{status}","subscription":{{"depth":10,"name":"book"}}}}"#
    )
}

pub fn subscribe_request(pair: &str) -> String {
    format!(r#"{{"event":"subscribe","pair":["{pair}"],"subscription":{{"name":"book","depth":10}}}}"#)
}

pub fn unsubscribe_request(pair: &str) -> String {
    format!(r#"{{"event":"unsubscribe","pair":["{pair}"],"subscription":{{"name":"book","depth":10}}}}"#)
}

pub fn book(raw: &str) -> BookMessage {
    match decode(raw) {
        Ok(FeedMessage::Book(book)) => book,
        other => panic!("expected a book, got {other:?}"),
    }
}

/// One published book, sides flattened to text in ascending price order
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Published {
    pub timestamp: String,
    pub asks: Vec<(String, String)>,
    pub bids: Vec<(String, String)>,
}

impl Published {
    pub fn ask(&self, price: &str) -> Option<&str> {
        Self::find(&self.asks, price)
    }

    pub fn bid(&self, price: &str) -> Option<&str> {
        Self::find(&self.bids, price)
    }

    fn find<'a>(side: &'a [(String, String)], price: &str) -> Option<&'a str> {
        side.iter()
            .find(|(p, _)| p == price)
            .map(|(_, v)| v.as_str())
    }
}

/// Consumer recording everything it is given
#[derive(Debug, Default)]
pub struct Recorder {
    pub pair: String,
    pub books: Vec<Published>,
    pub mismatches: Vec<ChecksumMismatch>,
}

impl BookConsumer for Recorder {
    fn on_book_available(&mut self, timestamp: &str, asks: &OrderedSide, bids: &OrderedSide) {
        let flatten = |side: &OrderedSide| {
            side.iter()
                .map(|(p, v)| (p.to_string(), v.to_string()))
                .collect::<Vec<_>>()
        };
        self.books.push(Published {
            timestamp: timestamp.to_string(),
            asks: flatten(asks),
            bids: flatten(bids),
        });
    }

    fn on_checksum_mismatch(&mut self, mismatch: &ChecksumMismatch) {
        self.mismatches.push(mismatch.clone());
    }
}

pub type RecordingDispatcher = TrackerDispatcher<Recorder, fn(&str, usize) -> Recorder>;

fn recorder_for(pair: &str, _depth: usize) -> Recorder {
    Recorder {
        pair: pair.to_string(),
        ..Recorder::default()
    }
}

pub fn recording_dispatcher(depth: usize) -> RecordingDispatcher {
    TrackerDispatcher::new(depth, recorder_for as fn(&str, usize) -> Recorder)
}
