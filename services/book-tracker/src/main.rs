//! Book Tracker CLI
//!
//! Subscribes to one or more pairs, keeps a verified replica of each book and
//! logs the top of book with feed latency on every update.

use anyhow::Result;
use book_tracker::{
    BookConsumer, ChecksumMismatch, OrderedSide, Side, SubscriptionManager, TrackerDispatcher,
    WebSocketTransport,
};
use chrono::{DateTime, Utc};
use clap::Parser;
use services_common::FeedConfig;
use std::time::Duration;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser, Debug)]
#[command(name = "book-tracker")]
#[command(about = "Track venue order books from the websocket feed", long_about = None)]
struct Cli {
    /// Pair to track, repeat for more
    #[arg(long = "pair", default_value = "XBT/USDT")]
    pairs: Vec<String>,

    /// Levels per side, overrides BOOK_TRACKER_DEPTH
    #[arg(long)]
    depth: Option<usize>,

    /// Feed endpoint, overrides BOOK_TRACKER_WS_URL
    #[arg(long)]
    ws_url: Option<String>,

    /// Seconds to run, 0 runs until Ctrl-C
    #[arg(long, default_value_t = 0)]
    duration_secs: u64,
}

/// Logs every published book of one pair
struct PrintingConsumer {
    pair: String,
}

impl BookConsumer for PrintingConsumer {
    fn on_book_available(&mut self, timestamp: &str, asks: &OrderedSide, bids: &OrderedSide) {
        let latency = latency_secs(timestamp, Utc::now());
        let best_ask = asks.best(Side::Ask);
        let best_bid = bids.best(Side::Bid);
        info!(
            pair = %self.pair,
            latency = latency.map(|l| format!("{l:.6}")).unwrap_or_else(|| "n/a".to_string()),
            best_ask = ?best_ask.map(|(p, v)| (p.to_f64(), v.to_f64())),
            best_bid = ?best_bid.map(|(p, v)| (p.to_f64(), v.to_f64())),
            "Book"
        );
    }

    fn on_checksum_mismatch(&mut self, mismatch: &ChecksumMismatch) {
        warn!(
            pair = %mismatch.pair,
            expected = %mismatch.expected,
            actual = %mismatch.actual,
            "Checksum mismatch"
        );
    }
}

/// Wall clock minus a `seconds.micros` venue timestamp
fn latency_secs(timestamp: &str, now: DateTime<Utc>) -> Option<f64> {
    let sent: f64 = timestamp.parse().ok()?;
    let now = now.timestamp_micros() as f64 / 1_000_000.0;
    Some(now - sent)
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "book_tracker=info,services_common=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cli = Cli::parse();

    let mut config = FeedConfig::from_env()?;
    if let Some(depth) = cli.depth {
        config.depth = depth;
    }
    if let Some(ws_url) = cli.ws_url {
        config.ws_url = ws_url;
    }
    config.validate()?;

    info!(url = %config.ws_url, depth = config.depth, pairs = ?cli.pairs, "Starting book tracker");

    let (transport, events) = WebSocketTransport::new(&config);
    let dispatcher = TrackerDispatcher::new(config.depth, |pair: &str, _depth| PrintingConsumer {
        pair: pair.to_string(),
    });
    let manager = SubscriptionManager::new(transport, events, dispatcher, &config);

    for pair in &cli.pairs {
        manager.subscribe(pair);
    }
    manager.run()?;

    if cli.duration_secs == 0 {
        tokio::signal::ctrl_c().await?;
    } else {
        tokio::select! {
            result = tokio::signal::ctrl_c() => result?,
            () = tokio::time::sleep(Duration::from_secs(cli.duration_secs)) => {}
        }
    }

    let stopped = manager.stop().await;
    info!(stopped, "Book tracker stopped");
    Ok(())
}
