//! Feed configuration

use crate::constants::{
    DEFAULT_BOOK_DEPTH, DEFAULT_RECONNECT_DELAY_MS, DEFAULT_RETRY_INTERVAL_MS, DEFAULT_WS_URL,
    ENV_DEPTH, ENV_RECONNECT_MS, ENV_RETRY_MS, ENV_WS_URL,
};
use crate::errors::ServiceError;
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use std::time::Duration;
use tracing::debug;

/// Connection and book settings for the feed
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeedConfig {
    /// Websocket endpoint
    pub ws_url: String,
    /// Price levels retained per side, also sent as the subscription depth
    pub depth: usize,
    /// Interval between retransmissions of an unacknowledged intent
    pub retry_interval_ms: u64,
    /// Delay before reconnecting a dropped socket
    pub reconnect_delay_ms: u64,
}

impl Default for FeedConfig {
    fn default() -> Self {
        Self {
            ws_url: DEFAULT_WS_URL.to_string(),
            depth: DEFAULT_BOOK_DEPTH,
            retry_interval_ms: DEFAULT_RETRY_INTERVAL_MS,
            reconnect_delay_ms: DEFAULT_RECONNECT_DELAY_MS,
        }
    }
}

impl FeedConfig {
    /// Load defaults overridden by `BOOK_TRACKER_*` environment variables
    pub fn from_env() -> Result<Self, ServiceError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load defaults overridden by whatever `lookup` returns for each key
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ServiceError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(url) = lookup(ENV_WS_URL) {
            config.ws_url = url;
        }
        if let Some(raw) = lookup(ENV_DEPTH) {
            config.depth = parse_value(ENV_DEPTH, &raw)?;
        }
        if let Some(raw) = lookup(ENV_RETRY_MS) {
            config.retry_interval_ms = parse_value(ENV_RETRY_MS, &raw)?;
        }
        if let Some(raw) = lookup(ENV_RECONNECT_MS) {
            config.reconnect_delay_ms = parse_value(ENV_RECONNECT_MS, &raw)?;
        }

        config.validate()?;
        debug!(?config, "Loaded feed configuration");
        Ok(config)
    }

    /// Reject settings the tracker cannot operate with
    pub fn validate(&self) -> Result<(), ServiceError> {
        if self.ws_url.is_empty() {
            return Err(ServiceError::InvalidConfig("ws_url must not be empty".to_string()));
        }
        if self.depth == 0 {
            return Err(ServiceError::InvalidConfig("depth must be at least 1".to_string()));
        }
        if self.retry_interval_ms == 0 {
            return Err(ServiceError::InvalidConfig(
                "retry_interval_ms must be positive".to_string(),
            ));
        }
        Ok(())
    }

    /// Retry interval as a duration
    pub fn retry_interval(&self) -> Duration {
        Duration::from_millis(self.retry_interval_ms)
    }

    /// Reconnect delay as a duration
    pub fn reconnect_delay(&self) -> Duration {
        Duration::from_millis(self.reconnect_delay_ms)
    }
}

fn parse_value<T: FromStr>(key: &str, raw: &str) -> Result<T, ServiceError> {
    raw.trim()
        .parse()
        .map_err(|_| ServiceError::InvalidConfig(format!("{key}: cannot parse {raw:?}")))
}
