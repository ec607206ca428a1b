//! Error types for feed decoding and book integrity

use thiserror::Error;

/// Failures raised while turning raw feed text into typed records
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FeedError {
    /// Text had the right family but the wrong shape
    #[error("Malformed message ({reason}): {raw}")]
    MalformedMessage {
        /// What was wrong with it
        reason: String,
        /// The offending text
        raw: String,
    },

    /// Text that matches no known message family
    #[error("Unknown control message: {0}")]
    UnknownControlMessage(String),

    /// A price or volume that is not a finite decimal string
    #[error("Invalid decimal: {0:?}")]
    InvalidDecimal(String),

    /// Transport refused or lost an outbound frame
    #[error("Transport error: {0}")]
    Transport(String),
}

impl FeedError {
    pub(crate) fn malformed(reason: impl Into<String>, raw: &str) -> Self {
        Self::MalformedMessage {
            reason: reason.into(),
            raw: raw.to_string(),
        }
    }
}

/// Computed book checksum disagrees with the one the venue published
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Checksum mismatch for {pair}: expected {expected}, actual {actual}")]
pub struct ChecksumMismatch {
    /// Pair whose replica diverged
    pub pair: String,
    /// Checksum carried by the delta
    pub expected: String,
    /// Checksum of the local replica after applying the delta
    pub actual: String,
}
