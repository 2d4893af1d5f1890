//! Error types for the knsindex pipeline.

use thiserror::Error;

/// Errors that can occur during an ingestion cycle.
///
/// None of these are retried inside the cycle. A failed cycle leaves the
/// persisted checkpoint untouched, so the next run re-fetches the same page.
#[derive(Debug, Error)]
pub enum IndexerError {
    #[error("remote unavailable ({endpoint}): {reason}")]
    RemoteUnavailable { endpoint: String, reason: String },

    #[error("malformed response from {endpoint}: {reason}")]
    RemoteMalformed { endpoint: String, reason: String },

    #[error("store unavailable: {0}")]
    StoreUnavailable(String),

    #[error("invalid configuration: {0}")]
    Config(String),
}

impl IndexerError {
    /// Returns `true` if the error came from one of the two HTTP APIs.
    pub fn is_remote(&self) -> bool {
        matches!(
            self,
            Self::RemoteUnavailable { .. } | Self::RemoteMalformed { .. }
        )
    }

    /// Returns `true` if the backing store failed.
    pub fn is_store(&self) -> bool {
        matches!(self, Self::StoreUnavailable(_))
    }
}
