//! Checkpoint — the single ingestion-progress record.
//!
//! The checkpoint stores the staples page to fetch next plus the timestamp and
//! hash of the last block that was classified. It only ever moves forward, and
//! only together with the registry mutations of the same cycle.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::IndexerError;
use crate::registry::{Mutation, RegistryEvent};
use crate::types::Block;

/// The persisted ingestion cursor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Checkpoint {
    /// Staples page to fetch (1-based).
    pub page: u64,
    /// Timestamp of the last processed block.
    pub last_block_timestamp: Option<DateTime<Utc>>,
    /// Hash of the last processed block.
    pub last_block_hash: Option<String>,
}

impl Default for Checkpoint {
    fn default() -> Self {
        Self {
            page: 1,
            last_block_timestamp: None,
            last_block_hash: None,
        }
    }
}

impl Checkpoint {
    /// Returns `true` if `block` is already accounted for by this checkpoint.
    ///
    /// Only applies once both a timestamp and a hash have been recorded.
    pub fn has_processed(&self, block: &Block) -> bool {
        match (&self.last_block_timestamp, &self.last_block_hash) {
            (Some(timestamp), Some(hash)) => block.timestamp < *timestamp || block.hash == *hash,
            _ => false,
        }
    }

    /// Record `block` as the last processed block.
    pub fn advance(&mut self, block: &Block) {
        self.last_block_timestamp = Some(block.timestamp);
        self.last_block_hash = Some(block.hash.clone());
    }

    /// The page to fetch on the next cycle.
    ///
    /// The trailing page is held so late blocks on it are picked up.
    pub fn next_page(&self, total_pages: u64) -> u64 {
        if self.page != total_pages {
            self.page + 1
        } else {
            self.page
        }
    }
}

/// Trait for loading the checkpoint and committing a cycle.
///
/// Implementations include `InMemoryStorage`, `SqliteStorage` and
/// `PostgresStorage` in `knsindex-storage`.
#[async_trait]
pub trait CheckpointStore: Send + Sync {
    /// Load the current checkpoint.
    async fn load(&self) -> Result<Checkpoint, IndexerError>;

    /// Apply `events` in order and persist `checkpoint`, all in one transaction.
    ///
    /// Returns the mutations that actually changed the registry. On error
    /// nothing is applied.
    async fn commit(
        &self,
        checkpoint: &Checkpoint,
        events: &[RegistryEvent],
    ) -> Result<Vec<Mutation>, IndexerError>;
}

#[async_trait]
impl<T: CheckpointStore + ?Sized> CheckpointStore for Arc<T> {
    async fn load(&self) -> Result<Checkpoint, IndexerError> {
        (**self).load().await
    }

    async fn commit(
        &self,
        checkpoint: &Checkpoint,
        events: &[RegistryEvent],
    ) -> Result<Vec<Mutation>, IndexerError> {
        (**self).commit(checkpoint, events).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn block(hash: &str, secs: i64) -> Block {
        Block {
            hash: hash.into(),
            timestamp: Utc.timestamp_opt(secs, 0).unwrap(),
            account: "keeta_acct".into(),
            signer: "keeta_signer".into(),
            operations: vec![],
        }
    }

    #[test]
    fn fresh_checkpoint_skips_nothing() {
        let cp = Checkpoint::default();
        assert_eq!(cp.page, 1);
        assert!(!cp.has_processed(&block("H1", 0)));
    }

    #[test]
    fn skip_older_or_same_hash() {
        let mut cp = Checkpoint::default();
        cp.advance(&block("H5", 500));

        assert!(cp.has_processed(&block("H4", 400)));
        assert!(cp.has_processed(&block("H5", 500)));
        // Same timestamp, different hash: not yet seen.
        assert!(!cp.has_processed(&block("H5b", 500)));
        assert!(!cp.has_processed(&block("H6", 600)));
    }

    #[test]
    fn page_advances_until_last() {
        let cp = Checkpoint { page: 3, ..Default::default() };
        assert_eq!(cp.next_page(5), 4);

        let cp = Checkpoint { page: 5, ..Default::default() };
        assert_eq!(cp.next_page(5), 5);
    }
}
