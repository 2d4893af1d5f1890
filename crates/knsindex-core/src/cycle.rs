//! Cycle planning — everything between fetching a batch and committing it.
//!
//! [`plan_cycle`] is pure: it orders the batch, drops blocks the checkpoint
//! already covers, classifies the rest and computes the next checkpoint. The
//! caller hands the plan to a `CheckpointStore` for the atomic commit.

use tracing::debug;

use crate::checkpoint::Checkpoint;
use crate::classify::Classifier;
use crate::normalize::order_blocks;
use crate::registry::RegistryEvent;
use crate::types::{HistoryBatch, Operation, PageMetadata};

/// The outcome of planning one cycle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CyclePlan {
    /// Checkpoint to persist with the events.
    pub checkpoint: Checkpoint,
    /// Classified events, in block then operation order.
    pub events: Vec<RegistryEvent>,
    pub processed: usize,
    pub skipped: usize,
}

/// Plan a cycle for `batch`, fetched for `checkpoint.page`.
///
/// The lookback for inscriptions starts empty: only blocks processed in this
/// cycle can vouch for the next block's account.
pub fn plan_cycle(
    checkpoint: &Checkpoint,
    metadata: &PageMetadata,
    batch: HistoryBatch,
    classifier: &Classifier,
) -> CyclePlan {
    let mut next = checkpoint.clone();
    let mut previous: Vec<Operation> = Vec::new();
    let mut events = Vec::new();
    let (mut processed, mut skipped) = (0, 0);

    for block in order_blocks(batch) {
        if next.has_processed(&block) {
            debug!(hash = %block.hash, "skipping block: older or equal to last processed");
            skipped += 1;
            continue;
        }

        debug!(hash = %block.hash, timestamp = %block.timestamp, "processing block");
        events.extend(classifier.classify(&block, &previous));
        next.advance(&block);
        previous = block.operations;
        processed += 1;
    }

    next.page = checkpoint.next_page(metadata.total_pages);

    CyclePlan {
        checkpoint: next,
        events,
        processed,
        skipped,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classify::ClassifierConfig;
    use crate::types::Block;
    use chrono::{TimeZone, Utc};

    fn classifier() -> Classifier {
        Classifier::new(ClassifierConfig::default()).unwrap()
    }

    fn meta(total_pages: u64) -> PageMetadata {
        PageMetadata {
            total_pages,
            start_blocks_hash: None,
        }
    }

    fn block(hash: &str, secs: i64, account: &str, signer: &str, operations: Vec<Operation>) -> Block {
        Block {
            hash: hash.into(),
            timestamp: Utc.timestamp_opt(secs, 0).unwrap(),
            account: account.into(),
            signer: signer.into(),
            operations,
        }
    }

    fn create(identifier: &str) -> Operation {
        Operation::CreateIdentifier {
            identifier: identifier.into(),
        }
    }

    fn set_info(description: &str) -> Operation {
        Operation::SetInfo {
            name: "KNS".into(),
            description: description.into(),
        }
    }

    #[test]
    fn inscribe_in_consecutive_blocks() {
        let b1 = block("H1", 100, "acct1", "acct1", vec![create("acct1")]);
        let b2 = block("H2", 200, "acct1", "acctX", vec![set_info("alice")]);
        // Delivered out of order across staples.
        let batch = HistoryBatch {
            staples: vec![vec![b2], vec![b1]],
        };

        let plan = plan_cycle(&Checkpoint::default(), &meta(3), batch, &classifier());
        assert_eq!(plan.processed, 2);
        assert_eq!(plan.events.len(), 1);
        match &plan.events[0] {
            RegistryEvent::Inscribe { name, address, owner, .. } => {
                assert_eq!((name.as_str(), address.as_str(), owner.as_str()), ("alice", "acct1", "acctX"));
            }
            other => panic!("unexpected event {other:?}"),
        }
        assert_eq!(plan.checkpoint.page, 2);
        assert_eq!(plan.checkpoint.last_block_hash.as_deref(), Some("H2"));
        assert_eq!(plan.checkpoint.last_block_timestamp, Some(Utc.timestamp_opt(200, 0).unwrap()));
    }

    #[test]
    fn lookback_is_one_block() {
        let b1 = block("H1", 100, "acct1", "acct1", vec![create("acct1")]);
        let b2 = block("H2", 150, "other", "other", vec![Operation::Other { code: 1 }]);
        let b3 = block("H3", 200, "acct1", "acctX", vec![set_info("alice")]);
        let batch = HistoryBatch {
            staples: vec![vec![b1, b2, b3]],
        };

        let plan = plan_cycle(&Checkpoint::default(), &meta(1), batch, &classifier());
        assert!(plan.events.is_empty());
        assert_eq!(plan.processed, 3);
    }

    #[test]
    fn skipped_block_does_not_become_previous() {
        let checkpoint = Checkpoint {
            page: 1,
            last_block_timestamp: Some(Utc.timestamp_opt(150, 0).unwrap()),
            last_block_hash: Some("H0".into()),
        };
        // H1 predates the checkpoint, so its CreateIdentifier cannot vouch for H2.
        let b1 = block("H1", 100, "acct1", "acct1", vec![create("acct1")]);
        let b2 = block("H2", 200, "acct1", "acctX", vec![set_info("alice")]);
        let batch = HistoryBatch {
            staples: vec![vec![b1, b2]],
        };

        let plan = plan_cycle(&checkpoint, &meta(1), batch, &classifier());
        assert_eq!(plan.skipped, 1);
        assert_eq!(plan.processed, 1);
        assert!(plan.events.is_empty());
    }

    #[test]
    fn refetched_last_block_yields_nothing() {
        let checkpoint = Checkpoint {
            page: 5,
            last_block_timestamp: Some(Utc.timestamp_opt(500, 0).unwrap()),
            last_block_hash: Some("H5".into()),
        };
        let b = block("H5", 500, "acctX", "acctX", vec![Operation::Send {
            to: "acctY".into(),
            amount: "0x1".into(),
            token: "acct1".into(),
            extra: None,
        }]);
        let batch = HistoryBatch {
            staples: vec![vec![b]],
        };

        let plan = plan_cycle(&checkpoint, &meta(5), batch, &classifier());
        assert!(plan.events.is_empty());
        assert_eq!(plan.checkpoint, checkpoint);
    }

    #[test]
    fn replay_is_idempotent() {
        let batch = HistoryBatch {
            staples: vec![vec![
                block("H1", 100, "acct1", "acct1", vec![create("acct1")]),
                block("H2", 200, "acct1", "acctX", vec![set_info("alice")]),
            ]],
        };
        let start = Checkpoint::default();
        let first = plan_cycle(&start, &meta(4), batch.clone(), &classifier());
        let second = plan_cycle(&start, &meta(4), batch, &classifier());
        assert_eq!(first, second);
    }

    #[test]
    fn page_held_on_last_page() {
        let cp = Checkpoint { page: 5, ..Default::default() };
        let plan = plan_cycle(&cp, &meta(5), HistoryBatch::default(), &classifier());
        assert_eq!(plan.checkpoint.page, 5);

        let cp = Checkpoint { page: 3, ..Default::default() };
        let plan = plan_cycle(&cp, &meta(5), HistoryBatch::default(), &classifier());
        assert_eq!(plan.checkpoint.page, 4);
    }
}
