//! Block normalizer — flattens a history batch into timestamp order.

use crate::types::{Block, HistoryBatch};

/// Flatten all staples into one sequence sorted ascending by timestamp.
///
/// The history API does not guarantee a global order across staples. The sort
/// is stable, so blocks sharing a timestamp keep their remote order.
pub fn order_blocks(batch: HistoryBatch) -> Vec<Block> {
    let mut blocks: Vec<Block> = batch.staples.into_iter().flatten().collect();
    blocks.sort_by_key(|b| b.timestamp);
    blocks
}
