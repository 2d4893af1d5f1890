//! Shared types for the ingestion pipeline.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// ─── OperationType ────────────────────────────────────────────────────────────

/// Operation type codes the indexer understands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperationType {
    Send,
    SetInfo,
    CreateIdentifier,
}

impl OperationType {
    /// Map a ledger `type` code to a known operation type.
    pub fn from_code(code: u64) -> Option<Self> {
        match code {
            0 => Some(Self::Send),
            2 => Some(Self::SetInfo),
            4 => Some(Self::CreateIdentifier),
            _ => None,
        }
    }

    pub fn code(self) -> u64 {
        match self {
            Self::Send => 0,
            Self::SetInfo => 2,
            Self::CreateIdentifier => 4,
        }
    }
}

impl std::fmt::Display for OperationType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Send => write!(f, "SEND"),
            Self::SetInfo => write!(f, "SET_INFO"),
            Self::CreateIdentifier => write!(f, "CREATE_IDENTIFIER"),
        }
    }
}

// ─── Operation ────────────────────────────────────────────────────────────────

/// A single validated operation within a block.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Operation {
    Send {
        to: String,
        /// Hex-encoded amount (e.g. `"0x1"`).
        amount: String,
        token: String,
        extra: Option<String>,
    },
    SetInfo {
        name: String,
        description: String,
    },
    CreateIdentifier {
        identifier: String,
    },
    /// Any operation type the indexer does not interpret.
    Other { code: u64 },
}

impl Operation {
    /// Returns the identifier if this is a `CreateIdentifier` operation.
    pub fn created_identifier(&self) -> Option<&str> {
        match self {
            Self::CreateIdentifier { identifier } => Some(identifier),
            _ => None,
        }
    }
}

// ─── Block ────────────────────────────────────────────────────────────────────

/// A ledger block, reduced to what the classifier needs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Block {
    pub hash: String,
    pub timestamp: DateTime<Utc>,
    /// The account the block acts on.
    pub account: String,
    /// The account that signed the block.
    pub signer: String,
    pub operations: Vec<Operation>,
}

/// Returns `true` if any operation in `operations` created `account`.
pub fn creates_identifier(operations: &[Operation], account: &str) -> bool {
    operations
        .iter()
        .any(|op| op.created_identifier() == Some(account))
}

// ─── Remote responses ─────────────────────────────────────────────────────────

/// Pagination metadata for one page of the staples index.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PageMetadata {
    pub total_pages: u64,
    /// Resume cursor for the ledger history API.
    #[serde(default)]
    pub start_blocks_hash: Option<String>,
}

/// One history response: blocks grouped per vote staple, in remote order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HistoryBatch {
    pub staples: Vec<Vec<Block>>,
}

impl HistoryBatch {
    /// Total number of blocks across all staples.
    pub fn block_count(&self) -> usize {
        self.staples.iter().map(Vec::len).sum()
    }
}

// ─── Tests ────────────────────────────────────────────────────────────────────
