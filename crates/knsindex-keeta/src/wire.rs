//! JSON shapes returned by the ledger history API.
//!
//! Operations arrive as loosely-typed objects keyed by a numeric `type`. They
//! are validated here, at the parsing boundary, into [`Operation`] variants so
//! a missing field surfaces as one decode error instead of a failed lookup
//! deep inside the classifier.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;

use knsindex_core::types::{Block, HistoryBatch, Operation, OperationType};

/// Validation failures for a decoded history response.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum WireError {
    #[error("block {block}: {op_type} operation is missing string field `{field}`")]
    MissingField {
        block: String,
        op_type: OperationType,
        field: &'static str,
    },
}

/// `GET /api/node/ledger/history` response body.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawHistory {
    pub history: Vec<RawHistoryEntry>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawHistoryEntry {
    #[serde(rename = "voteStaple")]
    pub vote_staple: RawVoteStaple,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawVoteStaple {
    pub blocks: Vec<RawBlock>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawBlock {
    #[serde(rename = "$hash")]
    pub hash: String,
    pub date: DateTime<Utc>,
    pub account: String,
    pub signer: String,
    pub operations: Vec<RawOperation>,
}

/// An operation before validation: its type code plus every other field.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawOperation {
    #[serde(rename = "type")]
    pub kind: u64,
    #[serde(flatten)]
    pub fields: Map<String, Value>,
}

impl RawHistory {
    /// Validate every block, keeping the staple grouping.
    pub fn into_batch(self) -> Result<HistoryBatch, WireError> {
        let staples = self
            .history
            .into_iter()
            .map(|entry| {
                entry
                    .vote_staple
                    .blocks
                    .into_iter()
                    .map(RawBlock::into_block)
                    .collect::<Result<Vec<_>, _>>()
            })
            .collect::<Result<Vec<_>, _>>()?;
        Ok(HistoryBatch { staples })
    }
}

impl RawBlock {
    pub fn into_block(self) -> Result<Block, WireError> {
        let operations = self
            .operations
            .into_iter()
            .map(|op| op.into_operation(&self.hash))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Block {
            hash: self.hash,
            timestamp: self.date,
            account: self.account,
            signer: self.signer,
            operations,
        })
    }
}

impl RawOperation {
    /// Validate the fields required by this operation's type.
    pub fn into_operation(mut self, block: &str) -> Result<Operation, WireError> {
        let Some(op_type) = OperationType::from_code(self.kind) else {
            return Ok(Operation::Other { code: self.kind });
        };

        let fields = &mut self.fields;
        let mut required = |field: &'static str| {
            take_string(fields, field).ok_or_else(|| WireError::MissingField {
                block: block.to_string(),
                op_type,
                field,
            })
        };

        let op = match op_type {
            OperationType::Send => {
                let to = required("to")?;
                let amount = required("amount")?;
                let token = required("token")?;
                Operation::Send {
                    to,
                    amount,
                    token,
                    extra: take_string(fields, "extra"),
                }
            }
            OperationType::SetInfo => Operation::SetInfo {
                name: required("name")?,
                description: required("description")?,
            },
            OperationType::CreateIdentifier => Operation::CreateIdentifier {
                identifier: required("identifier")?,
            },
        };
        Ok(op)
    }
}

fn take_string(fields: &mut Map<String, Value>, key: &str) -> Option<String> {
    match fields.remove(key)? {
        Value::String(s) => Some(s),
        _ => None,
    }
}
