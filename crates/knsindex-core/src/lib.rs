//! knsindex-core — foundation for the KNS name-registry indexer.
//!
//! # Architecture
//!
//! ```text
//! PollLoop (knsindex-keeta)
//!     ├── LedgerApi          (page metadata + history batch)
//!     ├── plan_cycle         (order → resume filter → classify)
//!     │     ├── order_blocks
//!     │     ├── Checkpoint::has_processed
//!     │     └── Classifier   (Inscribe / Transfer / SetMetadata / SetPrimary)
//!     └── CheckpointStore    (registry mutations + checkpoint, one transaction)
//! ```

pub mod checkpoint;
pub mod classify;
pub mod cycle;
pub mod error;
pub mod indexer;
pub mod normalize;
pub mod registry;
pub mod types;

pub use checkpoint::{Checkpoint, CheckpointStore};
pub use classify::{Classifier, ClassifierConfig, NameScheme};
pub use cycle::{plan_cycle, CyclePlan};
pub use error::IndexerError;
pub use indexer::{IndexerConfig, IndexerState};
pub use normalize::order_blocks;
pub use registry::{apply_events, Mutation, NameKind, RegistryEntry, RegistryEvent, RegistryWriter};
pub use types::{Block, HistoryBatch, Operation, OperationType, PageMetadata};
