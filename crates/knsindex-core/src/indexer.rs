//! Indexer configuration and state types.

use serde::{Deserialize, Serialize};

use crate::classify::ClassifierConfig;

/// Base URL of the testnet ledger representative.
pub const DEFAULT_LEDGER_BASE_URL: &str = "https://rep1.test.network.api.keeta.com";

/// Base URL of the staples metadata index.
pub const DEFAULT_METADATA_BASE_URL: &str = "https://api.test.keetools.org";

/// Configuration for an indexer instance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexerConfig {
    /// Ledger API base URL (`/api/node/ledger/history`).
    pub ledger_base_url: String,
    /// Metadata API base URL (`/api/staples/metadata`).
    pub metadata_base_url: String,
    /// Page size sent to both APIs.
    pub page_limit: u32,
    /// `dateFrom` sent to the metadata API (`YYYY-MM-DD`).
    pub launch_date: String,
    /// Wait between cycles (milliseconds).
    pub poll_interval_ms: u64,
    /// Per-request HTTP timeout (milliseconds).
    pub request_timeout_ms: u64,
    pub classifier: ClassifierConfig,
}

impl Default for IndexerConfig {
    fn default() -> Self {
        Self {
            ledger_base_url: DEFAULT_LEDGER_BASE_URL.into(),
            metadata_base_url: DEFAULT_METADATA_BASE_URL.into(),
            page_limit: 100,
            launch_date: "2025-11-20".into(),
            poll_interval_ms: 1000,
            request_timeout_ms: 30_000,
            classifier: ClassifierConfig::default(),
        }
    }
}

/// Runtime state of the poll loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum IndexerState {
    /// Not yet started.
    Idle,
    /// Running fetch/classify/commit cycles.
    Polling,
    /// Shutdown requested; exits at the next cycle boundary.
    Stopping,
    /// Terminated.
    Stopped,
}

impl std::fmt::Display for IndexerState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Idle => write!(f, "idle"),
            Self::Polling => write!(f, "polling"),
            Self::Stopping => write!(f, "stopping"),
            Self::Stopped => write!(f, "stopped"),
        }
    }
}
