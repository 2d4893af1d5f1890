//! Fluent builder API for creating KNS indexers.
//!
//! # Example
//!
//! ```rust,no_run
//! use knsindex_keeta::IndexerBuilder;
//! use knsindex_core::classify::NameScheme;
//!
//! let config = IndexerBuilder::new()
//!     .ledger_base_url("https://rep1.test.network.api.keeta.com")
//!     .scheme(NameScheme::Domain { root: "kns.keeta".into() })
//!     .poll_interval_ms(2000)
//!     .build_config();
//! ```

use knsindex_core::checkpoint::CheckpointStore;
use knsindex_core::classify::NameScheme;
use knsindex_core::error::IndexerError;
use knsindex_core::indexer::IndexerConfig;

use crate::client::HttpLedgerClient;
use crate::listener::PollLoop;

/// Fluent builder for `IndexerConfig`.
#[derive(Default)]
pub struct IndexerBuilder {
    config: IndexerConfig,
}

impl IndexerBuilder {
    pub fn new() -> Self {
        Self {
            config: IndexerConfig::default(),
        }
    }

    /// Set the ledger API base URL.
    pub fn ledger_base_url(mut self, url: impl Into<String>) -> Self {
        self.config.ledger_base_url = url.into();
        self
    }

    /// Set the staples metadata API base URL.
    pub fn metadata_base_url(mut self, url: impl Into<String>) -> Self {
        self.config.metadata_base_url = url.into();
        self
    }

    /// Set the page size sent to both APIs.
    pub fn page_limit(mut self, limit: u32) -> Self {
        self.config.page_limit = limit;
        self
    }

    /// Set the metadata `dateFrom` (`YYYY-MM-DD`).
    pub fn launch_date(mut self, date: impl Into<String>) -> Self {
        self.config.launch_date = date.into();
        self
    }

    /// Set the wait between cycles in milliseconds.
    pub fn poll_interval_ms(mut self, ms: u64) -> Self {
        self.config.poll_interval_ms = ms;
        self
    }

    pub fn request_timeout_ms(mut self, ms: u64) -> Self {
        self.config.request_timeout_ms = ms;
        self
    }

    /// Set the naming scheme (usernames or domains).
    pub fn scheme(mut self, scheme: NameScheme) -> Self {
        self.config.classifier.scheme = scheme;
        self
    }

    /// Set the token name inscriptions must carry.
    pub fn token_name(mut self, name: impl Into<String>) -> Self {
        self.config.classifier.token_name = name.into();
        self
    }

    /// Set the address that metadata directives are sent to.
    pub fn sentinel_address(mut self, address: impl Into<String>) -> Self {
        self.config.classifier.sentinel_address = address.into();
        self
    }

    /// Build the `IndexerConfig`.
    pub fn build_config(self) -> IndexerConfig {
        self.config
    }

    /// Build an HTTP-backed poll loop over `store`.
    pub fn build(
        self,
        store: Box<dyn CheckpointStore>,
    ) -> Result<PollLoop<HttpLedgerClient>, IndexerError> {
        let client = HttpLedgerClient::new(&self.config)?;
        PollLoop::new(self.config, client, store)
    }
}
