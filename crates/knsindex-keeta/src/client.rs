//! Pagination and history clients backed by `reqwest`.
//!
//! Both endpoints are plain `GET`s with query parameters:
//! - `GET {metadata}/api/staples/metadata?limit&page&sortOrder=asc&dateFrom`
//! - `GET {ledger}/api/node/ledger/history?limit[&start]`
//!
//! Failures are not retried here; the poll loop relies on the durable
//! checkpoint and process restarts instead.

use std::time::Duration;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use tracing::debug;

use knsindex_core::error::IndexerError;
use knsindex_core::indexer::IndexerConfig;
use knsindex_core::types::{HistoryBatch, PageMetadata};

use crate::wire::RawHistory;

const METADATA_PATH: &str = "/api/staples/metadata";
const HISTORY_PATH: &str = "/api/node/ledger/history";

/// Source of pagination metadata and history batches.
#[async_trait]
pub trait LedgerApi: Send + Sync {
    /// Fetch metadata for staples page `page` (1-based).
    async fn fetch_page_metadata(&self, page: u64) -> Result<PageMetadata, IndexerError>;

    /// Fetch one history batch, starting at `cursor` when given.
    async fn fetch_history_batch(&self, cursor: Option<&str>) -> Result<HistoryBatch, IndexerError>;
}

/// HTTP client for the metadata and ledger APIs.
///
/// Holds one `reqwest::Client`, so connections are reused across cycles.
pub struct HttpLedgerClient {
    http: reqwest::Client,
    metadata_base_url: String,
    ledger_base_url: String,
    page_limit: u32,
    launch_date: String,
}

impl HttpLedgerClient {
    pub fn new(config: &IndexerConfig) -> Result<Self, IndexerError> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_millis(config.request_timeout_ms))
            .build()
            .map_err(|e| IndexerError::Config(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            http,
            metadata_base_url: config.metadata_base_url.trim_end_matches('/').to_string(),
            ledger_base_url: config.ledger_base_url.trim_end_matches('/').to_string(),
            page_limit: config.page_limit,
            launch_date: config.launch_date.clone(),
        })
    }

    async fn get_json<T: DeserializeOwned>(
        &self,
        url: String,
        query: &[(&str, String)],
    ) -> Result<T, IndexerError> {
        let unavailable = |reason: String| IndexerError::RemoteUnavailable {
            endpoint: url.clone(),
            reason,
        };

        let resp = self
            .http
            .get(&url)
            .query(query)
            .send()
            .await
            .map_err(|e| unavailable(e.to_string()))?;

        if !resp.status().is_success() {
            let status = resp.status().as_u16();
            let body = resp.text().await.unwrap_or_default();
            return Err(unavailable(format!("HTTP {status}: {body}")));
        }

        let bytes = resp.bytes().await.map_err(|e| unavailable(e.to_string()))?;
        serde_json::from_slice(&bytes).map_err(|e| IndexerError::RemoteMalformed {
            endpoint: url.clone(),
            reason: e.to_string(),
        })
    }
}

#[async_trait]
impl LedgerApi for HttpLedgerClient {
    async fn fetch_page_metadata(&self, page: u64) -> Result<PageMetadata, IndexerError> {
        let url = format!("{}{METADATA_PATH}", self.metadata_base_url);
        let query = [
            ("limit", self.page_limit.to_string()),
            ("page", page.to_string()),
            ("sortOrder", "asc".to_string()),
            ("dateFrom", self.launch_date.clone()),
        ];
        let meta: PageMetadata = self.get_json(url, &query).await?;
        debug!(page, total_pages = meta.total_pages, cursor = ?meta.start_blocks_hash, "fetched page metadata");
        Ok(meta)
    }

    async fn fetch_history_batch(&self, cursor: Option<&str>) -> Result<HistoryBatch, IndexerError> {
        let url = format!("{}{HISTORY_PATH}", self.ledger_base_url);
        let mut query = vec![("limit", self.page_limit.to_string())];
        if let Some(start) = cursor.filter(|c| !c.is_empty()) {
            query.push(("start", start.to_string()));
        }

        let raw: RawHistory = self.get_json(url.clone(), &query).await?;
        let batch = raw.into_batch().map_err(|e| IndexerError::RemoteMalformed {
            endpoint: url,
            reason: e.to_string(),
        })?;
        debug!(staples = batch.staples.len(), blocks = batch.block_count(), "fetched history batch");
        Ok(batch)
    }
}
