//! The poll loop — drives fetch → classify → commit → wait cycles.
//!
//! # Cycle
//! 1. Load the checkpoint.
//! 2. Fetch page metadata for `checkpoint.page`, then the history batch at its
//!    resume cursor.
//! 3. Plan: order blocks, skip processed ones, classify the rest.
//! 4. Commit registry events and the advanced checkpoint in one transaction.
//! 5. Log the audit lines of mutations that took effect.
//! 6. Wait `poll_interval_ms`, then repeat.
//!
//! Errors end the loop; nothing is retried. Because the commit is atomic the
//! next run starts again from the last committed checkpoint. Shutdown requests
//! are honoured only between cycles.

use std::future::Future;
use std::time::Duration;

use tracing::{debug, info};

use knsindex_core::checkpoint::CheckpointStore;
use knsindex_core::classify::Classifier;
use knsindex_core::cycle::plan_cycle;
use knsindex_core::error::IndexerError;
use knsindex_core::indexer::{IndexerConfig, IndexerState};
use knsindex_core::registry::Mutation;

use crate::client::LedgerApi;

/// Summary of one committed cycle.
#[derive(Debug, Clone)]
pub struct CycleReport {
    pub page: u64,
    pub total_pages: u64,
    pub processed: usize,
    pub skipped: usize,
    pub mutations: Vec<Mutation>,
}

/// The poll loop implementation.
pub struct PollLoop<C: LedgerApi> {
    config: IndexerConfig,
    client: C,
    store: Box<dyn CheckpointStore>,
    classifier: Classifier,
    state: IndexerState,
}

impl<C: LedgerApi> PollLoop<C> {
    pub fn new(
        config: IndexerConfig,
        client: C,
        store: Box<dyn CheckpointStore>,
    ) -> Result<Self, IndexerError> {
        let classifier = Classifier::new(config.classifier.clone())?;
        Ok(Self {
            config,
            client,
            store,
            classifier,
            state: IndexerState::Idle,
        })
    }

    pub fn state(&self) -> IndexerState {
        self.state
    }

    /// Run one full cycle and commit it.
    pub async fn run_cycle(&mut self) -> Result<CycleReport, IndexerError> {
        let checkpoint = self.store.load().await?;
        debug!(
            page = checkpoint.page,
            last_block_timestamp = ?checkpoint.last_block_timestamp,
            last_block_hash = ?checkpoint.last_block_hash,
            "loaded checkpoint"
        );

        let metadata = self.client.fetch_page_metadata(checkpoint.page).await?;
        let batch = self
            .client
            .fetch_history_batch(metadata.start_blocks_hash.as_deref())
            .await?;

        let plan = plan_cycle(&checkpoint, &metadata, batch, &self.classifier);
        let mutations = self.store.commit(&plan.checkpoint, &plan.events).await?;

        for mutation in &mutations {
            info!("{mutation}");
        }
        debug!(
            page = plan.checkpoint.page,
            last_block_hash = ?plan.checkpoint.last_block_hash,
            processed = plan.processed,
            skipped = plan.skipped,
            "committed checkpoint"
        );

        Ok(CycleReport {
            page: checkpoint.page,
            total_pages: metadata.total_pages,
            processed: plan.processed,
            skipped: plan.skipped,
            mutations,
        })
    }

    /// Run until Ctrl-C, then return `Ok(())` at the next cycle boundary.
    pub async fn run(&mut self) -> Result<(), IndexerError> {
        let (tx, rx) = tokio::sync::oneshot::channel::<()>();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                let _ = tx.send(());
            }
        });

        self.run_until(async move {
            if rx.await.is_err() {
                // No signal handler; run until an error.
                std::future::pending::<()>().await;
            }
        })
        .await
    }

    /// Run cycles until `shutdown` resolves.
    ///
    /// `shutdown` is only observed between cycles, never mid-cycle.
    pub async fn run_until<F>(&mut self, shutdown: F) -> Result<(), IndexerError>
    where
        F: Future<Output = ()>,
    {
        let poll_interval = Duration::from_millis(self.config.poll_interval_ms);
        tokio::pin!(shutdown);

        info!("Starting KNS Indexer");
        self.state = IndexerState::Polling;

        loop {
            if let Err(e) = self.run_cycle().await {
                self.state = IndexerState::Stopped;
                return Err(e);
            }

            tokio::select! {
                biased;
                _ = &mut shutdown => {
                    self.state = IndexerState::Stopping;
                    break;
                }
                _ = tokio::time::sleep(poll_interval) => {}
            }
        }

        info!("KNS Indexer stopped!");
        self.state = IndexerState::Stopped;
        Ok(())
    }
}
