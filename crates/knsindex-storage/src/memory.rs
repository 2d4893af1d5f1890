//! In-memory storage backend.
//!
//! Holds the checkpoint and registry in RAM. Commits are applied to a copy of
//! the registry and swapped in only when every event succeeded.

use async_trait::async_trait;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

use knsindex_core::checkpoint::{Checkpoint, CheckpointStore};
use knsindex_core::error::IndexerError;
use knsindex_core::registry::{apply_events, Mutation, RegistryEntry, RegistryEvent, RegistryWriter};

#[derive(Debug, Clone, Default)]
struct State {
    checkpoint: Checkpoint,
    entries: BTreeMap<String, RegistryEntry>,
}

/// In-memory indexer storage.
///
/// All data is lost when the process exits.
pub struct InMemoryStorage {
    state: Mutex<State>,
    available: AtomicBool,
}

impl Default for InMemoryStorage {
    fn default() -> Self {
        Self {
            state: Mutex::new(State::default()),
            available: AtomicBool::new(true),
        }
    }
}

impl InMemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Simulate an outage: while unavailable, `load` and `commit` fail.
    pub fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::SeqCst);
    }

    /// Current checkpoint.
    pub fn checkpoint(&self) -> Checkpoint {
        self.state.lock().unwrap().checkpoint.clone()
    }

    /// Look up a registry row by name.
    pub fn entry(&self, name: &str) -> Option<RegistryEntry> {
        self.state.lock().unwrap().entries.get(name).cloned()
    }

    /// All registry rows, ordered by name.
    pub fn entries(&self) -> Vec<RegistryEntry> {
        self.state.lock().unwrap().entries.values().cloned().collect()
    }

    fn ensure_available(&self) -> Result<(), IndexerError> {
        if self.available.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(IndexerError::StoreUnavailable("in-memory store marked unavailable".into()))
        }
    }
}

/// Registry writer over a working copy of the rows.
struct MemoryWriter<'a> {
    entries: &'a mut BTreeMap<String, RegistryEntry>,
}

impl MemoryWriter<'_> {
    /// Apply `update` to every row matching `address` and `owner`, returning
    /// the first matched name.
    fn update_matching(
        &mut self,
        address: &str,
        owner: &str,
        mut update: impl FnMut(&mut RegistryEntry),
    ) -> Option<String> {
        let mut first = None;
        for entry in self
            .entries
            .values_mut()
            .filter(|e| e.address == address && e.owner == owner)
        {
            first.get_or_insert_with(|| entry.name.clone());
            update(entry);
        }
        first
    }
}

#[async_trait]
impl RegistryWriter for MemoryWriter<'_> {
    async fn insert_if_absent(&mut self, entry: &RegistryEntry) -> Result<bool, IndexerError> {
        if self.entries.contains_key(&entry.name) {
            return Ok(false);
        }
        self.entries.insert(entry.name.clone(), entry.clone());
        Ok(true)
    }

    async fn update_owner(
        &mut self,
        address: &str,
        current_owner: &str,
        new_owner: &str,
    ) -> Result<Option<String>, IndexerError> {
        Ok(self.update_matching(address, current_owner, |e| {
            e.owner = new_owner.to_string();
        }))
    }

    async fn update_metadata(
        &mut self,
        address: &str,
        owner: &str,
        value: &str,
    ) -> Result<Option<String>, IndexerError> {
        Ok(self.update_matching(address, owner, |e| {
            e.metadata_ref = Some(value.to_string());
        }))
    }

    async fn set_primary(
        &mut self,
        address: &str,
        owner: &str,
    ) -> Result<Option<String>, IndexerError> {
        let Some(name) = self
            .entries
            .values()
            .find(|e| e.address == address && e.owner == owner)
            .map(|e| e.name.clone())
        else {
            return Ok(None);
        };
        for e in self.entries.values_mut().filter(|e| e.owner == owner) {
            e.is_primary = e.address == address;
        }
        Ok(Some(name))
    }
}

#[async_trait]
impl CheckpointStore for InMemoryStorage {
    async fn load(&self) -> Result<Checkpoint, IndexerError> {
        self.ensure_available()?;
        Ok(self.checkpoint())
    }

    async fn commit(
        &self,
        checkpoint: &Checkpoint,
        events: &[RegistryEvent],
    ) -> Result<Vec<Mutation>, IndexerError> {
        self.ensure_available()?;

        let mut working = self.state.lock().unwrap().entries.clone();
        let applied = apply_events(&mut MemoryWriter { entries: &mut working }, events).await?;

        let mut state = self.state.lock().unwrap();
        state.entries = working;
        state.checkpoint = checkpoint.clone();
        Ok(applied)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use knsindex_core::registry::NameKind;

    fn inscribe(name: &str, address: &str, owner: &str) -> RegistryEvent {
        RegistryEvent::Inscribe {
            kind: NameKind::Username,
            name: name.into(),
            address: address.into(),
            owner: owner.into(),
            timestamp: Utc.timestamp_opt(1_764_000_000, 0).unwrap(),
        }
    }

    fn checkpoint(page: u64, hash: &str) -> Checkpoint {
        Checkpoint {
            page,
            last_block_timestamp: Some(Utc.timestamp_opt(1_764_000_000, 0).unwrap()),
            last_block_hash: Some(hash.into()),
        }
    }

    #[tokio::test]
    async fn default_checkpoint() {
        let store = InMemoryStorage::new();
        assert_eq!(store.load().await.unwrap(), Checkpoint::default());
    }

    #[tokio::test]
    async fn commit_applies_events_and_checkpoint() {
        let store = InMemoryStorage::new();
        let applied = store
            .commit(&checkpoint(2, "H2"), &[inscribe("alice", "acct1", "acctX")])
            .await
            .unwrap();

        assert_eq!(applied.len(), 1);
        assert_eq!(store.entry("alice").unwrap().owner, "acctX");
        assert_eq!(store.load().await.unwrap(), checkpoint(2, "H2"));
    }

    #[tokio::test]
    async fn set_primary_clears_other_names() {
        let store = InMemoryStorage::new();
        store
            .commit(
                &checkpoint(1, "H1"),
                &[
                    inscribe("alice", "acct1", "acctX"),
                    inscribe("bob", "acct2", "acctX"),
                    inscribe("carol", "acct3", "acctY"),
                    RegistryEvent::SetPrimary { address: "acct1".into(), owner: "acctX".into() },
                    RegistryEvent::SetPrimary { address: "acct3".into(), owner: "acctY".into() },
                ],
            )
            .await
            .unwrap();
        assert!(store.entry("alice").unwrap().is_primary);

        store
            .commit(
                &checkpoint(1, "H2"),
                &[RegistryEvent::SetPrimary { address: "acct2".into(), owner: "acctX".into() }],
            )
            .await
            .unwrap();
        assert!(!store.entry("alice").unwrap().is_primary);
        assert!(store.entry("bob").unwrap().is_primary);
        // Other owners are untouched.
        assert!(store.entry("carol").unwrap().is_primary);
    }

    #[tokio::test]
    async fn updates_reach_every_name_on_an_address() {
        let store = InMemoryStorage::new();
        let applied = store
            .commit(
                &checkpoint(1, "H1"),
                &[
                    inscribe("alice", "acct1", "acctX"),
                    inscribe("bob", "acct1", "acctX"),
                    RegistryEvent::Transfer {
                        kind: NameKind::Username,
                        token: "acct1".into(),
                        from: "acctX".into(),
                        to: "acctY".into(),
                    },
                    RegistryEvent::SetMetadata {
                        address: "acct1".into(),
                        owner: "acctY".into(),
                        value: "bafy1".into(),
                    },
                ],
            )
            .await
            .unwrap();

        assert_eq!(applied.len(), 4);
        assert_eq!(applied[2].name, "alice");
        for name in ["alice", "bob"] {
            let row = store.entry(name).unwrap();
            assert_eq!(row.owner, "acctY");
            assert_eq!(row.metadata_ref.as_deref(), Some("bafy1"));
        }
    }

    #[tokio::test]
    async fn unavailable_store_keeps_state() {
        let store = InMemoryStorage::new();
        store.set_available(false);

        let err = store
            .commit(&checkpoint(2, "H2"), &[inscribe("alice", "acct1", "acctX")])
            .await
            .unwrap_err();
        assert!(err.is_store());
        assert!(store.load().await.is_err());

        store.set_available(true);
        assert!(store.entry("alice").is_none());
        assert_eq!(store.load().await.unwrap(), Checkpoint::default());
    }
}
