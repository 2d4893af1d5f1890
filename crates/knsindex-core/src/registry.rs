//! Registry rows, classified events and the mutation protocol.
//!
//! Storage backends implement [`RegistryWriter`] over their open transaction;
//! [`apply_events`] drives it so every backend applies the same insert-if-absent
//! and owner-guarded update rules.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::IndexerError;

// ─── RegistryEntry ────────────────────────────────────────────────────────────

/// One row of the name registry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegistryEntry {
    /// Registered name (primary key).
    pub name: String,
    /// Token account that was named. Never changes once the row exists.
    pub address: String,
    /// Account currently controlling the name.
    pub owner: String,
    /// External content reference (e.g. an IPFS CID).
    pub metadata_ref: Option<String>,
    /// Whether this is the owner's primary name.
    pub is_primary: bool,
    /// Creation time (timestamp of the inscribing block).
    pub timestamp: DateTime<Utc>,
}

// ─── NameKind ─────────────────────────────────────────────────────────────────

/// What kind of name the registry holds; only affects audit wording.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum NameKind {
    Username,
    Domain,
}

impl std::fmt::Display for NameKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Username => write!(f, "username"),
            Self::Domain => write!(f, "domain"),
        }
    }
}

// ─── RegistryEvent ────────────────────────────────────────────────────────────

/// A classified name-service event, not yet applied.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum RegistryEvent {
    /// Register `name` for a freshly created token account.
    Inscribe {
        kind: NameKind,
        name: String,
        address: String,
        owner: String,
        timestamp: DateTime<Utc>,
    },
    /// Move the name held by `token` from `from` to `to`.
    Transfer {
        kind: NameKind,
        token: String,
        from: String,
        to: String,
    },
    /// Attach `value` as the content reference of the name at `address`.
    SetMetadata {
        address: String,
        owner: String,
        value: String,
    },
    /// Mark the name at `address` as the owner's primary name.
    SetPrimary { address: String, owner: String },
}

// ─── Mutation ─────────────────────────────────────────────────────────────────

/// An event that changed the registry, with the affected name.
///
/// Its `Display` form is the audit line emitted after commit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Mutation {
    pub event: RegistryEvent,
    pub name: String,
}

impl std::fmt::Display for Mutation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.event {
            RegistryEvent::Inscribe { kind, owner, .. } => {
                write!(f, "{owner} inscribed {kind} {}", self.name)
            }
            RegistryEvent::Transfer { kind, from, to, .. } => {
                write!(f, "{from} transferred {kind} {} to {to}", self.name)
            }
            RegistryEvent::SetMetadata { owner, value, .. } => {
                write!(f, "{owner} set CID {value} to {}", self.name)
            }
            RegistryEvent::SetPrimary { owner, .. } => {
                write!(f, "{owner} set primary name {}", self.name)
            }
        }
    }
}

// ─── RegistryWriter ───────────────────────────────────────────────────────────

/// Row-level registry operations inside one open transaction.
///
/// Each guarded update returns the name of the row it changed, or `None` when
/// no row matched.
#[async_trait]
pub trait RegistryWriter: Send {
    /// Insert `entry` unless its name exists. Returns `true` if a row was created.
    async fn insert_if_absent(&mut self, entry: &RegistryEntry) -> Result<bool, IndexerError>;

    /// Set `owner = new_owner` where `address` and `owner = current_owner` match.
    async fn update_owner(
        &mut self,
        address: &str,
        current_owner: &str,
        new_owner: &str,
    ) -> Result<Option<String>, IndexerError>;

    /// Set the content reference where `address` and `owner` match.
    async fn update_metadata(
        &mut self,
        address: &str,
        owner: &str,
        value: &str,
    ) -> Result<Option<String>, IndexerError>;

    /// Flag the matching row as primary and clear the flag on the owner's
    /// other rows.
    async fn set_primary(
        &mut self,
        address: &str,
        owner: &str,
    ) -> Result<Option<String>, IndexerError>;
}

/// Apply `events` in order, returning those that changed the registry.
pub async fn apply_events<W>(
    writer: &mut W,
    events: &[RegistryEvent],
) -> Result<Vec<Mutation>, IndexerError>
where
    W: RegistryWriter + ?Sized,
{
    let mut applied = Vec::new();
    for event in events {
        let name = match event {
            RegistryEvent::Inscribe {
                name,
                address,
                owner,
                timestamp,
                ..
            } => {
                let entry = RegistryEntry {
                    name: name.clone(),
                    address: address.clone(),
                    owner: owner.clone(),
                    metadata_ref: None,
                    is_primary: false,
                    timestamp: *timestamp,
                };
                writer
                    .insert_if_absent(&entry)
                    .await?
                    .then(|| name.clone())
            }
            RegistryEvent::Transfer { token, from, to, .. } => {
                writer.update_owner(token, from, to).await?
            }
            RegistryEvent::SetMetadata {
                address,
                owner,
                value,
            } => writer.update_metadata(address, owner, value).await?,
            RegistryEvent::SetPrimary { address, owner } => {
                writer.set_primary(address, owner).await?
            }
        };

        match name {
            Some(name) => applied.push(Mutation {
                event: event.clone(),
                name,
            }),
            None => debug!(?event, "registry event matched no row"),
        }
    }
    Ok(applied)
}

// ─── Tests ────────────────────────────────────────────────────────────────────
