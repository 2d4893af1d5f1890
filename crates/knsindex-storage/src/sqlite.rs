//! SQLite storage backend for knsindex.
//!
//! Persists the checkpoint (`settings`) and the name registry (`registry`) to
//! a single SQLite file. Uses `sqlx` with WAL mode.
//!
//! # Usage
//! ```rust,no_run
//! use knsindex_storage::sqlite::SqliteStorage;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! // File-backed (persistent)
//! let store = SqliteStorage::open("./kns.db").await?;
//!
//! // In-memory (tests / ephemeral)
//! let store = SqliteStorage::in_memory().await?;
//! # Ok(())
//! # }
//! ```

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::sqlite::{SqlitePoolOptions, SqliteRow};
use sqlx::{Row, SqliteConnection, SqlitePool};
use tracing::debug;

use knsindex_core::checkpoint::{Checkpoint, CheckpointStore};
use knsindex_core::error::IndexerError;
use knsindex_core::registry::{apply_events, Mutation, RegistryEntry, RegistryEvent, RegistryWriter};

fn store_err(e: sqlx::Error) -> IndexerError {
    IndexerError::StoreUnavailable(e.to_string())
}

/// Lowest name among the rows an `UPDATE ... RETURNING name` touched.
fn first_name(rows: &[SqliteRow]) -> Option<String> {
    rows.iter().map(|r| r.get::<String, _>("name")).min()
}

fn is_memory_url(path: &str) -> bool {
    let rest = path.strip_prefix("sqlite:").unwrap_or(path);
    let rest = rest.strip_prefix("//").unwrap_or(rest);
    rest.split('?').next() == Some(":memory:")
}

/// SQLite-backed checkpoint and registry storage.
pub struct SqliteStorage {
    pool: SqlitePool,
}

impl SqliteStorage {
    /// Open (or create) a SQLite database at `path`.
    ///
    /// The path may be a plain file path (`"./kns.db"`) or a full
    /// SQLite URL (`"sqlite:./kns.db?mode=rwc"`). In-memory URLs are handed to
    /// [`SqliteStorage::in_memory`].
    pub async fn open(path: &str) -> Result<Self, IndexerError> {
        if is_memory_url(path) {
            return Self::in_memory().await;
        }

        let url = if path.starts_with("sqlite:") {
            path.to_string()
        } else {
            format!("sqlite:{path}?mode=rwc")
        };

        let pool = SqlitePool::connect(&url).await.map_err(store_err)?;

        let storage = Self { pool };
        storage.init_schema().await?;
        Ok(storage)
    }

    /// Open an in-memory SQLite database.
    ///
    /// Pinned to a single connection that is never recycled, since each
    /// connection to `sqlite::memory:` sees its own database.
    pub async fn in_memory() -> Result<Self, IndexerError> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect("sqlite::memory:")
            .await
            .map_err(store_err)?;

        let storage = Self { pool };
        storage.init_schema().await?;
        Ok(storage)
    }

    /// Create tables, enable WAL mode and seed the checkpoint row.
    async fn init_schema(&self) -> Result<(), IndexerError> {
        sqlx::query("PRAGMA journal_mode=WAL;")
            .execute(&self.pool)
            .await
            .map_err(store_err)?;

        // Single-row checkpoint table
        sqlx::query(
            "CREATE TABLE IF NOT EXISTS settings (
                id                   INTEGER PRIMARY KEY CHECK (id = 1),
                page                 INTEGER NOT NULL DEFAULT 1 CHECK (page > 0),
                last_block_timestamp TEXT,
                last_block_hash      TEXT
            );",
        )
        .execute(&self.pool)
        .await
        .map_err(store_err)?;

        sqlx::query(
            "INSERT INTO settings (id, page) VALUES (1, 1)
             ON CONFLICT (id) DO NOTHING;",
        )
        .execute(&self.pool)
        .await
        .map_err(store_err)?;

        sqlx::query(
            "CREATE TABLE IF NOT EXISTS registry (
                name       TEXT    PRIMARY KEY,
                address    TEXT    NOT NULL,
                owner      TEXT    NOT NULL,
                cid        TEXT,
                is_primary BOOLEAN NOT NULL DEFAULT FALSE,
                timestamp  TEXT    NOT NULL
            );",
        )
        .execute(&self.pool)
        .await
        .map_err(store_err)?;

        sqlx::query("CREATE INDEX IF NOT EXISTS idx_registry_address ON registry (address);")
            .execute(&self.pool)
            .await
            .map_err(store_err)?;

        sqlx::query("CREATE INDEX IF NOT EXISTS idx_registry_owner ON registry (owner);")
            .execute(&self.pool)
            .await
            .map_err(store_err)?;

        Ok(())
    }

    // ─── Registry queries ───────────────────────────────────────────────────────

    /// Look up a registry row by name.
    pub async fn entry(&self, name: &str) -> Result<Option<RegistryEntry>, IndexerError> {
        let row = sqlx::query(
            "SELECT name, address, owner, cid, is_primary, timestamp
             FROM registry WHERE name = ?",
        )
        .bind(name)
        .fetch_optional(&self.pool)
        .await
        .map_err(store_err)?;

        Ok(row.map(|r| RegistryEntry {
            name: r.get("name"),
            address: r.get("address"),
            owner: r.get("owner"),
            metadata_ref: r.get("cid"),
            is_primary: r.get("is_primary"),
            timestamp: r.get("timestamp"),
        }))
    }

    /// Number of registered names.
    pub async fn registry_count(&self) -> Result<u64, IndexerError> {
        let row = sqlx::query("SELECT COUNT(*) as cnt FROM registry")
            .fetch_one(&self.pool)
            .await
            .map_err(store_err)?;

        let cnt: i64 = row.get("cnt");
        Ok(cnt as u64)
    }
}

// ─── RegistryWriter over a transaction ───────────────────────────────────────

struct SqliteWriter<'c> {
    conn: &'c mut SqliteConnection,
}

#[async_trait]
impl RegistryWriter for SqliteWriter<'_> {
    async fn insert_if_absent(&mut self, entry: &RegistryEntry) -> Result<bool, IndexerError> {
        let result = sqlx::query(
            "INSERT INTO registry (name, address, owner, cid, is_primary, timestamp)
             VALUES (?, ?, ?, ?, ?, ?)
             ON CONFLICT (name) DO NOTHING",
        )
        .bind(&entry.name)
        .bind(&entry.address)
        .bind(&entry.owner)
        .bind(&entry.metadata_ref)
        .bind(entry.is_primary)
        .bind(entry.timestamp)
        .execute(&mut *self.conn)
        .await
        .map_err(store_err)?;

        Ok(result.rows_affected() == 1)
    }

    async fn update_owner(
        &mut self,
        address: &str,
        current_owner: &str,
        new_owner: &str,
    ) -> Result<Option<String>, IndexerError> {
        let rows = sqlx::query(
            "UPDATE registry SET owner = ?
             WHERE address = ? AND owner = ?
             RETURNING name",
        )
        .bind(new_owner)
        .bind(address)
        .bind(current_owner)
        .fetch_all(&mut *self.conn)
        .await
        .map_err(store_err)?;

        Ok(first_name(&rows))
    }

    async fn update_metadata(
        &mut self,
        address: &str,
        owner: &str,
        value: &str,
    ) -> Result<Option<String>, IndexerError> {
        let rows = sqlx::query(
            "UPDATE registry SET cid = ?
             WHERE address = ? AND owner = ?
             RETURNING name",
        )
        .bind(value)
        .bind(address)
        .bind(owner)
        .fetch_all(&mut *self.conn)
        .await
        .map_err(store_err)?;

        Ok(first_name(&rows))
    }

    async fn set_primary(
        &mut self,
        address: &str,
        owner: &str,
    ) -> Result<Option<String>, IndexerError> {
        let row = sqlx::query(
            "SELECT name FROM registry WHERE address = ? AND owner = ?
             ORDER BY name LIMIT 1",
        )
        .bind(address)
        .bind(owner)
        .fetch_optional(&mut *self.conn)
        .await
        .map_err(store_err)?;

        let Some(row) = row else {
            return Ok(None);
        };

        sqlx::query("UPDATE registry SET is_primary = (address = ?) WHERE owner = ?")
            .bind(address)
            .bind(owner)
            .execute(&mut *self.conn)
            .await
            .map_err(store_err)?;

        Ok(Some(row.get("name")))
    }
}

// ─── CheckpointStore impl ────────────────────────────────────────────────────

#[async_trait]
impl CheckpointStore for SqliteStorage {
    async fn load(&self) -> Result<Checkpoint, IndexerError> {
        let row = sqlx::query(
            "SELECT page, last_block_timestamp, last_block_hash
             FROM settings WHERE id = 1",
        )
        .fetch_optional(&self.pool)
        .await
        .map_err(store_err)?;

        Ok(row
            .map(|r| Checkpoint {
                page: r.get::<i64, _>("page") as u64,
                last_block_timestamp: r.get::<Option<DateTime<Utc>>, _>("last_block_timestamp"),
                last_block_hash: r.get("last_block_hash"),
            })
            .unwrap_or_default())
    }

    async fn commit(
        &self,
        checkpoint: &Checkpoint,
        events: &[RegistryEvent],
    ) -> Result<Vec<Mutation>, IndexerError> {
        let mut tx = self.pool.begin().await.map_err(store_err)?;

        let applied = apply_events(&mut SqliteWriter { conn: &mut *tx }, events).await?;

        sqlx::query(
            "UPDATE settings
             SET page = ?, last_block_timestamp = ?, last_block_hash = ?
             WHERE id = 1",
        )
        .bind(checkpoint.page as i64)
        .bind(checkpoint.last_block_timestamp)
        .bind(&checkpoint.last_block_hash)
        .execute(&mut *tx)
        .await
        .map_err(store_err)?;

        tx.commit().await.map_err(store_err)?;

        debug!(
            page = checkpoint.page,
            hash = ?checkpoint.last_block_hash,
            mutations = applied.len(),
            "cycle committed"
        );
        Ok(applied)
    }
}

// ─── Tests ───────────────────────────────────────────────────────────────────
