//! knsindex-storage — checkpoint and registry backends for knsindex.
//!
//! Backends:
//! - [`memory`] — in-memory (dev/testing, no persistence)
//! - [`sqlite`] — SQLite via `sqlx` (feature `sqlite`)
//! - [`postgres`] — PostgreSQL via `sqlx` (feature `postgres`)
//!
//! Every backend commits a cycle's registry events and its checkpoint as one
//! unit, and creates its tables plus the default checkpoint row on open.

pub mod memory;

#[cfg(feature = "sqlite")]
pub mod sqlite;

#[cfg(feature = "postgres")]
pub mod postgres;

pub use memory::InMemoryStorage;
