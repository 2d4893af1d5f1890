//! knsindex-keeta — Keeta ledger client and poll loop.

pub mod builder;
pub mod client;
pub mod listener;
pub mod wire;

pub use builder::IndexerBuilder;
pub use client::{HttpLedgerClient, LedgerApi};
pub use listener::{CycleReport, PollLoop};
