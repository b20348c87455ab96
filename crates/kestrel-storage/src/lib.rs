//! # kestrel-storage
//!
//! State store call-out for the Kestrel execution engine.
//!
//! This crate provides:
//! - `AccountState` and its persisted byte form
//! - Read/write store traits
//! - In-memory store
//! - Journaled per-contract storage views with snapshot tokens
//! - RocksDB backend (feature `rocksdb`)

#![warn(missing_docs)]
#![warn(clippy::all)]

mod account;
mod contract;
mod error;
mod memory;
mod traits;

#[cfg(feature = "rocksdb")]
mod db;
#[cfg(feature = "rocksdb")]
mod rocks;

pub use account::AccountState;
pub use contract::{ContractStorage, StorageSnapshot};
pub use error::{StorageError, StorageResult};
pub use memory::MemoryStore;
pub use traits::{ChangeSet, StateReader, StateWriter};

#[cfg(feature = "rocksdb")]
pub use db::{cf, Batch, Database, DbConfig};
#[cfg(feature = "rocksdb")]
pub use rocks::RocksStateStore;
