//! Storage error types

use kestrel_primitives::{AccountId, H256};
use thiserror::Error;

/// Storage errors
#[derive(Debug, Error)]
pub enum StorageError {
    /// RocksDB error
    #[cfg(feature = "rocksdb")]
    #[error("rocksdb error: {0}")]
    RocksDb(#[from] rocksdb::Error),

    /// Deserialization error
    #[error("deserialization error: {0}")]
    Deserialization(String),

    /// Account has a code hash but the code is missing
    #[error("missing code {code_hash} for account {account}")]
    MissingCode {
        /// Account being opened
        account: AccountId,
        /// Code hash recorded in the account state
        code_hash: H256,
    },

    /// Snapshot token does not belong to the current journal
    #[error("invalid snapshot {requested}: journal holds {journal} entries")]
    InvalidSnapshot {
        /// Requested snapshot position
        requested: usize,
        /// Current journal length
        journal: usize,
    },

    /// Invalid column family
    #[error("invalid column family: {0}")]
    InvalidColumnFamily(String),

    /// Database not open
    #[error("database not open")]
    NotOpen,

    /// Database already open
    #[error("database already open")]
    AlreadyOpen,

    /// Invalid data format
    #[error("invalid data format: {0}")]
    InvalidFormat(String),

    /// IO error
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for storage operations
pub type StorageResult<T> = Result<T, StorageError>;
