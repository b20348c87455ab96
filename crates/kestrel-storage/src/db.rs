//! RocksDB wrapper

use crate::error::{StorageError, StorageResult};
use parking_lot::RwLock;
use rocksdb::{
    BoundColumnFamily, ColumnFamilyDescriptor, DBWithThreadMode, MultiThreaded, Options, WriteBatch,
};
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Column family names
pub mod cf {
    /// Account state, keyed by account id
    pub const ACCOUNTS: &str = "accounts";
    /// Contract storage, keyed by account id || key
    pub const STORAGE: &str = "storage";
    /// Contract code, keyed by code hash
    pub const CODE: &str = "code";
}

/// All column family names
pub const ALL_CFS: &[&str] = &[cf::ACCOUNTS, cf::STORAGE, cf::CODE];

type RocksDB = DBWithThreadMode<MultiThreaded>;

/// Database configuration
#[derive(Clone, Debug)]
pub struct DbConfig {
    /// Create database if missing
    pub create_if_missing: bool,
    /// Maximum number of open files
    pub max_open_files: i32,
    /// Write buffer size
    pub write_buffer_size: usize,
}

impl Default for DbConfig {
    fn default() -> Self {
        Self {
            create_if_missing: true,
            max_open_files: 512,
            write_buffer_size: 64 * 1024 * 1024,
        }
    }
}

/// RocksDB handle with column family support
#[derive(Clone)]
pub struct Database {
    db: Arc<RwLock<Option<RocksDB>>>,
    path: PathBuf,
}

impl Database {
    /// Create a database handle (not yet opened)
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            db: Arc::new(RwLock::new(None)),
            path: path.as_ref().to_path_buf(),
        }
    }

    /// Open the database with custom config
    pub fn open_with_config(&self, config: &DbConfig) -> StorageResult<()> {
        let mut guard = self.db.write();
        if guard.is_some() {
            return Err(StorageError::AlreadyOpen);
        }

        let mut opts = Options::default();
        opts.create_if_missing(config.create_if_missing);
        opts.create_missing_column_families(true);
        opts.set_max_open_files(config.max_open_files);
        opts.set_write_buffer_size(config.write_buffer_size);

        let descriptors: Vec<ColumnFamilyDescriptor> = ALL_CFS
            .iter()
            .map(|name| ColumnFamilyDescriptor::new(*name, Options::default()))
            .collect();

        let db = RocksDB::open_cf_descriptors(&opts, &self.path, descriptors)?;
        *guard = Some(db);
        tracing::info!(path = %self.path.display(), "opened state database");
        Ok(())
    }

    /// Open the database with default config
    pub fn open(&self) -> StorageResult<()> {
        self.open_with_config(&DbConfig::default())
    }

    /// Close the database
    pub fn close(&self) {
        *self.db.write() = None;
    }

    /// Check if database is open
    pub fn is_open(&self) -> bool {
        self.db.read().is_some()
    }

    /// Get a value from a column family
    pub fn get(&self, cf_name: &str, key: &[u8]) -> StorageResult<Option<Vec<u8>>> {
        let guard = self.db.read();
        let db = guard.as_ref().ok_or(StorageError::NotOpen)?;
        let cf = Self::get_cf(db, cf_name)?;
        Ok(db.get_cf(&cf, key)?)
    }

    /// Put a value into a column family
    pub fn put(&self, cf_name: &str, key: &[u8], value: &[u8]) -> StorageResult<()> {
        let guard = self.db.read();
        let db = guard.as_ref().ok_or(StorageError::NotOpen)?;
        let cf = Self::get_cf(db, cf_name)?;
        db.put_cf(&cf, key, value)?;
        Ok(())
    }

    /// Write a batch atomically
    pub fn write_batch(&self, batch: Batch) -> StorageResult<()> {
        let guard = self.db.read();
        let db = guard.as_ref().ok_or(StorageError::NotOpen)?;

        let mut rocks_batch = WriteBatch::default();
        for op in batch.ops {
            match op {
                BatchOp::Put { cf_name, key, value } => {
                    let cf = Self::get_cf(db, cf_name)?;
                    rocks_batch.put_cf(&cf, &key, &value);
                }
                BatchOp::Delete { cf_name, key } => {
                    let cf = Self::get_cf(db, cf_name)?;
                    rocks_batch.delete_cf(&cf, &key);
                }
            }
        }
        db.write(rocks_batch)?;
        Ok(())
    }

    fn get_cf<'a>(db: &'a RocksDB, name: &str) -> StorageResult<Arc<BoundColumnFamily<'a>>> {
        db.cf_handle(name)
            .ok_or_else(|| StorageError::InvalidColumnFamily(name.to_string()))
    }

    /// Database path
    pub fn path(&self) -> &Path {
        &self.path
    }
}

enum BatchOp {
    Put {
        cf_name: &'static str,
        key: Vec<u8>,
        value: Vec<u8>,
    },
    Delete {
        cf_name: &'static str,
        key: Vec<u8>,
    },
}

/// Pending write batch
#[derive(Default)]
pub struct Batch {
    ops: Vec<BatchOp>,
}

impl Batch {
    /// Create an empty batch
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a put
    pub fn put(&mut self, cf_name: &'static str, key: Vec<u8>, value: Vec<u8>) {
        self.ops.push(BatchOp::Put { cf_name, key, value });
    }

    /// Queue a delete
    pub fn delete(&mut self, cf_name: &'static str, key: Vec<u8>) {
        self.ops.push(BatchOp::Delete { cf_name, key });
    }

    /// Number of queued operations
    pub fn len(&self) -> usize {
        self.ops.len()
    }

    /// Check if batch is empty
    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }
}
