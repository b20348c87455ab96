//! State store backed by RocksDB

use crate::account::AccountState;
use crate::db::{cf, Batch, Database};
use crate::error::{StorageError, StorageResult};
use crate::traits::{ChangeSet, StateReader, StateWriter};
use kestrel_crypto::sha256;
use kestrel_primitives::{AccountId, H256};

/// Storage key: account id || contract key
fn storage_key(id: &AccountId, key: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(32 + key.len());
    out.extend_from_slice(id.as_bytes());
    out.extend_from_slice(key);
    out
}

/// Persistent state store
pub struct RocksStateStore {
    db: Database,
}

impl RocksStateStore {
    /// Wrap an opened database
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    /// Underlying database
    pub fn database(&self) -> &Database {
        &self.db
    }
}

impl StateReader for RocksStateStore {
    fn get_account_state(&self, id: &AccountId) -> StorageResult<Option<AccountState>> {
        match self.db.get(cf::ACCOUNTS, id.as_bytes())? {
            Some(bytes) => AccountState::from_bytes(&bytes)
                .map(Some)
                .ok_or_else(|| StorageError::Deserialization(format!("account {id}"))),
            None => Ok(None),
        }
    }

    fn get_storage(&self, id: &AccountId, key: &[u8]) -> StorageResult<Option<Vec<u8>>> {
        self.db.get(cf::STORAGE, &storage_key(id, key))
    }

    fn get_code(&self, code_hash: &H256) -> StorageResult<Option<Vec<u8>>> {
        self.db.get(cf::CODE, code_hash.as_bytes())
    }
}

impl StateWriter for RocksStateStore {
    fn apply(&self, changes: &ChangeSet) -> StorageResult<()> {
        let mut batch = Batch::new();
        for (id, state) in &changes.accounts {
            batch.put(cf::ACCOUNTS, id.as_bytes().to_vec(), state.to_bytes());
        }
        for ((id, key), value) in &changes.storage {
            let key = storage_key(id, key);
            match value {
                Some(value) => batch.put(cf::STORAGE, key, value.clone()),
                None => batch.delete(cf::STORAGE, key),
            }
        }
        tracing::debug!(ops = batch.len(), "writing change set");
        self.db.write_batch(batch)
    }

    fn put_code(&self, code: Vec<u8>) -> StorageResult<H256> {
        let hash = sha256(&code);
        self.db.put(cf::CODE, hash.as_bytes(), &code)?;
        Ok(hash)
    }
}
