//! Journaled per-contract storage view
//!
//! Reads fall through a write cache to the committed store. Every write
//! records the cache entry it replaced, so the view can be restored to any
//! earlier journal position with [`ContractStorage::rollback`].

use crate::account::AccountState;
use crate::error::{StorageError, StorageResult};
use crate::traits::StateReader;
use kestrel_primitives::AccountId;
use std::collections::HashMap;
use std::sync::Arc;

/// Snapshot token: the journal length at the time it was taken
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub struct StorageSnapshot(usize);

impl StorageSnapshot {
    /// Journal position this token restores to
    pub fn position(&self) -> usize {
        self.0
    }
}

struct JournalEntry {
    key: Vec<u8>,
    /// Cache entry before the write; `None` if the key was not cached
    previous: Option<Option<Vec<u8>>>,
}

/// Storage view of one contract account within a transaction
pub struct ContractStorage {
    reader: Arc<dyn StateReader>,
    account: AccountId,
    code: Option<Vec<u8>>,
    dirty: HashMap<Vec<u8>, Option<Vec<u8>>>,
    journal: Vec<JournalEntry>,
}

impl ContractStorage {
    /// Open a view bound to an account state.
    ///
    /// Loads the account's code when the state records a code hash; a
    /// recorded hash with no stored code is an error.
    pub fn open(
        reader: Arc<dyn StateReader>,
        account: AccountId,
        state: &AccountState,
    ) -> StorageResult<Self> {
        let code = if state.has_code() {
            let code = reader
                .get_code(&state.code_hash)?
                .ok_or(StorageError::MissingCode {
                    account,
                    code_hash: state.code_hash,
                })?;
            Some(code)
        } else {
            None
        };
        tracing::debug!(%account, has_code = code.is_some(), "opened contract storage");
        Ok(Self {
            reader,
            account,
            code,
            dirty: HashMap::new(),
            journal: Vec::new(),
        })
    }

    /// Account this view belongs to
    pub fn account(&self) -> &AccountId {
        &self.account
    }

    /// Contract code, if the account has any
    pub fn code(&self) -> Option<&[u8]> {
        self.code.as_deref()
    }

    /// Read a value, preferring pending writes
    pub fn get(&self, key: &[u8]) -> StorageResult<Option<Vec<u8>>> {
        match self.dirty.get(key) {
            Some(value) => Ok(value.clone()),
            None => self.reader.get_storage(&self.account, key),
        }
    }

    /// Write a value
    pub fn set(&mut self, key: Vec<u8>, value: Vec<u8>) {
        self.write(key, Some(value));
    }

    /// Delete a value
    pub fn delete(&mut self, key: Vec<u8>) {
        self.write(key, None);
    }

    fn write(&mut self, key: Vec<u8>, value: Option<Vec<u8>>) {
        let previous = self.dirty.insert(key.clone(), value);
        self.journal.push(JournalEntry { key, previous });
    }

    /// Take a snapshot token of the current journal position
    pub fn snapshot(&self) -> StorageSnapshot {
        StorageSnapshot(self.journal.len())
    }

    /// Undo every write made since `snapshot` was taken
    pub fn rollback(&mut self, snapshot: StorageSnapshot) -> StorageResult<()> {
        if snapshot.0 > self.journal.len() {
            return Err(StorageError::InvalidSnapshot {
                requested: snapshot.0,
                journal: self.journal.len(),
            });
        }
        let undone = self.journal.len() - snapshot.0;
        while self.journal.len() > snapshot.0 {
            let Some(entry) = self.journal.pop() else {
                break;
            };
            match entry.previous {
                Some(previous) => {
                    self.dirty.insert(entry.key, previous);
                }
                None => {
                    self.dirty.remove(&entry.key);
                }
            }
        }
        tracing::debug!(account = %self.account, undone, "rolled back contract storage");
        Ok(())
    }

    /// Pending writes, `None` marking a deletion
    pub fn writes(&self) -> impl Iterator<Item = (&Vec<u8>, &Option<Vec<u8>>)> {
        self.dirty.iter()
    }

    /// Check if there are no pending writes
    pub fn is_clean(&self) -> bool {
        self.dirty.is_empty()
    }
}

impl std::fmt::Debug for ContractStorage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ContractStorage")
            .field("account", &self.account)
            .field("has_code", &self.code.is_some())
            .field("dirty", &self.dirty.len())
            .field("journal", &self.journal.len())
            .finish()
    }
}
