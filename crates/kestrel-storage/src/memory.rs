//! In-memory state store

use crate::account::AccountState;
use crate::error::StorageResult;
use crate::traits::{ChangeSet, StateReader, StateWriter};
use kestrel_crypto::sha256;
use kestrel_primitives::{AccountId, H256};
use parking_lot::RwLock;
use std::collections::HashMap;

#[derive(Default)]
struct Inner {
    accounts: HashMap<AccountId, AccountState>,
    storage: HashMap<(AccountId, Vec<u8>), Vec<u8>>,
    code: HashMap<H256, Vec<u8>>,
}

/// In-memory store, shared between concurrently executing transactions
#[derive(Default)]
pub struct MemoryStore {
    inner: RwLock<Inner>,
}

impl MemoryStore {
    /// Create a new empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Set an account directly (genesis and tests)
    pub fn set_account(&self, id: AccountId, state: AccountState) {
        self.inner.write().accounts.insert(id, state);
    }

    /// Set a storage value directly (genesis and tests)
    pub fn set_storage(&self, id: AccountId, key: Vec<u8>, value: Vec<u8>) {
        self.inner.write().storage.insert((id, key), value);
    }

    /// Number of known accounts
    pub fn account_count(&self) -> usize {
        self.inner.read().accounts.len()
    }
}

impl StateReader for MemoryStore {
    fn get_account_state(&self, id: &AccountId) -> StorageResult<Option<AccountState>> {
        Ok(self.inner.read().accounts.get(id).cloned())
    }

    fn get_storage(&self, id: &AccountId, key: &[u8]) -> StorageResult<Option<Vec<u8>>> {
        Ok(self.inner.read().storage.get(&(*id, key.to_vec())).cloned())
    }

    fn get_code(&self, code_hash: &H256) -> StorageResult<Option<Vec<u8>>> {
        Ok(self.inner.read().code.get(code_hash).cloned())
    }
}

impl StateWriter for MemoryStore {
    fn apply(&self, changes: &ChangeSet) -> StorageResult<()> {
        let mut inner = self.inner.write();
        for (id, state) in &changes.accounts {
            inner.accounts.insert(*id, state.clone());
        }
        for ((id, key), value) in &changes.storage {
            match value {
                Some(value) => {
                    inner.storage.insert((*id, key.clone()), value.clone());
                }
                None => {
                    inner.storage.remove(&(*id, key.clone()));
                }
            }
        }
        tracing::debug!(
            accounts = changes.accounts.len(),
            storage = changes.storage.len(),
            "applied change set"
        );
        Ok(())
    }

    fn put_code(&self, code: Vec<u8>) -> StorageResult<H256> {
        let hash = sha256(&code);
        self.inner.write().code.insert(hash, code);
        Ok(hash)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kestrel_primitives::U256;
    use std::sync::Arc;
    use std::thread;

    fn id(byte: u8) -> AccountId {
        AccountId::new(H256::from_bytes([byte; 32]))
    }

    #[test]
    fn test_account_roundtrip() {
        let store = MemoryStore::new();
        assert!(store.get_account_state(&id(1)).unwrap().is_none());

        store.set_account(id(1), AccountState::with_balance(U256::from(10u64)));
        assert_eq!(store.get_balance(&id(1)).unwrap(), U256::from(10u64));
        assert_eq!(store.account_count(), 1);
    }

    #[test]
    fn test_apply_change_set() {
        let store = MemoryStore::new();
        store.set_storage(id(1), b"gone".to_vec(), b"x".to_vec());

        let mut changes = ChangeSet::new();
        changes.accounts.insert(id(1), AccountState::with_balance(U256::from(3u64)));
        changes.storage.insert((id(1), b"k".to_vec()), Some(b"v".to_vec()));
        changes.storage.insert((id(1), b"gone".to_vec()), None);
        store.apply(&changes).unwrap();

        assert_eq!(store.get_balance(&id(1)).unwrap(), U256::from(3u64));
        assert_eq!(store.get_storage(&id(1), b"k").unwrap(), Some(b"v".to_vec()));
        assert!(store.get_storage(&id(1), b"gone").unwrap().is_none());
    }

    #[test]
    fn test_put_code_hash() {
        let store = MemoryStore::new();
        let hash = store.put_code(b"code".to_vec()).unwrap();
        assert_eq!(hash, sha256(b"code"));
        assert_eq!(store.get_code(&hash).unwrap(), Some(b"code".to_vec()));
    }

    #[test]
    fn test_concurrent_reads_and_writes() {
        let store = Arc::new(MemoryStore::new());
        let handles: Vec<_> = (0..8u8)
            .map(|i| {
                let store = Arc::clone(&store);
                thread::spawn(move || {
                    store.set_account(id(i), AccountState::with_balance(U256::from(i)));
                    store.get_balance(&id(i)).unwrap()
                })
            })
            .collect();
        for (i, handle) in handles.into_iter().enumerate() {
            assert_eq!(handle.join().unwrap(), U256::from(i));
        }
        assert_eq!(store.account_count(), 8);
    }
}
