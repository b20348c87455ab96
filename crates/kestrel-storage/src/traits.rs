//! Store traits for state access

use crate::account::AccountState;
use crate::error::StorageResult;
use kestrel_primitives::{AccountId, H256, U256};
use std::collections::BTreeMap;

/// Read access to committed state
pub trait StateReader: Send + Sync {
    /// Get account state by id
    fn get_account_state(&self, id: &AccountId) -> StorageResult<Option<AccountState>>;

    /// Get a contract storage value
    fn get_storage(&self, id: &AccountId, key: &[u8]) -> StorageResult<Option<Vec<u8>>>;

    /// Get contract code by hash
    fn get_code(&self, code_hash: &H256) -> StorageResult<Option<Vec<u8>>>;

    /// Get account state, or an empty state for an unknown account
    fn account_state_or_default(&self, id: &AccountId) -> StorageResult<AccountState> {
        Ok(self.get_account_state(id)?.unwrap_or_default())
    }

    /// Get account balance
    fn get_balance(&self, id: &AccountId) -> StorageResult<U256> {
        Ok(self.get_account_state(id)?.map(|a| a.balance).unwrap_or_default())
    }

    /// Get the code deployed at an account, if any
    fn get_account_code(&self, id: &AccountId) -> StorageResult<Option<Vec<u8>>> {
        match self.get_account_state(id)? {
            Some(state) if state.has_code() => self.get_code(&state.code_hash),
            _ => Ok(None),
        }
    }
}

/// Write access to state
pub trait StateWriter {
    /// Apply the effects of a committed transaction atomically
    fn apply(&self, changes: &ChangeSet) -> StorageResult<()>;

    /// Store contract code, returning its hash
    fn put_code(&self, code: Vec<u8>) -> StorageResult<H256>;
}

/// Effects of one committed transaction
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ChangeSet {
    /// Updated account states
    pub accounts: BTreeMap<AccountId, AccountState>,
    /// Contract storage writes (`None` = deleted)
    pub storage: BTreeMap<(AccountId, Vec<u8>), Option<Vec<u8>>>,
}

impl ChangeSet {
    /// Create an empty change set
    pub fn new() -> Self {
        Self::default()
    }

    /// Check if nothing changed
    pub fn is_empty(&self) -> bool {
        self.accounts.is_empty() && self.storage.is_empty()
    }
}
