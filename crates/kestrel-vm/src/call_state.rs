//! Per-transaction cache of touched accounts

use crate::error::{VmError, VmResult};
use crate::transfer::transfer;
use kestrel_crypto::account_id;
use kestrel_primitives::{AccountId, Address, U256};
use kestrel_sqlstore::SqlConnection;
use kestrel_storage::{AccountState, ContractStorage, StateReader};
use std::collections::HashMap;
use std::sync::Arc;

/// Index of a [`CallState`] inside its [`CallStates`] arena
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CallStateId(usize);

impl CallStateId {
    /// Position in the arena
    pub fn index(&self) -> usize {
        self.0
    }
}

/// One account touched by the transaction
#[derive(Debug)]
pub struct CallState {
    /// Account address
    pub address: Address,
    /// Account id in the state store
    pub account: AccountId,
    /// State before the transaction touched the account
    prev_state: AccountState,
    /// State as mutated by the transaction so far
    pub cur_state: AccountState,
    /// Contract storage view, opened on first call into the account
    pub storage: Option<ContractStorage>,
    /// Structured-store connection, opened on demand
    pub sql: Option<SqlConnection>,
}

impl CallState {
    /// State before the transaction touched the account
    pub fn prev_state(&self) -> &AccountState {
        &self.prev_state
    }

    /// Check if the account state changed during the transaction
    pub fn is_dirty(&self) -> bool {
        self.cur_state != self.prev_state
    }

    /// Contract code, if the storage view is open and the account has code
    pub fn code(&self) -> Option<&[u8]> {
        self.storage.as_ref().and_then(|s| s.code())
    }
}

/// Arena of call states, indexed by account id
#[derive(Debug, Default)]
pub struct CallStates {
    states: Vec<CallState>,
    index: HashMap<AccountId, CallStateId>,
}

impl CallStates {
    /// Create an empty cache
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of cached accounts
    pub fn len(&self) -> usize {
        self.states.len()
    }

    /// Check if no account has been touched
    pub fn is_empty(&self) -> bool {
        self.states.is_empty()
    }

    /// Look up a cached account
    pub fn find(&self, account: &AccountId) -> Option<CallStateId> {
        self.index.get(account).copied()
    }

    /// Look up a cached account by address
    pub fn find_address(&self, address: &Address) -> Option<CallStateId> {
        self.find(&account_id(address))
    }

    /// Get a call state
    pub fn get(&self, id: CallStateId) -> &CallState {
        &self.states[id.0]
    }

    /// Get a call state mutably
    pub fn get_mut(&mut self, id: CallStateId) -> &mut CallState {
        &mut self.states[id.0]
    }

    /// Iterate over every cached call state
    pub fn iter(&self) -> impl Iterator<Item = &CallState> {
        self.states.iter()
    }

    /// Iterate mutably over every cached call state
    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut CallState> {
        self.states.iter_mut()
    }

    /// Return the cached entry for `address`, loading it from the store on
    /// first touch. With `open_storage`, the contract storage view is opened
    /// as well if it is not already.
    pub fn resolve(
        &mut self,
        reader: &Arc<dyn StateReader>,
        address: &Address,
        open_storage: bool,
    ) -> VmResult<CallStateId> {
        let account = account_id(address);
        let id = match self.find(&account) {
            Some(id) => id,
            None => {
                let prev_state = reader.account_state_or_default(&account)?;
                let cur_state = prev_state.clone();
                let id = CallStateId(self.states.len());
                self.states.push(CallState {
                    address: *address,
                    account,
                    prev_state,
                    cur_state,
                    storage: None,
                    sql: None,
                });
                self.index.insert(account, id);
                tracing::debug!("Resolved call state {} for {}", id.0, address);
                id
            }
        };

        let state = &mut self.states[id.0];
        if open_storage && state.storage.is_none() {
            let storage = ContractStorage::open(Arc::clone(reader), account, &state.cur_state)?;
            state.storage = Some(storage);
        }
        Ok(id)
    }

    /// Borrow two distinct call states mutably
    pub fn pair_mut(
        &mut self,
        a: CallStateId,
        b: CallStateId,
    ) -> VmResult<(&mut CallState, &mut CallState)> {
        if a == b {
            return Err(VmError::Internal(format!(
                "call state {} borrowed twice",
                a.0
            )));
        }
        if a.0 < b.0 {
            let (left, right) = self.states.split_at_mut(b.0);
            Ok((&mut left[a.0], &mut right[0]))
        } else {
            let (left, right) = self.states.split_at_mut(a.0);
            Ok((&mut right[0], &mut left[b.0]))
        }
    }

    /// Transfer between two cached accounts. Transfer to the same entry is a
    /// no-op.
    pub fn transfer(&mut self, from: CallStateId, to: CallStateId, amount: U256) -> VmResult<()> {
        if from == to {
            return Ok(());
        }
        let (sender, receiver) = self.pair_mut(from, to)?;
        transfer(&mut sender.cur_state, &mut receiver.cur_state, amount)
    }
}
