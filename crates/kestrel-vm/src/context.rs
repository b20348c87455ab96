//! Per-transaction execution context

use crate::call_state::{CallStateId, CallStates};
use crate::config::EngineConfig;
use crate::error::{ErrorClass, VmError, VmResult};
use crate::frame::Frame;
use crate::interpreter::Interpreter;
use crate::recovery::RecoveryLog;
use kestrel_crypto::account_id;
use kestrel_primitives::{Address, H256, U256};
use kestrel_storage::{ChangeSet, StateReader};
use std::sync::Arc;

/// Transaction metadata visible to contracts
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct TxMeta {
    /// Transaction sender
    pub sender: Address,
    /// Account that originated the transaction
    pub origin: Address,
    /// Height of the block being built
    pub block_height: u64,
    /// Block timestamp in nanoseconds
    pub timestamp_nanos: u64,
    /// Transaction hash
    pub tx_hash: H256,
}

impl TxMeta {
    /// Metadata for a transaction sent and originated by `sender`
    pub fn new(sender: Address) -> Self {
        Self {
            sender,
            origin: sender,
            ..Self::default()
        }
    }
}

#[derive(Debug)]
struct Poison {
    class: ErrorClass,
    cause: String,
}

/// Execution state of one transaction
pub struct ExecutionContext {
    pub(crate) reader: Arc<dyn StateReader>,
    pub(crate) interpreter: Arc<dyn Interpreter>,
    pub(crate) config: EngineConfig,
    meta: TxMeta,
    query: bool,
    pub(crate) call_states: CallStates,
    pub(crate) frames: Vec<Frame>,
    pub(crate) depth: usize,
    pub(crate) recovery: RecoveryLog,
    transfer_failed: bool,
    poisoned: Option<Poison>,
}

impl ExecutionContext {
    /// Create a context. In query mode every mutation is rejected.
    pub fn new(
        reader: Arc<dyn StateReader>,
        interpreter: Arc<dyn Interpreter>,
        config: EngineConfig,
        meta: TxMeta,
        query: bool,
    ) -> Self {
        Self {
            reader,
            interpreter,
            config,
            meta,
            query,
            call_states: CallStates::new(),
            frames: Vec::new(),
            depth: 0,
            recovery: RecoveryLog::new(),
            transfer_failed: false,
            poisoned: None,
        }
    }

    /// Check if this is a read-only context
    pub fn is_query(&self) -> bool {
        self.query
    }

    /// Transaction metadata
    pub fn meta(&self) -> &TxMeta {
        &self.meta
    }

    /// Engine configuration
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Check if a value transfer has failed during this transaction
    pub fn transfer_failed(&self) -> bool {
        self.transfer_failed
    }

    /// Check if a fatal error has been recorded
    pub fn is_poisoned(&self) -> bool {
        self.poisoned.is_some()
    }

    /// Current call depth
    pub fn depth(&self) -> usize {
        self.depth
    }

    /// Active frames, root first
    pub fn frames(&self) -> &[Frame] {
        &self.frames
    }

    /// Accounts touched so far
    pub fn call_states(&self) -> &CallStates {
        &self.call_states
    }

    /// Frame of the executing contract
    pub fn current_frame(&self) -> VmResult<&Frame> {
        self.frames
            .last()
            .ok_or_else(|| VmError::Internal("no active frame".to_string()))
    }

    /// Fail with the poisoning error if the context is poisoned
    pub(crate) fn ensure_live(&self) -> VmResult<()> {
        match &self.poisoned {
            Some(p) => Err(VmError::Poisoned {
                class: p.class,
                cause: p.cause.clone(),
            }),
            None => Ok(()),
        }
    }

    /// Record `err` as the poisoning error if it is fatal, then hand it back
    pub(crate) fn poison(&mut self, err: VmError) -> VmError {
        if err.is_fatal() && self.poisoned.is_none() {
            tracing::error!("Execution context poisoned: {}", err);
            self.poisoned = Some(Poison {
                class: err.class(),
                cause: err.to_string(),
            });
        }
        err
    }

    pub(crate) fn mark_transfer_failed(&mut self, err: &VmError) {
        tracing::warn!("Transfer failed: {}", err);
        self.transfer_failed = true;
    }

    pub(crate) fn deny(&self, op: &'static str) -> VmError {
        tracing::warn!("{} rejected in query mode", op);
        VmError::PermissionDenied(op)
    }

    /// Resolve an account into the call-state cache
    pub(crate) fn resolve(&mut self, address: &Address, open_storage: bool) -> VmResult<CallStateId> {
        let reader = Arc::clone(&self.reader);
        self.call_states
            .resolve(&reader, address, open_storage)
            .map_err(|e| self.poison(e))
    }

    // ==================== Contract storage ====================

    /// Read a key from the current contract's storage
    pub fn get_data(&mut self, key: &[u8]) -> VmResult<Option<Vec<u8>>> {
        let id = self.current_frame()?.call_state;
        let result = match self.call_states.get(id).storage.as_ref() {
            Some(storage) => storage.get(key).map_err(VmError::from),
            None => Err(VmError::Internal("frame without storage".to_string())),
        };
        result.map_err(|e| self.poison(e))
    }

    /// Write a key in the current contract's storage
    pub fn set_data(&mut self, key: Vec<u8>, value: Vec<u8>) -> VmResult<()> {
        self.ensure_live()?;
        if self.query {
            return Err(self.deny("set"));
        }
        self.current_storage()?.set(key, value);
        Ok(())
    }

    /// Delete a key from the current contract's storage
    pub fn del_data(&mut self, key: Vec<u8>) -> VmResult<()> {
        self.ensure_live()?;
        if self.query {
            return Err(self.deny("delete"));
        }
        self.current_storage()?.delete(key);
        Ok(())
    }

    fn current_storage(&mut self) -> VmResult<&mut kestrel_storage::ContractStorage> {
        let id = self.current_frame()?.call_state;
        self.call_states
            .get_mut(id)
            .storage
            .as_mut()
            .ok_or_else(|| VmError::Internal("frame without storage".to_string()))
    }

    // ==================== Queries ====================

    /// Balance of the current contract, or of `account`.
    ///
    /// Accounts touched by the transaction report their pending balance;
    /// others are read from the store without being cached.
    pub fn get_balance(&mut self, account: Option<&Address>) -> VmResult<U256> {
        let id = match account {
            None => Some(self.current_frame()?.call_state),
            Some(address) => self.call_states.find(&account_id(address)),
        };
        match (id, account) {
            (Some(id), _) => Ok(self.call_states.get(id).cur_state.balance),
            (None, Some(address)) => {
                let result = self.reader.get_balance(&account_id(address));
                result.map_err(|e| self.poison(e.into()))
            }
            (None, None) => Err(VmError::Internal("no active frame".to_string())),
        }
    }

    /// Caller of the current contract
    pub fn sender(&self) -> VmResult<Address> {
        Ok(self.current_frame()?.sender)
    }

    /// Originator of the transaction
    pub fn origin(&self) -> Address {
        self.meta.origin
    }

    /// Transaction hash, hex encoded
    pub fn tx_hash(&self) -> String {
        self.meta.tx_hash.to_hex()
    }

    /// Block height
    pub fn block_height(&self) -> u64 {
        self.meta.block_height
    }

    /// Block timestamp in whole seconds
    pub fn timestamp(&self) -> u64 {
        self.meta.timestamp_nanos / 1_000_000_000
    }

    /// Address of the executing contract
    pub fn contract_id(&self) -> VmResult<Address> {
        Ok(self.current_frame()?.contract)
    }

    /// Value attached to the current call, as a decimal string
    pub fn amount(&self) -> VmResult<String> {
        Ok(self.current_frame()?.amount.to_string())
    }

    /// Log a contract message
    pub fn print(&self, message: &str) {
        let contract = self
            .frames
            .last()
            .map(|f| f.contract.encode())
            .unwrap_or_default();
        tracing::info!(contract = %contract, "{}", message);
    }

    // ==================== Finish ====================

    /// End the transaction.
    ///
    /// On success, commits every read-write structured-store connection,
    /// advancing the account's recovery point to the block height, and
    /// returns the account and storage changes to apply to the store. On
    /// failure, or in query mode, rolls back every connection and returns an
    /// empty change set. A poisoned context always fails.
    pub fn finish(mut self, success: bool) -> VmResult<ChangeSet> {
        if let Some(p) = self.poisoned.take() {
            self.rollback_sql();
            return Err(VmError::Poisoned {
                class: p.class,
                cause: p.cause,
            });
        }
        if !success || self.query {
            self.rollback_sql();
            tracing::debug!("Transaction finished without changes (success: {})", success);
            return Ok(ChangeSet::new());
        }

        let height = self.meta.block_height;
        if let Err(e) = self.prepare_sql(height) {
            self.rollback_sql();
            return Err(e.into());
        }

        let mut changes = ChangeSet::new();
        let mut committed = 0usize;
        let mut failure = None;
        for state in self.call_states.iter_mut() {
            if failure.is_none() {
                if let Some(conn) = state.sql.take() {
                    if conn.is_read_only() {
                        conn.rollback()?;
                    } else {
                        match conn.commit(height) {
                            Ok(()) => {
                                committed += 1;
                                state.cur_state.sql_recovery_point = height;
                            }
                            Err(e) => {
                                tracing::error!(
                                    "Commit of {} failed after {} structured stores committed: {}",
                                    state.account,
                                    committed,
                                    e
                                );
                                failure = Some(e);
                            }
                        }
                    }
                }
            }
            if state.is_dirty() {
                changes.accounts.insert(state.account, state.cur_state.clone());
            }
            if let Some(storage) = &state.storage {
                for (key, value) in storage.writes() {
                    changes
                        .storage
                        .insert((state.account, key.clone()), value.clone());
                }
            }
        }
        if let Some(e) = failure {
            self.rollback_sql();
            return Err(e.into());
        }
        tracing::debug!(
            "Transaction finished: {} accounts, {} storage writes",
            changes.accounts.len(),
            changes.storage.len()
        );
        Ok(changes)
    }

    /// Release the savepoints of every read-write connection
    fn prepare_sql(&mut self, height: u64) -> Result<(), kestrel_sqlstore::SqlStoreError> {
        for state in self.call_states.iter_mut() {
            if let Some(conn) = state.sql.as_mut() {
                if !conn.is_read_only() {
                    conn.prepare(height)?;
                }
            }
        }
        Ok(())
    }

    fn rollback_sql(&mut self) {
        for state in self.call_states.iter_mut() {
            if let Some(conn) = state.sql.take() {
                if let Err(e) = conn.rollback() {
                    tracing::error!("Rollback of {} failed: {}", state.account, e);
                }
            }
        }
    }
}

impl std::fmt::Debug for ExecutionContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExecutionContext")
            .field("meta", &self.meta)
            .field("query", &self.query)
            .field("frames", &self.frames)
            .field("call_states", &self.call_states.len())
            .field("recovery", &self.recovery.len())
            .field("transfer_failed", &self.transfer_failed)
            .field("poisoned", &self.poisoned)
            .finish()
    }
}
