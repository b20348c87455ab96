//! Recovery log: the undo chain of a transaction
//!
//! Entries live in an arena where the entry at index `i` has sequence number
//! `i + 1` and its predecessor at index `i - 1`. Pushing appends; unwinding
//! walks from the head back to a target sequence number, optionally undoing
//! each entry on the way.
//!
//! Each entry undoes, in order: contract-storage writes since its snapshot,
//! structured-store changes since its savepoint, and the balance transfer it
//! recorded.

use crate::call_state::CallStateId;
use crate::context::ExecutionContext;
use crate::error::{VmError, VmResult};
use kestrel_primitives::U256;
use kestrel_storage::StorageSnapshot;

/// One checkpoint in the recovery log
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RecoveryEntry {
    /// Sequence number, starting at 1
    pub seq: u64,
    /// Amount transferred into `call_state` when the checkpoint was taken
    pub amount: U256,
    /// Account the amount was taken from
    pub sender: Option<CallStateId>,
    /// Call state guarded by this checkpoint
    pub call_state: CallStateId,
    /// Contract-storage position to restore
    pub storage_snapshot: Option<StorageSnapshot>,
    /// Structured-store savepoint opened for this checkpoint
    pub sql_savepoint: Option<String>,
}

/// Arena-backed undo chain
#[derive(Debug, Default)]
pub struct RecoveryLog {
    entries: Vec<RecoveryEntry>,
    /// Never reused, keeps savepoint names unique within the transaction
    next_savepoint: u64,
}

impl RecoveryLog {
    /// Create an empty log
    pub fn new() -> Self {
        Self::default()
    }

    /// Check if a chain is active
    pub fn is_active(&self) -> bool {
        !self.entries.is_empty()
    }

    /// Number of entries in the chain
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Check if the chain is empty
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Sequence number of the head, 0 if empty
    pub fn head_seq(&self) -> u64 {
        self.entries.len() as u64
    }

    /// Sequence number the next entry will get
    pub fn next_seq(&self) -> u64 {
        self.head_seq() + 1
    }

    /// Get an entry by sequence number
    pub fn get(&self, seq: u64) -> Option<&RecoveryEntry> {
        let index = usize::try_from(seq).ok()?.checked_sub(1)?;
        self.entries.get(index)
    }

    /// Entries from root to head
    pub fn entries(&self) -> &[RecoveryEntry] {
        &self.entries
    }

    fn savepoint_ordinal(&mut self) -> u64 {
        self.next_savepoint += 1;
        self.next_savepoint
    }

    fn push(&mut self, entry: RecoveryEntry) {
        debug_assert_eq!(entry.seq, self.next_seq());
        self.entries.push(entry);
    }

    fn truncate(&mut self, len: usize) {
        self.entries.truncate(len);
    }
}

impl ExecutionContext {
    /// Push a checkpoint guarding `call_state`.
    ///
    /// `amount` is the value just moved from `sender` into `call_state`. If
    /// the call state has an open read-write connection, a nested savepoint is
    /// opened for the checkpoint; failing to do so poisons the context.
    pub(crate) fn checkpoint(
        &mut self,
        sender: Option<CallStateId>,
        call_state: CallStateId,
        amount: U256,
        with_storage: bool,
    ) -> VmResult<u64> {
        self.ensure_live()?;
        let seq = self.recovery.next_seq();

        let state = self.call_states.get(call_state);
        let storage_snapshot = if with_storage {
            state.storage.as_ref().map(|s| s.snapshot())
        } else {
            None
        };
        let account = state.account;
        let has_sql = state.sql.as_ref().is_some_and(|c| !c.is_read_only());

        let sql_savepoint = if has_sql {
            let name = format!("{}_{}", account.short_hex(), self.recovery.savepoint_ordinal());
            let result = match self.call_states.get_mut(call_state).sql.as_mut() {
                Some(conn) => conn.savepoint(&name),
                None => Ok(()),
            };
            if let Err(e) = result {
                return Err(self.poison(e.into()));
            }
            Some(name)
        } else {
            None
        };

        tracing::debug!(
            "Checkpoint {} for {} (amount {}, savepoint {:?})",
            seq,
            account,
            amount,
            sql_savepoint
        );
        self.recovery.push(RecoveryEntry {
            seq,
            amount,
            sender,
            call_state,
            storage_snapshot,
            sql_savepoint,
        });
        Ok(seq)
    }

    /// Unwind the recovery log down to `seq`.
    ///
    /// With `is_error`, every entry from the head down to `seq` is undone and
    /// removed. Otherwise their effects are kept and the chain is only cut
    /// when `seq` is the root. `seq == 0` is a no-op, matching the 0 returned
    /// by [`ExecutionContext::set_recovery_point`] in query mode.
    pub fn unwind(&mut self, seq: u64, is_error: bool) -> VmResult<()> {
        if seq == 0 {
            return Ok(());
        }
        self.ensure_live()?;
        if self.recovery.get(seq).is_none() {
            let err = VmError::RecoveryMismatch {
                requested: seq,
                head: self.recovery.head_seq(),
            };
            return Err(self.poison(err));
        }
        let target = (seq - 1) as usize;

        if is_error {
            for index in (target..self.recovery.len()).rev() {
                let entry = self.recovery.entries[index].clone();
                if let Err(e) = self.undo(&entry) {
                    return Err(self.poison(e));
                }
            }
        }
        if is_error || target == 0 {
            self.recovery.truncate(target);
        }
        tracing::debug!(
            "Unwound to {} (error: {}, head now {})",
            seq,
            is_error,
            self.recovery.head_seq()
        );
        Ok(())
    }

    fn undo(&mut self, entry: &RecoveryEntry) -> VmResult<()> {
        let state = self.call_states.get_mut(entry.call_state);

        if let Some(snapshot) = entry.storage_snapshot {
            if let Some(storage) = state.storage.as_mut() {
                storage.rollback(snapshot)?;
            }
        }

        match &entry.sql_savepoint {
            Some(name) => {
                let conn = state.sql.as_mut().ok_or_else(|| {
                    VmError::Internal(format!("savepoint {name} without a connection"))
                })?;
                conn.rollback_to(name)?;
            }
            None => {
                // Connection opened after the checkpoint: drop everything it did.
                if let Some(mut conn) = state.sql.take() {
                    if !conn.is_read_only() {
                        conn.rollback_base()?;
                    }
                    conn.rollback()?;
                }
            }
        }

        if !entry.amount.is_zero() {
            if let Some(sender) = entry.sender.filter(|s| *s != entry.call_state) {
                let (from, to) = self.call_states.pair_mut(sender, entry.call_state)?;
                to.cur_state.balance = to
                    .cur_state
                    .balance
                    .checked_sub(entry.amount)
                    .ok_or_else(|| VmError::Internal("undo below zero balance".to_string()))?;
                from.cur_state.balance = from
                    .cur_state
                    .balance
                    .checked_add(entry.amount)
                    .ok_or_else(|| VmError::Internal("undo balance overflow".to_string()))?;
            }
        }
        Ok(())
    }

    /// Checkpoint the current contract's own state. Returns the new sequence
    /// number, or 0 in query mode where nothing can change.
    pub fn set_recovery_point(&mut self) -> VmResult<u64> {
        self.ensure_live()?;
        if self.is_query() {
            return Ok(0);
        }
        let call_state = self.current_frame()?.call_state;
        self.checkpoint(None, call_state, U256::zero(), true)
    }

    /// Release or roll back a checkpoint taken with
    /// [`ExecutionContext::set_recovery_point`]
    pub fn clear_recovery(&mut self, seq: u64, is_error: bool) -> VmResult<()> {
        self.unwind(seq, is_error)
    }

    /// Read-only view of the recovery log
    pub fn recovery_log(&self) -> &RecoveryLog {
        &self.recovery
    }
}
