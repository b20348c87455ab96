//! Structured-store bridge
//!
//! Each contract gets one SQLite connection per transaction, opened lazily
//! on the first [`ExecutionContext::get_db_handle`] and kept on its call
//! state. Query contexts open it read-only; otherwise it runs inside a
//! transaction with a base savepoint, and recovery checkpoints add nested
//! savepoints on top.

use crate::context::ExecutionContext;
use crate::error::{VmError, VmResult};
use kestrel_primitives::AccountId;
use kestrel_sqlstore::SqlConnection;

/// Handle to the structured-store connection of one contract
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SqlHandle {
    /// Account owning the database
    pub account: AccountId,
    /// Whether the connection rejects writes
    pub read_only: bool,
}

impl ExecutionContext {
    /// Get the current contract's connection, opening it on first use
    pub fn get_db_handle(&mut self) -> VmResult<SqlHandle> {
        self.ensure_live()?;
        let frame = self.current_frame()?.clone();
        let read_only = self.is_query();

        let state = self.call_states.get(frame.call_state);
        let account = state.account;
        if let Some(conn) = &state.sql {
            return Ok(SqlHandle {
                account,
                read_only: conn.is_read_only(),
            });
        }

        let opened = SqlConnection::open(
            &self.config.sql,
            &account,
            frame.sql_recovery_point,
            read_only,
        );
        let conn = match opened {
            Ok(conn) => conn,
            Err(e) => return Err(self.poison(e.into())),
        };
        tracing::debug!(
            "Opened structured store for {} (read only: {}, recovery point {})",
            frame.contract,
            read_only,
            frame.sql_recovery_point
        );
        self.call_states.get_mut(frame.call_state).sql = Some(conn);
        Ok(SqlHandle { account, read_only })
    }

    /// Run `f` against the connection behind `handle`
    pub fn with_sql<T, F>(&mut self, handle: &SqlHandle, f: F) -> VmResult<T>
    where
        F: FnOnce(&rusqlite::Connection) -> rusqlite::Result<T>,
    {
        self.ensure_live()?;
        let conn = self
            .call_states
            .find(&handle.account)
            .and_then(|id| self.call_states.get(id).sql.as_ref())
            .ok_or_else(|| VmError::UnknownDbHandle(handle.account.short_hex()))?;
        Ok(f(conn.connection())?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::Fixture;
    use kestrel_crypto::account_id;
    use kestrel_sqlstore::{SqlStoreConfig, SqlStoreError};

    fn create_table(ctx: &mut ExecutionContext, handle: &SqlHandle) {
        ctx.with_sql(handle, |c| {
            c.execute("CREATE TABLE IF NOT EXISTS t (v INTEGER)", [])
        })
        .unwrap();
    }

    fn count(ctx: &mut ExecutionContext, handle: &SqlHandle) -> i64 {
        ctx.with_sql(handle, |c| {
            c.query_row("SELECT COUNT(*) FROM t", [], |r| r.get(0))
        })
        .unwrap()
    }

    #[test]
    fn test_handle_is_reused() {
        let fx = Fixture::new();
        let mut ctx = fx.root_context(0);
        let a = ctx.get_db_handle().unwrap();
        let b = ctx.get_db_handle().unwrap();
        assert_eq!(a, b);
        assert!(!a.read_only);
    }

    #[test]
    fn test_query_handle_is_read_only() {
        let fx = Fixture::new();
        let mut ctx = fx.query_context();
        let handle = ctx.get_db_handle().unwrap();
        assert!(handle.read_only);
        assert!(matches!(
            ctx.with_sql(&handle, |c| c.execute("CREATE TABLE t (v INTEGER)", [])),
            Err(VmError::QueryFailed(_))
        ));
    }

    #[test]
    fn test_unknown_handle() {
        let fx = Fixture::new();
        let mut ctx = fx.root_context(0);
        let handle = SqlHandle {
            account: AccountId::default(),
            read_only: false,
        };
        assert!(matches!(
            ctx.with_sql(&handle, |_| Ok(())),
            Err(VmError::UnknownDbHandle(_))
        ));
    }

    #[test]
    fn test_checkpoint_rolls_back_sql() {
        let fx = Fixture::new();
        let mut ctx = fx.root_context(0);
        let handle = ctx.get_db_handle().unwrap();
        create_table(&mut ctx, &handle);
        ctx.with_sql(&handle, |c| c.execute("INSERT INTO t VALUES (1)", []))
            .unwrap();

        let seq = ctx.set_recovery_point().unwrap();
        assert!(ctx.recovery_log().get(seq).unwrap().sql_savepoint.is_some());
        ctx.with_sql(&handle, |c| c.execute("INSERT INTO t VALUES (2)", []))
            .unwrap();
        assert_eq!(count(&mut ctx, &handle), 2);

        ctx.unwind(seq, true).unwrap();
        assert_eq!(count(&mut ctx, &handle), 1);
    }

    #[test]
    fn test_connection_opened_after_checkpoint_is_dropped() {
        let fx = Fixture::new();
        let mut ctx = fx.root_context(0);
        let seq = ctx.set_recovery_point().unwrap();
        assert!(ctx.recovery_log().get(seq).unwrap().sql_savepoint.is_none());

        let handle = ctx.get_db_handle().unwrap();
        create_table(&mut ctx, &handle);
        ctx.unwind(seq, true).unwrap();

        assert!(matches!(
            ctx.with_sql(&handle, |_| Ok(())),
            Err(VmError::UnknownDbHandle(_))
        ));
        // reopening starts from a clean database
        let handle = ctx.get_db_handle().unwrap();
        assert!(ctx
            .with_sql(&handle, |c| c.query_row("SELECT COUNT(*) FROM t", [], |r| r.get::<_, i64>(0)))
            .is_err());
    }

    #[test]
    fn test_database_ahead_of_frame_poisons() {
        let dir = tempfile::tempdir().unwrap();
        let mut fx = Fixture::new();
        fx.config.sql = SqlStoreConfig::on_disk(dir.path());
        let account = account_id(&fx.contract);
        SqlConnection::open(&fx.config.sql, &account, 0, false)
            .unwrap()
            .commit(10)
            .unwrap();

        let mut ctx = fx.root_context(0);
        let err = ctx.get_db_handle().unwrap_err();
        assert!(matches!(
            err,
            VmError::SqlStore(SqlStoreError::RecoveryPointAhead {
                committed: 10,
                requested: 0
            })
        ));
        assert!(ctx.is_poisoned());
        assert!(matches!(ctx.get_db_handle(), Err(VmError::Poisoned { .. })));
    }
}
