//! Per-account SQLite connection with nested savepoints

use crate::config::SqlStoreConfig;
use crate::error::{SqlStoreError, SqlStoreResult};
use kestrel_primitives::AccountId;
use rusqlite::{Connection, OpenFlags, OptionalExtension};
use std::time::Duration;

/// Name of the savepoint opened when a read-write connection begins
pub const BASE_SAVEPOINT: &str = "kestrel_base";

const META_TABLE: &str = "kestrel_meta";

/// An open structured-store connection scoped to one account
pub struct SqlConnection {
    conn: Connection,
    account: AccountId,
    read_only: bool,
    recovery_point: u64,
    /// Open savepoints, base first
    savepoints: Vec<String>,
    /// Recovery point recorded by `prepare`, awaiting the final commit
    prepared: Option<u64>,
    finished: bool,
}

fn quote(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

impl SqlConnection {
    /// Open the account's database against `recovery_point`.
    ///
    /// A read-write connection begins a transaction and opens the base
    /// savepoint. A read-only connection rejects every write statement and
    /// never creates the database; an account without one reads as empty.
    ///
    /// Fails with [`SqlStoreError::RecoveryPointAhead`] if the database was
    /// committed past `recovery_point`.
    pub fn open(
        config: &SqlStoreConfig,
        account: &AccountId,
        recovery_point: u64,
        read_only: bool,
    ) -> SqlStoreResult<Self> {
        let conn = match &config.data_dir {
            Some(dir) => {
                let path = dir.join(format!("{account}.db"));
                if !read_only {
                    std::fs::create_dir_all(dir)?;
                    Connection::open(path)?
                } else if path.exists() {
                    Connection::open_with_flags(
                        path,
                        OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX,
                    )?
                } else {
                    Connection::open_in_memory()?
                }
            }
            None => Connection::open_in_memory()?,
        };
        conn.busy_timeout(Duration::from_millis(config.busy_timeout_ms))?;

        let mut sql = Self {
            conn,
            account: *account,
            read_only,
            recovery_point,
            savepoints: Vec::new(),
            prepared: None,
            finished: false,
        };

        let committed = sql.committed_recovery_point()?;
        if committed > recovery_point {
            tracing::error!(
                account = %sql.account,
                committed,
                recovery_point,
                "sql database is ahead of the account's recovery point"
            );
            return Err(SqlStoreError::RecoveryPointAhead {
                committed,
                requested: recovery_point,
            });
        }

        if read_only {
            sql.conn.execute_batch("PRAGMA query_only = ON")?;
        } else {
            sql.conn.execute_batch("BEGIN")?;
            sql.conn.execute_batch(&format!(
                "CREATE TABLE IF NOT EXISTS {META_TABLE} (
                    id INTEGER PRIMARY KEY CHECK (id = 0),
                    recovery_point INTEGER NOT NULL
                )"
            ))?;
            sql.savepoint(BASE_SAVEPOINT)?;
        }

        tracing::debug!(
            account = %sql.account,
            read_only,
            recovery_point,
            "opened sql connection"
        );
        Ok(sql)
    }

    /// Underlying connection, for contract queries
    pub fn connection(&self) -> &Connection {
        &self.conn
    }

    /// Account this connection belongs to
    pub fn account(&self) -> &AccountId {
        &self.account
    }

    /// Check if connection rejects writes
    pub fn is_read_only(&self) -> bool {
        self.read_only
    }

    /// Recovery point the connection was opened against
    pub fn recovery_point(&self) -> u64 {
        self.recovery_point
    }

    /// Recovery point recorded by the last commit, 0 if none
    pub fn committed_recovery_point(&self) -> SqlStoreResult<u64> {
        let exists: bool = self.conn.query_row(
            "SELECT COUNT(*) > 0 FROM sqlite_master WHERE type = 'table' AND name = ?1",
            [META_TABLE],
            |row| row.get(0),
        )?;
        if !exists {
            return Ok(0);
        }
        let point: Option<i64> = self
            .conn
            .query_row(
                &format!("SELECT recovery_point FROM {META_TABLE} WHERE id = 0"),
                [],
                |row| row.get(0),
            )
            .optional()?;
        Ok(point.map(|p| p as u64).unwrap_or(0))
    }

    /// Names of open savepoints, base first
    pub fn savepoints(&self) -> &[String] {
        &self.savepoints
    }

    /// Open a nested savepoint
    pub fn savepoint(&mut self, name: &str) -> SqlStoreResult<()> {
        if self.read_only {
            return Err(SqlStoreError::ReadOnly);
        }
        if self.savepoints.iter().any(|s| s == name) {
            return Err(SqlStoreError::DuplicateSavepoint(name.to_string()));
        }
        self.conn.execute_batch(&format!("SAVEPOINT {}", quote(name)))?;
        self.savepoints.push(name.to_string());
        Ok(())
    }

    /// Roll back to a savepoint and remove it, along with every savepoint
    /// opened after it. Rolling back the base savepoint keeps it open.
    pub fn rollback_to(&mut self, name: &str) -> SqlStoreResult<()> {
        let pos = self
            .savepoints
            .iter()
            .rposition(|s| s == name)
            .ok_or_else(|| SqlStoreError::UnknownSavepoint(name.to_string()))?;
        let quoted = quote(name);
        self.conn.execute_batch(&format!("ROLLBACK TO {quoted}"))?;
        if pos == 0 {
            self.savepoints.truncate(1);
        } else {
            self.conn.execute_batch(&format!("RELEASE {quoted}"))?;
            self.savepoints.truncate(pos);
        }
        tracing::debug!(account = %self.account, savepoint = name, "rolled back savepoint");
        Ok(())
    }

    /// Roll back everything done through this connection
    pub fn rollback_base(&mut self) -> SqlStoreResult<()> {
        self.rollback_to(BASE_SAVEPOINT)
    }

    /// Release every savepoint and record `recovery_point`, leaving only the
    /// outer transaction to commit. A prepared connection can still be rolled
    /// back.
    pub fn prepare(&mut self, recovery_point: u64) -> SqlStoreResult<()> {
        if self.read_only {
            return Err(SqlStoreError::ReadOnly);
        }
        if self.prepared.is_some() {
            return Ok(());
        }
        self.conn
            .execute_batch(&format!("RELEASE {}", quote(BASE_SAVEPOINT)))?;
        self.savepoints.clear();
        self.conn.execute(
            &format!(
                "INSERT INTO {META_TABLE} (id, recovery_point) VALUES (0, ?1)
                 ON CONFLICT(id) DO UPDATE SET recovery_point = excluded.recovery_point"
            ),
            [recovery_point as i64],
        )?;
        self.prepared = Some(recovery_point);
        Ok(())
    }

    /// Commit the transaction, recording `recovery_point` as the new pin
    pub fn commit(mut self, recovery_point: u64) -> SqlStoreResult<()> {
        if self.read_only {
            self.finished = true;
            return Ok(());
        }
        if self.prepared.is_none() {
            self.prepare(recovery_point)?;
        }
        self.conn.execute_batch("COMMIT")?;
        self.finished = true;
        tracing::debug!(account = %self.account, recovery_point, "committed sql connection");
        Ok(())
    }

    /// Abandon the transaction
    pub fn rollback(mut self) -> SqlStoreResult<()> {
        self.finished = true;
        self.abort()
    }

    fn abort(&mut self) -> SqlStoreResult<()> {
        if !self.conn.is_autocommit() {
            self.conn.execute_batch("ROLLBACK")?;
        }
        self.savepoints.clear();
        Ok(())
    }
}

impl Drop for SqlConnection {
    fn drop(&mut self) {
        if self.finished {
            return;
        }
        if let Err(e) = self.abort() {
            tracing::error!(account = %self.account, error = %e, "failed to roll back sql connection");
        }
    }
}

impl std::fmt::Debug for SqlConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqlConnection")
            .field("account", &self.account)
            .field("read_only", &self.read_only)
            .field("recovery_point", &self.recovery_point)
            .field("savepoints", &self.savepoints)
            .field("prepared", &self.prepared)
            .finish()
    }
}
