//! # kestrel-sqlstore
//!
//! Structured-store call-out for the Kestrel execution engine.
//!
//! Every contract account owns one SQLite database. Within a transaction the
//! engine opens at most one [`SqlConnection`] per account:
//!
//! - read-write connections begin a transaction and immediately open a base
//!   savepoint, so later per-call savepoints nest under it
//! - read-only connections (query mode) reject writes and hold no savepoint
//! - an unfinished connection rolls back when dropped
//!
//! ```no_run
//! use kestrel_primitives::{AccountId, H256};
//! use kestrel_sqlstore::{SqlConnection, SqlStoreConfig};
//!
//! let account = AccountId::new(H256::ZERO);
//! let mut conn = SqlConnection::open(&SqlStoreConfig::default(), &account, 0, false)?;
//! conn.connection().execute_batch("CREATE TABLE t (v INTEGER)")?;
//! conn.savepoint("call_1")?;
//! conn.connection().execute("INSERT INTO t VALUES (1)", [])?;
//! conn.rollback_to("call_1")?;
//! conn.commit(10)?;
//! # Ok::<(), kestrel_sqlstore::SqlStoreError>(())
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

mod config;
mod connection;
mod error;

pub use config::SqlStoreConfig;
pub use connection::{SqlConnection, BASE_SAVEPOINT};
pub use error::{SqlStoreError, SqlStoreResult};
