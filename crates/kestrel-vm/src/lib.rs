//! # kestrel-vm
//!
//! Execution-state and recovery engine for Kestrel smart contracts.
//!
//! The engine sits between a contract interpreter and the state store. For
//! each transaction it keeps:
//! - a cache of touched accounts ([`CallStates`]) with pending balances,
//!   contract-storage views and structured-store connections
//! - the stack of invocation [`Frame`]s for call and delegate-call
//! - a [`RecoveryLog`] of checkpoints that can be unwound to reverse storage,
//!   structured-store and balance effects of failed nested calls
//!
//! Contract code runs through the [`Interpreter`] trait and calls back into
//! the [`ExecutionContext`], either directly or through typed [`HostCall`]s.
//!
//! ## Example
//!
//! ```no_run
//! use kestrel_primitives::{Address, U256};
//! use kestrel_crypto::account_id;
//! use kestrel_storage::{AccountState, MemoryStore, StateReader, StateWriter};
//! use kestrel_vm::{EngineConfig, ExecutionContext, NativeInterpreter, TxMeta};
//! use std::sync::Arc;
//!
//! let store = Arc::new(MemoryStore::new());
//! let contract = Address::from_bytes([7u8; 33]);
//! let code_hash = store.put_code(b"hello".to_vec()).unwrap();
//! store.set_account(account_id(&contract), AccountState { code_hash, ..Default::default() });
//!
//! let interpreter = NativeInterpreter::new().with("hello", |ctx, _| {
//!     ctx.set_data(b"greeting".to_vec(), b"hi".to_vec())?;
//!     Ok(serde_json::Value::Null)
//! });
//! let reader: Arc<dyn StateReader> = store.clone();
//! let mut ctx = ExecutionContext::new(
//!     reader,
//!     Arc::new(interpreter),
//!     EngineConfig::default(),
//!     TxMeta::new(Address::ZERO),
//!     false,
//! );
//! ctx.invoke_root(&contract, "main", "[]", U256::zero()).unwrap();
//! let changes = ctx.finish(true).unwrap();
//! store.apply(&changes).unwrap();
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

mod call;
mod call_state;
mod config;
mod context;
mod error;
mod frame;
mod host;
mod interpreter;
mod recovery;
mod registry;
mod sql;
mod transfer;

#[cfg(test)]
mod testutil;

pub use call_state::{CallState, CallStateId, CallStates};
pub use config::EngineConfig;
pub use context::{ExecutionContext, TxMeta};
pub use error::{ErrorClass, VmError, VmResult};
pub use frame::Frame;
pub use host::{HostCall, HostReply};
pub use interpreter::{decode_args, CallInfo, CallKind, Interpreter, NativeFn, NativeInterpreter};
pub use recovery::{RecoveryEntry, RecoveryLog};
pub use registry::{ContextLease, ContextRegistry, ServiceHandle};
pub use sql::SqlHandle;
pub use transfer::transfer;
