//! # kestrel-e2e
//!
//! End-to-end testing framework for the Kestrel execution engine.
//!
//! ## Design Philosophy
//!
//! 1. **Scripted**: Contracts are JSON scripts, no compiler needed
//! 2. **Declarative**: Tests describe WHAT, not HOW
//! 3. **Isolated**: Each test gets a fresh store
//!
//! ## Usage
//!
//! ```ignore
//! cargo test -p kestrel-e2e
//! ```

mod builder;
pub mod contracts;
mod harness;
mod scenarios;

pub use builder::{TxBuilder, TxOutcome};
pub use contracts::{Op, Script, ScriptInterpreter};
pub use harness::{TestAccount, TestHarness};

/// Test result
pub type E2EResult<T> = Result<T, E2EError>;

/// E2E test errors
#[derive(Debug, thiserror::Error)]
pub enum E2EError {
    /// Setup failed
    #[error("setup failed: {0}")]
    Setup(String),

    /// Assertion failed
    #[error("assertion failed: {0}")]
    Assertion(String),

    /// Storage error
    #[error("storage error: {0}")]
    Storage(#[from] kestrel_storage::StorageError),

    /// Engine error outside of contract execution
    #[error("engine error: {0}")]
    Vm(#[from] kestrel_vm::VmError),

    /// Signing error
    #[error("crypto error: {0}")]
    Crypto(#[from] kestrel_crypto::CryptoError),
}
