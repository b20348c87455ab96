//! Interpreter boundary
//!
//! The engine does not execute contract code itself. It hands the code of
//! the target contract to an [`Interpreter`] together with the current
//! [`ExecutionContext`], through which the contract calls back into the
//! engine. Nested calls re-enter synchronously on the same thread.

use crate::context::ExecutionContext;
use crate::error::{VmError, VmResult};
use kestrel_primitives::{Address, U256};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;

/// How a contract was entered
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CallKind {
    /// Transaction entry point
    Root,
    /// Call with its own frame and storage
    Call,
    /// Borrowed code running against the caller's frame and storage
    Delegate,
}

/// Decoded invocation handed to the interpreter
#[derive(Clone, Debug, PartialEq)]
pub struct CallInfo {
    /// Contract whose code runs
    pub contract: Address,
    /// Function name
    pub function: String,
    /// Decoded argument list
    pub args: Vec<Value>,
    /// Value attached to the call
    pub amount: U256,
    /// Entry kind
    pub kind: CallKind,
}

/// Decode a JSON-array argument list
pub fn decode_args(args: &str) -> VmResult<Vec<Value>> {
    if args.trim().is_empty() {
        return Ok(Vec::new());
    }
    serde_json::from_str(args).map_err(|e| VmError::InvalidArguments(e.to_string()))
}

/// Contract code executor
pub trait Interpreter: Send + Sync {
    /// Run `call.function` of `code`, calling back into `host`
    fn invoke(&self, host: &mut ExecutionContext, code: &[u8], call: &CallInfo)
        -> VmResult<Value>;
}

/// Native contract body
pub type NativeFn = Arc<dyn Fn(&mut ExecutionContext, &CallInfo) -> VmResult<Value> + Send + Sync>;

/// Interpreter dispatching on the contract code to native Rust handlers.
///
/// The code stored for a contract is used as the key, so deploying the same
/// code at several addresses shares one handler.
#[derive(Default, Clone)]
pub struct NativeInterpreter {
    contracts: HashMap<Vec<u8>, NativeFn>,
}

impl NativeInterpreter {
    /// Create an interpreter with no contracts
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a handler for `code`
    pub fn register<F>(&mut self, code: impl Into<Vec<u8>>, handler: F) -> &mut Self
    where
        F: Fn(&mut ExecutionContext, &CallInfo) -> VmResult<Value> + Send + Sync + 'static,
    {
        self.contracts.insert(code.into(), Arc::new(handler));
        self
    }

    /// Builder form of [`NativeInterpreter::register`]
    pub fn with<F>(mut self, code: impl Into<Vec<u8>>, handler: F) -> Self
    where
        F: Fn(&mut ExecutionContext, &CallInfo) -> VmResult<Value> + Send + Sync + 'static,
    {
        self.register(code, handler);
        self
    }

    /// Number of registered contracts
    pub fn len(&self) -> usize {
        self.contracts.len()
    }

    /// Check if no contract is registered
    pub fn is_empty(&self) -> bool {
        self.contracts.is_empty()
    }
}

impl Interpreter for NativeInterpreter {
    fn invoke(
        &self,
        host: &mut ExecutionContext,
        code: &[u8],
        call: &CallInfo,
    ) -> VmResult<Value> {
        let handler = self.contracts.get(code).ok_or_else(|| {
            VmError::ContractFailed(format!("no handler for code of {}", call.contract))
        })?;
        handler(host, call)
    }
}

impl std::fmt::Debug for NativeInterpreter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NativeInterpreter")
            .field("contracts", &self.contracts.len())
            .finish()
    }
}
