//! Transaction builder for declarative test construction

use kestrel_primitives::{Address, U256};
use kestrel_vm::ErrorClass;
use serde_json::Value;

/// Builder for a contract invocation
#[derive(Clone, Debug)]
pub struct TxBuilder {
    /// Contract to invoke
    pub(crate) contract: Address,
    /// Function name
    pub(crate) function: String,
    /// Arguments
    pub(crate) args: Vec<Value>,
    /// Value attached from the sender
    pub(crate) amount: U256,
    /// Run as a read-only query
    pub(crate) query: bool,
}

impl TxBuilder {
    /// Invoke `function` of `contract`
    pub fn call(contract: Address, function: &str) -> Self {
        Self {
            contract,
            function: function.to_string(),
            args: vec![],
            amount: U256::zero(),
            query: false,
        }
    }

    /// Read-only invocation of `function` of `contract`
    pub fn query(contract: Address, function: &str) -> Self {
        Self {
            query: true,
            ..Self::call(contract, function)
        }
    }

    /// Set the arguments
    pub fn args(mut self, args: Vec<Value>) -> Self {
        self.args = args;
        self
    }

    /// Set the value to attach
    pub fn amount(mut self, amount: u64) -> Self {
        self.amount = U256::from(amount);
        self
    }
}

/// Result of one executed transaction
#[derive(Clone, Debug, PartialEq)]
pub struct TxOutcome {
    /// Return value of the root call
    pub value: Option<Value>,
    /// Error message, if the transaction failed
    pub error: Option<String>,
    /// Class of the failure
    pub error_class: Option<ErrorClass>,
    /// Whether a value transfer failed during execution
    pub transfer_failed: bool,
    /// Whether changes were written to the store
    pub committed: bool,
}

impl TxOutcome {
    /// Check if the transaction succeeded
    pub fn is_success(&self) -> bool {
        self.error.is_none()
    }

    /// Assert the transaction succeeded
    pub fn assert_success(&self) {
        assert!(
            self.is_success(),
            "Expected success but got error: {:?}",
            self.error
        );
    }

    /// Assert the transaction failed with an error of `class`
    pub fn assert_failure(&self, class: ErrorClass) {
        assert!(!self.is_success(), "Expected failure but got {:?}", self.value);
        assert_eq!(self.error_class, Some(class), "error: {:?}", self.error);
        assert!(!self.committed, "Failed transaction must not commit");
    }
}
