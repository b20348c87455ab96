//! Engine error types

use kestrel_crypto::CryptoError;
use kestrel_primitives::{Address, U256};
use kestrel_sqlstore::SqlStoreError;
use kestrel_storage::StorageError;
use thiserror::Error;

/// Error classes, deciding how far a failure propagates
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorClass {
    /// Malformed input; aborts only the current call
    Input,
    /// Negative result the contract may handle; recovered by unwinding
    Domain,
    /// Persistence failure; fatal to the transaction
    Store,
    /// Engine consistency violation; fatal to the transaction
    Internal,
}

impl ErrorClass {
    /// Check if errors of this class abort the whole transaction
    pub fn is_fatal(&self) -> bool {
        matches!(self, ErrorClass::Store | ErrorClass::Internal)
    }
}

/// Engine errors
#[derive(Debug, Error)]
pub enum VmError {
    // ---- input ----
    /// Address string could not be decoded
    #[error("invalid address: {0}")]
    InvalidAddress(String),

    /// Call arguments are not a JSON array
    #[error("invalid arguments: {0}")]
    InvalidArguments(String),

    /// Target account has no contract code
    #[error("cannot find contract {0}")]
    UnknownContract(Address),

    /// Nested calls went deeper than the configured limit
    #[error("call depth exceeded (max {0})")]
    CallDepthExceeded(usize),

    /// No execution context is registered under the handle
    #[error("unknown service handle {0}")]
    UnknownHandle(u64),

    /// Structured-store handle does not name an open connection
    #[error("no open database connection for {0}")]
    UnknownDbHandle(String),

    /// Engine configuration could not be read
    #[error("invalid config: {0}")]
    Config(String),

    /// Signature verification input was malformed
    #[error(transparent)]
    Crypto(#[from] CryptoError),

    // ---- domain ----
    /// Sender cannot cover the transferred amount
    #[error("insufficient balance {balance} : {amount}")]
    InsufficientBalance {
        /// Sender balance
        balance: U256,
        /// Requested amount
        amount: U256,
    },

    /// Mutation attempted in query mode
    #[error("{0} not permitted in query")]
    PermissionDenied(&'static str),

    /// Contract code raised an error
    #[error("contract failed: {0}")]
    ContractFailed(String),

    /// Contract SQL statement failed
    #[error("query failed: {0}")]
    QueryFailed(#[from] rusqlite::Error),

    // ---- store ----
    /// State store failure
    #[error("storage error: {0}")]
    Storage(#[from] StorageError),

    /// Structured-store failure
    #[error("sql store error: {0}")]
    SqlStore(#[from] SqlStoreError),

    // ---- internal ----
    /// Recovery chain holds no entry with the requested sequence number
    #[error("recovery sequence {requested} not found (head {head})")]
    RecoveryMismatch {
        /// Requested sequence number
        requested: u64,
        /// Sequence number of the chain head, 0 if empty
        head: u64,
    },

    /// Engine invariant violated
    #[error("internal error: {0}")]
    Internal(String),

    /// Context was poisoned by an earlier fatal error
    #[error("context poisoned: {cause}")]
    Poisoned {
        /// Class of the poisoning error
        class: ErrorClass,
        /// Message of the poisoning error
        cause: String,
    },
}

impl VmError {
    /// Classify this error
    pub fn class(&self) -> ErrorClass {
        match self {
            VmError::InvalidAddress(_)
            | VmError::InvalidArguments(_)
            | VmError::UnknownContract(_)
            | VmError::CallDepthExceeded(_)
            | VmError::UnknownHandle(_)
            | VmError::UnknownDbHandle(_)
            | VmError::Config(_)
            | VmError::Crypto(_) => ErrorClass::Input,
            VmError::InsufficientBalance { .. }
            | VmError::PermissionDenied(_)
            | VmError::ContractFailed(_)
            | VmError::QueryFailed(_) => ErrorClass::Domain,
            VmError::Storage(_) | VmError::SqlStore(_) => ErrorClass::Store,
            VmError::RecoveryMismatch { .. } | VmError::Internal(_) => ErrorClass::Internal,
            VmError::Poisoned { class, .. } => *class,
        }
    }

    /// Check if this error aborts the whole transaction
    pub fn is_fatal(&self) -> bool {
        self.class().is_fatal()
    }
}

/// Result type for engine operations
pub type VmResult<T> = Result<T, VmError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_classes() {
        assert_eq!(VmError::InvalidArguments("x".into()).class(), ErrorClass::Input);
        assert_eq!(VmError::UnknownContract(Address::ZERO).class(), ErrorClass::Input);
        assert_eq!(
            VmError::Crypto(CryptoError::InvalidAddress("x".into())).class(),
            ErrorClass::Input
        );
        assert_eq!(
            VmError::InsufficientBalance {
                balance: U256::zero(),
                amount: U256::one()
            }
            .class(),
            ErrorClass::Domain
        );
        assert_eq!(VmError::PermissionDenied("set").class(), ErrorClass::Domain);
        assert_eq!(VmError::Storage(StorageError::NotOpen).class(), ErrorClass::Store);
        assert_eq!(
            VmError::RecoveryMismatch { requested: 3, head: 1 }.class(),
            ErrorClass::Internal
        );
    }

    #[test]
    fn test_fatal_errors() {
        assert!(!VmError::ContractFailed("boom".into()).is_fatal());
        assert!(!VmError::CallDepthExceeded(64).is_fatal());
        assert!(VmError::Storage(StorageError::NotOpen).is_fatal());
        assert!(VmError::Internal("x".into()).is_fatal());
        assert!(VmError::Poisoned {
            class: ErrorClass::Store,
            cause: "db".into()
        }
        .is_fatal());
    }

    #[test]
    fn test_error_messages() {
        let err = VmError::InsufficientBalance {
            balance: U256::from(5u64),
            amount: U256::from(7u64),
        };
        assert_eq!(err.to_string(), "insufficient balance 5 : 7");
        assert_eq!(
            VmError::PermissionDenied("send").to_string(),
            "send not permitted in query"
        );
    }
}
