//! # kestrel-primitives
//!
//! Primitive types for the Kestrel contract execution engine.
//!
//! This crate provides the fundamental data types shared by the storage layer,
//! the signature verifier and the execution engine.

#![warn(missing_docs)]
#![warn(clippy::all)]

mod address;
mod balance;
mod error;
mod hash;

pub use address::{AccountId, Address, AddressError};
pub use balance::{balance_from_bytes, balance_to_bytes, BalanceError};
pub use error::PrimitiveError;
pub use hash::{HashError, H160, H256};

// Re-export primitive-types for U256
pub use primitive_types::U256;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_u256_basic() {
        let a = U256::from(100u64);
        let b = U256::from(200u64);
        assert_eq!(a + b, U256::from(300u64));
    }
}
