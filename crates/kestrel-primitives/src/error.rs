//! Common error types for primitives

use crate::address::AddressError;
use crate::balance::BalanceError;
use crate::hash::HashError;
use thiserror::Error;

/// Primitive operation error
#[derive(Debug, Error)]
pub enum PrimitiveError {
    /// Address error
    #[error("address error: {0}")]
    Address(#[from] AddressError),

    /// Hash error
    #[error("hash error: {0}")]
    Hash(#[from] HashError),

    /// Balance encoding error
    #[error("balance error: {0}")]
    Balance(#[from] BalanceError),
}
