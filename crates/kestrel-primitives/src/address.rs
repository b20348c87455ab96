//! Native account address (33 bytes) and the account id derived from it

use crate::hash::H256;
use std::fmt;
use thiserror::Error;

/// Address parsing error
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AddressError {
    /// Invalid hex string
    #[error("invalid hex string: {0}")]
    InvalidHex(String),
    /// Invalid length
    #[error("invalid address length: expected 33 bytes, got {0}")]
    InvalidLength(usize),
    /// Invalid encoded length
    #[error("invalid encoded address length: expected 66 characters, got {0}")]
    InvalidEncodedLength(usize),
}

/// Native 33-byte address.
///
/// Account addresses are SEC1 compressed secp256k1 public keys; contract
/// addresses use the same width. The string form is the lowercase hex of the
/// 33 bytes without a prefix, so every encoded address is exactly
/// [`Address::ENCODED_LEN`] characters long.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct Address([u8; 33]);

impl Address {
    /// Size of address in bytes
    pub const LEN: usize = 33;

    /// Length of the encoded string form
    pub const ENCODED_LEN: usize = 66;

    /// Zero address
    pub const ZERO: Address = Address([0u8; 33]);

    /// Create address from bytes
    pub const fn from_bytes(bytes: [u8; 33]) -> Self {
        Address(bytes)
    }

    /// Create address from slice
    pub fn from_slice(slice: &[u8]) -> Result<Self, AddressError> {
        if slice.len() != Self::LEN {
            return Err(AddressError::InvalidLength(slice.len()));
        }
        let mut bytes = [0u8; 33];
        bytes.copy_from_slice(slice);
        Ok(Address(bytes))
    }

    /// Decode the native string form
    pub fn decode(s: &str) -> Result<Self, AddressError> {
        if s.len() != Self::ENCODED_LEN {
            return Err(AddressError::InvalidEncodedLength(s.len()));
        }
        let bytes = hex::decode(s).map_err(|e| AddressError::InvalidHex(e.to_string()))?;
        Self::from_slice(&bytes)
    }

    /// Encode to the native string form
    pub fn encode(&self) -> String {
        hex::encode(self.0)
    }

    /// Get as byte slice
    pub fn as_bytes(&self) -> &[u8; 33] {
        &self.0
    }

    /// Check if this is the zero address
    pub fn is_zero(&self) -> bool {
        self.0 == [0u8; 33]
    }
}

impl Default for Address {
    fn default() -> Self {
        Self::ZERO
    }
}

impl fmt::Debug for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Address({})", self.encode())
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.encode())
    }
}

impl From<[u8; 33]> for Address {
    fn from(bytes: [u8; 33]) -> Self {
        Address(bytes)
    }
}

impl AsRef<[u8]> for Address {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

/// Identity of an account inside the state store.
///
/// Derived from an [`Address`] by hashing (see `kestrel_crypto::account_id`).
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default, PartialOrd, Ord)]
pub struct AccountId(H256);

impl AccountId {
    /// Wrap a hash as an account id
    pub const fn new(hash: H256) -> Self {
        AccountId(hash)
    }

    /// Underlying hash
    pub fn as_hash(&self) -> &H256 {
        &self.0
    }

    /// Raw bytes
    pub fn as_bytes(&self) -> &[u8; 32] {
        self.0.as_bytes()
    }

    /// Short hex form used in savepoint and database names
    pub fn short_hex(&self) -> String {
        hex::encode(&self.0.as_bytes()[..8])
    }
}

impl fmt::Debug for AccountId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "AccountId({})", self.0.to_hex())
    }
}

impl fmt::Display for AccountId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", hex::encode(self.0.as_bytes()))
    }
}
