//! Fixed-width digests: account ids and code hashes (H256), short-form
//! addresses (H160)

use std::fmt;
use thiserror::Error;

/// Digest decoding error
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("invalid digest length: expected {expected} bytes, got {got}")]
pub struct HashError {
    /// Expected byte length
    pub expected: usize,
    /// Actual byte length
    pub got: usize,
}

fn fixed<const N: usize>(slice: &[u8]) -> Result<[u8; N], HashError> {
    slice.try_into().map_err(|_| HashError {
        expected: N,
        got: slice.len(),
    })
}

/// 256-bit digest
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default, PartialOrd, Ord)]
pub struct H256([u8; 32]);

impl H256 {
    /// All-zero digest, the code hash of an account without code
    pub const ZERO: H256 = H256([0u8; 32]);

    /// Create from bytes
    pub const fn from_bytes(bytes: [u8; 32]) -> Self {
        H256(bytes)
    }

    /// Create from a 32-byte slice
    pub fn from_slice(slice: &[u8]) -> Result<Self, HashError> {
        fixed(slice).map(H256)
    }

    /// Get as bytes
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// Check if zero
    pub fn is_zero(&self) -> bool {
        *self == Self::ZERO
    }

    /// Hex string with 0x prefix
    pub fn to_hex(&self) -> String {
        format!("0x{}", hex::encode(self.0))
    }
}

impl fmt::Debug for H256 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "H256({})", self.to_hex())
    }
}

impl fmt::Display for H256 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

/// 160-bit digest, the width of a short-form address
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default, Debug)]
pub struct H160([u8; 20]);

impl H160 {
    /// Create from bytes
    pub fn from_bytes(bytes: [u8; 20]) -> Self {
        H160(bytes)
    }

    /// Create from a 20-byte slice
    pub fn from_slice(slice: &[u8]) -> Result<Self, HashError> {
        fixed(slice).map(H160)
    }

    /// Get as bytes
    pub fn as_bytes(&self) -> &[u8; 20] {
        &self.0
    }

    /// Hex string with 0x prefix
    pub fn to_hex(&self) -> String {
        format!("0x{}", hex::encode(self.0))
    }
}

impl fmt::Display for H160 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_code_hash_zero() {
        assert!(H256::ZERO.is_zero());
        assert_eq!(H256::default(), H256::ZERO);
        assert!(!H256::from_bytes([1; 32]).is_zero());
    }

    #[test]
    fn test_slice_length_checked() {
        assert_eq!(
            H256::from_slice(&[0u8; 31]).unwrap_err(),
            HashError { expected: 32, got: 31 }
        );
        assert_eq!(
            H160::from_slice(&[0x11; 21]).unwrap_err(),
            HashError { expected: 20, got: 21 }
        );
        assert_eq!(H160::from_slice(&[0x11; 20]).unwrap().as_bytes(), &[0x11; 20]);
    }

    #[test]
    fn test_hex_display() {
        let h = H160::from_bytes([0xff; 20]);
        assert_eq!(h.to_string(), format!("0x{}", "ff".repeat(20)));
        assert_eq!(format!("{:?}", H256::ZERO), format!("H256(0x{})", "00".repeat(32)));
    }
}
