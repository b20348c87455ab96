//! Balance wire form: unsigned big-endian bytes with no leading zeros

use primitive_types::U256;
use thiserror::Error;

/// Balance decoding error
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum BalanceError {
    /// More bytes than a 256-bit integer can hold
    #[error("balance too large: {0} bytes")]
    TooLarge(usize),
}

/// Encode a balance as minimal big-endian bytes.
///
/// Zero encodes to the empty byte string.
pub fn balance_to_bytes(balance: &U256) -> Vec<u8> {
    let mut buf = [0u8; 32];
    balance.to_big_endian(&mut buf);
    let first = buf.iter().position(|b| *b != 0).unwrap_or(32);
    buf[first..].to_vec()
}

/// Decode a balance from big-endian bytes.
///
/// Leading zero bytes are accepted, so any encoding produced by another
/// arbitrary-precision writer reads back to the same value.
pub fn balance_from_bytes(bytes: &[u8]) -> Result<U256, BalanceError> {
    let first = bytes.iter().position(|b| *b != 0).unwrap_or(bytes.len());
    let significant = &bytes[first..];
    if significant.len() > 32 {
        return Err(BalanceError::TooLarge(significant.len()));
    }
    Ok(U256::from_big_endian(significant))
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_zero_is_empty() {
        assert!(balance_to_bytes(&U256::zero()).is_empty());
        assert_eq!(balance_from_bytes(&[]).unwrap(), U256::zero());
    }

    #[test]
    fn test_minimal_encoding() {
        assert_eq!(balance_to_bytes(&U256::from(100u64)), vec![100]);
        assert_eq!(balance_to_bytes(&U256::from(0x0100u64)), vec![0x01, 0x00]);
    }

    #[test]
    fn test_leading_zeros_accepted() {
        assert_eq!(balance_from_bytes(&[0, 0, 0, 7]).unwrap(), U256::from(7u64));
    }

    #[test]
    fn test_max_value() {
        let bytes = balance_to_bytes(&U256::MAX);
        assert_eq!(bytes, vec![0xff; 32]);
        assert_eq!(balance_from_bytes(&bytes).unwrap(), U256::MAX);
    }

    #[test]
    fn test_too_large() {
        assert_eq!(
            balance_from_bytes(&[1u8; 33]),
            Err(BalanceError::TooLarge(33))
        );
    }

    proptest! {
        #[test]
        fn prop_balance_roundtrip(words in any::<[u64; 4]>()) {
            let value = U256(words);
            let bytes = balance_to_bytes(&value);
            prop_assert!(bytes.first() != Some(&0));
            prop_assert_eq!(balance_from_bytes(&bytes).unwrap(), value);
        }
    }
}
