//! Account state record

use kestrel_primitives::{balance_from_bytes, balance_to_bytes, H256, U256};

/// Persistent state of one account.
///
/// Byte form: `nonce (8, LE) | balance length (1) | balance (big-endian) |
/// code hash (32) | sql recovery point (8, LE)`.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct AccountState {
    /// Account nonce
    pub nonce: u64,
    /// Account balance
    pub balance: U256,
    /// SHA-256 of the contract code, or zero if the account has no code
    pub code_hash: H256,
    /// Structured-store recovery point the account's database is pinned to
    pub sql_recovery_point: u64,
}

impl AccountState {
    /// Create an account holding only a balance
    pub fn with_balance(balance: U256) -> Self {
        Self {
            balance,
            ..Self::default()
        }
    }

    /// Check if account has code
    pub fn has_code(&self) -> bool {
        !self.code_hash.is_zero()
    }

    /// Serialize account to bytes
    pub fn to_bytes(&self) -> Vec<u8> {
        let balance = balance_to_bytes(&self.balance);
        let mut bytes = Vec::with_capacity(8 + 1 + balance.len() + 32 + 8);
        bytes.extend_from_slice(&self.nonce.to_le_bytes());
        // at most 32 bytes, always fits
        bytes.push(balance.len() as u8);
        bytes.extend_from_slice(&balance);
        bytes.extend_from_slice(self.code_hash.as_bytes());
        bytes.extend_from_slice(&self.sql_recovery_point.to_le_bytes());
        bytes
    }

    /// Deserialize account from bytes
    pub fn from_bytes(bytes: &[u8]) -> Option<Self> {
        if bytes.len() < 9 {
            return None;
        }
        let nonce = u64::from_le_bytes(bytes[0..8].try_into().ok()?);
        let balance_len = bytes[8] as usize;
        if balance_len > 32 || bytes.len() != 9 + balance_len + 32 + 8 {
            return None;
        }
        let rest = &bytes[9..];
        let balance = balance_from_bytes(&rest[..balance_len]).ok()?;
        let code_hash = H256::from_slice(&rest[balance_len..balance_len + 32]).ok()?;
        let sql_recovery_point =
            u64::from_le_bytes(rest[balance_len + 32..].try_into().ok()?);
        Some(Self {
            nonce,
            balance,
            code_hash,
            sql_recovery_point,
        })
    }
}
