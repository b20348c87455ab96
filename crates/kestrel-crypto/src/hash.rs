//! SHA-256 hashing

use kestrel_primitives::{AccountId, Address, H256};
use sha2::{Digest, Sha256};

/// Compute the SHA-256 hash of the input data
pub fn sha256(data: &[u8]) -> H256 {
    let mut hasher = Sha256::new();
    hasher.update(data);
    let result = hasher.finalize();
    H256::from_bytes(result.into())
}

/// Derive the state-store account id of an address
pub fn account_id(address: &Address) -> AccountId {
    AccountId::new(sha256(address.as_bytes()))
}
