//! # kestrel-crypto
//!
//! Cryptographic primitives for Kestrel.
//!
//! - SHA-256 hashing and account id derivation
//! - ECDSA signing (secp256k1) in both signature layouts
//! - Public key recovery
//! - Signature verification against native or short-form addresses

#![warn(missing_docs)]
#![warn(clippy::all)]

mod error;
mod hash;
mod signature;
mod verify;

pub use error::CryptoError;
pub use hash::{account_id, sha256};
pub use signature::{
    public_key_to_address, recover_public_key, short_address, sign, sign_compact, sign_der,
    PrivateKey, PublicKey, Signature,
};
pub use verify::{decode_hex, ec_verify, AddressForm};
