//! Cryptographic errors

use thiserror::Error;

/// Cryptographic operation error
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CryptoError {
    /// Signing failed
    #[error("signing failed: {0}")]
    SigningFailed(String),

    /// Message is not valid hex
    #[error("invalid message format: {0}")]
    InvalidMessage(String),

    /// Signature could not be decoded
    #[error("invalid signature: {0}")]
    InvalidSignature(String),

    /// Address could not be decoded
    #[error("invalid address: {0}")]
    InvalidAddress(String),

    /// Address bytes are not a valid public key
    #[error("invalid public key: {0}")]
    InvalidPublicKey(String),

    /// Invalid recovery ID
    #[error("invalid recovery id: {0}")]
    InvalidRecoveryId(u8),

    /// Recovery failed
    #[error("public key recovery failed: {0}")]
    RecoveryFailed(String),

    /// Signature shape cannot be checked against this address form
    #[error("not supported: {0}")]
    Unsupported(&'static str),
}
