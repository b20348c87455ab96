//! ECDSA signature operations using secp256k1

use crate::{sha256, CryptoError};
use k256::ecdsa::signature::hazmat::PrehashSigner;
use k256::ecdsa::{RecoveryId, Signature as K256Signature, SigningKey, VerifyingKey};
use kestrel_primitives::{Address, H160};

/// Header byte offset of the native recoverable layout
pub(crate) const COMPACT_HEADER_BASE: u8 = 27;

/// Header flag marking a compressed public key in the native layout
pub(crate) const COMPACT_COMPRESSED_FLAG: u8 = 4;

/// ECDSA signature with recovery id, short-form (r || s || v) layout
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Signature {
    /// r component (32 bytes)
    pub r: [u8; 32],
    /// s component (32 bytes)
    pub s: [u8; 32],
    /// recovery id (0 or 1, stored as 27 or 28)
    pub v: u8,
}

/// Public key (33 bytes compressed, or 65 bytes uncompressed)
pub type PublicKey = VerifyingKey;

/// Private key (32 bytes)
pub type PrivateKey = SigningKey;

impl Signature {
    /// Create signature from r, s, v components
    pub fn new(r: [u8; 32], s: [u8; 32], v: u8) -> Self {
        Signature { r, s, v }
    }

    /// Get recovery ID (0 or 1)
    pub fn recovery_id(&self) -> u8 {
        if self.v >= 27 {
            self.v - 27
        } else {
            self.v
        }
    }

    /// Convert to the 65-byte short-form layout (r || s || v)
    pub fn to_bytes(&self) -> [u8; 65] {
        let mut bytes = [0u8; 65];
        bytes[..32].copy_from_slice(&self.r);
        bytes[32..64].copy_from_slice(&self.s);
        bytes[64] = self.v;
        bytes
    }

    /// Parse from the 65-byte short-form layout
    pub fn from_bytes(bytes: &[u8; 65]) -> Self {
        let mut r = [0u8; 32];
        let mut s = [0u8; 32];
        r.copy_from_slice(&bytes[..32]);
        s.copy_from_slice(&bytes[32..64]);
        Signature { r, s, v: bytes[64] }
    }

    /// Convert to the 65-byte native layout (header || r || s).
    ///
    /// The header is `27 + recovery_id + 4`; native addresses are compressed keys.
    pub fn to_compact(&self) -> [u8; 65] {
        let mut bytes = [0u8; 65];
        bytes[0] = COMPACT_HEADER_BASE + COMPACT_COMPRESSED_FLAG + self.recovery_id();
        bytes[1..33].copy_from_slice(&self.r);
        bytes[33..].copy_from_slice(&self.s);
        bytes
    }

    fn to_k256(&self) -> Result<K256Signature, CryptoError> {
        let r: k256::FieldBytes = self.r.into();
        let s: k256::FieldBytes = self.s.into();
        K256Signature::from_scalars(r, s).map_err(|e| CryptoError::InvalidSignature(e.to_string()))
    }
}

/// Sign a message digest with a private key.
///
/// The digest is used as the ECDSA prehash and must be at least 16 bytes.
pub fn sign(message_hash: &[u8], private_key: &PrivateKey) -> Result<Signature, CryptoError> {
    let (signature, recovery_id) = private_key
        .sign_prehash_recoverable(message_hash)
        .map_err(|e| CryptoError::SigningFailed(e.to_string()))?;

    Ok(Signature {
        r: signature.r().to_bytes().into(),
        s: signature.s().to_bytes().into(),
        v: recovery_id.to_byte() + 27,
    })
}

/// Sign a message digest and return the native recoverable layout
pub fn sign_compact(message_hash: &[u8], private_key: &PrivateKey) -> Result<[u8; 65], CryptoError> {
    Ok(sign(message_hash, private_key)?.to_compact())
}

/// Sign a message digest and return a DER-encoded signature
pub fn sign_der(message_hash: &[u8], private_key: &PrivateKey) -> Result<Vec<u8>, CryptoError> {
    let signature: K256Signature = private_key
        .sign_prehash(message_hash)
        .map_err(|e| CryptoError::SigningFailed(e.to_string()))?;
    Ok(signature.to_der().as_bytes().to_vec())
}

/// Recover public key from signature and message digest
pub fn recover_public_key(
    message_hash: &[u8],
    signature: &Signature,
) -> Result<PublicKey, CryptoError> {
    let k256_sig = signature.to_k256()?;

    let recovery_id = RecoveryId::try_from(signature.recovery_id())
        .map_err(|_| CryptoError::InvalidRecoveryId(signature.recovery_id()))?;

    VerifyingKey::recover_from_prehash(message_hash, &k256_sig, recovery_id)
        .map_err(|e| CryptoError::RecoveryFailed(e.to_string()))
}

/// Derive the native address (compressed SEC1 key) of a public key
pub fn public_key_to_address(public_key: &PublicKey) -> Address {
    let encoded = public_key.to_encoded_point(true);
    let mut bytes = [0u8; 33];
    bytes.copy_from_slice(encoded.as_bytes());
    Address::from_bytes(bytes)
}

/// Derive the short-form address of a public key.
///
/// The uncompressed key without its 0x04 prefix is hashed and the last 20
/// bytes are kept. The hash is SHA-256, not Keccak-256, so these addresses do
/// not match the ones the secondary ecosystem derives for the same key. This
/// derivation is kept as-is for compatibility with existing contracts.
pub fn short_address(public_key: &PublicKey) -> H160 {
    let encoded = public_key.to_encoded_point(false);
    let hash = sha256(&encoded.as_bytes()[1..]);
    let mut addr = [0u8; 20];
    addr.copy_from_slice(&hash.as_bytes()[12..]);
    H160::from_bytes(addr)
}
