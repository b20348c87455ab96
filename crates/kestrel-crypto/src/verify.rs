//! Signature verification against native or short-form addresses
//!
//! The address form is chosen by the literal length of the address string and
//! the signature shape by its byte length:
//!
//! | signature | native address | short address |
//! |---|---|---|
//! | 65 bytes, recoverable | recover, compare keys | normalize layout, recover, compare hashed key |
//! | DER | verify against the key | unsupported |

use crate::signature::{short_address, Signature, COMPACT_HEADER_BASE};
use crate::{recover_public_key, CryptoError, PublicKey};
use k256::ecdsa::signature::hazmat::PrehashVerifier;
use k256::ecdsa::Signature as K256Signature;
use kestrel_primitives::{Address, H160};

/// Length of a recoverable signature in either layout
const RECOVERABLE_SIG_LEN: usize = 65;

/// Shortest digest accepted as an ECDSA prehash
const MIN_DIGEST_LEN: usize = 16;

/// Highest valid header byte of the native recoverable layout
const COMPACT_HEADER_MAX: u8 = COMPACT_HEADER_BASE + 7;

/// Address a signature is checked against
#[derive(Clone, Debug, PartialEq)]
pub enum AddressForm {
    /// Native address: the signer's public key itself
    Native(PublicKey),
    /// Short-form address: trailing 20 bytes of the hashed public key
    Short(H160),
}

impl AddressForm {
    /// Classify and decode an address string
    pub fn parse(address: &str) -> Result<Self, CryptoError> {
        if address.len() == Address::ENCODED_LEN {
            let native =
                Address::decode(address).map_err(|e| CryptoError::InvalidAddress(e.to_string()))?;
            let key = PublicKey::from_sec1_bytes(native.as_bytes())
                .map_err(|e| CryptoError::InvalidPublicKey(e.to_string()))?;
            return Ok(AddressForm::Native(key));
        }
        let bytes = decode_hex(address).map_err(|e| CryptoError::InvalidAddress(e.to_string()))?;
        let short =
            H160::from_slice(&bytes).map_err(|e| CryptoError::InvalidAddress(e.to_string()))?;
        Ok(AddressForm::Short(short))
    }

    fn matches(&self, recovered: &PublicKey) -> bool {
        match self {
            AddressForm::Native(key) => key == recovered,
            AddressForm::Short(addr) => &short_address(recovered) == addr,
        }
    }
}

/// Decode hex with an optional `0x`/`0X` prefix
pub fn decode_hex(s: &str) -> Result<Vec<u8>, hex::FromHexError> {
    let s = s
        .strip_prefix("0x")
        .or_else(|| s.strip_prefix("0X"))
        .unwrap_or(s);
    hex::decode(s)
}

/// Verify a hex-encoded signature over a hex-encoded message digest.
///
/// Returns `Ok(false)` when the inputs are well formed but the signature was
/// not produced by the address's key. Malformed hex, signatures, or addresses
/// are reported as errors.
pub fn ec_verify(message: &str, signature: &str, address: &str) -> Result<bool, CryptoError> {
    let message = decode_hex(message).map_err(|e| CryptoError::InvalidMessage(e.to_string()))?;
    if message.len() < MIN_DIGEST_LEN {
        return Err(CryptoError::InvalidMessage(format!(
            "digest of {} bytes, need at least {MIN_DIGEST_LEN}",
            message.len()
        )));
    }
    let signature =
        decode_hex(signature).map_err(|e| CryptoError::InvalidSignature(e.to_string()))?;
    let form = AddressForm::parse(address)?;

    if signature.len() == RECOVERABLE_SIG_LEN {
        let recoverable = match form {
            AddressForm::Native(_) => from_compact(&signature)?,
            AddressForm::Short(_) => from_short_layout(&signature)?,
        };
        // Only a well-formed signature that recovers no key, or another key,
        // is a failed verification.
        return match recover_public_key(&message, &recoverable) {
            Ok(recovered) => Ok(form.matches(&recovered)),
            Err(CryptoError::RecoveryFailed(_)) => Ok(false),
            Err(e) => Err(e),
        };
    }

    let parsed = K256Signature::from_der(&signature)
        .map_err(|e| CryptoError::InvalidSignature(e.to_string()))?;
    let key = match form {
        AddressForm::Native(key) => key,
        AddressForm::Short(_) => {
            return Err(CryptoError::Unsupported(
                "DER signature against a short-form address",
            ))
        }
    };
    let parsed = parsed.normalize_s().unwrap_or(parsed);
    Ok(key.verify_prehash(&message, &parsed).is_ok())
}

/// Parse the native layout: header || r || s
fn from_compact(bytes: &[u8]) -> Result<Signature, CryptoError> {
    let header = bytes[0];
    if !(COMPACT_HEADER_BASE..=COMPACT_HEADER_MAX).contains(&header) {
        return Err(CryptoError::InvalidSignature(format!(
            "invalid recoverable header byte {header}"
        )));
    }
    let recovery_id = (header - COMPACT_HEADER_BASE) & 0x03;
    let mut r = [0u8; 32];
    let mut s = [0u8; 32];
    r.copy_from_slice(&bytes[1..33]);
    s.copy_from_slice(&bytes[33..65]);
    Ok(Signature::new(r, s, recovery_id))
}

/// Parse the short-form layout: r || s || v, with v either 0/1 or 27/28
fn from_short_layout(bytes: &[u8]) -> Result<Signature, CryptoError> {
    let v = bytes[64];
    let recovery_id = match v {
        0 | 1 => v,
        27 | 28 => v - 27,
        other => return Err(CryptoError::InvalidRecoveryId(other)),
    };
    let mut r = [0u8; 32];
    let mut s = [0u8; 32];
    r.copy_from_slice(&bytes[..32]);
    s.copy_from_slice(&bytes[32..64]);
    Ok(Signature::new(r, s, recovery_id))
}
