//! Ed25519 signing for sync operations. Each device holds one signing key;
//! operations carry the verifying key so any replica holding the vault key
//! can check provenance.

use ed25519_dalek::{Signature, Signer, SigningKey, Verifier, VerifyingKey};

use super::CryptoError;

pub const SIGNATURE_LEN: usize = 64;
pub const PUBLIC_KEY_LEN: usize = 32;

pub fn generate_signing_key() -> SigningKey {
    SigningKey::from_bytes(&rand::random())
}

pub fn sign(message: &[u8], key: &SigningKey) -> [u8; SIGNATURE_LEN] {
    key.sign(message).to_bytes()
}

/// Verifies a detached signature. A malformed public key or signature counts
/// as a failed verification, not a distinct error.
pub fn verify(message: &[u8], signature: &[u8], public_key: &[u8]) -> bool {
    let Ok(sig_bytes) = <[u8; SIGNATURE_LEN]>::try_from(signature) else {
        return false;
    };
    let Ok(pk_bytes) = <[u8; PUBLIC_KEY_LEN]>::try_from(public_key) else {
        return false;
    };
    let Ok(verifying) = VerifyingKey::from_bytes(&pk_bytes) else {
        return false;
    };
    verifying
        .verify(message, &Signature::from_bytes(&sig_bytes))
        .is_ok()
}

pub fn signing_key_from_bytes(bytes: &[u8]) -> Result<SigningKey, CryptoError> {
    let arr: [u8; 32] = bytes
        .try_into()
        .map_err(|_| CryptoError::InvalidKeyLength {
            expected: 32,
            found: bytes.len(),
        })?;
    Ok(SigningKey::from_bytes(&arr))
}
