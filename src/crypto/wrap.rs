//! X25519 key wrapping, the hook for future per-vault sharing.
//!
//! Wrap: ephemeral X25519 keypair, Diffie-Hellman against the recipient's
//! public key, HKDF to a symmetric key, then the standard AEAD framing.
//! Blob layout: `ephemeral_pub(32) ‖ nonce(24) ‖ body ‖ tag(16)`.

use curve25519_dalek::montgomery::MontgomeryPoint;

use super::aead;
use super::kdf::hkdf_derive;
use super::keys::KEY_LEN;
use super::secret::SecretBytes;
use super::CryptoError;

const WRAP_INFO: &str = "witflo.wrap.v1";

/// Derives the X25519 public key for a 32-byte secret.
pub fn wrap_public_key(secret: &[u8; 32]) -> [u8; 32] {
    MontgomeryPoint::mul_base_clamped(*secret).to_bytes()
}

pub fn wrap_key(key: &SecretBytes, recipient_public: &[u8; 32]) -> Result<Vec<u8>, CryptoError> {
    let ephemeral: [u8; 32] = rand::random();
    let ephemeral_public = wrap_public_key(&ephemeral);

    let shared = MontgomeryPoint(*recipient_public).mul_clamped(ephemeral);
    let wrapping = wrap_secret_to_key(shared.to_bytes())?;

    let sealed = aead::seal(&wrapping, key.expose()?, &ephemeral_public)?;
    let mut blob = Vec::with_capacity(32 + sealed.len());
    blob.extend_from_slice(&ephemeral_public);
    blob.extend_from_slice(&sealed);
    Ok(blob)
}

pub fn unwrap_key(blob: &[u8], our_secret: &[u8; 32]) -> Result<SecretBytes, CryptoError> {
    if blob.len() < 32 + aead::NONCE_LEN + aead::TAG_LEN {
        return Err(CryptoError::AuthenticationFailure);
    }
    let (ephemeral_public, sealed) = blob.split_at(32);
    let ephemeral_arr: [u8; 32] = ephemeral_public
        .try_into()
        .map_err(|_| CryptoError::AuthenticationFailure)?;

    let shared = MontgomeryPoint(ephemeral_arr).mul_clamped(*our_secret);
    let wrapping = wrap_secret_to_key(shared.to_bytes())?;

    Ok(SecretBytes::new(aead::open(
        &wrapping,
        sealed,
        ephemeral_public,
    )?))
}

fn wrap_secret_to_key(shared: [u8; 32]) -> Result<[u8; KEY_LEN], CryptoError> {
    let okm = hkdf_derive(&shared, WRAP_INFO)?;
    let mut key = [0u8; KEY_LEN];
    key.copy_from_slice(okm.expose()?);
    Ok(key)
}
