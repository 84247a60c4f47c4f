//! Authenticated encryption with XChaCha20-Poly1305.
//!
//! Every persisted ciphertext in the workspace uses the same framing:
//! `nonce(24) ‖ body ‖ tag(16)`. Nonces are 24 random bytes from the CSPRNG
//! per encryption; no counter is kept.

use chacha20poly1305::aead::{Aead, KeyInit, Payload};
use chacha20poly1305::{Key, XChaCha20Poly1305, XNonce};

use super::CryptoError;

pub const NONCE_LEN: usize = 24;
pub const TAG_LEN: usize = 16;

/// Encrypts `plaintext` with `aad` bound into the tag but not encrypted.
pub fn seal(key: &[u8; 32], plaintext: &[u8], aad: &[u8]) -> Result<Vec<u8>, CryptoError> {
    let nonce_bytes: [u8; NONCE_LEN] = rand::random();
    seal_with_nonce(key, &nonce_bytes, plaintext, aad)
}

pub(crate) fn seal_with_nonce(
    key: &[u8; 32],
    nonce: &[u8; NONCE_LEN],
    plaintext: &[u8],
    aad: &[u8],
) -> Result<Vec<u8>, CryptoError> {
    let cipher = XChaCha20Poly1305::new(Key::from_slice(key));
    let body = cipher
        .encrypt(
            XNonce::from_slice(nonce),
            Payload {
                msg: plaintext,
                aad,
            },
        )
        .map_err(|_| CryptoError::EncryptionFailure)?;

    let mut out = Vec::with_capacity(NONCE_LEN + body.len());
    out.extend_from_slice(nonce);
    out.extend_from_slice(&body);
    Ok(out)
}

/// Decrypts a `nonce ‖ body ‖ tag` blob. Any truncation, bit flip, wrong key,
/// or wrong AAD yields [`CryptoError::AuthenticationFailure`] with no further
/// distinction.
pub fn open(key: &[u8; 32], ciphertext: &[u8], aad: &[u8]) -> Result<Vec<u8>, CryptoError> {
    if ciphertext.len() < NONCE_LEN + TAG_LEN {
        return Err(CryptoError::AuthenticationFailure);
    }
    let (nonce, body) = ciphertext.split_at(NONCE_LEN);

    let cipher = XChaCha20Poly1305::new(Key::from_slice(key));
    cipher
        .decrypt(XNonce::from_slice(nonce), Payload { msg: body, aad })
        .map_err(|_| CryptoError::AuthenticationFailure)
}

#[cfg(test)]
mod tests {
    use tracing_test::traced_test;

    use super::*;

    #[test]
    #[traced_test]
    fn roundtrip() {
        let key = [1u8; 32];
        let blob = seal(&key, b"Hello, world!", b"note-id").unwrap();
        assert_eq!(blob.len(), NONCE_LEN + 13 + TAG_LEN);
        let plain = open(&key, &blob, b"note-id").unwrap();
        assert_eq!(plain, b"Hello, world!");
    }

    #[test]
    #[traced_test]
    fn wrong_key_fails() {
        let blob = seal(&[1u8; 32], b"payload", b"").unwrap();
        assert!(matches!(
            open(&[2u8; 32], &blob, b""),
            Err(CryptoError::AuthenticationFailure)
        ));
    }

    #[test]
    #[traced_test]
    fn wrong_aad_fails() {
        let key = [3u8; 32];
        let blob = seal(&key, b"payload", b"aad-a").unwrap();
        assert!(open(&key, &blob, b"aad-b").is_err());
    }

    #[test]
    #[traced_test]
    fn tamper_fails() {
        let key = [4u8; 32];
        let mut blob = seal(&key, b"payload", b"").unwrap();
        let last = blob.len() - 1;
        blob[last] ^= 0x01;
        assert!(open(&key, &blob, b"").is_err());
    }

    #[test]
    #[traced_test]
    fn truncated_fails() {
        let key = [5u8; 32];
        let blob = seal(&key, b"payload", b"").unwrap();
        assert!(open(&key, &blob[..NONCE_LEN + 4], b"").is_err());
        assert!(open(&key, &[], b"").is_err());
    }

    #[test]
    #[traced_test]
    fn nonces_are_unique_per_call() {
        let key = [6u8; 32];
        let a = seal(&key, b"same plaintext", b"").unwrap();
        let b = seal(&key, b"same plaintext", b"").unwrap();
        assert_ne!(a[..NONCE_LEN], b[..NONCE_LEN]);
        assert_ne!(a, b);
    }
}
