//! Scoped container for secret byte strings.
//!
//! Every piece of key material in the workspace lives in a [`SecretBytes`].
//! The contract: reads expose the bytes, disposal overwrites the buffer with
//! zeros exactly once, and any read after disposal fails. Copies are explicit
//! via [`SecretBytes::copy`]; the type deliberately does not implement
//! `Clone`.

use subtle::ConstantTimeEq;
use zeroize::Zeroize;

use super::CryptoError;

pub struct SecretBytes {
    bytes: Vec<u8>,
    disposed: bool,
}

impl SecretBytes {
    pub fn new(bytes: Vec<u8>) -> Self {
        SecretBytes {
            bytes,
            disposed: false,
        }
    }

    pub fn from_slice(bytes: &[u8]) -> Self {
        SecretBytes::new(bytes.to_vec())
    }

    /// Fills a fresh container with `len` CSPRNG bytes.
    pub fn random(len: usize) -> Self {
        use rand::RngCore;
        let mut bytes = vec![0u8; len];
        rand::rng().fill_bytes(&mut bytes);
        SecretBytes::new(bytes)
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    pub fn is_disposed(&self) -> bool {
        self.disposed
    }

    /// Exposes the secret bytes for the duration of the borrow.
    pub fn expose(&self) -> Result<&[u8], CryptoError> {
        if self.disposed {
            return Err(CryptoError::DisposedSecret);
        }
        Ok(&self.bytes)
    }

    /// Explicit copy of the secret material into a new container.
    pub fn copy(&self) -> Result<SecretBytes, CryptoError> {
        Ok(SecretBytes::new(self.expose()?.to_vec()))
    }

    /// Constant-time equality. Containers of different lengths compare
    /// unequal without leaking where they differ.
    pub fn ct_eq(&self, other: &SecretBytes) -> Result<bool, CryptoError> {
        let a = self.expose()?;
        let b = other.expose()?;
        if a.len() != b.len() {
            return Ok(false);
        }
        Ok(a.ct_eq(b).into())
    }

    /// Overwrites the buffer with zeros and marks the container disposed.
    /// Idempotent; the memory is only zeroized on the first call.
    pub fn dispose(&mut self) {
        if !self.disposed {
            self.bytes.zeroize();
            self.disposed = true;
        }
    }

    #[cfg(test)]
    pub(crate) fn raw_buffer(&self) -> &[u8] {
        &self.bytes
    }
}

impl Drop for SecretBytes {
    fn drop(&mut self) {
        self.dispose();
    }
}

impl std::fmt::Debug for SecretBytes {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SecretBytes")
            .field("len", &self.bytes.len())
            .field("disposed", &self.disposed)
            .finish_non_exhaustive()
    }
}
