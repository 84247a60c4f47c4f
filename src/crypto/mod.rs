pub mod aead;
pub mod hash;
pub mod kdf;
pub mod keys;
pub mod secret;
pub mod signing;
pub mod wrap;

use rand::RngCore;
use thiserror::Error;

use self::kdf::{Argon2Params, SALT_LEN};
use self::keys::{MasterUnlockKey, SymmetricKey};
use self::secret::SecretBytes;

#[derive(Debug, Error)]
pub enum CryptoError {
    #[error("authentication failure")]
    AuthenticationFailure,
    #[error("unreasonable parameters: {0}")]
    ParameterUnreasonable(String),
    #[error("invalid key length: expected {expected}, found {found}")]
    InvalidKeyLength { expected: usize, found: usize },
    #[error("secret container already disposed")]
    DisposedSecret,
    #[error("encryption failure")]
    EncryptionFailure,
}

/// `n` bytes from the CSPRNG.
pub fn csprng(n: usize) -> Vec<u8> {
    let mut bytes = vec![0u8; n];
    rand::rng().fill_bytes(&mut bytes);
    bytes
}

/// Entry point to the primitive layer. Constructed once per process and
/// passed explicitly down the stack; there is no global crypto state.
#[derive(Debug, Clone, Copy, Default)]
pub struct CryptoService;

impl CryptoService {
    pub fn new() -> Self {
        CryptoService
    }

    pub fn derive_muk(
        &self,
        passphrase: &SecretBytes,
        salt: &[u8; SALT_LEN],
        params: &Argon2Params,
    ) -> Result<MasterUnlockKey, CryptoError> {
        kdf::derive_muk(passphrase, salt, params)
    }

    /// Device-local Argon2 cost calibration. Blocking for seconds; run it on
    /// a worker thread.
    pub fn benchmark_argon2(&self) -> Argon2Params {
        kdf::benchmark_params()
    }

    pub fn seal<K: SymmetricKey>(
        &self,
        key: &K,
        plaintext: &[u8],
        aad: &[u8],
    ) -> Result<Vec<u8>, CryptoError> {
        key.seal(plaintext, aad)
    }

    pub fn open<K: SymmetricKey>(
        &self,
        key: &K,
        ciphertext: &[u8],
        aad: &[u8],
    ) -> Result<Vec<u8>, CryptoError> {
        key.open(ciphertext, aad)
    }

    pub fn hash(&self, bytes: &[u8]) -> [u8; hash::DIGEST_LEN] {
        hash::blake2b_256(bytes)
    }

    pub fn csprng(&self, n: usize) -> Vec<u8> {
        csprng(n)
    }
}
