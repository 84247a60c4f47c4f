use super::aead;
use super::secret::SecretBytes;
use super::CryptoError;

pub const KEY_LEN: usize = 32;

/// Common surface of every 32-byte symmetric key role. The newtypes exist so
/// the compiler rejects, say, a `ContentKey` where a `VaultKey` is required;
/// the trait carries the operations all of them share.
pub trait SymmetricKey: Sized {
    fn from_secret(secret: SecretBytes) -> Result<Self, CryptoError>;
    fn secret(&self) -> &SecretBytes;
    fn secret_mut(&mut self) -> &mut SecretBytes;

    fn from_bytes(bytes: [u8; KEY_LEN]) -> Self {
        // Length is correct by construction.
        Self::from_secret(SecretBytes::new(bytes.to_vec()))
            .unwrap_or_else(|_| unreachable!("fixed-length key"))
    }

    /// Fresh key from the CSPRNG.
    fn generate() -> Self {
        Self::from_bytes(rand::random())
    }

    fn expose(&self) -> Result<&[u8; KEY_LEN], CryptoError> {
        let bytes = self.secret().expose()?;
        <&[u8; KEY_LEN]>::try_from(bytes).map_err(|_| CryptoError::InvalidKeyLength {
            expected: KEY_LEN,
            found: bytes.len(),
        })
    }

    fn copy(&self) -> Result<Self, CryptoError> {
        Self::from_secret(self.secret().copy()?)
    }

    fn dispose(&mut self) {
        self.secret_mut().dispose();
    }

    fn is_disposed(&self) -> bool {
        self.secret().is_disposed()
    }

    fn ct_eq(&self, other: &Self) -> Result<bool, CryptoError> {
        self.secret().ct_eq(other.secret())
    }

    /// AEAD-encrypts `plaintext` under this key. Output is
    /// `nonce(24) ‖ body ‖ tag(16)`.
    fn seal(&self, plaintext: &[u8], aad: &[u8]) -> Result<Vec<u8>, CryptoError> {
        aead::seal(self.expose()?, plaintext, aad)
    }

    /// Decrypts and authenticates a blob produced by [`SymmetricKey::seal`].
    fn open(&self, ciphertext: &[u8], aad: &[u8]) -> Result<Vec<u8>, CryptoError> {
        aead::open(self.expose()?, ciphertext, aad)
    }

    /// HKDF-SHA256 derivation of a subordinate key, domain-separated by
    /// `info`.
    fn derive<K: SymmetricKey>(&self, info: &str) -> Result<K, CryptoError> {
        let okm = super::kdf::hkdf_derive(self.expose()?, info)?;
        K::from_secret(okm)
    }
}

macro_rules! key_type {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        pub struct $name(SecretBytes);

        impl SymmetricKey for $name {
            fn from_secret(secret: SecretBytes) -> Result<Self, CryptoError> {
                let len = secret.len();
                if len != KEY_LEN {
                    return Err(CryptoError::InvalidKeyLength {
                        expected: KEY_LEN,
                        found: len,
                    });
                }
                Ok(Self(secret))
            }

            fn secret(&self) -> &SecretBytes {
                &self.0
            }

            fn secret_mut(&mut self) -> &mut SecretBytes {
                &mut self.0
            }
        }

        impl std::fmt::Debug for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, concat!(stringify!($name), "(…)"))
            }
        }
    };
}

key_type!(
    /// Argon2id output that encrypts the workspace keyring. Lives only in
    /// RAM while the workspace is unlocked.
    MasterUnlockKey
);
key_type!(
    /// Per-vault root key held in the keyring; everything inside a vault is
    /// derived from it.
    VaultKey
);
key_type!(
    /// HKDF product of the vault key for one notebook blob.
    NotebookKey
);
key_type!(
    /// HKDF product of the vault key for one note's content blob.
    ContentKey
);
key_type!(
    /// HKDF product of the vault key for an encrypted metadata index file.
    SearchIndexKey
);
key_type!(
    /// HKDF product of the vault key for the operation log and sync cursor.
    OperationKey
);
