use std::path::PathBuf;

use thiserror::Error;
use uuid::Uuid;

use crate::crypto::CryptoError;

/// Crate-wide error taxonomy. Messages never carry secret bytes.
#[derive(Debug, Error)]
pub enum CoreError {
    #[error("invalid input: {0}")]
    InvalidInput(String),
    #[error("no workspace at {}", .0.display())]
    WorkspaceNotFound(PathBuf),
    #[error("workspace already exists at {}", .0.display())]
    WorkspaceAlreadyExists(PathBuf),
    #[error("unsupported workspace version {found} (expected {expected})")]
    UnsupportedVersion { found: u32, expected: u32 },
    /// Keyring decryption failed. Deliberately indistinguishable from a
    /// corrupted keyring file.
    #[error("incorrect master password")]
    InvalidPassphrase,
    #[error("vault {0} not found")]
    VaultNotFound(Uuid),
    #[error("note {0} not found")]
    NoteMissing(Uuid),
    #[error("notebook {0} not found")]
    NotebookMissing(Uuid),
    #[error("corrupted object {0}")]
    CorruptedObject(String),
    #[error("corrupted index at {}", .0.display())]
    CorruptedIndex(PathBuf),
    #[error("operation signature invalid")]
    AuthenticationFailure,
    #[error("i/o error at {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("backend error: {0}")]
    Backend(String),
    #[error("concurrent modification detected")]
    ConcurrentModification,
    #[error("operation cancelled")]
    Cancelled,
    #[error("invariant violated: {0}")]
    InvariantViolated(String),
}

pub type CoreResult<T> = Result<T, CoreError>;

impl CoreError {
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        CoreError::Io {
            path: path.into(),
            source,
        }
    }

    /// Whether a retry at the caller's discretion can reasonably succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, CoreError::Backend(_) | CoreError::Io { .. })
    }
}

impl From<CryptoError> for CoreError {
    fn from(err: CryptoError) -> Self {
        match err {
            CryptoError::AuthenticationFailure => CoreError::AuthenticationFailure,
            CryptoError::ParameterUnreasonable(msg) => CoreError::InvalidInput(msg),
            CryptoError::InvalidKeyLength { expected, found } => CoreError::InvalidInput(format!(
                "bad key length: expected {expected} bytes, found {found}"
            )),
            CryptoError::DisposedSecret => {
                CoreError::InvariantViolated("attempted to read a disposed secret".into())
            }
            CryptoError::EncryptionFailure => {
                CoreError::InvariantViolated("AEAD encryption failed".into())
            }
        }
    }
}

impl From<serde_json::Error> for CoreError {
    fn from(err: serde_json::Error) -> Self {
        CoreError::InvalidInput(format!("malformed JSON: {err}"))
    }
}
