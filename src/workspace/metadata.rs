//! The plaintext workspace metadata file. Safe to expose; it carries the KDF
//! salt and cost parameters but no secrets.

use std::path::{Path, PathBuf};

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::crypto::aead::NONCE_LEN;
use crate::crypto::kdf::{Argon2Params, SALT_LEN};
use crate::error::{CoreError, CoreResult};
use crate::vault::fs;

pub const WORKSPACE_VERSION: u32 = 2;
pub const METADATA_FILE: &str = ".witflo-workspace";
pub const KEYRING_FILE: &str = ".witflo-keyring.enc";
pub const VAULTS_DIR: &str = "vaults";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CryptoConfig {
    /// 16 random bytes, base64.
    pub master_key_salt: String,
    pub argon2_params: Argon2Params,
    /// Nonce of the latest keyring encryption, base64. Mirrors the nonce
    /// embedded in `.witflo-keyring.enc`; refreshed on every keyring write.
    pub keyring_nonce: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkspaceMetadata {
    pub version: u32,
    pub workspace_id: Uuid,
    pub created_at: DateTime<Utc>,
    pub crypto: CryptoConfig,
}

impl WorkspaceMetadata {
    pub fn new(salt: &[u8; SALT_LEN], params: Argon2Params, keyring_nonce: &[u8; NONCE_LEN]) -> Self {
        WorkspaceMetadata {
            version: WORKSPACE_VERSION,
            workspace_id: Uuid::new_v4(),
            created_at: Utc::now(),
            crypto: CryptoConfig {
                master_key_salt: BASE64.encode(salt),
                argon2_params: params,
                keyring_nonce: BASE64.encode(keyring_nonce),
            },
        }
    }

    pub fn path(root: &Path) -> PathBuf {
        root.join(METADATA_FILE)
    }

    pub fn exists(root: &Path) -> bool {
        Self::path(root).exists()
    }

    pub fn load(root: &Path) -> CoreResult<Self> {
        let path = Self::path(root);
        let bytes = fs::read_bytes_opt(&path)?
            .ok_or_else(|| CoreError::WorkspaceNotFound(root.to_path_buf()))?;
        let metadata: WorkspaceMetadata = serde_json::from_slice(&bytes)?;
        if metadata.version != WORKSPACE_VERSION {
            return Err(CoreError::UnsupportedVersion {
                found: metadata.version,
                expected: WORKSPACE_VERSION,
            });
        }
        Ok(metadata)
    }

    pub fn store(&self, root: &Path) -> CoreResult<()> {
        let bytes = serde_json::to_vec_pretty(self)?;
        fs::atomic_write(&Self::path(root), &bytes)
    }

    pub fn salt(&self) -> CoreResult<[u8; SALT_LEN]> {
        decode_fixed(&self.crypto.master_key_salt, "master_key_salt")
    }

    pub fn keyring_nonce(&self) -> CoreResult<[u8; NONCE_LEN]> {
        decode_fixed(&self.crypto.keyring_nonce, "keyring_nonce")
    }

    pub fn set_keyring_nonce(&mut self, nonce: &[u8; NONCE_LEN]) {
        self.crypto.keyring_nonce = BASE64.encode(nonce);
    }
}

fn decode_fixed<const N: usize>(encoded: &str, field: &str) -> CoreResult<[u8; N]> {
    let bytes = BASE64
        .decode(encoded)
        .map_err(|e| CoreError::InvalidInput(format!("bad {field}: {e}")))?;
    bytes
        .try_into()
        .map_err(|_| CoreError::InvalidInput(format!("bad {field} length")))
}
