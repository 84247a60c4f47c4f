use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{CoreError, CoreResult};

use super::fs;

pub const HEADER_FILE: &str = "vault.header";
pub const VAULT_HEADER_VERSION: u32 = 2;

/// Plaintext vault descriptor. Carries no key material; every vault key
/// lives in the workspace keyring.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VaultHeader {
    pub version: u32,
    pub vault_id: Uuid,
    pub created_at: DateTime<Utc>,
    pub modified_at: DateTime<Utc>,
}

impl VaultHeader {
    pub fn new(vault_id: Uuid) -> Self {
        let now = Utc::now();
        VaultHeader {
            version: VAULT_HEADER_VERSION,
            vault_id,
            created_at: now,
            modified_at: now,
        }
    }

    pub fn path(vault_root: &Path) -> PathBuf {
        vault_root.join(HEADER_FILE)
    }

    pub fn load(vault_root: &Path) -> CoreResult<Self> {
        let bytes = fs::read_bytes_opt(&Self::path(vault_root))?.ok_or_else(|| {
            CoreError::InvalidInput(format!("no vault header under {}", vault_root.display()))
        })?;
        let header: VaultHeader = serde_json::from_slice(&bytes)?;
        if header.version != VAULT_HEADER_VERSION {
            return Err(CoreError::UnsupportedVersion {
                found: header.version,
                expected: VAULT_HEADER_VERSION,
            });
        }
        Ok(header)
    }

    pub fn store(&self, vault_root: &Path) -> CoreResult<()> {
        let bytes = serde_json::to_vec_pretty(self)?;
        fs::atomic_write(&Self::path(vault_root), &bytes)
    }
}
