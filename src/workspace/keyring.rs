//! The workspace keyring: vault_id → vault key, plus this device's sync
//! signing identity. Exists in plaintext only in RAM; on disk it is a single
//! AEAD blob under the master unlock key.

use std::collections::BTreeMap;

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use chrono::{DateTime, Utc};
use ed25519_dalek::SigningKey;
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use zeroize::Zeroize;

use crate::crypto::aead::NONCE_LEN;
use crate::crypto::keys::{MasterUnlockKey, SymmetricKey, VaultKey};
use crate::crypto::{aead, signing};
use crate::error::{CoreError, CoreResult};

pub const KEYRING_VERSION: u32 = 2;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VaultKeyEntry {
    /// 32 random bytes, base64.
    pub vault_key: String,
    /// User-chosen display name. Lives here rather than in the plaintext
    /// vault header so it is only readable while the workspace is unlocked.
    #[serde(default)]
    pub name: String,
    pub created_at: DateTime<Utc>,
    pub sync_enabled: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeviceKeyEntry {
    pub device_id: Uuid,
    /// Ed25519 seed, base64.
    pub signing_key: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkspaceKeyring {
    pub version: u32,
    pub vaults: BTreeMap<Uuid, VaultKeyEntry>,
    pub device: DeviceKeyEntry,
    pub modified_at: DateTime<Utc>,
}

impl WorkspaceKeyring {
    /// Empty keyring with a fresh device identity.
    pub fn new() -> Self {
        let seed = crate::crypto::csprng(32);
        WorkspaceKeyring {
            version: KEYRING_VERSION,
            vaults: BTreeMap::new(),
            device: DeviceKeyEntry {
                device_id: Uuid::new_v4(),
                signing_key: BASE64.encode(&seed),
                created_at: Utc::now(),
            },
            modified_at: Utc::now(),
        }
    }

    pub fn vault_key(&self, vault_id: Uuid) -> CoreResult<VaultKey> {
        let entry = self
            .vaults
            .get(&vault_id)
            .ok_or(CoreError::VaultNotFound(vault_id))?;
        let mut bytes = BASE64
            .decode(&entry.vault_key)
            .map_err(|e| CoreError::InvalidInput(format!("bad vault key encoding: {e}")))?;
        let arr: [u8; 32] = bytes
            .as_slice()
            .try_into()
            .map_err(|_| CoreError::InvalidInput("bad vault key length".into()))?;
        bytes.zeroize();
        Ok(VaultKey::from_bytes(arr))
    }

    pub fn insert_vault(
        &mut self,
        vault_id: Uuid,
        key: &VaultKey,
        name: &str,
        sync_enabled: bool,
    ) -> CoreResult<()> {
        self.vaults.insert(
            vault_id,
            VaultKeyEntry {
                vault_key: BASE64.encode(key.expose().map_err(CoreError::from)?),
                name: name.to_string(),
                created_at: Utc::now(),
                sync_enabled,
            },
        );
        self.modified_at = Utc::now();
        Ok(())
    }

    pub fn remove_vault(&mut self, vault_id: Uuid) -> CoreResult<()> {
        let mut entry = self
            .vaults
            .remove(&vault_id)
            .ok_or(CoreError::VaultNotFound(vault_id))?;
        entry.vault_key.zeroize();
        self.modified_at = Utc::now();
        Ok(())
    }

    pub fn signing_key(&self) -> CoreResult<SigningKey> {
        let mut bytes = BASE64
            .decode(&self.device.signing_key)
            .map_err(|e| CoreError::InvalidInput(format!("bad signing key encoding: {e}")))?;
        let key = signing::signing_key_from_bytes(&bytes)?;
        bytes.zeroize();
        Ok(key)
    }

    /// Encrypts the keyring under the master unlock key. Returns the nonce
    /// (recorded in the workspace metadata) and the full `nonce ‖ body ‖ tag`
    /// file contents.
    pub fn seal(&self, muk: &MasterUnlockKey) -> CoreResult<([u8; NONCE_LEN], Vec<u8>)> {
        let mut plaintext = serde_json::to_vec(self)?;
        let nonce: [u8; NONCE_LEN] = rand::random();
        let result = aead::seal_with_nonce(muk.expose()?, &nonce, &plaintext, b"");
        plaintext.zeroize();
        Ok((nonce, result?))
    }

    /// Decrypts the keyring file. Any authentication failure is reported as
    /// an incorrect passphrase; a truncated or corrupted keyring is
    /// indistinguishable by design.
    pub fn open(bytes: &[u8], muk: &MasterUnlockKey) -> CoreResult<Self> {
        let muk_bytes = muk.expose().map_err(CoreError::from)?;
        let mut plaintext =
            aead::open(muk_bytes, bytes, b"").map_err(|_| CoreError::InvalidPassphrase)?;
        let keyring: WorkspaceKeyring =
            serde_json::from_slice(&plaintext).map_err(|_| CoreError::InvalidPassphrase)?;
        plaintext.zeroize();
        if keyring.version != KEYRING_VERSION {
            return Err(CoreError::UnsupportedVersion {
                found: keyring.version,
                expected: KEYRING_VERSION,
            });
        }
        Ok(keyring)
    }

    /// Overwrites every key string in place. Called on lock.
    pub fn wipe(&mut self) {
        for entry in self.vaults.values_mut() {
            entry.vault_key.zeroize();
        }
        self.device.signing_key.zeroize();
    }
}

impl Default for WorkspaceKeyring {
    fn default() -> Self {
        Self::new()
    }
}
