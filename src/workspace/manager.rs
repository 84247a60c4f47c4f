//! Workspace lifecycle: initialize, unlock, lock, master-password change,
//! and keyring mutations. The lifecycle is
//! `Uninitialized → Initialized(Locked) ↔ Unlocked → disposed`; an
//! [`UnlockedWorkspace`] handle is the Unlocked state, and locking it (or
//! dropping the last reference) zeroizes the master unlock key and every
//! vault key in the live keyring.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use tracing::info;
use uuid::Uuid;

use crate::crypto::kdf::{Argon2Params, SALT_LEN};
use crate::crypto::keys::{MasterUnlockKey, SymmetricKey, VaultKey};
use crate::crypto::secret::SecretBytes;
use crate::crypto::CryptoService;
use crate::error::{CoreError, CoreResult};
use crate::vault::{self, fs, DeviceIdentity, Vault};

use super::autolock::{AutoLock, AutoLockConfig};
use super::keyring::WorkspaceKeyring;
use super::metadata::{WorkspaceMetadata, KEYRING_FILE, VAULTS_DIR};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkspaceState {
    Uninitialized,
    Initialized,
}

/// Probes a directory for a workspace without touching any key material.
pub fn open_workspace(root: &Path) -> WorkspaceState {
    if WorkspaceMetadata::exists(root) {
        WorkspaceState::Initialized
    } else {
        WorkspaceState::Uninitialized
    }
}

#[derive(Debug, Clone)]
pub struct VaultInfo {
    pub vault_id: Uuid,
    pub name: String,
    pub created_at: DateTime<Utc>,
    pub sync_enabled: bool,
}

struct LiveState {
    metadata: WorkspaceMetadata,
    muk: MasterUnlockKey,
    keyring: WorkspaceKeyring,
}

/// Handle owning the decrypted keyring and master unlock key.
pub struct UnlockedWorkspace {
    root: PathBuf,
    crypto: CryptoService,
    state: Mutex<Option<LiveState>>,
    disposed: AtomicBool,
    autolock: Mutex<Option<AutoLock>>,
}

impl UnlockedWorkspace {
    /// Creates a new workspace at `root`. The directory must not already
    /// contain one. Argon2 parameters are benchmarked on this device; the
    /// passphrase container is destroyed before this returns, success or
    /// error.
    pub async fn initialize(
        root: impl Into<PathBuf>,
        passphrase: SecretBytes,
    ) -> CoreResult<Arc<Self>> {
        let crypto = CryptoService::new();
        let params = tokio::task::spawn_blocking(move || crypto.benchmark_argon2())
            .await
            .map_err(|_| CoreError::Cancelled)?;
        Self::initialize_with_params(root, passphrase, params).await
    }

    /// As [`initialize`](Self::initialize) but with explicit Argon2
    /// parameters, skipping the benchmark.
    pub async fn initialize_with_params(
        root: impl Into<PathBuf>,
        passphrase: SecretBytes,
        params: Argon2Params,
    ) -> CoreResult<Arc<Self>> {
        let root = root.into();
        if WorkspaceMetadata::exists(&root) {
            // The passphrase is disposed on drop.
            return Err(CoreError::WorkspaceAlreadyExists(root));
        }
        std::fs::create_dir_all(&root).map_err(|e| CoreError::io(&root, e))?;

        let crypto = CryptoService::new();
        let salt: [u8; SALT_LEN] = rand::random();
        let muk = derive_on_worker(crypto, passphrase, salt, params).await?;

        let keyring = WorkspaceKeyring::new();
        let (nonce, sealed) = keyring.seal(&muk)?;

        let metadata = WorkspaceMetadata::new(&salt, params, &nonce);
        metadata.store(&root)?;
        fs::atomic_write(&root.join(KEYRING_FILE), &sealed)?;
        std::fs::create_dir_all(root.join(VAULTS_DIR))
            .map_err(|e| CoreError::io(root.join(VAULTS_DIR), e))?;

        info!(workspace_id = %metadata.workspace_id, "initialized workspace");
        Ok(Arc::new(UnlockedWorkspace {
            root,
            crypto,
            state: Mutex::new(Some(LiveState {
                metadata,
                muk,
                keyring,
            })),
            disposed: AtomicBool::new(false),
            autolock: Mutex::new(None),
        }))
    }

    /// Unlocks an existing workspace. A wrong passphrase and a corrupted
    /// keyring both surface as [`CoreError::InvalidPassphrase`].
    pub async fn unlock(root: impl Into<PathBuf>, passphrase: SecretBytes) -> CoreResult<Arc<Self>> {
        let root = root.into();
        let crypto = CryptoService::new();
        let metadata = WorkspaceMetadata::load(&root)?;
        let salt = metadata.salt()?;
        let params = metadata.crypto.argon2_params;

        let muk = derive_on_worker(crypto, passphrase, salt, params).await?;

        let sealed = fs::read_bytes(&root.join(KEYRING_FILE))?;
        let keyring = WorkspaceKeyring::open(&sealed, &muk)?;

        info!(workspace_id = %metadata.workspace_id, "unlocked workspace");
        Ok(Arc::new(UnlockedWorkspace {
            root,
            crypto,
            state: Mutex::new(Some(LiveState {
                metadata,
                muk,
                keyring,
            })),
            disposed: AtomicBool::new(false),
            autolock: Mutex::new(None),
        }))
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn is_locked(&self) -> bool {
        self.disposed.load(Ordering::Acquire)
    }

    pub fn workspace_id(&self) -> CoreResult<Uuid> {
        self.with_state(|state| Ok(state.metadata.workspace_id))
    }

    pub fn device_id(&self) -> CoreResult<Uuid> {
        self.with_state(|state| Ok(state.keyring.device.device_id))
    }

    /// Zeroizes the master unlock key and every vault key, then marks the
    /// handle disposed. Idempotent.
    pub fn lock(&self) {
        if self.disposed.swap(true, Ordering::AcqRel) {
            return;
        }
        if let Some(mut state) = self.state.lock().take() {
            state.muk.dispose();
            state.keyring.wipe();
        }
        info!("workspace locked");
    }

    /// Verifies `current`, re-derives under a fresh salt, and re-encrypts
    /// the keyring under the new master unlock key. Vault keys are untouched,
    /// which is what makes this O(keyring) instead of O(vault contents).
    pub async fn change_master_password(
        &self,
        current: SecretBytes,
        new: SecretBytes,
    ) -> CoreResult<()> {
        self.touch();
        let (old_salt, params) = self.with_state(|state| {
            Ok((state.metadata.salt()?, state.metadata.crypto.argon2_params))
        })?;

        let current_muk = derive_on_worker(self.crypto, current, old_salt, params).await?;
        self.with_state(|state| {
            if !state.muk.ct_eq(&current_muk).map_err(CoreError::from)? {
                return Err(CoreError::InvalidPassphrase);
            }
            Ok(())
        })?;

        let new_salt: [u8; SALT_LEN] = rand::random();
        let mut new_muk = derive_on_worker(self.crypto, new, new_salt, params).await?;

        let result = self.with_state(|state| {
            let (nonce, sealed) = state.keyring.seal(&new_muk)?;
            state.metadata.crypto.master_key_salt =
                base64_encode(&new_salt);
            state.metadata.set_keyring_nonce(&nonce);
            state.metadata.store(&self.root)?;
            fs::atomic_write(&self.root.join(KEYRING_FILE), &sealed)?;

            let mut old = std::mem::replace(&mut state.muk, new_muk.copy()?);
            old.dispose();
            info!("master password changed");
            Ok(())
        });
        new_muk.dispose();
        result
    }

    /// Generates a vault key, records it in the keyring, and scaffolds the
    /// vault directory.
    pub fn create_vault(&self, name: &str, sync_enabled: bool) -> CoreResult<Uuid> {
        self.touch();
        let vault_id = Uuid::new_v4();
        let key = VaultKey::generate();

        self.with_state(|state| {
            state.keyring.insert_vault(vault_id, &key, name, sync_enabled)?;
            persist_keyring(&self.root, state)
        })?;
        vault::scaffold(&self.vault_dir(vault_id), vault_id)?;

        info!(%vault_id, "created vault");
        Ok(vault_id)
    }

    /// Drops a vault's key from the keyring. The directory is left in place;
    /// without the key its objects are undecryptable.
    pub fn remove_vault(&self, vault_id: Uuid) -> CoreResult<()> {
        self.touch();
        self.with_state(|state| {
            state.keyring.remove_vault(vault_id)?;
            persist_keyring(&self.root, state)
        })?;
        info!(%vault_id, "removed vault from keyring");
        Ok(())
    }

    pub fn list_vaults(&self) -> CoreResult<Vec<VaultInfo>> {
        self.with_state(|state| {
            Ok(state
                .keyring
                .vaults
                .iter()
                .map(|(&vault_id, entry)| VaultInfo {
                    vault_id,
                    name: entry.name.clone(),
                    created_at: entry.created_at,
                    sync_enabled: entry.sync_enabled,
                })
                .collect())
        })
    }

    /// Opens a vault with a copy of its key. Disposing the returned handle
    /// zeroizes the copy.
    pub fn open_vault(&self, vault_id: Uuid) -> CoreResult<Vault> {
        self.touch();
        let (key, device) = self.with_state(|state| {
            let key = state.keyring.vault_key(vault_id)?;
            let device = DeviceIdentity {
                device_id: state.keyring.device.device_id,
                signing_key: state.keyring.signing_key()?,
            };
            Ok((key, device))
        })?;
        Vault::open(self.vault_dir(vault_id), vault_id, key, device, self.crypto)
    }

    /// Arms the idle auto-lock timer for this handle.
    pub fn enable_auto_lock(self: &Arc<Self>, config: AutoLockConfig) {
        let autolock = AutoLock::spawn(Arc::downgrade(self), config);
        *self.autolock.lock() = Some(autolock);
    }

    /// Host signal: application moved to the background.
    pub fn on_background(&self) {
        if let Some(autolock) = self.autolock.lock().as_ref() {
            autolock.on_background();
        }
    }

    pub(crate) fn vault_dir(&self, vault_id: Uuid) -> PathBuf {
        self.root.join(VAULTS_DIR).join(vault_id.to_string())
    }

    fn touch(&self) {
        if let Some(autolock) = self.autolock.lock().as_ref() {
            autolock.reset();
        }
    }

    fn with_state<T>(&self, f: impl FnOnce(&mut LiveState) -> CoreResult<T>) -> CoreResult<T> {
        let mut guard = self.state.lock();
        let state = guard
            .as_mut()
            .ok_or_else(|| CoreError::InvariantViolated("workspace handle used after lock".into()))?;
        f(state)
    }
}

impl Drop for UnlockedWorkspace {
    fn drop(&mut self) {
        self.lock();
    }
}

fn persist_keyring(root: &Path, state: &mut LiveState) -> CoreResult<()> {
    let (nonce, sealed) = state.keyring.seal(&state.muk)?;
    state.metadata.set_keyring_nonce(&nonce);
    state.metadata.store(root)?;
    fs::atomic_write(&root.join(KEYRING_FILE), &sealed)
}

async fn derive_on_worker(
    crypto: CryptoService,
    passphrase: SecretBytes,
    salt: [u8; SALT_LEN],
    params: Argon2Params,
) -> CoreResult<MasterUnlockKey> {
    tokio::task::spawn_blocking(move || {
        let result = crypto.derive_muk(&passphrase, &salt, &params);
        // The container zeroizes on drop, immediately after derivation.
        drop(passphrase);
        result
    })
    .await
    .map_err(|_| CoreError::Cancelled)?
    .map_err(CoreError::from)
}

fn base64_encode(bytes: &[u8]) -> String {
    use base64::engine::general_purpose::STANDARD;
    use base64::Engine as _;
    STANDARD.encode(bytes)
}
