pub mod autolock;
pub mod keyring;
pub mod manager;
pub mod metadata;

use std::path::PathBuf;

pub use autolock::{AutoLock, AutoLockConfig};
pub use keyring::{VaultKeyEntry, WorkspaceKeyring};
pub use manager::{open_workspace, UnlockedWorkspace, VaultInfo, WorkspaceState};
pub use metadata::{WorkspaceMetadata, KEYRING_FILE, METADATA_FILE, VAULTS_DIR, WORKSPACE_VERSION};

/// Default workspace root: `WITFLO_WORKSPACE` if set, else `.witflo` under
/// the home directory (or the current directory as a last resort). This is
/// the only environment variable the engine recognizes.
pub fn default_workspace_root() -> PathBuf {
    if let Ok(root) = std::env::var("WITFLO_WORKSPACE") {
        return PathBuf::from(root);
    }
    match std::env::var_os("HOME") {
        Some(home) => PathBuf::from(home).join(".witflo"),
        None => PathBuf::from(".witflo"),
    }
}
