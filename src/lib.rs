//! witflo core: a zero-trust, offline-first notes engine.
//!
//! One workspace directory holds an encrypted keyring and any number of
//! independently-keyed vaults. Every byte that reaches disk is
//! authenticated-encrypted on the local device; the master passphrase is
//! never persisted and all derived key material is zeroized on lock.

pub mod backend;
pub mod crypto;
pub mod error;
pub mod model;
pub mod sync;
pub mod vault;
pub mod watcher;
pub mod workspace;

pub use backend::{BackendStatus, LocalOnlyBackend, PullBatch, PushReport, SyncBackend};
pub use crypto::CryptoService;
pub use error::{CoreError, CoreResult};
pub use model::{Note, NoteMetadata, Notebook, NotebookMetadata, TagRow};
pub use sync::{ApplyOutcome, SyncEngine, SyncReport};
pub use vault::{CacheChange, ChangeKind, Vault, VaultStats};
pub use watcher::{VaultWatcher, WorkspaceEvent, WorkspaceWatcher};
pub use workspace::{
    default_workspace_root, open_workspace, AutoLockConfig, UnlockedWorkspace, VaultInfo,
    WorkspaceState,
};
