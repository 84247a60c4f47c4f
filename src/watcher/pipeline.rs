//! The reload pipeline behind the OS file watcher.
//!
//! Event flow per changed file: debounce → content-hash dedup → self-write
//! suppression → path-classified reload. Reads that fail (cloud clients
//! often rename a half-written sidecar into place) are retried once after a
//! short delay, then dropped until the next notification.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::Duration;

use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::error::{CoreError, CoreResult};
use crate::sync::apply_external_pending;
use crate::vault::state::WatchState;
use crate::vault::{
    fs, Vault, HEADER_FILE, NOTEBOOKS_INDEX_FILE, NOTES_INDEX_FILE, REFS_DIR, TAGS_INDEX_FILE,
};
use crate::workspace::{KEYRING_FILE, METADATA_FILE, VAULTS_DIR};

use super::debounce::{Debouncer, DEBOUNCE_WINDOW};

pub const RETRY_DELAY: Duration = Duration::from_millis(250);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReloadAction {
    Header,
    NotesIndex,
    NotebooksIndex,
    TagsIndex,
    Cursor,
    PendingOp,
}

/// Maps a changed path inside the vault to its reload action. Temp files
/// from atomic writes and anything outside the watched set return `None`.
pub fn classify(vault_root: &Path, path: &Path) -> Option<ReloadAction> {
    let rel = path.strip_prefix(vault_root).ok()?;
    if path.extension().is_some_and(|ext| ext == "tmp") {
        return None;
    }
    let mut parts = rel.components().map(|c| c.as_os_str().to_str().unwrap_or(""));
    match (parts.next(), parts.next(), parts.next()) {
        (Some(HEADER_FILE), None, None) => Some(ReloadAction::Header),
        (Some(REFS_DIR), Some(NOTES_INDEX_FILE), None) => Some(ReloadAction::NotesIndex),
        (Some(REFS_DIR), Some(NOTEBOOKS_INDEX_FILE), None) => Some(ReloadAction::NotebooksIndex),
        (Some(REFS_DIR), Some(TAGS_INDEX_FILE), None) => Some(ReloadAction::TagsIndex),
        (Some("sync"), Some("cursor.enc"), None) => Some(ReloadAction::Cursor),
        (Some("sync"), Some("pending"), Some(name)) if name.ends_with(".op.enc") => {
            Some(ReloadAction::PendingOp)
        }
        _ => None,
    }
}

/// Recursive watcher over one vault directory, feeding the reload pipeline.
pub struct VaultWatcher {
    _watcher: RecommendedWatcher,
    forward: JoinHandle<()>,
    pipeline: JoinHandle<()>,
}

impl VaultWatcher {
    pub fn spawn(vault: Vault) -> CoreResult<Self> {
        let root = vault.root().to_path_buf();
        let (raw_tx, mut raw_rx) = mpsc::unbounded_channel::<PathBuf>();

        let filter_root = root.clone();
        let mut watcher = notify::recommended_watcher(move |result: Result<Event, notify::Error>| {
            let Ok(event) = result else { return };
            if !matches!(
                event.kind,
                EventKind::Create(_) | EventKind::Modify(_) | EventKind::Any
            ) {
                return;
            }
            for path in event.paths {
                if classify(&filter_root, &path).is_some() {
                    let _ = raw_tx.send(path);
                }
            }
        })
        .map_err(|e| CoreError::Backend(format!("failed to create file watcher: {e}")))?;
        watcher
            .watch(&root, RecursiveMode::Recursive)
            .map_err(|e| CoreError::Backend(format!("failed to watch {}: {e}", root.display())))?;

        let (debouncer, mut debounced_rx) = Debouncer::new(DEBOUNCE_WINDOW);
        let forward = tokio::spawn(async move {
            while let Some(path) = raw_rx.recv().await {
                debouncer.observe(path);
            }
        });

        let pipeline = tokio::spawn(async move {
            while let Some(path) = debounced_rx.recv().await {
                let Some(action) = classify(vault.root(), &path) else {
                    continue;
                };
                handle_with_retry(&vault, action, &path).await;
            }
        });

        Ok(VaultWatcher {
            _watcher: watcher,
            forward,
            pipeline,
        })
    }
}

impl Drop for VaultWatcher {
    fn drop(&mut self) {
        self.forward.abort();
        self.pipeline.abort();
    }
}

async fn handle_with_retry(vault: &Vault, action: ReloadAction, path: &Path) {
    if let Err(first) = handle_event(vault, action, path).await {
        debug!(path = %path.display(), %first, "reload failed, retrying once");
        tokio::time::sleep(RETRY_DELAY).await;
        if let Err(second) = handle_event(vault, action, path).await {
            // Mid-write reads are normal under cloud sync; the next
            // notification will pick the file up again.
            warn!(path = %path.display(), %second, "dropping event after retry");
        }
    }
}

async fn handle_event(vault: &Vault, action: ReloadAction, path: &Path) -> CoreResult<()> {
    let bytes = fs::read_bytes(path)?;
    if vault.watch_state().is_unchanged(path, &bytes) {
        debug!(path = %path.display(), "content unchanged, dropping event");
        return Ok(());
    }

    match action {
        ReloadAction::NotesIndex => {
            let suppress = vault.watch_state().recent_marks(path);
            let _guard = vault.inner.serial.lock().await;
            let changes = vault.reload_notes_locked(&suppress)?;
            debug!(count = changes.len(), "notes index reloaded from disk");
        }
        ReloadAction::NotebooksIndex => {
            let suppress = vault.watch_state().recent_marks(path);
            let _guard = vault.inner.serial.lock().await;
            let changes = vault.reload_notebooks_locked(&suppress)?;
            debug!(count = changes.len(), "notebooks index reloaded from disk");
        }
        ReloadAction::TagsIndex => {
            // Derived data; the authoritative rows live in the note index.
            debug!("tag index changed externally");
        }
        ReloadAction::Cursor => {
            if !vault.watch_state().recently_marked(path) {
                vault.oplog().reload_cursor()?;
            }
        }
        ReloadAction::PendingOp => {
            if vault.watch_state().recently_marked(path) {
                debug!(path = %path.display(), "own pending write, skipping apply");
            } else {
                let outcome = apply_external_pending(vault, path).await?;
                debug!(path = %path.display(), ?outcome, "applied external pending operation");
            }
        }
        ReloadAction::Header => {
            vault.reload_header()?;
        }
    }
    Ok(())
}

/// Workspace-level events: metadata or keyring rewritten, vault headers
/// appearing or changing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WorkspaceEvent {
    MetadataChanged,
    KeyringChanged,
    VaultDiscovered(Uuid),
    VaultHeaderChanged(Uuid),
}

/// Watcher over the workspace root for `.witflo-workspace`,
/// `.witflo-keyring.enc`, and `vaults/*/vault.header`.
pub struct WorkspaceWatcher {
    _watcher: RecommendedWatcher,
    forward: JoinHandle<()>,
    pipeline: JoinHandle<()>,
    events: broadcast::Sender<WorkspaceEvent>,
}

impl WorkspaceWatcher {
    pub fn spawn(root: PathBuf) -> CoreResult<Self> {
        let (events, _) = broadcast::channel(64);
        let (raw_tx, mut raw_rx) = mpsc::unbounded_channel::<PathBuf>();

        let filter_root = root.clone();
        let mut watcher = notify::recommended_watcher(move |result: Result<Event, notify::Error>| {
            let Ok(event) = result else { return };
            if !matches!(
                event.kind,
                EventKind::Create(_) | EventKind::Modify(_) | EventKind::Any
            ) {
                return;
            }
            for path in event.paths {
                if classify_workspace(&filter_root, &path).is_some() {
                    let _ = raw_tx.send(path);
                }
            }
        })
        .map_err(|e| CoreError::Backend(format!("failed to create file watcher: {e}")))?;
        watcher
            .watch(&root, RecursiveMode::Recursive)
            .map_err(|e| CoreError::Backend(format!("failed to watch {}: {e}", root.display())))?;

        let (debouncer, mut debounced_rx) = Debouncer::new(DEBOUNCE_WINDOW);
        let forward = tokio::spawn(async move {
            while let Some(path) = raw_rx.recv().await {
                debouncer.observe(path);
            }
        });

        let state = WatchState::new();
        let sender = events.clone();
        let pipeline_root = root.clone();
        let mut seen_vaults: HashSet<Uuid> = HashSet::new();
        let pipeline = tokio::spawn(async move {
            while let Some(path) = debounced_rx.recv().await {
                let Some(event) = classify_workspace(&pipeline_root, &path) else {
                    continue;
                };
                let Ok(bytes) = fs::read_bytes(&path) else {
                    continue;
                };
                if state.is_unchanged(&path, &bytes) {
                    continue;
                }
                let event = match event {
                    WorkspaceEvent::VaultHeaderChanged(id) if seen_vaults.insert(id) => {
                        WorkspaceEvent::VaultDiscovered(id)
                    }
                    other => other,
                };
                let _ = sender.send(event);
            }
        });

        Ok(WorkspaceWatcher {
            _watcher: watcher,
            forward,
            pipeline,
            events,
        })
    }

    pub fn subscribe(&self) -> broadcast::Receiver<WorkspaceEvent> {
        self.events.subscribe()
    }
}

impl Drop for WorkspaceWatcher {
    fn drop(&mut self) {
        self.forward.abort();
        self.pipeline.abort();
    }
}

fn classify_workspace(root: &Path, path: &Path) -> Option<WorkspaceEvent> {
    let rel = path.strip_prefix(root).ok()?;
    if path.extension().is_some_and(|ext| ext == "tmp") {
        return None;
    }
    let mut parts = rel.components().map(|c| c.as_os_str().to_str().unwrap_or(""));
    match (parts.next(), parts.next(), parts.next()) {
        (Some(METADATA_FILE), None, None) => Some(WorkspaceEvent::MetadataChanged),
        (Some(KEYRING_FILE), None, None) => Some(WorkspaceEvent::KeyringChanged),
        (Some(VAULTS_DIR), Some(vault_id), Some(HEADER_FILE)) => Uuid::parse_str(vault_id)
            .ok()
            .map(WorkspaceEvent::VaultHeaderChanged),
        _ => None,
    }
}
