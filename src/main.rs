//! End-to-end driver: initialize a workspace, create a vault, write and
//! query notes, and run a local sync round.

use anyhow::Result;
use tracing::info;
use witflo::crypto::secret::SecretBytes;
use witflo::sync::SyncEngine;
use witflo::watcher::VaultWatcher;
use witflo::workspace::{open_workspace, UnlockedWorkspace, WorkspaceState};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt::init();

    let root = witflo::default_workspace_root();
    info!(root = %root.display(), "opening workspace");

    let passphrase = SecretBytes::from_slice(b"correct horse battery staple");
    let workspace = match open_workspace(&root) {
        WorkspaceState::Uninitialized => {
            info!("no workspace found, initializing (benchmarking argon2)");
            UnlockedWorkspace::initialize(&root, passphrase).await?
        }
        WorkspaceState::Initialized => {
            info!("unlocking existing workspace");
            UnlockedWorkspace::unlock(&root, passphrase).await?
        }
    };

    let vault_id = match workspace.list_vaults()?.first() {
        Some(info) => info.vault_id,
        None => workspace.create_vault("personal", true)?,
    };
    let vault = workspace.open_vault(vault_id)?;
    let _watcher = VaultWatcher::spawn(vault.clone())?;
    info!(%vault_id, "vault open");

    let notebook = vault.create_notebook("journal").await?;
    let mut note = vault.create_note("Hello", "First note in this vault.").await?;
    note.tags.insert("demo".into());
    vault.save_note(note.clone()).await?;
    vault.move_note(note.id, Some(notebook.id)).await?;

    for row in vault.list_active_notes() {
        info!(title = %row.title, version = row.version, "active note");
    }
    info!(?notebook.id, count = vault.list_by_notebook(Some(notebook.id)).len(), "notebook contents");

    let loaded = vault.load_note(note.id)?;
    info!(content = %loaded.content, "loaded note body");

    let engine = SyncEngine::new(vault.clone());
    let report = engine.sync().await;
    info!(pushed = report.pushed, pulled = report.pulled, success = report.success, "sync");

    let stats = vault.stats();
    info!(
        total = stats.total,
        active = stats.active,
        pinned = stats.pinned,
        "vault stats"
    );

    workspace.lock();
    Ok(())
}
