//! External-change scenarios: a second instance (standing in for a cloud
//! sync client) rewrites the encrypted index while the vault is open; the
//! watcher must pick the change up, and must never clobber an editor with
//! unsaved changes.

use std::time::Duration;

use uuid::Uuid;
use witflo::vault::{CacheChange, ChangeKind, Vault};
use witflo::watcher::VaultWatcher;

use crate::common;

/// The self-write suppression window plus slack; external writes inside the
/// window after our own save are deliberately filtered per id.
const MARK_EXPIRY: Duration = Duration::from_millis(2100);
const EVENT_TIMEOUT: Duration = Duration::from_secs(10);

async fn wait_for_note_event(
    rx: &mut tokio::sync::broadcast::Receiver<CacheChange>,
    id: Uuid,
    kind: ChangeKind,
) -> CacheChange {
    tokio::time::timeout(EVENT_TIMEOUT, async {
        loop {
            match rx.recv().await {
                Ok(change @ CacheChange::Note {
                    id: event_id,
                    kind: event_kind,
                    ..
                }) if event_id == id && event_kind == kind => return change,
                Ok(_) => continue,
                Err(err) => panic!("event channel closed: {err}"),
            }
        }
    })
    .await
    .expect("watcher event within timeout")
}

async fn external_update(vault: &Vault, id: Uuid, content: &str) {
    let mut note = vault.load_note(id).unwrap();
    note.content = content.to_string();
    vault.save_note(note).await.unwrap();
}

#[tokio::test(flavor = "multi_thread")]
#[serial_test::serial]
async fn external_index_rewrite_is_picked_up() {
    let dir = tempfile::tempdir().unwrap();
    let workspace = common::fresh_workspace(dir.path()).await;
    let vault_id = workspace.create_vault("watched", true).unwrap();

    // Two handles over the same vault directory simulate two instances.
    let vault = workspace.open_vault(vault_id).unwrap();
    let other = workspace.open_vault(vault_id).unwrap();

    let note = vault.create_note("shared", "v1").await.unwrap();
    let _watcher = VaultWatcher::spawn(vault.clone()).unwrap();
    let mut events = vault.subscribe();

    // Let our own write marks age out so the external change is not
    // suppressed as an echo.
    tokio::time::sleep(MARK_EXPIRY).await;

    external_update(&other, note.id, "v2").await;

    let change = wait_for_note_event(&mut events, note.id, ChangeKind::Modified).await;
    let CacheChange::Note {
        metadata,
        buffer_refresh,
        ..
    } = change
    else {
        unreachable!()
    };
    assert!(buffer_refresh, "no editor is open, content push is allowed");
    assert!(metadata.is_some());

    let reloaded = vault.load_note(note.id).unwrap();
    assert_eq!(reloaded.content, "v2");
}

#[tokio::test(flavor = "multi_thread")]
#[serial_test::serial]
async fn unsaved_editor_survives_external_change() {
    let dir = tempfile::tempdir().unwrap();
    let workspace = common::fresh_workspace(dir.path()).await;
    let vault_id = workspace.create_vault("watched", true).unwrap();

    let vault = workspace.open_vault(vault_id).unwrap();
    let other = workspace.open_vault(vault_id).unwrap();

    let note = vault.create_note("draft", "v1").await.unwrap();
    let _watcher = VaultWatcher::spawn(vault.clone()).unwrap();
    let mut events = vault.subscribe();

    vault.open_editor(note.id);
    vault.set_editor_dirty(note.id, true);
    tokio::time::sleep(MARK_EXPIRY).await;

    external_update(&other, note.id, "v2-external").await;

    let change = wait_for_note_event(&mut events, note.id, ChangeKind::Modified).await;
    let CacheChange::Note {
        buffer_refresh,
        metadata,
        ..
    } = change
    else {
        unreachable!()
    };
    // Cache refreshed, editor buffer preserved.
    assert!(!buffer_refresh);
    assert!(metadata.unwrap().modified_at > note.modified_at);

    // The user saves their in-flight edit: local wins with a newer row.
    vault.set_editor_dirty(note.id, false);
    let mut local = note.clone();
    local.content = "v3-local".into();
    let meta = vault.save_note(local).await.unwrap();
    assert_eq!(vault.load_note(note.id).unwrap().content, "v3-local");
    assert!(meta.version >= 3);
}

#[tokio::test(flavor = "multi_thread")]
#[serial_test::serial]
async fn external_pending_operation_is_applied() {
    let dir = tempfile::tempdir().unwrap();
    let workspace = common::fresh_workspace(dir.path()).await;
    let vault_id = workspace.create_vault("watched", true).unwrap();

    let vault = workspace.open_vault(vault_id).unwrap();
    let other = workspace.open_vault(vault_id).unwrap();

    let _watcher = VaultWatcher::spawn(vault.clone()).unwrap();
    let mut events = vault.subscribe();
    tokio::time::sleep(MARK_EXPIRY).await;

    // The other instance creates a note: its pending op lands in
    // sync/pending/ and its index rewrite lands in refs/. Both routes feed
    // the same cache; the note must appear.
    let note = other.create_note("from-elsewhere", "hello").await.unwrap();

    wait_for_note_event(&mut events, note.id, ChangeKind::Added).await;
    let loaded = vault.load_note(note.id).unwrap();
    assert_eq!(loaded.title, "from-elsewhere");
    assert_eq!(loaded.content, "hello");
}
