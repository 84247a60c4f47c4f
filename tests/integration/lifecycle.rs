//! Workspace and vault lifecycle scenarios: initialize/unlock round-trips,
//! note persistence across lock cycles, ciphertext hygiene, and master
//! password changes.

use witflo::crypto::hash::blake2b_hex;
use witflo::error::CoreError;
use witflo::workspace::{open_workspace, UnlockedWorkspace, WorkspaceState};

use crate::common;

#[tokio::test]
async fn fresh_workspace_lifecycle() {
    let dir = tempfile::tempdir().unwrap();
    let root = dir.path();
    assert_eq!(open_workspace(root), WorkspaceState::Uninitialized);

    let workspace = common::fresh_workspace(root).await;
    assert!(root.join(".witflo-workspace").is_file());
    assert!(root.join(".witflo-keyring.enc").is_file());
    assert!(root.join("vaults").is_dir());
    assert_eq!(open_workspace(root), WorkspaceState::Initialized);

    // The metadata file is plaintext JSON at version 2.
    let metadata: serde_json::Value =
        serde_json::from_slice(&std::fs::read(root.join(".witflo-workspace")).unwrap()).unwrap();
    assert_eq!(metadata["version"], 2);
    assert!(metadata["crypto"]["master_key_salt"].is_string());

    workspace.lock();
    assert!(workspace.is_locked());

    let reopened = UnlockedWorkspace::unlock(root, common::passphrase(common::PASSPHRASE))
        .await
        .expect("correct passphrase unlocks");
    reopened.lock();

    let wrong = UnlockedWorkspace::unlock(root, common::passphrase(b"wrong")).await;
    assert!(matches!(wrong, Err(CoreError::InvalidPassphrase)));
}

#[tokio::test]
async fn save_and_reload_note_across_lock_cycle() {
    let dir = tempfile::tempdir().unwrap();
    let root = dir.path();

    let workspace = common::fresh_workspace(root).await;
    let vault_id = workspace.create_vault("personal", false).unwrap();
    let vault = workspace.open_vault(vault_id).unwrap();

    let note = vault.create_note("Hello", "World").await.unwrap();
    let vault_dir = root.join("vaults").join(vault_id.to_string());
    assert!(vault_dir.join("refs/notes.jsonl.enc").is_file());

    // Exactly the object files named by their own BLAKE2b digest.
    let objects: Vec<_> = common::files_under(&vault_dir.join("objects"));
    assert!(!objects.is_empty());
    for object in &objects {
        let bytes = std::fs::read(object).unwrap();
        let name = format!(
            "{}{}",
            object.parent().unwrap().file_name().unwrap().to_str().unwrap(),
            object.file_name().unwrap().to_str().unwrap()
        );
        assert_eq!(name, blake2b_hex(&bytes));
    }

    vault.close();
    workspace.lock();

    let workspace = UnlockedWorkspace::unlock(root, common::passphrase(common::PASSPHRASE))
        .await
        .unwrap();
    let vault = workspace.open_vault(vault_id).unwrap();

    let loaded = vault.load_note(note.id).unwrap();
    assert_eq!(loaded.title, "Hello");
    assert_eq!(loaded.content, "World");
    assert_eq!(loaded.version, 1);

    let mut updated = loaded.clone();
    updated.content = "World!".into();
    let meta = vault.save_note(updated).await.unwrap();
    assert_eq!(meta.version, 2);
    assert!(meta.modified_at > loaded.modified_at);

    let reloaded = vault.load_note(note.id).unwrap();
    assert_eq!(reloaded.content, "World!");
    assert_eq!(reloaded.version, 2);
}

#[tokio::test]
async fn plaintext_never_reaches_disk() {
    let dir = tempfile::tempdir().unwrap();
    let root = dir.path();

    let workspace = common::fresh_workspace(root).await;
    let vault_id = workspace.create_vault("personal", true).unwrap();
    let vault = workspace.open_vault(vault_id).unwrap();

    let mut note = vault
        .create_note("Secret", "Super secret payload")
        .await
        .unwrap();
    note.tags.insert("classified".into());
    vault.save_note(note).await.unwrap();

    // Scan every byte the engine wrote: content objects, indices, pending
    // operations, keyring, metadata.
    for needle in [
        b"Super secret payload".as_slice(),
        b"Secret".as_slice(),
        b"classified".as_slice(),
    ] {
        assert!(
            !common::any_file_contains(root, needle),
            "found plaintext {:?} on disk",
            String::from_utf8_lossy(needle)
        );
    }
}

#[tokio::test]
async fn password_change_keeps_vault_keys_and_content() {
    let dir = tempfile::tempdir().unwrap();
    let root = dir.path();

    let workspace = common::fresh_workspace(root).await;
    let vault_id = workspace.create_vault("personal", false).unwrap();
    let vault = workspace.open_vault(vault_id).unwrap();
    let note = vault.create_note("Durable", "Body").await.unwrap();

    let objects_dir = root.join("vaults").join(vault_id.to_string()).join("objects");
    let mut objects_before = common::files_under(&objects_dir);
    objects_before.sort();

    workspace
        .change_master_password(
            common::passphrase(common::PASSPHRASE),
            common::passphrase(b"new passphrase"),
        )
        .await
        .unwrap();

    // Content was not re-encrypted: the object set is byte-identical.
    let mut objects_after = common::files_under(&objects_dir);
    objects_after.sort();
    assert_eq!(objects_before, objects_after);
    for path in &objects_after {
        let bytes = std::fs::read(path).unwrap();
        assert_eq!(
            blake2b_hex(&bytes),
            format!(
                "{}{}",
                path.parent().unwrap().file_name().unwrap().to_str().unwrap(),
                path.file_name().unwrap().to_str().unwrap()
            )
        );
    }

    vault.close();
    workspace.lock();

    let old = UnlockedWorkspace::unlock(root, common::passphrase(common::PASSPHRASE)).await;
    assert!(matches!(old, Err(CoreError::InvalidPassphrase)));

    let workspace = UnlockedWorkspace::unlock(root, common::passphrase(b"new passphrase"))
        .await
        .unwrap();
    let vault = workspace.open_vault(vault_id).unwrap();
    let loaded = vault.load_note(note.id).unwrap();
    assert_eq!(loaded.title, "Durable");
    assert_eq!(loaded.content, "Body");
}

#[tokio::test]
async fn vault_keyring_listing_and_removal() {
    let dir = tempfile::tempdir().unwrap();
    let workspace = common::fresh_workspace(dir.path()).await;

    let a = workspace.create_vault("alpha", true).unwrap();
    let b = workspace.create_vault("beta", false).unwrap();

    let mut vaults = workspace.list_vaults().unwrap();
    vaults.sort_by(|x, y| x.name.cmp(&y.name));
    assert_eq!(vaults.len(), 2);
    assert_eq!(vaults[0].name, "alpha");
    assert!(vaults[0].sync_enabled);
    assert_eq!(vaults[0].vault_id, a);
    assert!(!vaults[1].sync_enabled);

    workspace.remove_vault(b).unwrap();
    assert_eq!(workspace.list_vaults().unwrap().len(), 1);
    assert!(matches!(
        workspace.open_vault(b),
        Err(CoreError::VaultNotFound(_))
    ));
}
