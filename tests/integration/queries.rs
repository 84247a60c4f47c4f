//! Repository query surface: list ordering, search, tags, lifecycle flags,
//! notebooks, stats, and cache rollback when an index rewrite fails.

use witflo::error::CoreError;
use witflo::workspace::AutoLockConfig;

use crate::common;

#[tokio::test]
async fn listing_orders_pinned_then_recent() {
    let dir = tempfile::tempdir().unwrap();
    let workspace = common::fresh_workspace(dir.path()).await;
    let vault = workspace
        .open_vault(workspace.create_vault("q", false).unwrap())
        .unwrap();

    let older = vault.create_note("older", "").await.unwrap();
    let newer = vault.create_note("newer", "").await.unwrap();
    let pinned = vault.create_note("pinned", "").await.unwrap();
    vault.set_note_pinned(pinned.id, true).await.unwrap();

    let active = vault.list_active_notes();
    assert_eq!(active.len(), 3);
    assert_eq!(active[0].id, pinned.id);
    assert_eq!(active[1].id, newer.id);
    assert_eq!(active[2].id, older.id);

    let pinned_rows = vault.list_pinned();
    assert_eq!(pinned_rows.len(), 1);
    assert_eq!(pinned_rows[0].id, pinned.id);
}

#[tokio::test]
async fn archive_trash_restore_flow() {
    let dir = tempfile::tempdir().unwrap();
    let workspace = common::fresh_workspace(dir.path()).await;
    let vault = workspace
        .open_vault(workspace.create_vault("q", false).unwrap())
        .unwrap();

    let note = vault.create_note("cycle", "body").await.unwrap();

    vault.set_note_archived(note.id, true).await.unwrap();
    assert!(vault.list_active_notes().is_empty());
    assert_eq!(vault.list_archived().len(), 1);

    let trashed = vault.trash_note(note.id).await.unwrap();
    assert!(trashed.is_trashed);
    assert_eq!(vault.list_trashed().len(), 1);
    assert!(vault.list_archived().is_empty());

    let restored = vault.restore_note(note.id).await.unwrap();
    assert!(!restored.is_trashed);
    // Still archived from before the trash.
    assert_eq!(vault.list_archived().len(), 1);

    vault.set_note_archived(note.id, false).await.unwrap();
    assert_eq!(vault.list_active_notes().len(), 1);

    let stats = vault.stats();
    assert_eq!(stats.total, 1);
    assert_eq!(stats.active, 1);
    assert_eq!(stats.trashed, 0);

    vault.delete_note(note.id).await.unwrap();
    assert!(matches!(
        vault.load_note(note.id),
        Err(CoreError::NoteMissing(_))
    ));
    assert!(matches!(
        vault.delete_note(note.id).await,
        Err(CoreError::NoteMissing(_))
    ));
}

#[tokio::test]
async fn title_search_is_case_insensitive() {
    let dir = tempfile::tempdir().unwrap();
    let workspace = common::fresh_workspace(dir.path()).await;
    let vault = workspace
        .open_vault(workspace.create_vault("q", false).unwrap())
        .unwrap();

    vault.create_note("Groceries List", "milk").await.unwrap();
    vault.create_note("Meeting notes", "agenda").await.unwrap();

    assert_eq!(vault.search_by_title("GROCER").len(), 1);
    assert_eq!(vault.search_by_title("notes").len(), 1);
    assert_eq!(vault.search_by_title("e").len(), 2);
    assert!(vault.search_by_title("nope").is_empty());
}

#[tokio::test]
async fn tags_are_indexed_and_queryable() {
    let dir = tempfile::tempdir().unwrap();
    let workspace = common::fresh_workspace(dir.path()).await;
    let vault = workspace
        .open_vault(workspace.create_vault("q", false).unwrap())
        .unwrap();

    let mut note = vault.create_note("tagged", "").await.unwrap();
    note.tags.insert("work".into());
    note.tags.insert("urgent".into());
    vault.save_note(note.clone()).await.unwrap();

    let mut second = vault.create_note("also tagged", "").await.unwrap();
    second.tags.insert("work".into());
    vault.save_note(second).await.unwrap();

    assert_eq!(vault.list_by_tag("work").len(), 2);
    assert_eq!(vault.list_by_tag("urgent").len(), 1);
    assert!(vault.list_by_tag("absent").is_empty());

    let tags = vault.list_tags().unwrap();
    let work = tags.iter().find(|row| row.tag == "work").unwrap();
    assert_eq!(work.note_count, 2);
}

#[tokio::test]
async fn notebooks_group_and_count_notes() {
    let dir = tempfile::tempdir().unwrap();
    let workspace = common::fresh_workspace(dir.path()).await;
    let vault = workspace
        .open_vault(workspace.create_vault("q", false).unwrap())
        .unwrap();

    let journal = vault.create_notebook("journal").await.unwrap();
    let inbox = vault.create_note("inbox note", "").await.unwrap();
    let filed = vault.create_note("filed note", "").await.unwrap();
    vault.move_note(filed.id, Some(journal.id)).await.unwrap();

    assert_eq!(vault.list_by_notebook(Some(journal.id)).len(), 1);
    let uncategorized = vault.list_by_notebook(None);
    assert_eq!(uncategorized.len(), 1);
    assert_eq!(uncategorized[0].id, inbox.id);

    let rows = vault.list_notebooks();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].note_count, 1);

    let loaded = vault.load_notebook(journal.id).unwrap();
    assert_eq!(loaded.name, "journal");

    // Deleting the notebook leaves its notes dangling as uncategorized.
    vault.delete_notebook(journal.id).await.unwrap();
    assert!(vault.list_notebooks().is_empty());
    assert_eq!(vault.list_by_notebook(None).len(), 2);
}

#[tokio::test]
async fn failed_index_rewrite_rolls_back_the_cache() {
    let dir = tempfile::tempdir().unwrap();
    let workspace = common::fresh_workspace(dir.path()).await;
    let vault_id = workspace.create_vault("q", false).unwrap();
    let vault = workspace.open_vault(vault_id).unwrap();

    let kept = vault.create_note("kept", "safe").await.unwrap();

    // Sabotage the refs directory so the next atomic rewrite cannot land.
    let refs = dir
        .path()
        .join("vaults")
        .join(vault_id.to_string())
        .join("refs");
    std::fs::remove_dir_all(&refs).unwrap();
    std::fs::write(&refs, b"not a directory").unwrap();

    let result = vault.create_note("doomed", "never indexed").await;
    assert!(result.is_err());

    // The cache was rolled back to the pre-save snapshot.
    let rows = vault.list_active_notes();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].id, kept.id);
}

#[tokio::test(flavor = "multi_thread")]
async fn auto_lock_fires_after_idle_window() {
    let dir = tempfile::tempdir().unwrap();
    let workspace = common::fresh_workspace(dir.path()).await;

    workspace.enable_auto_lock(AutoLockConfig {
        idle_duration: std::time::Duration::from_millis(100),
        lock_on_background: true,
    });
    assert!(!workspace.is_locked());

    tokio::time::sleep(std::time::Duration::from_millis(400)).await;
    assert!(workspace.is_locked());
    assert!(matches!(
        workspace.list_vaults(),
        Err(CoreError::InvariantViolated(_))
    ));
}
