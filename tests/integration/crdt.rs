//! Operation-log merge semantics: last-writer-wins with deterministic
//! tie-breaking, delete-beats-update, idempotent re-application, and
//! convergence across causally valid orderings.

use ed25519_dalek::SigningKey;
use uuid::Uuid;
use witflo::model::Note;
use witflo::sync::{apply_operation, ApplyOutcome, NoteUpdate, OpType, SyncOperation};
use witflo::vault::Vault;

use crate::common;

struct Replica {
    _dir: tempfile::TempDir,
    _workspace: std::sync::Arc<witflo::workspace::UnlockedWorkspace>,
    vault: Vault,
}

async fn replica() -> Replica {
    let dir = tempfile::tempdir().unwrap();
    let workspace = common::fresh_workspace(dir.path()).await;
    let vault_id = workspace.create_vault("merge", true).unwrap();
    let vault = workspace.open_vault(vault_id).unwrap();
    Replica {
        _dir: dir,
        _workspace: workspace,
        vault,
    }
}

fn device(seed: u8) -> SigningKey {
    SigningKey::from_bytes(&[seed; 32])
}

fn signed(
    op_type: OpType,
    target: Uuid,
    ts: i64,
    payload: serde_json::Value,
    seed: u8,
) -> SyncOperation {
    let mut op = SyncOperation::new(op_type, target, ts, Uuid::new_v4(), payload);
    op.sign(&device(seed)).unwrap();
    op
}

fn create_op(note: &Note, ts: i64, seed: u8) -> SyncOperation {
    signed(
        OpType::CreateNote,
        note.id,
        ts,
        SyncOperation::note_payload(note).unwrap(),
        seed,
    )
}

fn update_content_op(target: Uuid, content: &str, ts: i64, seed: u8) -> SyncOperation {
    let update = NoteUpdate {
        content: Some(content.to_string()),
        ..Default::default()
    };
    signed(
        OpType::UpdateNote,
        target,
        ts,
        SyncOperation::update_payload(&update).unwrap(),
        seed,
    )
}

fn delete_op(target: Uuid, ts: i64, seed: u8) -> SyncOperation {
    signed(OpType::DeleteNote, target, ts, serde_json::Value::Null, seed)
}

#[tokio::test]
async fn update_vs_update_latest_timestamp_wins_in_either_order() {
    let note = Note::new("x", "");

    for reversed in [false, true] {
        let replica = replica().await;
        apply_operation(&replica.vault, &create_op(&note, 1, 1))
            .await
            .unwrap();

        let a = update_content_op(note.id, "a", 5, 1);
        let b = update_content_op(note.id, "b", 7, 2);
        let ordered = if reversed { [&b, &a] } else { [&a, &b] };
        for op in ordered {
            apply_operation(&replica.vault, op).await.unwrap();
        }

        let merged = replica.vault.load_note(note.id).unwrap();
        assert_eq!(merged.content, "b", "reversed={reversed}");
    }
}

#[tokio::test]
async fn delete_beats_concurrent_update_in_either_order() {
    let note = Note::new("doomed", "");

    for reversed in [false, true] {
        let replica = replica().await;
        apply_operation(&replica.vault, &create_op(&note, 1, 1))
            .await
            .unwrap();

        let update = update_content_op(note.id, "a", 9, 1);
        let delete = delete_op(note.id, 3, 2);
        let ordered = if reversed {
            [&delete, &update]
        } else {
            [&update, &delete]
        };
        for op in ordered {
            apply_operation(&replica.vault, op).await.unwrap();
        }

        assert!(replica.vault.note_metadata(note.id).is_none());
        assert!(replica.vault.load_note(note.id).is_err());
    }
}

#[tokio::test]
async fn reapplying_an_operation_is_a_noop() {
    let note = Note::new("idem", "");
    let replica = replica().await;

    let create = create_op(&note, 1, 1);
    assert_eq!(
        apply_operation(&replica.vault, &create).await.unwrap(),
        ApplyOutcome::Applied
    );
    assert_eq!(
        apply_operation(&replica.vault, &create).await.unwrap(),
        ApplyOutcome::DiscardedStale
    );

    let update = update_content_op(note.id, "once", 5, 2);
    apply_operation(&replica.vault, &update).await.unwrap();
    let after_first = replica.vault.note_metadata(note.id).unwrap();

    assert_eq!(
        apply_operation(&replica.vault, &update).await.unwrap(),
        ApplyOutcome::DiscardedStale
    );
    let after_second = replica.vault.note_metadata(note.id).unwrap();
    assert_eq!(after_first, after_second);

    let delete = delete_op(note.id, 9, 2);
    assert_eq!(
        apply_operation(&replica.vault, &delete).await.unwrap(),
        ApplyOutcome::Applied
    );
    assert_eq!(
        apply_operation(&replica.vault, &delete).await.unwrap(),
        ApplyOutcome::Noop
    );
}

#[tokio::test]
async fn causally_valid_orderings_converge() {
    let note = Note::new("conv", "");

    // Device 1 creates then edits; device 2 tags then edits. Any order that
    // keeps each device's own sequence is a valid delivery.
    let create = create_op(&note, 1, 1);
    let edit_a = update_content_op(note.id, "a", 5, 1);
    let tag_update = {
        let update = NoteUpdate {
            tags: Some(["shared".to_string()].into_iter().collect()),
            ..Default::default()
        };
        signed(
            OpType::UpdateNote,
            note.id,
            6,
            SyncOperation::update_payload(&update).unwrap(),
            2,
        )
    };
    let edit_b = update_content_op(note.id, "b", 7, 2);

    let orderings: Vec<Vec<&SyncOperation>> = vec![
        vec![&create, &edit_a, &tag_update, &edit_b],
        vec![&create, &tag_update, &edit_a, &edit_b],
        vec![&create, &tag_update, &edit_b, &edit_a],
    ];

    let mut outcomes = Vec::new();
    for ordering in orderings {
        let replica = replica().await;
        for op in ordering {
            apply_operation(&replica.vault, op).await.unwrap();
        }
        let merged = replica.vault.load_note(note.id).unwrap();
        outcomes.push((merged.content, merged.tags, merged.modified_at));
    }

    assert!(outcomes.windows(2).all(|w| w[0] == w[1]));
    assert_eq!(outcomes[0].0, "b");
    assert!(outcomes[0].1.contains("shared"));
}

#[tokio::test]
async fn update_for_missing_note_is_discarded() {
    let replica = replica().await;
    let orphan = update_content_op(Uuid::new_v4(), "ghost", 5, 1);
    assert_eq!(
        apply_operation(&replica.vault, &orphan).await.unwrap(),
        ApplyOutcome::DiscardedMissingTarget
    );
}

#[tokio::test]
async fn tag_operations_are_skipped_in_v1() {
    let replica = replica().await;
    let op = signed(
        OpType::AddTag,
        Uuid::new_v4(),
        5,
        serde_json::json!({ "tag": "later" }),
        1,
    );
    assert_eq!(
        apply_operation(&replica.vault, &op).await.unwrap(),
        ApplyOutcome::SkippedUnsupported
    );
}

#[tokio::test]
async fn equal_timestamps_break_ties_on_op_id() {
    let note = Note::new("tie", "");

    let mut first = update_content_op(note.id, "first", 5, 1);
    let mut second = update_content_op(note.id, "second", 5, 2);
    // Deterministic ids so the winner is fixed.
    first.op_id = Uuid::from_u128(1);
    second.op_id = Uuid::from_u128(2);
    first.sign(&device(1)).unwrap();
    second.sign(&device(2)).unwrap();

    for ordered in [[&first, &second], [&second, &first]] {
        let replica = replica().await;
        apply_operation(&replica.vault, &create_op(&note, 1, 1))
            .await
            .unwrap();
        for op in ordered {
            apply_operation(&replica.vault, op).await.unwrap();
        }
        let merged = replica.vault.load_note(note.id).unwrap();
        assert_eq!(merged.content, "second");
    }
}
