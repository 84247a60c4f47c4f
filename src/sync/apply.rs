//! Operation applicator: last-writer-wins merge of pulled or externally
//! discovered operations into the vault repository.
//!
//! All decisions compare the operation's Lamport timestamp against the
//! target's `modified_at`; equal clocks break ties on the lexicographically
//! greater operation id. Deletes always win over concurrent updates.

use std::path::Path;

use tracing::{debug, warn};
use uuid::Uuid;

use crate::error::{CoreError, CoreResult};
use crate::model::Notebook;
use crate::vault::{fs, Vault};

use super::clock::{datetime_to_lamport, lamport_to_datetime};
use super::oplog::parse_pending_name;
use super::operation::{OpType, SyncOperation};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApplyOutcome {
    Applied,
    /// The local state was produced by a later (or tie-winning) write.
    DiscardedStale,
    /// An update or move arrived for a target that does not exist.
    DiscardedMissingTarget,
    /// Tag operations are recognized but not merged in v1.
    SkippedUnsupported,
    /// Deleting something already absent.
    Noop,
}

/// Applies one verified operation under the vault's serial lock. Re-applying
/// the same operation is a no-op by construction: the first application
/// stamps the target with the op's timestamp and id, so the replay loses the
/// tie-break.
pub async fn apply_operation(vault: &Vault, op: &SyncOperation) -> CoreResult<ApplyOutcome> {
    vault.ensure_live()?;
    let _guard = vault.inner.serial.lock().await;
    let outcome = apply_locked(vault, op)?;
    debug!(op_id = %op.op_id, ty = ?op.op_type, ?outcome, "applied operation");
    Ok(outcome)
}

/// Decrypts, verifies, and applies a pending-operation file written by
/// another instance sharing this vault directory.
pub async fn apply_external_pending(vault: &Vault, path: &Path) -> CoreResult<ApplyOutcome> {
    let Some(op_id) = parse_pending_name(path) else {
        return Err(CoreError::InvalidInput(format!(
            "not a pending operation file: {}",
            path.display()
        )));
    };
    let ciphertext = fs::read_bytes(path)?;
    let op = vault.oplog().open_external(op_id, ciphertext)?;
    vault.oplog().observe_remote(op.timestamp);
    apply_operation(vault, &op).await
}

fn apply_locked(vault: &Vault, op: &SyncOperation) -> CoreResult<ApplyOutcome> {
    match op.op_type {
        OpType::CreateNote => apply_note_create(vault, op),
        OpType::UpdateNote => apply_note_update(vault, op),
        OpType::DeleteNote => apply_note_delete(vault, op),
        OpType::MoveNote => apply_note_move(vault, op),
        OpType::CreateNotebook => apply_notebook_create(vault, op),
        OpType::UpdateNotebook => apply_notebook_update(vault, op),
        OpType::DeleteNotebook => apply_notebook_delete(vault, op),
        OpType::AddTag | OpType::RemoveTag => {
            warn!(op_id = %op.op_id, "tag operations are deferred in v1; skipping");
            Ok(ApplyOutcome::SkippedUnsupported)
        }
    }
}

/// `remote_ts > local_ts`, or equal clocks with the remote op id winning the
/// lexicographic tie-break against whatever produced the local state.
fn remote_wins(remote_ts: i64, remote_op_id: Uuid, local_ts: i64, local_id: Uuid) -> bool {
    remote_ts > local_ts || (remote_ts == local_ts && remote_op_id > local_id)
}

fn apply_note_create(vault: &Vault, op: &SyncOperation) -> CoreResult<ApplyOutcome> {
    let mut note = op.decode_note()?;
    note.id = op.target_id;
    note.modified_at = lamport_to_datetime(op.timestamp);

    if let Some(existing) = vault.note_metadata(op.target_id) {
        let local_ts = datetime_to_lamport(existing.modified_at);
        let local_id = existing.origin_op_id.unwrap_or(existing.id);
        if !remote_wins(op.timestamp, op.op_id, local_ts, local_id) {
            return Ok(ApplyOutcome::DiscardedStale);
        }
        note.version = existing.version + 1;
    } else if note.version == 0 {
        note.version = 1;
    }

    let buffer_refresh = !vault.inner.editors.has_unsaved(note.id);
    vault.store_note_locked(&note, Some(op.op_id), buffer_refresh)?;
    Ok(ApplyOutcome::Applied)
}

fn apply_note_update(vault: &Vault, op: &SyncOperation) -> CoreResult<ApplyOutcome> {
    let Some(existing) = vault.note_metadata(op.target_id) else {
        warn!(target = %op.target_id, "update for a missing note; its create should have preceded it");
        return Ok(ApplyOutcome::DiscardedMissingTarget);
    };
    let local_ts = datetime_to_lamport(existing.modified_at);
    let local_id = existing.origin_op_id.unwrap_or(existing.id);
    if !remote_wins(op.timestamp, op.op_id, local_ts, local_id) {
        return Ok(ApplyOutcome::DiscardedStale);
    }

    let update = op.decode_note_update()?;
    let mut note = vault.load_note_locked(op.target_id)?;
    update.apply_to(&mut note);
    note.modified_at = lamport_to_datetime(op.timestamp);
    note.version = existing.version + 1;

    let buffer_refresh = !vault.inner.editors.has_unsaved(note.id);
    vault.store_note_locked(&note, Some(op.op_id), buffer_refresh)?;
    Ok(ApplyOutcome::Applied)
}

fn apply_note_delete(vault: &Vault, op: &SyncOperation) -> CoreResult<ApplyOutcome> {
    // Delete beats concurrent updates regardless of timestamps.
    match vault.remove_note_locked(op.target_id)? {
        Some(_) => Ok(ApplyOutcome::Applied),
        None => Ok(ApplyOutcome::Noop),
    }
}

fn apply_note_move(vault: &Vault, op: &SyncOperation) -> CoreResult<ApplyOutcome> {
    let Some(existing) = vault.note_metadata(op.target_id) else {
        return Ok(ApplyOutcome::DiscardedMissingTarget);
    };
    let local_ts = datetime_to_lamport(existing.modified_at);
    if op.timestamp <= local_ts {
        return Ok(ApplyOutcome::DiscardedStale);
    }

    let target = op.decode_move()?;
    let mut note = vault.load_note_locked(op.target_id)?;
    note.notebook_id = target.notebook_id;
    note.modified_at = lamport_to_datetime(op.timestamp);
    note.version = existing.version + 1;

    let buffer_refresh = !vault.inner.editors.has_unsaved(note.id);
    vault.store_note_locked(&note, Some(op.op_id), buffer_refresh)?;
    Ok(ApplyOutcome::Applied)
}

fn apply_notebook_create(vault: &Vault, op: &SyncOperation) -> CoreResult<ApplyOutcome> {
    let mut notebook: Notebook = op.decode_notebook()?;
    notebook.id = op.target_id;
    notebook.vault_id = vault.vault_id();
    notebook.modified_at = lamport_to_datetime(op.timestamp);

    if let Some(existing) = vault.notebook_metadata(op.target_id) {
        let local_ts = datetime_to_lamport(existing.modified_at);
        let local_id = existing.origin_op_id.unwrap_or(existing.id);
        if !remote_wins(op.timestamp, op.op_id, local_ts, local_id) {
            return Ok(ApplyOutcome::DiscardedStale);
        }
    }
    vault.store_notebook_locked(&notebook, Some(op.op_id))?;
    Ok(ApplyOutcome::Applied)
}

fn apply_notebook_update(vault: &Vault, op: &SyncOperation) -> CoreResult<ApplyOutcome> {
    let Some(existing) = vault.notebook_metadata(op.target_id) else {
        warn!(target = %op.target_id, "update for a missing notebook");
        return Ok(ApplyOutcome::DiscardedMissingTarget);
    };
    let local_ts = datetime_to_lamport(existing.modified_at);
    let local_id = existing.origin_op_id.unwrap_or(existing.id);
    if !remote_wins(op.timestamp, op.op_id, local_ts, local_id) {
        return Ok(ApplyOutcome::DiscardedStale);
    }

    let update = op.decode_notebook_update()?;
    let mut notebook = vault.load_notebook_locked(op.target_id)?;
    update.apply_to(&mut notebook);
    notebook.modified_at = lamport_to_datetime(op.timestamp);

    vault.store_notebook_locked(&notebook, Some(op.op_id))?;
    Ok(ApplyOutcome::Applied)
}

fn apply_notebook_delete(vault: &Vault, op: &SyncOperation) -> CoreResult<ApplyOutcome> {
    match vault.remove_notebook_locked(op.target_id)? {
        Some(_) => Ok(ApplyOutcome::Applied),
        None => Ok(ApplyOutcome::Noop),
    }
}
