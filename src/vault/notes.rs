//! Note repository: save/load against the object store and encrypted index,
//! the query surface over the metadata cache, and the reload diffing used by
//! the file watcher.

use std::collections::HashSet;

use chrono::{DateTime, Utc};
use serde_json::Value;
use tracing::{info, warn};
use uuid::Uuid;

use crate::error::{CoreError, CoreResult};
use crate::model::{Note, NoteMetadata, TagRow};
use crate::sync::clock::lamport_to_datetime;
use crate::sync::operation::{NoteUpdate, OpType, SyncOperation};

use super::state::{CacheChange, ChangeKind};
use super::Vault;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VaultStats {
    pub total: usize,
    pub active: usize,
    pub archived: usize,
    pub trashed: usize,
    pub pinned: usize,
}

impl Vault {
    // ---- host mutations (each one also queues a sync operation) ----

    pub async fn create_note(
        &self,
        title: impl Into<String>,
        content: impl Into<String>,
    ) -> CoreResult<Note> {
        let mut note = Note::new(title, content);
        let meta = self.save_note(note.clone()).await?;
        note.version = meta.version;
        note.modified_at = meta.modified_at;
        Ok(note)
    }

    /// Saves a note, bumping its version. New ids produce a `createNote`
    /// operation, existing ones an `updateNote` carrying every field.
    pub async fn save_note(&self, mut note: Note) -> CoreResult<NoteMetadata> {
        self.ensure_live()?;
        let _guard = self.inner.serial.lock().await;

        let existing = self.inner.notes.read().get(&note.id).cloned();
        let op_id = Uuid::new_v4();
        let ts = self.oplog().next_timestamp();
        if let Some(existing) = &existing {
            note.created_at = existing.created_at;
            note.version = existing.version + 1;
        } else {
            note.version = 1;
        }
        note.modified_at = lamport_to_datetime(ts);

        let meta = self.store_note_locked(&note, Some(op_id), true)?;

        let (op_type, payload) = if existing.is_some() {
            (
                OpType::UpdateNote,
                SyncOperation::update_payload(&NoteUpdate::full(&note))?,
            )
        } else {
            (OpType::CreateNote, SyncOperation::note_payload(&note)?)
        };
        let mut op = SyncOperation::new(op_type, note.id, ts, self.oplog().device_id(), payload);
        op.op_id = op_id;
        self.oplog().record(op)?;
        Ok(meta)
    }

    /// Removes the note's index row and cache entry. The content object
    /// stays behind for out-of-core compaction.
    pub async fn delete_note(&self, id: Uuid) -> CoreResult<()> {
        self.ensure_live()?;
        let _guard = self.inner.serial.lock().await;

        if self.remove_note_locked(id)?.is_none() {
            return Err(CoreError::NoteMissing(id));
        }
        let ts = self.oplog().next_timestamp();
        let op = SyncOperation::new(
            OpType::DeleteNote,
            id,
            ts,
            self.oplog().device_id(),
            Value::Null,
        );
        self.oplog().record(op)?;
        Ok(())
    }

    pub async fn trash_note(&self, id: Uuid) -> CoreResult<NoteMetadata> {
        self.patch_note(id, |note, stamp| {
            note.is_trashed = true;
            note.trashed_at = Some(stamp);
        })
        .await
    }

    pub async fn restore_note(&self, id: Uuid) -> CoreResult<NoteMetadata> {
        self.patch_note(id, |note, _| {
            note.is_trashed = false;
            note.trashed_at = None;
        })
        .await
    }

    pub async fn set_note_pinned(&self, id: Uuid, pinned: bool) -> CoreResult<NoteMetadata> {
        self.patch_note(id, move |note, _| note.is_pinned = pinned).await
    }

    pub async fn set_note_archived(&self, id: Uuid, archived: bool) -> CoreResult<NoteMetadata> {
        self.patch_note(id, move |note, _| note.is_archived = archived)
            .await
    }

    /// Moves a note between notebooks (`None` = uncategorized).
    pub async fn move_note(
        &self,
        id: Uuid,
        notebook_id: Option<Uuid>,
    ) -> CoreResult<NoteMetadata> {
        self.ensure_live()?;
        let _guard = self.inner.serial.lock().await;

        let mut note = self.load_note_locked(id)?;
        let op_id = Uuid::new_v4();
        let ts = self.oplog().next_timestamp();
        note.notebook_id = notebook_id;
        note.version += 1;
        note.modified_at = lamport_to_datetime(ts);

        let meta = self.store_note_locked(&note, Some(op_id), true)?;
        let mut op = SyncOperation::new(
            OpType::MoveNote,
            id,
            ts,
            self.oplog().device_id(),
            SyncOperation::move_payload(notebook_id)?,
        );
        op.op_id = op_id;
        self.oplog().record(op)?;
        Ok(meta)
    }

    /// Field-wise update: load, patch, bump, store, queue `updateNote` with
    /// the changed fields.
    async fn patch_note(
        &self,
        id: Uuid,
        patch: impl FnOnce(&mut Note, DateTime<Utc>),
    ) -> CoreResult<NoteMetadata> {
        self.ensure_live()?;
        let _guard = self.inner.serial.lock().await;

        let before = self.load_note_locked(id)?;
        let mut note = before.clone();
        let op_id = Uuid::new_v4();
        let ts = self.oplog().next_timestamp();
        let stamp = lamport_to_datetime(ts);
        patch(&mut note, stamp);
        note.version += 1;
        note.modified_at = stamp;

        let meta = self.store_note_locked(&note, Some(op_id), true)?;

        let update = NoteUpdate {
            title: (note.title != before.title).then(|| note.title.clone()),
            content: (note.content != before.content).then(|| note.content.clone()),
            tags: (note.tags != before.tags).then(|| note.tags.clone()),
            is_pinned: (note.is_pinned != before.is_pinned).then_some(note.is_pinned),
            is_archived: (note.is_archived != before.is_archived).then_some(note.is_archived),
            is_trashed: (note.is_trashed != before.is_trashed).then_some(note.is_trashed),
            trashed_at: (note.trashed_at != before.trashed_at).then_some(note.trashed_at),
        };
        let mut op = SyncOperation::new(
            OpType::UpdateNote,
            id,
            ts,
            self.oplog().device_id(),
            SyncOperation::update_payload(&update)?,
        );
        op.op_id = op_id;
        self.oplog().record(op)?;
        Ok(meta)
    }

    // ---- queries (metadata cache only) ----

    pub fn note_metadata(&self, id: Uuid) -> Option<NoteMetadata> {
        self.inner.notes.read().get(&id).cloned()
    }

    /// Active notes, pinned first, most recently modified first.
    pub fn list_active_notes(&self) -> Vec<NoteMetadata> {
        self.collect_ordered(|row| row.is_active())
    }

    /// Notes in one notebook; `None` lists uncategorized notes, including
    /// those whose notebook is transiently dangling during sync.
    pub fn list_by_notebook(&self, notebook_id: Option<Uuid>) -> Vec<NoteMetadata> {
        match notebook_id {
            Some(nb) => self.collect_ordered(|row| row.is_active() && row.notebook_id == Some(nb)),
            None => {
                let known: HashSet<Uuid> = self.inner.notebooks.read().keys().copied().collect();
                self.collect_ordered(move |row| {
                    row.is_active()
                        && row
                            .notebook_id
                            .map(|nb| !known.contains(&nb))
                            .unwrap_or(true)
                })
            }
        }
    }

    pub fn list_trashed(&self) -> Vec<NoteMetadata> {
        self.collect_ordered(|row| row.is_trashed)
    }

    pub fn list_archived(&self) -> Vec<NoteMetadata> {
        self.collect_ordered(|row| row.is_archived && !row.is_trashed)
    }

    pub fn list_pinned(&self) -> Vec<NoteMetadata> {
        self.collect_ordered(|row| row.is_pinned && row.is_active())
    }

    /// Case-insensitive substring match over titles of non-trashed notes.
    pub fn search_by_title(&self, query: &str) -> Vec<NoteMetadata> {
        let needle = query.to_lowercase();
        self.collect_ordered(move |row| {
            !row.is_trashed && row.title.to_lowercase().contains(&needle)
        })
    }

    pub fn list_by_tag(&self, tag: &str) -> Vec<NoteMetadata> {
        let tag = tag.to_string();
        self.collect_ordered(move |row| !row.is_trashed && row.tags.contains(&tag))
    }

    pub fn stats(&self) -> VaultStats {
        let notes = self.inner.notes.read();
        let mut stats = VaultStats {
            total: notes.len(),
            active: 0,
            archived: 0,
            trashed: 0,
            pinned: 0,
        };
        for row in notes.values() {
            if row.is_trashed {
                stats.trashed += 1;
            } else if row.is_archived {
                stats.archived += 1;
            } else {
                stats.active += 1;
            }
            if row.is_pinned && row.is_active() {
                stats.pinned += 1;
            }
        }
        stats
    }

    fn collect_ordered(&self, keep: impl Fn(&NoteMetadata) -> bool) -> Vec<NoteMetadata> {
        let mut rows: Vec<NoteMetadata> = self
            .inner
            .notes
            .read()
            .values()
            .filter(|row| keep(row))
            .cloned()
            .collect();
        rows.sort_by(|a, b| {
            b.is_pinned
                .cmp(&a.is_pinned)
                .then(b.modified_at.cmp(&a.modified_at))
                .then(a.id.cmp(&b.id))
        });
        rows
    }

    // ---- content access ----

    /// Loads the full note through the object store. Decrypt failure
    /// quarantines the cache row and reports the object as corrupted; the
    /// rest of the vault stays usable.
    pub fn load_note(&self, id: Uuid) -> CoreResult<Note> {
        self.ensure_live()?;
        self.load_note_locked(id)
    }

    pub(crate) fn load_note_locked(&self, id: Uuid) -> CoreResult<Note> {
        let meta = self
            .inner
            .notes
            .read()
            .get(&id)
            .cloned()
            .ok_or(CoreError::NoteMissing(id))?;
        let ciphertext = self
            .inner
            .objects
            .get(&meta.content_hash)?
            .ok_or(CoreError::NoteMissing(id))?;

        let key = self.content_key(id)?;
        let plaintext = match self.inner.crypto.open(&key, &ciphertext, id.as_bytes()) {
            Ok(plaintext) => plaintext,
            Err(_) => {
                warn!(%id, hash = %meta.content_hash, "quarantining note with undecryptable object");
                self.inner.notes.write().remove(&id);
                return Err(CoreError::CorruptedObject(meta.content_hash));
            }
        };
        Ok(serde_json::from_slice(&plaintext)?)
    }

    // ---- storage internals (callers hold the vault serial lock) ----

    /// Encrypts and stores the note blob, replaces its index row, refreshes
    /// the cache, and emits a change event. Rolls the cache back if the
    /// index rewrite fails.
    pub(crate) fn store_note_locked(
        &self,
        note: &Note,
        origin_op_id: Option<Uuid>,
        buffer_refresh: bool,
    ) -> CoreResult<NoteMetadata> {
        let key = self.content_key(note.id)?;
        let plaintext = serde_json::to_vec(note)?;
        let ciphertext = self.inner.crypto.seal(&key, &plaintext, note.id.as_bytes())?;
        let content_hash = self.inner.objects.put(&ciphertext)?;

        let meta = NoteMetadata::from_note(note, content_hash, origin_op_id);
        let snapshot = self.inner.notes.read().clone();
        let kind = if snapshot.contains_key(&note.id) {
            ChangeKind::Modified
        } else {
            ChangeKind::Added
        };
        let tags_changed = snapshot
            .get(&note.id)
            .map(|old| old.tags != meta.tags)
            .unwrap_or(!meta.tags.is_empty());

        self.inner.notes.write().insert(note.id, meta.clone());
        if let Err(err) = self.persist_notes_index_locked(&[note.id]) {
            *self.inner.notes.write() = snapshot;
            return Err(err);
        }

        if tags_changed {
            self.rebuild_tags_locked();
        }
        self.emit(CacheChange::Note {
            kind,
            id: note.id,
            metadata: Some(meta.clone()),
            buffer_refresh,
        });
        Ok(meta)
    }

    /// Removes a note row. Returns the removed metadata, or `None` when the
    /// note was already absent (in which case nothing is rewritten).
    pub(crate) fn remove_note_locked(&self, id: Uuid) -> CoreResult<Option<NoteMetadata>> {
        let snapshot = self.inner.notes.read().clone();
        let Some(removed) = snapshot.get(&id).cloned() else {
            return Ok(None);
        };

        self.inner.notes.write().remove(&id);
        if let Err(err) = self.persist_notes_index_locked(&[id]) {
            *self.inner.notes.write() = snapshot;
            return Err(err);
        }

        if !removed.tags.is_empty() {
            self.rebuild_tags_locked();
        }
        self.emit(CacheChange::Note {
            kind: ChangeKind::Removed,
            id,
            metadata: None,
            buffer_refresh: true,
        });
        Ok(Some(removed))
    }

    fn persist_notes_index_locked(&self, changed_ids: &[Uuid]) -> CoreResult<()> {
        let mut rows: Vec<NoteMetadata> = self.inner.notes.read().values().cloned().collect();
        rows.sort_by_key(|row| row.id);

        let key = self.notes_index_key()?;
        let (sealed, _) = self.inner.notes_index.store(&key, &rows)?;
        self.inner
            .watch
            .record_write(self.inner.notes_index.path(), &sealed, changed_ids);
        Ok(())
    }

    /// Rebuilds `refs/tags.jsonl.enc` from the note cache. The tag index is
    /// derived data, so failures log instead of unwinding a committed save.
    fn rebuild_tags_locked(&self) {
        let mut counts: std::collections::BTreeMap<String, u64> = std::collections::BTreeMap::new();
        for row in self.inner.notes.read().values() {
            if row.is_trashed {
                continue;
            }
            for tag in &row.tags {
                *counts.entry(tag.clone()).or_default() += 1;
            }
        }
        let now = Utc::now();
        let rows: Vec<TagRow> = counts
            .into_iter()
            .map(|(tag, note_count)| TagRow {
                tag,
                note_count,
                modified_at: now,
            })
            .collect();

        match self
            .tags_index_key()
            .and_then(|key| self.inner.tags_index.store(&key, &rows))
        {
            Ok((sealed, _)) => {
                self.inner
                    .watch
                    .record_write(self.inner.tags_index.path(), &sealed, &[]);
            }
            Err(err) => warn!(%err, "tag index rewrite failed"),
        }
    }

    pub fn list_tags(&self) -> CoreResult<Vec<TagRow>> {
        let key = self.tags_index_key()?;
        self.inner.tags_index.load(&key)
    }

    // ---- reload (startup and watcher) ----

    /// Fully replaces the note cache from the index on disk and emits
    /// per-id diff events.
    pub async fn reload_notes_index(&self) -> CoreResult<Vec<CacheChange>> {
        self.ensure_live()?;
        let _guard = self.inner.serial.lock().await;
        self.reload_notes_locked(&HashSet::new())
    }

    pub(crate) fn reload_notes_locked(
        &self,
        suppress: &HashSet<Uuid>,
    ) -> CoreResult<Vec<CacheChange>> {
        let key = self.notes_index_key()?;
        let fresh: std::collections::HashMap<Uuid, NoteMetadata> = self
            .inner
            .notes_index
            .load(&key)?
            .into_iter()
            .map(|row| (row.id, row))
            .collect();

        let previous = {
            let mut cache = self.inner.notes.write();
            std::mem::replace(&mut *cache, fresh.clone())
        };

        let mut changes = Vec::new();
        for (id, row) in &fresh {
            match previous.get(id) {
                None => changes.push(CacheChange::Note {
                    kind: ChangeKind::Added,
                    id: *id,
                    metadata: Some(row.clone()),
                    buffer_refresh: true,
                }),
                Some(old) if old != row => {
                    let buffer_refresh = !self.inner.editors.has_unsaved(*id);
                    if !buffer_refresh {
                        info!(%id, "external change to a note with unsaved edits; keeping the local buffer");
                    }
                    changes.push(CacheChange::Note {
                        kind: ChangeKind::Modified,
                        id: *id,
                        metadata: Some(row.clone()),
                        buffer_refresh,
                    });
                }
                Some(_) => {}
            }
        }
        for id in previous.keys() {
            if !fresh.contains_key(id) {
                changes.push(CacheChange::Note {
                    kind: ChangeKind::Removed,
                    id: *id,
                    metadata: None,
                    buffer_refresh: true,
                });
            }
        }

        changes.retain(|change| match change {
            CacheChange::Note { id, .. } => !suppress.contains(id),
            CacheChange::Notebook { .. } => true,
        });
        for change in &changes {
            self.emit(change.clone());
        }
        Ok(changes)
    }
}
