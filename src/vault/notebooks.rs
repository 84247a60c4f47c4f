//! Notebook repository. Same storage pattern as notes: full blob in the
//! object store, row in `refs/notebooks.jsonl.enc`.

use std::collections::HashSet;

use serde_json::Value;
use uuid::Uuid;

use crate::error::{CoreError, CoreResult};
use crate::model::{Notebook, NotebookMetadata};
use crate::sync::clock::lamport_to_datetime;
use crate::sync::operation::{NotebookUpdate, OpType, SyncOperation};

use super::state::{CacheChange, ChangeKind};
use super::Vault;

impl Vault {
    pub async fn create_notebook(&self, name: impl Into<String>) -> CoreResult<Notebook> {
        let mut notebook = Notebook::new(name, self.vault_id());
        let meta = self.save_notebook(notebook.clone()).await?;
        notebook.modified_at = meta.modified_at;
        Ok(notebook)
    }

    pub async fn save_notebook(&self, mut notebook: Notebook) -> CoreResult<NotebookMetadata> {
        self.ensure_live()?;
        let _guard = self.inner.serial.lock().await;

        let existing = self.inner.notebooks.read().get(&notebook.id).cloned();
        let op_id = Uuid::new_v4();
        let ts = self.oplog().next_timestamp();
        if let Some(existing) = &existing {
            notebook.created_at = existing.created_at;
        }
        notebook.vault_id = self.vault_id();
        notebook.modified_at = lamport_to_datetime(ts);

        let meta = self.store_notebook_locked(&notebook, Some(op_id))?;

        let (op_type, payload) = if existing.is_some() {
            (
                OpType::UpdateNotebook,
                SyncOperation::notebook_update_payload(&NotebookUpdate::full(&notebook))?,
            )
        } else {
            (
                OpType::CreateNotebook,
                SyncOperation::notebook_payload(&notebook)?,
            )
        };
        let mut op = SyncOperation::new(op_type, notebook.id, ts, self.oplog().device_id(), payload);
        op.op_id = op_id;
        self.oplog().record(op)?;
        Ok(meta)
    }

    /// Removes the notebook row. Its notes keep their dangling `notebook_id`
    /// and surface as uncategorized until reconciled.
    pub async fn delete_notebook(&self, id: Uuid) -> CoreResult<()> {
        self.ensure_live()?;
        let _guard = self.inner.serial.lock().await;

        if self.remove_notebook_locked(id)?.is_none() {
            return Err(CoreError::NotebookMissing(id));
        }
        let ts = self.oplog().next_timestamp();
        let op = SyncOperation::new(
            OpType::DeleteNotebook,
            id,
            ts,
            self.oplog().device_id(),
            Value::Null,
        );
        self.oplog().record(op)?;
        Ok(())
    }

    pub fn notebook_metadata(&self, id: Uuid) -> Option<NotebookMetadata> {
        self.inner.notebooks.read().get(&id).cloned()
    }

    /// All notebooks ordered by name, with `note_count` refreshed from the
    /// live note cache.
    pub fn list_notebooks(&self) -> Vec<NotebookMetadata> {
        let mut rows: Vec<NotebookMetadata> =
            self.inner.notebooks.read().values().cloned().collect();
        {
            let notes = self.inner.notes.read();
            for row in &mut rows {
                row.note_count = notes
                    .values()
                    .filter(|note| !note.is_trashed && note.notebook_id == Some(row.id))
                    .count() as u64;
            }
        }
        rows.sort_by(|a, b| a.name.cmp(&b.name).then(a.id.cmp(&b.id)));
        rows
    }

    pub fn load_notebook(&self, id: Uuid) -> CoreResult<Notebook> {
        self.ensure_live()?;
        self.load_notebook_locked(id)
    }

    pub(crate) fn load_notebook_locked(&self, id: Uuid) -> CoreResult<Notebook> {
        let meta = self
            .inner
            .notebooks
            .read()
            .get(&id)
            .cloned()
            .ok_or(CoreError::NotebookMissing(id))?;
        let ciphertext = self
            .inner
            .objects
            .get(&meta.content_hash)?
            .ok_or(CoreError::NotebookMissing(id))?;

        let key = self.notebook_key(id)?;
        let plaintext = self
            .inner
            .crypto
            .open(&key, &ciphertext, id.as_bytes())
            .map_err(|_| CoreError::CorruptedObject(meta.content_hash.clone()))?;
        Ok(serde_json::from_slice(&plaintext)?)
    }

    pub(crate) fn store_notebook_locked(
        &self,
        notebook: &Notebook,
        origin_op_id: Option<Uuid>,
    ) -> CoreResult<NotebookMetadata> {
        let key = self.notebook_key(notebook.id)?;
        let plaintext = serde_json::to_vec(notebook)?;
        let ciphertext = self
            .inner
            .crypto
            .seal(&key, &plaintext, notebook.id.as_bytes())?;
        let content_hash = self.inner.objects.put(&ciphertext)?;

        let meta = NotebookMetadata::from_notebook(notebook, content_hash, origin_op_id);
        let snapshot = self.inner.notebooks.read().clone();
        let kind = if snapshot.contains_key(&notebook.id) {
            ChangeKind::Modified
        } else {
            ChangeKind::Added
        };

        self.inner.notebooks.write().insert(notebook.id, meta.clone());
        if let Err(err) = self.persist_notebooks_index_locked(&[notebook.id]) {
            *self.inner.notebooks.write() = snapshot;
            return Err(err);
        }

        self.emit(CacheChange::Notebook {
            kind,
            id: notebook.id,
            metadata: Some(meta.clone()),
        });
        Ok(meta)
    }

    pub(crate) fn remove_notebook_locked(
        &self,
        id: Uuid,
    ) -> CoreResult<Option<NotebookMetadata>> {
        let snapshot = self.inner.notebooks.read().clone();
        let Some(removed) = snapshot.get(&id).cloned() else {
            return Ok(None);
        };

        self.inner.notebooks.write().remove(&id);
        if let Err(err) = self.persist_notebooks_index_locked(&[id]) {
            *self.inner.notebooks.write() = snapshot;
            return Err(err);
        }

        self.emit(CacheChange::Notebook {
            kind: ChangeKind::Removed,
            id,
            metadata: None,
        });
        Ok(Some(removed))
    }

    fn persist_notebooks_index_locked(&self, changed_ids: &[Uuid]) -> CoreResult<()> {
        let mut rows: Vec<NotebookMetadata> =
            self.inner.notebooks.read().values().cloned().collect();
        rows.sort_by_key(|row| row.id);

        let key = self.notebooks_index_key()?;
        let (sealed, _) = self.inner.notebooks_index.store(&key, &rows)?;
        self.inner
            .watch
            .record_write(self.inner.notebooks_index.path(), &sealed, changed_ids);
        Ok(())
    }

    /// Fully replaces the notebook cache from disk and emits diff events.
    pub async fn reload_notebooks_index(&self) -> CoreResult<Vec<CacheChange>> {
        self.ensure_live()?;
        let _guard = self.inner.serial.lock().await;
        self.reload_notebooks_locked(&HashSet::new())
    }

    pub(crate) fn reload_notebooks_locked(
        &self,
        suppress: &HashSet<Uuid>,
    ) -> CoreResult<Vec<CacheChange>> {
        let key = self.notebooks_index_key()?;
        let fresh: std::collections::HashMap<Uuid, NotebookMetadata> = self
            .inner
            .notebooks_index
            .load(&key)?
            .into_iter()
            .map(|row| (row.id, row))
            .collect();

        let previous = {
            let mut cache = self.inner.notebooks.write();
            std::mem::replace(&mut *cache, fresh.clone())
        };

        let mut changes = Vec::new();
        for (id, row) in &fresh {
            match previous.get(id) {
                None => changes.push(CacheChange::Notebook {
                    kind: ChangeKind::Added,
                    id: *id,
                    metadata: Some(row.clone()),
                }),
                Some(old) if old != row => changes.push(CacheChange::Notebook {
                    kind: ChangeKind::Modified,
                    id: *id,
                    metadata: Some(row.clone()),
                }),
                Some(_) => {}
            }
        }
        for id in previous.keys() {
            if !fresh.contains_key(id) {
                changes.push(CacheChange::Notebook {
                    kind: ChangeKind::Removed,
                    id: *id,
                    metadata: None,
                });
            }
        }

        changes.retain(|change| match change {
            CacheChange::Notebook { id, .. } => !suppress.contains(id),
            CacheChange::Note { .. } => true,
        });
        for change in &changes {
            self.emit(change.clone());
        }
        Ok(changes)
    }
}
