//! Per-vault encrypted store: content-addressed objects, encrypted metadata
//! indices, and the note/notebook repository. All mutations and reloads for
//! one vault are serialized behind a single async mutex; reads come from the
//! in-memory metadata cache and never wait on I/O.

pub mod fs;
pub mod header;
pub mod index;
mod notebooks;
mod notes;
pub mod objects;
pub mod state;

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use tokio::sync::broadcast;
use uuid::Uuid;

use crate::crypto::keys::{ContentKey, NotebookKey, SearchIndexKey, SymmetricKey, VaultKey};
use crate::crypto::CryptoService;
use crate::error::{CoreError, CoreResult};
use crate::model::{NoteMetadata, NotebookMetadata, TagRow};
use crate::sync::oplog::OpLog;

pub use crate::sync::oplog::DeviceIdentity;
pub use header::{VaultHeader, HEADER_FILE};
pub use index::{EncryptedIndex, REFS_DIR};
pub use notes::VaultStats;
pub use objects::{ObjectStore, OBJECTS_DIR};
pub use state::{CacheChange, ChangeKind, EditorRegistry, WatchState};

pub const NOTES_INDEX_FILE: &str = "notes.jsonl.enc";
pub const NOTEBOOKS_INDEX_FILE: &str = "notebooks.jsonl.enc";
pub const TAGS_INDEX_FILE: &str = "tags.jsonl.enc";

const NOTES_INDEX_INFO: &str = "witflo.index.notes.v2";
const NOTEBOOKS_INDEX_INFO: &str = "witflo.index.notebooks.v2";
const TAGS_INDEX_INFO: &str = "witflo.index.tags.v2";

const EVENT_CAPACITY: usize = 1024;

/// Creates the on-disk skeleton of a new vault.
pub fn scaffold(vault_root: &Path, vault_id: Uuid) -> CoreResult<()> {
    let refs = vault_root.join(REFS_DIR);
    std::fs::create_dir_all(&refs).map_err(|e| CoreError::io(&refs, e))?;
    let pending = vault_root.join("sync").join("pending");
    std::fs::create_dir_all(&pending).map_err(|e| CoreError::io(&pending, e))?;
    ObjectStore::init(vault_root)?;
    VaultHeader::new(vault_id).store(vault_root)?;
    Ok(())
}

pub(crate) struct VaultInner {
    pub(crate) vault_id: Uuid,
    pub(crate) root: PathBuf,
    pub(crate) key: Mutex<VaultKey>,
    pub(crate) crypto: CryptoService,
    pub(crate) objects: ObjectStore,
    pub(crate) notes_index: EncryptedIndex<NoteMetadata>,
    pub(crate) notebooks_index: EncryptedIndex<NotebookMetadata>,
    pub(crate) tags_index: EncryptedIndex<TagRow>,
    pub(crate) notes: RwLock<HashMap<Uuid, NoteMetadata>>,
    pub(crate) notebooks: RwLock<HashMap<Uuid, NotebookMetadata>>,
    /// Serializes every mutation, reload, and operation apply for this
    /// vault. The concurrency-correctness keystone.
    pub(crate) serial: tokio::sync::Mutex<()>,
    pub(crate) events: broadcast::Sender<CacheChange>,
    pub(crate) editors: EditorRegistry,
    pub(crate) watch: Arc<WatchState>,
    pub(crate) oplog: OpLog,
    pub(crate) header: Mutex<VaultHeader>,
    pub(crate) disposed: AtomicBool,
}

/// Handle to an unlocked vault. Cloning shares the underlying state; closing
/// (or dropping the last clone) zeroizes the vault key copy and every
/// derived key.
#[derive(Clone)]
pub struct Vault {
    pub(crate) inner: Arc<VaultInner>,
}

impl Vault {
    pub fn open(
        root: PathBuf,
        vault_id: Uuid,
        key: VaultKey,
        device: DeviceIdentity,
        crypto: CryptoService,
    ) -> CoreResult<Vault> {
        let header = match VaultHeader::load(&root) {
            Ok(header) => header,
            Err(err @ CoreError::UnsupportedVersion { .. }) => return Err(err),
            Err(_) => return Err(CoreError::VaultNotFound(vault_id)),
        };
        if header.vault_id != vault_id {
            return Err(CoreError::InvalidInput(format!(
                "vault header id mismatch: expected {vault_id}, found {}",
                header.vault_id
            )));
        }

        let watch = Arc::new(WatchState::new());
        let oplog = OpLog::open(&root, &key, device, Arc::clone(&watch))?;
        let objects = ObjectStore::init(&root)?;
        let (events, _) = broadcast::channel(EVENT_CAPACITY);

        let vault = Vault {
            inner: Arc::new(VaultInner {
                vault_id,
                notes_index: EncryptedIndex::new(&root, NOTES_INDEX_FILE, b"witflo.index.notes"),
                notebooks_index: EncryptedIndex::new(
                    &root,
                    NOTEBOOKS_INDEX_FILE,
                    b"witflo.index.notebooks",
                ),
                tags_index: EncryptedIndex::new(&root, TAGS_INDEX_FILE, b"witflo.index.tags"),
                root,
                key: Mutex::new(key),
                crypto,
                objects,
                notes: RwLock::new(HashMap::new()),
                notebooks: RwLock::new(HashMap::new()),
                serial: tokio::sync::Mutex::new(()),
                events,
                editors: EditorRegistry::new(),
                watch,
                oplog,
                header: Mutex::new(header),
                disposed: AtomicBool::new(false),
            }),
        };
        vault.prime_caches()?;
        Ok(vault)
    }

    fn prime_caches(&self) -> CoreResult<()> {
        let notes = self
            .inner
            .notes_index
            .load(&self.notes_index_key()?)?
            .into_iter()
            .map(|row| (row.id, row))
            .collect();
        *self.inner.notes.write() = notes;

        let notebooks = self
            .inner
            .notebooks_index
            .load(&self.notebooks_index_key()?)?
            .into_iter()
            .map(|row| (row.id, row))
            .collect();
        *self.inner.notebooks.write() = notebooks;
        Ok(())
    }

    pub fn vault_id(&self) -> Uuid {
        self.inner.vault_id
    }

    pub fn root(&self) -> &Path {
        &self.inner.root
    }

    pub fn header(&self) -> VaultHeader {
        self.inner.header.lock().clone()
    }

    /// Per-id cache change events; see [`CacheChange`].
    pub fn subscribe(&self) -> broadcast::Receiver<CacheChange> {
        self.inner.events.subscribe()
    }

    /// Registers an open editor for a note, so external reloads know not to
    /// clobber in-flight work.
    pub fn open_editor(&self, id: Uuid) {
        self.inner.editors.open_editor(id);
    }

    pub fn set_editor_dirty(&self, id: Uuid, dirty: bool) {
        self.inner.editors.set_dirty(id, dirty);
    }

    pub fn close_editor(&self, id: Uuid) {
        self.inner.editors.close_editor(id);
    }

    /// Zeroizes the vault key copy and the derived operation key. Any later
    /// use of this handle fails.
    pub fn close(&self) {
        if self.inner.disposed.swap(true, Ordering::AcqRel) {
            return;
        }
        self.inner.key.lock().dispose();
        self.inner.oplog.dispose();
    }

    /// Re-reads the plaintext vault header after an external change.
    pub fn reload_header(&self) -> CoreResult<()> {
        let header = VaultHeader::load(&self.inner.root)?;
        *self.inner.header.lock() = header;
        Ok(())
    }

    pub(crate) fn ensure_live(&self) -> CoreResult<()> {
        if self.inner.disposed.load(Ordering::Acquire) {
            return Err(CoreError::InvariantViolated(
                "vault handle used after close".into(),
            ));
        }
        Ok(())
    }

    pub(crate) fn content_key(&self, note_id: Uuid) -> CoreResult<ContentKey> {
        let key = self.inner.key.lock();
        Ok(key.derive(&format!("witflo.content.{note_id}.v2"))?)
    }

    pub(crate) fn notebook_key(&self, notebook_id: Uuid) -> CoreResult<NotebookKey> {
        let key = self.inner.key.lock();
        Ok(key.derive(&format!("witflo.notebook.{notebook_id}.v2"))?)
    }

    pub(crate) fn notes_index_key(&self) -> CoreResult<SearchIndexKey> {
        Ok(self.inner.key.lock().derive(NOTES_INDEX_INFO)?)
    }

    pub(crate) fn notebooks_index_key(&self) -> CoreResult<SearchIndexKey> {
        Ok(self.inner.key.lock().derive(NOTEBOOKS_INDEX_INFO)?)
    }

    pub(crate) fn tags_index_key(&self) -> CoreResult<SearchIndexKey> {
        Ok(self.inner.key.lock().derive(TAGS_INDEX_INFO)?)
    }

    pub(crate) fn emit(&self, change: CacheChange) {
        // Nobody listening is fine.
        let _ = self.inner.events.send(change);
    }

    pub(crate) fn oplog(&self) -> &OpLog {
        &self.inner.oplog
    }

    pub(crate) fn watch_state(&self) -> &Arc<WatchState> {
        &self.inner.watch
    }
}

impl Drop for VaultInner {
    fn drop(&mut self) {
        self.key.get_mut().dispose();
        self.oplog.dispose();
    }
}
