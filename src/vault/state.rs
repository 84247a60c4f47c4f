//! Shared state between the vault repository and its file watcher: change
//! events, the self-write suppression map, and the open-editor registry.

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use uuid::Uuid;

use crate::crypto::hash::blake2b_256;
use crate::model::{NoteMetadata, NotebookMetadata};

/// How long a just-written file suppresses per-id change events for the ids
/// it was written for.
pub const SELF_WRITE_WINDOW: Duration = Duration::from_secs(2);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeKind {
    Added,
    Modified,
    Removed,
}

/// Per-id cache invalidation event delivered to subscribers.
#[derive(Debug, Clone)]
pub enum CacheChange {
    Note {
        kind: ChangeKind,
        id: Uuid,
        metadata: Option<NoteMetadata>,
        /// False when an open editor with unsaved changes suppressed the
        /// content push; the cache row is still refreshed.
        buffer_refresh: bool,
    },
    Notebook {
        kind: ChangeKind,
        id: Uuid,
        metadata: Option<NotebookMetadata>,
    },
}

/// Hash-dedup and self-write bookkeeping shared with the watcher pipeline.
/// Critical sections are map lookups only.
pub struct WatchState {
    last_hash: Mutex<HashMap<PathBuf, [u8; 32]>>,
    marks: Mutex<HashMap<PathBuf, Vec<(Uuid, Instant)>>>,
}

impl WatchState {
    pub fn new() -> Self {
        WatchState {
            last_hash: Mutex::new(HashMap::new()),
            marks: Mutex::new(HashMap::new()),
        }
    }

    /// Records a write performed by this instance: the content hash (so the
    /// watcher drops the echo event) and a suppression mark per record id.
    pub fn record_write(&self, path: &Path, bytes: &[u8], ids: &[Uuid]) {
        let digest = blake2b_256(bytes);
        self.last_hash.lock().insert(path.to_path_buf(), digest);

        if !ids.is_empty() {
            let now = Instant::now();
            let mut marks = self.marks.lock();
            let entry = marks.entry(path.to_path_buf()).or_default();
            entry.retain(|(_, at)| at.elapsed() < SELF_WRITE_WINDOW);
            entry.extend(ids.iter().map(|&id| (id, now)));
        }
    }

    /// True if `bytes` hash to the last content seen for `path`. Updates the
    /// stored hash either way, so the next event compares against this one.
    pub fn is_unchanged(&self, path: &Path, bytes: &[u8]) -> bool {
        let digest = blake2b_256(bytes);
        let mut map = self.last_hash.lock();
        match map.insert(path.to_path_buf(), digest) {
            Some(previous) => previous == digest,
            None => false,
        }
    }

    /// Record ids written to `path` by this instance within the suppression
    /// window.
    pub fn recent_marks(&self, path: &Path) -> HashSet<Uuid> {
        let mut marks = self.marks.lock();
        match marks.get_mut(path) {
            Some(entry) => {
                entry.retain(|(_, at)| at.elapsed() < SELF_WRITE_WINDOW);
                entry.iter().map(|&(id, _)| id).collect()
            }
            None => HashSet::new(),
        }
    }

    pub fn recently_marked(&self, path: &Path) -> bool {
        !self.recent_marks(path).is_empty()
    }
}

impl Default for WatchState {
    fn default() -> Self {
        Self::new()
    }
}

/// Which notes have an open editor, and whether that editor holds unsaved
/// changes. External updates never clobber an editor with unsaved changes;
/// the local edit wins when it is saved.
pub struct EditorRegistry {
    states: Mutex<HashMap<Uuid, bool>>,
}

impl EditorRegistry {
    pub fn new() -> Self {
        EditorRegistry {
            states: Mutex::new(HashMap::new()),
        }
    }

    pub fn open_editor(&self, id: Uuid) {
        self.states.lock().entry(id).or_insert(false);
    }

    pub fn set_dirty(&self, id: Uuid, dirty: bool) {
        self.states.lock().insert(id, dirty);
    }

    pub fn close_editor(&self, id: Uuid) {
        self.states.lock().remove(&id);
    }

    pub fn has_unsaved(&self, id: Uuid) -> bool {
        self.states.lock().get(&id).copied().unwrap_or(false)
    }
}

impl Default for EditorRegistry {
    fn default() -> Self {
        Self::new()
    }
}
