//! The local operation log: signing and encrypting locally produced
//! operations into `sync/pending/`, and bookkeeping for the Lamport clock
//! and cursor.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use ed25519_dalek::SigningKey;
use parking_lot::Mutex;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::crypto::keys::{OperationKey, SymmetricKey, VaultKey};
use crate::error::{CoreError, CoreResult};
use crate::vault::fs;
use crate::vault::state::WatchState;

use super::clock::LamportClock;
use super::cursor::SyncCursor;
use super::operation::{EncryptedSyncOp, SyncOperation, OP_KEY_INFO};

pub const PENDING_SUFFIX: &str = ".op.enc";

/// This device's sync identity: a stable id plus its Ed25519 signing key.
pub struct DeviceIdentity {
    pub device_id: Uuid,
    pub signing_key: SigningKey,
}

pub struct OpLog {
    sync_dir: PathBuf,
    pending_dir: PathBuf,
    device: DeviceIdentity,
    op_key: Mutex<OperationKey>,
    clock: LamportClock,
    cursor: Mutex<SyncCursor>,
    watch: Arc<WatchState>,
}

impl OpLog {
    pub fn open(
        vault_root: &Path,
        vault_key: &VaultKey,
        device: DeviceIdentity,
        watch: Arc<WatchState>,
    ) -> CoreResult<Self> {
        let sync_dir = vault_root.join("sync");
        let pending_dir = sync_dir.join("pending");
        std::fs::create_dir_all(&pending_dir).map_err(|e| CoreError::io(&pending_dir, e))?;

        let op_key: OperationKey = vault_key.derive(OP_KEY_INFO)?;
        let cursor = SyncCursor::load(&sync_dir.join("cursor.enc"), &op_key)?;
        let clock = LamportClock::new(cursor.last_timestamp);

        Ok(OpLog {
            sync_dir,
            pending_dir,
            device,
            op_key: Mutex::new(op_key),
            clock,
            cursor: Mutex::new(cursor),
            watch,
        })
    }

    pub fn device_id(&self) -> Uuid {
        self.device.device_id
    }

    /// Timestamp for the next locally produced operation.
    pub fn next_timestamp(&self) -> i64 {
        self.clock.tick()
    }

    /// Folds a remote operation's timestamp into the local clock.
    pub fn observe_remote(&self, timestamp: i64) {
        self.clock.observe(timestamp);
    }

    pub fn cursor(&self) -> SyncCursor {
        self.cursor.lock().clone()
    }

    fn cursor_path(&self) -> PathBuf {
        self.sync_dir.join("cursor.enc")
    }

    pub fn pending_path(&self, op_id: Uuid) -> PathBuf {
        self.pending_dir
            .join(format!("{op_id}{PENDING_SUFFIX}"))
    }

    /// Signs, encrypts, and queues an operation, then persists the clock.
    pub fn record(&self, mut op: SyncOperation) -> CoreResult<EncryptedSyncOp> {
        op.sign(&self.device.signing_key)?;
        let key = self.op_key.lock();
        let sealed = EncryptedSyncOp::seal(&op, &key)?;

        let path = self.pending_path(op.op_id);
        fs::atomic_write(&path, &sealed.ciphertext)?;
        self.watch
            .record_write(&path, &sealed.ciphertext, &[op.target_id]);

        let mut cursor = self.cursor.lock();
        cursor.observe_clock(self.clock.current());
        cursor.store(&self.cursor_path(), &key)?;
        debug!(op_id = %op.op_id, ts = op.timestamp, ty = ?op.op_type, "queued operation");
        Ok(sealed)
    }

    /// All queued operations, oldest timestamp first. Files that fail to
    /// parse or decrypt are skipped with a warning; they stay on disk.
    pub fn pending(&self) -> CoreResult<Vec<EncryptedSyncOp>> {
        let key = self.op_key.lock();
        let mut ops = Vec::new();
        let entries = std::fs::read_dir(&self.pending_dir)
            .map_err(|e| CoreError::io(&self.pending_dir, e))?;
        for entry in entries {
            let entry = entry.map_err(|e| CoreError::io(&self.pending_dir, e))?;
            let path = entry.path();
            let Some(op_id) = parse_pending_name(&path) else {
                continue;
            };
            let ciphertext = fs::read_bytes(&path)?;
            // Decrypt to recover the timestamp for the wire form.
            let sealed = EncryptedSyncOp::from_blob(op_id, ciphertext, 0);
            match sealed.open(&key) {
                Ok(op) => ops.push(EncryptedSyncOp {
                    timestamp: op.timestamp,
                    ..sealed
                }),
                Err(err) => {
                    warn!(%op_id, %err, "skipping undecryptable pending operation");
                }
            }
        }
        ops.sort_by_key(|op| (op.timestamp, op.op_id));
        Ok(ops)
    }

    pub fn pending_count(&self) -> usize {
        std::fs::read_dir(&self.pending_dir)
            .map(|entries| {
                entries
                    .filter_map(|e| e.ok())
                    .filter(|e| parse_pending_name(&e.path()).is_some())
                    .count()
            })
            .unwrap_or(0)
    }

    pub fn remove_pending(&self, op_id: Uuid) -> CoreResult<()> {
        let path = self.pending_path(op_id);
        match std::fs::remove_file(&path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(CoreError::io(&path, e)),
        }
    }

    /// Decrypts and verifies an operation file written by another instance.
    pub fn open_external(&self, op_id: Uuid, ciphertext: Vec<u8>) -> CoreResult<SyncOperation> {
        let key = self.op_key.lock();
        EncryptedSyncOp::from_blob(op_id, ciphertext, 0).open(&key)
    }

    /// Decrypts a pulled wire operation.
    pub fn open_pulled(&self, sealed: &EncryptedSyncOp) -> CoreResult<SyncOperation> {
        let key = self.op_key.lock();
        sealed.open(&key)
    }

    /// Advances the persisted cursor after applying a pulled operation.
    pub fn advance_cursor(&self, timestamp: i64, op_id: Option<Uuid>) -> CoreResult<()> {
        let key = self.op_key.lock();
        let mut cursor = self.cursor.lock();
        cursor.advance(timestamp, op_id);
        cursor.store(&self.cursor_path(), &key)
    }

    /// Re-reads the cursor after an external change to `sync/cursor.enc`.
    pub fn reload_cursor(&self) -> CoreResult<()> {
        let key = self.op_key.lock();
        let on_disk = SyncCursor::load(&self.cursor_path(), &key)?;
        let mut cursor = self.cursor.lock();
        // Monotone: keep whichever side is further along.
        if on_disk.last_timestamp > cursor.last_timestamp {
            self.clock.observe(on_disk.last_timestamp);
            *cursor = on_disk;
        }
        Ok(())
    }

    pub fn dispose(&self) {
        self.op_key.lock().dispose();
    }
}

pub fn parse_pending_name(path: &Path) -> Option<Uuid> {
    let name = path.file_name()?.to_str()?;
    let stem = name.strip_suffix(PENDING_SUFFIX)?;
    Uuid::parse_str(stem).ok()
}
