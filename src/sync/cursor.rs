use std::path::Path;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::crypto::keys::{OperationKey, SymmetricKey};
use crate::error::{CoreError, CoreResult};
use crate::vault::fs;

const CURSOR_AAD: &[u8] = b"witflo.sync.cursor";

/// Sync progress marker, persisted encrypted at `sync/cursor.enc`. Advances
/// monotonically and is never rewound.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyncCursor {
    pub last_timestamp: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_op_id: Option<Uuid>,
    pub synced_count: u64,
    pub updated_at: DateTime<Utc>,
}

impl SyncCursor {
    pub fn new() -> Self {
        SyncCursor {
            last_timestamp: 0,
            last_op_id: None,
            synced_count: 0,
            updated_at: Utc::now(),
        }
    }

    /// Missing file means a fresh cursor; a file that fails authentication
    /// is corrupt.
    pub fn load(path: &Path, key: &OperationKey) -> CoreResult<Self> {
        let Some(sealed) = fs::read_bytes_opt(path)? else {
            return Ok(SyncCursor::new());
        };
        let plaintext = key
            .open(&sealed, CURSOR_AAD)
            .map_err(|_| CoreError::CorruptedIndex(path.to_path_buf()))?;
        Ok(serde_json::from_slice(&plaintext)?)
    }

    pub fn store(&self, path: &Path, key: &OperationKey) -> CoreResult<()> {
        let plaintext = serde_json::to_vec(self)?;
        let sealed = key.seal(&plaintext, CURSOR_AAD)?;
        fs::atomic_write(path, &sealed)
    }

    /// Folds an observed timestamp in without ever moving backwards.
    pub fn advance(&mut self, timestamp: i64, op_id: Option<Uuid>) {
        if timestamp > self.last_timestamp {
            self.last_timestamp = timestamp;
            self.last_op_id = op_id;
        }
        self.synced_count += 1;
        self.updated_at = Utc::now();
    }

    /// Records the device clock after local production, without counting a
    /// synced operation.
    pub fn observe_clock(&mut self, timestamp: i64) {
        if timestamp > self.last_timestamp {
            self.last_timestamp = timestamp;
        }
        self.updated_at = Utc::now();
    }
}

impl Default for SyncCursor {
    fn default() -> Self {
        Self::new()
    }
}
