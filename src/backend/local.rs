//! The default backend: no network, no storage. Every call succeeds
//! trivially, so the engine is fully functional offline.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use uuid::Uuid;

use crate::error::CoreResult;
use crate::sync::operation::EncryptedSyncOp;

use super::{BackendStatus, PullBatch, PushReport, SyncBackend};

#[derive(Default)]
pub struct LocalOnlyBackend {
    last_sync: Mutex<Option<DateTime<Utc>>>,
}

impl LocalOnlyBackend {
    pub fn new() -> Self {
        LocalOnlyBackend::default()
    }
}

#[async_trait]
impl SyncBackend for LocalOnlyBackend {
    async fn initialize(&self) -> CoreResult<()> {
        Ok(())
    }

    async fn push_ops(&self, _vault_id: Uuid, _ops: Vec<EncryptedSyncOp>) -> CoreResult<PushReport> {
        *self.last_sync.lock() = Some(Utc::now());
        // Nothing is pushed anywhere; pending files stay local.
        Ok(PushReport {
            pushed_count: 0,
            failed_op_ids: Vec::new(),
        })
    }

    async fn pull_ops(
        &self,
        _vault_id: Uuid,
        cursor: Option<i64>,
        _limit: usize,
    ) -> CoreResult<PullBatch> {
        *self.last_sync.lock() = Some(Utc::now());
        Ok(PullBatch {
            ops: Vec::new(),
            new_cursor: cursor,
        })
    }

    async fn upload_blob(&self, _vault_id: Uuid, _blob_id: &str, _bytes: Vec<u8>) -> CoreResult<()> {
        Ok(())
    }

    async fn download_blob(&self, _vault_id: Uuid, _blob_id: &str) -> CoreResult<Option<Vec<u8>>> {
        Ok(None)
    }

    async fn blob_exists(&self, _vault_id: Uuid, _blob_id: &str) -> CoreResult<bool> {
        Ok(false)
    }

    async fn delete_blob(&self, _vault_id: Uuid, _blob_id: &str) -> CoreResult<()> {
        Ok(())
    }

    async fn status(&self) -> BackendStatus {
        BackendStatus {
            connected: true,
            authenticated: true,
            last_sync_time: *self.last_sync.lock(),
            pending_count: 0,
            total_synced: 0,
            error: None,
        }
    }
}
