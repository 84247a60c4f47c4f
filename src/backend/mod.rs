//! Backend abstraction: where encrypted operations go. Backends only ever
//! see ciphertext; the trait is the full trust boundary.

pub mod local;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::error::CoreResult;
use crate::sync::operation::EncryptedSyncOp;

pub use local::LocalOnlyBackend;

#[derive(Debug, Clone, Default)]
pub struct PushReport {
    pub pushed_count: usize,
    pub failed_op_ids: Vec<Uuid>,
}

#[derive(Debug, Clone, Default)]
pub struct PullBatch {
    pub ops: Vec<EncryptedSyncOp>,
    pub new_cursor: Option<i64>,
}

#[derive(Debug, Clone)]
pub struct BackendStatus {
    pub connected: bool,
    pub authenticated: bool,
    pub last_sync_time: Option<DateTime<Utc>>,
    pub pending_count: usize,
    pub total_synced: u64,
    pub error: Option<String>,
}

/// Transport for encrypted operation blobs. Implementations must treat every
/// body as opaque bytes.
#[async_trait]
pub trait SyncBackend: Send + Sync {
    async fn initialize(&self) -> CoreResult<()>;

    /// Pushes pending operations. Partial failure is reported per-op; the
    /// caller only deletes pending files for operations not listed in
    /// `failed_op_ids`.
    async fn push_ops(&self, vault_id: Uuid, ops: Vec<EncryptedSyncOp>) -> CoreResult<PushReport>;

    /// Operations with timestamps beyond `cursor`, oldest first, plus the
    /// cursor position to resume from.
    async fn pull_ops(
        &self,
        vault_id: Uuid,
        cursor: Option<i64>,
        limit: usize,
    ) -> CoreResult<PullBatch>;

    /// Optional content-addressed blob storage for backends that move large
    /// content out of band.
    async fn upload_blob(&self, vault_id: Uuid, blob_id: &str, bytes: Vec<u8>) -> CoreResult<()>;
    async fn download_blob(&self, vault_id: Uuid, blob_id: &str) -> CoreResult<Option<Vec<u8>>>;
    async fn blob_exists(&self, vault_id: Uuid, blob_id: &str) -> CoreResult<bool>;
    async fn delete_blob(&self, vault_id: Uuid, blob_id: &str) -> CoreResult<()>;

    async fn status(&self) -> BackendStatus;
}
