//! Push/pull engine driving a [`SyncBackend`] for one vault.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tracing::{info, warn};
use uuid::Uuid;

use crate::backend::{LocalOnlyBackend, SyncBackend};
use crate::error::{CoreError, CoreResult};
use crate::vault::Vault;

use super::apply;

pub const BACKEND_TIMEOUT: Duration = Duration::from_secs(30);
pub const PULL_LIMIT: usize = 100;

#[derive(Debug, Clone, Default)]
pub struct SyncReport {
    pub pushed: usize,
    pub pulled: usize,
    pub success: bool,
    pub error: Option<String>,
}

pub struct SyncEngine {
    vault: Vault,
    backend: Mutex<Arc<dyn SyncBackend>>,
}

impl SyncEngine {
    /// Engine over the default [`LocalOnlyBackend`].
    pub fn new(vault: Vault) -> Self {
        SyncEngine {
            vault,
            backend: Mutex::new(Arc::new(LocalOnlyBackend::new())),
        }
    }

    pub fn with_backend(vault: Vault, backend: Arc<dyn SyncBackend>) -> Self {
        SyncEngine {
            vault,
            backend: Mutex::new(backend),
        }
    }

    pub fn set_backend(&self, backend: Arc<dyn SyncBackend>) {
        *self.backend.lock() = backend;
    }

    pub fn backend(&self) -> Arc<dyn SyncBackend> {
        Arc::clone(&self.backend.lock())
    }

    /// One push+pull round. Errors are folded into the report; pending
    /// operations are never lost on failure.
    pub async fn sync(&self) -> SyncReport {
        match self.sync_inner().await {
            Ok((pushed, pulled)) => {
                info!(pushed, pulled, "sync round complete");
                SyncReport {
                    pushed,
                    pulled,
                    success: true,
                    error: None,
                }
            }
            Err(err) => {
                warn!(%err, "sync round failed");
                SyncReport {
                    pushed: 0,
                    pulled: 0,
                    success: false,
                    error: Some(err.to_string()),
                }
            }
        }
    }

    async fn sync_inner(&self) -> CoreResult<(usize, usize)> {
        let backend = self.backend();
        let vault_id = self.vault.vault_id();

        let pushed = self.push_pending(&backend, vault_id).await?;
        let pulled = self.pull_and_apply(&backend, vault_id).await?;
        Ok((pushed, pulled))
    }

    async fn push_pending(
        &self,
        backend: &Arc<dyn SyncBackend>,
        vault_id: Uuid,
    ) -> CoreResult<usize> {
        let pending = self.vault.oplog().pending()?;
        if pending.is_empty() {
            return Ok(0);
        }

        let report = with_timeout(backend.push_ops(vault_id, pending.clone())).await?;
        let failed: HashSet<Uuid> = report.failed_op_ids.iter().copied().collect();

        let mut pushed = 0;
        for op in &pending {
            if failed.contains(&op.op_id) {
                continue;
            }
            self.vault.oplog().remove_pending(op.op_id)?;
            pushed += 1;
        }
        Ok(pushed)
    }

    async fn pull_and_apply(
        &self,
        backend: &Arc<dyn SyncBackend>,
        vault_id: Uuid,
    ) -> CoreResult<usize> {
        let mut pulled = 0;
        loop {
            let cursor = self.vault.oplog().cursor();
            let batch = with_timeout(backend.pull_ops(
                vault_id,
                Some(cursor.last_timestamp),
                PULL_LIMIT,
            ))
            .await?;

            if batch.ops.is_empty() {
                break;
            }
            for sealed in &batch.ops {
                match self.vault.oplog().open_pulled(sealed) {
                    Ok(op) => {
                        self.vault.oplog().observe_remote(op.timestamp);
                        apply::apply_operation(&self.vault, &op).await?;
                        self.vault
                            .oplog()
                            .advance_cursor(op.timestamp, Some(op.op_id))?;
                        pulled += 1;
                    }
                    Err(err) => {
                        // Never apply an op that fails decryption or
                        // signature verification; move past it.
                        warn!(op_id = %sealed.op_id, %err, "discarding unverifiable operation");
                        self.vault
                            .oplog()
                            .advance_cursor(sealed.timestamp, Some(sealed.op_id))?;
                    }
                }
            }
            if batch.ops.len() < PULL_LIMIT {
                break;
            }
        }
        Ok(pulled)
    }
}

async fn with_timeout<T>(fut: impl std::future::Future<Output = CoreResult<T>>) -> CoreResult<T> {
    tokio::time::timeout(BACKEND_TIMEOUT, fut)
        .await
        .map_err(|_| CoreError::Backend("backend call timed out".into()))?
}
