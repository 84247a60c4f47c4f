//! Idle auto-lock. The timer is reset on every user-initiated operation;
//! expiry (or a host "background" signal, when configured) locks the
//! workspace and zeroizes its key material.

use std::sync::{Arc, Weak};
use std::time::Duration;

use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::info;

use super::manager::UnlockedWorkspace;

#[derive(Debug, Clone, Copy)]
pub struct AutoLockConfig {
    pub idle_duration: Duration,
    pub lock_on_background: bool,
}

impl Default for AutoLockConfig {
    fn default() -> Self {
        AutoLockConfig {
            idle_duration: Duration::from_secs(5 * 60),
            lock_on_background: false,
        }
    }
}

struct AutoLockInner {
    deadline: Mutex<Instant>,
    config: AutoLockConfig,
    workspace: Weak<UnlockedWorkspace>,
}

pub struct AutoLock {
    inner: Arc<AutoLockInner>,
    task: JoinHandle<()>,
}

impl AutoLock {
    pub fn spawn(workspace: Weak<UnlockedWorkspace>, config: AutoLockConfig) -> Self {
        let inner = Arc::new(AutoLockInner {
            deadline: Mutex::new(Instant::now() + config.idle_duration),
            config,
            workspace,
        });

        let timer = Arc::clone(&inner);
        let task = tokio::spawn(async move {
            loop {
                let deadline = *timer.deadline.lock();
                if Instant::now() >= deadline {
                    if let Some(workspace) = timer.workspace.upgrade() {
                        info!("auto-lock timer expired, locking workspace");
                        workspace.lock();
                    }
                    break;
                }
                tokio::time::sleep_until(deadline).await;
            }
        });

        AutoLock { inner, task }
    }

    /// Pushes the deadline out by the configured idle duration.
    pub fn reset(&self) {
        *self.inner.deadline.lock() = Instant::now() + self.inner.config.idle_duration;
    }

    /// Host signal that the application moved to the background.
    pub fn on_background(&self) {
        if !self.inner.config.lock_on_background {
            return;
        }
        if let Some(workspace) = self.inner.workspace.upgrade() {
            info!("host went to background, locking workspace");
            workspace.lock();
        }
    }
}

impl Drop for AutoLock {
    fn drop(&mut self) {
        self.task.abort();
    }
}
