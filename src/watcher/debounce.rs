//! Per-path debouncing of filesystem events. Cloud sync clients stat-churn
//! and write through rename cascades, so raw notifications arrive in bursts;
//! only the last event of a burst survives the window.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::mpsc;

pub const DEBOUNCE_WINDOW: Duration = Duration::from_millis(400);

#[derive(Clone)]
pub struct Debouncer {
    window: Duration,
    generations: Arc<Mutex<HashMap<PathBuf, u64>>>,
    out: mpsc::UnboundedSender<PathBuf>,
}

impl Debouncer {
    pub fn new(window: Duration) -> (Self, mpsc::UnboundedReceiver<PathBuf>) {
        let (out, rx) = mpsc::unbounded_channel();
        (
            Debouncer {
                window,
                generations: Arc::new(Mutex::new(HashMap::new())),
                out,
            },
            rx,
        )
    }

    /// Registers an event for `path`. The path is emitted once no further
    /// event for it arrives within the window.
    pub fn observe(&self, path: PathBuf) {
        let generation = {
            let mut map = self.generations.lock();
            let counter = map.entry(path.clone()).or_insert(0);
            *counter += 1;
            *counter
        };

        let this = self.clone();
        tokio::spawn(async move {
            tokio::time::sleep(this.window).await;
            let latest = {
                let mut map = this.generations.lock();
                if map.get(&path) == Some(&generation) {
                    map.remove(&path);
                    true
                } else {
                    false
                }
            };
            if latest {
                let _ = this.out.send(path);
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn burst_coalesces_to_one_emission() {
        let (debouncer, mut rx) = Debouncer::new(Duration::from_millis(30));
        let path = PathBuf::from("/v/refs/notes.jsonl.enc");

        for _ in 0..10 {
            debouncer.observe(path.clone());
            tokio::time::sleep(Duration::from_millis(5)).await;
        }

        let emitted = tokio::time::timeout(Duration::from_millis(500), rx.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(emitted, path);

        // No second emission for the same burst.
        assert!(
            tokio::time::timeout(Duration::from_millis(100), rx.recv())
                .await
                .is_err()
        );
    }

    #[tokio::test]
    async fn distinct_paths_do_not_suppress_each_other() {
        let (debouncer, mut rx) = Debouncer::new(Duration::from_millis(20));
        debouncer.observe(PathBuf::from("/a"));
        debouncer.observe(PathBuf::from("/b"));

        let mut seen = Vec::new();
        for _ in 0..2 {
            seen.push(
                tokio::time::timeout(Duration::from_millis(500), rx.recv())
                    .await
                    .unwrap()
                    .unwrap(),
            );
        }
        seen.sort();
        assert_eq!(seen, vec![PathBuf::from("/a"), PathBuf::from("/b")]);
    }

    #[tokio::test]
    async fn separate_bursts_emit_separately() {
        let (debouncer, mut rx) = Debouncer::new(Duration::from_millis(20));
        let path = PathBuf::from("/a");

        debouncer.observe(path.clone());
        let first = tokio::time::timeout(Duration::from_millis(500), rx.recv())
            .await
            .unwrap();
        assert!(first.is_some());

        debouncer.observe(path.clone());
        let second = tokio::time::timeout(Duration::from_millis(500), rx.recv())
            .await
            .unwrap();
        assert!(second.is_some());
    }
}
