//! Named background task registry.
//!
//! Async operations (stability waits, drain waits, pending-scale
//! loops) are fire-and-forget toward their callers but must stay
//! observable: each spawn is registered under a name, and tests can
//! await the handle. A later spawn under the same name supersedes the
//! registry entry without cancelling the running task; the superseded
//! task runs to its bound and its final writes are harmless.

use std::collections::HashMap;
use std::future::Future;
use std::sync::Mutex;

use tokio::task::JoinHandle;
use tracing::debug;

pub struct TaskRegistry {
    tasks: Mutex<HashMap<String, JoinHandle<()>>>,
    /// Completed entries are pruned once the registry grows past this.
    capacity: usize,
}

impl TaskRegistry {
    pub fn new(capacity: usize) -> Self {
        Self {
            tasks: Mutex::new(HashMap::new()),
            capacity,
        }
    }

    /// Spawn a task onto tokio and register its handle under `name`.
    pub fn spawn<F>(&self, name: &str, future: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let handle = tokio::spawn(future);
        let mut tasks = self.tasks.lock().unwrap_or_else(|e| e.into_inner());
        if tasks.len() >= self.capacity {
            tasks.retain(|_, h| !h.is_finished());
        }
        if tasks.insert(name.to_string(), handle).is_some() {
            debug!(task = %name, "superseded registered task");
        }
    }

    /// Await the named task to completion. Returns false if no task
    /// is registered under that name.
    pub async fn wait(&self, name: &str) -> bool {
        let handle = {
            let mut tasks = self.tasks.lock().unwrap_or_else(|e| e.into_inner());
            tasks.remove(name)
        };
        match handle {
            Some(handle) => {
                let _ = handle.await;
                true
            }
            None => false,
        }
    }

    /// Await every registered task.
    pub async fn wait_all(&self) {
        loop {
            let entry = {
                let mut tasks = self.tasks.lock().unwrap_or_else(|e| e.into_inner());
                tasks.keys().next().cloned()
            };
            match entry {
                Some(name) => {
                    self.wait(&name).await;
                }
                None => return,
            }
        }
    }

    pub fn len(&self) -> usize {
        self.tasks.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for TaskRegistry {
    fn default() -> Self {
        Self::new(256)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    #[tokio::test]
    async fn spawn_and_wait() {
        let registry = TaskRegistry::default();
        let counter = Arc::new(AtomicU32::new(0));

        let c = counter.clone();
        registry.spawn("bump", async move {
            c.fetch_add(1, Ordering::SeqCst);
        });

        assert!(registry.wait("bump").await);
        assert_eq!(counter.load(Ordering::SeqCst), 1);
        assert!(!registry.wait("bump").await);
    }

    #[tokio::test]
    async fn superseding_does_not_cancel() {
        let registry = TaskRegistry::default();
        let counter = Arc::new(AtomicU32::new(0));
        let (tx, rx) = tokio::sync::oneshot::channel::<()>();
        let (done_tx, done_rx) = tokio::sync::oneshot::channel::<()>();

        let c = counter.clone();
        registry.spawn("job", async move {
            let _ = rx.await;
            c.fetch_add(1, Ordering::SeqCst);
            let _ = done_tx.send(());
        });
        let c = counter.clone();
        registry.spawn("job", async move {
            c.fetch_add(10, Ordering::SeqCst);
        });

        // The first task still runs even though it left the registry.
        let _ = tx.send(());
        done_rx.await.unwrap();
        registry.wait_all().await;
        assert_eq!(counter.load(Ordering::SeqCst), 11);
    }
}
