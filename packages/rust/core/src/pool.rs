//! Bounded worker pool shared by every feed.

use std::future::Future;
use std::sync::Arc;

use tokio::sync::Semaphore;
use tokio::task::{AbortHandle, JoinSet};

/// A fixed number of permits gating every compute task in the process.
///
/// Submission never blocks or fails: tasks are spawned immediately and wait
/// for a permit before running their body. Clones share the same permits.
#[derive(Debug, Clone)]
pub struct WorkerPool {
    permits: Arc<Semaphore>,
    size: usize,
}

impl WorkerPool {
    pub fn new(workers: usize) -> Self {
        let size = workers.max(1);
        Self {
            permits: Arc::new(Semaphore::new(size)),
            size,
        }
    }

    /// Configured number of workers.
    pub fn size(&self) -> usize {
        self.size
    }

    /// Workers not currently running a task.
    pub fn idle(&self) -> usize {
        self.permits.available_permits()
    }

    /// Spawn `fut` into `set`, running it once a worker is free.
    ///
    /// Aborting the returned handle (or the set) drops the task whether it is
    /// still queued or already running; its permit is released either way.
    pub fn spawn_into<T, Fut>(&self, set: &mut JoinSet<T>, fut: Fut) -> AbortHandle
    where
        T: Send + 'static,
        Fut: Future<Output = T> + Send + 'static,
    {
        let permits = Arc::clone(&self.permits);
        set.spawn(async move {
            // The semaphore is never closed, so acquisition only waits.
            let _permit = permits.acquire_owned().await.ok();
            fut.await
        })
    }
}

impl Default for WorkerPool {
    fn default() -> Self {
        Self::new(10)
    }
}
