use std::future::Future;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio::task::JoinHandle;

/// Bounded pool of command workers.
///
/// Tasks are spawned immediately and wait for a permit, so at most `limit`
/// run their body at once while submission never blocks.
pub struct WorkerPool {
    permits: Arc<Semaphore>,
    limit: usize,
}

impl WorkerPool {
    pub fn new(limit: usize) -> Self {
        let limit = limit.max(1);
        Self {
            permits: Arc::new(Semaphore::new(limit)),
            limit,
        }
    }

    pub fn spawn<F>(&self, task: F) -> JoinHandle<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let permits = self.permits.clone();
        tokio::spawn(async move {
            let Ok(_permit) = permits.acquire_owned().await else {
                tracing::error!("Worker pool closed, task dropped");
                return;
            };
            task.await;
        })
    }

    pub fn limit(&self) -> usize {
        self.limit
    }
}

impl Default for WorkerPool {
    fn default() -> Self {
        Self::new(32)
    }
}
