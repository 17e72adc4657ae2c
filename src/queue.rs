use std::future::Future;
use std::sync::Arc;

use tokio::sync::Semaphore;
use tokio::task::JoinHandle;

/// Semaphore-gated task spawner: any number of chapter chains may be
/// queued, at most `max_concurrency` make progress at once. Handles are
/// returned so the run can await every chapter and aggregate a summary.
#[derive(Debug, Clone)]
pub struct DownloadQueue {
    semaphore: Arc<Semaphore>,
}

impl DownloadQueue {
    pub fn new(max_concurrency: usize) -> Self {
        let permits = max_concurrency.max(1);
        Self {
            semaphore: Arc::new(Semaphore::new(permits)),
        }
    }

    pub fn spawn<F, T>(&self, fut: F) -> JoinHandle<T>
    where
        F: Future<Output = T> + Send + 'static,
        T: Send + 'static,
    {
        let semaphore = Arc::clone(&self.semaphore);
        tokio::spawn(async move {
            let _permit = semaphore
                .acquire_owned()
                .await
                .expect("download queue semaphore is closed");
            fut.await
        })
    }
}
