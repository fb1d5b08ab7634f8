use std::num::NonZeroUsize;
use std::sync::Arc;

use tokio::sync::Semaphore;
use tracing::error;

use super::errors::AdapterError;

/// Bounded pool for blocking service calls.
///
/// At most `size` jobs run at once; further jobs wait for a permit before
/// they are handed to tokio's blocking threads.
#[derive(Clone)]
pub struct WorkerPool {
    permits: Arc<Semaphore>,
    size: usize,
}

impl WorkerPool {
    pub fn new(size: NonZeroUsize) -> Self {
        Self {
            permits: Arc::new(Semaphore::new(size.get())),
            size: size.get(),
        }
    }

    pub fn size(&self) -> usize {
        self.size
    }

    /// Run a blocking job on the pool and wait for its result.
    ///
    /// The permit travels with the job, so a caller that stops waiting (for
    /// example after a timeout) keeps the slot occupied until the job returns.
    pub async fn run<F, R>(&self, job: F) -> Result<R, AdapterError>
    where
        F: FnOnce() -> R + Send + 'static,
        R: Send + 'static,
    {
        let permit = self
            .permits
            .clone()
            .acquire_owned()
            .await
            .map_err(|_| AdapterError::AdapterFailure {
                cause: "worker pool closed".to_string(),
            })?;

        tokio::task::spawn_blocking(move || {
            let _permit = permit;
            job()
        })
        .await
        .map_err(|e| {
            error!(event = "core.pool.job_failed", error = %e);
            AdapterError::AdapterFailure {
                cause: format!("worker job failed: {e}"),
            }
        })
    }
}
