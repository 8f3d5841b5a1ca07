//! Bounded pool for blocking storage work
//!
//! Blocking closures run on tokio's blocking threads, but at most `size` of
//! them at once: each holds a semaphore permit for its whole run. Callers
//! awaiting a result suspend without tying up a runtime worker.
//!
//! Cancellation is cooperative and only reaches work that has not started.
//! Once a closure holds a permit it runs to completion even if its caller
//! gave up, because a blocking filesystem call cannot be interrupted midway.

use futures_util::future::join_all;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, info, warn};

/// Default number of concurrent blocking operations
pub const DEFAULT_POOL_SIZE: usize = 4;

#[derive(Debug, thiserror::Error)]
pub enum PoolError {
    #[error("Operation cancelled before it started")]
    Cancelled,

    #[error("Worker pool is shut down")]
    ShutDown,

    #[error("Blocking operation panicked: {0}")]
    Panicked(String),
}

/// Cheap to clone; clones share permits and lifecycle.
#[derive(Clone)]
pub struct BlockingPool {
    permits: Arc<Semaphore>,
    tracker: TaskTracker,
    shutdown: CancellationToken,
    size: usize,
}

impl BlockingPool {
    pub fn new(size: usize) -> Self {
        let size = size.max(1);
        debug!(size, "starting blocking pool");
        Self {
            permits: Arc::new(Semaphore::new(size)),
            tracker: TaskTracker::new(),
            shutdown: CancellationToken::new(),
            size,
        }
    }

    pub fn size(&self) -> usize {
        self.size
    }

    /// Operations currently holding a permit
    pub fn in_flight(&self) -> usize {
        self.size - self.permits.available_permits()
    }

    pub fn is_shut_down(&self) -> bool {
        self.shutdown.is_cancelled()
    }

    /// Run `op` on the pool and wait for its result
    pub async fn run<F, T>(&self, op: F) -> Result<T, PoolError>
    where
        F: FnOnce() -> T + Send + 'static,
        T: Send + 'static,
    {
        self.run_cancellable(&CancellationToken::new(), op).await
    }

    /// Like [`BlockingPool::run`], but abandon the operation if `cancel`
    /// fires while it is still queued for a permit.
    pub async fn run_cancellable<F, T>(
        &self,
        cancel: &CancellationToken,
        op: F,
    ) -> Result<T, PoolError>
    where
        F: FnOnce() -> T + Send + 'static,
        T: Send + 'static,
    {
        if self.shutdown.is_cancelled() {
            return Err(PoolError::ShutDown);
        }

        let permit = tokio::select! {
            biased;
            _ = self.shutdown.cancelled() => return Err(PoolError::ShutDown),
            _ = cancel.cancelled() => return Err(PoolError::Cancelled),
            permit = self.permits.clone().acquire_owned() => {
                permit.map_err(|_| PoolError::ShutDown)?
            }
        };

        let handle = self.tracker.spawn_blocking(move || {
            let _permit = permit;
            op()
        });

        handle.await.map_err(|e| {
            if e.is_panic() {
                warn!(error = %e, "blocking operation panicked");
                PoolError::Panicked(e.to_string())
            } else {
                PoolError::Cancelled
            }
        })
    }

    /// Run every operation and collect one result per operation, in order.
    ///
    /// A failing operation never aborts its siblings.
    pub async fn run_batch<I, F, T>(&self, ops: I) -> Vec<Result<T, PoolError>>
    where
        I: IntoIterator<Item = F>,
        F: FnOnce() -> T + Send + 'static,
        T: Send + 'static,
    {
        join_all(ops.into_iter().map(|op| self.run(op))).await
    }

    /// Stop accepting work, abandon queued work, and wait for running work.
    pub async fn shutdown(&self) {
        if self.shutdown.is_cancelled() {
            return;
        }
        self.shutdown.cancel();
        self.tracker.close();
        self.tracker.wait().await;
        self.permits.close();
        info!("blocking pool drained");
    }
}
