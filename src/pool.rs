//! Bounded worker pool for independent, side-effecting tasks.
//!
//! The pool runs each task on its own Tokio task and caps how many run at once
//! with a semaphore. [`WorkerPool::submit`] waits for a free permit before
//! spawning, so a producer that outpaces the workers is slowed down instead of
//! queueing unboundedly. [`WorkerPool::join`] is the drain barrier: it returns
//! once every task submitted before the call has finished.
//!
//! Tasks own their collaborators (cloned store handles, clients) and must turn
//! their own failures into state updates. A task that panics anyway is logged
//! and counted at the join barrier; the panic never reaches the caller.

use std::future::Future;
use std::sync::Arc;

use tokio::sync::Semaphore;
use tokio::task::{JoinError, JoinSet};
use tracing::{debug, error, instrument};

/// Minimum allowed pool size.
pub const MIN_POOL_SIZE: usize = 1;

/// Maximum allowed pool size.
pub const MAX_POOL_SIZE: usize = 100;

/// Errors raised by the worker pool itself (never by its tasks).
#[derive(Debug, thiserror::Error)]
pub enum PoolError {
    /// Invalid size value provided.
    #[error("invalid pool size {value}: must be between {MIN_POOL_SIZE} and {MAX_POOL_SIZE}")]
    InvalidSize {
        /// The invalid value that was provided.
        value: usize,
    },

    /// Semaphore was closed unexpectedly.
    #[error("worker pool closed unexpectedly")]
    Closed,
}

/// Counts reported by [`WorkerPool::join`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct JoinSummary {
    /// Tasks that ran to completion since the previous join.
    pub completed: usize,
    /// Tasks that panicked since the previous join.
    pub panicked: usize,
}

/// Bounded-concurrency task pool with backpressure on submit.
#[derive(Debug)]
pub struct WorkerPool {
    semaphore: Arc<Semaphore>,
    size: usize,
    tasks: JoinSet<()>,
    summary: JoinSummary,
}

impl WorkerPool {
    /// Creates a pool running at most `size` tasks at once.
    ///
    /// # Errors
    ///
    /// Returns [`PoolError::InvalidSize`] if `size` is outside 1..=100.
    #[instrument(level = "debug")]
    pub fn new(size: usize) -> Result<Self, PoolError> {
        if !(MIN_POOL_SIZE..=MAX_POOL_SIZE).contains(&size) {
            return Err(PoolError::InvalidSize { value: size });
        }
        debug!(size, "creating worker pool");
        Ok(Self {
            semaphore: Arc::new(Semaphore::new(size)),
            size,
            tasks: JoinSet::new(),
            summary: JoinSummary::default(),
        })
    }

    /// Returns the configured concurrency limit.
    #[must_use]
    pub fn size(&self) -> usize {
        self.size
    }

    /// Number of submitted tasks not yet reaped.
    #[must_use]
    pub fn pending(&self) -> usize {
        self.tasks.len()
    }

    /// Submits a task, waiting while the pool is saturated.
    ///
    /// # Errors
    ///
    /// Returns [`PoolError::Closed`] if the semaphore was closed.
    pub async fn submit<F>(&mut self, task: F) -> Result<(), PoolError>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let permit = Arc::clone(&self.semaphore)
            .acquire_owned()
            .await
            .map_err(|_| PoolError::Closed)?;

        while let Some(result) = self.tasks.try_join_next() {
            self.record(result);
        }

        self.tasks.spawn(async move {
            // Released when the task finishes, panicking or not.
            let _permit = permit;
            task.await;
        });
        Ok(())
    }

    /// Waits for every submitted task to finish.
    ///
    /// Returns the counts accumulated since the previous join.
    pub async fn join(&mut self) -> JoinSummary {
        debug!(pending = self.tasks.len(), "draining worker pool");
        while let Some(result) = self.tasks.join_next().await {
            self.record(result);
        }
        std::mem::take(&mut self.summary)
    }

    fn record(&mut self, result: Result<(), JoinError>) {
        match result {
            Ok(()) => self.summary.completed += 1,
            Err(join_error) => {
                self.summary.panicked += 1;
                error!(error = %join_error, "worker task panicked");
            }
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    use super::*;

    #[test]
    fn test_pool_new_rejects_out_of_range_sizes() {
        assert!(matches!(
            WorkerPool::new(0),
            Err(PoolError::InvalidSize { value: 0 })
        ));
        assert!(matches!(
            WorkerPool::new(101),
            Err(PoolError::InvalidSize { value: 101 })
        ));
        assert_eq!(WorkerPool::new(100).unwrap().size(), 100);
    }

    #[tokio::test]
    async fn test_join_waits_for_all_submitted_tasks() {
        let mut pool = WorkerPool::new(3).unwrap();
        let done = Arc::new(AtomicUsize::new(0));

        for _ in 0..10 {
            let done = Arc::clone(&done);
            pool.submit(async move {
                tokio::time::sleep(Duration::from_millis(5)).await;
                done.fetch_add(1, Ordering::SeqCst);
            })
            .await
            .unwrap();
        }

        let summary = pool.join().await;
        assert_eq!(done.load(Ordering::SeqCst), 10);
        assert_eq!(summary.completed + summary.panicked, 10);
        assert_eq!(pool.pending(), 0);
    }

    #[tokio::test]
    async fn test_pool_never_exceeds_size() {
        let mut pool = WorkerPool::new(2).unwrap();
        let running = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));

        for _ in 0..8 {
            let running = Arc::clone(&running);
            let peak = Arc::clone(&peak);
            pool.submit(async move {
                let now = running.fetch_add(1, Ordering::SeqCst) + 1;
                peak.fetch_max(now, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(10)).await;
                running.fetch_sub(1, Ordering::SeqCst);
            })
            .await
            .unwrap();
        }
        pool.join().await;

        assert!(peak.load(Ordering::SeqCst) <= 2);
    }

    #[tokio::test]
    async fn test_panicking_task_is_contained() {
        let mut pool = WorkerPool::new(2).unwrap();
        pool.submit(async { panic!("task blew up") }).await.unwrap();
        pool.submit(async {}).await.unwrap();

        let summary = pool.join().await;
        assert_eq!(summary.panicked, 1);
        assert_eq!(summary.completed, 1);

        // The permit held by the panicking task was released.
        pool.submit(async {}).await.unwrap();
        pool.submit(async {}).await.unwrap();
        assert_eq!(pool.join().await.completed, 2);
    }
}
