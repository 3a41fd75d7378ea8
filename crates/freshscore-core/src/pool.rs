//! Bounded worker pool.
//!
//! [`WorkerPool`] owns a fixed number of execution slots, pre-allocated at
//! construction.  Submission is non-blocking: [`WorkerPool::try_execute`]
//! either claims a free slot immediately or reports
//! [`PoolError::Saturated`]; once [`WorkerPool::shutdown`] has run it
//! reports [`PoolError::Closed`].  An accepted unit of work runs on its own
//! spawned task, holding the slot until it finishes, so the pool never
//! executes more than `capacity` units concurrently.  No ordering is
//! guaranteed between independently accepted units.

use std::future::Future;
use std::sync::{Arc, Mutex};

use thiserror::Error;
use tokio::sync::{Semaphore, TryAcquireError};
use tokio::task::JoinSet;
use tracing::debug;

/// Errors returned by [`WorkerPool::try_execute`].
#[derive(Debug, Error)]
pub enum PoolError {
    /// Every execution slot is busy; the unit of work was not accepted.
    #[error("worker pool saturated (capacity {capacity})")]
    Saturated { capacity: usize },

    /// The pool has been shut down and accepts no further work.
    #[error("worker pool closed")]
    Closed,
}

/// A fixed-capacity pool of reusable execution slots.
pub struct WorkerPool {
    /// One permit per slot.  Closed on shutdown so late submitters get a
    /// distinct error instead of a spurious "saturated".
    slots: Arc<Semaphore>,
    capacity: usize,
    /// Handles for accepted units; reaped opportunistically on submission
    /// and drained on shutdown.  Never locked across an await point.
    tasks: Mutex<JoinSet<()>>,
}

impl std::fmt::Debug for WorkerPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "WorkerPool({}/{} slots free)",
            self.slots.available_permits(),
            self.capacity
        )
    }
}

impl WorkerPool {
    /// Create a pool with `capacity` execution slots.
    ///
    /// Capacity is fixed for the pool's lifetime; there is no growth during
    /// operation.
    pub fn new(capacity: usize) -> Self {
        Self {
            slots: Arc::new(Semaphore::new(capacity)),
            capacity,
            tasks: Mutex::new(JoinSet::new()),
        }
    }

    /// Number of slots the pool was created with.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Try to schedule a unit of work without blocking.
    ///
    /// On success the unit starts running on a background task as soon as
    /// the runtime polls it; `try_execute` itself never waits.  The caller
    /// gets [`PoolError::Saturated`] when every slot is busy and
    /// [`PoolError::Closed`] after [`Self::shutdown`].
    ///
    /// Must be called from within a tokio runtime.
    pub fn try_execute<F>(&self, work: F) -> Result<(), PoolError>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let permit = match Arc::clone(&self.slots).try_acquire_owned() {
            Ok(permit) => permit,
            Err(TryAcquireError::NoPermits) => {
                return Err(PoolError::Saturated {
                    capacity: self.capacity,
                })
            }
            Err(TryAcquireError::Closed) => return Err(PoolError::Closed),
        };

        let Ok(mut tasks) = self.tasks.lock() else {
            return Err(PoolError::Closed);
        };
        // Drop bookkeeping for units that already finished.
        while tasks.try_join_next().is_some() {}
        tasks.spawn(async move {
            // The permit is the slot: released when the unit completes.
            let _slot = permit;
            work.await;
        });
        Ok(())
    }

    /// Stop accepting new work and wait for in-flight units to finish.
    ///
    /// The pool applies no deadline of its own; callers that need a bounded
    /// grace period wrap this in `tokio::time::timeout`.
    pub async fn shutdown(&self) {
        self.slots.close();
        let mut drained = match self.tasks.lock() {
            Ok(mut tasks) => std::mem::take(&mut *tasks),
            Err(_) => return,
        };
        while drained.join_next().await.is_some() {}
        debug!(capacity = self.capacity, "worker pool drained");
    }
}
