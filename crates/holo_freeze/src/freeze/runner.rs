//! Non-blocking, bounded task submission.

use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tokio::sync::{Notify, OwnedSemaphorePermit, Semaphore, TryAcquireError};
use tokio_util::sync::CancellationToken;

/// Why a submission was refused.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Rejected {
    /// Every slot is taken; try again later.
    Saturated,
    /// The process is draining and accepts no new work.
    Draining,
}

#[derive(Default)]
struct Completions {
    finished: AtomicU64,
    notify: Notify,
}

/// Held by a spawned task. Releases the slot before announcing completion,
/// also when the task panics.
struct Slot {
    permit: Option<OwnedSemaphorePermit>,
    completions: Arc<Completions>,
}

impl Drop for Slot {
    fn drop(&mut self) {
        drop(self.permit.take());
        self.completions.finished.fetch_add(1, Ordering::SeqCst);
        self.completions.notify.notify_waiters();
    }
}

/// Spawns tasks on the current tokio runtime, at most `limit` at a time.
///
/// Each spawned task holds a semaphore permit until it finishes, so the limit
/// bounds outstanding work rather than the submission rate. Submission never
/// waits for a permit.
#[derive(Clone)]
pub struct TaskRunner {
    permits: Arc<Semaphore>,
    limit: usize,
    draining: CancellationToken,
    completions: Arc<Completions>,
}

impl TaskRunner {
    pub fn new(limit: usize, draining: CancellationToken) -> Self {
        let limit = limit.max(1);
        Self {
            permits: Arc::new(Semaphore::new(limit)),
            limit,
            draining,
            completions: Arc::new(Completions::default()),
        }
    }

    /// Spawn `task` if a slot is free and the runner is not draining.
    ///
    /// Must be called from within a tokio runtime.
    pub fn try_submit<F>(&self, task: F) -> Result<(), Rejected>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        if self.draining.is_cancelled() {
            return Err(Rejected::Draining);
        }
        let permit = match self.permits.clone().try_acquire_owned() {
            Ok(permit) => permit,
            Err(TryAcquireError::NoPermits) => return Err(Rejected::Saturated),
            Err(TryAcquireError::Closed) => return Err(Rejected::Draining),
        };
        let slot = Slot {
            permit: Some(permit),
            completions: self.completions.clone(),
        };
        tokio::spawn(async move {
            let _slot = slot;
            task.await;
        });
        Ok(())
    }

    /// Tasks finished so far, counted once their slot is free again.
    pub fn finished(&self) -> u64 {
        self.completions.finished.load(Ordering::SeqCst)
    }

    /// Wait until a task finishes after `finished()` returned `seen`.
    ///
    /// Returns at once when nothing is in flight.
    pub async fn wait_finished(&self, seen: u64) {
        loop {
            let notified = self.completions.notify.notified();
            tokio::pin!(notified);
            // Register before checking so a completion in between is not missed.
            notified.as_mut().enable();
            if self.finished() != seen || self.in_flight() == 0 {
                return;
            }
            notified.await;
        }
    }

    /// Tasks currently holding a slot.
    pub fn in_flight(&self) -> usize {
        self.limit.saturating_sub(self.permits.available_permits())
    }

    pub fn limit(&self) -> usize {
        self.limit
    }

    pub fn is_draining(&self) -> bool {
        self.draining.is_cancelled()
    }
}
