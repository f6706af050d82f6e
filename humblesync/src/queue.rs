//! Bounded-concurrency work queues.
//!
//! Three of these run per sync: one for file integrity checks, one for
//! order-info fetches, one for downloads. Each task is spawned immediately
//! but must win a semaphore permit before it runs, so at most `concurrency`
//! tasks make progress at once while the rest wait in line.
//!
//! [`WorkQueue::clear`] implements the graceful-shutdown contract: tasks
//! still waiting for a permit resolve to [`QueueError::Cancelled`] and
//! never start; tasks already holding a permit run to completion.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use tokio::sync::{Notify, Semaphore};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// Errors produced by the queue itself rather than by a task.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QueueError {
    /// The queue was cleared before this task started.
    Cancelled,
}

impl std::fmt::Display for QueueError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Cancelled => write!(f, "queue cleared before task started"),
        }
    }
}

impl std::error::Error for QueueError {}

/// A bounded-concurrency task runner.
///
/// Cheap to clone; clones share the same permit pool and cancellation
/// state.
#[derive(Clone)]
pub struct WorkQueue {
    name: &'static str,
    semaphore: Arc<Semaphore>,
    cancel: CancellationToken,
    /// Tasks admitted but not yet finished (waiting or running).
    active: Arc<AtomicUsize>,
    idle_notify: Arc<Notify>,
}

impl WorkQueue {
    /// Creates a queue running at most `concurrency` tasks at once.
    /// A bound of zero is clamped to one.
    pub fn new(name: &'static str, concurrency: usize) -> Self {
        Self {
            name,
            semaphore: Arc::new(Semaphore::new(concurrency.max(1))),
            cancel: CancellationToken::new(),
            active: Arc::new(AtomicUsize::new(0)),
            idle_notify: Arc::new(Notify::new()),
        }
    }

    /// Submits a task.
    ///
    /// The returned handle resolves to the task's output, or to
    /// [`QueueError::Cancelled`] if the queue was cleared before the task
    /// obtained a permit.
    pub fn add<F, T>(&self, task: F) -> JoinHandle<Result<T, QueueError>>
    where
        F: std::future::Future<Output = T> + Send + 'static,
        T: Send + 'static,
    {
        let name = self.name;
        let semaphore = Arc::clone(&self.semaphore);
        let cancel = self.cancel.clone();
        let active = Arc::clone(&self.active);
        let idle_notify = Arc::clone(&self.idle_notify);

        // Counted before spawning so a caller that immediately awaits
        // idle() cannot observe the queue as empty.
        active.fetch_add(1, Ordering::SeqCst);

        tokio::spawn(async move {
            let _guard = ActiveGuard {
                active,
                idle_notify,
            };

            let _permit = tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    debug!(queue = name, "Task cancelled before start");
                    return Err(QueueError::Cancelled);
                }
                permit = semaphore.acquire_owned() => {
                    // The semaphore is never closed; acquire only fails
                    // after close().
                    permit.map_err(|_| QueueError::Cancelled)?
                }
            };

            Ok(task.await)
        })
    }

    /// Resolves once every admitted task has finished or been cancelled.
    pub async fn idle(&self) {
        loop {
            let notified = self.idle_notify.notified();
            tokio::pin!(notified);
            // Register before checking, so a task finishing between the
            // check and the await cannot be missed.
            notified.as_mut().enable();
            if self.active.load(Ordering::SeqCst) == 0 {
                return;
            }
            notified.await;
        }
    }

    /// Stops scheduling: waiting tasks resolve to `Cancelled`, running
    /// tasks finish normally.
    pub fn clear(&self) {
        debug!(queue = self.name, "Clearing queue");
        self.cancel.cancel();
    }

    /// Whether [`clear`](Self::clear) has been called.
    pub fn is_cleared(&self) -> bool {
        self.cancel.is_cancelled()
    }
}

/// The three queues of one sync run.
#[derive(Clone)]
pub struct Queues {
    pub file_check: WorkQueue,
    pub order_info: WorkQueue,
    pub downloads: WorkQueue,
}

impl Queues {
    /// Builds the standard queue set for a parallelism level. Order-info
    /// fetches are small JSON requests, so that queue runs at twice the
    /// bound.
    pub fn new(parallel: usize) -> Self {
        Self {
            file_check: WorkQueue::new("file-check", parallel),
            order_info: WorkQueue::new("order-info", parallel * 2),
            downloads: WorkQueue::new("downloads", parallel),
        }
    }

    /// Stops scheduling on every queue.
    pub fn clear_all(&self) {
        self.file_check.clear();
        self.order_info.clear();
        self.downloads.clear();
    }

    /// Waits for every queue to drain.
    pub async fn idle_all(&self) {
        self.file_check.idle().await;
        self.order_info.idle().await;
        self.downloads.idle().await;
    }
}

/// Decrements the active count when a task ends for any reason, waking
/// idle() waiters on the last one out.
struct ActiveGuard {
    active: Arc<AtomicUsize>,
    idle_notify: Arc<Notify>,
}

impl Drop for ActiveGuard {
    fn drop(&mut self) {
        if self.active.fetch_sub(1, Ordering::SeqCst) == 1 {
            self.idle_notify.notify_waiters();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;
    use std::time::Duration;

    #[tokio::test]
    async fn test_results_come_back() {
        let queue = WorkQueue::new("test", 2);
        let handle = queue.add(async { 21 * 2 });
        assert_eq!(handle.await.unwrap().unwrap(), 42);
    }

    #[tokio::test]
    async fn test_concurrency_is_bounded() {
        let queue = WorkQueue::new("test", 2);
        let current = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));

        let mut handles = Vec::new();
        for _ in 0..16 {
            let current = Arc::clone(&current);
            let peak = Arc::clone(&peak);
            handles.push(queue.add(async move {
                let now = current.fetch_add(1, Ordering::SeqCst) + 1;
                peak.fetch_max(now, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(10)).await;
                current.fetch_sub(1, Ordering::SeqCst);
            }));
        }
        for handle in handles {
            handle.await.unwrap().unwrap();
        }

        assert!(peak.load(Ordering::SeqCst) <= 2);
    }

    #[tokio::test]
    async fn test_idle_waits_for_all_tasks() {
        let queue = WorkQueue::new("test", 4);
        let finished = Arc::new(AtomicUsize::new(0));
        for _ in 0..8 {
            let finished = Arc::clone(&finished);
            queue.add(async move {
                tokio::time::sleep(Duration::from_millis(5)).await;
                finished.fetch_add(1, Ordering::SeqCst);
            });
        }
        queue.idle().await;
        assert_eq!(finished.load(Ordering::SeqCst), 8);
    }

    #[tokio::test]
    async fn test_idle_on_empty_queue_returns_immediately() {
        let queue = WorkQueue::new("test", 1);
        queue.idle().await;
    }

    #[tokio::test]
    async fn test_clear_cancels_pending_but_not_running() {
        let queue = WorkQueue::new("test", 1);

        // Occupy the single permit.
        let (release_tx, release_rx) = tokio::sync::oneshot::channel::<()>();
        let running = queue.add(async move {
            let _ = release_rx.await;
            "ran"
        });

        // This one waits for a permit and must be cancelled.
        let pending = queue.add(async { "ran" });

        tokio::time::sleep(Duration::from_millis(10)).await;
        queue.clear();
        assert!(queue.is_cleared());

        assert_eq!(pending.await.unwrap(), Err(QueueError::Cancelled));

        release_tx.send(()).unwrap();
        assert_eq!(running.await.unwrap(), Ok("ran"));

        queue.idle().await;
    }

    #[tokio::test]
    async fn test_one_task_panicking_does_not_break_idle() {
        let queue = WorkQueue::new("test", 2);
        let ok = queue.add(async { 1 });
        let bad = queue.add(async { panic!("task failure") });

        assert!(bad.await.is_err());
        assert_eq!(ok.await.unwrap().unwrap(), 1);
        queue.idle().await;
    }
}
