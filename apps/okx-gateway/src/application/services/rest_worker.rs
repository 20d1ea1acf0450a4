//! REST Worker
//!
//! Runs REST calls off the frame-dispatch path. A semaphore bounds how many
//! requests are in flight; a task tracker lets shutdown and tests wait for
//! outstanding work.

use std::future::Future;
use std::sync::Arc;

use tokio::sync::Semaphore;
use tokio_util::task::TaskTracker;

/// Bounded executor for REST requests.
#[derive(Debug, Clone)]
pub struct RestWorker {
    permits: Arc<Semaphore>,
    tracker: TaskTracker,
}

impl RestWorker {
    /// Create a worker running at most `concurrency` requests at once.
    ///
    /// A concurrency of zero is treated as one.
    #[must_use]
    pub fn new(concurrency: usize) -> Self {
        Self {
            permits: Arc::new(Semaphore::new(concurrency.max(1))),
            tracker: TaskTracker::new(),
        }
    }

    /// Run `task` once a permit is free.
    pub fn spawn<F>(&self, task: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let permits = Arc::clone(&self.permits);
        self.tracker.spawn(async move {
            let Ok(_permit) = permits.acquire_owned().await else {
                tracing::debug!("REST worker closed, dropping request");
                return;
            };
            task.await;
        });
    }

    /// Tasks spawned and not yet finished.
    #[must_use]
    pub fn in_flight(&self) -> usize {
        self.tracker.len()
    }

    /// Wait until every spawned task has finished. New tasks may be spawned
    /// afterwards.
    pub async fn wait_idle(&self) {
        self.tracker.close();
        self.tracker.wait().await;
        self.tracker.reopen();
    }

    /// Refuse queued work and wait for running tasks.
    pub async fn shutdown(&self) {
        self.permits.close();
        self.tracker.close();
        self.tracker.wait().await;
    }
}
