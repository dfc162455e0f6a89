//! Tasks spawned on behalf of requests.
//!
//! Stream handlers run on their own task so the response head can be sent
//! while they keep writing. Those tasks are spawned through
//! [`RequestTasks`] so that shutdown can wait for them and drop whatever is
//! still running once the grace period is over.

use std::future::Future;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;

/// A set of request tasks that can be drained and aborted together.
///
/// Clones share the same set.
#[derive(Debug, Clone, Default)]
pub(crate) struct RequestTasks {
    tracker: TaskTracker,
    abort: CancellationToken,
}

impl RequestTasks {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Spawns `future` on the set.
    ///
    /// The task yields `None` when it was aborted before `future` finished;
    /// `future` is dropped at that point.
    pub(crate) fn spawn<F>(&self, future: F) -> JoinHandle<Option<F::Output>>
    where
        F: Future + Send + 'static,
        F::Output: Send + 'static,
    {
        let abort = self.abort.clone();
        self.tracker.spawn(async move {
            tokio::select! {
                biased;
                () = abort.cancelled() => None,
                output = future => Some(output),
            }
        })
    }

    /// Number of tasks still running.
    pub(crate) fn len(&self) -> usize {
        self.tracker.len()
    }

    /// Waits until every task has finished.
    ///
    /// Tasks spawned while waiting are waited for as well.
    pub(crate) async fn drain(&self) {
        self.tracker.close();
        self.tracker.wait().await;
    }

    /// Drops every running task and waits until they are gone.
    pub(crate) async fn abort(&self) {
        self.abort.cancel();
        self.drain().await;
    }
}
