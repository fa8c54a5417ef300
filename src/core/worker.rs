//! # Worker lifecycle: spawn one cancellable task and hold its handle.
//!
//! A worker is any future of `Result<(), WorkerError>` built from a
//! [`CancellationToken`]. [`WorkerHandle::spawn`] derives a child token from
//! the supervisor's root token, launches the future on the runtime, and keeps
//! the pieces the supervisor needs: a name for logs, the token to kill it,
//! and the join handle to observe termination.
//!
//! ```text
//! WorkerHandle::spawn(name, parent, worker)
//!       │
//!       ├─► token = parent.child_token()
//!       └─► tokio::spawn(worker(token))
//!
//! kill() ──► token.cancel()               (cooperative; the worker decides when)
//! terminated().await ──► join outcome:
//!       ├─ Ok(result)   → the worker's own Result
//!       ├─ Err(panic)   → WorkerError::Panicked
//!       └─ Err(abort)   → Ok(())
//! ```
//!
//! ### Rules
//! - A worker that exits because it was cancelled returns `Ok(())`, never an
//!   error. Shutdown therefore needs no "was this just cancellation" filter.
//! - Handles never abort their task. Dropping a handle detaches the worker.

use std::future::Future;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::error::WorkerError;

/// Handle to one spawned worker: its name, kill switch, and join handle.
pub struct WorkerHandle {
    name: &'static str,
    token: CancellationToken,
    join: JoinHandle<Result<(), WorkerError>>,
}

impl WorkerHandle {
    /// Spawns `worker` with a child token of `parent` and returns its handle.
    pub fn spawn<F, Fut>(name: &'static str, parent: &CancellationToken, worker: F) -> Self
    where
        F: FnOnce(CancellationToken) -> Fut,
        Fut: Future<Output = Result<(), WorkerError>> + Send + 'static,
    {
        let token = parent.child_token();
        let join = tokio::spawn(worker(token.clone()));
        Self { name, token, join }
    }

    /// The worker's log name.
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Requests cooperative shutdown of this worker.
    pub fn kill(&self) {
        self.token.cancel();
    }

    /// Waits for the worker to terminate and returns its terminal result.
    ///
    /// A panic inside the worker surfaces as [`WorkerError::Panicked`].
    pub async fn terminated(&mut self) -> Result<(), WorkerError> {
        match (&mut self.join).await {
            Ok(result) => result,
            Err(err) if err.is_panic() => Err(WorkerError::panicked(err)),
            Err(_) => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_kill_cancels_the_worker() {
        let parent = CancellationToken::new();
        let mut handle = WorkerHandle::spawn("parker", &parent, |token| async move {
            token.cancelled().await;
            Ok(())
        });

        handle.kill();
        assert!(handle.terminated().await.is_ok());
    }

    #[tokio::test]
    async fn test_parent_cancellation_reaches_the_worker() {
        let parent = CancellationToken::new();
        let mut handle = WorkerHandle::spawn("parker", &parent, |token| async move {
            token.cancelled().await;
            Err(WorkerError::broker("stopped uncleanly"))
        });

        parent.cancel();
        let result = handle.terminated().await;
        assert_eq!(result.unwrap_err().as_label(), "broker_lost");
    }

    #[tokio::test]
    async fn test_panic_surfaces_as_worker_error() {
        let parent = CancellationToken::new();
        let mut handle =
            WorkerHandle::spawn("bomb", &parent, |_token| async move { panic!("boom") });

        let result = handle.terminated().await;
        assert_eq!(result.unwrap_err().as_label(), "worker_panicked");
    }
}
