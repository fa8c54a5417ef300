//! # Supervisor: first worker exit triggers coordinated shutdown.
//!
//! The gateway's workers are all essential; losing any one of them makes the
//! rest pointless. The [`Supervisor`] therefore runs them until the FIRST
//! terminates for any reason, then cancels the others and gives them a
//! bounded grace period to drain.
//!
//! ## High-level architecture
//! ```text
//! Vec<WorkerHandle>  ──►  Supervisor::run(handles)
//!        │
//!   select_all(terminated)          first exit: (index, result)
//!        │
//!   kill() every handle             one cancellation pass, exactly once
//!        │
//!   per-handle terminated(),        single shared grace deadline
//!   bounded by timeout_at:
//!        ├─ Ok(())    → stopped
//!        ├─ Err(err)  → logged; first error kept for the caller
//!        └─ deadline  → abandoned  (detached, never aborted)
//!        │
//!   Err(first recorded error) | Ok(())
//! ```
//!
//! ### Rules
//! - Shutdown is triggered **exactly once**, no matter how many workers end
//!   up reporting errors.
//! - Cancellation is cooperative. A worker past the grace deadline is
//!   abandoned, not aborted; its handle is dropped and the task detaches.
//! - The first recorded error decides the caller's result. Later errors are
//!   logged and dropped.

use std::time::Duration;

use futures::future::select_all;
use tokio::time::{timeout_at, Instant};
use tracing::{debug, info, warn};

use crate::core::worker::WorkerHandle;
use crate::error::WorkerError;

/// Runs a set of workers until the first exits, then shuts the rest down.
pub struct Supervisor {
    /// How long cancelled workers get to drain before being abandoned.
    pub grace: Duration,
}

impl Supervisor {
    /// Creates a supervisor with the given grace period.
    pub fn new(grace: Duration) -> Self {
        Self { grace }
    }

    /// Runs `handles` to completion.
    ///
    /// Returns the first worker error recorded, or `Ok(())` when every worker
    /// stopped cleanly (a signal-initiated shutdown, typically).
    pub async fn run(&self, mut handles: Vec<WorkerHandle>) -> Result<(), WorkerError> {
        if handles.is_empty() {
            return Ok(());
        }

        let (first_index, first_result) = {
            let waits = handles
                .iter_mut()
                .enumerate()
                .map(|(index, handle)| {
                    Box::pin(async move { (index, handle.terminated().await) })
                })
                .collect::<Vec<_>>();
            let ((index, result), _, _) = select_all(waits).await;
            (index, result)
        };

        match &first_result {
            Ok(()) => info!(worker = handles[first_index].name(), "worker stopped, shutting down"),
            Err(err) => warn!(
                worker = handles[first_index].name(),
                kind = err.as_label(),
                error = %err,
                "worker failed, shutting down"
            ),
        }

        for handle in &handles {
            handle.kill();
        }

        let mut failure = first_result.err();
        let deadline = Instant::now() + self.grace;
        for (index, handle) in handles.iter_mut().enumerate() {
            if index == first_index {
                continue;
            }
            match timeout_at(deadline, handle.terminated()).await {
                Ok(Ok(())) => debug!(worker = handle.name(), "worker stopped"),
                Ok(Err(err)) => {
                    warn!(
                        worker = handle.name(),
                        kind = err.as_label(),
                        error = %err,
                        "worker failed during shutdown"
                    );
                    failure.get_or_insert(err);
                }
                Err(_) => {
                    warn!(worker = handle.name(), "worker still running past grace, abandoning");
                }
            }
        }

        match failure {
            None => {
                info!("all workers stopped");
                Ok(())
            }
            Some(err) => Err(err),
        }
    }
}
