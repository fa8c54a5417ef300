//! Terminal worker errors.
//!
//! [`WorkerError`] is what a worker reports to the supervisor when it dies.
//! Cancellation is deliberately absent: a worker that is asked to stop exits
//! with `Ok(())`, so shutdown never has to filter a "cancelled" error out of
//! its report. Skippable and retryable conditions stay inside their
//! components (see [`FlowControl`](crate::FlowControl)) and never reach this
//! type.

use thiserror::Error;

/// # A worker's terminal error.
///
/// The supervisor records the first of these it sees, logs any later ones,
/// and drives the process exit code from the first.
#[non_exhaustive]
#[derive(Error, Debug)]
pub enum WorkerError {
    /// Bus socket I/O failed outside the retryable queue-full condition.
    #[error("bus i/o failed: {error}")]
    Bus {
        /// The underlying error message.
        error: String,
    },

    /// The broker client went away; publishes can no longer be queued.
    #[error("broker client lost: {error}")]
    Broker {
        /// The underlying error message.
        error: String,
    },

    /// Frame classification hit a condition it may neither skip nor retry.
    #[error("dispatch failed: {error}")]
    Dispatch {
        /// The underlying error message.
        error: String,
    },

    /// OS signal listeners could not be registered.
    #[error("signal registration failed: {error}")]
    Signal {
        /// The underlying error message.
        error: String,
    },

    /// A worker panicked; the join error text is preserved.
    #[error("worker panicked: {error}")]
    Panicked {
        /// The underlying error message.
        error: String,
    },
}

impl WorkerError {
    /// Returns a short stable label (snake_case) for use in logs.
    pub fn as_label(&self) -> &'static str {
        match self {
            WorkerError::Bus { .. } => "bus_io",
            WorkerError::Broker { .. } => "broker_lost",
            WorkerError::Dispatch { .. } => "dispatch_failed",
            WorkerError::Signal { .. } => "signal_registration",
            WorkerError::Panicked { .. } => "worker_panicked",
        }
    }

    /// Wraps a bus-side failure.
    pub fn bus(error: impl std::fmt::Display) -> Self {
        WorkerError::Bus {
            error: error.to_string(),
        }
    }

    /// Wraps a broker-side failure.
    pub fn broker(error: impl std::fmt::Display) -> Self {
        WorkerError::Broker {
            error: error.to_string(),
        }
    }

    /// Wraps a dispatch failure.
    pub fn dispatch(error: impl std::fmt::Display) -> Self {
        WorkerError::Dispatch {
            error: error.to_string(),
        }
    }

    /// Wraps a signal registration failure.
    pub fn signal(error: impl std::fmt::Display) -> Self {
        WorkerError::Signal {
            error: error.to_string(),
        }
    }

    /// Wraps a join error from a panicked worker.
    pub fn panicked(error: impl std::fmt::Display) -> Self {
        WorkerError::Panicked {
            error: error.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_labels_are_stable() {
        assert_eq!(WorkerError::bus("enobufs").as_label(), "bus_io");
        assert_eq!(WorkerError::broker("gone").as_label(), "broker_lost");
        assert_eq!(WorkerError::panicked("boom").as_label(), "worker_panicked");
    }

    #[test]
    fn test_display_includes_cause() {
        let err = WorkerError::bus("read: connection reset");
        assert_eq!(err.to_string(), "bus i/o failed: read: connection reset");
    }
}
