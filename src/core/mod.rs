//! Runtime core: worker lifecycle and coordinated shutdown.
//!
//! Internal modules:
//! - [`worker`]: spawn one cancellable worker and hold its handle;
//! - [`supervisor`]: run all workers, cancel the rest when the first exits;
//! - [`shutdown`]: OS signal listener worker.

mod shutdown;
mod supervisor;
mod worker;

pub use shutdown::listen_for_signals;
pub use supervisor::Supervisor;
pub use worker::WorkerHandle;
