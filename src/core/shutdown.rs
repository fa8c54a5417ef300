//! # OS signal listener worker.
//!
//! [`listen_for_signals`] completes when the process receives a termination
//! signal, which makes it a worker like any other: its clean exit is the
//! supervisor's cue to cancel the rest of the gateway. A signal shutdown with
//! no worker error exits zero.
//!
//! ## Signals
//! **Unix platforms:**
//! - `SIGINT` (Ctrl-C in terminal)
//! - `SIGTERM` (default kill signal, used by systemd)
//! - `SIGQUIT`
//!
//! **Other platforms:**
//! - `Ctrl-C` via [`tokio::signal::ctrl_c`]

use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::error::WorkerError;

/// Waits until a termination signal arrives or the token is cancelled.
///
/// Registration failure is fatal: a daemon that cannot hear its kill signal
/// must not keep running.
pub async fn listen_for_signals(token: CancellationToken) -> Result<(), WorkerError> {
    tokio::select! {
        _ = token.cancelled() => Ok(()),
        received = wait_for_termination() => match received {
            Ok(signal) => {
                info!(signal, "termination signal received");
                Ok(())
            }
            Err(err) => Err(WorkerError::signal(err)),
        },
    }
}

#[cfg(unix)]
async fn wait_for_termination() -> std::io::Result<&'static str> {
    use tokio::signal::unix::{signal, SignalKind};

    let mut sigint = signal(SignalKind::interrupt())?;
    let mut sigterm = signal(SignalKind::terminate())?;
    let mut sigquit = signal(SignalKind::quit())?;

    let name = tokio::select! {
        _ = tokio::signal::ctrl_c() => "ctrl-c",
        _ = sigint.recv() => "SIGINT",
        _ = sigterm.recv() => "SIGTERM",
        _ = sigquit.recv() => "SIGQUIT",
    };
    Ok(name)
}

#[cfg(not(unix))]
async fn wait_for_termination() -> std::io::Result<&'static str> {
    tokio::signal::ctrl_c().await?;
    Ok("ctrl-c")
}
