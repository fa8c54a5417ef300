//! # Bus reader worker.
//!
//! [`Reader`] pulls inbound frames off the socket and hands them to the
//! dispatcher. It never interprets a frame; that is the dispatcher's job.
//!
//! ### Rules
//! - A socket i/o error is fatal; the supervisor decides what happens next.
//! - A closed dispatcher channel means shutdown is underway; the reader
//!   exits cleanly rather than erroring.

use std::sync::Arc;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::bus::frame::Frame;
use crate::bus::socket::{BusSocket, SocketError};

/// Forwards inbound bus frames to the dispatcher.
pub struct Reader {
    socket: Arc<dyn BusSocket>,
    frames: mpsc::Sender<Frame>,
}

impl Reader {
    /// Creates a reader over `socket` feeding `frames`.
    pub fn new(socket: Arc<dyn BusSocket>, frames: mpsc::Sender<Frame>) -> Self {
        Self { socket, frames }
    }

    /// Runs until cancelled, the socket fails, or the dispatcher goes away.
    pub async fn run(self, token: CancellationToken) -> Result<(), SocketError> {
        loop {
            let frame = tokio::select! {
                _ = token.cancelled() => return Ok(()),
                received = self.socket.recv() => received?,
            };
            debug!(frame = %frame, "received");

            tokio::select! {
                _ = token.cancelled() => return Ok(()),
                sent = self.frames.send(frame) => {
                    if sent.is_err() {
                        return Ok(()); // dispatcher gone, shutdown underway
                    }
                }
            }
        }
    }
}
