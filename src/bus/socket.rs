//! # Bus socket abstraction.
//!
//! [`BusSocket`] is the seam between the gateway and a concrete bus
//! transport. The production implementation sits on SocketCAN; tests script
//! their own.

use async_trait::async_trait;
use thiserror::Error;

use crate::bus::frame::Frame;
use crate::flow::FlowControl;

/// Errors raised by a bus socket.
#[derive(Error, Debug)]
pub enum SocketError {
    /// The kernel's outbound queue is momentarily out of room.
    #[error("send queue full: {error}")]
    QueueFull {
        /// The underlying error message.
        error: String,
    },

    /// Any other socket failure.
    #[error("socket i/o: {error}")]
    Io {
        /// The underlying error message.
        error: String,
    },
}

impl SocketError {
    /// Builds [`SocketError::QueueFull`] from any displayable cause.
    pub fn queue_full(error: impl std::fmt::Display) -> Self {
        Self::QueueFull {
            error: error.to_string(),
        }
    }

    /// Builds [`SocketError::Io`] from any displayable cause.
    pub fn io(error: impl std::fmt::Display) -> Self {
        Self::Io {
            error: error.to_string(),
        }
    }
}

impl FlowControl for SocketError {
    /// A full send queue drains on its own; the frame can go out shortly.
    fn should_retry(&self) -> bool {
        matches!(self, SocketError::QueueFull { .. })
    }
}

/// One open bus endpoint, shared by the reader and poller workers.
#[async_trait]
pub trait BusSocket: Send + Sync {
    /// Queues one frame for transmission.
    async fn send(&self, frame: &Frame) -> Result<(), SocketError>;

    /// Waits for the next inbound frame.
    async fn recv(&self) -> Result<Frame, SocketError>;
}
