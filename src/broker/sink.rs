//! # Publish sink abstraction.
//!
//! [`PublishSink`] is the seam between the gateway and the broker client.
//! The production implementation wraps an MQTT client; tests record calls.

use async_trait::async_trait;
use thiserror::Error;

use crate::flow::FlowControl;

/// Errors raised by a publish sink.
#[derive(Error, Debug)]
pub enum SinkError {
    /// The client's request queue is gone; its event loop has terminated.
    #[error("broker client gone: {error}")]
    ClientGone {
        /// The underlying error message.
        error: String,
    },
}

impl SinkError {
    /// Builds [`SinkError::ClientGone`] from any displayable cause.
    pub fn client_gone(error: impl std::fmt::Display) -> Self {
        Self::ClientGone {
            error: error.to_string(),
        }
    }
}

/// No capability applies: losing the client is fatal to the caller.
impl FlowControl for SinkError {}

/// Accepts (topic, payload, retain) publishes.
#[async_trait]
pub trait PublishSink: Send + Sync {
    /// Hands one message to the broker client.
    async fn publish(&self, topic: &str, payload: String, retain: bool) -> Result<(), SinkError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sink_errors_are_fatal() {
        let err = SinkError::client_gone("channel closed");
        assert!(!err.can_skip());
        assert!(!err.should_log());
        assert!(!err.should_retry());
    }
}
