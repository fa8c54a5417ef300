//! # MQTT client adapter.
//!
//! [`MqttSink`] implements [`PublishSink`] over a `rumqttc::AsyncClient`.
//! The client does nothing on its own: [`MqttConnection`] owns the paired
//! event loop and must be driven as a worker for publishes to move and for
//! reconnects to happen.
//!
//! ### Rules
//! - Publishes go out at QoS 1 (at least once).
//! - A poll error means the connection dropped; the driver logs it, pauses
//!   briefly, and polls again. rumqttc reconnects on the next poll. The
//!   driver itself only terminates on cancellation.

use std::time::Duration;

use async_trait::async_trait;
use rumqttc::{AsyncClient, Event, EventLoop, MqttOptions, Packet, QoS};
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;
use tracing::{info, trace, warn};

use crate::broker::sink::{PublishSink, SinkError};
use crate::config::MqttConfig;

/// In-flight request limit between the client handle and its event loop.
const REQUEST_CAP: usize = 16;

/// Pause before polling again after a connection error.
const REPOLL_DELAY: Duration = Duration::from_secs(1);

/// Broker-backed publish sink.
pub struct MqttSink {
    client: AsyncClient,
}

/// Drives the broker connection behind [`MqttSink`].
pub struct MqttConnection {
    events: EventLoop,
}

impl MqttSink {
    /// Builds the client and its connection driver from configuration.
    ///
    /// No i/o happens here; the connection is established once the driver
    /// runs.
    pub fn connect(config: &MqttConfig) -> (MqttSink, MqttConnection) {
        let mut options =
            MqttOptions::new(config.client_id.clone(), config.host.clone(), config.port);
        options.set_keep_alive(Duration::from_secs(10));
        if let (Some(user), Some(pass)) = (&config.username, &config.password) {
            options.set_credentials(user.clone(), pass.clone());
        }

        let (client, events) = AsyncClient::new(options, REQUEST_CAP);
        (MqttSink { client }, MqttConnection { events })
    }
}

#[async_trait]
impl PublishSink for MqttSink {
    async fn publish(&self, topic: &str, payload: String, retain: bool) -> Result<(), SinkError> {
        self.client
            .publish(topic, QoS::AtLeastOnce, retain, payload)
            .await
            .map_err(SinkError::client_gone)
    }
}

impl MqttConnection {
    /// Polls the event loop until cancelled.
    pub async fn run(mut self, token: CancellationToken) -> Result<(), SinkError> {
        loop {
            let event = tokio::select! {
                _ = token.cancelled() => return Ok(()),
                event = self.events.poll() => event,
            };

            match event {
                Ok(Event::Incoming(Packet::ConnAck(ack))) => {
                    info!(code = ?ack.code, "broker connection established");
                }
                Ok(event) => trace!(?event, "broker event"),
                Err(err) => {
                    warn!(error = %err, "broker connection lost, retrying");
                    tokio::select! {
                        _ = token.cancelled() => return Ok(()),
                        _ = sleep(REPOLL_DELAY) => {}
                    }
                }
            }
        }
    }
}
