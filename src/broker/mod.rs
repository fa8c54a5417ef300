//! # Broker side: sink abstraction, MQTT client, and publisher.
//!
//! Everything that talks to the broker lives here:
//! - [`PublishSink`] is the client seam; [`MqttSink`] implements it over
//!   rumqttc, with [`MqttConnection`] driving the event loop
//! - [`Publisher`] renders classified readings and publishes them

mod mqtt;
mod publisher;
mod sink;

pub use mqtt::{MqttConnection, MqttSink};
pub use publisher::{render, PublishError, Publisher, RenderError};
pub use sink::{PublishSink, SinkError};
