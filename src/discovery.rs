//! # Home Assistant discovery announcer.
//!
//! [`Announcer`] publishes one retained discovery entity per subscription at
//! startup, so Home Assistant picks the sensors up without manual
//! configuration, then parks until shutdown. Parking matters: worker exit
//! triggers coordinated shutdown, and a finished announcer must not take the
//! gateway down with it.
//!
//! Entity topics follow the discovery convention:
//! `{discovery-topic-prefix}/sensor/{device-id}/{command-id}/config`.
//!
//! ### Rules
//! - Entities are retained; `expires_after` is twice the poll delay, so a
//!   silent sensor goes unavailable instead of freezing its last value.
//! - Display names use the configured language, then any available
//!   language, then the command id. The fallbacks warn.
//! - Unit metadata (measurement unit, device class, state class, icon,
//!   display precision) derives from the command's unit tag.

use std::sync::Arc;

use serde::Serialize;
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::broker::{PublishSink, SinkError};
use crate::catalog::{Command, Unit};
use crate::config::{Config, Subscription};

/// Stable device id used in topics and entity identifiers.
const DEVICE_ID: &str = "thermolink-hpsu";

/// Errors raised while announcing discovery entities.
#[derive(Error, Debug)]
pub enum AnnounceError {
    /// An entity failed to serialize.
    #[error("encode entity for {id:?}: {error}")]
    Encode {
        /// The offending command id.
        id: String,
        /// The underlying error message.
        error: String,
    },

    /// The sink rejected the publish.
    #[error(transparent)]
    Sink(#[from] SinkError),
}

/// Device block shared by every announced entity.
#[derive(Serialize)]
struct Device {
    #[serde(skip_serializing_if = "Vec::is_empty")]
    identifiers: Vec<String>,
    #[serde(skip_serializing_if = "String::is_empty")]
    manufacturer: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    model: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    name: String,
}

/// One sensor entity as Home Assistant expects it.
#[derive(Serialize)]
struct Entity {
    device: Device,
    #[serde(skip_serializing_if = "String::is_empty")]
    object_id: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    unique_id: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    name: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    state_topic: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    unit_of_measurement: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    icon: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    device_class: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    state_class: String,
    expires_after: u64,
    suggested_display_precision: u8,
}

/// Presentation metadata keyed by unit tag.
struct UnitMeta {
    unit: &'static str,
    device_class: &'static str,
    state_class: &'static str,
    icon: &'static str,
    precision: u8,
}

fn unit_meta(unit: Unit) -> UnitMeta {
    match unit {
        Unit::Deg => UnitMeta {
            unit: "°C",
            device_class: "temperature",
            state_class: "measurement",
            icon: "mdi:thermometer",
            precision: 2,
        },
        Unit::Bar => UnitMeta {
            unit: "bar",
            device_class: "pressure",
            state_class: "measurement",
            icon: "mdi:car-brake-low-pressure",
            precision: 2,
        },
        Unit::Lh => UnitMeta {
            unit: "L/h",
            device_class: "",
            state_class: "measurement",
            icon: "",
            precision: 1,
        },
        Unit::Percent => UnitMeta {
            unit: "%",
            device_class: "",
            state_class: "measurement",
            icon: "",
            precision: 0,
        },
        Unit::Wh => UnitMeta {
            unit: "Wh",
            device_class: "energy",
            state_class: "total_increasing",
            icon: "mdi:lightning-bolt",
            precision: 2,
        },
        Unit::Kwh => UnitMeta {
            unit: "kWh",
            device_class: "energy",
            state_class: "total_increasing",
            icon: "mdi:lightning-bolt",
            precision: 3,
        },
        Unit::W => UnitMeta {
            unit: "W",
            device_class: "power",
            state_class: "measurement",
            icon: "mdi:lightning-bolt",
            precision: 2,
        },
        Unit::Kw => UnitMeta {
            unit: "kW",
            device_class: "power",
            state_class: "measurement",
            icon: "mdi:lightning-bolt",
            precision: 3,
        },
        Unit::Sec => UnitMeta {
            unit: "s",
            device_class: "",
            state_class: "measurement",
            icon: "",
            precision: 0,
        },
        Unit::Min => UnitMeta {
            unit: "min",
            device_class: "",
            state_class: "measurement",
            icon: "",
            precision: 0,
        },
        Unit::Hour => UnitMeta {
            unit: "h",
            device_class: "",
            state_class: "measurement",
            icon: "",
            precision: 0,
        },
        Unit::None => UnitMeta {
            unit: "",
            device_class: "",
            state_class: "",
            icon: "",
            precision: 0,
        },
    }
}

/// Publishes retained discovery entities, then parks.
pub struct Announcer {
    sink: Arc<dyn PublishSink>,
    subscriptions: Vec<Subscription>,
    discovery_topic_prefix: String,
    value_topic_prefix: String,
    device_name: String,
    lang: String,
}

impl Announcer {
    /// Creates an announcer for the given subscriptions.
    pub fn new(sink: Arc<dyn PublishSink>, subscriptions: Vec<Subscription>, config: &Config) -> Self {
        Self {
            sink,
            subscriptions,
            discovery_topic_prefix: config.homeassistant.discovery_topic_prefix.clone(),
            value_topic_prefix: config.mqtt.value_topic_prefix.clone(),
            device_name: config.homeassistant.device_name.clone(),
            lang: config.lang.clone(),
        }
    }

    /// Announces every subscription, then waits for cancellation.
    pub async fn run(self, token: CancellationToken) -> Result<(), AnnounceError> {
        for sub in &self.subscriptions {
            let entity = self.entity_for(sub);
            let payload =
                serde_json::to_string(&entity).map_err(|err| AnnounceError::Encode {
                    id: sub.command.id.clone(),
                    error: err.to_string(),
                })?;
            let topic = format!(
                "{}/sensor/{}/{}/config",
                self.discovery_topic_prefix, DEVICE_ID, sub.command.id
            );
            debug!(topic = %topic, "announcing");

            tokio::select! {
                _ = token.cancelled() => return Ok(()),
                published = self.sink.publish(&topic, payload, true) => published?,
            }
        }
        info!(count = self.subscriptions.len(), "discovery entities announced");

        token.cancelled().await;
        Ok(())
    }

    fn entity_for(&self, sub: &Subscription) -> Entity {
        let id = &sub.command.id;
        let meta = unit_meta(sub.command.unit);
        Entity {
            device: Device {
                identifiers: vec![DEVICE_ID.to_string()],
                manufacturer: "Rotex".to_string(),
                model: "HPSU compact".to_string(),
                name: self.device_name.clone(),
            },
            object_id: format!("{DEVICE_ID}-{id}"),
            unique_id: format!("{DEVICE_ID}/{id}"),
            name: self.display_name(&sub.command),
            state_topic: format!("{}/{}", self.value_topic_prefix, id),
            unit_of_measurement: meta.unit.to_string(),
            icon: meta.icon.to_string(),
            device_class: meta.device_class.to_string(),
            state_class: meta.state_class.to_string(),
            expires_after: (sub.delay.as_secs_f64() * 2.0) as u64,
            suggested_display_precision: meta.precision,
        }
    }

    fn display_name(&self, command: &Command) -> String {
        if let Some(name) = command.name.get(&self.lang) {
            return name.clone();
        }
        if let Some((lang, name)) = command.name.iter().next() {
            warn!(
                command = %command.id,
                want = %self.lang,
                got = %lang,
                "name not localized"
            );
            return name.clone();
        }
        warn!(command = %command.id, "command has no name, using its id");
        command.id.clone()
    }
}
