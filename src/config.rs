//! # Gateway configuration.
//!
//! Provides [`Config`], the YAML-backed settings for one gateway process,
//! and [`Subscription`], a poll entry resolved against the command catalog.
//!
//! Config is loaded once at startup and treated as immutable:
//! 1. **File load**: `Config::load(path)` reads and validates the YAML
//! 2. **Resolution**: `config.resolve_subscriptions(&catalog)` binds every
//!    poll entry to its catalog command
//!
//! ## Defaults
//! - `mqtt.port = 1883`
//! - `mqtt.client-id = "thermolink"`
//! - `homeassistant.discovery-topic-prefix = "homeassistant"`
//! - `homeassistant.device-name = "HPSU compact"`
//! - `lang = "en"`
//! - `shutdown-grace = 15s`
//!
//! Durations use humantime notation (`3s`, `1m30s`). Unknown keys are
//! rejected so typos fail at startup instead of silently disabling a
//! setting.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use serde::Deserialize;
use thiserror::Error;

use crate::catalog::{Catalog, Command};

/// Errors raised while loading or resolving the configuration.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// The config file could not be read.
    #[error("read config {path:?}: {error}")]
    Read {
        /// Path as given on the command line.
        path: String,
        /// The underlying error message.
        error: String,
    },

    /// The config file is not valid YAML for the expected shape.
    #[error("parse config: {error}")]
    Parse {
        /// The underlying error message.
        error: String,
    },

    /// The config parsed but violates a semantic rule.
    #[error("invalid config: {reason}")]
    Invalid {
        /// What is wrong with it.
        reason: String,
    },

    /// A poll entry names a command the catalog does not contain.
    #[error("subscription references unknown command {id:?}")]
    UnknownCommand {
        /// The unresolved command id.
        id: String,
    },
}

/// Settings for the appliance bus side.
#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
pub struct CanConfig {
    /// Network interface the gateway binds (`can0`, `vcan0`, ...).
    pub interface: String,
}

/// Settings for the broker side.
#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
pub struct MqttConfig {
    /// Broker hostname or address.
    pub host: String,

    /// Broker port.
    #[serde(default = "default_port")]
    pub port: u16,

    /// Client identifier presented to the broker.
    #[serde(default = "default_client_id")]
    pub client_id: String,

    /// Username for broker authentication. Set together with `password`.
    #[serde(default)]
    pub username: Option<String>,

    /// Password for broker authentication. Set together with `username`.
    #[serde(default)]
    pub password: Option<String>,

    /// Topic prefix for published readings; the command id is appended.
    pub value_topic_prefix: String,
}

/// Settings for Home Assistant discovery.
#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "kebab-case", deny_unknown_fields, default)]
pub struct HomeAssistantConfig {
    /// Topic prefix Home Assistant watches for discovery records.
    pub discovery_topic_prefix: String,

    /// Device name shown in the Home Assistant UI.
    pub device_name: String,
}

impl Default for HomeAssistantConfig {
    fn default() -> Self {
        Self {
            discovery_topic_prefix: "homeassistant".to_string(),
            device_name: "HPSU compact".to_string(),
        }
    }
}

/// One poll entry as written in the file, before catalog resolution.
#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
pub struct SubscriptionConfig {
    /// Catalog id of the command to poll.
    pub command: String,

    /// Cadence between polls. Must be strictly positive.
    #[serde(with = "humantime_serde")]
    pub delay: Duration,
}

/// A poll entry bound to its catalog command.
#[derive(Clone, Debug)]
pub struct Subscription {
    /// The command to poll.
    pub command: Arc<Command>,

    /// Cadence between polls.
    pub delay: Duration,
}

/// Gateway process configuration.
#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
pub struct Config {
    /// Appliance bus settings.
    pub can: CanConfig,

    /// Broker settings.
    pub mqtt: MqttConfig,

    /// Home Assistant discovery settings.
    #[serde(default)]
    pub homeassistant: HomeAssistantConfig,

    /// Language for display names pulled from the catalog.
    #[serde(default = "default_lang")]
    pub lang: String,

    /// Maximum wait for workers to stop after the first failure or signal.
    #[serde(default = "default_grace", with = "humantime_serde")]
    pub shutdown_grace: Duration,

    /// Commands to poll and how often.
    pub subscriptions: Vec<SubscriptionConfig>,
}

fn default_port() -> u16 {
    1883
}

fn default_client_id() -> String {
    "thermolink".to_string()
}

fn default_lang() -> String {
    "en".to_string()
}

fn default_grace() -> Duration {
    Duration::from_secs(15)
}

impl Config {
    /// Loads and validates a config file.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|err| ConfigError::Read {
            path: path.display().to_string(),
            error: err.to_string(),
        })?;
        Self::parse(&text)
    }

    /// Parses and validates config YAML.
    pub fn parse(text: &str) -> Result<Self, ConfigError> {
        let config: Config = serde_yaml::from_str(text).map_err(|err| ConfigError::Parse {
            error: err.to_string(),
        })?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.subscriptions.is_empty() {
            return Err(invalid("no subscriptions; nothing to poll"));
        }
        for sub in &self.subscriptions {
            if sub.delay.is_zero() {
                return Err(invalid(&format!(
                    "subscription {:?}: delay must be positive",
                    sub.command
                )));
            }
        }
        if self.mqtt.username.is_some() != self.mqtt.password.is_some() {
            return Err(invalid("mqtt username and password must be set together"));
        }
        Ok(())
    }

    /// Binds every poll entry to its catalog command.
    ///
    /// Entries keep file order. An unknown command id is a startup error,
    /// not a skipped entry.
    pub fn resolve_subscriptions(&self, catalog: &Catalog) -> Result<Vec<Subscription>, ConfigError> {
        let mut resolved = Vec::with_capacity(self.subscriptions.len());
        for sub in &self.subscriptions {
            let command = catalog
                .get(&sub.command)
                .ok_or_else(|| ConfigError::UnknownCommand {
                    id: sub.command.clone(),
                })?;
            resolved.push(Subscription {
                command,
                delay: sub.delay,
            });
        }
        Ok(resolved)
    }
}

fn invalid(reason: &str) -> ConfigError {
    ConfigError::Invalid {
        reason: reason.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const FULL: &str = r#"
can:
  interface: can0
mqtt:
  host: broker.local
  port: 8883
  client-id: hpsu-cellar
  username: gateway
  password: secret
  value-topic-prefix: cellar/hpsu
homeassistant:
  discovery-topic-prefix: ha
  device-name: Cellar pump
lang: de
shutdown-grace: 20s
subscriptions:
  - command: t-dhw
    delay: 30s
  - command: status-pump
    delay: 3s
"#;

    const MINIMAL: &str = r#"
can:
  interface: vcan0
mqtt:
  host: localhost
  value-topic-prefix: thermolink/values
subscriptions:
  - command: t-dhw
    delay: 1m
"#;

    fn catalog() -> Catalog {
        Catalog::parse(
            r#"{
                "status-pump": {
                    "request":  { "can-id": "680", "prefix": "31 00 FA 0A 8C" },
                    "response": { "can-id": "180", "prefix": "32 10 FA 0A 8C" },
                    "kind": "coded",
                    "codes": { "0": "off", "1": "on" }
                },
                "t-dhw": {
                    "request":  { "can-id": "680", "prefix": "31 00 FA 00 0E" },
                    "response": { "can-id": "180", "prefix": "32 10 FA 00 0E" },
                    "divisor": 10,
                    "unit": "deg",
                    "kind": "float"
                }
            }"#,
        )
        .unwrap()
    }

    #[test]
    fn test_parse_full_config() {
        let config = Config::parse(FULL).unwrap();

        assert_eq!(config.can.interface, "can0");
        assert_eq!(config.mqtt.host, "broker.local");
        assert_eq!(config.mqtt.port, 8883);
        assert_eq!(config.mqtt.client_id, "hpsu-cellar");
        assert_eq!(config.mqtt.username.as_deref(), Some("gateway"));
        assert_eq!(config.homeassistant.discovery_topic_prefix, "ha");
        assert_eq!(config.lang, "de");
        assert_eq!(config.shutdown_grace, Duration::from_secs(20));
        assert_eq!(config.subscriptions.len(), 2);
        assert_eq!(config.subscriptions[1].delay, Duration::from_secs(3));
    }

    #[test]
    fn test_parse_applies_defaults() {
        let config = Config::parse(MINIMAL).unwrap();

        assert_eq!(config.mqtt.port, 1883);
        assert_eq!(config.mqtt.client_id, "thermolink");
        assert_eq!(config.mqtt.username, None);
        assert_eq!(config.homeassistant.discovery_topic_prefix, "homeassistant");
        assert_eq!(config.homeassistant.device_name, "HPSU compact");
        assert_eq!(config.lang, "en");
        assert_eq!(config.shutdown_grace, Duration::from_secs(15));
        assert_eq!(config.subscriptions[0].delay, Duration::from_secs(60));
    }

    #[test]
    fn test_unknown_key_is_rejected() {
        let text = MINIMAL.replace("interface: vcan0", "interface: vcan0\n  bitrate: 20000");
        assert!(matches!(
            Config::parse(&text),
            Err(ConfigError::Parse { .. })
        ));
    }

    #[test]
    fn test_empty_subscriptions_are_rejected() {
        let text = r#"
can: { interface: can0 }
mqtt: { host: localhost, value-topic-prefix: p }
subscriptions: []
"#;
        assert!(matches!(
            Config::parse(text),
            Err(ConfigError::Invalid { .. })
        ));
    }

    #[test]
    fn test_zero_delay_is_rejected() {
        let text = r#"
can: { interface: can0 }
mqtt: { host: localhost, value-topic-prefix: p }
subscriptions:
  - command: t-dhw
    delay: 0s
"#;
        assert!(matches!(
            Config::parse(text),
            Err(ConfigError::Invalid { .. })
        ));
    }

    #[test]
    fn test_username_without_password_is_rejected() {
        let text = r#"
can: { interface: can0 }
mqtt: { host: localhost, username: solo, value-topic-prefix: p }
subscriptions:
  - command: t-dhw
    delay: 3s
"#;
        assert!(matches!(
            Config::parse(text),
            Err(ConfigError::Invalid { .. })
        ));
    }

    #[test]
    fn test_resolve_subscriptions_binds_commands_in_order() {
        let config = Config::parse(FULL).unwrap();
        let subs = config.resolve_subscriptions(&catalog()).unwrap();

        assert_eq!(subs.len(), 2);
        assert_eq!(subs[0].command.id, "t-dhw");
        assert_eq!(subs[0].delay, Duration::from_secs(30));
        assert_eq!(subs[1].command.id, "status-pump");
    }

    #[test]
    fn test_resolve_subscriptions_reports_unknown_command() {
        let text = FULL.replace("t-dhw", "t-nope");
        let config = Config::parse(&text).unwrap();

        let err = config.resolve_subscriptions(&catalog()).unwrap_err();
        assert!(matches!(err, ConfigError::UnknownCommand { ref id } if id == "t-nope"));
    }
}
