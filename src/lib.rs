//! # thermolink
//!
//! **Thermolink** is a CAN-to-MQTT telemetry gateway for Rotex/Daikin HPSU
//! heat pumps. It polls appliance registers over a CAN-style field bus on
//! configured cadences, decodes the responses against a command catalog, and
//! publishes the readings to an MQTT broker, announcing every sensor to Home
//! Assistant via retained discovery entities.
//!
//! The crate is a library plus a thin daemon binary; everything except the
//! SocketCAN transport builds and tests on any host.
//!
//! ## Architecture
//! ### Overview
//! ```text
//!   requests ──► Scheduler ── triggers ──► Poller ── poll frames ──► CAN socket
//!  (one per         ▲                        ▲                           │
//!   subscription,   │ re-arm                 │ acks                      │
//!   re-armed        │                        │ (cadence reset)           │
//!   after each      │                        │                        frames
//!   send)           └────── Poller ──────────┤                           │
//!                                            │                           ▼
//!                                       Dispatcher ◄──── frames ────── Reader
//!                                            │
//!                                            └── values ──► Publisher ──► MQTT sink
//!                                                                           ▲
//!                             Announcer ──── retained discovery entities ───┘
//! ```
//!
//! Every arrow is a bounded `mpsc` channel or the socket itself; there is no
//! shared mutable state between workers. The socket is split by direction:
//! the reader only receives, the poller only sends.
//!
//! ### Shutdown
//! ```text
//! first worker exit (fatal error, or the signal listener hearing SIGTERM)
//!           └─► Supervisor:
//!                  ├─► kill() every worker            (exactly once)
//!                  └─► wait, bounded by one grace deadline:
//!                         ├─ all stopped  → exit, code from first error
//!                         └─ stragglers   → abandoned (detached), then exit
//! ```
//!
//! ## Features
//! | Area            | Description                                              | Key types / traits            |
//! |-----------------|----------------------------------------------------------|-------------------------------|
//! | **Scheduling**  | Deadline-ordered delayed delivery of arbitrary payloads. | [`Scheduler`], [`Trigger`]    |
//! | **Bus**         | Frame reader and cadenced poller over a socket trait.    | [`BusSocket`], [`Poller`]     |
//! | **Dispatch**    | Frame classification against the command catalog.        | [`Dispatcher`], [`CommandValue`] |
//! | **Broker**      | Value rendering and publishing through a sink trait.     | [`Publisher`], [`PublishSink`] |
//! | **Discovery**   | Retained Home Assistant discovery entities.              | [`Announcer`]                 |
//! | **Supervision** | Run workers until the first exits, then drain the rest.  | [`Supervisor`], [`WorkerHandle`] |
//! | **Errors**      | Local flow control and terminal worker errors.           | [`FlowControl`], [`WorkerError`] |
//!
//! ## Optional features
//! - `socketcan`: the Linux SocketCAN transport (`CanBus`). The daemon binary
//!   requires it; the library and its tests build without it.
//!
//! ## Example
//! ```rust
//! use thermolink::{render, Catalog, CommandValue};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let catalog = Catalog::parse(
//!     r#"{
//!     "t-dhw": {
//!         "name": { "en": "Hot water temperature" },
//!         "request":  { "can-id": "680", "prefix": "31 00 FA 00 0E" },
//!         "response": { "can-id": "180", "prefix": "32 10 FA 00 0E" },
//!         "divisor": 10,
//!         "unit": "deg",
//!         "kind": "float"
//!     }
//! }"#,
//! )?;
//!
//! let command = catalog.get("t-dhw").ok_or("missing command")?;
//! let reading = CommandValue { command, raw: 485 };
//! assert_eq!(render(&reading)?, "48.5000");
//! # Ok(())
//! # }
//! ```

mod broker;
mod bus;
mod catalog;
mod config;
mod core;
mod discovery;
mod dispatch;
mod error;
mod flow;
mod schedule;

// ---- Public re-exports ----

pub use broker::{
    render, MqttConnection, MqttSink, PublishError, PublishSink, Publisher, RenderError,
    SinkError,
};
pub use bus::{BusSocket, Frame, FrameKind, Poller, Reader, SocketError};
pub use catalog::{
    CanId, Catalog, CatalogError, Command, CommandBytes, FrameTemplate, Unit, ValueKind,
};
pub use config::{
    CanConfig, Config, ConfigError, HomeAssistantConfig, MqttConfig, Subscription,
    SubscriptionConfig,
};
pub use core::{listen_for_signals, Supervisor, WorkerHandle};
pub use discovery::{AnnounceError, Announcer};
pub use dispatch::{ClassifyError, CommandValue, Dispatcher};
pub use error::WorkerError;
pub use flow::FlowControl;
pub use schedule::{Request, Scheduler, Trigger};

// Optional: the SocketCAN transport (Linux only).
// Enable with: `--features socketcan`
#[cfg(feature = "socketcan")]
pub use bus::CanBus;
