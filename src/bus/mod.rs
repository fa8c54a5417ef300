//! # Bus side: socket abstraction, reader, and poller.
//!
//! Everything that touches the appliance bus lives here:
//! - [`BusSocket`] is the transport seam; [`CanBus`] implements it over
//!   SocketCAN (behind the `socketcan` feature)
//! - [`Reader`] forwards inbound [`Frame`]s to the dispatcher
//! - [`Poller`] sends subscription requests on their cadences

mod frame;
mod poller;
mod reader;
mod socket;
#[cfg(feature = "socketcan")]
mod socketcan;

pub use frame::{Frame, FrameKind};
pub use poller::Poller;
pub use reader::Reader;
pub use socket::{BusSocket, SocketError};
#[cfg(feature = "socketcan")]
pub use socketcan::CanBus;
