//! # SocketCAN adapter.
//!
//! [`CanBus`] binds a Linux SocketCAN interface and speaks the neutral
//! [`Frame`] model over it. Compiled only with the `socketcan` feature; the
//! rest of the library (and its tests) does not need a kernel CAN stack.
//!
//! ### Rules
//! - `ENOBUFS` on send maps to [`SocketError::QueueFull`], the retryable
//!   case. Everything else is fatal i/o.
//! - Ids above the 11-bit standard range go out as extended frames.

use async_trait::async_trait;
use socketcan::tokio::CanSocket;
use socketcan::{CanFrame, EmbeddedFrame, ExtendedId, Id, StandardId};

use crate::bus::frame::{Frame, FrameKind};
use crate::bus::socket::{BusSocket, SocketError};
use crate::catalog::CanId;

/// SocketCAN-backed bus endpoint.
pub struct CanBus {
    socket: CanSocket,
}

impl CanBus {
    /// Binds the given interface (`can0`, `vcan0`, ...).
    pub fn open(interface: &str) -> Result<Self, SocketError> {
        let socket = CanSocket::open(interface)
            .map_err(|err| SocketError::io(format!("open {interface:?}: {err}")))?;
        Ok(Self { socket })
    }
}

#[async_trait]
impl BusSocket for CanBus {
    async fn send(&self, frame: &Frame) -> Result<(), SocketError> {
        let outbound = to_can_frame(frame)?;
        match self.socket.write_frame(outbound).await {
            Ok(()) => Ok(()),
            Err(err) if err.raw_os_error() == Some(libc::ENOBUFS) => {
                Err(SocketError::queue_full(err))
            }
            Err(err) => Err(SocketError::io(err)),
        }
    }

    async fn recv(&self) -> Result<Frame, SocketError> {
        let inbound = self.socket.read_frame().await.map_err(SocketError::io)?;
        Ok(from_can_frame(&inbound))
    }
}

fn to_can_frame(frame: &Frame) -> Result<CanFrame, SocketError> {
    CanFrame::new(wire_id(frame.id)?, &frame.data).ok_or_else(|| {
        SocketError::io(format!("frame payload too long: {} bytes", frame.data.len()))
    })
}

fn wire_id(id: CanId) -> Result<Id, SocketError> {
    let wire = if id.0 <= u32::from(StandardId::MAX.as_raw()) {
        StandardId::new(id.0 as u16).map(Id::Standard)
    } else {
        ExtendedId::new(id.0).map(Id::Extended)
    };
    wire.ok_or_else(|| SocketError::io(format!("bus id {id} not addressable")))
}

fn from_can_frame(frame: &CanFrame) -> Frame {
    let kind = match frame {
        CanFrame::Data(_) => FrameKind::Data,
        CanFrame::Remote(_) => FrameKind::Remote,
        CanFrame::Error(_) => FrameKind::Error,
    };
    Frame {
        id: CanId(id_bits(frame.id())),
        data: frame.data().to_vec(),
        kind,
    }
}

fn id_bits(id: Id) -> u32 {
    match id {
        Id::Standard(id) => u32::from(id.as_raw()),
        Id::Extended(id) => id.as_raw(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_small_ids_go_out_as_standard_frames() {
        let frame = Frame::data(CanId(0x680), vec![0x31, 0x00, 0xFA]);
        let wire = to_can_frame(&frame).unwrap();
        assert!(matches!(wire.id(), Id::Standard(_)));
        assert_eq!(wire.data(), &[0x31, 0x00, 0xFA]);
    }

    #[test]
    fn test_large_ids_go_out_as_extended_frames() {
        let frame = Frame::data(CanId(0x1_0000), vec![0x01]);
        let wire = to_can_frame(&frame).unwrap();
        assert!(matches!(wire.id(), Id::Extended(_)));
    }

    #[test]
    fn test_oversized_payload_is_rejected() {
        let frame = Frame::data(CanId(0x680), vec![0; 64]);
        assert!(to_can_frame(&frame).is_err());
    }

    #[test]
    fn test_inbound_data_frame_round_trips() {
        let wire = CanFrame::new(Id::Standard(StandardId::new(0x180).unwrap()), &[0x32, 0x10])
            .unwrap();
        let frame = from_can_frame(&wire);
        assert_eq!(frame.id, CanId(0x180));
        assert_eq!(frame.data, vec![0x32, 0x10]);
        assert_eq!(frame.kind, FrameKind::Data);
    }
}
