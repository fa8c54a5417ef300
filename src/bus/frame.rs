//! # Neutral frame model.
//!
//! [`Frame`] is what the rest of the gateway sees of the bus: an id, payload
//! bytes, and a diagnostic kind. Adapters translate between this model and
//! whatever their transport speaks.

use std::fmt;

use crate::catalog::CanId;

/// Kind of a bus frame. Diagnostic only; classification matches on id and
/// bytes.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FrameKind {
    /// Ordinary payload-carrying frame.
    Data,
    /// Remote transmission request.
    Remote,
    /// Bus error report.
    Error,
}

impl FrameKind {
    /// Stable lowercase label for logs.
    pub fn as_label(&self) -> &'static str {
        match self {
            FrameKind::Data => "data",
            FrameKind::Remote => "remote",
            FrameKind::Error => "error",
        }
    }
}

/// One frame as seen on the appliance bus.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Frame {
    /// Bus id the frame was sent under.
    pub id: CanId,
    /// Payload bytes.
    pub data: Vec<u8>,
    /// What kind of frame this is.
    pub kind: FrameKind,
}

impl Frame {
    /// Builds an ordinary data frame.
    pub fn data(id: CanId, data: Vec<u8>) -> Self {
        Self {
            id,
            data,
            kind: FrameKind::Data,
        }
    }
}

impl fmt::Display for Frame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {} [", self.id, self.kind.as_label())?;
        for (i, byte) in self.data.iter().enumerate() {
            if i > 0 {
                write!(f, " ")?;
            }
            write!(f, "{byte:02X}")?;
        }
        write!(f, "]")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_shows_id_kind_and_bytes() {
        let frame = Frame::data(CanId(0x180), vec![0x32, 0x10, 0xFA]);
        assert_eq!(frame.to_string(), "0x180 data [32 10 FA]");
    }

    #[test]
    fn test_kind_labels_are_stable() {
        assert_eq!(FrameKind::Data.as_label(), "data");
        assert_eq!(FrameKind::Remote.as_label(), "remote");
        assert_eq!(FrameKind::Error.as_label(), "error");
    }
}
