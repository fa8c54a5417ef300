//! # Dispatcher: classifies inbound frames against the catalog.
//!
//! [`Dispatcher`] consumes frames from the reader, finds the catalog command
//! they answer, and fans the result out: the command goes back to the poller
//! as an acknowledgement, the `(command, value)` pair goes to the publishing
//! path.
//!
//! ```text
//!                      ┌──────────────┐── ack (Arc<Command>) ──► Poller
//!  frames (Reader) ──► │  Dispatcher  │
//!                      └──────────────┘── CommandValue ────────► Publisher
//! ```
//!
//! ### Rules
//! - Commands are scanned in catalog order; per command the response
//!   template is tested before the request template; first match wins.
//! - A response match needs at least two payload bytes after the prefix.
//!   The value is the big-endian u16 immediately following it.
//! - The gateway's own requests echo back on the shared bus; they are
//!   skipped quietly. Frames matching nothing are skipped loudly.
//! - Frames are processed one at a time in arrival order. Both deliveries
//!   race cancellation, so a stalled consumer cannot wedge frame handling
//!   past shutdown.

use std::sync::Arc;

use thiserror::Error;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace, warn};

use crate::bus::Frame;
use crate::catalog::{Command, FrameTemplate};
use crate::flow::FlowControl;

/// Payload bytes a response must carry after its matched prefix.
const VALUE_LEN: usize = 2;

/// A classified reading: which command answered and its raw 16-bit value.
#[derive(Clone, Debug)]
pub struct CommandValue {
    /// The catalog command the frame matched.
    pub command: Arc<Command>,
    /// Raw value, big-endian bytes following the matched prefix.
    pub raw: u16,
}

/// Non-matches produced by classification. All current kinds are skippable;
/// the run loop still branches on the capabilities, not the variants.
#[derive(Error, Debug)]
pub enum ClassifyError {
    /// The gateway's own request, observed back on the shared bus.
    #[error("own request for {id:?} echoed back")]
    EchoedRequest {
        /// Id of the command whose request template matched.
        id: String,
    },

    /// No catalog command matches the frame.
    #[error("no command matches frame {frame}")]
    Unmatched {
        /// The offending frame, id and bytes included.
        frame: Frame,
    },
}

impl FlowControl for ClassifyError {
    fn can_skip(&self) -> bool {
        true
    }

    /// An unknown signature is worth surfacing; our own echo is not.
    fn should_log(&self) -> bool {
        matches!(self, ClassifyError::Unmatched { .. })
    }
}

/// Matches inbound frames to catalog commands and fans results out.
pub struct Dispatcher {
    frames: mpsc::Receiver<Frame>,
    commands: Vec<Arc<Command>>,
    acks: mpsc::Sender<Arc<Command>>,
    values: mpsc::Sender<CommandValue>,
}

impl Dispatcher {
    /// Creates a dispatcher scanning `commands` in the given order.
    pub fn new(
        frames: mpsc::Receiver<Frame>,
        commands: Vec<Arc<Command>>,
        acks: mpsc::Sender<Arc<Command>>,
        values: mpsc::Sender<CommandValue>,
    ) -> Self {
        Self {
            frames,
            commands,
            acks,
            values,
        }
    }

    /// Runs until cancelled or a non-skippable classification failure.
    pub async fn run(mut self, token: CancellationToken) -> Result<(), ClassifyError> {
        loop {
            let frame = tokio::select! {
                _ = token.cancelled() => return Ok(()),
                frame = self.frames.recv() => match frame {
                    Some(frame) => frame,
                    None => return Ok(()), // reader gone, shutdown underway
                },
            };

            let value = match self.classify(&frame) {
                Ok(value) => value,
                Err(err) if err.can_skip() => {
                    if err.should_log() {
                        warn!(error = %err, "frame skipped");
                    } else {
                        trace!(error = %err, "frame skipped");
                    }
                    continue;
                }
                Err(err) => return Err(err),
            };
            debug!(command = %value.command.id, raw = value.raw, "response matched");

            tokio::select! {
                _ = token.cancelled() => return Ok(()),
                sent = self.acks.send(value.command.clone()) => {
                    if sent.is_err() {
                        return Ok(()); // poller gone
                    }
                }
            }
            tokio::select! {
                _ = token.cancelled() => return Ok(()),
                sent = self.values.send(value) => {
                    if sent.is_err() {
                        return Ok(()); // publisher gone
                    }
                }
            }
        }
    }

    /// Finds the command `frame` belongs to.
    fn classify(&self, frame: &Frame) -> Result<CommandValue, ClassifyError> {
        for command in &self.commands {
            if let Some(raw) = match_response(command, frame) {
                return Ok(CommandValue {
                    command: command.clone(),
                    raw,
                });
            }
            if matches_template(&command.request, frame) {
                return Err(ClassifyError::EchoedRequest {
                    id: command.id.clone(),
                });
            }
        }
        Err(ClassifyError::Unmatched {
            frame: frame.clone(),
        })
    }
}

/// Tests `frame` against a command's response template and extracts the
/// value. A prefix match without room for the value does not count.
fn match_response(command: &Command, frame: &Frame) -> Option<u16> {
    let template = &command.response;
    if !matches_template(template, frame) {
        return None;
    }
    let start = template.prefix.len();
    let bytes = frame.data.get(start..start + VALUE_LEN)?;
    Some(u16::from_be_bytes([bytes[0], bytes[1]]))
}

fn matches_template(template: &FrameTemplate, frame: &Frame) -> bool {
    frame.id == template.can_id && template.prefix.matches_prefix(&frame.data)
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use super::*;
    use crate::catalog::{CanId, CommandBytes, Unit, ValueKind};

    fn command(id: &str, request: (u32, Vec<u8>), response: (u32, Vec<u8>)) -> Arc<Command> {
        Arc::new(Command {
            id: id.to_string(),
            name: BTreeMap::new(),
            description: BTreeMap::new(),
            request: FrameTemplate {
                can_id: CanId(request.0),
                prefix: CommandBytes::new(request.1),
            },
            response: FrameTemplate {
                can_id: CanId(response.0),
                prefix: CommandBytes::new(response.1),
            },
            divisor: 1.0,
            unit: Unit::None,
            kind: ValueKind::Integer,
            codes: BTreeMap::new(),
            writable: false,
        })
    }

    fn fixture() -> Vec<Arc<Command>> {
        vec![
            command(
                "t-dhw",
                (0x680, vec![0x31, 0x00, 0xFA, 0x00, 0x0E]),
                (0x180, vec![0x32, 0x10, 0xFA, 0x00, 0x0E]),
            ),
            command(
                "status-pump",
                (0x680, vec![0x31, 0x00, 0xFA, 0x0A, 0x8C]),
                (0x180, vec![0x32, 0x10, 0xFA, 0x0A, 0x8C]),
            ),
        ]
    }

    fn dispatcher(commands: Vec<Arc<Command>>) -> Dispatcher {
        let (_frame_tx, frame_rx) = mpsc::channel(4);
        let (ack_tx, _ack_rx) = mpsc::channel(4);
        let (value_tx, _value_rx) = mpsc::channel(4);
        Dispatcher::new(frame_rx, commands, ack_tx, value_tx)
    }

    #[test]
    fn test_response_frame_matches_its_command() {
        let d = dispatcher(fixture());
        let frame = Frame::data(CanId(0x180), vec![0x32, 0x10, 0xFA, 0x00, 0x0E, 0x01, 0x6E]);

        let value = d.classify(&frame).unwrap();
        assert_eq!(value.command.id, "t-dhw");
        assert_eq!(value.raw, 0x016E);
    }

    #[test]
    fn test_value_is_big_endian_after_the_prefix() {
        let d = dispatcher(vec![command(
            "t-x",
            (0x680, vec![0x01, 0x02, 0x03]),
            (0x180, vec![3, 7, 5]),
        )]);
        let frame = Frame::data(CanId(0x180), vec![3, 7, 5, 4, 3]);

        let value = d.classify(&frame).unwrap();
        assert_eq!(value.raw, 1027, "0x0403 read big-endian");
    }

    #[test]
    fn test_own_request_echo_is_skipped_quietly() {
        let d = dispatcher(fixture());
        let frame = Frame::data(CanId(0x680), vec![0x31, 0x00, 0xFA, 0x0A, 0x8C]);

        let err = d.classify(&frame).unwrap_err();
        assert!(matches!(err, ClassifyError::EchoedRequest { ref id } if id == "status-pump"));
        assert!(err.can_skip());
        assert!(!err.should_log());
    }

    #[test]
    fn test_unknown_frame_is_skipped_loudly() {
        let d = dispatcher(fixture());
        let frame = Frame::data(CanId(0x300), vec![0xDE, 0xAD]);

        let err = d.classify(&frame).unwrap_err();
        assert!(matches!(err, ClassifyError::Unmatched { .. }));
        assert!(err.can_skip());
        assert!(err.should_log());
    }

    #[test]
    fn test_short_response_frame_is_unmatched() {
        let d = dispatcher(fixture());
        // Matches the t-dhw response prefix but carries one value byte.
        let frame = Frame::data(CanId(0x180), vec![0x32, 0x10, 0xFA, 0x00, 0x0E, 0x01]);

        let err = d.classify(&frame).unwrap_err();
        assert!(matches!(err, ClassifyError::Unmatched { .. }));
    }

    #[test]
    fn test_response_template_is_tested_before_request() {
        // Same template on both sides: the response test wins.
        let d = dispatcher(vec![command(
            "t-both",
            (0x180, vec![0xAA]),
            (0x180, vec![0xAA]),
        )]);
        let frame = Frame::data(CanId(0x180), vec![0xAA, 0x00, 0x07]);

        let value = d.classify(&frame).unwrap();
        assert_eq!(value.raw, 7);
    }

    #[tokio::test]
    async fn test_run_delivers_ack_then_value_and_skips_junk() {
        let (frame_tx, frame_rx) = mpsc::channel(4);
        let (ack_tx, mut ack_rx) = mpsc::channel(4);
        let (value_tx, mut value_rx) = mpsc::channel(4);
        let d = Dispatcher::new(frame_rx, fixture(), ack_tx, value_tx);

        let token = CancellationToken::new();
        tokio::spawn(d.run(token.clone()));

        let matched = Frame::data(CanId(0x180), vec![0x32, 0x10, 0xFA, 0x00, 0x0E, 0x01, 0x6E]);
        let junk = Frame::data(CanId(0x300), vec![0xDE, 0xAD]);
        let matched_again =
            Frame::data(CanId(0x180), vec![0x32, 0x10, 0xFA, 0x0A, 0x8C, 0x00, 0x01]);

        frame_tx.send(matched).await.unwrap();
        frame_tx.send(junk).await.unwrap();
        frame_tx.send(matched_again).await.unwrap();

        assert_eq!(ack_rx.recv().await.unwrap().id, "t-dhw");
        let first = value_rx.recv().await.unwrap();
        assert_eq!(first.command.id, "t-dhw");
        assert_eq!(first.raw, 0x016E);

        // The junk frame produced nothing; the next delivery is the second
        // match, proving the dispatcher survived it.
        assert_eq!(ack_rx.recv().await.unwrap().id, "status-pump");
        assert_eq!(value_rx.recv().await.unwrap().raw, 1);

        token.cancel();
    }

    #[tokio::test]
    async fn test_cancel_stops_the_dispatcher() {
        let (_frame_tx, frame_rx) = mpsc::channel(4);
        let (ack_tx, _ack_rx) = mpsc::channel(4);
        let (value_tx, _value_rx) = mpsc::channel(4);
        let d = Dispatcher::new(frame_rx, fixture(), ack_tx, value_tx);

        let token = CancellationToken::new();
        let handle = tokio::spawn(d.run(token.clone()));

        token.cancel();
        assert!(handle.await.unwrap().is_ok());
    }

    #[tokio::test]
    async fn test_closed_frame_channel_ends_the_run() {
        let (frame_tx, frame_rx) = mpsc::channel(4);
        let (ack_tx, _ack_rx) = mpsc::channel(4);
        let (value_tx, _value_rx) = mpsc::channel(4);
        let d = Dispatcher::new(frame_rx, fixture(), ack_tx, value_tx);

        drop(frame_tx);
        assert!(d.run(CancellationToken::new()).await.is_ok());
    }
}
