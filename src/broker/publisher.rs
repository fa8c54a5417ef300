//! # Publisher: renders readings and hands them to the sink.
//!
//! [`Publisher`] consumes [`CommandValue`]s from the dispatcher, renders
//! each raw 16-bit reading per its command's value kind, and publishes the
//! text to `{topic-prefix}/{command-id}`.
//!
//! ### Rules
//! - `coded`: look the reading up in the command's code table; unlisted
//!   codes fall back to the decimal number.
//! - `integer`: reading ÷ divisor, rounded to the nearest whole number.
//! - `float`: reading ÷ divisor with four fractional digits.
//! - `none`, or a zero divisor that slipped past catalog validation: a
//!   skippable render error. Catalog mistakes must not take the daemon down.
//! - Losing the sink is fatal; the supervisor takes it from there.

use std::sync::Arc;

use thiserror::Error;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::broker::sink::{PublishSink, SinkError};
use crate::catalog::ValueKind;
use crate::dispatch::CommandValue;
use crate::flow::FlowControl;

/// Errors raised while turning a raw reading into publishable text.
#[derive(Error, Debug)]
pub enum RenderError {
    /// The command does not define a value interpretation.
    #[error("command {id:?} has no value interpretation")]
    NoKind {
        /// The offending command id.
        id: String,
    },

    /// A scaled kind carries a zero divisor.
    #[error("command {id:?} has a zero divisor")]
    ZeroDivisor {
        /// The offending command id.
        id: String,
    },
}

impl FlowControl for RenderError {
    /// One bad catalog record must not stop the stream of good ones.
    fn can_skip(&self) -> bool {
        true
    }

    fn should_log(&self) -> bool {
        true
    }
}

/// Either failure of the publish path, with [`FlowControl`] delegated to
/// the underlying error.
#[derive(Error, Debug)]
pub enum PublishError {
    /// The reading could not be rendered.
    #[error(transparent)]
    Render(#[from] RenderError),

    /// The sink rejected the publish.
    #[error(transparent)]
    Sink(#[from] SinkError),
}

impl FlowControl for PublishError {
    fn can_skip(&self) -> bool {
        match self {
            PublishError::Render(err) => err.can_skip(),
            PublishError::Sink(err) => err.can_skip(),
        }
    }

    fn should_log(&self) -> bool {
        match self {
            PublishError::Render(err) => err.should_log(),
            PublishError::Sink(err) => err.should_log(),
        }
    }

    fn should_retry(&self) -> bool {
        match self {
            PublishError::Render(err) => err.should_retry(),
            PublishError::Sink(err) => err.should_retry(),
        }
    }
}

/// Renders a classified reading per its command's value kind.
pub fn render(value: &CommandValue) -> Result<String, RenderError> {
    let command = &value.command;
    match command.kind {
        ValueKind::Coded => Ok(command
            .codes
            .get(&value.raw)
            .cloned()
            .unwrap_or_else(|| value.raw.to_string())),
        ValueKind::Integer => {
            let scaled = f64::from(value.raw) / non_zero_divisor(value)?;
            Ok(format!("{}", scaled.round() as i64))
        }
        ValueKind::Float => {
            let scaled = f64::from(value.raw) / non_zero_divisor(value)?;
            Ok(format!("{scaled:.4}"))
        }
        ValueKind::None => Err(RenderError::NoKind {
            id: command.id.clone(),
        }),
    }
}

fn non_zero_divisor(value: &CommandValue) -> Result<f64, RenderError> {
    if value.command.divisor == 0.0 {
        return Err(RenderError::ZeroDivisor {
            id: value.command.id.clone(),
        });
    }
    Ok(value.command.divisor)
}

/// Publishes rendered readings to the broker.
pub struct Publisher {
    sink: Arc<dyn PublishSink>,
    values: mpsc::Receiver<CommandValue>,
    topic_prefix: String,
}

impl Publisher {
    /// Creates a publisher writing under `topic_prefix`.
    pub fn new(
        sink: Arc<dyn PublishSink>,
        values: mpsc::Receiver<CommandValue>,
        topic_prefix: String,
    ) -> Self {
        Self {
            sink,
            values,
            topic_prefix,
        }
    }

    /// Runs until cancelled or a non-skippable publish failure.
    pub async fn run(mut self, token: CancellationToken) -> Result<(), PublishError> {
        loop {
            let value = tokio::select! {
                _ = token.cancelled() => return Ok(()),
                value = self.values.recv() => match value {
                    Some(value) => value,
                    None => return Ok(()), // dispatcher gone, shutdown underway
                },
            };

            if let Err(err) = self.publish_value(value, &token).await {
                if err.can_skip() {
                    if err.should_log() {
                        warn!(error = %err, "value dropped");
                    }
                    continue;
                }
                return Err(err);
            }
        }
    }

    async fn publish_value(
        &self,
        value: CommandValue,
        token: &CancellationToken,
    ) -> Result<(), PublishError> {
        let rendered = render(&value)?;
        let topic = format!("{}/{}", self.topic_prefix, value.command.id);
        debug!(
            topic = %topic,
            value = %rendered,
            raw = value.raw,
            "publishing"
        );

        tokio::select! {
            _ = token.cancelled() => Ok(()),
            published = self.sink.publish(&topic, rendered, false) => {
                published?;
                Ok(())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::{BTreeMap, VecDeque};
    use std::sync::Mutex;

    use async_trait::async_trait;

    use super::*;
    use crate::catalog::{CanId, Command, CommandBytes, FrameTemplate, Unit};

    /// Sink that records publishes and replays scripted outcomes (missing
    /// script entries succeed).
    struct RecordingSink {
        published: Mutex<Vec<(String, String, bool)>>,
        outcomes: Mutex<VecDeque<Result<(), SinkError>>>,
    }

    impl RecordingSink {
        fn new(outcomes: Vec<Result<(), SinkError>>) -> Arc<Self> {
            Arc::new(Self {
                published: Mutex::new(Vec::new()),
                outcomes: Mutex::new(outcomes.into()),
            })
        }

        fn published(&self) -> Vec<(String, String, bool)> {
            self.published.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl PublishSink for RecordingSink {
        async fn publish(
            &self,
            topic: &str,
            payload: String,
            retain: bool,
        ) -> Result<(), SinkError> {
            self.published
                .lock()
                .unwrap()
                .push((topic.to_string(), payload, retain));
            self.outcomes.lock().unwrap().pop_front().unwrap_or(Ok(()))
        }
    }

    fn reading(kind: ValueKind, divisor: f64, codes: &[(u16, &str)], raw: u16) -> CommandValue {
        let codes = codes
            .iter()
            .map(|(code, label)| (*code, label.to_string()))
            .collect();
        CommandValue {
            command: Arc::new(Command {
                id: "t-dhw".to_string(),
                name: BTreeMap::new(),
                description: BTreeMap::new(),
                request: FrameTemplate {
                    can_id: CanId(0x680),
                    prefix: CommandBytes::new(vec![0x31]),
                },
                response: FrameTemplate {
                    can_id: CanId(0x180),
                    prefix: CommandBytes::new(vec![0x32]),
                },
                divisor,
                unit: Unit::Deg,
                kind,
                codes,
                writable: false,
            }),
            raw,
        }
    }

    #[test]
    fn test_coded_renders_the_label() {
        let value = reading(ValueKind::Coded, 1.0, &[(0, "off"), (1, "on")], 1);
        assert_eq!(render(&value).unwrap(), "on");
    }

    #[test]
    fn test_coded_falls_back_to_the_number() {
        let value = reading(ValueKind::Coded, 1.0, &[(0, "off")], 7);
        assert_eq!(render(&value).unwrap(), "7");
    }

    #[test]
    fn test_integer_rounds_to_nearest() {
        assert_eq!(render(&reading(ValueKind::Integer, 10.0, &[], 366)).unwrap(), "37");
        assert_eq!(render(&reading(ValueKind::Integer, 10.0, &[], 364)).unwrap(), "36");
    }

    #[test]
    fn test_float_keeps_four_digits() {
        assert_eq!(render(&reading(ValueKind::Float, 10.0, &[], 366)).unwrap(), "36.6000");
        assert_eq!(render(&reading(ValueKind::Float, 2.0, &[], 1027)).unwrap(), "513.5000");
    }

    #[test]
    fn test_kind_none_is_a_skippable_error() {
        let err = render(&reading(ValueKind::None, 1.0, &[], 1)).unwrap_err();
        assert!(matches!(err, RenderError::NoKind { .. }));
        assert!(err.can_skip());
        assert!(err.should_log());
    }

    #[test]
    fn test_zero_divisor_is_a_skippable_error_not_a_panic() {
        let err = render(&reading(ValueKind::Float, 0.0, &[], 1)).unwrap_err();
        assert!(matches!(err, RenderError::ZeroDivisor { .. }));
        assert!(err.can_skip());
    }

    #[tokio::test]
    async fn test_publishes_rendered_values_unretained() {
        let sink = RecordingSink::new(vec![]);
        let (tx, rx) = mpsc::channel(4);
        let publisher = Publisher::new(sink.clone(), rx, "cellar/hpsu".to_string());

        let handle = tokio::spawn(publisher.run(CancellationToken::new()));

        tx.send(reading(ValueKind::Float, 10.0, &[], 366)).await.unwrap();
        tx.send(reading(ValueKind::Integer, 1.0, &[], 42)).await.unwrap();
        drop(tx); // buffered values drain before the run ends
        handle.await.unwrap().unwrap();

        let published = sink.published();
        assert_eq!(
            published[0],
            ("cellar/hpsu/t-dhw".to_string(), "36.6000".to_string(), false)
        );
        assert_eq!(published[1].1, "42");
    }

    #[tokio::test]
    async fn test_render_failure_skips_the_value() {
        let sink = RecordingSink::new(vec![]);
        let (tx, rx) = mpsc::channel(4);
        let publisher = Publisher::new(sink.clone(), rx, "p".to_string());

        let handle = tokio::spawn(publisher.run(CancellationToken::new()));

        tx.send(reading(ValueKind::None, 1.0, &[], 1)).await.unwrap();
        tx.send(reading(ValueKind::Integer, 1.0, &[], 2)).await.unwrap();
        drop(tx);
        handle.await.unwrap().unwrap();

        let published = sink.published();
        assert_eq!(published.len(), 1, "only the renderable value reaches the sink");
        assert_eq!(published[0].1, "2");
    }

    #[tokio::test]
    async fn test_sink_failure_is_fatal() {
        let sink = RecordingSink::new(vec![Err(SinkError::client_gone("request channel closed"))]);
        let (tx, rx) = mpsc::channel(4);
        let publisher = Publisher::new(sink.clone(), rx, "p".to_string());

        let handle = tokio::spawn(publisher.run(CancellationToken::new()));
        tx.send(reading(ValueKind::Integer, 1.0, &[], 2)).await.unwrap();

        let result = handle.await.unwrap();
        assert!(matches!(result, Err(PublishError::Sink(_))));
    }

    #[tokio::test]
    async fn test_cancel_stops_the_publisher() {
        let sink = RecordingSink::new(vec![]);
        let (_tx, rx) = mpsc::channel(4);
        let publisher = Publisher::new(sink, rx, "p".to_string());

        let token = CancellationToken::new();
        let handle = tokio::spawn(publisher.run(token.clone()));

        token.cancel();
        assert!(handle.await.unwrap().is_ok());
    }
}
