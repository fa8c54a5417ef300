//! # Poller: sends catalog requests on a per-subscription cadence.
//!
//! [`Poller`] owns a [`Scheduler`] instance and keeps exactly one scheduled
//! item per subscription alive for the whole run. It never waits for
//! replies; the reader and dispatcher handle the inbound side and report
//! matches back as acknowledgements.
//!
//! ## High-level architecture
//! ```text
//!                 ┌────────────────────────────────────────┐
//!                 │                 Poller                 │
//!  acks ────────► │  deferred[i] = now + delay             │
//!                 │                                        │
//!                 │  Scheduler (child token)               │
//!                 │    trigger(i) ──► deferred? ─yes─► re-arm to deferred
//!                 │                      │no              │
//!                 │                      ▼                │
//!                 │                 socket.send ──────────┼──► bus
//!                 │       ok: re-arm +delay               │
//!                 │    retry: re-arm +100ms               │
//!                 │    other: fatal                       │
//!                 └────────────────────────────────────────┘
//! ```
//!
//! ### Rules
//! - Every subscription enters the schedule at start; the first send falls
//!   at start + delay.
//! - A retryable send failure re-arms with a short fixed delay instead of
//!   the cadence, so transient backpressure is retried promptly without
//!   hot-looping.
//! - An acknowledgement does not insert a second scheduler item. It records
//!   a deferred due time; the already-pending trigger observes it, skips
//!   the send, and re-arms the same item to the deferred instant.
//! - Acknowledgements for commands outside the subscription set are ignored.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::bus::frame::Frame;
use crate::bus::socket::{BusSocket, SocketError};
use crate::catalog::Command;
use crate::config::Subscription;
use crate::flow::FlowControl;
use crate::schedule::{Request, Scheduler};

/// Pause before retrying a send that failed with a retryable error. Shorter
/// than any sane cadence.
const RETRY_DELAY: Duration = Duration::from_millis(100);

/// Sends each subscribed command on its configured cadence.
pub struct Poller {
    socket: Arc<dyn BusSocket>,
    subscriptions: Vec<Subscription>,
    acks: mpsc::Receiver<Arc<Command>>,
    /// Deferred due time per subscription, set on acknowledgement.
    deferred: Vec<Option<Instant>>,
    /// Command id → subscription index, for acknowledgement lookup.
    by_command: HashMap<String, usize>,
}

impl Poller {
    /// Creates a poller over `socket` for the given subscriptions.
    ///
    /// `acks` carries commands the dispatcher saw fresh responses for.
    pub fn new(
        socket: Arc<dyn BusSocket>,
        subscriptions: Vec<Subscription>,
        acks: mpsc::Receiver<Arc<Command>>,
    ) -> Self {
        let by_command = subscriptions
            .iter()
            .enumerate()
            .map(|(index, sub)| (sub.command.id.clone(), index))
            .collect();
        let deferred = vec![None; subscriptions.len()];
        Self {
            socket,
            subscriptions,
            acks,
            deferred,
            by_command,
        }
    }

    /// Runs until cancelled or a non-retryable send failure.
    pub async fn run(mut self, token: CancellationToken) -> Result<(), SocketError> {
        let (scheduler, requests, mut triggers) =
            Scheduler::new(self.subscriptions.len().max(1));
        let scheduler_token = token.child_token();
        let scheduler_task = tokio::spawn(scheduler.run(scheduler_token.clone()));

        for (index, sub) in self.subscriptions.iter().enumerate() {
            let _ = requests.send(Request::after(index, sub.delay)).await;
        }

        let result = loop {
            tokio::select! {
                _ = token.cancelled() => break Ok(()),

                trigger = triggers.recv() => {
                    let Some(trigger) = trigger else { break Ok(()) };
                    if let Err(err) = self.on_trigger(trigger.payload, &requests).await {
                        break Err(err);
                    }
                }

                ack = self.acks.recv() => {
                    match ack {
                        Some(command) => self.on_ack(&command),
                        None => break Ok(()), // dispatcher gone, shutdown underway
                    }
                }
            }
        };

        scheduler_token.cancel();
        let _ = scheduler_task.await;
        result
    }

    async fn on_trigger(
        &mut self,
        index: usize,
        requests: &mpsc::Sender<Request<usize>>,
    ) -> Result<(), SocketError> {
        let delay = self.subscriptions[index].delay;

        if let Some(deferred) = self.deferred[index].take() {
            // A fresh value arrived since this item was armed; push the send
            // out to the reset instant instead.
            debug!(
                command = %self.subscriptions[index].command.id,
                "poll deferred after fresh value"
            );
            let wait = deferred.duration_since(Instant::now());
            let _ = requests.send(Request::after(index, wait)).await;
            return Ok(());
        }

        match self.send_poll(index).await {
            Ok(()) => {
                let _ = requests.send(Request::after(index, delay)).await;
                Ok(())
            }
            Err(err) if err.should_retry() => {
                debug!(
                    command = %self.subscriptions[index].command.id,
                    error = %err,
                    "send failed, retrying shortly"
                );
                let _ = requests.send(Request::after(index, RETRY_DELAY)).await;
                Ok(())
            }
            Err(err) => Err(err),
        }
    }

    async fn send_poll(&self, index: usize) -> Result<(), SocketError> {
        let command = &self.subscriptions[index].command;
        let frame = Frame::data(
            command.request.can_id,
            command.request.prefix.as_slice().to_vec(),
        );
        debug!(command = %command.id, frame = %frame, "polling");
        self.socket.send(&frame).await
    }

    fn on_ack(&mut self, command: &Command) {
        // The dispatcher matches the whole catalog; only a subset is polled.
        let Some(&index) = self.by_command.get(&command.id) else {
            return;
        };
        let delay = self.subscriptions[index].delay;
        self.deferred[index] = Some(Instant::now() + delay);
        debug!(command = %command.id, "cadence reset after fresh value");
    }
}
