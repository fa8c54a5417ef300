//! # Scheduler: fires opaque payloads when their deadlines pass.
//!
//! [`Scheduler`] keeps a small working set of pending items and emits each
//! one on its own trigger channel once its due time is reached. It knows
//! nothing about polling or the bus; payloads are opaque.
//!
//! ## Key responsibilities
//! - accept `(payload, delay)` requests and convert them to absolute deadlines
//! - arm exactly **one** timer, for the earliest pending deadline
//! - emit `(payload, fire time)` triggers in deadline order
//! - stop promptly on cancellation, even mid-emission
//!
//! ## High-level architecture
//! ```text
//! Sender<Request<T>> ──► ┌───────────────┐ ──► Receiver<Trigger<T>>
//!                        │   Scheduler   │
//! CancellationToken ───► └───────────────┘
//!
//! Loop (one iteration):
//!   earliest = linear scan over pending items
//!   select! {
//!     cancelled        → exit
//!     timer(earliest)  → remove item, send Trigger (raced with cancel)
//!     requests.recv()  → insert item (may preempt the armed timer)
//!   }
//! ```
//!
//! ### Rules
//! - The pending set is unordered; the earliest deadline is found by linear
//!   scan each iteration. The working set never exceeds the subscription
//!   count.
//! - With no pending items the timer is a future that never resolves, so the
//!   loop shape does not special-case "empty".
//! - Re-submitting a payload that already has a pending item creates a second
//!   independent item. Deduplication is the caller's job.
//! - A trigger send that would block is raced against cancellation, so a
//!   stalled consumer cannot pin the loop past shutdown.

use std::future;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::time::{sleep_until, Instant};
use tokio_util::sync::CancellationToken;
use tracing::trace;

/// Asks the scheduler to fire `payload` once `delay` has elapsed.
#[derive(Debug)]
pub struct Request<T> {
    /// Opaque payload handed back in the matching [`Trigger`].
    pub payload: T,
    /// Relative delay until the payload is due.
    pub delay: Duration,
}

impl<T> Request<T> {
    /// Builds a request due `delay` from now.
    pub fn after(payload: T, delay: Duration) -> Self {
        Self { payload, delay }
    }
}

/// A payload whose deadline has passed.
#[derive(Debug)]
pub struct Trigger<T> {
    /// The payload from the originating [`Request`].
    pub payload: T,
    /// When the timer actually fired.
    pub fired_at: Instant,
}

/// One pending payload with its absolute deadline.
struct ScheduledItem<T> {
    payload: T,
    due: Instant,
}

/// Deadline-ordered trigger source.
///
/// Constructed together with its two channel endpoints; the owner drives
/// [`Scheduler::run`] and decides the channel capacity (which bounds how many
/// unconsumed triggers may pile up before emission blocks).
pub struct Scheduler<T> {
    pending: Vec<ScheduledItem<T>>,
    requests: mpsc::Receiver<Request<T>>,
    triggers: mpsc::Sender<Trigger<T>>,
}

impl<T> Scheduler<T> {
    /// Creates a scheduler plus its request and trigger endpoints.
    pub fn new(capacity: usize) -> (Self, mpsc::Sender<Request<T>>, mpsc::Receiver<Trigger<T>>) {
        let (request_tx, request_rx) = mpsc::channel(capacity.max(1));
        let (trigger_tx, trigger_rx) = mpsc::channel(capacity.max(1));
        let scheduler = Self {
            pending: Vec::new(),
            requests: request_rx,
            triggers: trigger_tx,
        };
        (scheduler, request_tx, trigger_rx)
    }

    /// Runs until cancelled or until every request sender is gone.
    pub async fn run(mut self, token: CancellationToken) {
        loop {
            let next = self.earliest();

            tokio::select! {
                _ = token.cancelled() => break,

                _ = due(next.map(|(_, deadline)| deadline)) => {
                    // The forever timer never resolves, so `next` is Some here.
                    let Some((index, deadline)) = next else { break };
                    let item = self.pending.swap_remove(index);
                    let trigger = Trigger { payload: item.payload, fired_at: Instant::now() };
                    trace!(?deadline, pending = self.pending.len(), "trigger fired");

                    tokio::select! {
                        _ = token.cancelled() => break,
                        sent = self.triggers.send(trigger) => {
                            if sent.is_err() {
                                break; // trigger receiver gone, nobody left to serve
                            }
                        }
                    }
                }

                request = self.requests.recv() => {
                    match request {
                        Some(request) => {
                            let item = ScheduledItem {
                                payload: request.payload,
                                due: Instant::now() + request.delay,
                            };
                            self.pending.push(item);
                        }
                        None => break, // request sender gone
                    }
                }
            }
        }
    }

    /// Index and deadline of the earliest pending item.
    fn earliest(&self) -> Option<(usize, Instant)> {
        self.pending
            .iter()
            .enumerate()
            .min_by_key(|(_, item)| item.due)
            .map(|(index, item)| (index, item.due))
    }
}

/// Resolves when `deadline` passes; never resolves when there is none.
async fn due(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => sleep_until(deadline).await,
        None => future::pending().await,
    }
}
