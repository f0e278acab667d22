//! Bounded progress relay between a blocking provider and the async
//! orchestrator.
//!
//! The publisher side is called from inside the provider's blocking
//! worker and never waits: an event is dropped when the queue is full or
//! when its step does not advance past the last delivered step. The
//! consumer side polls with a timeout so the orchestrator can interleave
//! progress with other wake-ups.

use std::time::Duration;

use tokio::sync::mpsc::{self, error::TrySendError};
use upscaler_core::progress::ProgressEvent;

/// Default queue capacity of a relay.
pub const DEFAULT_RELAY_CAPACITY: usize = 8;

/// Largest accepted queue capacity.
pub const MAX_RELAY_CAPACITY: usize = 64;

/// Create a relay for one provider attempt.
///
/// `capacity` is clamped to `1..=MAX_RELAY_CAPACITY`.
pub fn progress_relay(capacity: usize) -> (RelayPublisher, RelayReceiver) {
    let (tx, rx) = mpsc::channel(capacity.clamp(1, MAX_RELAY_CAPACITY));
    (
        RelayPublisher {
            tx,
            last_step: None,
            dropped: 0,
        },
        RelayReceiver { rx },
    )
}

/// Producer half. Owned by the job executor for the duration of one attempt.
#[derive(Debug)]
pub struct RelayPublisher {
    tx: mpsc::Sender<ProgressEvent>,
    last_step: Option<u32>,
    dropped: u64,
}

impl RelayPublisher {
    /// Offer `event` to the consumer without blocking.
    ///
    /// Returns `true` if the event was queued.
    pub fn publish(&mut self, event: ProgressEvent) -> bool {
        if self.last_step.is_some_and(|last| event.step <= last) {
            self.dropped += 1;
            return false;
        }
        let step = event.step;
        match self.tx.try_send(event) {
            Ok(()) => {
                self.last_step = Some(step);
                true
            }
            Err(TrySendError::Full(_)) | Err(TrySendError::Closed(_)) => {
                self.dropped += 1;
                false
            }
        }
    }

    /// Number of events discarded so far.
    pub fn dropped(&self) -> u64 {
        self.dropped
    }
}

/// What a single [`RelayReceiver::poll`] produced.
#[derive(Debug, Clone, PartialEq)]
pub enum RelayPoll {
    Event(ProgressEvent),
    /// Nothing arrived within the timeout.
    Timeout,
    /// The publisher is gone and the queue is empty.
    Closed,
}

/// Consumer half, owned by the orchestrator.
#[derive(Debug)]
pub struct RelayReceiver {
    rx: mpsc::Receiver<ProgressEvent>,
}

impl RelayReceiver {
    /// Wait up to `timeout` for the next event.
    pub async fn poll(&mut self, timeout: Duration) -> RelayPoll {
        match tokio::time::timeout(timeout, self.rx.recv()).await {
            Ok(Some(event)) => RelayPoll::Event(event),
            Ok(None) => RelayPoll::Closed,
            Err(_elapsed) => RelayPoll::Timeout,
        }
    }

    /// Take every event already queued, without waiting.
    pub fn drain(&mut self) -> Vec<ProgressEvent> {
        let mut events = Vec::new();
        while let Ok(event) = self.rx.try_recv() {
            events.push(event);
        }
        events
    }
}
