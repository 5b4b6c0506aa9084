//! EventEnvelope: versioned wrapper around every notification.

use serde::Serialize;
use tokio::sync::mpsc;

use crate::event::Notification;

/// Schema version of the envelope and its payloads.
pub const ENVELOPE_VERSION: u32 = 1;

/// Fields:
/// - `version`: schema version (always 1 for now).
/// - `seq`: monotonically increasing per client, starting at 1.
/// - `timestamp_ms`: UTC milliseconds when the envelope was created.
/// - `event`: the notification.
#[derive(Debug, Clone, Serialize)]
pub struct EventEnvelope {
    pub version: u32,
    pub seq: u64,
    pub timestamp_ms: i64,
    pub event: Notification,
}

impl EventEnvelope {
    pub fn new(seq: u64, event: Notification) -> Self {
        Self {
            version: ENVELOPE_VERSION,
            seq,
            timestamp_ms: chrono::Utc::now().timestamp_millis(),
            event,
        }
    }
}

/// Numbers notifications and sends them to the shell. A dropped receiver is
/// not an error; notifications are then discarded.
#[derive(Debug)]
pub struct Notifier {
    seq: u64,
    tx: mpsc::UnboundedSender<EventEnvelope>,
}

impl Notifier {
    pub fn new(tx: mpsc::UnboundedSender<EventEnvelope>) -> Self {
        Self { seq: 0, tx }
    }

    pub fn channel() -> (Self, mpsc::UnboundedReceiver<EventEnvelope>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self::new(tx), rx)
    }

    pub fn notify(&mut self, event: Notification) {
        self.seq += 1;
        if self.tx.send(EventEnvelope::new(self.seq, event)).is_err() {
            tracing::trace!(seq = self.seq, "Notification receiver gone");
        }
    }
}
