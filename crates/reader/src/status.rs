//! Reader status reporting
//!
//! A [`StatusReporter`] is the single writer of [`ReaderStatus`] values;
//! consumers subscribe and receive every published value over an unbounded
//! channel, primed with the current value so a late subscriber starts from
//! a consistent snapshot.

use std::sync::Mutex;

use crossbeam_channel::{Receiver, Sender, unbounded};
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Externally observable state of one reader connection
///
/// Re-created on every status change, never mutated in place. `has_card`
/// implies `connected`; construct values through the provided constructors
/// to keep that invariant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReaderStatus {
    /// True iff an open session with a physical reader exists
    pub connected: bool,
    /// Human-readable reader identifier; empty when not connected
    pub reader: String,
    /// Latest human-readable status or error description
    pub message: String,
    /// True iff a card is currently seated and responsive
    pub has_card: bool,
}

impl ReaderStatus {
    /// Status for a missing or unusable reader
    pub fn disconnected(message: impl Into<String>) -> Self {
        Self {
            connected: false,
            reader: String::new(),
            message: message.into(),
            has_card: false,
        }
    }

    /// Status for a connected reader without a card
    pub fn idle(reader: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            connected: true,
            reader: reader.into(),
            message: message.into(),
            has_card: false,
        }
    }

    /// Status for a connected reader with a seated card
    pub fn card_present(reader: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            connected: true,
            reader: reader.into(),
            message: message.into(),
            has_card: true,
        }
    }
}

impl Default for ReaderStatus {
    fn default() -> Self {
        Self::disconnected("Reader not connected")
    }
}

#[derive(Debug)]
struct Inner {
    current: ReaderStatus,
    subscribers: Vec<Sender<ReaderStatus>>,
}

/// Single-writer publisher of [`ReaderStatus`] values
#[derive(Debug)]
pub struct StatusReporter {
    inner: Mutex<Inner>,
}

impl StatusReporter {
    /// Create a reporter with the given initial status
    pub fn new(initial: ReaderStatus) -> Self {
        Self {
            inner: Mutex::new(Inner {
                current: initial,
                subscribers: Vec::new(),
            }),
        }
    }

    /// Get the most recently published status
    pub fn current(&self) -> ReaderStatus {
        self.inner.lock().unwrap().current.clone()
    }

    /// Subscribe to status updates
    ///
    /// The returned receiver is primed with the current status and then
    /// receives every subsequently published value. Dropped receivers are
    /// pruned on the next publish.
    pub fn subscribe(&self) -> Receiver<ReaderStatus> {
        let (sender, receiver) = unbounded();
        let mut inner = self.inner.lock().unwrap();
        let _ = sender.send(inner.current.clone());
        inner.subscribers.push(sender);
        receiver
    }

    /// Publish a new status to every live subscriber
    pub fn publish(&self, status: ReaderStatus) {
        debug_assert!(!status.has_card || status.connected);
        debug!(
            connected = status.connected,
            has_card = status.has_card,
            message = %status.message,
            "Publishing reader status"
        );

        let mut inner = self.inner.lock().unwrap();
        inner.current = status.clone();
        inner
            .subscribers
            .retain(|sender| sender.send(status.clone()).is_ok());
    }
}

impl Default for StatusReporter {
    fn default() -> Self {
        Self::new(ReaderStatus::default())
    }
}
