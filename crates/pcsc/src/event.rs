//! Presence events and channels for PC/SC monitoring

use crossbeam_channel::{Receiver, Sender, bounded, unbounded};

/// Events related to card insertion/removal
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CardEvent {
    /// Card was inserted into a reader
    Inserted {
        /// Reader name
        reader: String,
        /// ATR of the inserted card
        atr: Vec<u8>,
    },
    /// Card was removed from a reader
    Removed {
        /// Reader name
        reader: String,
    },
}

/// Sender for card events
pub type CardEventSender = Sender<CardEvent>;
/// Receiver for card events
pub type CardEventReceiver = Receiver<CardEvent>;

/// Create an unbounded channel for card events
pub fn card_event_channel() -> (CardEventSender, CardEventReceiver) {
    unbounded()
}

/// Create a bounded channel with the specified capacity for card events
pub fn bounded_card_event_channel(capacity: usize) -> (CardEventSender, CardEventReceiver) {
    bounded(capacity)
}
