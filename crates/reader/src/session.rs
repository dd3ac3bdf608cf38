//! Card session state machine
//!
//! A session walks a fixed lifecycle: a reader appears (`Idle`), a card is
//! seated (`CardPresent`), the identity applet is selected
//! (`SessionActive`) and the session ends in `Completed` or `Failed`. Both
//! terminal states settle straight back to `CardPresent` or `Idle`
//! depending on whether the card is still seated, so the machine is never
//! left stuck in a terminal or active state.

use std::sync::Mutex;

use mykad_apdu_core::CardTransport;
use tracing::{error, info};

use crate::config::ReaderConfig;
use crate::decode::decode_record;
use crate::error::{Error, ErrorKind};
use crate::record::IdentityRecord;
use crate::retrieval::Retriever;
use crate::status::{ReaderStatus, StatusReporter};

/// Lifecycle state of one reader connection
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// No usable reader is attached
    Disconnected,
    /// Reader attached, no card seated
    Idle,
    /// Card seated, no session running
    CardPresent,
    /// Identity applet selected, retrieval in progress
    SessionActive,
    /// Session finished with a decoded record
    Completed,
    /// Session aborted with an error
    Failed,
}

impl SessionState {
    /// Reader became available
    pub const fn on_connected(self) -> Self {
        match self {
            Self::Disconnected => Self::Idle,
            other => other,
        }
    }

    /// Reader went away
    pub const fn on_disconnected(self) -> Self {
        Self::Disconnected
    }

    /// A card was seated
    pub const fn on_card_inserted(self) -> Self {
        match self {
            Self::Idle => Self::CardPresent,
            other => other,
        }
    }

    /// The card left the reader
    pub const fn on_card_removed(self) -> Self {
        match self {
            Self::Disconnected => Self::Disconnected,
            _ => Self::Idle,
        }
    }

    /// Resolve a terminal state against current card presence
    pub const fn settle(self, has_card: bool) -> Self {
        match self {
            Self::Completed | Self::Failed => {
                if has_card {
                    Self::CardPresent
                } else {
                    Self::Idle
                }
            }
            other => other,
        }
    }

    /// Whether this state ends a session
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }
}

/// One full card session over an open transport
///
/// Runs selection, retrieval and decoding, driving the shared
/// [`SessionState`] and publishing progress through the reporter. The
/// session settles the state machine on every exit path.
#[derive(Debug)]
pub struct CardSession<'a, T: CardTransport> {
    transport: &'a mut T,
    config: &'a ReaderConfig,
    reporter: &'a StatusReporter,
    reader_name: &'a str,
}

impl<'a, T: CardTransport> CardSession<'a, T> {
    /// Create a session over an already-connected transport
    pub fn new(
        transport: &'a mut T,
        config: &'a ReaderConfig,
        reporter: &'a StatusReporter,
        reader_name: &'a str,
    ) -> Self {
        Self {
            transport,
            config,
            reporter,
            reader_name,
        }
    }

    /// Run the session to a terminal state and settle
    ///
    /// Requires the machine to be in `CardPresent`; any other state maps
    /// to the matching precondition error without touching the card.
    pub fn run(mut self, state: &Mutex<SessionState>) -> Result<IdentityRecord, Error> {
        match *state.lock().unwrap() {
            SessionState::CardPresent => {}
            SessionState::Disconnected => return Err(Error::ReaderUnavailable),
            SessionState::SessionActive => return Err(Error::ReaderBusy),
            SessionState::Idle | SessionState::Completed | SessionState::Failed => {
                return Err(Error::CardAbsent);
            }
        }

        info!(reader = self.reader_name, "Starting card session");
        let result = self.execute(state);

        match result {
            Ok(record) => {
                let has_card = self.transport.is_connected();
                *state.lock().unwrap() = SessionState::Completed.settle(has_card);
                info!(reader = self.reader_name, "Card session completed");
                self.reporter.publish(if has_card {
                    ReaderStatus::card_present(self.reader_name, "MyKad read successfully")
                } else {
                    ReaderStatus::idle(self.reader_name, "MyKad read successfully, card removed")
                });
                Ok(record)
            }
            Err(err) => {
                let has_card =
                    self.transport.is_connected() && err.kind() != ErrorKind::CardRemoved;
                *state.lock().unwrap() = SessionState::Failed.settle(has_card);
                error!(reader = self.reader_name, error = %err, "Card session failed");
                let message = format!("Read failed: {err}");
                self.reporter.publish(if has_card {
                    ReaderStatus::card_present(self.reader_name, message)
                } else {
                    ReaderStatus::idle(self.reader_name, message)
                });
                Err(err)
            }
        }
    }

    fn execute(&mut self, state: &Mutex<SessionState>) -> Result<IdentityRecord, Error> {
        let mut retriever = Retriever::new(&mut *self.transport, self.config);
        retriever.select_applet()?;

        *state.lock().unwrap() = SessionState::SessionActive;
        self.reporter.publish(ReaderStatus::card_present(
            self.reader_name,
            "Reading MyKad identity data",
        ));

        let raw = retriever.read_fields()?;
        let record = decode_record(&raw, &self.config.layout)?;
        Ok(record)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lifecycle_transitions() {
        let state = SessionState::Disconnected.on_connected();
        assert_eq!(state, SessionState::Idle);

        let state = state.on_card_inserted();
        assert_eq!(state, SessionState::CardPresent);

        assert_eq!(state.on_card_removed(), SessionState::Idle);
        assert_eq!(
            SessionState::Disconnected.on_card_removed(),
            SessionState::Disconnected
        );
    }

    #[test]
    fn test_terminal_states_settle() {
        assert_eq!(
            SessionState::Completed.settle(true),
            SessionState::CardPresent
        );
        assert_eq!(SessionState::Completed.settle(false), SessionState::Idle);
        assert_eq!(SessionState::Failed.settle(false), SessionState::Idle);
        assert_eq!(SessionState::CardPresent.settle(true), SessionState::CardPresent);
    }

    #[test]
    fn test_non_terminal_states_unchanged_by_settle() {
        for state in [
            SessionState::Disconnected,
            SessionState::Idle,
            SessionState::SessionActive,
        ] {
            assert_eq!(state.settle(true), state);
            assert!(!state.is_terminal());
        }
        assert!(SessionState::Failed.is_terminal());
    }
}
