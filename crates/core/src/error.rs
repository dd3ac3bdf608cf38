//! Core error type for APDU operations

use crate::status::StatusWord;
use crate::transport::TransportError;

/// Core error type covering transport, command and response failures
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum Error {
    /// Transport-level failure
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// Parse error when processing a response
    #[error("Parse error: {0}")]
    Parse(&'static str),

    /// Non-success status word returned by the card
    #[error("Status error {status}: {}", status.description())]
    Status {
        /// Status word that caused the error
        status: StatusWord,
    },

    /// Invalid command length
    #[error("Invalid command length: {0}")]
    InvalidCommandLength(usize),

    /// Other error with static message
    #[error("{0}")]
    Other(&'static str),
}

impl Error {
    /// Create a new parse error
    pub const fn parse(message: &'static str) -> Self {
        Self::Parse(message)
    }

    /// Create a new status error
    pub const fn status(sw1: u8, sw2: u8) -> Self {
        Self::Status {
            status: StatusWord::new(sw1, sw2),
        }
    }

    /// Get the status word if this is a status error
    pub const fn status_word(&self) -> Option<StatusWord> {
        match self {
            Self::Status { status } => Some(*status),
            _ => None,
        }
    }
}
