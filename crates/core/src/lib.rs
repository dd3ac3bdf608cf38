//! Core APDU types for MyKad identity-card communication
//!
//! This crate provides the command, response and transport abstractions that
//! the MyKad retrieval stack is built on: a generic ISO/IEC 7816-4
//! [`Command`], the [`Response`]/[`StatusWord`] pair returned by a card, and
//! the [`CardTransport`] trait implemented by concrete transports such as
//! PC/SC.

mod command;
mod error;
mod response;
mod status;
pub mod transport;

pub use command::{ApduCommand, Command, ExpectedLength};
pub use error::Error;
pub use response::Response;
pub use status::StatusWord;
pub use transport::{CardTransport, TransportError};

/// Result type alias using the core [`Error`]
pub type Result<T> = core::result::Result<T, Error>;

/// Commonly used imports
pub mod prelude {
    pub use crate::{
        ApduCommand, CardTransport, Command, Error, Response, Result, StatusWord, TransportError,
    };
    pub use bytes::Bytes;
}
