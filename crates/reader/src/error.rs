//! Error types for the reader crate

use mykad_apdu_core::TransportError;
use thiserror::Error;

use crate::decode::DecodeError;
use crate::retrieval::RetrievalError;

/// Broad classification of a reader error
///
/// Stable across error message changes; callers branch on the kind, not
/// the text.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// No usable reader is attached
    ReaderUnavailable,
    /// The reader or an in-flight session refused concurrent use
    ReaderBusy,
    /// The card left the reader, or no card was present to begin with
    CardRemoved,
    /// An exchange or session exceeded its time bound
    Timeout,
    /// An expected application or data block is absent from the card
    BlockMissing,
    /// The card supplied a different length than its layout declares
    LengthMismatch,
    /// A field violates its declared structure
    Malformed,
    /// The stored check byte does not match the recomputed value
    ChecksumMismatch,
    /// A field contains bytes outside its declared encoding
    EncodingError,
    /// Any other I/O or transport failure
    IoFailure,
}

/// Errors surfaced by the reader service
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum Error {
    /// No usable reader is attached
    #[error("no smart card reader available")]
    ReaderUnavailable,

    /// A read was requested while another session holds the reader
    #[error("reader is busy with another session")]
    ReaderBusy,

    /// A read was requested with no card seated
    #[error("no card present in the reader")]
    CardAbsent,

    /// Transport-level failure
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// Retrieval-protocol failure
    #[error(transparent)]
    Retrieval(#[from] RetrievalError),

    /// Decoding or validation failure
    #[error(transparent)]
    Decode(#[from] DecodeError),
}

impl Error {
    /// Classify this error
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::ReaderUnavailable => ErrorKind::ReaderUnavailable,
            Self::ReaderBusy => ErrorKind::ReaderBusy,
            Self::CardAbsent => ErrorKind::CardRemoved,
            Self::Transport(err) => transport_kind(err),
            Self::Retrieval(err) => match err {
                RetrievalError::BlockMissing { .. } => ErrorKind::BlockMissing,
                RetrievalError::LengthMismatch { .. } => ErrorKind::LengthMismatch,
                RetrievalError::CardRemoved => ErrorKind::CardRemoved,
                RetrievalError::Timeout => ErrorKind::Timeout,
                RetrievalError::Transport(err) => transport_kind(err),
            },
            Self::Decode(err) => match err {
                DecodeError::Malformed { .. } => ErrorKind::Malformed,
                DecodeError::ChecksumMismatch { .. } => ErrorKind::ChecksumMismatch,
                DecodeError::EncodingError { .. } => ErrorKind::EncodingError,
            },
        }
    }
}

const fn transport_kind(err: &TransportError) -> ErrorKind {
    match err {
        TransportError::CardRemoved => ErrorKind::CardRemoved,
        TransportError::Timeout => ErrorKind::Timeout,
        TransportError::ReaderBusy => ErrorKind::ReaderBusy,
        TransportError::Connection => ErrorKind::ReaderUnavailable,
        _ => ErrorKind::IoFailure,
    }
}
