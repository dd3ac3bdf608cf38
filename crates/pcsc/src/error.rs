//! Error types for the PC/SC transport

use std::fmt;

use mykad_apdu_core::TransportError;

/// PC/SC-specific errors
#[derive(Debug, thiserror::Error)]
pub enum PcscError {
    /// PC/SC error
    Pcsc(#[from] pcsc::Error),

    /// No readers available
    NoReadersAvailable,

    /// Reader not found
    ReaderNotFound(String),

    /// Reader is claimed exclusively by another session
    ReaderBusy(String),

    /// No card present in reader
    NoCard(String),

    /// Card was removed
    CardRemoved,

    /// Other error
    Other(String),
}

impl fmt::Display for PcscError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Pcsc(e) => write!(f, "PC/SC error: {e}"),
            Self::NoReadersAvailable => write!(f, "No smart card readers found"),
            Self::ReaderNotFound(r) => write!(f, "Reader not found: {r}"),
            Self::ReaderBusy(r) => write!(f, "Reader in use by another session: {r}"),
            Self::NoCard(r) => write!(f, "No card present in reader: {r}"),
            Self::CardRemoved => write!(f, "Card was removed"),
            Self::Other(msg) => write!(f, "{msg}"),
        }
    }
}

impl From<PcscError> for TransportError {
    fn from(error: PcscError) -> Self {
        match error {
            PcscError::Pcsc(e) => match e {
                pcsc::Error::RemovedCard | pcsc::Error::ResetCard => Self::CardRemoved,
                pcsc::Error::Timeout => Self::Timeout,
                pcsc::Error::SharingViolation => Self::ReaderBusy,
                pcsc::Error::Cancelled => Self::Cancelled,
                pcsc::Error::NoService
                | pcsc::Error::NoReadersAvailable
                | pcsc::Error::ReaderUnavailable
                | pcsc::Error::UnknownReader => Self::Connection,
                other => Self::Other(other.to_string()),
            },
            PcscError::NoReadersAvailable | PcscError::ReaderNotFound(_) => Self::Connection,
            PcscError::ReaderBusy(_) => Self::ReaderBusy,
            PcscError::NoCard(_) | PcscError::CardRemoved => Self::CardRemoved,
            PcscError::Other(msg) => Self::Other(msg),
        }
    }
}
