//! MyKad identity-extraction core
//!
//! Reads the public identity record off a Malaysian MyKad through a PC/SC
//! smart card reader. The crate is organized around a small pipeline:
//!
//! - [`CardLayout`] describes a card generation as data (applet AID, field
//!   directory, integrity rule)
//! - the retrieval protocol pulls the raw record off the card, handling
//!   chunking, continuation status words, retries and removal
//! - [`decode_record`] turns raw bytes into a validated [`IdentityRecord`]
//! - [`ReaderService`] ties it together with presence monitoring and
//!   [`ReaderStatus`] reporting
//!
//! # Examples
//!
//! ```no_run
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! use mykad_reader::{ReaderConfig, ReaderService};
//!
//! let mut service = ReaderService::new(ReaderConfig::default())?;
//! service.start()?;
//!
//! let record = service.read_identity()?;
//! println!("{} ({})", record.name, record.ic_number);
//! # Ok(())
//! # }
//! ```

mod config;
mod decode;
mod error;
mod layout;
mod record;
mod retrieval;
mod service;
mod session;
mod status;
mod transport_ext;

pub use config::ReaderConfig;
pub use decode::{DecodeError, decode_record};
pub use error::{Error, ErrorKind};
pub use layout::{CardLayout, FieldId, FieldSpec, Integrity, JPN_AID, TextEncoding};
pub use record::IdentityRecord;
pub use retrieval::{IntegrityData, RawRecord, RetrievalError};
pub use service::ReaderService;
pub use session::{CardSession, SessionState};
pub use status::{ReaderStatus, StatusReporter};

/// Result type for reader operations
pub type Result<T> = std::result::Result<T, Error>;
