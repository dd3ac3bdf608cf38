//! PC/SC transport implementation for MyKad readers
//!
//! This crate implements the `CardTransport` trait from `mykad-apdu-core`
//! on top of the PC/SC API, and provides the device manager and
//! card-presence monitor the reader service is driven by.
//!
//! # Examples
//!
//! ```no_run
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! use mykad_transport_pcsc::PcscDeviceManager;
//!
//! let manager = PcscDeviceManager::new()?;
//! let readers = manager.list_readers()?;
//! for reader in &readers {
//!     println!("{} (card: {})", reader.name(), reader.has_card());
//! }
//! # Ok(())
//! # }
//! ```

mod config;
mod error;
pub mod event;
mod manager;
mod monitor;
mod reader;
mod transport;

pub use config::{ConnectStrategy, PcscConfig, ShareMode};
pub use error::PcscError;
pub use event::CardEvent;
pub use manager::PcscDeviceManager;
pub use monitor::PcscMonitor;
pub use reader::PcscReader;
pub use transport::PcscTransport;

// Re-export some pcsc types for convenience
pub use pcsc::{Protocol, Protocols};
