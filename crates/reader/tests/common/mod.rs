//! In-memory card transport for session tests

use bytes::Bytes;
use mykad_apdu_core::{CardTransport, TransportError};
use mykad_reader::{CardLayout, FieldId};

/// Simulated smart card backed by a flat file image
///
/// Speaks just enough of the command set for session tests: SELECT by AID
/// and READ BINARY with short-read and out-of-range behavior. Fault hooks
/// inject timeouts and card removal at chosen exchange indices.
#[derive(Debug)]
pub struct MemoryCardTransport {
    aid: Vec<u8>,
    image: Vec<u8>,
    selected: bool,
    connected: bool,
    pub exchanges: usize,
    timeout_exchanges: Vec<usize>,
    remove_after: Option<usize>,
}

impl MemoryCardTransport {
    pub fn new(aid: Vec<u8>, image: Vec<u8>) -> Self {
        Self {
            aid,
            image,
            selected: false,
            connected: true,
            exchanges: 0,
            timeout_exchanges: Vec::new(),
            remove_after: None,
        }
    }

    /// Time out the exchanges with the given zero-based indices
    pub fn with_timeouts(mut self, exchanges: Vec<usize>) -> Self {
        self.timeout_exchanges = exchanges;
        self
    }

    /// Remove the card at the given zero-based exchange index
    pub fn with_removal_at(mut self, exchange: usize) -> Self {
        self.remove_after = Some(exchange);
        self
    }

    /// Overwrite part of the image, for corruption scenarios
    pub fn patch(&mut self, offset: usize, bytes: &[u8]) {
        self.image[offset..offset + bytes.len()].copy_from_slice(bytes);
    }

    /// Truncate the image to the given length
    pub fn truncate(&mut self, length: usize) {
        self.image.truncate(length);
    }
}

impl CardTransport for MemoryCardTransport {
    fn do_transmit_raw(&mut self, command: &[u8]) -> Result<Bytes, TransportError> {
        let index = self.exchanges;
        self.exchanges += 1;

        if !self.connected {
            return Err(TransportError::CardRemoved);
        }
        if self.remove_after.is_some_and(|at| index >= at) {
            self.connected = false;
            return Err(TransportError::CardRemoved);
        }
        if self.timeout_exchanges.contains(&index) {
            return Err(TransportError::Timeout);
        }

        if command.len() < 4 {
            return Err(TransportError::Transmission);
        }
        let ins = command[1];
        match ins {
            // SELECT by AID
            0xA4 => {
                let lc = command[4] as usize;
                if command.len() < 5 + lc {
                    return Err(TransportError::Transmission);
                }
                if command[5..5 + lc] == self.aid[..] {
                    self.selected = true;
                    Ok(Bytes::from_static(&[0x90, 0x00]))
                } else {
                    Ok(Bytes::from_static(&[0x6A, 0x82]))
                }
            }
            // READ BINARY
            0xB0 => {
                if !self.selected {
                    return Ok(Bytes::from_static(&[0x69, 0x86]));
                }
                let offset = u16::from_be_bytes([command[2], command[3]]) as usize;
                let le = match command[4] {
                    0 => 256,
                    le => le as usize,
                };
                if offset >= self.image.len() {
                    return Ok(Bytes::from_static(&[0x6B, 0x00]));
                }
                let end = self.image.len().min(offset + le);
                let mut reply = self.image[offset..end].to_vec();
                reply.extend_from_slice(&[0x90, 0x00]);
                Ok(Bytes::from(reply))
            }
            _ => Ok(Bytes::from_static(&[0x6D, 0x00])),
        }
    }

    fn is_connected(&self) -> bool {
        self.connected
    }

    fn reset(&mut self) -> Result<(), TransportError> {
        self.selected = false;
        Ok(())
    }
}

/// Build a JPN 1.0 file image with the given field values
pub fn jpn_image(values: &[(FieldId, &str)]) -> Vec<u8> {
    let layout = CardLayout::jpn_1_0();
    let mut image = vec![0u8; 700];
    for (id, text) in values {
        let spec = layout.field(*id).expect("field in layout");
        let offset = spec.offset as usize;
        let bytes = text.as_bytes();
        assert!(bytes.len() <= spec.length as usize, "value too long");
        image[offset..offset + bytes.len()].copy_from_slice(bytes);
    }
    image
}

/// Field values used by the happy-path tests
pub fn sample_values() -> Vec<(FieldId, &'static str)> {
    vec![
        (FieldId::Name, "ALI BIN ABU"),
        (FieldId::IcNumber, "900101011234"),
        (FieldId::Sex, "L"),
        (FieldId::DateOfBirth, "1990-01-01"),
        (FieldId::StateOfBirth, "JOHOR"),
        (FieldId::Address1, "NO 1 JALAN SATU"),
        (FieldId::Address2, "TAMAN DUA"),
        (FieldId::Address3, ""),
        (FieldId::Postcode, "81300"),
        (FieldId::City, "SKUDAI"),
        (FieldId::Religion, "ISLAM"),
    ]
}
