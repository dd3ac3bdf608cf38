//! Record retrieval protocol
//!
//! Drives the command/response dialogue that pulls the raw identity record
//! off a seated card: select the identity applet, then read every directory
//! entry of the active [`CardLayout`](crate::CardLayout) by declared length.
//! Reads are chunked, short replies are continued (`61 XX` and `6C XX`
//! status words), timeouts are retried a bounded number of times per block,
//! and card removal aborts the whole session immediately.

use std::time::{Duration, Instant};

use bytes::{Bytes, BytesMut};
use mykad_apdu_core::{CardTransport, Command, Response, TransportError};
use thiserror::Error;
use tracing::{debug, warn};

use crate::config::ReaderConfig;
use crate::layout::{CardLayout, FieldId, FieldSpec, Integrity};
use crate::transport_ext::exchange;

const CLA_ISO7816: u8 = 0x00;
const INS_SELECT: u8 = 0xA4;
const INS_READ_BINARY: u8 = 0xB0;
const INS_GET_RESPONSE: u8 = 0xC0;

/// Errors raised while retrieving the raw record from the card
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum RetrievalError {
    /// The card does not expose an expected application or data block
    #[error("card block not found: {block}")]
    BlockMissing {
        /// Name of the missing application or block
        block: String,
    },

    /// The card returned fewer or more bytes than the layout declares
    #[error("{block}: expected {expected} bytes, card supplied {actual}")]
    LengthMismatch {
        /// Name of the affected field or block
        block: String,
        /// Declared length from the layout
        expected: usize,
        /// Bytes the card actually supplied
        actual: usize,
    },

    /// The card left the reader mid-session
    #[error("card removed during retrieval")]
    CardRemoved,

    /// An exchange or the whole session exceeded its time bound
    #[error("retrieval timed out")]
    Timeout,

    /// Any other transport failure
    #[error(transparent)]
    Transport(#[from] TransportError),
}

/// Raw integrity material read alongside the record
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IntegrityData {
    /// Bytes of the protected range
    pub data: Bytes,
    /// Check byte stored on the card
    pub check: u8,
}

/// The undecoded record as pulled from the card
///
/// Field payloads are exactly the declared length from the layout, in the
/// layout's read order. Decoding and validation happen later; retrieval
/// only guarantees completeness.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawRecord {
    /// One entry per layout field, in read order
    pub fields: Vec<(FieldId, Bytes)>,
    /// Integrity material, when the layout declares a rule
    pub integrity: Option<IntegrityData>,
}

/// One retrieval pass over a seated card
///
/// Borrows the transport for the duration of the pass and tracks the
/// session deadline so no block read can run past the configured
/// session timeout.
#[derive(Debug)]
pub(crate) struct Retriever<'a, T: CardTransport> {
    transport: &'a mut T,
    layout: &'a CardLayout,
    exchange_timeout: Duration,
    block_retries: u32,
    deadline: Instant,
}

impl<'a, T: CardTransport> Retriever<'a, T> {
    pub(crate) fn new(transport: &'a mut T, config: &'a ReaderConfig) -> Self {
        Self {
            transport,
            layout: &config.layout,
            exchange_timeout: config.exchange_timeout,
            block_retries: config.block_retries,
            deadline: Instant::now() + config.session_timeout,
        }
    }

    /// Select the identity applet named by the layout
    pub(crate) fn select_applet(&mut self) -> Result<(), RetrievalError> {
        debug!(aid = %hex::encode(self.layout.aid()), "Selecting identity applet");
        let select = Command::new_with_data(
            CLA_ISO7816,
            INS_SELECT,
            0x04,
            0x00,
            Bytes::copy_from_slice(self.layout.aid()),
        );
        let response = self.exchange_with_retry(&select)?;
        let status = response.status();

        if status.is_success() {
            return Ok(());
        }

        // 61 XX after SELECT carries file control information we do not
        // need, but the card expects it to be drained.
        if let Some(remaining) = status.remaining_bytes() {
            let get = Command::new_with_le(CLA_ISO7816, INS_GET_RESPONSE, 0x00, 0x00, remaining);
            let response = self.exchange_with_retry(&get)?;
            let drained = response.status();
            if drained.is_success() {
                return Ok(());
            }
            return Err(RetrievalError::Transport(TransportError::Other(format!(
                "applet selection failed: {drained} ({})",
                drained.description()
            ))));
        }

        if status.is_file_not_found() {
            return Err(RetrievalError::BlockMissing {
                block: "identity application".into(),
            });
        }

        Err(RetrievalError::Transport(TransportError::Other(format!(
            "applet selection failed: {status} ({})",
            status.description()
        ))))
    }

    /// Read every directory entry of the layout, then the integrity
    /// material if one is declared
    pub(crate) fn read_fields(&mut self) -> Result<RawRecord, RetrievalError> {
        let mut fields = Vec::with_capacity(self.layout.fields().len());
        for spec in self.layout.fields() {
            let bytes = self.read_field(spec)?;
            fields.push((spec.id, bytes));
        }

        let integrity = match self.layout.integrity() {
            Some(Integrity::XorSum {
                data_offset,
                data_length,
                check_offset,
            }) => {
                let data = self.read_range("integrity data", data_offset, data_length as usize)?;
                let check = self.read_range("integrity check", check_offset, 1)?;
                Some(IntegrityData {
                    data,
                    check: check[0],
                })
            }
            None => None,
        };

        Ok(RawRecord { fields, integrity })
    }

    fn read_field(&mut self, spec: &FieldSpec) -> Result<Bytes, RetrievalError> {
        debug!(
            field = %spec.id,
            offset = spec.offset,
            length = spec.length,
            "Reading field"
        );
        self.read_range(&spec.id.to_string(), spec.offset, spec.length as usize)
    }

    /// Assemble exactly `expected` bytes starting at `offset`
    ///
    /// Issues chunked READ BINARY commands, honoring `6C XX` corrections
    /// and draining `61 XX` continuations. A read that cannot supply the
    /// declared length is a [`RetrievalError::LengthMismatch`].
    fn read_range(
        &mut self,
        block: &str,
        offset: u16,
        expected: usize,
    ) -> Result<Bytes, RetrievalError> {
        let mut assembled = BytesMut::with_capacity(expected);

        while assembled.len() < expected {
            let position = offset + assembled.len() as u16;
            let remaining = expected - assembled.len();
            let le = remaining.min(self.layout.max_chunk() as usize) as u8;
            let read = read_binary(position, le);
            let response = self.exchange_with_retry(&read)?;
            let status = response.status();

            if let Some(correct) = status.correct_le() {
                // 6C XX: reissue with the length the card will serve
                if correct == 0 {
                    return Err(length_mismatch(block, expected, assembled.len()));
                }
                let read = read_binary(position, correct);
                let response = self.exchange_with_retry(&read)?;
                if !response.status().is_success() {
                    return Err(self.status_failure(block, &response, expected, assembled.len()));
                }
                extend(&mut assembled, &response);
                continue;
            }

            if let Some(more) = status.remaining_bytes() {
                // 61 XX: partial data now, rest via GET RESPONSE
                extend(&mut assembled, &response);
                let get = Command::new_with_le(CLA_ISO7816, INS_GET_RESPONSE, 0x00, 0x00, more);
                let response = self.exchange_with_retry(&get)?;
                if !response.status().is_success() {
                    return Err(self.status_failure(block, &response, expected, assembled.len()));
                }
                extend(&mut assembled, &response);
                continue;
            }

            if !status.is_success() {
                return Err(self.status_failure(block, &response, expected, assembled.len()));
            }

            let Some(payload) = response.payload() else {
                // success with no data means the file ended early
                return Err(length_mismatch(block, expected, assembled.len()));
            };
            if payload.is_empty() {
                return Err(length_mismatch(block, expected, assembled.len()));
            }
            assembled.extend_from_slice(payload);
        }

        if assembled.len() != expected {
            return Err(length_mismatch(block, expected, assembled.len()));
        }

        Ok(assembled.freeze())
    }

    /// One exchange with bounded retries
    ///
    /// Only timeouts are retried; card removal aborts immediately and
    /// other transport failures propagate on the first occurrence. The
    /// session deadline is re-checked before every attempt.
    fn exchange_with_retry(&mut self, command: &Command) -> Result<Response, RetrievalError> {
        let mut attempts = 0;
        loop {
            if Instant::now() >= self.deadline {
                warn!("Session deadline exceeded");
                return Err(RetrievalError::Timeout);
            }

            match exchange(self.transport, command, self.exchange_timeout) {
                Ok(response) => return Ok(response),
                Err(TransportError::Timeout) if attempts < self.block_retries => {
                    attempts += 1;
                    warn!(attempt = attempts, "Exchange timed out, retrying");
                }
                Err(TransportError::Timeout) => return Err(RetrievalError::Timeout),
                Err(TransportError::CardRemoved) => return Err(RetrievalError::CardRemoved),
                Err(err) => return Err(RetrievalError::Transport(err)),
            }
        }
    }

    fn status_failure(
        &self,
        block: &str,
        response: &Response,
        expected: usize,
        actual: usize,
    ) -> RetrievalError {
        let status = response.status();
        if status.is_file_not_found() {
            return RetrievalError::BlockMissing {
                block: block.to_string(),
            };
        }
        // End-of-file warnings and offset-out-of-range rejections both mean
        // the card holds less data than the layout declares.
        if status.is_incorrect_p1p2() || (status.sw1 == 0x62 && status.sw2 == 0x82) {
            return length_mismatch(block, expected, actual);
        }
        RetrievalError::Transport(TransportError::Other(format!(
            "{block}: read failed: {status} ({})",
            status.description()
        )))
    }
}

fn read_binary(offset: u16, le: u8) -> Command {
    let [hi, lo] = offset.to_be_bytes();
    Command::new_with_le(CLA_ISO7816, INS_READ_BINARY, hi, lo, le)
}

fn extend(assembled: &mut BytesMut, response: &Response) {
    if let Some(payload) = response.payload() {
        assembled.extend_from_slice(payload);
    }
}

fn length_mismatch(block: &str, expected: usize, actual: usize) -> RetrievalError {
    RetrievalError::LengthMismatch {
        block: block.to_string(),
        expected,
        actual,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::layout::TextEncoding;
    use std::collections::VecDeque;

    #[derive(Debug)]
    struct ScriptedTransport {
        replies: VecDeque<Result<Vec<u8>, TransportError>>,
        sent: Vec<Vec<u8>>,
    }

    impl ScriptedTransport {
        fn new(replies: Vec<Result<Vec<u8>, TransportError>>) -> Self {
            Self {
                replies: replies.into(),
                sent: Vec::new(),
            }
        }
    }

    impl CardTransport for ScriptedTransport {
        fn do_transmit_raw(&mut self, command: &[u8]) -> Result<Bytes, TransportError> {
            self.sent.push(command.to_vec());
            match self.replies.pop_front() {
                Some(Ok(reply)) => Ok(Bytes::from(reply)),
                Some(Err(err)) => Err(err),
                None => panic!("transport script exhausted"),
            }
        }

        fn is_connected(&self) -> bool {
            true
        }

        fn reset(&mut self) -> Result<(), TransportError> {
            Ok(())
        }
    }

    fn tiny_config(layout: CardLayout) -> ReaderConfig {
        ReaderConfig::default()
            .with_layout(layout)
            .with_block_retries(1)
    }

    fn single_field_layout(length: u8) -> CardLayout {
        CardLayout::new(
            vec![0xA0, 0x00],
            vec![FieldSpec::new(FieldId::Name, 0x0010, length, TextEncoding::Ascii)],
            None,
        )
    }

    fn ok_reply(payload: &[u8]) -> Result<Vec<u8>, TransportError> {
        let mut reply = payload.to_vec();
        reply.extend_from_slice(&[0x90, 0x00]);
        Ok(reply)
    }

    #[test]
    fn test_select_sends_aid_and_succeeds() {
        let config = tiny_config(single_field_layout(4));
        let mut transport = ScriptedTransport::new(vec![Ok(vec![0x90, 0x00])]);
        let mut retriever = Retriever::new(&mut transport, &config);
        retriever.select_applet().unwrap();

        let sent = &retriever.transport.sent[0];
        assert_eq!(&sent[..4], &[0x00, 0xA4, 0x04, 0x00]);
        assert_eq!(sent[4], 0x02);
        assert_eq!(&sent[5..], &[0xA0, 0x00]);
    }

    #[test]
    fn test_select_fci_drain_failure_reports_drain_status() {
        let config = tiny_config(single_field_layout(4));
        let mut transport = ScriptedTransport::new(vec![
            Ok(vec![0x61, 0x10]),
            Ok(vec![0x6F, 0x00]),
        ]);
        let mut retriever = Retriever::new(&mut transport, &config);
        let err = retriever.select_applet().unwrap_err();
        match err {
            RetrievalError::Transport(TransportError::Other(message)) => {
                assert!(message.contains("6F 00"), "got: {message}");
                assert!(!message.contains("61 10"), "got: {message}");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_select_missing_applet() {
        let config = tiny_config(single_field_layout(4));
        let mut transport = ScriptedTransport::new(vec![Ok(vec![0x6A, 0x82])]);
        let mut retriever = Retriever::new(&mut transport, &config);
        let err = retriever.select_applet().unwrap_err();
        assert!(matches!(err, RetrievalError::BlockMissing { .. }));
    }

    #[test]
    fn test_read_assembles_chunks() {
        let layout = single_field_layout(6).with_max_chunk(4);
        let config = tiny_config(layout);
        let mut transport = ScriptedTransport::new(vec![
            ok_reply(b"ABCD"),
            ok_reply(b"EF"),
        ]);
        let mut retriever = Retriever::new(&mut transport, &config);
        let record = retriever.read_fields().unwrap();
        assert_eq!(record.fields.len(), 1);
        assert_eq!(record.fields[0].1.as_ref(), b"ABCDEF");

        // second read resumes at offset 0x0014
        let second = &retriever.transport.sent[1];
        assert_eq!(&second[..5], &[0x00, 0xB0, 0x00, 0x14, 0x02]);
    }

    #[test]
    fn test_wrong_le_reissued_with_card_length() {
        let config = tiny_config(single_field_layout(4));
        let mut transport = ScriptedTransport::new(vec![
            Ok(vec![0x6C, 0x02]),
            ok_reply(b"AB"),
            ok_reply(b"CD"),
        ]);
        let mut retriever = Retriever::new(&mut transport, &config);
        let record = retriever.read_fields().unwrap();
        assert_eq!(record.fields[0].1.as_ref(), b"ABCD");

        // reissue uses the card's Le at the same offset
        let reissue = &retriever.transport.sent[1];
        assert_eq!(&reissue[..5], &[0x00, 0xB0, 0x00, 0x10, 0x02]);
    }

    #[test]
    fn test_more_data_drained_via_get_response() {
        let config = tiny_config(single_field_layout(4));
        let mut transport = ScriptedTransport::new(vec![
            {
                let mut reply = b"AB".to_vec();
                reply.extend_from_slice(&[0x61, 0x02]);
                Ok(reply)
            },
            ok_reply(b"CD"),
        ]);
        let mut retriever = Retriever::new(&mut transport, &config);
        let record = retriever.read_fields().unwrap();
        assert_eq!(record.fields[0].1.as_ref(), b"ABCD");

        let get = &retriever.transport.sent[1];
        assert_eq!(&get[..4], &[0x00, 0xC0, 0x00, 0x00]);
    }

    #[test]
    fn test_truncated_file_is_length_mismatch() {
        let config = tiny_config(single_field_layout(4));
        let mut transport = ScriptedTransport::new(vec![
            ok_reply(b"AB"),
            Ok(vec![0x6B, 0x00]),
        ]);
        let mut retriever = Retriever::new(&mut transport, &config);
        let err = retriever.read_fields().unwrap_err();
        assert_eq!(
            err,
            RetrievalError::LengthMismatch {
                block: "name".into(),
                expected: 4,
                actual: 2,
            }
        );
    }

    #[test]
    fn test_timeout_retried_within_bound() {
        let config = tiny_config(single_field_layout(2));
        let mut transport = ScriptedTransport::new(vec![
            Err(TransportError::Timeout),
            ok_reply(b"AB"),
        ]);
        let mut retriever = Retriever::new(&mut transport, &config);
        let record = retriever.read_fields().unwrap();
        assert_eq!(record.fields[0].1.as_ref(), b"AB");
    }

    #[test]
    fn test_timeout_exhausts_retries() {
        let config = tiny_config(single_field_layout(2));
        let mut transport = ScriptedTransport::new(vec![
            Err(TransportError::Timeout),
            Err(TransportError::Timeout),
        ]);
        let mut retriever = Retriever::new(&mut transport, &config);
        let err = retriever.read_fields().unwrap_err();
        assert_eq!(err, RetrievalError::Timeout);
        assert_eq!(retriever.transport.sent.len(), 2);
    }

    #[test]
    fn test_card_removed_aborts_without_retry() {
        let config = tiny_config(single_field_layout(2));
        let mut transport = ScriptedTransport::new(vec![Err(TransportError::CardRemoved)]);
        let mut retriever = Retriever::new(&mut transport, &config);
        let err = retriever.read_fields().unwrap_err();
        assert_eq!(err, RetrievalError::CardRemoved);
        assert_eq!(retriever.transport.sent.len(), 1);
    }

    #[test]
    fn test_integrity_material_read_after_fields() {
        let layout = CardLayout::new(
            vec![0xA0, 0x00],
            vec![FieldSpec::new(FieldId::Name, 0, 2, TextEncoding::Ascii)],
            Some(Integrity::XorSum {
                data_offset: 0,
                data_length: 2,
                check_offset: 8,
            }),
        );
        let config = tiny_config(layout);
        let mut transport = ScriptedTransport::new(vec![
            ok_reply(b"AB"),
            ok_reply(b"AB"),
            ok_reply(&[b'A' ^ b'B']),
        ]);
        let mut retriever = Retriever::new(&mut transport, &config);
        let record = retriever.read_fields().unwrap();
        let integrity = record.integrity.unwrap();
        assert_eq!(integrity.data.as_ref(), b"AB");
        assert_eq!(integrity.check, b'A' ^ b'B');
    }
}
