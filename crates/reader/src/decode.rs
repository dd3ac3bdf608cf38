//! Record decoding and validation
//!
//! Turns a [`RawRecord`] into an [`IdentityRecord`]: bytes are decoded per
//! the field's declared encoding, the stored checksum is verified when the
//! layout declares one, padding is stripped and the NRIC number is checked
//! against its fixed format. A record that fails any step is never
//! constructed.

use chrono::Local;
use thiserror::Error;
use tracing::debug;

use crate::layout::{CardLayout, FieldId, Integrity, TextEncoding};
use crate::record::IdentityRecord;
use crate::retrieval::RawRecord;

/// Errors raised while decoding the raw record
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DecodeError {
    /// A field violates its declared structure
    #[error("malformed {field}: {reason}")]
    Malformed {
        /// The offending field
        field: FieldId,
        /// What the field violated
        reason: &'static str,
    },

    /// The stored check byte does not match the recomputed value
    #[error("checksum mismatch: card stores {expected:#04x}, computed {actual:#04x}")]
    ChecksumMismatch {
        /// Check byte stored on the card
        expected: u8,
        /// Recomputed value
        actual: u8,
    },

    /// A field contains bytes outside its declared encoding
    #[error("undecodable bytes in {field}")]
    EncodingError {
        /// The offending field
        field: FieldId,
    },
}

/// Decode and validate a raw record against its layout
///
/// `read_time` is stamped with the local wall clock at the moment decoding
/// completes; it is the only field of the result not derived from the card.
pub fn decode_record(raw: &RawRecord, layout: &CardLayout) -> Result<IdentityRecord, DecodeError> {
    verify_integrity(raw, layout)?;

    let field = |id: FieldId| -> Result<String, DecodeError> {
        let spec = layout
            .field(id)
            .ok_or(DecodeError::Malformed {
                field: id,
                reason: "field not declared by layout",
            })?;
        let (_, bytes) = raw
            .fields
            .iter()
            .find(|(fid, _)| *fid == id)
            .ok_or(DecodeError::Malformed {
                field: id,
                reason: "field missing from retrieved record",
            })?;
        let text =
            decode_text(bytes, spec.encoding).ok_or(DecodeError::EncodingError { field: id })?;
        Ok(trim_padding(&text).to_string())
    };

    let ic_number = field(FieldId::IcNumber)?;
    validate_nric(&ic_number).map_err(|reason| DecodeError::Malformed {
        field: FieldId::IcNumber,
        reason,
    })?;

    let record = IdentityRecord {
        name: field(FieldId::Name)?,
        ic_number,
        sex: field(FieldId::Sex)?,
        date_of_birth: field(FieldId::DateOfBirth)?,
        state_of_birth: field(FieldId::StateOfBirth)?,
        address_1: field(FieldId::Address1)?,
        address_2: field(FieldId::Address2)?,
        address_3: field(FieldId::Address3)?,
        postcode: field(FieldId::Postcode)?,
        city: field(FieldId::City)?,
        religion: field(FieldId::Religion)?,
        read_time: Local::now().format("%Y-%m-%d %H:%M:%S").to_string(),
    };

    debug!(ic_number = %record.ic_number, "Decoded identity record");
    Ok(record)
}

fn verify_integrity(raw: &RawRecord, layout: &CardLayout) -> Result<(), DecodeError> {
    let Some(Integrity::XorSum { .. }) = layout.integrity() else {
        return Ok(());
    };
    let Some(integrity) = raw.integrity.as_ref() else {
        return Err(DecodeError::Malformed {
            field: FieldId::IcNumber,
            reason: "integrity material missing from retrieved record",
        });
    };
    let actual = xor_sum(&integrity.data);
    if actual != integrity.check {
        return Err(DecodeError::ChecksumMismatch {
            expected: integrity.check,
            actual,
        });
    }
    Ok(())
}

fn xor_sum(data: &[u8]) -> u8 {
    data.iter().fold(0, |acc, byte| acc ^ byte)
}

/// Decode card bytes per the declared encoding
///
/// Undecodable bytes are rejected, never substituted. NUL is allowed in
/// both encodings because cards pad with it; other control bytes are not
/// text and fail the decode.
fn decode_text(bytes: &[u8], encoding: TextEncoding) -> Option<String> {
    let mut text = String::with_capacity(bytes.len());
    for &byte in bytes {
        let ch = match encoding {
            TextEncoding::Ascii if byte < 0x80 => byte as char,
            TextEncoding::Latin1 if byte < 0x80 || byte >= 0xA0 => byte as char,
            _ => return None,
        };
        if ch != '\0' && ch.is_control() {
            return None;
        }
        text.push(ch);
    }
    Some(text)
}

/// Strip trailing NUL and space padding, keeping interior spaces intact
fn trim_padding(text: &str) -> &str {
    text.trim_end_matches(['\0', ' '])
}

/// Check the NRIC number against its fixed format
///
/// Accepts the 12-digit compact form and the 14-character dashed form
/// (digits with dashes after the birth-date and birth-place groups). The
/// leading six digits must form a plausible YYMMDD date.
fn validate_nric(ic: &str) -> Result<(), &'static str> {
    let bytes = ic.as_bytes();
    let digits: &[u8] = match bytes.len() {
        12 => {
            if !bytes.iter().all(u8::is_ascii_digit) {
                return Err("NRIC must contain only digits");
            }
            bytes
        }
        14 => {
            if bytes[6] != b'-' || bytes[9] != b'-' {
                return Err("dashed NRIC must use YYMMDD-PB-NNNN form");
            }
            if !bytes
                .iter()
                .enumerate()
                .all(|(i, b)| i == 6 || i == 9 || b.is_ascii_digit())
            {
                return Err("NRIC must contain only digits");
            }
            bytes
        }
        0 => return Err("NRIC field is empty"),
        _ => return Err("NRIC must be 12 digits or 14 characters with dashes"),
    };

    let month = (digits[2] - b'0') * 10 + (digits[3] - b'0');
    let day = (digits[4] - b'0') * 10 + (digits[5] - b'0');
    if !(1..=12).contains(&month) || !(1..=31).contains(&day) {
        return Err("NRIC embeds an implausible birth date");
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::layout::JPN_AID;
    use crate::retrieval::IntegrityData;
    use bytes::Bytes;

    fn padded(text: &str, length: usize) -> Bytes {
        let mut bytes = text.as_bytes().to_vec();
        bytes.resize(length, 0x00);
        Bytes::from(bytes)
    }

    fn jpn_raw() -> RawRecord {
        let layout = CardLayout::jpn_1_0();
        let values = [
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
        ];
        let fields = values
            .iter()
            .map(|(id, text)| {
                let spec = layout.field(*id).unwrap();
                (*id, padded(text, spec.length as usize))
            })
            .collect();
        RawRecord {
            fields,
            integrity: None,
        }
    }

    #[test]
    fn test_decode_happy_path() {
        let layout = CardLayout::jpn_1_0();
        let record = decode_record(&jpn_raw(), &layout).unwrap();
        assert_eq!(record.name, "ALI BIN ABU");
        assert_eq!(record.ic_number, "900101011234");
        assert_eq!(record.sex, "L");
        assert_eq!(record.date_of_birth, "1990-01-01");
        assert_eq!(record.address_3, "");
        assert!(!record.read_time.is_empty());
    }

    #[test]
    fn test_decode_is_deterministic_except_read_time() {
        let layout = CardLayout::jpn_1_0();
        let raw = jpn_raw();
        let mut first = decode_record(&raw, &layout).unwrap();
        let mut second = decode_record(&raw, &layout).unwrap();
        first.read_time.clear();
        second.read_time.clear();
        assert_eq!(first, second);
    }

    #[test]
    fn test_invalid_nric_rejected() {
        let layout = CardLayout::jpn_1_0();
        let mut raw = jpn_raw();
        let spec = layout.field(FieldId::IcNumber).unwrap();
        for (id, bytes) in &mut raw.fields {
            if *id == FieldId::IcNumber {
                *bytes = padded("90010101123X", spec.length as usize);
            }
        }
        let err = decode_record(&raw, &layout).unwrap_err();
        assert!(matches!(
            err,
            DecodeError::Malformed {
                field: FieldId::IcNumber,
                ..
            }
        ));
    }

    #[test]
    fn test_nric_forms() {
        assert!(validate_nric("900101011234").is_ok());
        assert!(validate_nric("900101-01-1234").is_ok());
        assert!(validate_nric("901301011234").is_err());
        assert!(validate_nric("900100011234").is_err());
        assert!(validate_nric("900101-011234").is_err());
        assert!(validate_nric("").is_err());
    }

    #[test]
    fn test_trim_keeps_interior_spaces() {
        assert_eq!(trim_padding("ALI BIN ABU  \0\0"), "ALI BIN ABU");
        assert_eq!(trim_padding("NO 1  JALAN"), "NO 1  JALAN");
        assert_eq!(trim_padding("\0\0"), "");
    }

    #[test]
    fn test_encodings() {
        assert_eq!(decode_text(b"ALI", TextEncoding::Ascii).unwrap(), "ALI");
        assert!(decode_text(&[0x41, 0xC9], TextEncoding::Ascii).is_none());
        assert_eq!(
            decode_text(&[0x41, 0xC9], TextEncoding::Latin1).unwrap(),
            "A\u{C9}"
        );
        // C1 control range is not Latin-1 text
        assert!(decode_text(&[0x41, 0x85], TextEncoding::Latin1).is_none());
    }

    #[test]
    fn test_checksum_verified_when_declared() {
        let layout = CardLayout::new(
            JPN_AID.to_vec(),
            CardLayout::jpn_1_0().fields().to_vec(),
            Some(Integrity::XorSum {
                data_offset: 0,
                data_length: 4,
                check_offset: 700,
            }),
        );

        let mut raw = jpn_raw();
        raw.integrity = Some(IntegrityData {
            data: Bytes::from_static(b"ABCD"),
            check: b'A' ^ b'B' ^ b'C' ^ b'D',
        });
        assert!(decode_record(&raw, &layout).is_ok());

        raw.integrity = Some(IntegrityData {
            data: Bytes::from_static(b"ABCD"),
            check: 0xFF,
        });
        let err = decode_record(&raw, &layout).unwrap_err();
        assert!(matches!(err, DecodeError::ChecksumMismatch { .. }));
    }
}
