//! Card layout descriptions
//!
//! The on-card directory of a MyKad generation is captured as data rather
//! than hard-coded reads: a [`CardLayout`] names the applet to select, the
//! ordered field directory (offset, declared length, text encoding) and an
//! optional integrity description. The decoder and retrieval protocol are
//! driven entirely by the active layout, so a revised card generation is a
//! new layout value, not new code.

use std::fmt;

/// Text encoding of a field group on the card
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TextEncoding {
    /// Strict 7-bit ASCII; bytes above 0x7F are an encoding error
    Ascii,
    /// ISO 8859-1 superset; every byte maps to the corresponding code point
    Latin1,
}

/// Identifies one logical field of the identity record
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FieldId {
    /// Holder name
    Name,
    /// NRIC number
    IcNumber,
    /// Sex marker
    Sex,
    /// Date of birth
    DateOfBirth,
    /// State of birth
    StateOfBirth,
    /// Address line 1
    Address1,
    /// Address line 2
    Address2,
    /// Address line 3
    Address3,
    /// Postcode
    Postcode,
    /// City
    City,
    /// Religion
    Religion,
}

impl fmt::Display for FieldId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Name => "name",
            Self::IcNumber => "ic_number",
            Self::Sex => "sex",
            Self::DateOfBirth => "date_of_birth",
            Self::StateOfBirth => "state_of_birth",
            Self::Address1 => "address_1",
            Self::Address2 => "address_2",
            Self::Address3 => "address_3",
            Self::Postcode => "postcode",
            Self::City => "city",
            Self::Religion => "religion",
        };
        f.write_str(name)
    }
}

/// One entry of the on-card field directory
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FieldSpec {
    /// Field this entry describes
    pub id: FieldId,
    /// Byte offset within the selected file
    pub offset: u16,
    /// Declared length in bytes
    pub length: u8,
    /// Text encoding of the stored bytes
    pub encoding: TextEncoding,
}

impl FieldSpec {
    /// Create a new field directory entry
    pub const fn new(id: FieldId, offset: u16, length: u8, encoding: TextEncoding) -> Self {
        Self {
            id,
            offset,
            length,
            encoding,
        }
    }
}

/// Structural integrity description embedded in the card format
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Integrity {
    /// XOR of every byte in `[data_offset, data_offset + data_length)` must
    /// equal the byte stored at `check_offset`
    XorSum {
        /// Start of the protected range
        data_offset: u16,
        /// Length of the protected range
        data_length: u16,
        /// Offset of the stored check byte
        check_offset: u16,
    },
}

/// Description of one card generation: applet AID, field directory and
/// integrity rule
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CardLayout {
    /// AID of the identity application
    aid: Vec<u8>,
    /// Field directory, in the card's declared read order
    fields: Vec<FieldSpec>,
    /// Integrity rule, if the format embeds one
    integrity: Option<Integrity>,
    /// Largest Le used for one READ BINARY exchange
    max_chunk: u8,
}

/// AID of the JPN (Jabatan Pendaftaran Negara) identity applet
pub const JPN_AID: [u8; 11] = [
    0x68, 0x04, 0x00, 0x01, 0x01, 0x01, 0x01, 0x01, 0x01, 0x01, 0x01,
];

impl CardLayout {
    /// Create a layout from its parts
    pub fn new(aid: Vec<u8>, fields: Vec<FieldSpec>, integrity: Option<Integrity>) -> Self {
        Self {
            aid,
            fields,
            integrity,
            max_chunk: 0xFF,
        }
    }

    /// Set the largest Le used per READ BINARY exchange
    pub const fn with_max_chunk(mut self, max_chunk: u8) -> Self {
        self.max_chunk = max_chunk;
        self
    }

    /// The JPN 1.0 layout used by first-generation MyKad readers
    pub fn jpn_1_0() -> Self {
        use FieldId::*;
        use TextEncoding::*;

        Self::new(
            JPN_AID.to_vec(),
            vec![
                FieldSpec::new(Name, 233, 40, Latin1),
                FieldSpec::new(IcNumber, 273, 13, Ascii),
                FieldSpec::new(Sex, 300, 1, Ascii),
                FieldSpec::new(DateOfBirth, 301, 10, Ascii),
                FieldSpec::new(StateOfBirth, 312, 25, Latin1),
                FieldSpec::new(Address1, 411, 30, Latin1),
                FieldSpec::new(Address2, 441, 30, Latin1),
                FieldSpec::new(Address3, 471, 30, Latin1),
                FieldSpec::new(Postcode, 574, 5, Ascii),
                FieldSpec::new(City, 579, 25, Latin1),
                FieldSpec::new(Religion, 653, 10, Latin1),
            ],
            None,
        )
    }

    /// AID of the identity application
    pub fn aid(&self) -> &[u8] {
        &self.aid
    }

    /// Field directory in declared read order
    pub fn fields(&self) -> &[FieldSpec] {
        &self.fields
    }

    /// Look up the directory entry for a field
    pub fn field(&self, id: FieldId) -> Option<&FieldSpec> {
        self.fields.iter().find(|spec| spec.id == id)
    }

    /// Integrity rule, if declared
    pub const fn integrity(&self) -> Option<Integrity> {
        self.integrity
    }

    /// Largest Le used per READ BINARY exchange
    pub const fn max_chunk(&self) -> u8 {
        self.max_chunk
    }
}
