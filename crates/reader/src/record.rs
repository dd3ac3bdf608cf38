//! The decoded identity record

use serde::{Deserialize, Serialize};

/// A fully decoded and validated MyKad identity record
///
/// Produced once per completed card session and immutable afterwards. Every
/// field has passed encoding normalization and, for the NRIC number, the
/// fixed-format validation; a record with an invalid field is never
/// constructed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdentityRecord {
    /// Holder name
    pub name: String,
    /// NRIC number
    pub ic_number: String,
    /// Sex marker as stored on the card ("L"/"P")
    pub sex: String,
    /// Date of birth
    pub date_of_birth: String,
    /// State of birth
    pub state_of_birth: String,
    /// Address line 1
    pub address_1: String,
    /// Address line 2
    pub address_2: String,
    /// Address line 3
    pub address_3: String,
    /// Postcode
    pub postcode: String,
    /// City
    pub city: String,
    /// Religion
    pub religion: String,
    /// Timestamp marking when decoding completed ("%Y-%m-%d %H:%M:%S")
    pub read_time: String,
}
