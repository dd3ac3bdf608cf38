//! APDU response definitions
//!
//! A response is the payload returned by the card followed by a two-byte
//! status word (SW1 SW2).

use bytes::Bytes;
use tracing::trace;

use crate::Error;
use crate::status::StatusWord;

/// Basic APDU response structure
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Response {
    /// Response payload data
    payload: Option<Bytes>,
    /// Status word
    status: StatusWord,
}

impl Response {
    /// Create a new response with payload and status
    pub fn new(payload: Option<Bytes>, status: impl Into<StatusWord>) -> Self {
        Self {
            payload,
            status: status.into(),
        }
    }

    /// Create a success response
    pub const fn success(payload: Option<Bytes>) -> Self {
        Self {
            payload,
            status: StatusWord::new(0x90, 0x00),
        }
    }

    /// Parse a response from raw bytes (including the trailing status word)
    pub fn from_bytes(data: &[u8]) -> Result<Self, Error> {
        if data.len() < 2 {
            return Err(Error::parse("response shorter than status word"));
        }

        let (body, sw) = data.split_at(data.len() - 2);
        let status = StatusWord::new(sw[0], sw[1]);
        let payload = if body.is_empty() {
            None
        } else {
            Some(Bytes::copy_from_slice(body))
        };

        trace!(
            sw1 = format_args!("{:#04x}", status.sw1),
            sw2 = format_args!("{:#04x}", status.sw2),
            payload_len = payload.as_ref().map_or(0, |p| p.len()),
            "Parsed APDU response"
        );

        Ok(Self { payload, status })
    }

    /// Get the response payload data
    pub const fn payload(&self) -> Option<&Bytes> {
        self.payload.as_ref()
    }

    /// Get the status word
    pub const fn status(&self) -> StatusWord {
        self.status
    }

    /// Check if the response indicates success
    pub const fn is_success(&self) -> bool {
        self.status.is_success()
    }

    /// Convert into the payload, failing on a non-success status word
    pub fn into_payload(self) -> Result<Bytes, Error> {
        if self.is_success() {
            Ok(self.payload.unwrap_or_default())
        } else {
            Err(Error::Status { status: self.status })
        }
    }
}

impl TryFrom<&[u8]> for Response {
    type Error = Error;

    fn try_from(data: &[u8]) -> Result<Self, Error> {
        Self::from_bytes(data)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_response_from_bytes() {
        let resp = Response::from_bytes(&[0x01, 0x02, 0x03, 0x90, 0x00]).unwrap();
        assert_eq!(resp.payload().unwrap().as_ref(), &[0x01, 0x02, 0x03]);
        assert!(resp.is_success());

        let resp = Response::from_bytes(&[0x90, 0x00]).unwrap();
        assert!(resp.payload().is_none());
        assert!(resp.is_success());

        assert!(Response::from_bytes(&[0x01]).is_err());
    }

    #[test]
    fn test_response_into_payload() {
        let resp = Response::success(Some(Bytes::from_static(&[0xAA, 0xBB])));
        assert_eq!(resp.into_payload().unwrap().as_ref(), &[0xAA, 0xBB]);

        let resp = Response::new(None, (0x6A, 0x82));
        let err = resp.into_payload().unwrap_err();
        assert_eq!(err.status_word().unwrap().to_u16(), 0x6A82);
    }

    #[test]
    fn test_empty_success_payload() {
        let resp = Response::success(None);
        assert_eq!(resp.into_payload().unwrap().len(), 0);
    }
}
