//! Bounded-wait command exchange on top of a raw transport

use std::time::{Duration, Instant};

use mykad_apdu_core::{ApduCommand, CardTransport, Command, Response, TransportError};

/// One command/response exchange with a bounded wait
///
/// PC/SC offers no hard deadline on `transmit`, so the bound is enforced by
/// measuring the exchange: a reply that arrives after the timeout has
/// already elapsed is discarded and reported as [`TransportError::Timeout`].
/// The bound detects late replies; it cannot interrupt a transmit that
/// never returns.
pub(crate) fn exchange<T: CardTransport>(
    transport: &mut T,
    command: &Command,
    timeout: Duration,
) -> Result<Response, TransportError> {
    let started = Instant::now();
    let raw = transport.transmit_raw(&command.to_bytes())?;

    if started.elapsed() > timeout {
        return Err(TransportError::Timeout);
    }

    Response::from_bytes(&raw).map_err(|_| TransportError::Transmission)
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;
    use std::thread;

    #[derive(Debug)]
    struct FixedTransport {
        response: Vec<u8>,
        delay: Option<Duration>,
    }

    impl CardTransport for FixedTransport {
        fn do_transmit_raw(&mut self, _command: &[u8]) -> Result<Bytes, TransportError> {
            if let Some(delay) = self.delay {
                thread::sleep(delay);
            }
            Ok(Bytes::copy_from_slice(&self.response))
        }

        fn is_connected(&self) -> bool {
            true
        }

        fn reset(&mut self) -> Result<(), TransportError> {
            Ok(())
        }
    }

    #[test]
    fn test_exchange_within_bound() {
        let mut transport = FixedTransport {
            response: vec![0xAB, 0x90, 0x00],
            delay: None,
        };
        let cmd = Command::new_with_le(0x00, 0xB0, 0x00, 0x00, 1);
        let response = exchange(&mut transport, &cmd, Duration::from_secs(1)).unwrap();
        assert!(response.is_success());
        assert_eq!(response.payload().unwrap().as_ref(), &[0xAB]);
    }

    #[test]
    fn test_exchange_past_deadline_is_timeout() {
        let mut transport = FixedTransport {
            response: vec![0x90, 0x00],
            delay: Some(Duration::from_millis(20)),
        };
        let cmd = Command::new_with_le(0x00, 0xB0, 0x00, 0x00, 1);
        let err = exchange(&mut transport, &cmd, Duration::from_millis(1)).unwrap_err();
        assert_eq!(err, TransportError::Timeout);
    }

    #[test]
    fn test_exchange_short_response() {
        let mut transport = FixedTransport {
            response: vec![0x90],
            delay: None,
        };
        let cmd = Command::new(0x00, 0xB0, 0x00, 0x00);
        let err = exchange(&mut transport, &cmd, Duration::from_secs(1)).unwrap_err();
        assert_eq!(err, TransportError::Transmission);
    }
}
