//! Packet exchange with acknowledgement and timeout handling.
//!
//! The link owns the transport and the clock. Every wait goes through a
//! single bounded polling primitive, so no call can block longer than the
//! configured timeout.

use std::time::Duration;

use log::{debug, trace, warn};

use crate::error::{Error, Result};
use crate::port::{Clock, Transport, duration_ms};
use crate::protocol::frame::{self, ACK, HEADER_LEN, NACK};

/// Timing parameters of the link.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LinkConfig {
    /// Budget for reading a response header, and again for its payload.
    pub response_timeout: Duration,
    /// Budget for receiving ACK or NACK.
    pub ack_timeout: Duration,
    /// Sleep between polls when no byte is available.
    pub poll_interval: Duration,
}

impl Default for LinkConfig {
    fn default() -> Self {
        Self {
            response_timeout: Duration::from_millis(2000),
            ack_timeout: Duration::from_millis(1000),
            poll_interval: Duration::from_millis(1),
        }
    }
}

impl LinkConfig {
    /// Set the response timeout.
    #[must_use]
    pub fn with_response_timeout(mut self, timeout: Duration) -> Self {
        self.response_timeout = timeout;
        self
    }

    /// Set the ACK timeout.
    #[must_use]
    pub fn with_ack_timeout(mut self, timeout: Duration) -> Self {
        self.ack_timeout = timeout;
        self
    }
}

/// Framed packet link over a [`Transport`].
pub struct Link<T: Transport, C: Clock> {
    transport: T,
    clock: C,
    config: LinkConfig,
}

impl<T: Transport, C: Clock> Link<T, C> {
    /// Create a link with default timing.
    pub fn new(transport: T, clock: C) -> Self {
        Self::with_config(transport, clock, LinkConfig::default())
    }

    /// Create a link with custom timing.
    pub fn with_config(transport: T, clock: C, config: LinkConfig) -> Self {
        Self {
            transport,
            clock,
            config,
        }
    }

    /// Timing in use.
    pub fn config(&self) -> &LinkConfig {
        &self.config
    }

    /// Get a mutable reference to the underlying transport.
    pub fn transport_mut(&mut self) -> &mut T {
        &mut self.transport
    }

    /// Consume the link and return the underlying transport.
    pub fn into_transport(self) -> T {
        self.transport
    }

    /// Sleep on the link clock.
    pub fn sleep(&self, duration: Duration) {
        self.clock
            .sleep(duration);
    }

    /// Frame `payload` and write it out.
    pub fn send_packet(&mut self, payload: &[u8]) -> Result<()> {
        let packet = frame::encode(payload)?;
        trace!("Sending packet: {packet:02X?}");
        self.transport
            .write_bytes(&packet)?;
        self.transport
            .flush()
    }

    /// Read one response and acknowledge it.
    ///
    /// `expected_len` is advisory: if the header announces a different
    /// length, the announced length is read and a warning is logged.
    pub fn receive_packet(&mut self, expected_len: usize) -> Result<Vec<u8>> {
        let mut header = [0u8; HEADER_LEN];
        let got = self.read_with_timeout(&mut header, self.config.response_timeout)?;
        if got < HEADER_LEN {
            debug!("Response header timeout ({got}/{HEADER_LEN} bytes)");
            return Err(Error::HeaderTimeout { received: got });
        }

        let header = frame::decode_header(&header);
        let len = header.payload_len();
        if len != expected_len {
            warn!("Response length {len} differs from expected {expected_len}");
        }

        let mut payload = vec![0u8; len];
        let got = self.read_with_timeout(&mut payload, self.config.response_timeout)?;
        if got < len {
            debug!("Response payload timeout ({got}/{len} bytes)");
            return Err(Error::PayloadTimeout {
                received: got,
                expected: len,
            });
        }

        header.verify(&payload)?;
        trace!("Received payload: {payload:02X?}");

        self.transport
            .write_bytes(&[ACK])?;
        self.transport
            .flush()?;
        Ok(payload)
    }

    /// Wait for ACK, skipping unrelated bytes.
    pub fn read_ack(&mut self) -> Result<()> {
        let start = self
            .clock
            .now_ms();
        let budget = duration_ms(self.config.ack_timeout);
        let mut skipped = 0usize;

        while self
            .clock
            .now_ms()
            .saturating_sub(start)
            < budget
        {
            if !self
                .transport
                .bytes_available()?
            {
                self.clock
                    .sleep(self.config.poll_interval);
                continue;
            }
            match self
                .transport
                .read_byte()?
            {
                ACK => {
                    if skipped > 0 {
                        trace!("Skipped {skipped} bytes before ACK");
                    }
                    return Ok(());
                },
                NACK => return Err(Error::Rejected),
                other => {
                    trace!("Ignoring byte 0x{other:02X} while waiting for ACK");
                    skipped += 1;
                },
            }
        }

        Err(Error::AckTimeout)
    }

    /// Drop stale input.
    pub fn discard_input(&mut self) -> Result<usize> {
        let dropped = self
            .transport
            .discard_input()?;
        if dropped > 0 {
            debug!("Discarded {dropped} stale bytes");
        }
        Ok(dropped)
    }

    /// Fill `buf` from the transport within `timeout`, returning the count read.
    fn read_with_timeout(&mut self, buf: &mut [u8], timeout: Duration) -> Result<usize> {
        let start = self
            .clock
            .now_ms();
        let budget = duration_ms(timeout);
        let mut filled = 0;

        while filled < buf.len() {
            if self
                .transport
                .bytes_available()?
            {
                buf[filled] = self
                    .transport
                    .read_byte()?;
                filled += 1;
                continue;
            }
            if self
                .clock
                .now_ms()
                .saturating_sub(start)
                >= budget
            {
                break;
            }
            self.clock
                .sleep(self.config.poll_interval);
        }

        Ok(filled)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::port::mock::{MockClock, MockTransport, response_packet};

    fn link(bytes: &[u8]) -> Link<MockTransport, MockClock> {
        Link::new(MockTransport::scripted(bytes), MockClock::new())
    }

    #[test]
    fn test_send_packet_writes_frame() {
        let mut link = link(&[]);
        let state = link
            .transport_mut()
            .handle();
        link.send_packet(&[0x2F])
            .unwrap();

        let state = state.lock().unwrap();
        assert_eq!(state.written, vec![0xAA, 0x00, 0x03, 0x2F, 0x2F]);
        assert_eq!(state.flushes, 1);
    }

    #[test]
    fn test_receive_packet_acks_valid_response() {
        let mut link = link(&response_packet(&[0x40]));
        let state = link
            .transport_mut()
            .handle();

        let payload = link
            .receive_packet(1)
            .unwrap();
        assert_eq!(payload, vec![0x40]);
        assert_eq!(state.lock().unwrap().written, vec![ACK]);
    }

    #[test]
    fn test_receive_packet_header_timeout() {
        let mut link = link(&[0x00, 0x03]);
        let state = link
            .transport_mut()
            .handle();

        let err = link
            .receive_packet(1)
            .unwrap_err();
        assert!(matches!(err, Error::HeaderTimeout { received: 2 }));
        assert!(state.lock().unwrap().written.is_empty());
    }

    #[test]
    fn test_receive_packet_payload_timeout() {
        let mut link = link(&[0x00, 0x06, 0x00, 0x01, 0x02]);
        let err = link
            .receive_packet(4)
            .unwrap_err();
        assert!(matches!(
            err,
            Error::PayloadTimeout {
                received: 2,
                expected: 4
            }
        ));
    }

    #[test]
    fn test_receive_packet_checksum_error_sends_no_ack() {
        let mut bytes = response_packet(&[0x02, 0x00, 0x04, 0x01]);
        bytes[4] ^= 0x01;
        let mut link = link(&bytes);
        let state = link
            .transport_mut()
            .handle();

        let err = link
            .receive_packet(4)
            .unwrap_err();
        assert!(matches!(err, Error::ChecksumError { .. }));
        assert!(state.lock().unwrap().written.is_empty());
    }

    #[test]
    fn test_receive_packet_length_mismatch_reads_declared() {
        let mut link = link(&response_packet(&[0x00, 0x00, 0x00, 0x40]));
        let payload = link
            .receive_packet(1)
            .unwrap();
        assert_eq!(payload, vec![0x00, 0x00, 0x00, 0x40]);
    }

    #[test]
    fn test_receive_packet_short_declared_length() {
        let mut link = link(&[0x00, 0x01, 0x00]);
        let payload = link
            .receive_packet(1)
            .unwrap();
        assert!(payload.is_empty());
    }

    #[test]
    fn test_read_ack_skips_noise() {
        let mut link = link(&[0x00, 0x55, 0xFF, ACK]);
        link.read_ack()
            .unwrap();
    }

    #[test]
    fn test_read_ack_nack() {
        let mut link = link(&[0x00, NACK, ACK]);
        assert!(matches!(link.read_ack(), Err(Error::Rejected)));
    }

    #[test]
    fn test_read_ack_timeout() {
        let mut link = link(&[0x12, 0x34]);
        assert!(matches!(link.read_ack(), Err(Error::AckTimeout)));
    }

    #[test]
    fn test_timeout_respects_budget() {
        let clock = MockClock::new();
        let mut link = Link::with_config(
            MockTransport::scripted(&[]),
            clock.clone(),
            LinkConfig::default().with_ack_timeout(Duration::from_millis(50)),
        );
        assert!(matches!(link.read_ack(), Err(Error::AckTimeout)));
        assert_eq!(clock.now_ms(), 50);
    }

    #[test]
    fn test_discard_input() {
        let mut link = link(&[1, 2, 3, 4]);
        assert_eq!(link.discard_input().unwrap(), 4);
        assert!(matches!(link.read_ack(), Err(Error::AckTimeout)));
    }
}
