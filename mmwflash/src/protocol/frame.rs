//! Packet framing for the mmWave serial bootloader.
//!
//! ## Frame Format
//!
//! Packets sent by the host:
//!
//! ```text
//! +------+--------+----------+---------------+
//! | Sync | Length | Checksum |    Payload    |
//! +------+--------+----------+---------------+
//! |  1   | 2 (BE) |    1     |   Length - 2  |
//! +------+--------+----------+---------------+
//! | 0xAA | len+2  | sum(pl)  |  opcode, args |
//! +------+--------+----------+---------------+
//! ```
//!
//! Responses from the device carry the same envelope without the sync byte.
//! The checksum is the sum of the payload bytes modulo 256.

use byteorder::{BigEndian, ByteOrder, WriteBytesExt};

use crate::error::{Error, Result};

/// Start-of-packet marker sent by the host.
pub const SYNC: u8 = 0xAA;

/// Positive acknowledgement byte.
pub const ACK: u8 = 0xCC;

/// Negative acknowledgement byte.
pub const NACK: u8 = 0x33;

/// Size of a response header (length + checksum).
pub const HEADER_LEN: usize = 3;

/// The length field counts the payload plus these two bytes.
pub const LENGTH_OVERHEAD: usize = 2;

/// Largest payload the 16-bit length field can describe.
pub const MAX_PAYLOAD_LEN: usize = 0xFFFF - LENGTH_OVERHEAD;

/// 8-bit additive checksum.
pub fn checksum(payload: &[u8]) -> u8 {
    payload.iter().fold(0u8, |acc, &b| acc.wrapping_add(b))
}

/// Wrap `payload` into a host packet.
#[allow(clippy::unwrap_used)] // Writing to Vec<u8> cannot fail
pub fn encode(payload: &[u8]) -> Result<Vec<u8>> {
    if payload.len() > MAX_PAYLOAD_LEN {
        return Err(Error::PacketTooLarge { len: payload.len() });
    }
    let declared = u16::try_from(payload.len() + LENGTH_OVERHEAD)
        .map_err(|_| Error::PacketTooLarge { len: payload.len() })?;

    let mut packet = Vec::with_capacity(1 + HEADER_LEN + payload.len());
    packet.push(SYNC);
    packet
        .write_u16::<BigEndian>(declared)
        .unwrap();
    packet.push(checksum(payload));
    packet.extend_from_slice(payload);
    Ok(packet)
}

/// Parsed response header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PacketHeader {
    /// Length field as transmitted (payload + 2).
    pub declared_length: u16,
    /// Checksum field as transmitted.
    pub checksum: u8,
}

impl PacketHeader {
    /// Number of payload bytes that follow the header.
    pub fn payload_len(&self) -> usize {
        usize::from(self.declared_length).saturating_sub(LENGTH_OVERHEAD)
    }

    /// Returns whether `payload` matches the header checksum.
    pub fn verify(&self, payload: &[u8]) -> Result<()> {
        let calculated = checksum(payload);
        if calculated != self.checksum {
            return Err(Error::ChecksumError {
                calculated,
                received: self.checksum,
            });
        }
        Ok(())
    }
}

/// Parse the three header bytes of a response.
pub fn decode_header(header: &[u8; HEADER_LEN]) -> PacketHeader {
    PacketHeader {
        declared_length: BigEndian::read_u16(&header[..2]),
        checksum: header[2],
    }
}

/// Recover the payload of a complete host packet.
pub fn decode(packet: &[u8]) -> Result<&[u8]> {
    let Some((&sync, rest)) = packet.split_first() else {
        return Err(Error::MalformedPacket("empty packet".into()));
    };
    if sync != SYNC {
        return Err(Error::MalformedPacket(format!(
            "expected sync byte 0x{SYNC:02X}, got 0x{sync:02X}"
        )));
    }
    let Some(header) = rest
        .get(..HEADER_LEN)
        .and_then(|h| <&[u8; HEADER_LEN]>::try_from(h).ok())
    else {
        return Err(Error::MalformedPacket(format!(
            "truncated header ({} bytes)",
            packet.len()
        )));
    };
    let header = decode_header(header);
    let body = &rest[HEADER_LEN..];
    let payload = body
        .get(..header.payload_len())
        .ok_or_else(|| {
            Error::MalformedPacket(format!(
                "truncated payload ({}/{} bytes)",
                body.len(),
                header.payload_len()
            ))
        })?;
    header.verify(payload)?;
    Ok(payload)
}
