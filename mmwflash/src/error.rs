//! Error types for mmwflash.

use std::io;
use thiserror::Error;

/// Result type for mmwflash operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Error type for mmwflash operations.
#[derive(Debug, Error)]
pub enum Error {
    /// Transport failure (serial read/write, file operations).
    #[error("I/O error: {0}")]
    TransportIo(#[from] io::Error),

    /// Serial port error.
    #[cfg(feature = "native")]
    #[error("Serial port error: {0}")]
    Serial(#[from] serialport::Error),

    /// Fewer than three response header bytes arrived in time.
    #[error("Timed out waiting for response header ({received}/3 bytes)")]
    HeaderTimeout {
        /// Header bytes received before the deadline.
        received: usize,
    },

    /// The response payload was cut short by the deadline.
    #[error("Timed out waiting for response payload ({received}/{expected} bytes)")]
    PayloadTimeout {
        /// Payload bytes received before the deadline.
        received: usize,
        /// Payload bytes announced by the header.
        expected: usize,
    },

    /// Response checksum mismatch.
    #[error("Checksum mismatch: calculated {calculated:#04x}, received {received:#04x}")]
    ChecksumError {
        /// Checksum computed over the received payload.
        calculated: u8,
        /// Checksum carried in the header.
        received: u8,
    },

    /// No ACK or NACK arrived in time.
    #[error("Timed out waiting for ACK")]
    AckTimeout,

    /// The bootloader answered with NACK.
    #[error("Command rejected by bootloader (NACK)")]
    Rejected,

    /// Every connection attempt failed.
    #[error("Failed to connect to bootloader after {attempts} attempts")]
    ConnectFailed {
        /// Number of ping attempts made.
        attempts: usize,
        /// Failure of the last attempt.
        #[source]
        source: Box<Error>,
    },

    /// Storage erase failed.
    #[error("Erase failed")]
    EraseFailed(#[source] Box<Error>),

    /// Download failed at the given image offset.
    #[error("Download failed at offset {offset}")]
    DownloadFailed {
        /// Offset of the first byte not confirmed by the device.
        offset: usize,
        /// Underlying failure.
        #[source]
        source: Box<Error>,
    },

    /// File close failed.
    #[error("File close failed")]
    CloseFailed(#[source] Box<Error>),

    /// Another flashing run holds the session.
    #[error("A flashing operation is already in progress")]
    AlreadyInProgress,

    /// Firmware image rejected before download.
    #[error("Invalid firmware image: {0}")]
    InvalidImage(String),

    /// Payload does not fit the 16-bit length field.
    #[error("Packet payload too large: {len} bytes")]
    PacketTooLarge {
        /// Payload length that was requested.
        len: usize,
    },

    /// Byte sequence is not a well-formed packet.
    #[error("Malformed packet: {0}")]
    MalformedPacket(String),

    /// No reset line is configured.
    #[error("No reset line configured")]
    ResetUnavailable,

    /// Configuration error.
    #[error("Configuration error: {0}")]
    Config(String),
}

impl Error {
    /// Wraps a step failure, keeping it as the source.
    pub(crate) fn boxed(self) -> Box<Self> {
        Box::new(self)
    }

    /// Returns true for failures caused by the link timing out.
    pub fn is_timeout(&self) -> bool {
        matches!(
            self,
            Self::HeaderTimeout { .. } | Self::PayloadTimeout { .. } | Self::AckTimeout
        )
    }

    /// Returns true when the port does not exist or the bootloader never
    /// answered.
    pub fn is_device_missing(&self) -> bool {
        match self {
            Self::TransportIo(e) => e.kind() == io::ErrorKind::NotFound,
            #[cfg(feature = "native")]
            Self::Serial(e) => matches!(
                e.kind(),
                serialport::ErrorKind::NoDevice | serialport::ErrorKind::Io(io::ErrorKind::NotFound)
            ),
            Self::ConnectFailed { .. } => true,
            _ => false,
        }
    }
}
