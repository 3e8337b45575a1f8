//! Byte-stream abstraction for the bootloader link.
//!
//! The protocol engine never talks to a serial device directly. It drives
//! a [`Transport`] for bytes, a [`Clock`] for deadlines and, when a reset
//! line is wired, a [`LineControl`] for the modem control pins.
//!
//! ```text
//! +-------------------+
//! |  Flash Orchestr.  |
//! +---------+---------+
//!           |
//! +---------v---------+
//! |  Command / Link   |
//! +---------+---------+
//!           |
//! +---------v---------+     +------------------+
//! | Transport + Clock +---->| NativePort       |
//! +-------------------+     |  (serialport)    |
//!                           +------------------+
//! ```
//!
//! ## Example
//!
//! ```rust,no_run
//! use mmwflash::port::Transport;
//!
//! fn drain<T: Transport>(port: &mut T) -> mmwflash::Result<Vec<u8>> {
//!     let mut out = Vec::new();
//!     while port.bytes_available()? {
//!         out.push(port.read_byte()?);
//!     }
//!     Ok(out)
//! }
//! ```

#[cfg(feature = "native")]
pub mod native;

#[cfg(test)]
pub(crate) mod mock;

use std::fmt;
use std::time::{Duration, Instant};

use crate::error::Result;

/// Serial port configuration.
#[derive(Debug, Clone)]
pub struct SerialConfig {
    /// Port name/path (e.g., "/dev/ttyUSB0", "COM3").
    pub port_name: String,
    /// Baud rate.
    pub baud_rate: u32,
    /// Blocking read/write timeout of the underlying device.
    pub timeout: Duration,
    /// Modem control line wired to the sensor's reset pin.
    pub reset_line: Option<ResetLine>,
}

/// Baud rate the mmWave ROM bootloader listens on.
pub const DEFAULT_BAUD: u32 = 115_200;

/// USB vendor ID of the XDS110 debug probe on TI EVMs.
pub const XDS110_VID: u16 = 0x0451;

/// USB product ID of the XDS110 debug probe.
pub const XDS110_PID: u16 = 0xBEF3;

impl Default for SerialConfig {
    fn default() -> Self {
        Self {
            port_name: String::new(),
            baud_rate: DEFAULT_BAUD,
            timeout: Duration::from_millis(100),
            reset_line: None,
        }
    }
}

impl SerialConfig {
    /// Create a new configuration with port name and baud rate.
    pub fn new(port_name: impl Into<String>, baud_rate: u32) -> Self {
        Self {
            port_name: port_name.into(),
            baud_rate,
            ..Default::default()
        }
    }

    /// Set the timeout.
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Set the reset line.
    #[must_use]
    pub fn with_reset_line(mut self, line: Option<ResetLine>) -> Self {
        self.reset_line = line;
        self
    }
}

/// Serial port information.
#[derive(Debug, Clone)]
pub struct PortInfo {
    /// Port name/path.
    pub name: String,
    /// USB vendor ID (if available).
    pub vid: Option<u16>,
    /// USB product ID (if available).
    pub pid: Option<u16>,
    /// Manufacturer string (if available).
    pub manufacturer: Option<String>,
    /// Product string (if available).
    pub product: Option<String>,
    /// Serial number (if available).
    pub serial_number: Option<String>,
}

/// Non-blocking byte stream to the bootloader.
pub trait Transport: Send {
    /// Returns whether at least one byte can be read without blocking.
    fn bytes_available(&mut self) -> Result<bool>;

    /// Reads a single byte. Only called after `bytes_available` returned true.
    fn read_byte(&mut self) -> Result<u8>;

    /// Writes all bytes.
    fn write_bytes(&mut self, data: &[u8]) -> Result<()>;

    /// Blocks until written bytes have left the host.
    fn flush(&mut self) -> Result<()>;

    /// Drops any bytes already received. Returns how many were dropped.
    fn discard_input(&mut self) -> Result<usize> {
        let mut dropped = 0;
        while self.bytes_available()? {
            self.read_byte()?;
            dropped += 1;
        }
        Ok(dropped)
    }
}

/// Monotonic millisecond clock with a sleep primitive.
pub trait Clock: Send {
    /// Milliseconds since an arbitrary fixed origin.
    fn now_ms(&self) -> u64;

    /// Suspends the caller for `ms` milliseconds.
    fn sleep_ms(&self, ms: u64);

    /// Suspends the caller for `duration`.
    fn sleep(&self, duration: Duration) {
        self.sleep_ms(duration_ms(duration));
    }
}

/// Whole milliseconds of a duration, saturating at `u64::MAX`.
pub(crate) fn duration_ms(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

/// [`Clock`] backed by [`Instant`] and [`std::thread::sleep`].
#[derive(Debug, Clone, Copy)]
pub struct SystemClock {
    origin: Instant,
}

impl SystemClock {
    /// Creates a clock whose origin is now.
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
        }
    }
}

impl Default for SystemClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for SystemClock {
    fn now_ms(&self) -> u64 {
        duration_ms(
            self.origin
                .elapsed(),
        )
    }

    fn sleep_ms(&self, ms: u64) {
        std::thread::sleep(Duration::from_millis(ms));
    }
}

/// Modem control line used to drive the sensor's reset pin.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "lowercase"))]
pub enum ResetLine {
    /// Data Terminal Ready.
    Dtr,
    /// Request To Send.
    Rts,
}

impl ResetLine {
    /// Parses a line name (case-insensitive).
    pub fn from_name(name: &str) -> Option<Self> {
        match name
            .to_ascii_lowercase()
            .as_str()
        {
            "dtr" => Some(Self::Dtr),
            "rts" => Some(Self::Rts),
            _ => None,
        }
    }
}

impl fmt::Display for ResetLine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Dtr => write!(f, "DTR"),
            Self::Rts => write!(f, "RTS"),
        }
    }
}

/// Control over the modem lines and break condition of a serial link.
pub trait LineControl {
    /// Drives `line` to `level` (`true` asserts it).
    fn set_line(&mut self, line: ResetLine, level: bool) -> Result<()>;

    /// Starts (`true`) or ends (`false`) a break condition.
    fn set_break(&mut self, active: bool) -> Result<()>;
}

/// Trait for listing available serial ports.
///
/// This is separated from `Transport` because it's a static operation that
/// doesn't require an open port instance.
pub trait PortEnumerator {
    /// List all available serial ports.
    fn list_ports() -> Result<Vec<PortInfo>>;

    /// Find ports matching the given VID/PID.
    fn find_by_vid_pid(vid: u16, pid: u16) -> Result<Vec<PortInfo>> {
        let ports = Self::list_ports()?;
        Ok(ports
            .into_iter()
            .filter(|p| p.vid == Some(vid) && p.pid == Some(pid))
            .collect())
    }
}

#[cfg(feature = "native")]
pub use native::{NativePort, NativePortEnumerator};
