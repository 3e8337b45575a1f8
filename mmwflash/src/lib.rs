//! # mmwflash
//!
//! A library for flashing TI mmWave radar sensors through their ROM serial
//! bootloader.
//!
//! This crate provides the host side of the bootloader protocol, including:
//!
//! - Packet framing with the 8-bit additive checksum
//! - ACK/NACK handshaking and bounded response timeouts
//! - Bootloader commands (ping, version, erase, download, close)
//! - A flash orchestrator with progress and status reporting
//! - Firmware image header validation
//!
//! ## Supported Parts
//!
//! - xWR68xx (IWR6843, IWR6843AOP; primary support)
//! - xWR12xx, xWR14xx, xWR16xx, xWR18xx
//!
//! ## Features
//!
//! - `native` (default): Serial port support via the `serialport` crate
//! - `serde`: Serialization support for data types
//!
//! ## Example
//!
//! ```rust,no_run
//! use mmwflash::{FlashOptions, Flasher, PartFamily, SerialConfig};
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let firmware = std::fs::read("xwr68xx_mmw_demo.bin")?;
//!
//!     #[cfg(feature = "native")]
//!     {
//!         let config = SerialConfig::new("/dev/ttyUSB0", 115200);
//!         let flasher = Flasher::open(&config)?
//!             .with_options(FlashOptions::default().with_part(Some(PartFamily::Xwr68)));
//!
//!         flasher.start_flash_procedure(&firmware)?;
//!         println!("Status: {:?}", flasher.last_status());
//!     }
//!
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod error;
pub mod image;
pub mod port;
pub mod protocol;
pub mod target;

// Re-exports for convenience
#[cfg(feature = "native")]
pub use port::{NativePort, NativePortEnumerator};
pub use {
    error::{Error, Result},
    image::{ImageInfo, MAX_IMAGE_SIZE, inspect},
    port::{
        Clock, LineControl, PortEnumerator, PortInfo, ResetLine, SerialConfig, SystemClock,
        Transport,
    },
    protocol::{
        Bootloader, BootloaderVersion, CommandFrame, FileType, Link, LinkConfig, Opcode,
        StorageType,
    },
    target::{
        FlashObserver, FlashOptions, FlashState, Flasher, PartFamily, SessionReport,
        SiliconRevision, is_supported_part_number,
    },
};
