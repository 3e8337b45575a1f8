//! mmWave serial bootloader protocol.
//!
//! Layered bottom-up: [`frame`] (envelope and checksum), [`link`] (packet
//! exchange with ACK and timeouts), [`command`] (opcodes and payloads) and
//! [`bootloader`] (command sequencing).

pub mod bootloader;
pub mod command;
pub mod frame;
pub mod link;

// Re-export common types
pub use bootloader::{Bootloader, BootloaderVersion};
pub use command::{CommandFrame, FileType, Opcode, StorageType};
pub use link::{Link, LinkConfig};
