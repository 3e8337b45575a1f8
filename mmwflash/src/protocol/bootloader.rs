//! Command layer: drives bootloader commands over a [`Link`].
//!
//! Most commands follow the same exchange: send the command, wait for ACK,
//! ask for the last status and read it back. Erase and version query are
//! the exceptions.

use std::fmt;
use std::fmt::Write as _;

use log::{debug, info, trace};

use crate::error::Result;
use crate::port::{Clock, Transport};
use crate::protocol::command::{
    ACCESS_IN_PROGRESS, CommandFrame, FileType, RET_SUCCESS, StorageType,
};
use crate::protocol::link::Link;

/// Length of the GET_VERSION response payload.
pub const VERSION_RESPONSE_LEN: usize = 12;

/// Status response length for most commands.
const STATUS_LEN: usize = 1;

/// Status response length after an SRAM data chunk.
const RAM_STATUS_LEN: usize = 4;

/// ROM versions of silicon revisions before PG3.
const PRE_PG3_VERSIONS: [&str; 2] = ["07000600", "01000601"];

/// Raw bootloader version as reported by GET_VERSION.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BootloaderVersion {
    raw: Vec<u8>,
}

impl BootloaderVersion {
    /// Wrap a version payload.
    pub fn new(raw: Vec<u8>) -> Self {
        Self { raw }
    }

    /// Raw version bytes.
    pub fn raw(&self) -> &[u8] {
        &self.raw
    }

    /// First eight hex digits, identifying the ROM build.
    pub fn short_id(&self) -> String {
        let mut id = self.to_string();
        id.truncate(8);
        id
    }

    /// Returns whether this ROM belongs to a pre-PG3 silicon revision.
    pub fn is_pre_pg3(&self) -> bool {
        let id = self.short_id();
        PRE_PG3_VERSIONS.contains(&id.as_str())
    }
}

impl fmt::Display for BootloaderVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let hex = self
            .raw
            .iter()
            .fold(String::with_capacity(self.raw.len() * 2), |mut s, b| {
                let _ = write!(s, "{b:02x}");
                s
            });
        f.write_str(&hex)
    }
}

/// Bootloader command driver.
pub struct Bootloader<T: Transport, C: Clock> {
    link: Link<T, C>,
}

impl<T: Transport, C: Clock> Bootloader<T, C> {
    /// Wrap a link.
    pub fn new(link: Link<T, C>) -> Self {
        Self { link }
    }

    /// Get a reference to the underlying link.
    pub fn link(&self) -> &Link<T, C> {
        &self.link
    }

    /// Get a mutable reference to the underlying link.
    pub fn link_mut(&mut self) -> &mut Link<T, C> {
        &mut self.link
    }

    /// Consume the driver and return the link.
    pub fn into_link(self) -> Link<T, C> {
        self.link
    }

    /// Send a command, then poll its status.
    ///
    /// The status bytes are read and acknowledged but not interpreted.
    pub fn send_command(&mut self, frame: &CommandFrame, response_len: usize) -> Result<Vec<u8>> {
        trace!("Sending command {:?}", frame.opcode());
        self.link
            .send_packet(&frame.payload())?;
        self.link
            .read_ack()?;

        self.link
            .send_packet(&CommandFrame::get_last_status().payload())?;
        let status = self
            .link
            .receive_packet(response_len)?;
        match status.last() {
            Some(&RET_SUCCESS) => trace!("{:?} status: success", frame.opcode()),
            Some(&ACCESS_IN_PROGRESS) => trace!("{:?} status: access in progress", frame.opcode()),
            _ => trace!("{:?} status: {status:02X?}", frame.opcode()),
        }
        Ok(status)
    }

    /// Check that the bootloader is listening.
    pub fn ping(&mut self) -> Result<()> {
        self.send_command(&CommandFrame::ping(), STATUS_LEN)?;
        Ok(())
    }

    /// Read the ROM version.
    pub fn get_version(&mut self) -> Result<BootloaderVersion> {
        self.link
            .send_packet(&CommandFrame::get_version().payload())?;
        self.link
            .read_ack()?;
        let raw = self
            .link
            .receive_packet(VERSION_RESPONSE_LEN)?;
        let version = BootloaderVersion::new(raw);
        info!("Bootloader version: {version}");
        Ok(version)
    }

    /// Erase `capacity` bytes of `storage` from `offset` (0, 0 for all).
    pub fn erase(&mut self, storage: StorageType, offset: u32, capacity: u32) -> Result<()> {
        debug!("Erasing {storage} (offset={offset}, capacity={capacity})");
        self.link
            .send_packet(&CommandFrame::erase(storage, offset, capacity).payload())?;
        self.link
            .read_ack()
    }

    /// Announce a file of `file_size` bytes.
    pub fn start_download(
        &mut self,
        file_size: u32,
        storage: StorageType,
        file_type: FileType,
    ) -> Result<()> {
        debug!("Start download: {file_size} bytes, {file_type} -> {storage}");
        self.send_command(
            &CommandFrame::start_download(file_size, storage, file_type),
            STATUS_LEN,
        )?;
        Ok(())
    }

    /// Send one data chunk.
    pub fn send_data_chunk(&mut self, chunk: &[u8], storage: StorageType) -> Result<()> {
        let status_len = if storage.is_ram() {
            RAM_STATUS_LEN
        } else {
            STATUS_LEN
        };
        self.send_command(&CommandFrame::send_data(chunk, storage), status_len)?;
        Ok(())
    }

    /// Finish the current file.
    pub fn file_close(&mut self, file_type: FileType) -> Result<()> {
        debug!("Closing {file_type}");
        self.send_command(&CommandFrame::file_close(file_type), STATUS_LEN)?;
        Ok(())
    }
}
