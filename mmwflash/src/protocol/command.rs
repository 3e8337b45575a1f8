//! mmWave bootloader commands and their payload layouts.
//!
//! Every command payload starts with an opcode byte followed by big-endian
//! 32-bit arguments:
//!
//! ```text
//! +--------+-----------------------------+
//! | Opcode |  Arguments (u32 BE each)    |
//! +--------+-----------------------------+
//! |   1    |          variable           |
//! +--------+-----------------------------+
//! ```

use std::fmt;

use byteorder::{BigEndian, WriteBytesExt};

/// Bootloader opcodes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Opcode {
    /// Liveness probe (0x20).
    Ping = 0x20,
    /// Announce a file transfer (0x21).
    StartDownload = 0x21,
    /// Finish a file transfer (0x22).
    FileClose = 0x22,
    /// Fetch the status of the previous command (0x23).
    GetLastStatus = 0x23,
    /// Data chunk for non-volatile storage (0x24).
    SendData = 0x24,
    /// Data chunk for SRAM (0x26).
    SendDataRam = 0x26,
    /// Leave the bootloader (0x27).
    Disconnect = 0x27,
    /// Erase a storage region (0x28).
    Erase = 0x28,
    /// Erase a single file (0x2E).
    FileErase = 0x2E,
    /// Read the ROM version (0x2F).
    GetVersion = 0x2F,
}

impl Opcode {
    /// Looks up an opcode from its wire value.
    pub fn from_byte(byte: u8) -> Option<Self> {
        Some(match byte {
            0x20 => Self::Ping,
            0x21 => Self::StartDownload,
            0x22 => Self::FileClose,
            0x23 => Self::GetLastStatus,
            0x24 => Self::SendData,
            0x26 => Self::SendDataRam,
            0x27 => Self::Disconnect,
            0x28 => Self::Erase,
            0x2E => Self::FileErase,
            0x2F => Self::GetVersion,
            _ => return None,
        })
    }
}

/// Status byte reported for a successful command.
pub const RET_SUCCESS: u8 = 0x40;

/// Status byte reported while a flash access is still running.
pub const ACCESS_IN_PROGRESS: u8 = 0x4B;

/// Storage targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "SCREAMING_SNAKE_CASE"))]
#[repr(u32)]
pub enum StorageType {
    /// External SDRAM.
    Sdram = 0,
    /// Internal flash.
    Flash = 1,
    /// Serial flash, where application images live.
    #[default]
    Sflash = 2,
    /// EEPROM.
    Eeprom = 3,
    /// On-chip SRAM.
    Sram = 4,
}

impl StorageType {
    /// All storage targets.
    pub const ALL: [Self; 5] = [
        Self::Sdram,
        Self::Flash,
        Self::Sflash,
        Self::Eeprom,
        Self::Sram,
    ];

    /// Wire value.
    pub fn code(self) -> u32 {
        self as u32
    }

    /// Parse a storage name (case-insensitive).
    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|s| s.name().eq_ignore_ascii_case(name))
    }

    /// Canonical name.
    pub fn name(self) -> &'static str {
        match self {
            Self::Sdram => "SDRAM",
            Self::Flash => "FLASH",
            Self::Sflash => "SFLASH",
            Self::Eeprom => "EEPROM",
            Self::Sram => "SRAM",
        }
    }

    /// Chunks for SRAM use a different opcode and a 4-byte status.
    pub fn is_ram(self) -> bool {
        self == Self::Sram
    }
}

impl fmt::Display for StorageType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// File types understood by the bootloader.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "SCREAMING_SNAKE_CASE"))]
#[repr(u32)]
pub enum FileType {
    /// Radar subsystem firmware.
    RadarssBuild = 0,
    /// Calibration data.
    CalibData = 1,
    /// Configuration record.
    ConfigInfo = 2,
    /// Master subsystem firmware.
    MssBuild = 3,
    /// Meta image slot 1.
    #[default]
    MetaImage1 = 4,
    /// Meta image slot 2.
    MetaImage2 = 5,
    /// Meta image slot 3.
    MetaImage3 = 6,
    /// Meta image slot 4.
    MetaImage4 = 7,
}

impl FileType {
    /// All file types.
    pub const ALL: [Self; 8] = [
        Self::RadarssBuild,
        Self::CalibData,
        Self::ConfigInfo,
        Self::MssBuild,
        Self::MetaImage1,
        Self::MetaImage2,
        Self::MetaImage3,
        Self::MetaImage4,
    ];

    /// Wire value.
    pub fn code(self) -> u32 {
        self as u32
    }

    /// Meta image slot for `order` (1-4).
    pub fn meta_image(order: u8) -> Option<Self> {
        match order {
            1 => Some(Self::MetaImage1),
            2 => Some(Self::MetaImage2),
            3 => Some(Self::MetaImage3),
            4 => Some(Self::MetaImage4),
            _ => None,
        }
    }

    /// Parse a file type name (case-insensitive).
    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|t| t.name().eq_ignore_ascii_case(name))
    }

    /// Canonical name.
    pub fn name(self) -> &'static str {
        match self {
            Self::RadarssBuild => "RADARSS_BUILD",
            Self::CalibData => "CALIB_DATA",
            Self::ConfigInfo => "CONFIG_INFO",
            Self::MssBuild => "MSS_BUILD",
            Self::MetaImage1 => "META_IMAGE1",
            Self::MetaImage2 => "META_IMAGE2",
            Self::MetaImage3 => "META_IMAGE3",
            Self::MetaImage4 => "META_IMAGE4",
        }
    }
}

impl fmt::Display for FileType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Command payload builder.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandFrame {
    opcode: Opcode,
    data: Vec<u8>,
}

impl CommandFrame {
    /// Create a command with no arguments.
    pub fn new(opcode: Opcode) -> Self {
        Self {
            opcode,
            data: Vec::new(),
        }
    }

    /// Build ping command.
    pub fn ping() -> Self {
        Self::new(Opcode::Ping)
    }

    /// Build get version command.
    pub fn get_version() -> Self {
        Self::new(Opcode::GetVersion)
    }

    /// Build get last status command.
    pub fn get_last_status() -> Self {
        Self::new(Opcode::GetLastStatus)
    }

    /// Build erase command.
    ///
    /// Layout: opcode, storage(4), offset(4), capacity(4).
    #[allow(clippy::unwrap_used)] // Writing to Vec<u8> cannot fail
    pub fn erase(storage: StorageType, offset: u32, capacity: u32) -> Self {
        let mut frame = Self::new(Opcode::Erase);
        frame.data.write_u32::<BigEndian>(storage.code()).unwrap();
        frame.data.write_u32::<BigEndian>(offset).unwrap();
        frame.data.write_u32::<BigEndian>(capacity).unwrap();
        frame
    }

    /// Build start download command.
    ///
    /// Layout: opcode, file size(4), storage(4), file type(4), mirror(4).
    /// Mirroring is always disabled.
    #[allow(clippy::unwrap_used)] // Writing to Vec<u8> cannot fail
    pub fn start_download(file_size: u32, storage: StorageType, file_type: FileType) -> Self {
        let mut frame = Self::new(Opcode::StartDownload);
        frame.data.write_u32::<BigEndian>(file_size).unwrap();
        frame.data.write_u32::<BigEndian>(storage.code()).unwrap();
        frame.data.write_u32::<BigEndian>(file_type.code()).unwrap();
        frame.data.write_u32::<BigEndian>(0).unwrap();
        frame
    }

    /// Build a data chunk command for `storage`.
    pub fn send_data(chunk: &[u8], storage: StorageType) -> Self {
        let opcode = if storage.is_ram() {
            Opcode::SendDataRam
        } else {
            Opcode::SendData
        };
        Self {
            opcode,
            data: chunk.to_vec(),
        }
    }

    /// Build file close command.
    #[allow(clippy::unwrap_used)] // Writing to Vec<u8> cannot fail
    pub fn file_close(file_type: FileType) -> Self {
        let mut frame = Self::new(Opcode::FileClose);
        frame.data.write_u32::<BigEndian>(file_type.code()).unwrap();
        frame
    }

    /// Get the opcode.
    pub fn opcode(&self) -> Opcode {
        self.opcode
    }

    /// Get the argument bytes.
    pub fn data(&self) -> &[u8] {
        &self.data
    }

    /// Opcode followed by arguments, ready for framing.
    pub fn payload(&self) -> Vec<u8> {
        let mut payload = Vec::with_capacity(1 + self.data.len());
        payload.push(self.opcode as u8);
        payload.extend_from_slice(&self.data);
        payload
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ping_payload() {
        assert_eq!(CommandFrame::ping().payload(), vec![0x20]);
        assert_eq!(CommandFrame::get_version().payload(), vec![0x2F]);
        assert_eq!(CommandFrame::get_last_status().payload(), vec![0x23]);
    }

    #[test]
    fn test_erase_payload() {
        let payload = CommandFrame::erase(StorageType::Sflash, 0, 0).payload();
        assert_eq!(
            payload,
            vec![0x28, 0, 0, 0, 2, 0, 0, 0, 0, 0, 0, 0, 0]
        );
    }

    #[test]
    fn test_start_download_payload() {
        let frame =
            CommandFrame::start_download(0x0001_F400, StorageType::Sflash, FileType::MetaImage1);
        assert_eq!(
            frame.payload(),
            vec![0x21, 0x00, 0x01, 0xF4, 0x00, 0, 0, 0, 2, 0, 0, 0, 4, 0, 0, 0, 0]
        );
    }

    #[test]
    fn test_send_data_opcode_by_storage() {
        let flash = CommandFrame::send_data(&[1, 2, 3], StorageType::Sflash);
        assert_eq!(flash.payload(), vec![0x24, 1, 2, 3]);

        let ram = CommandFrame::send_data(&[1, 2, 3], StorageType::Sram);
        assert_eq!(ram.opcode(), Opcode::SendDataRam);
        assert_eq!(ram.data(), &[1, 2, 3]);
    }

    #[test]
    fn test_file_close_payload() {
        let payload = CommandFrame::file_close(FileType::MetaImage2).payload();
        assert_eq!(payload, vec![0x22, 0, 0, 0, 5]);
    }

    #[test]
    fn test_opcode_from_byte() {
        assert_eq!(Opcode::from_byte(0x28), Some(Opcode::Erase));
        assert_eq!(Opcode::from_byte(0x2E), Some(Opcode::FileErase));
        assert_eq!(Opcode::from_byte(0x25), None);
    }

    #[test]
    fn test_storage_type_names() {
        assert_eq!(StorageType::from_name("sflash"), Some(StorageType::Sflash));
        assert_eq!(StorageType::from_name("SRAM"), Some(StorageType::Sram));
        assert_eq!(StorageType::from_name("nand"), None);
        assert_eq!(StorageType::Eeprom.code(), 3);
        assert_eq!(StorageType::default(), StorageType::Sflash);
    }

    #[test]
    fn test_file_type_names() {
        assert_eq!(FileType::from_name("meta_image3"), Some(FileType::MetaImage3));
        assert_eq!(FileType::meta_image(4), Some(FileType::MetaImage4));
        assert_eq!(FileType::meta_image(5), None);
        assert_eq!(FileType::MssBuild.to_string(), "MSS_BUILD");
        assert_eq!(FileType::MetaImage4.code(), 7);
    }
}
