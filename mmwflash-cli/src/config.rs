//! Configuration file support for mmwflash.
//!
//! Configuration is loaded from multiple sources with the following priority (highest first):
//! 1. Command-line arguments
//! 2. Environment variables (MMWFLASH_*)
//! 3. Local config file (./mmwflash.toml)
//! 4. Global config file (~/.config/mmwflash/config.toml)

use directories::ProjectDirs;
use log::{debug, warn};
use mmwflash::{FileType, PartFamily, ResetLine, StorageType};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::CliError;

/// Name of the per-project config file.
pub const LOCAL_CONFIG_FILE: &str = "mmwflash.toml";

/// Serial port configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PortConfig {
    /// Preferred serial port (e.g., "/dev/ttyUSB0" or "COM3").
    pub serial: Option<String>,
    /// Default baud rate.
    pub baud: Option<u32>,
    /// Modem line wired to the sensor reset pin.
    pub reset_line: Option<ResetLine>,
}

/// Flash configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FlashConfig {
    /// Target storage.
    pub storage: Option<StorageType>,
    /// File type announced to the bootloader.
    pub file_type: Option<FileType>,
    /// Part family used for the image header check.
    pub part: Option<PartFamily>,
    /// Skip the erase step.
    #[serde(default)]
    pub no_format: bool,
}

/// Link timing configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LinkSettings {
    /// Response timeout in milliseconds.
    pub response_timeout_ms: Option<u64>,
    /// ACK timeout in milliseconds.
    pub ack_timeout_ms: Option<u64>,
    /// Bytes per data chunk.
    pub chunk_size: Option<usize>,
    /// Ping attempts before giving up.
    pub connect_attempts: Option<usize>,
}

/// Main configuration structure.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Port configuration.
    #[serde(default)]
    pub port: PortConfig,
    /// Flash configuration.
    #[serde(default)]
    pub flash: FlashConfig,
    /// Link configuration.
    #[serde(default)]
    pub link: LinkSettings,
}

impl Config {
    /// Load configuration from the global and local config files.
    ///
    /// Files that cannot be read or parsed are skipped with a warning.
    pub fn load() -> Self {
        let mut config = Self::default();

        if let Some(global_path) = Self::global_config_path() {
            if let Some(global_config) = Self::load_lenient(&global_path) {
                debug!("Loaded global config from {}", global_path.display());
                config.merge(global_config);
            }
        }

        if let Some(local_config) = Self::load_lenient(Path::new(LOCAL_CONFIG_FILE)) {
            debug!("Loaded local config from {LOCAL_CONFIG_FILE}");
            config.merge(local_config);
        }

        config
    }

    /// Load configuration from a specific file path (--config flag).
    ///
    /// Unlike [`Config::load`], a missing or malformed file is an error.
    pub fn load_from_path(path: &Path) -> Result<Self, CliError> {
        let content = fs::read_to_string(path).map_err(|e| {
            CliError::Config(format!("cannot read {}: {e}", path.display()))
        })?;
        let config = toml::from_str(&content).map_err(|e| {
            CliError::Config(format!("invalid TOML in {}: {e}", path.display()))
        })?;
        debug!("Loaded config from {}", path.display());
        Ok(config)
    }

    fn load_lenient(path: &Path) -> Option<Self> {
        if !path.exists() {
            return None;
        }

        match fs::read_to_string(path) {
            Ok(content) => match toml::from_str(&content) {
                Ok(config) => Some(config),
                Err(e) => {
                    warn!("Failed to parse TOML config {}: {}", path.display(), e);
                    None
                },
            },
            Err(e) => {
                warn!("Failed to read config file {}: {}", path.display(), e);
                None
            },
        }
    }

    /// Get the global configuration directory.
    pub fn global_config_dir() -> Option<PathBuf> {
        ProjectDirs::from("", "", "mmwflash").map(|dirs| dirs.config_dir().to_path_buf())
    }

    /// Get the global configuration file path.
    pub fn global_config_path() -> Option<PathBuf> {
        Self::global_config_dir().map(|dir| dir.join("config.toml"))
    }

    /// Merge another config into this one. Values set in `other` win.
    fn merge(&mut self, other: Self) {
        let Self { port, flash, link } = other;

        if port.serial.is_some() {
            self.port.serial = port.serial;
        }
        if port.baud.is_some() {
            self.port.baud = port.baud;
        }
        if port.reset_line.is_some() {
            self.port.reset_line = port.reset_line;
        }

        if flash.storage.is_some() {
            self.flash.storage = flash.storage;
        }
        if flash.file_type.is_some() {
            self.flash.file_type = flash.file_type;
        }
        if flash.part.is_some() {
            self.flash.part = flash.part;
        }
        if flash.no_format {
            self.flash.no_format = true;
        }

        if link.response_timeout_ms.is_some() {
            self.link.response_timeout_ms = link.response_timeout_ms;
        }
        if link.ack_timeout_ms.is_some() {
            self.link.ack_timeout_ms = link.ack_timeout_ms;
        }
        if link.chunk_size.is_some() {
            self.link.chunk_size = link.chunk_size;
        }
        if link.connect_attempts.is_some() {
            self.link.connect_attempts = link.connect_attempts;
        }
    }
}
