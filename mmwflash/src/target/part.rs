//! mmWave part catalogue.
//!
//! Part numbers look like `IWR6843` or `AWR1642`: a vendor letter, `WR`,
//! then the family digits. Only the family matters to the bootloader.

use std::fmt;

use crate::protocol::bootloader::BootloaderVersion;

/// Supported part families.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "lowercase"))]
pub enum PartFamily {
    /// xWR12xx.
    Xwr12,
    /// xWR14xx.
    Xwr14,
    /// xWR16xx.
    Xwr16,
    /// xWR18xx.
    Xwr18,
    /// xWR68xx (IWR6843, IWR6843AOP).
    #[default]
    Xwr68,
}

impl PartFamily {
    /// All part families.
    pub const ALL: [Self; 5] = [Self::Xwr12, Self::Xwr14, Self::Xwr16, Self::Xwr18, Self::Xwr68];

    /// Family key used in part numbers, e.g. `WR68`.
    pub fn key(self) -> &'static str {
        match self {
            Self::Xwr12 => "WR12",
            Self::Xwr14 => "WR14",
            Self::Xwr16 => "WR16",
            Self::Xwr18 => "WR18",
            Self::Xwr68 => "WR68",
        }
    }

    /// Parse a part number such as `IWR6843AOP`, `awr1642` or `xWR18`.
    pub fn from_part_number(part: &str) -> Option<Self> {
        let key = part
            .get(1..5)?
            .to_ascii_uppercase();
        Self::ALL
            .into_iter()
            .find(|f| f.key() == key)
    }

    /// Parts whose pre-PG3 ROM takes raw RadarSS/MSS/calibration images
    /// instead of meta images.
    pub fn uses_legacy_file_format(self) -> bool {
        matches!(self, Self::Xwr12 | Self::Xwr14)
    }

    /// Parts whose file slot always follows the requested order.
    pub fn uses_ordered_meta_images(self) -> bool {
        self == Self::Xwr16
    }
}

impl fmt::Display for PartFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "x{}xx", self.key())
    }
}

/// Returns whether `part` names an AWR or IWR part of a known family.
pub fn is_supported_part_number(part: &str) -> bool {
    let vendor = part
        .get(..1)
        .map(str::to_ascii_uppercase);
    matches!(vendor.as_deref(), Some("A" | "I")) && PartFamily::from_part_number(part).is_some()
}

/// Silicon revision class, as far as the bootloader cares.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum SiliconRevision {
    /// PG1/PG2 silicon of xWR12/xWR14.
    PrePg3,
    /// PG3 or later.
    #[default]
    Pg3OrLater,
}

impl SiliconRevision {
    /// Derive the revision from the ROM version.
    pub fn from_version(version: &BootloaderVersion) -> Self {
        if version.is_pre_pg3() {
            Self::PrePg3
        } else {
            Self::Pg3OrLater
        }
    }
}

impl fmt::Display for SiliconRevision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::PrePg3 => write!(f, "pre-PG3"),
            Self::Pg3OrLater => write!(f, "PG3 or later"),
        }
    }
}
