//! Firmware image header validation.
//!
//! The first four bytes of an image, read little-endian, identify its kind:
//!
//! | Header       | Kind                              |
//! |--------------|-----------------------------------|
//! | `0x5254534D` | Meta image (`"MSTR"`)             |
//! | `0xB5500000` | RadarSS build (legacy xWR12/14)   |
//! | `0x35500000` | MSS build (legacy xWR12/14)       |
//! | `0xCA11BDA7` | Calibration data (legacy xWR12/14)|
//! | `0xC0F1618F` | Config info (legacy xWR12/14)     |

use byteorder::{ByteOrder, LittleEndian};
use log::{info, warn};

use crate::error::{Error, Result};
use crate::protocol::command::FileType;
use crate::target::part::{PartFamily, SiliconRevision};

/// Meta image magic, `"MSTR"` in little-endian.
pub const META_IMAGE_MAGIC: u32 = 0x5254_534D;

/// Size limit for images; the bootloader only accepts smaller ones.
pub const MAX_IMAGE_SIZE: usize = 1024 * 1024;

/// Bytes needed to identify an image.
pub const HEADER_SIZE: usize = 4;

/// Headers of the legacy raw image format, in table order.
const LEGACY_HEADERS: [(u32, FileType); 4] = [
    (0xB550_0000, FileType::RadarssBuild),
    (0x3550_0000, FileType::MssBuild),
    (0xCA11_BDA7, FileType::CalibData),
    (0xC0F1_618F, FileType::ConfigInfo),
];

/// Only the build images may carry version bits in the low 20 bits.
const LEGACY_MASKABLE: usize = 2;

const LEGACY_MASK: u32 = 0xFFF0_0000;

/// Result of inspecting an image.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct ImageInfo {
    /// Raw header word.
    pub header: u32,
    /// File type the image should be downloaded as.
    pub file_type: FileType,
    /// Image size in bytes.
    pub size: usize,
}

/// Read the header word of `data`.
pub fn read_header(data: &[u8]) -> Result<u32> {
    let bytes = data
        .get(..HEADER_SIZE)
        .ok_or_else(|| {
            Error::InvalidImage(format!("image too small: {} bytes", data.len()))
        })?;
    Ok(LittleEndian::read_u32(bytes))
}

/// Check size limits shared by every image.
pub fn check_size(data: &[u8]) -> Result<()> {
    if data.is_empty() {
        return Err(Error::InvalidImage("image is empty".into()));
    }
    if data.len() >= MAX_IMAGE_SIZE {
        return Err(Error::InvalidImage(format!(
            "image is {} bytes, must be below {MAX_IMAGE_SIZE}",
            data.len()
        )));
    }
    Ok(())
}

/// Validate `data` for `part` and work out its file type.
///
/// `order` selects the meta image slot (1-4) where the part uses slots.
pub fn inspect(
    data: &[u8],
    part: PartFamily,
    revision: SiliconRevision,
    order: u8,
) -> Result<ImageInfo> {
    check_size(data)?;
    let header = read_header(data)?;
    let legacy = revision == SiliconRevision::PrePg3 && part.uses_legacy_file_format();

    let file_type = if legacy {
        legacy_file_type(header, part)?
    } else if header == META_IMAGE_MAGIC {
        if part.uses_ordered_meta_images() || revision == SiliconRevision::Pg3OrLater {
            FileType::meta_image(order).ok_or_else(|| {
                Error::InvalidImage(format!("meta image order {order} is not in 1-4"))
            })?
        } else {
            FileType::MetaImage1
        }
    } else {
        warn!("Header 0x{header:08X} is not a valid image for {part}");
        return Err(Error::InvalidImage(format!(
            "header 0x{header:08X} is not valid for {part} ({revision})"
        )));
    };

    info!("{part} device, file type {file_type} detected");
    Ok(ImageInfo {
        header,
        file_type,
        size: data.len(),
    })
}

fn legacy_file_type(header: u32, part: PartFamily) -> Result<FileType> {
    if let Some(&(_, file_type)) = LEGACY_HEADERS
        .iter()
        .find(|(h, _)| *h == header)
    {
        return Ok(file_type);
    }
    let masked = header & LEGACY_MASK;
    LEGACY_HEADERS[..LEGACY_MASKABLE]
        .iter()
        .find(|(h, _)| *h == masked)
        .map(|&(_, file_type)| file_type)
        .ok_or_else(|| {
            warn!("Header 0x{header:08X} is not a valid image for {part}");
            Error::InvalidImage(format!(
                "header 0x{header:08X} is not valid for pre-PG3 {part}"
            ))
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn image(header: u32, len: usize) -> Vec<u8> {
        let mut data = header
            .to_le_bytes()
            .to_vec();
        data.resize(len, 0xFF);
        data
    }

    #[test]
    fn test_meta_image_for_xwr68() {
        let data = image(META_IMAGE_MAGIC, 64);
        assert_eq!(&data[..4], b"MSTR");
        let info = inspect(&data, PartFamily::Xwr68, SiliconRevision::Pg3OrLater, 1).unwrap();
        assert_eq!(info.file_type, FileType::MetaImage1);
        assert_eq!(info.size, 64);
        assert_eq!(info.header, META_IMAGE_MAGIC);
    }

    #[test]
    fn test_meta_image_order_selects_slot() {
        let data = image(META_IMAGE_MAGIC, 16);
        let info = inspect(&data, PartFamily::Xwr68, SiliconRevision::Pg3OrLater, 3).unwrap();
        assert_eq!(info.file_type, FileType::MetaImage3);
        assert!(inspect(&data, PartFamily::Xwr68, SiliconRevision::Pg3OrLater, 0).is_err());
        assert!(inspect(&data, PartFamily::Xwr68, SiliconRevision::Pg3OrLater, 5).is_err());
    }

    #[test]
    fn test_pre_pg3_xwr18_always_first_slot() {
        let data = image(META_IMAGE_MAGIC, 16);
        let info = inspect(&data, PartFamily::Xwr18, SiliconRevision::PrePg3, 2).unwrap();
        assert_eq!(info.file_type, FileType::MetaImage1);

        let info = inspect(&data, PartFamily::Xwr16, SiliconRevision::PrePg3, 2).unwrap();
        assert_eq!(info.file_type, FileType::MetaImage2);
    }

    #[test]
    fn test_legacy_headers() {
        let data = image(0xCA11_BDA7, 16);
        let info = inspect(&data, PartFamily::Xwr14, SiliconRevision::PrePg3, 1).unwrap();
        assert_eq!(info.file_type, FileType::CalibData);

        let data = image(0x3550_1234, 16);
        let info = inspect(&data, PartFamily::Xwr12, SiliconRevision::PrePg3, 1).unwrap();
        assert_eq!(info.file_type, FileType::MssBuild);

        let data = image(0xC0F1_0000, 16);
        assert!(inspect(&data, PartFamily::Xwr12, SiliconRevision::PrePg3, 1).is_err());
    }

    #[test]
    fn test_legacy_part_after_pg3_needs_meta_image() {
        let data = image(0xB550_0000, 16);
        assert!(inspect(&data, PartFamily::Xwr14, SiliconRevision::Pg3OrLater, 1).is_err());
    }

    #[test]
    fn test_unknown_header_rejected() {
        let data = image(0xDEAD_BEEF, 16);
        assert!(matches!(
            inspect(&data, PartFamily::Xwr68, SiliconRevision::Pg3OrLater, 1),
            Err(Error::InvalidImage(_))
        ));
    }

    #[test]
    fn test_size_limits() {
        assert!(inspect(&[], PartFamily::Xwr68, SiliconRevision::Pg3OrLater, 1).is_err());
        assert!(inspect(&[0x4D, 0x53], PartFamily::Xwr68, SiliconRevision::Pg3OrLater, 1).is_err());
        let data = image(META_IMAGE_MAGIC, MAX_IMAGE_SIZE + 1);
        assert!(inspect(&data, PartFamily::Xwr68, SiliconRevision::Pg3OrLater, 1).is_err());
        let data = image(META_IMAGE_MAGIC, MAX_IMAGE_SIZE - 1);
        assert!(inspect(&data, PartFamily::Xwr68, SiliconRevision::Pg3OrLater, 1).is_ok());
    }

    #[test]
    fn test_exactly_one_mebibyte_rejected() {
        assert!(matches!(
            check_size(&vec![0u8; MAX_IMAGE_SIZE]),
            Err(Error::InvalidImage(_))
        ));
        assert!(check_size(&vec![0u8; MAX_IMAGE_SIZE - 1]).is_ok());
    }
}
