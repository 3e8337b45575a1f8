//! Firmware info and port listing command implementations.

use {
    anyhow::{Context, Result},
    console::style,
    mmwflash::{
        ImageInfo, NativePortEnumerator, PartFamily, PortEnumerator, SiliconRevision,
        port::{XDS110_PID, XDS110_VID},
    },
    std::{fs, path::Path},
};

use crate::{config::Config, serial::describe_port};

/// Options of the info command.
#[derive(Debug, Clone, Copy)]
pub(crate) struct InfoOptions {
    /// Part family; falls back to the config file, then xWR68xx.
    pub part: Option<PartFamily>,
    /// Apply pre-PG3 rules.
    pub pre_pg3: bool,
    /// Meta image slot.
    pub file_order: u8,
    /// JSON output on stdout.
    pub json: bool,
}

/// List ports command implementation.
pub(crate) fn cmd_list_ports(json: bool, xds110: bool) -> Result<()> {
    let detected = if xds110 {
        NativePortEnumerator::find_by_vid_pid(XDS110_VID, XDS110_PID)?
    } else {
        NativePortEnumerator::list_ports()?
    };

    if json {
        let ports: Vec<serde_json::Value> = detected
            .iter()
            .map(|p| {
                serde_json::json!({
                    "name": p.name,
                    "vid": p.vid,
                    "pid": p.pid,
                    "manufacturer": p.manufacturer,
                    "product": p.product,
                    "serial": p.serial_number,
                })
            })
            .collect();
        let output = serde_json::json!({
            "ok": true,
            "data": {
                "ports": ports,
            }
        });
        println!("{}", serde_json::to_string_pretty(&output)?);
        return Ok(());
    }

    eprintln!(
        "{}",
        style("Available serial ports:")
            .bold()
            .underlined()
    );

    if detected.is_empty() {
        eprintln!("  {}", style("No serial ports found").dim());
    } else {
        for port in &detected {
            eprintln!("  {} {}", style("•").green(), describe_port(port));
        }
    }

    Ok(())
}

fn inspect_file(
    firmware: &Path,
    part: PartFamily,
    revision: SiliconRevision,
    file_order: u8,
) -> Result<ImageInfo> {
    let data = fs::read(firmware)
        .with_context(|| format!("Failed to read firmware {}", firmware.display()))?;
    let info = mmwflash::inspect(&data, part, revision, file_order)
        .with_context(|| format!("{} is not a valid {part} image", firmware.display()))?;
    Ok(info)
}

fn info_json(
    firmware: &Path,
    part: PartFamily,
    revision: SiliconRevision,
    info: &ImageInfo,
) -> serde_json::Value {
    serde_json::json!({
        "ok": true,
        "data": {
            "path": firmware.display().to_string(),
            "part": part.to_string(),
            "revision": revision.to_string(),
            "header": format!("0x{:08X}", info.header),
            "file_type": info.file_type,
            "size": info.size,
        }
    })
}

/// Info command implementation.
pub(crate) fn cmd_info(config: &Config, firmware: &Path, options: &InfoOptions) -> Result<()> {
    let part = options
        .part
        .or(config.flash.part)
        .unwrap_or_default();
    let revision = if options.pre_pg3 {
        SiliconRevision::PrePg3
    } else {
        SiliconRevision::Pg3OrLater
    };

    let info = inspect_file(firmware, part, revision, options.file_order)?;

    if options.json {
        println!(
            "{}",
            serde_json::to_string_pretty(&info_json(firmware, part, revision, &info))?
        );
        return Ok(());
    }

    println!("{}", style("Firmware Information").bold().underlined());
    println!("  {:<10} {}", "File:", firmware.display());
    println!("  {:<10} {part} ({revision})", "Part:");
    println!("  {:<10} 0x{:08X}", "Header:", info.header);
    println!("  {:<10} {}", "File type:", style(info.file_type).cyan());
    println!("  {:<10} {} bytes", "Size:", info.size);

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use mmwflash::FileType;
    use mmwflash::image::META_IMAGE_MAGIC;
    use tempfile::tempdir;

    fn write_image(dir: &Path, header: u32, len: usize) -> std::path::PathBuf {
        let mut data = header
            .to_le_bytes()
            .to_vec();
        data.resize(len, 0);
        let path = dir.join("image.bin");
        fs::write(&path, data).unwrap();
        path
    }

    #[test]
    fn test_inspect_meta_image() {
        let dir = tempdir().unwrap();
        let path = write_image(dir.path(), META_IMAGE_MAGIC, 1024);
        let info = inspect_file(&path, PartFamily::Xwr68, SiliconRevision::Pg3OrLater, 2).unwrap();
        assert_eq!(info.file_type, FileType::MetaImage2);
        assert_eq!(info.size, 1024);
    }

    #[test]
    fn test_inspect_rejects_bad_header() {
        let dir = tempdir().unwrap();
        let path = write_image(dir.path(), 0xDEAD_BEEF, 64);
        let err =
            inspect_file(&path, PartFamily::Xwr68, SiliconRevision::Pg3OrLater, 1).unwrap_err();
        assert!(err.to_string().contains("not a valid xWR68xx image"));
    }

    #[test]
    fn test_inspect_missing_file() {
        let dir = tempdir().unwrap();
        let err = inspect_file(
            &dir.path().join("missing.bin"),
            PartFamily::Xwr68,
            SiliconRevision::Pg3OrLater,
            1,
        )
        .unwrap_err();
        assert!(err.to_string().contains("Failed to read firmware"));
    }

    #[test]
    fn test_info_json_shape() {
        let info = ImageInfo {
            header: 0xCA11_BDA7,
            file_type: FileType::CalibData,
            size: 16,
        };
        let value =
            info_json(Path::new("cal.bin"), PartFamily::Xwr14, SiliconRevision::PrePg3, &info);
        assert_eq!(value["ok"], true);
        assert_eq!(value["data"]["header"], "0xCA11BDA7");
        assert_eq!(value["data"]["file_type"], "CALIB_DATA");
        assert_eq!(value["data"]["part"], "xWR14xx");
        assert_eq!(value["data"]["revision"], "pre-PG3");
        assert_eq!(value["data"]["size"], 16);
    }
}
