//! mmwflash CLI - Command-line tool for flashing TI mmWave radar sensors.
//!
//! ## Features
//!
//! - Flash firmware images through the ROM serial bootloader
//! - Erase storage and query the bootloader version
//! - Reset the sensor over a modem control line
//! - Inspect image headers offline
//! - Interactive serial port selection
//! - Shell completion generation
//! - Environment variable and config file support

use anyhow::Result;
use clap::{Args, Parser, Subcommand};
use clap_complete::Shell;
use console::style;
use env_logger::Env;
use log::debug;
use mmwflash::{FileType, PartFamily, ResetLine, StorageType};
use std::env;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::atomic::{AtomicBool, Ordering};

mod commands;
mod config;
mod serial;

use commands::{completions, flash, info};
use config::Config;
use serial::{SerialOptions, select_serial_port};

/// Whether stderr is a terminal (set once at startup).
static STDERR_IS_TTY: AtomicBool = AtomicBool::new(true);

/// Check if emoji/animations should be used (TTY and colors enabled).
fn use_fancy_output() -> bool {
    STDERR_IS_TTY.load(Ordering::Relaxed) && console::colors_enabled_stderr()
}

/// mmwflash - Flash TI mmWave radar sensors over the ROM serial bootloader.
///
/// Environment variables:
///   MMWFLASH_PORT              - Default serial port
///   MMWFLASH_BAUD              - Default baud rate (default: 115200)
///   MMWFLASH_RESET_LINE        - Reset line (dtr, rts)
///   MMWFLASH_NON_INTERACTIVE   - Non-interactive mode (disable prompts)
#[derive(Parser, Debug)]
#[command(name = "mmwflash")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
#[command(after_help = "Examples:\n  mmwflash -p /dev/ttyUSB0 flash xwr68xx_mmw_demo.bin\n  mmwflash info --part IWR6843 firmware.bin")]
struct Cli {
    /// Serial port to use (auto-detected if not specified).
    #[arg(short, long, global = true, env = "MMWFLASH_PORT")]
    port: Option<String>,

    /// Baud rate of the bootloader UART.
    #[arg(short, long, global = true, env = "MMWFLASH_BAUD")]
    baud: Option<u32>,

    /// Modem line wired to the sensor reset pin (dtr, rts).
    #[arg(long, global = true, env = "MMWFLASH_RESET_LINE", value_parser = parse_reset_line)]
    reset_line: Option<ResetLine>,

    /// Verbose output level (-v, -vv, -vvv for increasing detail).
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Quiet mode (suppress non-essential output).
    #[arg(short, long, global = true)]
    quiet: bool,

    /// Non-interactive mode (fail instead of prompting).
    #[arg(long, global = true, env = "MMWFLASH_NON_INTERACTIVE")]
    non_interactive: bool,

    /// Path to a configuration file.
    #[arg(long = "config", global = true, value_name = "PATH")]
    config_path: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

/// Arguments of the flash command.
#[derive(Args, Debug)]
struct FlashArgs {
    /// Path to the firmware image.
    firmware: PathBuf,

    /// Target storage (SFLASH, SRAM, ...).
    #[arg(long, value_parser = parse_storage)]
    storage: Option<StorageType>,

    /// File type to announce; the header decides it unless the check is skipped.
    #[arg(long, value_parser = parse_file_type, requires = "skip_header_check")]
    file_type: Option<FileType>,

    /// Do not erase storage before downloading.
    #[arg(long)]
    no_format: bool,

    /// Part number or family used for the header check (e.g. IWR6843).
    #[arg(long, value_parser = parse_part)]
    part: Option<PartFamily>,

    /// Meta image slot (1-4).
    #[arg(long, default_value = "1", value_parser = clap::value_parser!(u8).range(1..=4))]
    file_order: u8,

    /// Do not validate the image header.
    #[arg(long)]
    skip_header_check: bool,

    /// Pulse the reset line after flashing.
    #[arg(long)]
    reset: bool,
}

/// Available commands.
#[derive(Subcommand, Debug)]
enum Commands {
    /// Flash a firmware image.
    Flash(FlashArgs),

    /// Erase storage.
    Erase {
        /// Storage to erase.
        #[arg(long, value_parser = parse_storage)]
        storage: Option<StorageType>,

        /// Confirm the erase.
        #[arg(long)]
        yes: bool,
    },

    /// Read the bootloader version.
    Version,

    /// Reset the sensor.
    Reset {
        /// Send a UART break instead of pulsing the reset line.
        #[arg(long = "break")]
        use_break: bool,
    },

    /// Show information about a firmware image.
    Info {
        /// Path to the firmware image.
        firmware: PathBuf,

        /// Part number or family to check against.
        #[arg(long, value_parser = parse_part)]
        part: Option<PartFamily>,

        /// Check against pre-PG3 silicon rules.
        #[arg(long)]
        pre_pg3: bool,

        /// Meta image slot (1-4).
        #[arg(long, default_value = "1", value_parser = clap::value_parser!(u8).range(1..=4))]
        file_order: u8,

        /// Output information as JSON to stdout.
        #[arg(long)]
        json: bool,
    },

    /// List available serial ports.
    ListPorts {
        /// Output port list as JSON to stdout.
        #[arg(long)]
        json: bool,

        /// Only list XDS110 debug probe ports.
        #[arg(long)]
        xds110: bool,
    },

    /// Generate shell completion scripts.
    Completions {
        /// Shell type.
        #[arg(value_enum)]
        shell: Shell,
    },
}

/// Errors that map to dedicated exit codes.
#[derive(Debug, thiserror::Error)]
pub enum CliError {
    /// Invalid invocation or missing input.
    #[error("{0}")]
    Usage(String),
    /// Unreadable or malformed configuration.
    #[error("{0}")]
    Config(String),
    /// Cancelled by the user.
    #[error("{0}")]
    Cancelled(String),
}

impl CliError {
    fn exit_code(&self) -> u8 {
        match self {
            Self::Usage(_) => 2,
            Self::Config(_) => 3,
            Self::Cancelled(_) => 130,
        }
    }
}

/// Exit code for a failed run.
fn exit_code(err: &anyhow::Error) -> u8 {
    if let Some(cli_err) = err.downcast_ref::<CliError>() {
        return cli_err.exit_code();
    }
    let device_missing = err
        .chain()
        .filter_map(|e| e.downcast_ref::<mmwflash::Error>())
        .any(mmwflash::Error::is_device_missing);
    if device_missing { 4 } else { 1 }
}

fn parse_storage(s: &str) -> Result<StorageType, String> {
    StorageType::from_name(s).ok_or_else(|| {
        let names: Vec<_> = StorageType::ALL
            .iter()
            .map(|t| t.name())
            .collect();
        format!("unknown storage '{s}' (expected one of {})", names.join(", "))
    })
}

fn parse_file_type(s: &str) -> Result<FileType, String> {
    FileType::from_name(s).ok_or_else(|| {
        let names: Vec<_> = FileType::ALL
            .iter()
            .map(|t| t.name())
            .collect();
        format!("unknown file type '{s}' (expected one of {})", names.join(", "))
    })
}

fn parse_part(s: &str) -> Result<PartFamily, String> {
    PartFamily::from_part_number(s)
        .ok_or_else(|| format!("unknown part '{s}' (e.g. IWR6843, AWR1642, xWR18)"))
}

fn parse_reset_line(s: &str) -> Result<ResetLine, String> {
    ResetLine::from_name(s).ok_or_else(|| format!("unknown reset line '{s}' (expected dtr or rts)"))
}

fn init_logging(cli: &Cli) {
    let log_level = if cli.quiet {
        "warn"
    } else {
        match cli.verbose {
            0 => "info",
            1 => "debug",
            _ => "trace",
        }
    };
    env_logger::Builder::from_env(Env::default().default_filter_or(log_level))
        .format_target(cli.verbose >= 2)
        .format_timestamp(if cli.verbose >= 2 {
            Some(env_logger::TimestampPrecision::Millis)
        } else {
            None
        })
        .init();
}

fn main() -> ExitCode {
    let stderr_is_tty = console::Term::stderr().is_term();
    STDERR_IS_TTY.store(stderr_is_tty, Ordering::Relaxed);

    if env::var("NO_COLOR").is_ok() || !stderr_is_tty {
        console::set_colors_enabled(false);
        console::set_colors_enabled_stderr(false);
    }

    let cli = Cli::parse();
    init_logging(&cli);

    debug!(
        "mmwflash v{} (verbose level: {})",
        env!("CARGO_PKG_VERSION"),
        cli.verbose
    );

    match run(&cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("{} {err:#}", style("Error:").red().bold());
            ExitCode::from(exit_code(&err))
        },
    }
}

fn run(cli: &Cli) -> Result<()> {
    let config = if let Some(ref path) = cli.config_path {
        Config::load_from_path(path)?
    } else {
        Config::load()
    };

    match &cli.command {
        Commands::Flash(args) => flash::cmd_flash(cli, &config, args),
        Commands::Erase { storage, yes } => flash::cmd_erase(cli, &config, *storage, *yes),
        Commands::Version => flash::cmd_version(cli, &config),
        Commands::Reset { use_break } => flash::cmd_reset(cli, &config, *use_break),
        Commands::Info {
            firmware,
            part,
            pre_pg3,
            file_order,
            json,
        } => info::cmd_info(
            &config,
            firmware,
            &info::InfoOptions {
                part: *part,
                pre_pg3: *pre_pg3,
                file_order: *file_order,
                json: *json,
            },
        ),
        Commands::ListPorts { json, xds110 } => info::cmd_list_ports(*json, *xds110),
        Commands::Completions { shell } => {
            completions::cmd_completions(*shell);
            Ok(())
        },
    }
}

/// Get serial port from CLI args, config or interactive selection.
fn get_port(cli: &Cli, config: &Config) -> Result<String> {
    let options = SerialOptions {
        port: cli.port.clone(),
        non_interactive: cli.non_interactive,
    };
    select_serial_port(&options, config)
}

#[cfg(test)]
mod cli_tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_command_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_cli_parse_flash() {
        let cli = Cli::try_parse_from([
            "mmwflash",
            "--port",
            "/dev/ttyUSB0",
            "--baud",
            "921600",
            "flash",
            "firmware.bin",
        ])
        .unwrap();
        assert_eq!(cli.port.as_deref(), Some("/dev/ttyUSB0"));
        assert_eq!(cli.baud, Some(921600));
        let Commands::Flash(args) = cli.command else {
            panic!("Expected Flash command");
        };
        assert_eq!(args.firmware.to_str().unwrap(), "firmware.bin");
        assert_eq!(args.file_order, 1);
        assert!(args.storage.is_none());
        assert!(!args.no_format);
    }

    #[test]
    fn test_cli_parse_flash_with_all_options() {
        let cli = Cli::try_parse_from([
            "mmwflash",
            "flash",
            "fw.bin",
            "--storage",
            "sram",
            "--file-type",
            "meta_image2",
            "--no-format",
            "--part",
            "IWR1843",
            "--file-order",
            "3",
            "--skip-header-check",
            "--reset",
        ])
        .unwrap();
        let Commands::Flash(args) = cli.command else {
            panic!("Expected Flash command");
        };
        assert_eq!(args.storage, Some(StorageType::Sram));
        assert_eq!(args.file_type, Some(FileType::MetaImage2));
        assert!(args.no_format);
        assert_eq!(args.part, Some(PartFamily::Xwr18));
        assert_eq!(args.file_order, 3);
        assert!(args.skip_header_check);
        assert!(args.reset);
    }

    #[test]
    fn test_cli_rejects_bad_values() {
        assert!(Cli::try_parse_from(["mmwflash", "flash", "fw.bin", "--file-order", "5"]).is_err());
        assert!(Cli::try_parse_from(["mmwflash", "flash", "fw.bin", "--storage", "tape"]).is_err());
        assert!(
            Cli::try_parse_from(["mmwflash", "flash", "fw.bin", "--part", "CC2652"]).is_err()
        );
        assert!(Cli::try_parse_from(["mmwflash", "--reset-line", "cts", "reset"]).is_err());
    }

    #[test]
    fn test_file_type_requires_skip_header_check() {
        let err = Cli::try_parse_from(["mmwflash", "flash", "fw.bin", "--file-type", "MSS_BUILD"])
            .unwrap_err();
        assert_eq!(err.kind(), clap::error::ErrorKind::MissingRequiredArgument);
    }

    #[test]
    fn test_cli_parse_erase() {
        let cli =
            Cli::try_parse_from(["mmwflash", "erase", "--storage", "SFLASH", "--yes"]).unwrap();
        let Commands::Erase { storage, yes } = cli.command else {
            panic!("Expected Erase command");
        };
        assert_eq!(storage, Some(StorageType::Sflash));
        assert!(yes);
    }

    #[test]
    fn test_cli_parse_reset_break() {
        let cli = Cli::try_parse_from(["mmwflash", "--reset-line", "RTS", "reset", "--break"])
            .unwrap();
        assert_eq!(cli.reset_line, Some(ResetLine::Rts));
        assert!(matches!(cli.command, Commands::Reset { use_break: true }));
    }

    #[test]
    fn test_cli_parse_info_json() {
        let cli = Cli::try_parse_from(["mmwflash", "info", "--json", "--pre-pg3", "firmware.bin"])
            .unwrap();
        assert!(matches!(
            cli.command,
            Commands::Info {
                json: true,
                pre_pg3: true,
                ..
            }
        ));
    }

    #[test]
    fn test_cli_parse_list_ports() {
        let cli = Cli::try_parse_from(["mmwflash", "list-ports"]).unwrap();
        assert!(matches!(
            cli.command,
            Commands::ListPorts {
                json: false,
                xds110: false
            }
        ));

        let cli = Cli::try_parse_from(["mmwflash", "list-ports", "--xds110", "--json"]).unwrap();
        assert!(matches!(
            cli.command,
            Commands::ListPorts {
                json: true,
                xds110: true
            }
        ));
    }

    #[test]
    fn test_cli_parse_completions() {
        let cli = Cli::try_parse_from(["mmwflash", "completions", "zsh"]).unwrap();
        assert!(matches!(
            cli.command,
            Commands::Completions { shell: Shell::Zsh }
        ));
    }

    #[test]
    fn test_cli_default_values() {
        let cli = Cli::try_parse_from(["mmwflash", "version"]).unwrap();
        assert!(cli.baud.is_none());
        assert!(cli.reset_line.is_none());
        assert!(!cli.quiet);
        assert!(!cli.non_interactive);
        assert!(cli.config_path.is_none());
        assert_eq!(cli.verbose, 0);
    }

    #[test]
    fn test_cli_missing_subcommand() {
        assert!(Cli::try_parse_from(["mmwflash"]).is_err());
    }

    #[test]
    fn test_exit_codes() {
        let usage: anyhow::Error = CliError::Usage("bad".into()).into();
        assert_eq!(exit_code(&usage), 2);
        let config: anyhow::Error = CliError::Config("bad".into()).into();
        assert_eq!(exit_code(&config), 3);
        let cancelled: anyhow::Error = CliError::Cancelled("stop".into()).into();
        assert_eq!(exit_code(&cancelled), 130);

        let missing = anyhow::Error::new(mmwflash::Error::ConnectFailed {
            attempts: 3,
            source: Box::new(mmwflash::Error::AckTimeout),
        })
        .context("Flash failed");
        assert_eq!(exit_code(&missing), 4);

        assert_eq!(exit_code(&anyhow::anyhow!("other")), 1);
    }
}
