//! Flash, erase, version and reset command implementations.

use anyhow::{Context, Result};
use console::style;
use dialoguer::{Confirm, theme::ColorfulTheme};
use indicatif::{ProgressBar, ProgressStyle};
use log::debug;
use mmwflash::port::DEFAULT_BAUD;
use mmwflash::{
    FlashObserver, FlashOptions, FlashState, Flasher, LinkConfig, NativePort, SerialConfig,
    SiliconRevision, StorageType,
};
use std::fs;
use std::io::IsTerminal;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use crate::config::Config;
use crate::serial::map_prompt_error;
use crate::{Cli, CliError, FlashArgs, get_port, use_fancy_output};

/// Feeds flasher notifications into a progress bar.
struct ProgressReporter {
    bar: ProgressBar,
    failed: AtomicBool,
}

impl ProgressReporter {
    fn new(bar: ProgressBar) -> Self {
        Self {
            bar,
            failed: AtomicBool::new(false),
        }
    }
}

impl FlashObserver for ProgressReporter {
    fn on_progress(&self, percent: u8) {
        self.bar
            .set_position(u64::from(percent));
    }

    fn on_status(&self, status: &str) {
        self.bar
            .set_message(status.to_string());
    }

    fn on_state(&self, state: FlashState) {
        match state {
            FlashState::Failed => self
                .failed
                .store(true, Ordering::Relaxed),
            FlashState::Idle => {
                if self
                    .failed
                    .load(Ordering::Relaxed)
                {
                    self.bar.abandon();
                } else {
                    self.bar.finish();
                }
            },
            _ => {},
        }
    }
}

fn progress_bar(cli: &Cli) -> ProgressBar {
    if cli.quiet || !use_fancy_output() {
        return ProgressBar::hidden();
    }
    let pb = ProgressBar::new(100);
    #[allow(clippy::unwrap_used)] // Static template string
    pb.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}% {msg}")
            .unwrap()
            .progress_chars("#>-"),
    );
    pb.set_draw_target(indicatif::ProgressDrawTarget::stderr());
    pb
}

fn spinner(cli: &Cli) -> ProgressBar {
    if cli.quiet || !use_fancy_output() {
        return ProgressBar::hidden();
    }
    let pb = ProgressBar::new_spinner();
    #[allow(clippy::unwrap_used)] // Static template string
    pb.set_style(
        ProgressStyle::default_spinner()
            .template("{spinner:.green} [{elapsed_precise}] {msg}")
            .unwrap(),
    );
    pb.enable_steady_tick(Duration::from_millis(100));
    pb
}

/// Options shared by every bootloader session.
fn base_options(config: &Config) -> FlashOptions {
    let mut options = FlashOptions::default();
    if let Some(chunk_size) = config.link.chunk_size {
        options = options.with_chunk_size(chunk_size);
    }
    if let Some(attempts) = config.link.connect_attempts {
        options = options.with_connect_attempts(attempts);
    }
    options
}

/// Resolve flash options from arguments, falling back to the config file.
fn flash_options(args: &FlashArgs, config: &Config) -> FlashOptions {
    let part = (!args.skip_header_check).then(|| {
        args.part
            .or(config.flash.part)
            .unwrap_or_default()
    });

    base_options(config)
        .with_storage(
            args.storage
                .or(config.flash.storage)
                .unwrap_or_default(),
        )
        .with_file_type(
            args.file_type
                .or(config.flash.file_type)
                .unwrap_or_default(),
        )
        .with_erase(!(args.no_format || config.flash.no_format))
        .with_part(part)
        .with_file_order(args.file_order)
}

fn link_config(config: &Config) -> LinkConfig {
    let mut link = LinkConfig::default();
    if let Some(ms) = config.link.response_timeout_ms {
        link = link.with_response_timeout(Duration::from_millis(ms));
    }
    if let Some(ms) = config.link.ack_timeout_ms {
        link = link.with_ack_timeout(Duration::from_millis(ms));
    }
    link
}

fn serial_config(cli: &Cli, config: &Config, port: String) -> SerialConfig {
    let baud = cli
        .baud
        .or(config.port.baud)
        .unwrap_or(DEFAULT_BAUD);
    SerialConfig::new(port, baud).with_reset_line(cli.reset_line.or(config.port.reset_line))
}

fn open_flasher(cli: &Cli, config: &Config, options: FlashOptions) -> Result<Flasher<NativePort>> {
    let port = get_port(cli, config)?;
    let serial = serial_config(cli, config, port);
    if !cli.quiet {
        eprintln!(
            "{} Using port {} at {} baud",
            style("🔌").cyan(),
            serial.port_name,
            serial.baud_rate
        );
    }

    let flasher = Flasher::open_with(&serial, link_config(config))
        .with_context(|| format!("Failed to open {}", serial.port_name))?;
    Ok(flasher.with_options(options))
}

/// Flash command implementation.
pub(crate) fn cmd_flash(cli: &Cli, config: &Config, args: &FlashArgs) -> Result<()> {
    if !cli.quiet {
        eprintln!(
            "{} Loading firmware: {}",
            style("📦").cyan(),
            args.firmware.display()
        );
    }

    let firmware = fs::read(&args.firmware)
        .with_context(|| format!("Failed to read firmware {}", args.firmware.display()))?;

    let options = flash_options(args, config);
    if !cli.quiet {
        let target = match options.part {
            Some(part) => format!("{part}, file type from header"),
            None => format!("file type {}", options.file_type),
        };
        eprintln!(
            "{} {} bytes to {} ({target})",
            style("ℹ").blue(),
            firmware.len(),
            options.storage
        );
    }

    let flasher =
        open_flasher(cli, config, options)?.with_observer(ProgressReporter::new(progress_bar(cli)));

    flasher
        .start_flash_procedure(&firmware)
        .context("Flashing failed")?;

    if let Some(version) = flasher
        .report()
        .version
    {
        debug!("Bootloader version {version}");
    }

    if args.reset {
        if !cli.quiet {
            eprintln!("{} Resetting sensor", style("🔄").cyan());
        }
        flasher
            .send_reset_signal()
            .context("Firmware flashed, but the sensor could not be reset")?;
    }

    if !cli.quiet {
        eprintln!("\n{} Flashing completed", style("🎉").green().bold());
    }

    Ok(())
}

fn confirm_erase(cli: &Cli, storage: StorageType, yes: bool) -> Result<()> {
    if yes {
        return Ok(());
    }
    if cli.non_interactive || !std::io::stdin().is_terminal() {
        return Err(CliError::Usage(format!("refusing to erase {storage} without --yes")).into());
    }

    let confirmed = Confirm::with_theme(&ColorfulTheme::default())
        .with_prompt(format!("Erase {storage}? This cannot be undone"))
        .default(false)
        .interact_opt()
        .map_err(map_prompt_error)?
        .unwrap_or(false);

    if confirmed {
        Ok(())
    } else {
        Err(CliError::Cancelled("erase cancelled".into()).into())
    }
}

/// Erase command implementation.
pub(crate) fn cmd_erase(
    cli: &Cli,
    config: &Config,
    storage: Option<StorageType>,
    yes: bool,
) -> Result<()> {
    let storage = storage
        .or(config.flash.storage)
        .unwrap_or_default();
    confirm_erase(cli, storage, yes)?;

    let flasher = open_flasher(cli, config, base_options(config).with_storage(storage))?
        .with_observer(ProgressReporter::new(spinner(cli)));
    flasher
        .erase_storage()
        .with_context(|| format!("Failed to erase {storage}"))?;

    if !cli.quiet {
        eprintln!("{} Erased {storage}", style("✓").green());
    }
    Ok(())
}

/// Version command implementation. Prints the raw version to stdout.
pub(crate) fn cmd_version(cli: &Cli, config: &Config) -> Result<()> {
    let flasher = open_flasher(cli, config, base_options(config))?;
    let version = flasher
        .query_version()
        .context("Failed to read bootloader version")?;

    println!("{version}");
    if !cli.quiet {
        eprintln!(
            "{} Silicon revision: {}",
            style("ℹ").blue(),
            SiliconRevision::from_version(&version)
        );
    }
    Ok(())
}

/// Reset command implementation.
pub(crate) fn cmd_reset(cli: &Cli, config: &Config, use_break: bool) -> Result<()> {
    if !use_break && cli.reset_line.or(config.port.reset_line).is_none() {
        return Err(CliError::Usage(
            "no reset line configured; pass --reset-line dtr|rts or use --break".into(),
        )
        .into());
    }

    let flasher = open_flasher(cli, config, base_options(config))?;
    if use_break {
        flasher
            .send_break_signal()
            .context("Failed to send break")?;
    } else {
        flasher
            .send_reset_signal()
            .context("Failed to reset sensor")?;
    }

    if !cli.quiet {
        eprintln!("{} Sensor reset", style("✓").green());
    }
    Ok(())
}
