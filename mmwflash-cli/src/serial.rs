//! Serial port selection.
//!
//! Resolution order: explicit `--port`, the configured port, the single
//! detected port, then an interactive prompt when a terminal is attached.

use {
    crate::{CliError, config::Config},
    anyhow::Result,
    console::style,
    dialoguer::{Error as DialoguerError, Select, theme::ColorfulTheme},
    log::{debug, info},
    mmwflash::{NativePortEnumerator, PortEnumerator, PortInfo},
    std::io::IsTerminal,
};

/// Options for serial port selection.
#[derive(Debug, Clone, Default)]
pub struct SerialOptions {
    /// Explicit port specified via CLI.
    pub port: Option<String>,
    /// Non-interactive mode (fail instead of prompting).
    pub non_interactive: bool,
}

fn usage_err(message: impl Into<String>) -> anyhow::Error {
    CliError::Usage(message.into()).into()
}

/// Pick a serial port name.
pub fn select_serial_port(options: &SerialOptions, config: &Config) -> Result<String> {
    if let Some(port_name) = &options.port {
        return Ok(port_name.clone());
    }

    if let Some(port_name) = &config.port.serial {
        debug!("Using port from config: {port_name}");
        return Ok(port_name.clone());
    }

    let ports = NativePortEnumerator::list_ports()?;
    let interactive = !options.non_interactive && is_interactive_terminal();
    choose_port(ports, interactive)
}

/// Choose among detected ports without touching the system.
fn choose_port(mut ports: Vec<PortInfo>, interactive: bool) -> Result<String> {
    match ports.len() {
        0 => Err(usage_err("no serial ports found; pass one with --port")),
        1 => {
            let port = ports.remove(0);
            info!("Auto-selected port: {}", port.name);
            Ok(port.name)
        },
        _ if interactive => select_port_interactive(ports),
        n => Err(usage_err(format!(
            "multiple serial ports found ({n}); pass one with --port"
        ))),
    }
}

fn is_interactive_terminal() -> bool {
    std::io::stdin().is_terminal() && std::io::stderr().is_terminal()
}

pub(crate) fn map_prompt_error(err: DialoguerError) -> anyhow::Error {
    match err {
        DialoguerError::IO(io_err) => {
            if io_err.kind() == std::io::ErrorKind::Interrupted {
                CliError::Cancelled("cancelled".into()).into()
            } else {
                usage_err(format!("prompt failed: {io_err}"))
            }
        },
    }
}

/// One-line description of a port for prompts and listings.
pub fn describe_port(port: &PortInfo) -> String {
    let vid_pid = match (port.vid, port.pid) {
        (Some(vid), Some(pid)) => format!(" ({vid:04X}:{pid:04X})"),
        _ => String::new(),
    };
    let product = port
        .product
        .as_deref()
        .map(|p| format!(" - {p}"))
        .unwrap_or_default();
    format!("{}{vid_pid}{product}", port.name)
}

fn select_port_interactive(ports: Vec<PortInfo>) -> Result<String> {
    eprintln!(
        "{} Detected {} serial ports",
        style("ℹ").blue(),
        ports.len()
    );

    let labels: Vec<String> = ports
        .iter()
        .map(describe_port)
        .collect();

    let selection = Select::with_theme(&ColorfulTheme::default())
        .with_prompt("Select the port of your mmWave sensor")
        .items(&labels)
        .default(0)
        .interact_opt()
        .map_err(map_prompt_error)?;

    match selection {
        Some(index) => ports
            .into_iter()
            .nth(index)
            .map(|p| p.name)
            .ok_or_else(|| anyhow::anyhow!("Invalid port index: {index}")),
        None => Err(CliError::Cancelled("port selection cancelled".into()).into()),
    }
}
