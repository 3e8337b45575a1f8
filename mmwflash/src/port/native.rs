//! Native serial port implementation using the `serialport` crate.
//!
//! This module provides the serial transport for native platforms
//! (Linux, macOS, Windows, FreeBSD, etc.).

use {
    crate::{
        error::{Error, Result},
        port::{LineControl, PortEnumerator, PortInfo, ResetLine, SerialConfig, Transport},
    },
    log::trace,
    serialport::ClearBuffer,
    std::io::{Read, Write},
};

/// Native serial port implementation.
pub struct NativePort {
    port: Box<dyn serialport::SerialPort>,
    name: String,
    baud_rate: u32,
}

impl NativePort {
    /// Open a serial port with the given configuration.
    ///
    /// The mmWave bootloader expects 8N1 without flow control.
    pub fn open(config: &SerialConfig) -> Result<Self> {
        let port = serialport::new(&config.port_name, config.baud_rate)
            .timeout(config.timeout)
            .data_bits(serialport::DataBits::Eight)
            .parity(serialport::Parity::None)
            .stop_bits(serialport::StopBits::One)
            .flow_control(serialport::FlowControl::None)
            .open()?;

        Ok(Self {
            port,
            name: config
                .port_name
                .clone(),
            baud_rate: config.baud_rate,
        })
    }

    /// Get the port name/path.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Get the configured baud rate.
    pub fn baud_rate(&self) -> u32 {
        self.baud_rate
    }
}

impl Transport for NativePort {
    fn bytes_available(&mut self) -> Result<bool> {
        Ok(self
            .port
            .bytes_to_read()?
            > 0)
    }

    fn read_byte(&mut self) -> Result<u8> {
        let mut byte = [0u8; 1];
        self.port
            .read_exact(&mut byte)?;
        Ok(byte[0])
    }

    fn write_bytes(&mut self, data: &[u8]) -> Result<()> {
        trace!("TX {} bytes: {:02X?}", data.len(), data);
        self.port
            .write_all(data)?;
        Ok(())
    }

    fn flush(&mut self) -> Result<()> {
        self.port
            .flush()?;
        Ok(())
    }

    fn discard_input(&mut self) -> Result<usize> {
        let pending = self
            .port
            .bytes_to_read()?;
        self.port
            .clear(ClearBuffer::Input)?;
        Ok(usize::try_from(pending).unwrap_or(usize::MAX))
    }
}

impl LineControl for NativePort {
    fn set_line(&mut self, line: ResetLine, level: bool) -> Result<()> {
        trace!("Setting {line} to {level}");
        match line {
            ResetLine::Dtr => self
                .port
                .write_data_terminal_ready(level)?,
            ResetLine::Rts => self
                .port
                .write_request_to_send(level)?,
        }
        Ok(())
    }

    fn set_break(&mut self, active: bool) -> Result<()> {
        trace!("Setting break to {active}");
        if active {
            self.port
                .set_break()?;
        } else {
            self.port
                .clear_break()?;
        }
        Ok(())
    }
}

/// Native port enumerator.
pub struct NativePortEnumerator;

impl PortEnumerator for NativePortEnumerator {
    fn list_ports() -> Result<Vec<PortInfo>> {
        let ports = serialport::available_ports().map_err(Error::Serial)?;

        Ok(ports
            .into_iter()
            .map(|p| {
                let (vid, pid, manufacturer, product, serial_number) = match &p.port_type {
                    serialport::SerialPortType::UsbPort(info) => (
                        Some(info.vid),
                        Some(info.pid),
                        info.manufacturer
                            .clone(),
                        info.product
                            .clone(),
                        info.serial_number
                            .clone(),
                    ),
                    _ => (None, None, None, None, None),
                };

                PortInfo {
                    name: p.port_name,
                    vid,
                    pid,
                    manufacturer,
                    product,
                    serial_number,
                }
            })
            .collect())
    }
}
