//! mmWave flash orchestrator.
//!
//! Sequences a complete flashing run over the command layer:
//!
//! ```text
//! Idle -> Connecting -> QueryingVersion -> Erasing -> Downloading -> Closing -> Complete
//!              \               \               \            \            \
//!               +---------------+---------------+------------+------------+--> Failed
//! ```
//!
//! Only the connect step retries. A failed version query is logged and the
//! run carries on. After `Complete` or `Failed` the flasher is `Idle` again.
//!
//! ## Example
//!
//! ```rust,no_run
//! use mmwflash::{Flasher, SerialConfig};
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let flasher = Flasher::open(&SerialConfig::new("/dev/ttyUSB0", 115200))?;
//!     let firmware = std::fs::read("xwr68xx_mmw_demo.bin")?;
//!     flasher.start_flash_procedure(&firmware)?;
//!     Ok(())
//! }
//! ```

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use log::{debug, error, info, warn};

use crate::error::{Error, Result};
use crate::image::metaimage;
use crate::port::{Clock, LineControl, ResetLine, SystemClock, Transport};
use crate::protocol::bootloader::{Bootloader, BootloaderVersion};
use crate::protocol::command::{FileType, StorageType};
use crate::protocol::link::{Link, LinkConfig};
use crate::target::mmwave::session::{FlashObserver, FlashState, SessionGuard, SessionReport};
use crate::target::part::{PartFamily, SiliconRevision};

/// Bytes per data chunk.
pub const DEFAULT_CHUNK_SIZE: usize = 240;

/// Number of pings before giving up on the bootloader.
const MAX_CONNECT_ATTEMPTS: usize = 3;

/// Delay between connection retry attempts.
const CONNECT_RETRY_DELAY: Duration = Duration::from_millis(500);

/// How long the reset line is held asserted.
const RESET_PULSE: Duration = Duration::from_millis(100);

/// How long a break condition is held.
const BREAK_DURATION: Duration = Duration::from_millis(100);

/// What to flash and how.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FlashOptions {
    /// Target storage.
    pub storage: StorageType,
    /// File type announced to the bootloader. Replaced by the detected type
    /// when `part` is set.
    pub file_type: FileType,
    /// Erase storage before downloading.
    pub erase: bool,
    /// Bytes per data chunk.
    pub chunk_size: usize,
    /// Ping attempts before the connect step fails.
    pub connect_attempts: usize,
    /// Delay between ping attempts.
    pub connect_retry_delay: Duration,
    /// Validate the image header for this part family.
    pub part: Option<PartFamily>,
    /// Meta image slot (1-4) used by the header check.
    pub file_order: u8,
}

impl Default for FlashOptions {
    fn default() -> Self {
        Self {
            storage: StorageType::Sflash,
            file_type: FileType::MetaImage1,
            erase: true,
            chunk_size: DEFAULT_CHUNK_SIZE,
            connect_attempts: MAX_CONNECT_ATTEMPTS,
            connect_retry_delay: CONNECT_RETRY_DELAY,
            part: None,
            file_order: 1,
        }
    }
}

impl FlashOptions {
    /// Set the target storage.
    #[must_use]
    pub fn with_storage(mut self, storage: StorageType) -> Self {
        self.storage = storage;
        self
    }

    /// Set the file type.
    #[must_use]
    pub fn with_file_type(mut self, file_type: FileType) -> Self {
        self.file_type = file_type;
        self
    }

    /// Enable or disable the erase step.
    #[must_use]
    pub fn with_erase(mut self, erase: bool) -> Self {
        self.erase = erase;
        self
    }

    /// Set the chunk size.
    #[must_use]
    pub fn with_chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = chunk_size;
        self
    }

    /// Set the number of ping attempts.
    #[must_use]
    pub fn with_connect_attempts(mut self, attempts: usize) -> Self {
        self.connect_attempts = attempts;
        self
    }

    /// Enable the header check for `part`.
    #[must_use]
    pub fn with_part(mut self, part: Option<PartFamily>) -> Self {
        self.part = part;
        self
    }

    /// Set the meta image slot.
    #[must_use]
    pub fn with_file_order(mut self, order: u8) -> Self {
        self.file_order = order;
        self
    }
}

/// mmWave flasher.
///
/// Generic over the transport `T` and the clock `C`. All operations take
/// `&self`; a second operation started while one is running fails with
/// [`Error::AlreadyInProgress`] without touching the transport.
pub struct Flasher<T: Transport, C: Clock = SystemClock> {
    bootloader: Mutex<Bootloader<T, C>>,
    options: FlashOptions,
    reset_line: Option<ResetLine>,
    observer: Option<Box<dyn FlashObserver>>,
    in_progress: AtomicBool,
    report: Mutex<SessionReport>,
}

impl<T: Transport, C: Clock> Flasher<T, C> {
    /// Create a flasher with default link timing.
    pub fn new(transport: T, clock: C) -> Self {
        Self::with_link(Link::new(transport, clock))
    }

    /// Create a flasher over a configured link.
    pub fn with_link(link: Link<T, C>) -> Self {
        Self {
            bootloader: Mutex::new(Bootloader::new(link)),
            options: FlashOptions::default(),
            reset_line: None,
            observer: None,
            in_progress: AtomicBool::new(false),
            report: Mutex::new(SessionReport::default()),
        }
    }

    /// Create a flasher with custom link timing.
    pub fn with_link_config(transport: T, clock: C, config: LinkConfig) -> Self {
        Self::with_link(Link::with_config(transport, clock, config))
    }

    /// Set flash options.
    #[must_use]
    pub fn with_options(mut self, options: FlashOptions) -> Self {
        self.options = options;
        self
    }

    /// Set the line wired to the sensor reset pin.
    #[must_use]
    pub fn with_reset_line(mut self, line: Option<ResetLine>) -> Self {
        self.reset_line = line;
        self
    }

    /// Register a progress observer.
    #[must_use]
    pub fn with_observer(mut self, observer: impl FlashObserver + 'static) -> Self {
        self.observer = Some(Box::new(observer));
        self
    }

    /// Options in use.
    pub fn options(&self) -> &FlashOptions {
        &self.options
    }

    /// Returns whether an operation is running.
    pub fn is_in_progress(&self) -> bool {
        self.in_progress
            .load(Ordering::Acquire)
    }

    /// Current state.
    pub fn state(&self) -> FlashState {
        self.lock_report()
            .state
    }

    /// Last reported progress.
    pub fn progress(&self) -> u8 {
        self.lock_report()
            .progress
    }

    /// Last status line.
    pub fn last_status(&self) -> Option<String> {
        self.lock_report()
            .status
            .clone()
    }

    /// Snapshot of the current or last run.
    pub fn report(&self) -> SessionReport {
        self.lock_report()
            .clone()
    }

    /// Consume the flasher and return the underlying transport.
    pub fn into_transport(self) -> T {
        self.bootloader
            .into_inner()
            .unwrap_or_else(PoisonError::into_inner)
            .into_link()
            .into_transport()
    }

    /// Flash `firmware` to the configured storage.
    ///
    /// Connects, reads the ROM version, optionally validates the image
    /// header, erases, downloads in chunks and closes the file.
    pub fn start_flash_procedure(&self, firmware: &[u8]) -> Result<()> {
        self.run_session("Flash", |bl| {
            info!("Starting flash procedure ({} bytes)", firmware.len());
            self.report_status("Connecting to bootloader...");
            metaimage::check_size(firmware)?;
            let file_size = u32::try_from(firmware.len())
                .map_err(|_| Error::InvalidImage("image size exceeds 32 bits".into()))?;

            self.connect(bl)?;

            self.set_state(FlashState::QueryingVersion);
            let version = match bl.get_version() {
                Ok(version) => Some(version),
                Err(e) => {
                    warn!("Failed to read bootloader version: {e}");
                    None
                },
            };
            self.lock_report()
                .version
                .clone_from(&version);
            let file_type = self.resolve_file_type(firmware, version.as_ref())?;

            if self.options.erase {
                self.report_status("Erasing flash...");
                self.erase(bl)?;
            } else {
                info!("Skipping erase");
            }

            self.report_status("Flashing firmware...");
            self.download(bl, firmware, file_size, file_type)?;

            self.set_state(FlashState::Closing);
            bl.file_close(file_type)
                .map_err(|e| Error::CloseFailed(e.boxed()))?;
            self.report_status("Download complete");
            self.report_progress(100);
            Ok(())
        })
    }

    /// Connect and read the ROM version.
    pub fn query_version(&self) -> Result<BootloaderVersion> {
        self.run_session("Version query", |bl| {
            self.connect(bl)?;
            self.set_state(FlashState::QueryingVersion);
            let version = bl.get_version()?;
            self.lock_report()
                .version = Some(version.clone());
            Ok(version)
        })
    }

    /// Connect and erase the configured storage.
    pub fn erase_storage(&self) -> Result<()> {
        self.run_session("Erase", |bl| {
            self.connect(bl)?;
            self.report_status("Erasing flash...");
            self.erase(bl)
        })
    }

    /// Run `op` under the session guard with full state reporting.
    fn run_session<R>(
        &self,
        name: &str,
        op: impl FnOnce(&mut Bootloader<T, C>) -> Result<R>,
    ) -> Result<R> {
        let _guard = SessionGuard::acquire(&self.in_progress).inspect_err(|_| {
            warn!("Flash already in progress");
        })?;
        *self.lock_report() = SessionReport::default();

        let mut bl = self
            .bootloader
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        let result = op(&mut *bl);
        drop(bl);

        match &result {
            Ok(_) => {
                self.set_state(FlashState::Complete);
                self.report_status(&format!("{name} complete!"));
                info!("{name} completed successfully");
            },
            Err(e) => {
                self.set_state(FlashState::Failed);
                self.report_status(&format!("{name} failed: {e}"));
                error!("{name} failed: {e}");
            },
        }
        self.set_state(FlashState::Idle);
        result
    }

    fn connect(&self, bl: &mut Bootloader<T, C>) -> Result<()> {
        self.set_state(FlashState::Connecting);
        self.report_status("Connecting...");

        let attempts = self
            .options
            .connect_attempts
            .max(1);
        let mut last_error = None;

        for attempt in 1..=attempts {
            bl.link_mut()
                .discard_input()?;
            match bl.ping() {
                Ok(()) => {
                    info!("Bootloader connected");
                    return Ok(());
                },
                Err(e) => {
                    warn!("Ping failed (attempt {attempt}/{attempts}): {e}");
                    last_error = Some(e);
                    if attempt < attempts {
                        bl.link()
                            .sleep(self.options.connect_retry_delay);
                    }
                },
            }
        }

        error!("Failed to connect to bootloader");
        Err(Error::ConnectFailed {
            attempts,
            source: last_error
                .unwrap_or(Error::AckTimeout)
                .boxed(),
        })
    }

    fn resolve_file_type(
        &self,
        firmware: &[u8],
        version: Option<&BootloaderVersion>,
    ) -> Result<FileType> {
        let Some(part) = self.options.part else {
            return Ok(self.options.file_type);
        };
        let revision = version
            .map(SiliconRevision::from_version)
            .unwrap_or_default();
        debug!("Checking image header for {part} ({revision})");
        let info = metaimage::inspect(firmware, part, revision, self.options.file_order)?;
        Ok(info.file_type)
    }

    fn erase(&self, bl: &mut Bootloader<T, C>) -> Result<()> {
        self.set_state(FlashState::Erasing);
        bl.erase(self.options.storage, 0, 0)
            .map_err(|e| {
                error!("Flash erase failed: {e}");
                Error::EraseFailed(e.boxed())
            })?;
        info!("Storage erased");
        self.report_status("Erase complete");
        Ok(())
    }

    fn download(
        &self,
        bl: &mut Bootloader<T, C>,
        firmware: &[u8],
        file_size: u32,
        file_type: FileType,
    ) -> Result<()> {
        self.set_state(FlashState::Downloading);
        self.report_status("Starting download...");
        self.report_progress(0);

        let storage = self.options.storage;
        bl.start_download(file_size, storage, file_type)
            .map_err(|e| Error::DownloadFailed {
                offset: 0,
                source: e.boxed(),
            })?;

        let chunk_size = self
            .options
            .chunk_size
            .max(1);
        let total = firmware
            .len()
            .div_ceil(chunk_size);

        for (index, chunk) in firmware
            .chunks(chunk_size)
            .enumerate()
        {
            let offset = index * chunk_size;
            bl.send_data_chunk(chunk, storage)
                .map_err(|e| {
                    error!("Failed to send chunk at offset {offset}: {e}");
                    Error::DownloadFailed {
                        offset,
                        source: e.boxed(),
                    }
                })?;

            let sent = index + 1;
            let percent = u8::try_from(sent * 100 / total).unwrap_or(100);
            self.report_progress(percent);
            if sent % 10 == 0 {
                debug!("Sent {sent}/{total} chunks");
            }
        }
        Ok(())
    }

    fn lock_report(&self) -> MutexGuard<'_, SessionReport> {
        self.report
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    fn set_state(&self, state: FlashState) {
        debug!("State -> {state}");
        self.lock_report()
            .state = state;
        if let Some(observer) = &self.observer {
            observer.on_state(state);
        }
    }

    fn report_status(&self, status: &str) {
        self.lock_report()
            .status = Some(status.to_string());
        if let Some(observer) = &self.observer {
            observer.on_status(status);
        }
    }

    fn report_progress(&self, percent: u8) {
        self.lock_report()
            .progress = percent;
        if let Some(observer) = &self.observer {
            observer.on_progress(percent);
        }
    }
}

impl<T: Transport + LineControl, C: Clock> Flasher<T, C> {
    /// Pulse the reset line so the sensor restarts into its bootloader
    /// (or application, depending on the SOP pins).
    pub fn send_reset_signal(&self) -> Result<()> {
        let Some(line) = self.reset_line else {
            warn!("No reset line configured");
            return Err(Error::ResetUnavailable);
        };
        let _guard = SessionGuard::acquire(&self.in_progress)?;
        let mut bl = self
            .bootloader
            .lock()
            .unwrap_or_else(PoisonError::into_inner);

        info!("Resetting sensor via {line}");
        bl.link_mut()
            .transport_mut()
            .set_line(line, true)?;
        bl.link()
            .sleep(RESET_PULSE);
        bl.link_mut()
            .transport_mut()
            .set_line(line, false)?;
        Ok(())
    }

    /// Hold a UART break condition.
    pub fn send_break_signal(&self) -> Result<()> {
        let _guard = SessionGuard::acquire(&self.in_progress)?;
        let mut bl = self
            .bootloader
            .lock()
            .unwrap_or_else(PoisonError::into_inner);

        debug!("Sending break");
        bl.link_mut()
            .transport_mut()
            .set_break(true)?;
        bl.link()
            .sleep(BREAK_DURATION);
        bl.link_mut()
            .transport_mut()
            .set_break(false)?;
        Ok(())
    }
}

// Native-specific convenience functions
#[cfg(feature = "native")]
mod native_impl {
    use super::{Duration, Error, Flasher, LinkConfig, Result, SystemClock, debug, warn};
    use crate::port::{NativePort, SerialConfig};

    impl Flasher<NativePort, SystemClock> {
        /// Create a flasher by opening a serial port.
        ///
        /// The reset line is taken from `config`.
        pub fn open(config: &SerialConfig) -> Result<Self> {
            Self::open_with(config, LinkConfig::default())
        }

        /// Like [`Flasher::open`], with custom link timing.
        pub fn open_with(config: &SerialConfig, link: LinkConfig) -> Result<Self> {
            let port = Self::open_with_retry(config)?;
            Ok(Self::with_link_config(port, SystemClock::new(), link)
                .with_reset_line(config.reset_line))
        }

        /// Open serial port with retry mechanism.
        fn open_with_retry(config: &SerialConfig) -> Result<NativePort> {
            const MAX_OPEN_PORT_ATTEMPTS: usize = 3;
            const OPEN_RETRY_DELAY: Duration = Duration::from_millis(500);

            let mut last_error = None;

            for attempt in 1..=MAX_OPEN_PORT_ATTEMPTS {
                match NativePort::open(config) {
                    Ok(port) => {
                        if attempt > 1 {
                            debug!("Port opened on attempt {attempt}");
                        }
                        return Ok(port);
                    },
                    Err(e) => {
                        warn!(
                            "Failed to open port {} (attempt {attempt}/{MAX_OPEN_PORT_ATTEMPTS}): {e}",
                            config.port_name
                        );
                        last_error = Some(e);

                        if attempt < MAX_OPEN_PORT_ATTEMPTS {
                            std::thread::sleep(OPEN_RETRY_DELAY);
                        }
                    },
                }
            }

            Err(last_error.unwrap_or_else(|| {
                Error::Config(format!("could not open {}", config.port_name))
            }))
        }
    }
}
