//! Flash session bookkeeping: states, observer hooks and the run guard.

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use crate::error::{Error, Result};
use crate::protocol::bootloader::BootloaderVersion;

/// Orchestrator state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum FlashState {
    /// No run active.
    #[default]
    Idle,
    /// Pinging the bootloader.
    Connecting,
    /// Reading the ROM version.
    QueryingVersion,
    /// Erasing storage.
    Erasing,
    /// Streaming the image.
    Downloading,
    /// Closing the file.
    Closing,
    /// Last run succeeded.
    Complete,
    /// Last run failed.
    Failed,
}

impl fmt::Display for FlashState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Idle => "idle",
            Self::Connecting => "connecting",
            Self::QueryingVersion => "querying version",
            Self::Erasing => "erasing",
            Self::Downloading => "downloading",
            Self::Closing => "closing",
            Self::Complete => "complete",
            Self::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// Receives progress notifications. Called synchronously from the
/// flashing thread.
pub trait FlashObserver: Send + Sync {
    /// Download progress, 0-100, non-decreasing within a run.
    fn on_progress(&self, _percent: u8) {}

    /// Human-readable status line.
    fn on_status(&self, _status: &str) {}

    /// State transition.
    fn on_state(&self, _state: FlashState) {}
}

impl<O: FlashObserver + ?Sized> FlashObserver for Arc<O> {
    fn on_progress(&self, percent: u8) {
        (**self).on_progress(percent);
    }

    fn on_status(&self, status: &str) {
        (**self).on_status(status);
    }

    fn on_state(&self, state: FlashState) {
        (**self).on_state(state);
    }
}

/// Snapshot of the current or last run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SessionReport {
    /// Current state.
    pub state: FlashState,
    /// Last reported progress.
    pub progress: u8,
    /// Last status line.
    pub status: Option<String>,
    /// Version read during the run.
    pub version: Option<BootloaderVersion>,
}

/// Holds the in-progress flag for the lifetime of a run.
pub(crate) struct SessionGuard<'a> {
    flag: &'a AtomicBool,
}

impl<'a> SessionGuard<'a> {
    /// Claim `flag`, failing if another run holds it.
    pub(crate) fn acquire(flag: &'a AtomicBool) -> Result<Self> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .map_err(|_| Error::AlreadyInProgress)?;
        Ok(Self { flag })
    }
}

impl Drop for SessionGuard<'_> {
    fn drop(&mut self) {
        self.flag
            .store(false, Ordering::Release);
    }
}
