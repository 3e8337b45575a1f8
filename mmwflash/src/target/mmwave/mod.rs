//! mmWave (xWR12/14/16/18/68) flashing support.

pub mod flasher;
pub mod session;

pub use flasher::{DEFAULT_CHUNK_SIZE, FlashOptions, Flasher};
pub use session::{FlashObserver, FlashState, SessionReport};
