//! Target parts and their flashing sequences.

pub mod mmwave;
pub mod part;

pub use mmwave::{FlashObserver, FlashOptions, FlashState, Flasher, SessionReport};
pub use part::{PartFamily, SiliconRevision, is_supported_part_number};
