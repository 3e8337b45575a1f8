//! Firmware image handling.

pub mod metaimage;

pub use metaimage::{ImageInfo, MAX_IMAGE_SIZE, META_IMAGE_MAGIC, inspect};
