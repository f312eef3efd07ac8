//! FFmpeg module - wrappers and utilities for FFmpeg library access
//!
//! This module handles:
//! - FFmpeg initialization
//! - Timebase conversion and other utilities
//! - Safe accessors for fields `ffmpeg-next` does not expose

pub mod helpers;
pub mod utils;

pub use ffmpeg_next as ffmpeg;
#[allow(unused_imports)]
pub use utils::*;

use std::sync::Once;

static INIT: Once = Once::new();

/// Initialize the FFmpeg library.
///
/// Safe to call from every entry point; the underlying `ffmpeg::init()` runs
/// only once per process.  Returns an error if the underlying C library fails
/// to initialize context structures.
pub fn init() -> crate::error::Result<()> {
    let mut result = Ok(());
    INIT.call_once(|| {
        result = ffmpeg::init();
        if result.is_ok() {
            tracing::info!("FFmpeg initialized");
        }
    });
    result.map_err(crate::error::DecodeError::from)
}
