pub(crate) mod analysis;
pub(crate) mod api;
pub(crate) mod audio;
pub(crate) mod decode;
pub(crate) mod error;
pub(crate) mod ffmpeg_utils;
pub(crate) mod job;
pub(crate) mod probe;
pub(crate) mod time;
pub(crate) mod types;

#[cfg(test)]
pub(crate) mod tests;

pub use api::*;
pub use audio::{AudioBuffers, SampleEncoding};
pub use ffmpeg_utils::init;
pub use decode::{DecodeOptions, DecodeSession, FilterCache};
pub use error::{DecodeError, Result};
pub use time::{ContentTime, ContentTimePeriod};
pub use types::MediaProbe;
