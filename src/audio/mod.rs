//! Canonical PCM representation and sample-format conversion.

pub mod buffers;
pub mod sample;

pub use buffers::AudioBuffers;
pub use sample::SampleEncoding;
