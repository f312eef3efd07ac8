//! Packet-to-output decoding: dispatch, filtering, subtitle assembly.

pub mod dispatcher;
pub mod filter;
pub mod sink;
pub mod subtitle;

pub use dispatcher::{DecodeOptions, DecodeSession};
pub use filter::FilterCache;
pub use sink::DecodeSink;
pub use subtitle::{BitmapCue, BitmapPlacement, PeriodAssembler, TextCue};
