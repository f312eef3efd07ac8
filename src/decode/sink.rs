//! The outward emission seam for decoded data.

use crate::audio::AudioBuffers;
use crate::decode::subtitle::TextCue;
use crate::time::{ContentTime, ContentTimePeriod};
use crate::types::{FractionalRect, RgbImage, RgbaImage};

/// Receiver for everything a decode session produces.
///
/// All timestamps are on the corrected content-time axis.
pub trait DecodeSink {
    /// A decoded video frame and its corrected frame number.
    fn video_frame(&mut self, image: RgbImage, frame: i64);

    /// A block of canonical PCM for one audio stream.
    fn audio_block(&mut self, stream_index: usize, audio: AudioBuffers, time: ContentTime);

    /// All text cues for one period, delivered in a single call.
    fn subtitle_text_batch(&mut self, period: ContentTimePeriod, cues: Vec<TextCue>);

    /// One bitmap cue with its fractional position within the video frame.
    fn subtitle_bitmap(&mut self, period: ContentTimePeriod, image: RgbaImage, rect: FractionalRect);
}

/// Buffers every emission; used by tests to assert ordering and grouping.
#[derive(Default)]
pub struct CollectingSink {
    pub video_frames: Vec<(RgbImage, i64)>,
    pub audio_blocks: Vec<(usize, AudioBuffers, ContentTime)>,
    pub text_batches: Vec<(ContentTimePeriod, Vec<TextCue>)>,
    pub bitmaps: Vec<(ContentTimePeriod, RgbaImage, FractionalRect)>,
    /// Interleaved subtitle emission order, for grouping assertions.
    pub subtitle_order: Vec<SubtitleEmission>,
}

/// One entry in the subtitle emission log.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubtitleEmission {
    TextBatch(ContentTimePeriod, usize),
    Bitmap(ContentTimePeriod),
}

impl CollectingSink {
    pub fn new() -> Self {
        Self::default()
    }
}

impl DecodeSink for CollectingSink {
    fn video_frame(&mut self, image: RgbImage, frame: i64) {
        self.video_frames.push((image, frame));
    }

    fn audio_block(&mut self, stream_index: usize, audio: AudioBuffers, time: ContentTime) {
        self.audio_blocks.push((stream_index, audio, time));
    }

    fn subtitle_text_batch(&mut self, period: ContentTimePeriod, cues: Vec<TextCue>) {
        self.subtitle_order
            .push(SubtitleEmission::TextBatch(period, cues.len()));
        self.text_batches.push((period, cues));
    }

    fn subtitle_bitmap(
        &mut self,
        period: ContentTimePeriod,
        image: RgbaImage,
        rect: FractionalRect,
    ) {
        self.subtitle_order.push(SubtitleEmission::Bitmap(period));
        self.bitmaps.push((period, image, rect));
    }
}
