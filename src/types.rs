use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::SystemTime;

use bytes::Bytes;
use ffmpeg_next as ffmpeg;
use uuid::Uuid;

use crate::time::{ContentTime, ContentTimePeriod};

/// Video stream information
#[derive(Debug, Clone)]
pub struct VideoStream {
    pub index: usize,
    pub codec_id: ffmpeg::codec::Id,
    pub width: u32,
    pub height: u32,
    /// Frames per second, taken from the container's rate hint.
    pub frame_rate: f64,
    /// First presented timestamp observed while probing, on the native clock.
    pub first_pts: Option<ContentTime>,
}

/// One audio channel group in the source file.
///
/// Identity is the stream index: two handles to the same index compare equal
/// regardless of probed detail.
#[derive(Debug, Clone)]
pub struct AudioStream {
    pub index: usize,
    pub codec_id: ffmpeg::codec::Id,
    pub channels: u16,
    pub sample_rate: u32,
    /// First presented timestamp observed while probing, on the native clock.
    pub first_pts: Option<ContentTime>,
}

impl PartialEq for AudioStream {
    fn eq(&self, other: &Self) -> bool {
        self.index == other.index
    }
}

impl Eq for AudioStream {}

/// Subtitle stream information plus the cue timing table built at probe time.
#[derive(Debug, Clone)]
pub struct SubtitleStream {
    pub index: usize,
    pub codec_id: ffmpeg::codec::Id,
    pub language: Option<String>,
    /// Native cue start -> cue end, recorded while probing.  Consulted when a
    /// codec only signals "clear at next cue" instead of an explicit end.
    cue_ends: BTreeMap<ContentTime, ContentTime>,
}

// `ffmpeg::codec::Id` does not implement `Default`; `Id::None` is its
// unset/zero value.
impl Default for SubtitleStream {
    fn default() -> Self {
        SubtitleStream {
            index: 0,
            codec_id: ffmpeg::codec::Id::None,
            language: None,
            cue_ends: BTreeMap::new(),
        }
    }
}

impl PartialEq for SubtitleStream {
    fn eq(&self, other: &Self) -> bool {
        self.index == other.index
    }
}

impl Eq for SubtitleStream {}

impl SubtitleStream {
    pub fn new(index: usize, codec_id: ffmpeg::codec::Id, language: Option<String>) -> Self {
        SubtitleStream {
            index,
            codec_id,
            language,
            cue_ends: BTreeMap::new(),
        }
    }

    /// Record one cue's native period in the timing table.
    pub fn record_cue(&mut self, period: ContentTimePeriod) {
        self.cue_ends.insert(period.from, period.to);
    }

    /// Look up the recorded end for a cue starting at `from`.
    pub fn find_cue_end(&self, from: ContentTime) -> Option<ContentTime> {
        self.cue_ends.get(&from).copied()
    }

    pub fn cue_count(&self) -> usize {
        self.cue_ends.len()
    }
}

/// Everything learned about a media file in one probe pass.
#[derive(Debug, Clone)]
pub struct MediaProbe {
    pub id: String,
    pub path: PathBuf,
    pub duration: Option<ContentTime>,
    pub video: Option<VideoStream>,
    pub audio: Vec<AudioStream>,
    pub subtitles: Vec<SubtitleStream>,
    /// File stream index of the subtitle stream decode sessions will follow.
    pub selected_subtitle: Option<usize>,
    pub probed_at: SystemTime,
}

impl MediaProbe {
    pub fn new(path: PathBuf) -> Self {
        MediaProbe {
            id: Uuid::new_v4().to_string(),
            path,
            duration: None,
            video: None,
            audio: Vec::new(),
            subtitles: Vec::new(),
            selected_subtitle: None,
            probed_at: SystemTime::now(),
        }
    }

    pub fn audio_stream(&self, index: usize) -> Option<&AudioStream> {
        self.audio.iter().find(|a| a.index == index)
    }

    pub fn subtitle_stream(&self) -> Option<&SubtitleStream> {
        let index = self.selected_subtitle?;
        self.subtitles.iter().find(|s| s.index == index)
    }

    /// Select a different subtitle stream by file stream index.
    pub fn select_subtitle(&mut self, index: usize) -> bool {
        if self.subtitles.iter().any(|s| s.index == index) {
            self.selected_subtitle = Some(index);
            true
        } else {
            false
        }
    }

    pub fn has_audio(&self) -> bool {
        !self.audio.is_empty()
    }
}

/// A decoded video frame converted to RGB24.
///
/// Rows may carry trailing padding; `stride` is the byte distance between
/// row starts.
#[derive(Debug, Clone)]
pub struct RgbImage {
    pub width: u32,
    pub height: u32,
    pub stride: usize,
    pub data: Bytes,
}

impl RgbImage {
    /// The pixel bytes of row `y`, without padding.
    pub fn row(&self, y: u32) -> &[u8] {
        let start = y as usize * self.stride;
        &self.data[start..start + self.width as usize * 3]
    }
}

/// An unpacked subtitle bitmap, tightly packed RGBA.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RgbaImage {
    pub width: u32,
    pub height: u32,
    pub data: Bytes,
}

impl RgbaImage {
    pub fn pixel(&self, x: u32, y: u32) -> [u8; 4] {
        let i = (y as usize * self.width as usize + x as usize) * 4;
        [
            self.data[i],
            self.data[i + 1],
            self.data[i + 2],
            self.data[i + 3],
        ]
    }
}

/// Horizontal anchor for positioned subtitles.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HAlign {
    Left,
    Center,
    Right,
}

/// Vertical anchor for positioned subtitles.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VAlign {
    Top,
    Center,
    Bottom,
}

/// A rectangle expressed as fractions of the full video frame.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FractionalRect {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

impl FractionalRect {
    /// Scale a native pixel rectangle against the video frame size.
    pub fn from_pixels(
        x: u32,
        y: u32,
        width: u32,
        height: u32,
        video_width: u32,
        video_height: u32,
    ) -> Self {
        FractionalRect {
            x: x as f64 / video_width as f64,
            y: y as f64 / video_height as f64,
            width: width as f64 / video_width as f64,
            height: height as f64 / video_height as f64,
        }
    }

    /// Place a rectangle of fractional size `(width, height)` from an anchor
    /// plus fractional offset, as positioned subtitle formats specify it.
    pub fn anchored(
        h_align: HAlign,
        h_position: f64,
        v_align: VAlign,
        v_position: f64,
        width: f64,
        height: f64,
    ) -> Self {
        let x = match h_align {
            HAlign::Left => h_position,
            HAlign::Center => 0.5 + h_position - width / 2.0,
            HAlign::Right => 1.0 - h_position - width,
        };
        let y = match v_align {
            VAlign::Top => v_position,
            VAlign::Center => 0.5 + v_position - height / 2.0,
            VAlign::Bottom => 1.0 - v_position - height,
        };
        FractionalRect {
            x,
            y,
            width,
            height,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_audio_stream_identity_is_index() {
        let a = AudioStream {
            index: 1,
            codec_id: ffmpeg::codec::Id::AAC,
            channels: 2,
            sample_rate: 48_000,
            first_pts: None,
        };
        let b = AudioStream {
            index: 1,
            codec_id: ffmpeg::codec::Id::AC3,
            channels: 6,
            sample_rate: 44_100,
            first_pts: Some(ContentTime::from_seconds(0.5)),
        };
        let c = AudioStream { index: 2, ..a.clone() };
        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn test_cue_timing_table() {
        let mut s = SubtitleStream::new(2, ffmpeg::codec::Id::DVD_SUBTITLE, None);
        let from = ContentTime::from_seconds(10.0);
        let to = ContentTime::from_seconds(12.5);
        s.record_cue(ContentTimePeriod::new(from, to));

        assert_eq!(s.find_cue_end(from), Some(to));
        assert_eq!(s.find_cue_end(ContentTime::from_seconds(11.0)), None);
        assert_eq!(s.cue_count(), 1);
    }

    #[test]
    fn test_probe_subtitle_selection() {
        let mut probe = MediaProbe::new(PathBuf::from("/tmp/a.mkv"));
        probe
            .subtitles
            .push(SubtitleStream::new(3, ffmpeg::codec::Id::SUBRIP, None));
        probe
            .subtitles
            .push(SubtitleStream::new(4, ffmpeg::codec::Id::ASS, None));
        probe.selected_subtitle = Some(3);

        assert_eq!(probe.subtitle_stream().map(|s| s.index), Some(3));
        assert!(probe.select_subtitle(4));
        assert_eq!(probe.subtitle_stream().map(|s| s.index), Some(4));
        assert!(!probe.select_subtitle(9));
    }

    #[test]
    fn test_fractional_rect_from_pixels() {
        let r = FractionalRect::from_pixels(192, 540, 384, 108, 1920, 1080);
        assert!((r.x - 0.1).abs() < 1e-9);
        assert!((r.y - 0.5).abs() < 1e-9);
        assert!((r.width - 0.2).abs() < 1e-9);
        assert!((r.height - 0.1).abs() < 1e-9);
    }

    #[test]
    fn test_fractional_rect_anchors() {
        // Center/bottom is the common cinema caption position.
        let r = FractionalRect::anchored(HAlign::Center, 0.0, VAlign::Bottom, 0.08, 0.4, 0.1);
        assert!((r.x - 0.3).abs() < 1e-9);
        assert!((r.y - 0.82).abs() < 1e-9);

        let r = FractionalRect::anchored(HAlign::Left, 0.05, VAlign::Top, 0.1, 0.2, 0.1);
        assert!((r.x - 0.05).abs() < 1e-9);
        assert!((r.y - 0.1).abs() < 1e-9);

        let r = FractionalRect::anchored(HAlign::Right, 0.05, VAlign::Center, 0.0, 0.2, 0.1);
        assert!((r.x - 0.75).abs() < 1e-9);
        assert!((r.y - 0.45).abs() < 1e-9);
    }
}
