//! Subtitle period assembly.
//!
//! Downstream rendering assumes "no more subtitles for this period" once the
//! first emission for that period occurs, so fragments sharing an identical
//! `[from, to)` window must be gathered and delivered together.  The
//! assembler holds the current period's fragments and closes the group as
//! soon as a fragment with a different period arrives.

use bytes::Bytes;

use crate::decode::sink::DecodeSink;
use crate::time::ContentTimePeriod;
use crate::types::{FractionalRect, RgbaImage};

/// One text subtitle cue, stripped of markup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextCue {
    pub text: String,
}

impl TextCue {
    pub fn new(text: impl Into<String>) -> Self {
        TextCue { text: text.into() }
    }
}

/// Where a bitmap cue sits within the video frame.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum BitmapPlacement {
    /// Native pixel rectangle, resolved against the video frame size.
    Pixels { x: u32, y: u32, width: u32, height: u32 },
    /// Anchor-based placement with a fractional offset and size.
    Anchored {
        h_align: crate::types::HAlign,
        h_position: f64,
        v_align: crate::types::VAlign,
        v_position: f64,
        width: f64,
        height: f64,
    },
}

impl BitmapPlacement {
    /// Resolve to a fractional rectangle against `(video_width, video_height)`.
    pub fn resolve(&self, video_width: u32, video_height: u32) -> FractionalRect {
        match *self {
            BitmapPlacement::Pixels {
                x,
                y,
                width,
                height,
            } => FractionalRect::from_pixels(x, y, width, height, video_width, video_height),
            BitmapPlacement::Anchored {
                h_align,
                h_position,
                v_align,
                v_position,
                width,
                height,
            } => FractionalRect::anchored(h_align, h_position, v_align, v_position, width, height),
        }
    }
}

/// An unpacked bitmap cue awaiting emission.
#[derive(Debug, Clone, PartialEq)]
pub struct BitmapCue {
    pub image: RgbaImage,
    pub placement: BitmapPlacement,
}

/// The in-flight group of fragments for one period.
struct Group {
    period: ContentTimePeriod,
    texts: Vec<TextCue>,
    bitmaps: Vec<BitmapCue>,
}

/// Groups decoded subtitle fragments by identical time period.
pub struct PeriodAssembler {
    video_width: u32,
    video_height: u32,
    current: Option<Group>,
}

impl PeriodAssembler {
    /// `video_width`/`video_height` give the frame size bitmap rectangles are
    /// scaled against.
    pub fn new(video_width: u32, video_height: u32) -> Self {
        PeriodAssembler {
            video_width,
            video_height,
            current: None,
        }
    }

    /// Add a text cue for `period`, closing the previous group if the period
    /// differs.
    pub fn push_text(&mut self, period: ContentTimePeriod, cue: TextCue, sink: &mut dyn DecodeSink) {
        self.group_for(period, sink).texts.push(cue);
    }

    /// Add a bitmap cue for `period`, closing the previous group if the
    /// period differs.
    pub fn push_bitmap(
        &mut self,
        period: ContentTimePeriod,
        cue: BitmapCue,
        sink: &mut dyn DecodeSink,
    ) {
        self.group_for(period, sink).bitmaps.push(cue);
    }

    /// Emit any open group; called at end of stream.
    pub fn flush(&mut self, sink: &mut dyn DecodeSink) {
        if let Some(group) = self.current.take() {
            Self::emit(group, self.video_width, self.video_height, sink);
        }
    }

    /// Discard any open group unemitted; called on seek.
    pub fn reset(&mut self) {
        self.current = None;
    }

    fn group_for(&mut self, period: ContentTimePeriod, sink: &mut dyn DecodeSink) -> &mut Group {
        let same = self
            .current
            .as_ref()
            .map(|g| g.period == period)
            .unwrap_or(false);
        if !same {
            if let Some(done) = self.current.take() {
                Self::emit(done, self.video_width, self.video_height, sink);
            }
            self.current = Some(Group {
                period,
                texts: Vec::new(),
                bitmaps: Vec::new(),
            });
        }
        // Just installed above when absent.
        self.current.as_mut().unwrap()
    }

    fn emit(group: Group, video_width: u32, video_height: u32, sink: &mut dyn DecodeSink) {
        for bitmap in group.bitmaps {
            let rect = bitmap.placement.resolve(video_width, video_height);
            sink.subtitle_bitmap(group.period, bitmap.image, rect);
        }
        if !group.texts.is_empty() {
            sink.subtitle_text_batch(group.period, group.texts);
        }
    }
}

/// Unpack PAL8 indices through a BGRA palette into tightly-packed RGBA.
///
/// The palette stores words little-endian as B, G, R, A; output byte order is
/// R, G, B, A.  Indices beyond the palette stay transparent.
pub fn unpack_pal8(indices: &[u8], palette: &[u32], width: u32, height: u32) -> RgbaImage {
    let mut out = vec![0u8; width as usize * height as usize * 4];
    for (i, &index) in indices
        .iter()
        .take(width as usize * height as usize)
        .enumerate()
    {
        if let Some(&word) = palette.get(index as usize) {
            let bytes = word.to_le_bytes();
            out[i * 4] = bytes[2];
            out[i * 4 + 1] = bytes[1];
            out[i * 4 + 2] = bytes[0];
            out[i * 4 + 3] = bytes[3];
        }
    }
    RgbaImage {
        width,
        height,
        data: Bytes::from(out),
    }
}

/// Strip ASS override tags and any dialogue prefix, leaving plain cue text.
pub fn strip_ass_tags(input: &str) -> String {
    // ASS dialogue lines have the form:
    // Dialogue: 0,0:00:01.00,0:00:04.00,Default,,0,0,0,,Text here
    // The cue text starts after the ninth comma.
    let text = if input.starts_with("Dialogue:") {
        let mut comma_count = 0;
        let mut start_index = input.len();
        for (i, c) in input.char_indices() {
            if c == ',' {
                comma_count += 1;
                if comma_count == 9 {
                    start_index = i + 1;
                    break;
                }
            }
        }
        &input[start_index..]
    } else {
        input
    };

    // Remove {\...} override blocks and convert \N line breaks.
    let mut result = String::with_capacity(text.len());
    let mut in_tag = false;
    let mut chars = text.chars().peekable();
    while let Some(c) = chars.next() {
        match c {
            '{' if !in_tag => in_tag = true,
            '}' if in_tag => in_tag = false,
            '\\' if !in_tag && matches!(chars.peek(), Some('N') | Some('n')) => {
                chars.next();
                result.push('\n');
            }
            c if !in_tag => result.push(c),
            _ => {}
        }
    }
    result.trim().to_string()
}
