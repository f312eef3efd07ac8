//! Conversion of raw decoded audio into canonical planar float PCM.
//!
//! Every supported native encoding is scaled to `[-1, 1]` using the
//! full-scale divisor for its source width.  Trailing bytes that do not form
//! a complete multi-channel frame are dropped, never padded.

use ffmpeg_next as ffmpeg;
use ffmpeg_next::format::sample::Type as SampleType;

use crate::audio::buffers::AudioBuffers;
use crate::error::{DecodeError, Result};
use crate::ffmpeg_utils::helpers::audio_plane_data;

/// The native sample encodings this subsystem can convert.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SampleEncoding {
    /// Unsigned 8-bit, interleaved, offset-binary around 128.
    U8,
    /// Signed 16-bit, interleaved.
    S16,
    /// Signed 16-bit, one plane per channel.
    S16Planar,
    /// Signed 32-bit, interleaved.
    S32,
    /// 32-bit float, interleaved.
    F32,
    /// 32-bit float, one plane per channel.
    F32Planar,
}

impl SampleEncoding {
    /// Map an FFmpeg sample format to a supported encoding.
    ///
    /// Anything else is a fatal decode error for the stream.
    pub fn from_ffmpeg(format: ffmpeg::format::Sample) -> Result<Self> {
        use ffmpeg::format::Sample;
        match format {
            Sample::U8(SampleType::Packed) => Ok(SampleEncoding::U8),
            Sample::I16(SampleType::Packed) => Ok(SampleEncoding::S16),
            Sample::I16(SampleType::Planar) => Ok(SampleEncoding::S16Planar),
            Sample::I32(SampleType::Packed) => Ok(SampleEncoding::S32),
            Sample::F32(SampleType::Packed) => Ok(SampleEncoding::F32),
            Sample::F32(SampleType::Planar) => Ok(SampleEncoding::F32Planar),
            other => Err(DecodeError::UnknownSampleFormat(format!("{:?}", other))),
        }
    }

    pub fn bytes_per_sample(self) -> usize {
        match self {
            SampleEncoding::U8 => 1,
            SampleEncoding::S16 | SampleEncoding::S16Planar => 2,
            SampleEncoding::S32 | SampleEncoding::F32 | SampleEncoding::F32Planar => 4,
        }
    }

    pub fn is_planar(self) -> bool {
        matches!(self, SampleEncoding::S16Planar | SampleEncoding::F32Planar)
    }
}

/// Convert one raw audio payload into planar float PCM.
///
/// For interleaved encodings only `planes[0]` is read; planar encodings read
/// one plane per channel.  Sample and frame counts are rounded down, so stray
/// bytes at the end of a packet that do not form a complete multi-channel
/// frame are silently dropped.
pub fn deinterleave(
    encoding: SampleEncoding,
    channels: usize,
    planes: &[&[u8]],
) -> Result<AudioBuffers> {
    debug_assert!(channels > 0);

    let bps = encoding.bytes_per_sample();

    if encoding.is_planar() {
        let frames = (0..channels)
            .map(|c| planes.get(c).map_or(0, |p| p.len() / bps))
            .min()
            .unwrap_or(0);
        let mut audio = AudioBuffers::new(channels, frames);
        for c in 0..channels {
            let plane = planes.get(c).copied().unwrap_or(&[]);
            let out = audio.channel_mut(c);
            match encoding {
                SampleEncoding::S16Planar => {
                    for (j, bytes) in plane.chunks_exact(2).take(frames).enumerate() {
                        let s = i16::from_ne_bytes([bytes[0], bytes[1]]);
                        out[j] = s as f32 / (1 << 15) as f32;
                    }
                }
                SampleEncoding::F32Planar => {
                    for (j, bytes) in plane.chunks_exact(4).take(frames).enumerate() {
                        out[j] = f32::from_ne_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]);
                    }
                }
                _ => unreachable!(),
            }
        }
        return Ok(audio);
    }

    let data = planes.first().copied().unwrap_or(&[]);
    let total_samples = data.len() / bps;
    let frames = total_samples / channels;
    let mut audio = AudioBuffers::new(channels, frames);

    // Walk interleaved samples channel-first, exactly `frames * channels` of
    // them, so a trailing partial frame never reaches the output.
    let mut channel = 0;
    let mut frame = 0;
    for i in 0..frames * channels {
        let sample = match encoding {
            SampleEncoding::U8 => {
                let b = data[i];
                (b as f32 - 128.0) / (1 << 7) as f32
            }
            SampleEncoding::S16 => {
                let s = i16::from_ne_bytes([data[i * 2], data[i * 2 + 1]]);
                s as f32 / (1 << 15) as f32
            }
            SampleEncoding::S32 => {
                let s = i32::from_ne_bytes([
                    data[i * 4],
                    data[i * 4 + 1],
                    data[i * 4 + 2],
                    data[i * 4 + 3],
                ]);
                s as f32 / 2_147_483_648.0
            }
            SampleEncoding::F32 => f32::from_ne_bytes([
                data[i * 4],
                data[i * 4 + 1],
                data[i * 4 + 2],
                data[i * 4 + 3],
            ]),
            _ => unreachable!(),
        };

        audio.channel_mut(channel)[frame] = sample;
        channel += 1;
        if channel == channels {
            channel = 0;
            frame += 1;
        }
    }

    Ok(audio)
}

/// Convert a decoded FFmpeg audio frame into planar float PCM.
///
/// Plane slices are clamped to the frame's declared sample count before
/// conversion, since `linesize` may include allocator padding.
pub fn convert_frame(frame: &ffmpeg::util::frame::Audio) -> Result<AudioBuffers> {
    let encoding = SampleEncoding::from_ffmpeg(frame.format())?;
    let channels = frame.channels() as usize;
    let samples = frame.samples();
    let bps = encoding.bytes_per_sample();

    if encoding.is_planar() {
        let expected = samples * bps;
        let planes: Vec<&[u8]> = (0..channels)
            .map(|c| {
                let p = audio_plane_data(frame, c);
                &p[..expected.min(p.len())]
            })
            .collect();
        deinterleave(encoding, channels, &planes)
    } else {
        let expected = samples * channels * bps;
        let p = audio_plane_data(frame, 0);
        deinterleave(encoding, channels, &[&p[..expected.min(p.len())]])
    }
}
