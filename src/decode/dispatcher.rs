//! Decode dispatch: the per-session state machine.
//!
//! A session is driven by repeated synchronous `advance` calls from one
//! worker.  Each call pulls one packet, classifies it by stream and routes it
//! to the video, audio or subtitle path; end of stream (or a hard demux
//! error, which is logged and treated the same) drains every codec and
//! finishes the session without failing the job.

use std::sync::Arc;

use ffmpeg_next as ffmpeg;
use ffmpeg_next::codec::subtitle::Rect;

use crate::audio::sample;
use crate::decode::filter::FilterCache;
use crate::decode::sink::DecodeSink;
use crate::decode::subtitle::{
    strip_ass_tags, unpack_pal8, BitmapCue, BitmapPlacement, PeriodAssembler, TextCue,
};
use crate::error::{DecodeError, Result};
use crate::ffmpeg_utils::helpers::{bitmap_indices, bitmap_palette, seek_backward};
use crate::ffmpeg_utils::utils::timebase_seconds;
use crate::probe::scanner;
use crate::time::{ContentTime, ContentTimePeriod};
use crate::types::{MediaProbe, SubtitleStream};

/// Lead time subtracted before an accurate seek, so the true target is
/// always reachable by forward decoding from the keyframe the native seek
/// lands on.
pub const SEEK_PRE_ROLL: ContentTime = ContentTime::new(2 * ContentTime::HZ);

/// Session configuration.
#[derive(Debug, Clone, Default)]
pub struct DecodeOptions {
    /// Skip the video decode path entirely (audio analysis does this).
    pub ignore_video: bool,
    /// Follow this subtitle stream instead of the probe's default selection.
    /// Naming a stream the file does not have fails session construction.
    pub subtitle_stream: Option<usize>,
}

/// Compute the one-per-session offset added to every decoded timestamp.
///
/// The offset shifts the earliest-starting stream to time zero, is clamped
/// so content native to negative time is dropped rather than shifted
/// forward, and is then extended so the first video frame lands exactly on a
/// frame boundary at the stream's frame rate.
pub fn compute_pts_offset(probe: &MediaProbe) -> ContentTime {
    let mut offset = ContentTime::MIN;

    if let Some(first) = probe.video.as_ref().and_then(|v| v.first_pts) {
        offset = -first;
    }
    for audio in &probe.audio {
        if let Some(first) = audio.first_pts {
            offset = offset.max(-first);
        }
    }

    if offset == ContentTime::MIN {
        // No stream reported a first timestamp.
        return ContentTime::ZERO;
    }

    // A positive offset would pull content from negative native time into
    // view; such content is meant to stay unseen (alignment bars etc.).
    if offset > ContentTime::ZERO {
        offset = ContentTime::ZERO;
    }

    if let Some(video) = &probe.video {
        if let Some(first) = video.first_pts {
            let corrected = first + offset;
            offset += corrected.round_up(video.frame_rate) - corrected;
        }
    }

    offset
}

/// Where a seek lands on the native clock: the target minus pre-roll (when
/// accurate) and minus the alignment offset, clamped at zero.
pub fn native_seek_target(target: ContentTime, offset: ContentTime, accurate: bool) -> ContentTime {
    let pre_roll = if accurate {
        SEEK_PRE_ROLL
    } else {
        ContentTime::ZERO
    };
    (target - pre_roll - offset).max(ContentTime::ZERO)
}

/// Dispatcher states.  Flushing is observable only while `advance` drains
/// the codecs on end of stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Running,
    Flushing,
    Done,
}

struct VideoState {
    index: usize,
    time_base: ffmpeg::Rational,
    frame_rate: f64,
    decoder: ffmpeg::decoder::Video,
}

struct AudioState {
    index: usize,
    time_base: ffmpeg::Rational,
    decoder: ffmpeg::decoder::Audio,
}

struct SubtitleState {
    index: usize,
    time_base: ffmpeg::Rational,
    decoder: ffmpeg::decoder::Subtitle,
    /// Carries the cue timing table built at probe time.
    stream: SubtitleStream,
}

/// One decode session over one input file.
pub struct DecodeSession {
    input: ffmpeg::format::context::Input,
    options: DecodeOptions,
    pts_offset: ContentTime,
    state: SessionState,
    video: Option<VideoState>,
    audio: Vec<AudioState>,
    subtitle: Option<SubtitleState>,
    assembler: PeriodAssembler,
    filters: Arc<FilterCache>,
}

impl DecodeSession {
    /// Open decoders for every probed stream and fix the session's PTS
    /// offset.
    pub fn open(
        probe: &MediaProbe,
        options: DecodeOptions,
        filters: Arc<FilterCache>,
    ) -> Result<Self> {
        crate::ffmpeg_utils::init()?;

        let input = scanner::open_input(&probe.path)?;

        let video = match &probe.video {
            Some(v) => {
                let stream = input
                    .stream(v.index)
                    .ok_or(DecodeError::StreamNotFound(v.index))?;
                let context = ffmpeg::codec::Context::from_parameters(stream.parameters())?;
                let decoder =
                    context
                        .decoder()
                        .video()
                        .map_err(|e| DecodeError::DecoderCreate {
                            index: v.index,
                            reason: e.to_string(),
                        })?;
                Some(VideoState {
                    index: v.index,
                    time_base: stream.time_base(),
                    frame_rate: v.frame_rate,
                    decoder,
                })
            }
            None => None,
        };

        let mut audio = Vec::with_capacity(probe.audio.len());
        for a in &probe.audio {
            let stream = input
                .stream(a.index)
                .ok_or(DecodeError::StreamNotFound(a.index))?;
            let context = ffmpeg::codec::Context::from_parameters(stream.parameters())?;
            let decoder = context
                .decoder()
                .audio()
                .map_err(|e| DecodeError::DecoderCreate {
                    index: a.index,
                    reason: e.to_string(),
                })?;
            audio.push(AudioState {
                index: a.index,
                time_base: stream.time_base(),
                decoder,
            });
        }

        let selected_subtitle = match options.subtitle_stream {
            Some(index) => Some(
                probe
                    .subtitles
                    .iter()
                    .find(|s| s.index == index)
                    .ok_or(DecodeError::StreamNotFound(index))?,
            ),
            None => probe.subtitle_stream(),
        };
        let subtitle = match selected_subtitle {
            Some(s) => {
                let stream = input
                    .stream(s.index)
                    .ok_or(DecodeError::StreamNotFound(s.index))?;
                let context = ffmpeg::codec::Context::from_parameters(stream.parameters())?;
                let decoder =
                    context
                        .decoder()
                        .subtitle()
                        .map_err(|e| DecodeError::DecoderCreate {
                            index: s.index,
                            reason: e.to_string(),
                        })?;
                Some(SubtitleState {
                    index: s.index,
                    time_base: stream.time_base(),
                    decoder,
                    stream: s.clone(),
                })
            }
            None => None,
        };

        let (video_width, video_height) = probe
            .video
            .as_ref()
            .map(|v| (v.width.max(1), v.height.max(1)))
            .unwrap_or((1, 1));

        let pts_offset = compute_pts_offset(probe);
        tracing::info!(
            "Decode session for {:?}: pts_offset={}, video={}, audio={}, subtitle={}",
            probe.path,
            pts_offset,
            video.is_some() as u8,
            audio.len(),
            subtitle.is_some() as u8
        );

        Ok(DecodeSession {
            input,
            options,
            pts_offset,
            state: SessionState::Running,
            video,
            audio,
            subtitle,
            assembler: PeriodAssembler::new(video_width, video_height),
            filters,
        })
    }

    /// The offset applied to every emitted timestamp.
    pub fn pts_offset(&self) -> ContentTime {
        self.pts_offset
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Pull and route one packet.  Returns `true` once the session is done.
    pub fn advance(&mut self, sink: &mut dyn DecodeSink) -> Result<bool> {
        if self.state == SessionState::Done {
            return Ok(true);
        }

        let mut packet = ffmpeg::Packet::empty();
        if let Err(e) = packet.read(&mut self.input) {
            // The demuxer sometimes reports invalid data even when it has
            // produced a usable packet; carry on with the payload then.
            if e != ffmpeg::Error::InvalidData {
                if e != ffmpeg::Error::Eof {
                    tracing::error!("error reading packet: {}", e);
                }
                self.state = SessionState::Flushing;
                self.flush(sink)?;
                self.state = SessionState::Done;
                return Ok(true);
            }
            // A blank packet would reach a decoder as a drain request
            // (stream index 0), so only a packet that actually carries a
            // payload is routed.
            if !packet_has_payload(&packet) {
                tracing::debug!("Skipping payload-less packet after invalid data");
                return Ok(false);
            }
        }

        let si = packet.stream();

        let is_video = self.video.as_ref().map(|v| v.index == si).unwrap_or(false);
        let is_subtitle = self
            .subtitle
            .as_ref()
            .map(|s| s.index == si)
            .unwrap_or(false);

        if is_video && !self.options.ignore_video {
            self.decode_video_packet(&packet, sink)?;
        } else if is_subtitle {
            self.decode_subtitle_packet(&packet, sink)?;
        } else if !is_video {
            self.decode_audio_packet(&packet, sink)?;
        }

        Ok(false)
    }

    /// Seek to `target` on the corrected axis.
    ///
    /// Accurate seeks subtract a fixed pre-roll, because the native seek
    /// lands on the keyframe at or before the position and the caller is
    /// expected to discard frames before the true target.  All buffered
    /// decode state is invalidated.
    pub fn seek(&mut self, target: ContentTime, accurate: bool) -> Result<()> {
        self.assembler.reset();

        let native = native_seek_target(target, self.pts_offset, accurate);
        let (stream_index, ts) = match &self.video {
            Some(v) => (
                v.index as i32,
                (native.seconds() / timebase_seconds(v.time_base)).round() as i64,
            ),
            None => (
                -1,
                (native.seconds() * ffmpeg::ffi::AV_TIME_BASE as f64).round() as i64,
            ),
        };
        tracing::debug!(
            "Seek to {} (accurate={}): native position {}",
            target,
            accurate,
            native
        );
        seek_backward(&mut self.input, stream_index, ts)?;

        if let Some(v) = self.video.as_mut() {
            v.decoder.flush();
        }
        for a in &mut self.audio {
            a.decoder.flush();
        }
        if let Some(s) = self.subtitle.as_mut() {
            s.decoder.flush();
        }

        self.state = SessionState::Running;
        Ok(())
    }

    /// Drain every codec's buffered frames and close any open subtitle
    /// group.
    fn flush(&mut self, sink: &mut dyn DecodeSink) -> Result<()> {
        if self.video.is_some() && !self.options.ignore_video {
            if let Some(v) = self.video.as_mut() {
                send_eof_tolerant(&mut v.decoder, v.index)?;
            }
            self.receive_video_frames(sink)?;
        }

        for i in 0..self.audio.len() {
            let (index, r) = {
                let a = &mut self.audio[i];
                (a.index, send_eof_tolerant(&mut a.decoder, a.index))
            };
            r?;
            self.receive_audio_frames(i, index, sink)?;
        }

        self.assembler.flush(sink);
        Ok(())
    }

    fn decode_video_packet(&mut self, packet: &ffmpeg::Packet, sink: &mut dyn DecodeSink) -> Result<()> {
        let video = match self.video.as_mut() {
            Some(v) => v,
            None => return Ok(()),
        };
        match video.decoder.send_packet(packet) {
            Ok(()) => {}
            Err(ffmpeg::Error::InvalidData) => {
                tracing::debug!(
                    stream_index = video.index,
                    "send_packet: skipping invalid video packet"
                );
                return Ok(());
            }
            Err(e) => return Err(e.into()),
        }
        self.receive_video_frames(sink)
    }

    fn receive_video_frames(&mut self, sink: &mut dyn DecodeSink) -> Result<()> {
        let video = match self.video.as_mut() {
            Some(v) => v,
            None => return Ok(()),
        };
        let mut frame = ffmpeg::util::frame::Video::empty();
        loop {
            match video.decoder.receive_frame(&mut frame) {
                Ok(()) => match frame.timestamp() {
                    Some(ts) => {
                        let pts = ts as f64 * timebase_seconds(video.time_base)
                            + self.pts_offset.seconds();
                        let image = self.filters.process(&frame)?;
                        sink.video_frame(image, (pts * video.frame_rate).round() as i64);
                    }
                    None => tracing::warn!("Dropping frame without PTS"),
                },
                Err(ffmpeg::Error::Other { errno }) if errno == ffmpeg::error::EAGAIN => break,
                Err(ffmpeg::Error::Eof) => break,
                Err(e) => return Err(e.into()),
            }
        }
        Ok(())
    }

    fn decode_audio_packet(&mut self, packet: &ffmpeg::Packet, sink: &mut dyn DecodeSink) -> Result<()> {
        let si = packet.stream();
        let position = match self.audio.iter().position(|a| a.index == si) {
            Some(p) => p,
            None => {
                // Packets from unselected streams must not abort decoding.
                tracing::debug!(stream_index = si, "Ignoring packet from unknown stream");
                return Ok(());
            }
        };

        {
            let audio = &mut self.audio[position];
            match audio.decoder.send_packet(packet) {
                Ok(()) => {}
                Err(ffmpeg::Error::InvalidData) => {
                    tracing::debug!(
                        stream_index = audio.index,
                        "send_packet: skipping invalid audio packet"
                    );
                    return Ok(());
                }
                Err(e) => return Err(e.into()),
            }
        }

        self.receive_audio_frames(position, si, sink)
    }

    fn receive_audio_frames(
        &mut self,
        position: usize,
        stream_index: usize,
        sink: &mut dyn DecodeSink,
    ) -> Result<()> {
        let mut frame = ffmpeg::util::frame::Audio::empty();
        loop {
            let audio = &mut self.audio[position];
            match audio.decoder.receive_frame(&mut frame) {
                Ok(()) => match frame.timestamp() {
                    Some(ts) => {
                        let ct = ContentTime::from_seconds(
                            ts as f64 * timebase_seconds(audio.time_base),
                        ) + self.pts_offset;
                        let buffers = sample::convert_frame(&frame)?;
                        sink.audio_block(stream_index, buffers, ct);
                    }
                    None => tracing::warn!("Dropping audio block without PTS"),
                },
                Err(ffmpeg::Error::Other { errno }) if errno == ffmpeg::error::EAGAIN => break,
                Err(ffmpeg::Error::Eof) => break,
                Err(e) => return Err(e.into()),
            }
        }
        Ok(())
    }

    fn decode_subtitle_packet(
        &mut self,
        packet: &ffmpeg::Packet,
        sink: &mut dyn DecodeSink,
    ) -> Result<()> {
        let sub_state = match self.subtitle.as_mut() {
            Some(s) => s,
            None => return Ok(()),
        };

        let mut sub = ffmpeg::Subtitle::new();
        match sub_state.decoder.decode(packet, &mut sub) {
            Ok(true) => {}
            Ok(false) => return Ok(()),
            Err(e) => {
                tracing::warn!(stream_index = sub_state.index, "Subtitle decode failed: {}", e);
                return Ok(());
            }
        }

        let rect_count = sub.rects().count();
        if rect_count == 0 {
            // Some codecs emit an empty payload meaning "clear the previous
            // cue"; nothing to do here.
            return Ok(());
        }
        if rect_count > 1 {
            return Err(DecodeError::MultiRectSubtitle);
        }

        let from_native = match scanner::cue_start(&sub, packet, sub_state.time_base) {
            Some(t) => t,
            None => {
                tracing::warn!("Dropping subtitle without PTS");
                return Ok(());
            }
        };
        let to_native = if sub.end() != u32::MAX {
            from_native
                + ContentTime::from_seconds(sub.end().saturating_sub(sub.start()) as f64 / 1000.0)
        } else {
            // The codec only signals "clear at next cue"; consult the timing
            // table built at probe time.
            match sub_state.stream.find_cue_end(from_native) {
                Some(t) => t,
                None => {
                    tracing::warn!("No recorded end for cue starting at {}", from_native);
                    return Ok(());
                }
            }
        };
        let period = ContentTimePeriod::new(
            from_native + self.pts_offset,
            to_native + self.pts_offset,
        );

        if let Some(rect) = sub.rects().next() {
            match rect {
                Rect::Text(text) => {
                    let text = text.get().trim().to_string();
                    if !text.is_empty() {
                        self.assembler.push_text(period, TextCue::new(text), sink);
                    }
                }
                Rect::Ass(ass) => {
                    let text = strip_ass_tags(ass.get());
                    if !text.is_empty() {
                        self.assembler.push_text(period, TextCue::new(text), sink);
                    }
                }
                Rect::Bitmap(bitmap) => {
                    match (bitmap_indices(&bitmap), bitmap_palette(&bitmap)) {
                        (Some(indices), Some(palette)) => {
                            let image = unpack_pal8(
                                &indices,
                                &palette,
                                bitmap.width(),
                                bitmap.height(),
                            );
                            let cue = BitmapCue {
                                image,
                                placement: BitmapPlacement::Pixels {
                                    x: bitmap.x() as u32,
                                    y: bitmap.y() as u32,
                                    width: bitmap.width(),
                                    height: bitmap.height(),
                                },
                            };
                            self.assembler.push_bitmap(period, cue, sink);
                        }
                        _ => tracing::warn!("Bitmap subtitle rect without pixel data"),
                    }
                }
                Rect::None(_) => {}
            }
        }

        Ok(())
    }
}

/// Whether a packet surviving a benign demux error carries data worth
/// routing.  `avcodec_send_packet` treats a data-less packet as end of
/// stream, which must never happen mid-session.
fn packet_has_payload(packet: &ffmpeg::Packet) -> bool {
    packet.size() > 0
}

/// Send EOF to flush a decoder's internal buffers.
///
/// EAGAIN and EOF responses mean the decoder has nothing buffered or is
/// already finished, which is not an error.
fn send_eof_tolerant(
    decoder: &mut ffmpeg::codec::decoder::Opened,
    stream_index: usize,
) -> Result<()> {
    match decoder.send_eof() {
        Ok(()) => Ok(()),
        Err(ffmpeg::Error::Other { errno }) if errno == ffmpeg::error::EAGAIN => Ok(()),
        Err(ffmpeg::Error::Eof) => Ok(()),
        Err(e) => {
            tracing::warn!(stream_index, "send_eof failed: {}", e);
            Err(e.into())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{AudioStream, VideoStream};
    use std::path::PathBuf;

    fn probe_with(video_first: Option<f64>, audio_firsts: &[Option<f64>]) -> MediaProbe {
        let mut probe = MediaProbe::new(PathBuf::from("/test/a.mkv"));
        probe.video = Some(VideoStream {
            index: 0,
            codec_id: ffmpeg::codec::Id::H264,
            width: 1920,
            height: 1080,
            frame_rate: 25.0,
            first_pts: video_first.map(ContentTime::from_seconds),
        });
        for (i, first) in audio_firsts.iter().enumerate() {
            probe.audio.push(AudioStream {
                index: i + 1,
                codec_id: ffmpeg::codec::Id::AAC,
                channels: 2,
                sample_rate: 48_000,
                first_pts: first.map(ContentTime::from_seconds),
            });
        }
        probe
    }

    #[test]
    fn test_offset_shifts_latest_starter_to_zero() {
        // Video at 0.5s, audio at 0.7s: the offset must not push audio
        // negative, so it is -0.5s (the smaller magnitude), then extended to
        // the 25fps frame boundary.
        let probe = probe_with(Some(0.5), &[Some(0.7)]);
        let offset = compute_pts_offset(&probe);

        let video_corrected = ContentTime::from_seconds(0.5) + offset;
        let audio_corrected = ContentTime::from_seconds(0.7) + offset;
        assert!(video_corrected >= ContentTime::ZERO);
        assert!(audio_corrected >= ContentTime::ZERO);

        let frame = ContentTime::HZ / 25;
        assert_eq!(video_corrected.ticks() % frame, 0);
    }

    #[test]
    fn test_offset_zero_when_no_first_timestamps() {
        let probe = probe_with(None, &[None, None]);
        assert_eq!(compute_pts_offset(&probe), ContentTime::ZERO);
    }

    #[test]
    fn test_positive_offset_is_clamped() {
        // All streams start at negative native time; shifting them forward
        // is not wanted, so the offset clamps to zero (frame-boundary
        // extension of a negative first pts then keeps it non-positive).
        let probe = probe_with(Some(-1.0), &[Some(-0.5)]);
        let offset = compute_pts_offset(&probe);
        assert!(offset <= ContentTime::ZERO);

        // The clamp happens before frame-boundary rounding: -1.0s + 0 =
        // -1.0s rounds up to -1.0s exactly at 25fps, leaving offset at zero.
        assert_eq!(offset, ContentTime::ZERO);
    }

    #[test]
    fn test_first_video_lands_on_frame_boundary() {
        for &(video, audio) in &[(0.013, 0.0), (0.2, 0.15), (1.0 / 3.0, 0.5)] {
            let probe = probe_with(Some(video), &[Some(audio)]);
            let offset = compute_pts_offset(&probe);
            let corrected = ContentTime::from_seconds(video) + offset;
            let frame = ContentTime::HZ / 25;
            assert_eq!(corrected.ticks() % frame, 0, "video first pts {}", video);
            assert!(corrected >= ContentTime::ZERO);
        }
    }

    #[test]
    fn test_audio_only_alignment() {
        let mut probe = probe_with(None, &[Some(0.25), Some(0.5)]);
        probe.video = None;
        let offset = compute_pts_offset(&probe);

        // The later starter pins the offset so nobody goes negative.
        assert_eq!(offset, ContentTime::from_seconds(-0.25));
    }

    #[test]
    fn test_native_seek_target_applies_pre_roll() {
        let offset = ContentTime::from_seconds(-0.5);
        let target = ContentTime::from_seconds(10.0);

        let accurate = native_seek_target(target, offset, true);
        let fast = native_seek_target(target, offset, false);

        // target - 2s pre-roll - (-0.5s) = 8.5s; without pre-roll 10.5s.
        assert_eq!(accurate, ContentTime::from_seconds(8.5));
        assert_eq!(fast, ContentTime::from_seconds(10.5));
        assert!(accurate < fast);
    }

    #[test]
    fn test_blank_packet_carries_no_payload() {
        // `Packet::empty` is what a failed read leaves behind; routing it
        // into a decoder would act as a drain request, so it must be
        // filtered out before dispatch.
        assert!(!packet_has_payload(&ffmpeg::Packet::empty()));
        assert!(packet_has_payload(&ffmpeg::Packet::copy(&[0u8; 4])));
    }

    #[test]
    fn test_native_seek_target_clamps_at_zero() {
        let t = native_seek_target(ContentTime::from_seconds(1.0), ContentTime::ZERO, true);
        assert_eq!(t, ContentTime::ZERO);
    }
}
