//! File scanner - discovers streams and captures alignment metadata.
//!
//! A scan classifies every stream into the closed video/audio/subtitle model,
//! then decodes the head of the file to observe each stream's first presented
//! timestamp.  When the file carries a subtitle stream the scan also walks
//! its packets to build the cue timing table consulted during decoding for
//! codecs that only signal "clear at next cue".

use std::path::Path;

use ffmpeg_next as ffmpeg;

use crate::error::{DecodeError, Result};
use crate::ffmpeg_utils::helpers::{
    codec_params_channels, codec_params_height, codec_params_sample_rate, codec_params_width,
};
use crate::ffmpeg_utils::utils::{
    framerate_to_f64, get_stream_language, media_type_name, timebase_seconds,
};
use crate::time::{ContentTime, ContentTimePeriod};
use crate::types::{AudioStream, MediaProbe, SubtitleStream, VideoStream};

/// Packets examined before giving up on a stream that never reports a
/// timestamp.  Only applies when no subtitle table is being built; a selected
/// subtitle stream forces the scan to run to end of file.
const FIRST_PTS_PACKET_BUDGET: usize = 4096;

/// Scan a media file and extract everything decode sessions need.
pub fn scan<P: AsRef<Path>>(path: P) -> Result<MediaProbe> {
    let path = path.as_ref().to_path_buf();

    crate::ffmpeg_utils::init()?;

    let mut input = open_input(&path)?;

    let mut probe = MediaProbe::new(path.clone());
    if input.duration() > 0 {
        probe.duration = Some(ContentTime::from_seconds(
            input.duration() as f64 / ffmpeg::ffi::AV_TIME_BASE as f64,
        ));
    }

    for (i, stream) in input.streams().enumerate() {
        let params = stream.parameters();
        match params.medium() {
            ffmpeg::media::Type::Video if probe.video.is_none() => {
                let info = VideoStream {
                    index: i,
                    codec_id: params.id(),
                    width: codec_params_width(&params),
                    height: codec_params_height(&params),
                    frame_rate: framerate_to_f64(stream.avg_frame_rate()),
                    first_pts: None,
                };
                tracing::debug!(
                    "Found video stream: {}x{} @ {:.3} fps, codec={:?}",
                    info.width,
                    info.height,
                    info.frame_rate,
                    info.codec_id
                );
                probe.video = Some(info);
            }
            ffmpeg::media::Type::Video => {
                tracing::debug!("Ignoring additional video stream {}", i);
            }
            ffmpeg::media::Type::Audio => {
                let info = AudioStream {
                    index: i,
                    codec_id: params.id(),
                    channels: codec_params_channels(&params),
                    sample_rate: codec_params_sample_rate(&params),
                    first_pts: None,
                };
                tracing::debug!(
                    "Found audio stream: {}Hz, {} channels, codec={:?}",
                    info.sample_rate,
                    info.channels,
                    info.codec_id
                );
                probe.audio.push(info);
            }
            ffmpeg::media::Type::Subtitle => {
                let info = SubtitleStream::new(i, params.id(), get_stream_language(&stream));
                tracing::debug!(
                    "Found subtitle stream: language={:?}, codec={:?}",
                    info.language,
                    info.codec_id
                );
                probe.subtitles.push(info);
            }
            other => tracing::debug!("Skipping {} stream {}", media_type_name(other), i),
        }
    }

    if probe.video.is_none() && probe.audio.is_empty() && probe.subtitles.is_empty() {
        return Err(DecodeError::NoStreams(path));
    }

    probe.selected_subtitle = probe.subtitles.first().map(|s| s.index);

    examine_head(&mut input, &mut probe)?;

    tracing::info!(
        "Probed {:?}: duration={:?}, video={}, audio={}, subtitles={}",
        path,
        probe.duration.map(|d| d.seconds()),
        probe.video.is_some() as u8,
        probe.audio.len(),
        probe.subtitles.len()
    );

    Ok(probe)
}

/// Open an input file, attaching the path and OS error on failure.
pub(crate) fn open_input(path: &Path) -> Result<ffmpeg::format::context::Input> {
    ffmpeg::format::input(&path).map_err(|e| match e {
        ffmpeg::Error::Other { errno } => {
            DecodeError::io(path, std::io::Error::from_raw_os_error(errno))
        }
        other => DecodeError::Ffmpeg(other),
    })
}

/// Decode the head of the file to capture per-stream first timestamps, and
/// walk the selected subtitle stream to build its cue timing table.
fn examine_head(input: &mut ffmpeg::format::context::Input, probe: &mut MediaProbe) -> Result<()> {
    let mut video_decoder = match &probe.video {
        Some(v) => {
            let stream = input
                .stream(v.index)
                .ok_or(DecodeError::StreamNotFound(v.index))?;
            let context = ffmpeg::codec::Context::from_parameters(stream.parameters())?;
            match context.decoder().video() {
                Ok(d) => Some((v.index, stream.time_base(), d)),
                Err(e) => {
                    // A video stream we cannot decode never aborts the scan.
                    tracing::warn!("Failed to open video decoder for stream {}: {}", v.index, e);
                    None
                }
            }
        }
        None => None,
    };

    let mut subtitle_decoder = match probe.selected_subtitle {
        Some(index) => {
            let stream = input
                .stream(index)
                .ok_or(DecodeError::StreamNotFound(index))?;
            let context = ffmpeg::codec::Context::from_parameters(stream.parameters())?;
            match context.decoder().subtitle() {
                Ok(d) => Some((index, stream.time_base(), d)),
                Err(e) => {
                    tracing::warn!(
                        "Failed to open subtitle decoder for stream {}: {}",
                        index,
                        e
                    );
                    None
                }
            }
        }
        None => None,
    };

    let audio_timebases: Vec<(usize, ffmpeg::Rational)> = probe
        .audio
        .iter()
        .filter_map(|a| input.stream(a.index).map(|s| (a.index, s.time_base())))
        .collect();

    // A cue whose end the codec left open, waiting for the next cue's start.
    let mut pending_cue: Option<ContentTime> = None;

    let mut packets_read: usize = 0;
    let mut packet = ffmpeg::Packet::empty();

    loop {
        match packet.read(input) {
            Ok(()) => {}
            Err(ffmpeg::Error::InvalidData) => continue,
            Err(_) => break,
        }
        packets_read += 1;

        let si = packet.stream();

        if let Some((index, tb, decoder)) = video_decoder.as_mut() {
            if si == *index && decoder.send_packet(&packet).is_ok() {
                let mut frame = ffmpeg::util::frame::Video::empty();
                while decoder.receive_frame(&mut frame).is_ok() {
                    if let Some(ts) = frame.timestamp() {
                        let first = ContentTime::from_seconds(ts as f64 * timebase_seconds(*tb));
                        if let Some(v) = probe.video.as_mut() {
                            v.first_pts = Some(first);
                        }
                        break;
                    }
                }
            }
        }
        if probe.video.as_ref().and_then(|v| v.first_pts).is_some() {
            // First frame seen; stop paying for video decoding.
            video_decoder = None;
        }

        if let Some((index, tb, decoder)) = subtitle_decoder.as_mut() {
            if si == *index {
                let mut sub = ffmpeg::Subtitle::new();
                match decoder.decode(&packet, &mut sub) {
                    Ok(true) => {
                        record_cue(probe, *index, *tb, &packet, &sub, &mut pending_cue);
                    }
                    Ok(false) => {}
                    Err(e) => tracing::debug!("Subtitle decode failed while probing: {}", e),
                }
            }
        }

        if let Some((_, tb)) = audio_timebases.iter().find(|(idx, _)| *idx == si) {
            if let Some(audio) = probe.audio.iter_mut().find(|a| a.index == si) {
                if audio.first_pts.is_none() {
                    if let Some(pts) = packet.pts() {
                        audio.first_pts =
                            Some(ContentTime::from_seconds(pts as f64 * timebase_seconds(*tb)));
                    }
                }
            }
        }

        // Building a subtitle timing table requires the whole file; otherwise
        // stop once everything has reported, or when the budget runs out.
        if subtitle_decoder.is_none() {
            let video_done = probe
                .video
                .as_ref()
                .map(|v| v.first_pts.is_some())
                .unwrap_or(true);
            let audio_done = probe.audio.iter().all(|a| a.first_pts.is_some());
            if (video_done && audio_done) || packets_read >= FIRST_PTS_PACKET_BUDGET {
                break;
            }
        }
    }

    if let Some(from) = pending_cue {
        tracing::debug!(
            "Cue starting at {} never saw a following cue; leaving its end unrecorded",
            from
        );
    }

    Ok(())
}

/// Record one decoded cue's native period in the selected stream's table.
///
/// A cue with an open end (`end_display_time == u32::MAX`) stays pending
/// until the next cue's start supplies its end.
fn record_cue(
    probe: &mut MediaProbe,
    stream_index: usize,
    time_base: ffmpeg::Rational,
    packet: &ffmpeg::Packet,
    sub: &ffmpeg::Subtitle,
    pending_cue: &mut Option<ContentTime>,
) {
    let from = match cue_start(sub, packet, time_base) {
        Some(t) => t,
        None => return,
    };

    let stream = match probe.subtitles.iter_mut().find(|s| s.index == stream_index) {
        Some(s) => s,
        None => return,
    };

    if let Some(pending_from) = pending_cue.take() {
        stream.record_cue(ContentTimePeriod::new(pending_from, from));
    }

    if sub.end() == u32::MAX {
        *pending_cue = Some(from);
    } else {
        let to = from + ContentTime::from_seconds(sub.end().saturating_sub(sub.start()) as f64 / 1000.0);
        stream.record_cue(ContentTimePeriod::new(from, to));
    }
}

/// Native start time of a decoded cue: subtitle pts (microseconds) when the
/// codec provides one, otherwise the packet pts, plus the start display
/// offset.
pub(crate) fn cue_start(
    sub: &ffmpeg::Subtitle,
    packet: &ffmpeg::Packet,
    time_base: ffmpeg::Rational,
) -> Option<ContentTime> {
    let base = match sub.pts() {
        Some(pts) => ContentTime::from_seconds(pts as f64 / ffmpeg::ffi::AV_TIME_BASE as f64),
        None => {
            let pts = packet.pts()?;
            ContentTime::from_seconds(pts as f64 * timebase_seconds(time_base))
        }
    };
    Some(base + ContentTime::from_seconds(sub.start() as f64 / 1000.0))
}
