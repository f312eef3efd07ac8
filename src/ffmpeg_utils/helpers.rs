//! Safe wrappers around FFmpeg FFI calls.
//!
//! Every function in this module is `pub` and **safe** to call.  All `unsafe`
//! blocks are contained here with explicit safety arguments.  Callers outside
//! this module should never need to write `unsafe` for routine FFmpeg access.

use ffmpeg_next as ffmpeg;

// ── Codec-parameter field accessors ─────────────────────────────────────────

/// Read `sample_rate` from an `AVCodecParameters` struct.
///
/// `ffmpeg-next` does not expose this field through a safe accessor.
pub fn codec_params_sample_rate(params: &ffmpeg::codec::parameters::Parameters) -> u32 {
    // SAFETY: `params.as_ptr()` returns a valid non-null pointer for the
    // lifetime of `params`.  `sample_rate` is a plain i32 field with no
    // ownership semantics.
    unsafe { (*params.as_ptr()).sample_rate as u32 }
}

/// Read `ch_layout.nb_channels` from an `AVCodecParameters` struct.
pub fn codec_params_channels(params: &ffmpeg::codec::parameters::Parameters) -> u16 {
    // SAFETY: same as `codec_params_sample_rate`.
    unsafe { (*params.as_ptr()).ch_layout.nb_channels as u16 }
}

/// Read `width` from an `AVCodecParameters` struct.
pub fn codec_params_width(params: &ffmpeg::codec::parameters::Parameters) -> u32 {
    unsafe { (*params.as_ptr()).width as u32 }
}

/// Read `height` from an `AVCodecParameters` struct.
pub fn codec_params_height(params: &ffmpeg::codec::parameters::Parameters) -> u32 {
    unsafe { (*params.as_ptr()).height as u32 }
}

// ── Seeking ─────────────────────────────────────────────────────────────────

/// Issue a backward keyframe seek on an input context.
///
/// `stream_index` of `-1` seeks on the default stream with `ts` in
/// `AV_TIME_BASE` units; otherwise `ts` is in the stream's own timebase.
/// The `BACKWARD` flag makes the demuxer land on the keyframe at or before
/// `ts`, which is what forward decoding after a seek requires.
pub fn seek_backward(
    input: &mut ffmpeg::format::context::Input,
    stream_index: i32,
    ts: i64,
) -> Result<(), ffmpeg::Error> {
    // SAFETY: `input.as_mut_ptr()` is valid for the lifetime of `input`.
    // `av_seek_frame` only mutates demuxer state owned by that context.
    let r = unsafe {
        ffmpeg::ffi::av_seek_frame(
            input.as_mut_ptr(),
            stream_index,
            ts,
            ffmpeg::ffi::AVSEEK_FLAG_BACKWARD as i32,
        )
    };
    if r < 0 {
        Err(ffmpeg::Error::from(r))
    } else {
        Ok(())
    }
}

// ── Audio plane access ──────────────────────────────────────────────────────

/// Extract an audio plane slice from an `AVFrame`.
///
/// Works around a bug in `ffmpeg-next`'s `Audio::data(index)` method where it
/// stops counting planes if `linesize[1] == 0`. In FFmpeg, planar audio frames
/// often only populate `linesize[0]` to represent the size of *every* plane.
pub fn audio_plane_data(frame: &ffmpeg::util::frame::Audio, index: usize) -> &[u8] {
    unsafe {
        let f = frame.as_ptr();
        let channels = (*f).ch_layout.nb_channels as usize;

        // Ensure index is valid for planar; packed has only 1 data plane.
        let is_planar = frame.format().is_planar();
        if is_planar {
            if index >= channels {
                return &[];
            }
        } else if index > 0 {
            return &[];
        }

        let ptrs = (*f).extended_data;
        if ptrs.is_null() {
            return &[];
        }

        let plane_ptr = *ptrs.add(index);
        if plane_ptr.is_null() {
            return &[];
        }

        let size = (*f).linesize[0] as usize;
        std::slice::from_raw_parts(plane_ptr, size)
    }
}

// ── Subtitle bitmap access ──────────────────────────────────────────────────

/// Copy a PAL8 bitmap rect's pixel indices into a tightly-packed row-major
/// buffer (`width * height` bytes), dropping any line padding.
///
/// Returns `None` if the rect carries no pixel data.
pub fn bitmap_indices(bitmap: &ffmpeg::codec::subtitle::Bitmap) -> Option<Vec<u8>> {
    let width = bitmap.width() as usize;
    let height = bitmap.height() as usize;
    if width == 0 || height == 0 {
        return None;
    }

    // SAFETY: `bitmap.as_ptr()` is a valid `AVSubtitleRect` for the lifetime
    // of `bitmap`.  `data[0]` holds `height` rows of palette indices spaced
    // `linesize[0]` bytes apart; we only read `width` bytes per row.
    unsafe {
        let rect = bitmap.as_ptr();
        let pixels = (*rect).data[0];
        if pixels.is_null() {
            return None;
        }
        let linesize = (*rect).linesize[0] as usize;

        let mut out = Vec::with_capacity(width * height);
        for row in 0..height {
            let line = std::slice::from_raw_parts(pixels.add(row * linesize), width);
            out.extend_from_slice(line);
        }
        Some(out)
    }
}

/// Read a PAL8 bitmap rect's palette as 32-bit words.
///
/// Each word is stored little-endian BGRA in memory (first byte B, then G, R,
/// A); callers are responsible for the channel swizzle.  Returns `None` if
/// the rect has no palette plane.
pub fn bitmap_palette(bitmap: &ffmpeg::codec::subtitle::Bitmap) -> Option<Vec<u32>> {
    let colors = bitmap.colors().min(256);

    // SAFETY: `data[1]` is the palette plane, `colors` entries of 4 bytes
    // each.  We copy it out immediately, so no lifetime escapes.
    unsafe {
        let rect = bitmap.as_ptr();
        let palette = (*rect).data[1];
        if palette.is_null() {
            return None;
        }
        let words = std::slice::from_raw_parts(palette as *const u32, colors);
        Some(words.to_vec())
    }
}
