//! FFmpeg utility functions

use ffmpeg_next as ffmpeg;

/// Convert a timebase to seconds-per-tick.
pub fn timebase_seconds(tb: ffmpeg::Rational) -> f64 {
    if tb.denominator() == 0 {
        0.0
    } else {
        tb.numerator() as f64 / tb.denominator() as f64
    }
}

/// Get frame rate as f64
pub fn framerate_to_f64(framerate: ffmpeg::Rational) -> f64 {
    if framerate.denominator() == 0 {
        0.0
    } else {
        framerate.numerator() as f64 / framerate.denominator() as f64
    }
}

/// Get the media type name
pub fn media_type_name(media_type: ffmpeg::media::Type) -> &'static str {
    match media_type {
        ffmpeg::media::Type::Video => "video",
        ffmpeg::media::Type::Audio => "audio",
        ffmpeg::media::Type::Subtitle => "subtitle",
        ffmpeg::media::Type::Data => "data",
        ffmpeg::media::Type::Attachment => "attachment",
        _ => "unknown",
    }
}

/// Extract language from stream metadata
pub fn get_stream_language(stream: &ffmpeg::Stream) -> Option<String> {
    stream.metadata().get("language").map(|s| s.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_timebase_seconds() {
        assert!((timebase_seconds(ffmpeg::Rational::new(1, 90000)) - 1.0 / 90000.0).abs() < 1e-12);
        assert_eq!(timebase_seconds(ffmpeg::Rational::new(1, 0)), 0.0);
    }

    #[test]
    fn test_framerate_to_f64() {
        assert_eq!(framerate_to_f64(ffmpeg::Rational::new(25, 1)), 25.0);
        assert!((framerate_to_f64(ffmpeg::Rational::new(30000, 1001)) - 29.97).abs() < 0.01);
        assert_eq!(framerate_to_f64(ffmpeg::Rational::new(24, 0)), 0.0);
    }
}
