use std::path::PathBuf;

use thiserror::Error;

/// Main error type for the decode subsystem
#[derive(Error, Debug)]
pub enum DecodeError {
    /// An error originating from the underlying FFmpeg library
    #[error("FFmpeg error: {0}")]
    Ffmpeg(#[from] ffmpeg_next::Error),

    /// An input or artifact file could not be read or written
    #[error("IO error on {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The file contains no streams this subsystem can decode
    #[error("No usable streams in {0:?}")]
    NoStreams(PathBuf),

    /// A stream required at session construction is missing from the file
    #[error("Stream not found: index={0}")]
    StreamNotFound(usize),

    /// The requested decoder could not be created for a stream
    #[error("Failed to create decoder for stream {index}: {reason}")]
    DecoderCreate { index: usize, reason: String },

    /// A raw audio frame uses a sample encoding this subsystem cannot convert
    #[error("Unrecognised audio sample format ({0})")]
    UnknownSampleFormat(String),

    /// A single subtitle payload carried more than one rectangle
    #[error("multi-part subtitles not yet supported")]
    MultiRectSubtitle,

    /// The analysis artifact on disk has a format version this build cannot read
    #[error("Unsupported analysis version {found} (expected {expected})")]
    AnalysisVersion { found: u32, expected: u32 },

    /// The analysis artifact could not be serialized or parsed
    #[error("Analysis serialization error: {0}")]
    AnalysisFormat(#[from] serde_json::Error),
}

impl DecodeError {
    /// Attach a path to a plain I/O error.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        DecodeError::Io {
            path: path.into(),
            source,
        }
    }
}

/// Result type alias for convenience
pub type Result<T> = std::result::Result<T, DecodeError>;
