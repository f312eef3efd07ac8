//! Public entry points.
//!
//! Everything a caller needs: probe a file (through the shared cache), open a
//! decode session over the probe, and run an audio analysis.

use std::path::Path;
use std::sync::Arc;

use crate::decode::{DecodeOptions, DecodeSession, FilterCache};
use crate::error::Result;
use crate::probe::probe_cache;
use crate::types::MediaProbe;

pub use crate::analysis::{
    analyse_audio, AnalysisEngine, AudioAnalysis, AudioSource, ContentItem, GlobalPeak,
    PointSnapshot, Timeline, ANALYSIS_VERSION,
};
pub use crate::decode::{
    BitmapCue, BitmapPlacement, DecodeSink, PeriodAssembler, TextCue,
};
pub use crate::decode::dispatcher::SessionState;
pub use crate::job::{CollectingProgress, JobOutcome, NullProgress, ProgressSink};
pub use crate::probe::{ProbeCache, ProbeCacheStats};
pub use crate::types::{
    AudioStream, FractionalRect, HAlign, RgbImage, RgbaImage, SubtitleStream, VAlign, VideoStream,
};

/// Probe a media file, using the process-wide cache.
pub fn probe_file<P: AsRef<Path>>(path: P) -> Result<Arc<MediaProbe>> {
    probe_cache().get_or_scan(path.as_ref())
}

/// Probe a file and open a decode session over it in one step.
pub fn open_session<P: AsRef<Path>>(
    path: P,
    options: DecodeOptions,
    filters: Arc<FilterCache>,
) -> Result<DecodeSession> {
    let probe = probe_file(path)?;
    DecodeSession::open(&probe, options, filters)
}

/// Drop a cached probe, forcing the next [`probe_file`] to rescan.
pub fn invalidate_probe<P: AsRef<Path>>(path: P) {
    probe_cache().invalidate(path.as_ref());
}
