//! Streaming audio analysis.
//!
//! A pass over a timeline's audio in small blocks, reducing the signal to a
//! fixed number of (rms, peak) points per channel plus one global peak.  The
//! block loop, the reduction window arithmetic and the silence floor follow
//! the behaviour the level display downstream was built against, quirks
//! included: the first reduction window closes after a single sample, and a
//! trailing partial window is dropped.

use std::path::Path;

use crate::analysis::artifact::{AudioAnalysis, PointSnapshot};
use crate::audio::AudioBuffers;
use crate::error::Result;
use crate::job::{JobOutcome, ProgressSink};
use crate::time::ContentTime;

/// Target number of points per channel; the reduction window is sized from
/// this.
pub const NUM_POINTS: i64 = 1024;

/// Audio is pulled from the source in blocks of this length.
const BLOCK: ContentTime = ContentTime::new(ContentTime::HZ / 8);

/// Samples quieter than this are raised to it, keeping every point strictly
/// positive so the dB conversion downstream stays finite.
const SILENCE_FLOOR: f32 = 1e-7;

/// One piece of content on the analysed timeline.
#[derive(Debug, Clone)]
pub struct ContentItem {
    pub gain_db: f64,
    pub has_audio: bool,
}

/// The stretch of content time being analysed and what occupies it.
#[derive(Debug, Clone)]
pub struct Timeline {
    pub start: ContentTime,
    pub length: ContentTime,
    pub items: Vec<ContentItem>,
}

/// Supplies mixed, canonical PCM for arbitrary stretches of content time.
pub trait AudioSource {
    fn channels(&self) -> usize;

    fn sample_rate(&self) -> u32;

    /// PCM for `[from, from + length)`.
    fn get_audio(&mut self, from: ContentTime, length: ContentTime) -> Result<AudioBuffers>;
}

#[derive(Clone, Copy, Default)]
struct Accumulator {
    sum_squares: f64,
    peak: f32,
}

/// The per-pass reduction state.
pub struct AnalysisEngine {
    sample_rate: u32,
    samples_per_point: i64,
    done: i64,
    current: Vec<Accumulator>,
    overall_peak: f32,
    overall_peak_frame: i64,
    analysis: AudioAnalysis,
}

impl AnalysisEngine {
    pub fn new(channels: usize, sample_rate: u32, total_frames: i64) -> Self {
        let samples_per_point = (total_frames / NUM_POINTS).max(1);
        tracing::debug!(
            channels,
            total_frames,
            samples_per_point,
            "Starting audio analysis"
        );
        AnalysisEngine {
            sample_rate,
            samples_per_point,
            done: 0,
            current: vec![Accumulator::default(); channels],
            overall_peak: 0.0,
            overall_peak_frame: 0,
            analysis: AudioAnalysis::new(channels, sample_rate),
        }
    }

    pub fn samples_per_point(&self) -> i64 {
        self.samples_per_point
    }

    /// Fold one block of PCM into the reduction.
    pub fn analyse(&mut self, buffers: &AudioBuffers) {
        let channels = self.current.len().min(buffers.channels());
        let frames = buffers.frames();

        for i in 0..frames {
            for c in 0..channels {
                let mut s = buffers.channel(c)[i];
                if s.abs() < SILENCE_FLOOR {
                    s = SILENCE_FLOOR;
                }
                let magnitude = s.abs();

                let acc = &mut self.current[c];
                acc.sum_squares += (s as f64) * (s as f64);
                acc.peak = acc.peak.max(magnitude);

                if magnitude > self.overall_peak {
                    self.overall_peak = magnitude;
                    self.overall_peak_frame = self.done + i as i64;
                }
            }

            if (self.done + i as i64) % self.samples_per_point == 0 {
                for c in 0..self.current.len() {
                    let acc = std::mem::take(&mut self.current[c]);
                    self.analysis.add_point(
                        c,
                        PointSnapshot {
                            rms: (acc.sum_squares / self.samples_per_point as f64).sqrt() as f32,
                            peak: acc.peak,
                        },
                    );
                }
            }
        }

        self.done += frames as i64;
    }

    /// Frames folded in so far.
    pub fn frames_done(&self) -> i64 {
        self.done
    }

    /// Close the pass, stamping the global peak relative to `origin`.
    ///
    /// The peak is always recorded; a pass that folded no frames reports a
    /// zero peak at the origin rather than omitting it.
    pub fn finish(mut self, origin: ContentTime) -> AudioAnalysis {
        let time =
            origin + ContentTime::from_frames(self.overall_peak_frame, self.sample_rate as f64);
        self.analysis.set_peak(self.overall_peak, time);
        self.analysis
    }
}

/// Analyse a timeline's audio and persist the result at `out_path`.
///
/// Progress is reported as elapsed content time over the timeline length,
/// then pinned to 1 and marked finished once the artifact is on disk.
pub fn analyse_audio(
    timeline: &Timeline,
    source: &mut dyn AudioSource,
    progress: &mut dyn ProgressSink,
    out_path: &Path,
) -> Result<AudioAnalysis> {
    let sample_rate = source.sample_rate();
    let total_frames = timeline.length.frames_round(sample_rate as f64);
    let mut engine = AnalysisEngine::new(source.channels(), sample_rate, total_frames);

    // No audio-bearing content: skip the block loop entirely.  The artifact
    // is still written, with empty point rows, rather than filling up with
    // floor-clamped silence points.
    if timeline.items.iter().any(|i| i.has_audio) {
        let end = timeline.start + timeline.length;
        let mut t = timeline.start;
        while t < end {
            let length = (end - t).min(BLOCK);
            let buffers = source.get_audio(t, length)?;
            engine.analyse(&buffers);
            t += length;

            if timeline.length > ContentTime::ZERO {
                progress.set_progress((t - timeline.start).seconds() / timeline.length.seconds());
            }
        }
    }

    let mut analysis = engine.finish(timeline.start);

    // The gain baked into the analysed signal is only well-defined when a
    // single piece of audio-bearing content covers the timeline; a mix of
    // per-item gains has no single number to record.
    if timeline.items.len() == 1 && timeline.items[0].has_audio {
        analysis.set_analysis_gain(timeline.items[0].gain_db);
    }

    analysis.write(out_path)?;

    tracing::info!(
        "Audio analysis complete: {} channels, peak={:?}",
        analysis.channels(),
        analysis.peak
    );
    progress.set_progress(1.0);
    progress.set_finished(JobOutcome::Succeeded);

    Ok(analysis)
}
