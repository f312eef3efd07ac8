//! The persisted analysis artifact.
//!
//! Results are stored as versioned JSON so a cached artifact written by an
//! older build is re-computed rather than misread.

use std::fs;
use std::path::Path;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{DecodeError, Result};
use crate::time::ContentTime;

/// Current artifact format version.  Bump on any incompatible change.
pub const ANALYSIS_VERSION: u32 = 1;

/// One reduced point on a channel's level curve.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct PointSnapshot {
    pub rms: f32,
    pub peak: f32,
}

/// The loudest sample seen across all channels.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GlobalPeak {
    pub value: f32,
    /// Position on the content clock, in ticks.
    pub ticks: i64,
}

impl GlobalPeak {
    pub fn time(&self) -> ContentTime {
        ContentTime::new(self.ticks)
    }
}

/// A complete analysis of one timeline's audio.
#[derive(Debug, Serialize, Deserialize)]
pub struct AudioAnalysis {
    pub version: u32,
    pub id: Uuid,
    pub created: DateTime<Utc>,
    pub sample_rate: u32,
    /// Level curves, outer index is channel.
    points: Vec<Vec<PointSnapshot>>,
    pub peak: Option<GlobalPeak>,
    /// Gain (dB) that was applied while analysing, recorded so a later gain
    /// change can rescale the curves instead of re-analysing.
    pub analysis_gain: Option<f64>,
}

impl AudioAnalysis {
    pub fn new(channels: usize, sample_rate: u32) -> Self {
        AudioAnalysis {
            version: ANALYSIS_VERSION,
            id: Uuid::new_v4(),
            created: Utc::now(),
            sample_rate,
            points: vec![Vec::new(); channels],
            peak: None,
            analysis_gain: None,
        }
    }

    pub fn channels(&self) -> usize {
        self.points.len()
    }

    pub fn add_point(&mut self, channel: usize, point: PointSnapshot) {
        self.points[channel].push(point);
    }

    pub fn points(&self, channel: usize) -> &[PointSnapshot] {
        &self.points[channel]
    }

    pub fn set_peak(&mut self, value: f32, time: ContentTime) {
        self.peak = Some(GlobalPeak {
            value,
            ticks: time.ticks(),
        });
    }

    pub fn set_analysis_gain(&mut self, gain_db: f64) {
        self.analysis_gain = Some(gain_db);
    }

    /// Write the artifact to `path`, going through a sibling temp file so a
    /// crash never leaves a half-written artifact behind.
    pub fn write(&self, path: &Path) -> Result<()> {
        let json = serde_json::to_vec_pretty(self)?;

        let tmp = path.with_extension("tmp");
        fs::write(&tmp, &json).map_err(|e| DecodeError::io(&tmp, e))?;
        fs::rename(&tmp, path).map_err(|e| DecodeError::io(path, e))?;

        tracing::debug!("Wrote audio analysis to {:?} ({} bytes)", path, json.len());
        Ok(())
    }

    /// Load an artifact, rejecting any version other than the current one.
    pub fn load(path: &Path) -> Result<Self> {
        let data = fs::read(path).map_err(|e| DecodeError::io(path, e))?;
        let analysis: AudioAnalysis = serde_json::from_slice(&data)?;
        if analysis.version != ANALYSIS_VERSION {
            return Err(DecodeError::AnalysisVersion {
                found: analysis.version,
                expected: ANALYSIS_VERSION,
            });
        }
        Ok(analysis)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_write_and_load_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("analysis.json");

        let mut analysis = AudioAnalysis::new(2, 48_000);
        analysis.add_point(0, PointSnapshot { rms: 0.1, peak: 0.5 });
        analysis.add_point(1, PointSnapshot { rms: 0.2, peak: 0.9 });
        analysis.set_peak(0.9, ContentTime::from_seconds(1.5));
        analysis.set_analysis_gain(-3.0);
        analysis.write(&path).unwrap();

        // The temp file must not survive the rename.
        assert!(!path.with_extension("tmp").exists());

        let loaded = AudioAnalysis::load(&path).unwrap();
        assert_eq!(loaded.version, ANALYSIS_VERSION);
        assert_eq!(loaded.id, analysis.id);
        assert_eq!(loaded.sample_rate, 48_000);
        assert_eq!(loaded.channels(), 2);
        assert_eq!(loaded.points(0), analysis.points(0));
        assert_eq!(loaded.points(1), analysis.points(1));
        assert_eq!(
            loaded.peak.unwrap().time(),
            ContentTime::from_seconds(1.5)
        );
        assert_eq!(loaded.analysis_gain, Some(-3.0));
    }

    #[test]
    fn test_load_rejects_unknown_version() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("analysis.json");

        let analysis = AudioAnalysis::new(1, 48_000);
        analysis.write(&path).unwrap();

        let mut value: serde_json::Value =
            serde_json::from_slice(&std::fs::read(&path).unwrap()).unwrap();
        value["version"] = serde_json::json!(ANALYSIS_VERSION + 1);
        std::fs::write(&path, serde_json::to_vec(&value).unwrap()).unwrap();

        match AudioAnalysis::load(&path) {
            Err(DecodeError::AnalysisVersion { found, expected }) => {
                assert_eq!(found, ANALYSIS_VERSION + 1);
                assert_eq!(expected, ANALYSIS_VERSION);
            }
            other => panic!("expected version error, got {:?}", other.map(|_| ())),
        }
    }

    #[test]
    fn test_load_missing_file_is_io_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = AudioAnalysis::load(&dir.path().join("absent.json")).unwrap_err();
        assert!(matches!(err, DecodeError::Io { .. }));
    }
}
