//! Offline audio analysis: level reduction and the persisted artifact.

pub mod artifact;
pub mod engine;

pub use artifact::{AudioAnalysis, GlobalPeak, PointSnapshot, ANALYSIS_VERSION};
pub use engine::{analyse_audio, AnalysisEngine, AudioSource, ContentItem, Timeline, NUM_POINTS};
