//! End-to-end audio analysis runs over in-memory sources.

use crate::analysis::{analyse_audio, AudioAnalysis, ContentItem, Timeline};
use crate::job::{CollectingProgress, JobOutcome};
use crate::tests::fixtures::{sine, MemoryAudioSource};
use crate::time::ContentTime;

fn one_item_timeline(length_seconds: f64, gain_db: f64) -> Timeline {
    Timeline {
        start: ContentTime::ZERO,
        length: ContentTime::from_seconds(length_seconds),
        items: vec![ContentItem {
            gain_db,
            has_audio: true,
        }],
    }
}

#[test]
fn test_analyse_two_seconds_of_stereo() {
    let dir = tempfile::tempdir().unwrap();
    let out = dir.path().join("analysis.json");

    let frames = 96_000;
    let mut source = MemoryAudioSource::new(
        ContentTime::ZERO,
        48_000,
        vec![
            sine(440.0, 48_000, frames, 0.5),
            sine(220.0, 48_000, frames, 0.25),
        ],
    );
    let mut progress = CollectingProgress::new();

    let analysis = analyse_audio(
        &one_item_timeline(2.0, -3.0),
        &mut source,
        &mut progress,
        &out,
    )
    .unwrap();

    // 96000 frames reduce at 93 samples per point; the window arithmetic
    // yields 1033 points per channel.
    assert_eq!(analysis.channels(), 2);
    assert_eq!(analysis.points(0).len(), 1033);
    assert_eq!(analysis.points(1).len(), 1033);

    // The loudest channel carries a 0.5-amplitude sine; the sampled peak
    // sits just below the analytic amplitude.
    let peak = analysis.peak.unwrap();
    assert!(peak.value > 0.45 && peak.value <= 0.5, "peak={}", peak.value);

    // Points on the loud channel stay within the signal's envelope.
    for point in analysis.points(0) {
        assert!(point.peak <= 0.5);
        assert!(point.rms <= point.peak + 1e-6);
    }

    assert_eq!(analysis.analysis_gain, Some(-3.0));

    // Progress never regresses, ends pinned at 1, and the job succeeded.
    assert!(progress
        .fractions
        .windows(2)
        .all(|w| w[0] <= w[1] + 1e-9));
    assert_eq!(progress.last_fraction(), Some(1.0));
    assert_eq!(progress.outcome, Some(JobOutcome::Succeeded));

    // The artifact on disk is the same analysis.
    let loaded = AudioAnalysis::load(&out).unwrap();
    assert_eq!(loaded.id, analysis.id);
    assert_eq!(loaded.points(0), analysis.points(0));
}

#[test]
fn test_gain_not_recorded_for_mixed_timelines() {
    let dir = tempfile::tempdir().unwrap();
    let out = dir.path().join("analysis.json");

    let mut timeline = one_item_timeline(0.5, -3.0);
    timeline.items.push(ContentItem {
        gain_db: 2.0,
        has_audio: true,
    });

    let mut source = MemoryAudioSource::new(
        ContentTime::ZERO,
        48_000,
        vec![sine(440.0, 48_000, 24_000, 0.5)],
    );
    let mut progress = CollectingProgress::new();

    let analysis = analyse_audio(&timeline, &mut source, &mut progress, &out).unwrap();
    assert_eq!(analysis.analysis_gain, None);
}

#[test]
fn test_gain_not_recorded_without_audio() {
    let dir = tempfile::tempdir().unwrap();
    let out = dir.path().join("analysis.json");

    let mut timeline = one_item_timeline(0.25, -6.0);
    timeline.items[0].has_audio = false;

    let mut source = MemoryAudioSource::new(ContentTime::ZERO, 48_000, vec![vec![0.0; 12_000]]);
    let mut progress = CollectingProgress::new();

    let analysis = analyse_audio(&timeline, &mut source, &mut progress, &out).unwrap();
    assert_eq!(analysis.analysis_gain, None);
}

#[test]
fn test_no_audio_timeline_writes_empty_point_rows() {
    let dir = tempfile::tempdir().unwrap();
    let out = dir.path().join("analysis.json");

    let mut timeline = one_item_timeline(1.0, 0.0);
    timeline.items[0].has_audio = false;

    // The source holds real signal; none of it may be pulled, so no
    // floor-clamped silence points can appear in the artifact.
    let mut source = MemoryAudioSource::new(
        ContentTime::ZERO,
        48_000,
        vec![sine(440.0, 48_000, 48_000, 0.5)],
    );
    let mut progress = CollectingProgress::new();

    let analysis = analyse_audio(&timeline, &mut source, &mut progress, &out).unwrap();

    assert_eq!(analysis.channels(), 1);
    assert!(analysis.points(0).is_empty());
    let peak = analysis.peak.unwrap();
    assert_eq!(peak.value, 0.0);
    assert_eq!(peak.time(), ContentTime::ZERO);

    assert_eq!(progress.last_fraction(), Some(1.0));
    assert_eq!(progress.outcome, Some(JobOutcome::Succeeded));

    let loaded = AudioAnalysis::load(&out).unwrap();
    assert!(loaded.points(0).is_empty());
}

#[test]
fn test_timeline_offset_shifts_peak_time() {
    let dir = tempfile::tempdir().unwrap();
    let out = dir.path().join("analysis.json");

    let origin = ContentTime::from_seconds(5.0);
    let mut samples = vec![0.0_f32; 24_000];
    samples[12_000] = 0.9;
    let mut source = MemoryAudioSource::new(origin, 48_000, vec![samples]);
    let mut progress = CollectingProgress::new();

    let timeline = Timeline {
        start: origin,
        length: ContentTime::from_seconds(0.5),
        items: vec![ContentItem {
            gain_db: 0.0,
            has_audio: true,
        }],
    };
    let analysis = analyse_audio(&timeline, &mut source, &mut progress, &out).unwrap();

    let peak = analysis.peak.unwrap();
    assert_eq!(peak.value, 0.9);
    assert_eq!(peak.time(), origin + ContentTime::from_frames(12_000, 48_000.0));
}

#[test]
fn test_empty_timeline_still_finishes() {
    let dir = tempfile::tempdir().unwrap();
    let out = dir.path().join("analysis.json");

    let mut source = MemoryAudioSource::new(ContentTime::ZERO, 48_000, vec![Vec::new()]);
    let mut progress = CollectingProgress::new();

    let timeline = Timeline {
        start: ContentTime::ZERO,
        length: ContentTime::ZERO,
        items: Vec::new(),
    };
    let analysis = analyse_audio(&timeline, &mut source, &mut progress, &out).unwrap();

    assert_eq!(analysis.peak.unwrap().value, 0.0);
    assert_eq!(progress.last_fraction(), Some(1.0));
    assert_eq!(progress.outcome, Some(JobOutcome::Succeeded));
    assert!(out.exists());
}
