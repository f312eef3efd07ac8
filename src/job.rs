//! Progress reporting seam for long-running work.
//!
//! The surrounding job framework is an external collaborator; this subsystem
//! only ever talks to it through [`ProgressSink`].

/// Terminal state of a job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobOutcome {
    Succeeded,
    Failed(String),
}

/// Receiver for progress updates from an analysis or decode job.
pub trait ProgressSink {
    /// Report progress as a fraction in `[0, 1]`.
    fn set_progress(&mut self, fraction: f64);

    /// Report that progress cannot currently be quantified.
    fn set_progress_unknown(&mut self);

    /// Mark the job finished.
    fn set_finished(&mut self, outcome: JobOutcome);
}

/// A sink that discards all updates.
pub struct NullProgress;

impl ProgressSink for NullProgress {
    fn set_progress(&mut self, _fraction: f64) {}
    fn set_progress_unknown(&mut self) {}
    fn set_finished(&mut self, _outcome: JobOutcome) {}
}

/// Records every update it receives; used by tests to assert the progress
/// contract.
#[derive(Default)]
pub struct CollectingProgress {
    pub fractions: Vec<f64>,
    pub unknown_count: usize,
    pub outcome: Option<JobOutcome>,
}

impl CollectingProgress {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn last_fraction(&self) -> Option<f64> {
        self.fractions.last().copied()
    }
}

impl ProgressSink for CollectingProgress {
    fn set_progress(&mut self, fraction: f64) {
        self.fractions.push(fraction);
    }

    fn set_progress_unknown(&mut self) {
        self.unknown_count += 1;
    }

    fn set_finished(&mut self, outcome: JobOutcome) {
        self.outcome = Some(outcome);
    }
}
