use std::path::PathBuf;
use std::time::{Duration, Instant};

use crate::batch::{JobOutcome, JobStatus};
use crate::error::GradeError;

/// A job that did not succeed
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FailureRecord {
    pub input: PathBuf,
    pub reason: String,
    pub skipped: bool,
}

/// Counts and failures for a finished batch
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BatchSummary {
    pub total: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub skipped: usize,
    /// Jobs stopped or never started because the batch was cancelled;
    /// already counted in `failed` or `skipped`
    pub cancelled: usize,
    pub failures: Vec<FailureRecord>,
    /// From the first executed job's start to the last one's end
    pub span: Duration,
}

impl BatchSummary {
    /// True when no job failed and the batch ran to completion; jobs skipped
    /// for validation reasons do not count against it
    pub fn is_success(&self) -> bool {
        self.failed == 0 && self.cancelled == 0
    }

    pub fn was_cancelled(&self) -> bool {
        self.cancelled > 0
    }
}

/// Folds job outcomes into a [`BatchSummary`], one at a time
#[derive(Debug, Default)]
pub struct ResultAggregator {
    summary: BatchSummary,
    first_start: Option<Instant>,
    last_end: Option<Instant>,
}

impl ResultAggregator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, outcome: &JobOutcome) {
        self.summary.total += 1;
        if matches!(outcome.status.reason(), Some(GradeError::Cancelled)) {
            self.summary.cancelled += 1;
        }
        match &outcome.status {
            JobStatus::Succeeded => self.summary.succeeded += 1,
            JobStatus::Failed(reason) => {
                self.summary.failed += 1;
                self.summary.failures.push(FailureRecord {
                    input: outcome.input.clone(),
                    reason: reason.to_string(),
                    skipped: false,
                });
            }
            JobStatus::Skipped(reason) => {
                self.summary.skipped += 1;
                self.summary.failures.push(FailureRecord {
                    input: outcome.input.clone(),
                    reason: reason.to_string(),
                    skipped: true,
                });
            }
        }

        if outcome.was_executed() {
            let end = outcome.started_at + outcome.duration;
            self.first_start = Some(
                self.first_start
                    .map_or(outcome.started_at, |s| s.min(outcome.started_at)),
            );
            self.last_end = Some(self.last_end.map_or(end, |e| e.max(end)));
        }
    }

    pub fn finish(mut self) -> BatchSummary {
        if let (Some(start), Some(end)) = (self.first_start, self.last_end) {
            self.summary.span = end.saturating_duration_since(start);
        }
        self.summary
    }
}

pub fn summarize(outcomes: &[JobOutcome]) -> BatchSummary {
    let mut aggregator = ResultAggregator::new();
    for outcome in outcomes {
        aggregator.record(outcome);
    }
    aggregator.finish()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn outcome(index: usize, status: JobStatus, offset_ms: u64, duration_ms: u64, base: Instant) -> JobOutcome {
        JobOutcome {
            index,
            input: PathBuf::from(format!("clip{index}.mp4")),
            output: None,
            status,
            started_at: base + Duration::from_millis(offset_ms),
            duration: Duration::from_millis(duration_ms),
        }
    }

    #[test]
    fn test_counts_and_failures() {
        let base = Instant::now();
        let outcomes = vec![
            outcome(0, JobStatus::Succeeded, 0, 100, base),
            outcome(
                1,
                JobStatus::Failed(GradeError::EncoderError {
                    code: Some(1),
                    stderr: "bad input".into(),
                }),
                10,
                50,
                base,
            ),
            outcome(
                2,
                JobStatus::Skipped(GradeError::UnsupportedFormat("z.avi".into())),
                0,
                0,
                base,
            ),
            outcome(3, JobStatus::Succeeded, 50, 200, base),
        ];

        let summary = summarize(&outcomes);
        assert_eq!(summary.total, 4);
        assert_eq!(summary.succeeded, 2);
        assert_eq!(summary.failed, 1);
        assert_eq!(summary.skipped, 1);
        assert!(!summary.is_success());

        assert_eq!(summary.failures.len(), 2);
        assert_eq!(summary.failures[0].input, PathBuf::from("clip1.mp4"));
        assert!(summary.failures[0].reason.contains("bad input"));
        assert!(!summary.failures[0].skipped);
        assert!(summary.failures[1].skipped);

        // 0ms .. 250ms
        assert_eq!(summary.span, Duration::from_millis(250));
    }

    #[test]
    fn test_validation_skips_only_is_success_with_zero_span() {
        let base = Instant::now();
        let outcomes = vec![outcome(
            0,
            JobStatus::Skipped(GradeError::UnsupportedFormat("notes.txt".into())),
            0,
            0,
            base,
        )];
        let summary = summarize(&outcomes);
        assert!(summary.is_success());
        assert!(!summary.was_cancelled());
        assert_eq!(summary.span, Duration::ZERO);
    }

    #[test]
    fn test_cancelled_batch_is_not_success() {
        let base = Instant::now();
        let outcomes: Vec<_> = (0..3)
            .map(|i| outcome(i, JobStatus::Skipped(GradeError::Cancelled), 0, 0, base))
            .collect();
        let summary = summarize(&outcomes);
        assert_eq!(summary.succeeded, 0);
        assert_eq!(summary.skipped, 3);
        assert_eq!(summary.failed, 0);
        assert_eq!(summary.cancelled, 3);
        assert!(summary.was_cancelled());
        assert!(!summary.is_success());

        let killed = vec![
            outcome(0, JobStatus::Failed(GradeError::Cancelled), 0, 40, base),
            outcome(1, JobStatus::Skipped(GradeError::Cancelled), 0, 0, base),
        ];
        let summary = summarize(&killed);
        assert_eq!(summary.failed, 1);
        assert_eq!(summary.cancelled, 2);
    }

    #[test]
    fn test_empty_batch() {
        let summary = summarize(&[]);
        assert_eq!(summary, BatchSummary::default());
        assert!(summary.is_success());
    }
}
