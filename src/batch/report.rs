//! Batch report assembly

use std::time::{Duration, Instant};

use serde::Serialize;

use super::outcome::RecognitionOutcome;

/// Outcome of one item together with where it came from
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BatchItemResult {
    pub index: usize,
    pub filename: String,
    pub outcome: RecognitionOutcome,
}

/// Summary of a finished batch; read-only once assembled
#[derive(Debug, Clone)]
pub struct BatchReport {
    total_files: usize,
    success_count: usize,
    failure_count: usize,
    elapsed: Duration,
    results: Vec<BatchItemResult>,
}

impl BatchReport {
    pub fn total_files(&self) -> usize {
        self.total_files
    }

    pub fn success_count(&self) -> usize {
        self.success_count
    }

    pub fn failure_count(&self) -> usize {
        self.failure_count
    }

    pub fn elapsed(&self) -> Duration {
        self.elapsed
    }

    /// Item results in original input order
    pub fn results(&self) -> &[BatchItemResult] {
        &self.results
    }
}

/// Count outcomes and stamp the elapsed time since `start`
pub fn assemble(start: Instant, results: Vec<BatchItemResult>) -> BatchReport {
    let success_count = results.iter().filter(|r| r.outcome.is_success()).count();
    let total_files = results.len();

    BatchReport {
        total_files,
        success_count,
        failure_count: total_files - success_count,
        elapsed: start.elapsed(),
        results,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::batch::FailureCategory;

    fn item(index: usize, outcome: RecognitionOutcome) -> BatchItemResult {
        BatchItemResult {
            index,
            filename: format!("page_{index}.png"),
            outcome,
        }
    }

    #[test]
    fn test_assemble_counts_outcomes() {
        let start = Instant::now();
        let report = assemble(
            start,
            vec![
                item(0, RecognitionOutcome::success("uno".to_string(), 1)),
                item(1, RecognitionOutcome::failure(FailureCategory::DecodeError, "bad")),
                item(2, RecognitionOutcome::success("tres".to_string(), 1)),
                item(3, RecognitionOutcome::failure(FailureCategory::Timeout, "slow")),
            ],
        );

        assert_eq!(report.total_files(), 4);
        assert_eq!(report.success_count(), 2);
        assert_eq!(report.failure_count(), 2);
        assert_eq!(
            report.success_count() + report.failure_count(),
            report.total_files()
        );
        assert!(report.elapsed() <= start.elapsed());

        let indices: Vec<usize> = report.results().iter().map(|r| r.index).collect();
        assert_eq!(indices, vec![0, 1, 2, 3]);
    }

    #[test]
    fn test_assemble_all_failures() {
        let report = assemble(
            Instant::now(),
            vec![item(0, RecognitionOutcome::failure(FailureCategory::Cancelled, "stop"))],
        );
        assert_eq!(report.success_count(), 0);
        assert_eq!(report.failure_count(), 1);
    }
}
