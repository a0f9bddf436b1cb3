//! Quality score for a finished extraction run.

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::report::ExtractionResult;

pub const DEFAULT_THRESHOLD: f64 = 0.95;
/// Bytes per second a healthy run is expected to sustain.
pub const DEFAULT_BASELINE_THROUGHPUT: f64 = 10.0 * 1024.0 * 1024.0;
/// Runs finishing inside this budget get full marks for performance.
pub const DEFAULT_MIN_BUDGET: Duration = Duration::from_millis(100);

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScoreWeights {
    pub accuracy: f64,
    pub integrity: f64,
    pub performance: f64,
}

impl Default for ScoreWeights {
    fn default() -> Self {
        Self {
            accuracy: 1.0,
            integrity: 1.0,
            performance: 1.0,
        }
    }
}

impl ScoreWeights {
    /// Scale to sum to one. Negative weights count as zero; all-zero weights
    /// fall back to equal thirds.
    pub fn normalized(self) -> Self {
        let accuracy = self.accuracy.max(0.0);
        let integrity = self.integrity.max(0.0);
        let performance = self.performance.max(0.0);
        let sum = accuracy + integrity + performance;
        if !sum.is_finite() || sum <= 0.0 {
            return Self::default().normalized();
        }
        Self {
            accuracy: accuracy / sum,
            integrity: integrity / sum,
            performance: performance / sum,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Serialize)]
pub struct ScoreBreakdown {
    pub extraction_accuracy: f64,
    pub data_integrity: f64,
    pub performance: f64,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct VerificationReport {
    pub truth_score: f64,
    pub breakdown: ScoreBreakdown,
    pub meets_threshold: bool,
    pub timestamp: DateTime<Utc>,
}

#[derive(Clone, Debug)]
pub struct VerificationScorer {
    weights: ScoreWeights,
    baseline_throughput: f64,
    min_budget: Duration,
    threshold: f64,
}

impl Default for VerificationScorer {
    fn default() -> Self {
        Self::new()
    }
}

impl VerificationScorer {
    pub fn new() -> Self {
        Self {
            weights: ScoreWeights::default().normalized(),
            baseline_throughput: DEFAULT_BASELINE_THROUGHPUT,
            min_budget: DEFAULT_MIN_BUDGET,
            threshold: DEFAULT_THRESHOLD,
        }
    }

    pub fn weights(mut self, weights: ScoreWeights) -> Self {
        self.weights = weights.normalized();
        self
    }

    /// Expected bytes per second; non-positive values are ignored.
    pub fn baseline_throughput(mut self, bytes_per_sec: f64) -> Self {
        if bytes_per_sec > 0.0 && bytes_per_sec.is_finite() {
            self.baseline_throughput = bytes_per_sec;
        }
        self
    }

    pub fn min_budget(mut self, budget: Duration) -> Self {
        self.min_budget = budget;
        self
    }

    pub fn threshold(mut self, threshold: f64) -> Self {
        self.threshold = threshold.clamp(0.0, 1.0);
        self
    }

    pub fn extraction_accuracy(&self, result: &ExtractionResult) -> f64 {
        let extracted = result.extracted_count as f64;
        let failed = result.skipped_due_to_error() as f64;
        ratio_or_one(extracted, extracted + failed)
    }

    pub fn data_integrity(&self, result: &ExtractionResult) -> f64 {
        let (matching, total) = result
            .extracted()
            .filter(|e| !e.is_directory)
            .fold((0usize, 0usize), |(m, t), e| {
                (m + usize::from(e.size_matches()), t + 1)
            });
        ratio_or_one(matching as f64, total as f64)
    }

    pub fn performance(&self, result: &ExtractionResult) -> f64 {
        let expected = Duration::from_secs_f64(
            result.total_bytes_written as f64 / self.baseline_throughput,
        )
        .max(self.min_budget);
        let elapsed = result.elapsed.as_secs_f64();
        if elapsed <= 0.0 {
            return 1.0;
        }
        (expected.as_secs_f64() / elapsed).clamp(0.0, 1.0)
    }

    pub fn score(&self, result: &ExtractionResult) -> VerificationReport {
        let breakdown = ScoreBreakdown {
            extraction_accuracy: self.extraction_accuracy(result),
            data_integrity: self.data_integrity(result),
            performance: self.performance(result),
        };
        let w = self.weights;
        let truth_score = (w.accuracy * breakdown.extraction_accuracy
            + w.integrity * breakdown.data_integrity
            + w.performance * breakdown.performance)
            .clamp(0.0, 1.0);

        VerificationReport {
            truth_score,
            breakdown,
            meets_threshold: meets_threshold(truth_score, self.threshold),
            timestamp: Utc::now(),
        }
    }
}

fn ratio_or_one(numerator: f64, denominator: f64) -> f64 {
    if denominator == 0.0 {
        1.0
    } else {
        numerator / denominator
    }
}

pub fn meets_threshold(score: f64, threshold: f64) -> bool {
    score >= threshold
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entry::{EntryHeader, EntryOutcome, EntryRecord};
    use crate::filter::RejectReason;

    fn extracted(name: &str, declared: u64, written: u64) -> EntryRecord {
        let mut record = EntryRecord::new(&EntryHeader::file(name, declared), EntryOutcome::Extracted);
        record.bytes_written = written;
        record
    }

    fn clean_run() -> ExtractionResult {
        let mut result = ExtractionResult::default();
        result.push(extracted("a", 10, 10));
        result.push(extracted("b", 20, 20));
        result.elapsed = Duration::from_millis(5);
        result
    }

    #[test]
    fn clean_run_scores_one() {
        let report = VerificationScorer::new().score(&clean_run());
        assert_eq!(report.truth_score, 1.0);
        assert!(report.meets_threshold);
    }

    #[test]
    fn empty_run_scores_one() {
        let report = VerificationScorer::new().score(&ExtractionResult::default());
        assert_eq!(report.breakdown.extraction_accuracy, 1.0);
        assert_eq!(report.breakdown.data_integrity, 1.0);
        assert_eq!(report.truth_score, 1.0);
    }

    #[test]
    fn error_skip_lowers_accuracy() {
        let mut result = clean_run();
        result.push(EntryRecord::new(
            &EntryHeader::file("c", 5),
            EntryOutcome::Failed("crc".into()),
        ));
        let report = VerificationScorer::new().score(&result);
        assert!((report.breakdown.extraction_accuracy - 2.0 / 3.0).abs() < 1e-9);
        assert!(report.truth_score < 1.0);
    }

    #[test]
    fn policy_skip_does_not_count() {
        let mut result = clean_run();
        result.push(EntryRecord::new(
            &EntryHeader::file("c", 5),
            EntryOutcome::Filtered(RejectReason::NotIncluded),
        ));
        assert_eq!(VerificationScorer::new().score(&result).truth_score, 1.0);
    }

    #[test]
    fn size_mismatch_lowers_integrity() {
        let mut result = clean_run();
        result.push(extracted("short", 100, 99));
        let report = VerificationScorer::new().score(&result);
        assert!((report.breakdown.data_integrity - 2.0 / 3.0).abs() < 1e-9);
        assert!(report.truth_score < 1.0);
    }

    #[test]
    fn slow_run_loses_performance() {
        let mut result = clean_run();
        result.elapsed = Duration::from_millis(400);
        let scorer = VerificationScorer::new();
        assert!((scorer.performance(&result) - 0.25).abs() < 1e-9);

        result.total_bytes_written = 40 * 1024 * 1024;
        result.elapsed = Duration::from_secs(8);
        let fast_enough = scorer.baseline_throughput(10.0 * 1024.0 * 1024.0);
        assert!((fast_enough.performance(&result) - 0.5).abs() < 1e-9);
    }

    #[test]
    fn weights_are_normalized() {
        let w = ScoreWeights {
            accuracy: 2.0,
            integrity: 1.0,
            performance: 1.0,
        }
        .normalized();
        assert!((w.accuracy - 0.5).abs() < 1e-12);
        assert!((w.integrity - 0.25).abs() < 1e-12);

        let zero = ScoreWeights {
            accuracy: 0.0,
            integrity: 0.0,
            performance: 0.0,
        }
        .normalized();
        assert!((zero.performance - 1.0 / 3.0).abs() < 1e-12);
    }

    #[test]
    fn accuracy_only_weights() {
        let mut result = clean_run();
        result.elapsed = Duration::from_secs(100);
        let scorer = VerificationScorer::new().weights(ScoreWeights {
            accuracy: 1.0,
            integrity: 0.0,
            performance: 0.0,
        });
        assert_eq!(scorer.score(&result).truth_score, 1.0);
    }

    #[test]
    fn threshold_is_inclusive() {
        assert!(meets_threshold(0.95, DEFAULT_THRESHOLD));
        assert!(!meets_threshold(0.9499, DEFAULT_THRESHOLD));
    }

    #[test]
    fn report_serializes_with_timestamp() {
        let report = VerificationScorer::new().score(&clean_run());
        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["truth_score"], 1.0);
        assert!(json["timestamp"].is_string());
    }
}
