//! Metrics and observability utilities
//!
//! Provides Prometheus metrics for the answering pipeline with
//! standardized naming conventions.

use metrics::{counter, describe_counter, describe_histogram, histogram, Unit};
use std::time::Instant;

/// Metrics prefix for all AnswerForge metrics
pub const METRICS_PREFIX: &str = "answerforge";

/// Histogram buckets for per-question latency (in seconds)
/// Questions that wait on the remote ranker land in the upper buckets
pub const QUESTION_BUCKETS: &[f64] = &[
    0.005,  // 5ms
    0.010,  // 10ms
    0.050,  // 50ms
    0.100,  // 100ms
    0.250,  // 250ms
    0.500,  // 500ms
    1.000,  // 1s
    2.500,  // 2.5s
    5.000,  // 5s
    10.00,  // 10s
    30.00,  // 30s
];

/// Register all metric descriptions
pub fn register_metrics() {
    // Question metrics
    describe_counter!(
        format!("{}_questions_total", METRICS_PREFIX),
        Unit::Count,
        "Total questions processed, by mode and outcome"
    );

    describe_histogram!(
        format!("{}_question_duration_seconds", METRICS_PREFIX),
        Unit::Seconds,
        "Per-question pipeline latency in seconds"
    );

    // Candidate metrics
    describe_counter!(
        format!("{}_candidates_generated_total", METRICS_PREFIX),
        Unit::Count,
        "Total candidate answers produced by generators"
    );

    describe_counter!(
        format!("{}_candidates_duplicate_total", METRICS_PREFIX),
        Unit::Count,
        "Candidates dropped by the duplicate filter"
    );

    describe_counter!(
        format!("{}_candidates_isolated_total", METRICS_PREFIX),
        Unit::Count,
        "Candidates dropped after a per-candidate stage failure"
    );

    // Ranking service metrics
    describe_counter!(
        format!("{}_ranker_requests_total", METRICS_PREFIX),
        Unit::Count,
        "Total ranking service requests"
    );

    describe_counter!(
        format!("{}_ranker_retries_total", METRICS_PREFIX),
        Unit::Count,
        "Rank requests retried after a failure"
    );

    // Training metrics
    describe_counter!(
        format!("{}_training_rows_total", METRICS_PREFIX),
        Unit::Count,
        "Training rows accumulated for the ranker"
    );

    describe_counter!(
        format!("{}_recall_filtered_total", METRICS_PREFIX),
        Unit::Count,
        "Training questions skipped because no candidate was correct"
    );

    tracing::info!("Metrics registered");
}

/// Helper to record per-question metrics
pub struct QuestionMetrics {
    start: Instant,
    mode: &'static str,
}

impl QuestionMetrics {
    /// Start tracking a question in the given mode ("train" or "apply")
    pub fn start(mode: &'static str) -> Self {
        Self {
            start: Instant::now(),
            mode,
        }
    }

    /// Record question completion
    pub fn finish(self, success: bool) {
        let duration = self.start.elapsed().as_secs_f64();
        let outcome = if success { "success" } else { "error" };

        counter!(
            format!("{}_questions_total", METRICS_PREFIX),
            "mode" => self.mode,
            "outcome" => outcome
        )
        .increment(1);

        histogram!(
            format!("{}_question_duration_seconds", METRICS_PREFIX),
            "mode" => self.mode
        )
        .record(duration);
    }
}

/// Helper to record generated candidates
pub fn record_candidate_generated() {
    counter!(format!("{}_candidates_generated_total", METRICS_PREFIX)).increment(1);
}

/// Helper to record a duplicate drop
pub fn record_duplicate_dropped() {
    counter!(format!("{}_candidates_duplicate_total", METRICS_PREFIX)).increment(1);
}

/// Helper to record a candidate dropped after a stage failure
pub fn record_candidate_isolated(stage: &str) {
    counter!(
        format!("{}_candidates_isolated_total", METRICS_PREFIX),
        "stage" => stage.to_string()
    )
    .increment(1);
}

/// Helper to record ranking service requests
pub fn record_ranker_request(operation: &'static str, success: bool) {
    let status = if success { "success" } else { "error" };

    counter!(
        format!("{}_ranker_requests_total", METRICS_PREFIX),
        "operation" => operation,
        "status" => status
    )
    .increment(1);
}

/// Helper to record a rank retry
pub fn record_ranker_retry() {
    counter!(format!("{}_ranker_retries_total", METRICS_PREFIX)).increment(1);
}

/// Helper to record training metrics
pub fn record_training_rows(rows: usize) {
    counter!(format!("{}_training_rows_total", METRICS_PREFIX)).increment(rows as u64);
}

/// Helper to record a recall-filtered question
pub fn record_recall_filtered() {
    counter!(format!("{}_recall_filtered_total", METRICS_PREFIX)).increment(1);
}
