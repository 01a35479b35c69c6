//! Metrics catalog for the civic event pipeline.
//!
//! One enum holds every metric name so dashboards and alert rules have a
//! single place to look, with per-stage helper modules wrapping the
//! `metrics` macros.

use metrics_exporter_prometheus::PrometheusBuilder;
use once_cell::sync::OnceCell;
use std::fmt;

static RECORDER_HANDLE: OnceCell<metrics_exporter_prometheus::PrometheusHandle> = OnceCell::new();

/// Enum representing all metric names used in the system.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MetricName {
    // Sources
    SourcesRequestsSuccess,
    SourcesRequestsError,
    SourcesRequestDuration,
    SourcesPayloadBytes,
    SourcesFetchSuccess,
    SourcesFetchFailed,
    SourcesFetchSkipped,

    // Normalize
    NormalizeRecordsProcessed,
    NormalizeRecordsDropped,

    // Classify
    ClassifyCityMatched,
    ClassifyCountryFallback,
    ClassifyCategoryOther,

    // Dedup
    DedupNew,
    DedupUpdates,
    DedupDuplicates,

    // Writer
    WriterInserted,
    WriterUpdated,
    WriterSkipped,
    WriterFailed,

    // Pipeline
    PipelineRunsCompleted,
    PipelineRunsFailed,
    PipelineRunDuration,
}

impl MetricName {
    pub fn as_str(&self) -> &'static str {
        match self {
            MetricName::SourcesRequestsSuccess => "civic_sources_requests_success_total",
            MetricName::SourcesRequestsError => "civic_sources_requests_error_total",
            MetricName::SourcesRequestDuration => "civic_sources_request_duration_seconds",
            MetricName::SourcesPayloadBytes => "civic_sources_payload_bytes",
            MetricName::SourcesFetchSuccess => "civic_sources_fetch_success_total",
            MetricName::SourcesFetchFailed => "civic_sources_fetch_failed_total",
            MetricName::SourcesFetchSkipped => "civic_sources_fetch_skipped_total",

            MetricName::NormalizeRecordsProcessed => "civic_normalize_records_processed_total",
            MetricName::NormalizeRecordsDropped => "civic_normalize_records_dropped_total",

            MetricName::ClassifyCityMatched => "civic_classify_city_matched_total",
            MetricName::ClassifyCountryFallback => "civic_classify_country_fallback_total",
            MetricName::ClassifyCategoryOther => "civic_classify_category_other_total",

            MetricName::DedupNew => "civic_dedup_new_total",
            MetricName::DedupUpdates => "civic_dedup_updates_total",
            MetricName::DedupDuplicates => "civic_dedup_duplicates_total",

            MetricName::WriterInserted => "civic_writer_inserted_total",
            MetricName::WriterUpdated => "civic_writer_updated_total",
            MetricName::WriterSkipped => "civic_writer_skipped_total",
            MetricName::WriterFailed => "civic_writer_failed_total",

            MetricName::PipelineRunsCompleted => "civic_pipeline_runs_completed_total",
            MetricName::PipelineRunsFailed => "civic_pipeline_runs_failed_total",
            MetricName::PipelineRunDuration => "civic_pipeline_run_duration_seconds",
        }
    }
}

impl fmt::Display for MetricName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Install the Prometheus recorder. Safe to call more than once; later
/// calls are no-ops.
pub fn init() -> Result<(), Box<dyn std::error::Error>> {
    if RECORDER_HANDLE.get().is_some() {
        return Ok(());
    }
    let handle = PrometheusBuilder::new().install_recorder()?;
    let _ = RECORDER_HANDLE.set(handle);
    Ok(())
}

/// Current metrics in Prometheus exposition format, if the recorder is
/// installed.
pub fn render() -> Option<String> {
    RECORDER_HANDLE.get().map(|h| h.render())
}

pub mod sources {
    use super::MetricName;

    pub fn request_success() {
        ::metrics::counter!(MetricName::SourcesRequestsSuccess.as_str()).increment(1);
    }

    pub fn request_error() {
        ::metrics::counter!(MetricName::SourcesRequestsError.as_str()).increment(1);
    }

    pub fn request_duration(secs: f64) {
        ::metrics::histogram!(MetricName::SourcesRequestDuration.as_str()).record(secs);
    }

    pub fn payload_bytes(bytes: usize) {
        ::metrics::histogram!(MetricName::SourcesPayloadBytes.as_str()).record(bytes as f64);
    }

    pub fn fetch_success(source_id: &str) {
        ::metrics::counter!(MetricName::SourcesFetchSuccess.as_str(), "source_id" => source_id.to_string())
            .increment(1);
    }

    pub fn fetch_failed(source_id: &str) {
        ::metrics::counter!(MetricName::SourcesFetchFailed.as_str(), "source_id" => source_id.to_string())
            .increment(1);
    }

    pub fn fetch_skipped(source_id: &str) {
        ::metrics::counter!(MetricName::SourcesFetchSkipped.as_str(), "source_id" => source_id.to_string())
            .increment(1);
    }
}

pub mod normalize {
    use super::MetricName;

    pub fn record_normalized(source_id: &str) {
        ::metrics::counter!(MetricName::NormalizeRecordsProcessed.as_str(), "source_id" => source_id.to_string())
            .increment(1);
    }

    pub fn record_dropped(reason: &str) {
        ::metrics::counter!(MetricName::NormalizeRecordsDropped.as_str(), "reason" => reason.to_string())
            .increment(1);
    }
}

pub mod classify {
    use super::MetricName;

    pub fn city_matched() {
        ::metrics::counter!(MetricName::ClassifyCityMatched.as_str()).increment(1);
    }

    pub fn country_fallback() {
        ::metrics::counter!(MetricName::ClassifyCountryFallback.as_str()).increment(1);
    }

    pub fn category_other() {
        ::metrics::counter!(MetricName::ClassifyCategoryOther.as_str()).increment(1);
    }
}

pub mod dedup {
    use super::MetricName;

    pub fn resolved_new() {
        ::metrics::counter!(MetricName::DedupNew.as_str()).increment(1);
    }

    pub fn resolved_update() {
        ::metrics::counter!(MetricName::DedupUpdates.as_str()).increment(1);
    }

    pub fn resolved_duplicate() {
        ::metrics::counter!(MetricName::DedupDuplicates.as_str()).increment(1);
    }
}

pub mod writer {
    use super::MetricName;

    pub fn inserted() {
        ::metrics::counter!(MetricName::WriterInserted.as_str()).increment(1);
    }

    pub fn updated() {
        ::metrics::counter!(MetricName::WriterUpdated.as_str()).increment(1);
    }

    pub fn skipped() {
        ::metrics::counter!(MetricName::WriterSkipped.as_str()).increment(1);
    }

    pub fn failed() {
        ::metrics::counter!(MetricName::WriterFailed.as_str()).increment(1);
    }
}

pub mod pipeline {
    use super::MetricName;

    pub fn run_completed() {
        ::metrics::counter!(MetricName::PipelineRunsCompleted.as_str()).increment(1);
    }

    pub fn run_failed() {
        ::metrics::counter!(MetricName::PipelineRunsFailed.as_str()).increment(1);
    }

    pub fn run_duration(secs: f64) {
        ::metrics::histogram!(MetricName::PipelineRunDuration.as_str()).record(secs);
    }
}
