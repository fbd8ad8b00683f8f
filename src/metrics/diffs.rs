//! Diff retrieval and archival metrics

use crate::metrics::{phase_metric, MetricDoc, MetricType, PhaseMetrics};

pub struct DiffMetrics;

impl DiffMetrics {
    pub fn record_enqueued(pending: usize) {
        ::metrics::counter!(phase_metric!(counter, "diffs", "enqueued")).increment(1);
        ::metrics::gauge!(phase_metric!(gauge, "diffs", "queue_depth")).set(pending as f64);
    }

    pub fn record_fetch_success(duration_secs: f64, payload_bytes: usize) {
        ::metrics::counter!(phase_metric!(counter, "diffs", "fetch_success")).increment(1);
        ::metrics::histogram!(phase_metric!(histogram, "diffs", "fetch_duration_seconds"))
            .record(duration_secs);
        ::metrics::histogram!(phase_metric!(histogram, "diffs", "payload_bytes"))
            .record(payload_bytes as f64);
    }

    pub fn record_fetch_error() {
        ::metrics::counter!(phase_metric!(counter, "diffs", "fetch_error")).increment(1);
    }

    pub fn record_archived() {
        ::metrics::counter!(phase_metric!(counter, "diffs", "archived")).increment(1);
    }

    pub fn record_archive_error() {
        ::metrics::counter!(phase_metric!(counter, "diffs", "archive_error")).increment(1);
    }
}

impl PhaseMetrics for DiffMetrics {
    fn register_metrics() {
        use metrics::{counter, gauge, histogram};

        let _ = counter!(phase_metric!(counter, "diffs", "enqueued"));
        let _ = counter!(phase_metric!(counter, "diffs", "fetch_success"));
        let _ = counter!(phase_metric!(counter, "diffs", "fetch_error"));
        let _ = counter!(phase_metric!(counter, "diffs", "archived"));
        let _ = counter!(phase_metric!(counter, "diffs", "archive_error"));
        let _ = gauge!(phase_metric!(gauge, "diffs", "queue_depth"));
        let _ = histogram!(phase_metric!(histogram, "diffs", "fetch_duration_seconds"));
        let _ = histogram!(phase_metric!(histogram, "diffs", "payload_bytes"));
    }

    fn phase_name() -> &'static str {
        "diffs"
    }

    fn metrics_documentation() -> Vec<MetricDoc> {
        vec![
            MetricDoc {
                name: phase_metric!(counter, "diffs", "enqueued"),
                metric_type: MetricType::Counter,
                help: "Revisions queued for diff retrieval",
                labels: vec![],
            },
            MetricDoc {
                name: phase_metric!(counter, "diffs", "fetch_success"),
                metric_type: MetricType::Counter,
                help: "Successful compare API requests",
                labels: vec![],
            },
            MetricDoc {
                name: phase_metric!(counter, "diffs", "fetch_error"),
                metric_type: MetricType::Counter,
                help: "Failed compare API requests (not retried)",
                labels: vec![],
            },
            MetricDoc {
                name: phase_metric!(counter, "diffs", "archived"),
                metric_type: MetricType::Counter,
                help: "Diff payloads written to the archive",
                labels: vec![],
            },
            MetricDoc {
                name: phase_metric!(counter, "diffs", "archive_error"),
                metric_type: MetricType::Counter,
                help: "Diff payloads that could not be archived",
                labels: vec![],
            },
            MetricDoc {
                name: phase_metric!(gauge, "diffs", "queue_depth"),
                metric_type: MetricType::Gauge,
                help: "Jobs waiting in the fetch queue at enqueue time",
                labels: vec![],
            },
            MetricDoc {
                name: phase_metric!(histogram, "diffs", "fetch_duration_seconds"),
                metric_type: MetricType::Histogram,
                help: "Duration of compare API requests in seconds",
                labels: vec![],
            },
            MetricDoc {
                name: phase_metric!(histogram, "diffs", "payload_bytes"),
                metric_type: MetricType::Histogram,
                help: "Size of compare API responses in bytes",
                labels: vec![],
            },
        ]
    }
}
