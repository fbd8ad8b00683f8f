//! Ingest phase metrics
//!
//! Listener traffic and normalization outcomes, labelled by source.

use crate::metrics::{phase_metric, MetricDoc, MetricType, PhaseMetrics};
use crate::recentchanges::Source;

pub struct IngestMetrics;

impl IngestMetrics {
    /// A message arrived from a listener
    pub fn record_received(source: Source) {
        ::metrics::counter!(phase_metric!(counter, "ingest", "received"), "source" => source.to_string())
            .increment(1);
    }

    /// A payload could not be decoded
    pub fn record_decode_error(source: Source) {
        ::metrics::counter!(phase_metric!(counter, "ingest", "decode_errors"), "source" => source.to_string())
            .increment(1);
    }

    pub fn record_normalized(source: Source) {
        ::metrics::counter!(phase_metric!(counter, "ingest", "normalized"), "source" => source.to_string())
            .increment(1);
    }

    /// A source event was dropped as unclassifiable or unsupported
    pub fn record_normalize_error(source: Source) {
        ::metrics::counter!(phase_metric!(counter, "ingest", "normalize_errors"), "source" => source.to_string())
            .increment(1);
    }
}

impl PhaseMetrics for IngestMetrics {
    fn register_metrics() {
        use metrics::counter;

        let _ = counter!(phase_metric!(counter, "ingest", "received"));
        let _ = counter!(phase_metric!(counter, "ingest", "decode_errors"));
        let _ = counter!(phase_metric!(counter, "ingest", "normalized"));
        let _ = counter!(phase_metric!(counter, "ingest", "normalize_errors"));
    }

    fn phase_name() -> &'static str {
        "ingest"
    }

    fn metrics_documentation() -> Vec<MetricDoc> {
        vec![
            MetricDoc {
                name: phase_metric!(counter, "ingest", "received"),
                metric_type: MetricType::Counter,
                help: "Recent-change messages received from listeners",
                labels: vec!["source"],
            },
            MetricDoc {
                name: phase_metric!(counter, "ingest", "decode_errors"),
                metric_type: MetricType::Counter,
                help: "Messages dropped because they could not be decoded",
                labels: vec!["source"],
            },
            MetricDoc {
                name: phase_metric!(counter, "ingest", "normalized"),
                metric_type: MetricType::Counter,
                help: "Source events mapped onto the canonical shape",
                labels: vec!["source"],
            },
            MetricDoc {
                name: phase_metric!(counter, "ingest", "normalize_errors"),
                metric_type: MetricType::Counter,
                help: "Source events dropped as unclassifiable",
                labels: vec!["source"],
            },
        ]
    }
}
