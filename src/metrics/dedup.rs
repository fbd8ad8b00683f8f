//! Deduplication phase metrics

use crate::metrics::{phase_metric, MetricDoc, MetricType, PhaseMetrics};

pub struct DedupMetrics;

impl DedupMetrics {
    pub fn record_forwarded() {
        ::metrics::counter!(phase_metric!(counter, "dedup", "forwarded")).increment(1);
    }

    pub fn record_duplicate() {
        ::metrics::counter!(phase_metric!(counter, "dedup", "duplicates")).increment(1);
    }

    pub fn record_store_size(keys: usize) {
        ::metrics::gauge!(phase_metric!(gauge, "dedup", "store_keys")).set(keys as f64);
    }
}

impl PhaseMetrics for DedupMetrics {
    fn register_metrics() {
        use metrics::{counter, gauge};

        let _ = counter!(phase_metric!(counter, "dedup", "forwarded"));
        let _ = counter!(phase_metric!(counter, "dedup", "duplicates"));
        let _ = gauge!(phase_metric!(gauge, "dedup", "store_keys"));
    }

    fn phase_name() -> &'static str {
        "dedup"
    }

    fn metrics_documentation() -> Vec<MetricDoc> {
        vec![
            MetricDoc {
                name: phase_metric!(counter, "dedup", "forwarded"),
                metric_type: MetricType::Counter,
                help: "First sightings forwarded past the deduplicator",
                labels: vec![],
            },
            MetricDoc {
                name: phase_metric!(counter, "dedup", "duplicates"),
                metric_type: MetricType::Counter,
                help: "Repeat sightings discarded within the window",
                labels: vec![],
            },
            MetricDoc {
                name: phase_metric!(gauge, "dedup", "store_keys"),
                metric_type: MetricType::Gauge,
                help: "Keys currently held in the dedup window",
                labels: vec![],
            },
        ]
    }
}
