//! Metrics registry for coordinating phase-specific metrics
//!
//! Registers every phase's metrics up front and flags name conflicts early.

use crate::metrics::{MetricDoc, PhaseMetrics};
use std::collections::HashMap;
use tracing::{info, warn};

/// Register all metrics from all phases
pub fn register_all_metrics() {
    let mut all_metrics = HashMap::new();

    register_phase_metrics::<super::ingest::IngestMetrics>(&mut all_metrics);
    register_phase_metrics::<super::dedup::DedupMetrics>(&mut all_metrics);
    register_phase_metrics::<super::diffs::DiffMetrics>(&mut all_metrics);

    info!(
        "Registered {} total metrics across all phases",
        all_metrics.len()
    );

    if std::env::var("WIKIEDIT_METRICS_DEBUG").is_ok() {
        log_metrics_summary(&all_metrics);
    }
}

/// Register metrics for a specific phase and detect conflicts
fn register_phase_metrics<T: PhaseMetrics>(all_metrics: &mut HashMap<String, MetricDoc>) {
    T::register_metrics();
    let phase_docs = T::metrics_documentation();
    let phase_name = T::phase_name();

    info!(
        "Registering {} metrics for phase '{}'",
        phase_docs.len(),
        phase_name
    );

    for doc in phase_docs {
        if all_metrics.contains_key(doc.name) {
            warn!(
                "Metric name conflict detected: '{}' is already registered (phase '{}')",
                doc.name, phase_name
            );
        } else {
            all_metrics.insert(doc.name.to_string(), doc);
        }
    }
}

fn log_metrics_summary(all_metrics: &HashMap<String, MetricDoc>) {
    let mut by_phase: HashMap<&str, Vec<&MetricDoc>> = HashMap::new();
    for doc in all_metrics.values() {
        by_phase
            .entry(extract_phase_from_metric_name(doc.name))
            .or_default()
            .push(doc);
    }

    for (phase, metrics) in by_phase {
        info!("Phase '{}': {} metrics", phase, metrics.len());
        for metric in metrics {
            info!("  - {} ({:?}): {}", metric.name, metric.metric_type, metric.help);
        }
    }
}

/// Extract phase name from metric name (e.g. "wikiedit_dedup_duplicates_total" -> "dedup")
fn extract_phase_from_metric_name(metric_name: &str) -> &str {
    metric_name
        .strip_prefix("wikiedit_")
        .and_then(|rest| rest.split_once('_'))
        .map(|(phase, _)| phase)
        .unwrap_or("unknown")
}
