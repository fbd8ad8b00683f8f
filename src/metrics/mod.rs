//! Centralized metrics infrastructure for the recent-change pipeline
//!
//! Each pipeline phase defines its own metrics in a dedicated submodule,
//! which keeps ownership clear and names from colliding.

pub mod dedup;
pub mod diffs;
pub mod ingest;
pub mod registry;

pub use dedup::DedupMetrics;
pub use diffs::DiffMetrics;
pub use ingest::IngestMetrics;

use std::net::SocketAddr;
use std::sync::Once;
use tracing::{info, warn};

static INIT: Once = Once::new();

/// Default listener for the Prometheus exporter
pub const DEFAULT_METRICS_ADDR: &str = "127.0.0.1:9898";

/// Initialize the global metrics infrastructure
///
/// Idempotent. Installs the Prometheus recorder with an HTTP listener on
/// `addr` (falling back to the default on a bad address) and registers every
/// phase's metrics.
pub fn init_metrics(addr: &str) {
    INIT.call_once(|| {
        let addr: SocketAddr = match addr.parse() {
            Ok(addr) => addr,
            Err(_) => {
                warn!("Invalid metrics addr '{}', using default {}", addr, DEFAULT_METRICS_ADDR);
                SocketAddr::from(([127, 0, 0, 1], 9898))
            }
        };

        let builder =
            metrics_exporter_prometheus::PrometheusBuilder::new().with_http_listener(addr);
        match builder.install() {
            Ok(()) => {
                info!("Prometheus HTTP exporter started at http://{}/metrics", addr);
                registry::register_all_metrics();
            }
            Err(e) => {
                warn!("Failed to install Prometheus exporter: {}", e);
            }
        }
    });
}

/// Trait for phase-specific metrics collections
///
/// Each pipeline phase implements this trait to provide:
/// - Metric registration at startup
/// - Consistent naming conventions
/// - Documentation of what each metric measures
pub trait PhaseMetrics {
    /// Register all metrics for this phase
    fn register_metrics();

    /// Get the phase name for prefixing metrics
    fn phase_name() -> &'static str;

    /// Get documentation for all metrics in this phase
    fn metrics_documentation() -> Vec<MetricDoc>;
}

/// Documentation for a single metric
#[derive(Debug, Clone)]
pub struct MetricDoc {
    pub name: &'static str,
    pub metric_type: MetricType,
    pub help: &'static str,
    #[allow(dead_code)]
    pub labels: Vec<&'static str>,
}

#[derive(Debug, Clone)]
pub enum MetricType {
    Counter,
    Histogram,
    Gauge,
}

/// Macro to create phase-specific metric names with consistent naming
///
/// All metrics follow the convention `wikiedit_{phase}_{metric_name}[_total]`.
macro_rules! phase_metric {
    (counter, $phase:literal, $name:literal) => {
        concat!("wikiedit_", $phase, "_", $name, "_total")
    };
    (histogram, $phase:literal, $name:literal) => {
        concat!("wikiedit_", $phase, "_", $name)
    };
    (gauge, $phase:literal, $name:literal) => {
        concat!("wikiedit_", $phase, "_", $name)
    };
}

pub(crate) use phase_metric;
