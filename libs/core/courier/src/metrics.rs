//! Prometheus metrics for consumers.

use metrics::counter;
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use once_cell::sync::OnceCell;
use tracing::info;

static PROMETHEUS_HANDLE: OnceCell<PrometheusHandle> = OnceCell::new();

/// Initialize the Prometheus metrics recorder.
///
/// Call this once at startup. Subsequent calls are no-ops.
pub fn init_metrics() {
    let _ = PROMETHEUS_HANDLE.get_or_init(|| {
        let handle = PrometheusBuilder::new()
            .install_recorder()
            .expect("Failed to install Prometheus recorder");
        info!("Prometheus metrics initialized");
        handle
    });
}

/// Get the Prometheus handle for rendering metrics.
pub fn prometheus_handle() -> Option<&'static PrometheusHandle> {
    PROMETHEUS_HANDLE.get()
}

/// Render metrics in Prometheus format.
pub fn render_metrics() -> String {
    prometheus_handle().map(|h| h.render()).unwrap_or_default()
}

/// Consumer metrics helper.
#[derive(Clone)]
pub struct ConsumerMetrics {
    /// Destination name for labeling.
    destination: String,
}

impl ConsumerMetrics {
    /// Create metrics labeled with a destination name.
    pub fn new(destination: impl Into<String>) -> Self {
        Self {
            destination: destination.into(),
        }
    }

    /// Record a delivered message.
    pub fn message_received(&self) {
        counter!(
            "courier_messages_received_total",
            "destination" => self.destination.clone()
        )
        .increment(1);
    }

    /// Record an empty read.
    pub fn read_timeout(&self) {
        counter!(
            "courier_read_timeouts_total",
            "destination" => self.destination.clone()
        )
        .increment(1);
    }

    /// Record a dropped delivery attempt (no resolvable processor).
    pub fn processor_missing(&self) {
        counter!(
            "courier_processor_missing_total",
            "destination" => self.destination.clone()
        )
        .increment(1);
    }

    /// Record a consumer stop.
    pub fn stopped(&self) {
        counter!(
            "courier_consumer_stops_total",
            "destination" => self.destination.clone()
        )
        .increment(1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metrics_creation() {
        let metrics = ConsumerMetrics::new("jobs");
        assert_eq!(metrics.destination, "jobs");
    }
}
