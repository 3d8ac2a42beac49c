//! Prometheus metrics for facade operations.

use metrics::{counter, histogram};
use metrics_exporter_prometheus::{BuildError, PrometheusBuilder, PrometheusHandle};
use std::time::Duration;

pub const REQUEST_COUNT: &str = "armor_request_count";
pub const REQUEST_LATENCY: &str = "armor_request_latency_seconds";

/// Owns the installed Prometheus recorder.
#[derive(Clone)]
pub struct MetricsRecorder {
    handle: PrometheusHandle,
}

impl MetricsRecorder {
    /// Installs the process-wide recorder. Fails if one is already installed.
    pub fn install() -> Result<Self, BuildError> {
        let handle = PrometheusBuilder::new().install_recorder()?;
        Ok(Self { handle })
    }

    pub fn from_handle(handle: PrometheusHandle) -> Self {
        Self { handle }
    }

    /// Metrics in the Prometheus text format.
    pub fn render(&self) -> String {
        self.handle.render()
    }
}

/// Records one facade call.
pub fn record_request(method: &'static str, failed: bool, elapsed: Duration) {
    let labels = [("method", method.to_string()), ("error", failed.to_string())];

    counter!(REQUEST_COUNT, &labels).increment(1);
    histogram!(REQUEST_LATENCY, &labels).record(elapsed.as_secs_f64());
}
