//! Prometheus metrics recorder and metric names.

use metrics_exporter_prometheus::{BuildError, PrometheusBuilder, PrometheusHandle};
use tracing::info;

/// Install the Prometheus recorder as the global `metrics` recorder.
///
/// Call once at startup, before any metric is recorded.
pub fn install_recorder() -> Result<PrometheusHandle, BuildError> {
    let handle = PrometheusBuilder::new().install_recorder()?;
    info!("prometheus metrics recorder installed");
    Ok(handle)
}

/// Render Prometheus text format.
pub fn render(handle: &PrometheusHandle) -> String {
    handle.render()
}

/// Sessions accepted (counter).
pub const CONNECTIONS_TOTAL: &str = "relay_connections_total";
/// Sessions torn down (counter).
pub const DISCONNECTIONS_TOTAL: &str = "relay_disconnections_total";
/// Live sessions (gauge).
pub const CONNECTIONS_ACTIVE: &str = "relay_connections_active";
/// Session lifetime in seconds (histogram).
pub const CONNECTION_DURATION_SECONDS: &str = "relay_connection_duration_seconds";
/// Messages accepted for broadcast (counter, labels: source).
pub const MESSAGES_PUBLISHED_TOTAL: &str = "relay_messages_published_total";
/// Payloads dropped on a full subscriber queue (counter).
pub const BROADCAST_DROPS_TOTAL: &str = "relay_broadcast_drops_total";
/// Subscribers force-closed as slow consumers (counter).
pub const EVICTIONS_TOTAL: &str = "relay_evictions_total";
