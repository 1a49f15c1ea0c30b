//! Prometheus metrics recorder and `/metrics` rendering.

use metrics_exporter_prometheus::{BuildError, PrometheusBuilder, PrometheusHandle};
use tracing::info;

/// Install the Prometheus metrics recorder (global).
///
/// Returns the handle used to render `/metrics`. Call once at startup before
/// any metrics are recorded.
pub fn install_recorder() -> Result<PrometheusHandle, BuildError> {
    let handle = PrometheusBuilder::new().install_recorder()?;
    info!("prometheus metrics recorder installed");
    Ok(handle)
}

/// Render Prometheus text format from the installed recorder.
pub fn render(handle: &PrometheusHandle) -> String {
    handle.render()
}

// Metric name constants to avoid typos across modules.

/// WebSocket connections opened total (counter, labels: endpoint).
pub const WS_CONNECTIONS_TOTAL: &str = "ws_connections_total";
/// Active WebSocket connections (gauge).
pub const WS_CONNECTIONS_ACTIVE: &str = "ws_connections_active";
/// WebSocket disconnections total (counter, labels: endpoint).
pub const WS_DISCONNECTIONS_TOTAL: &str = "ws_disconnections_total";
/// Room broadcasts total (counter, labels: type).
pub const ROOM_BROADCASTS_TOTAL: &str = "room_broadcasts_total";
/// Members evicted after a failed send (counter, labels: reason).
pub const ROOM_EVICTIONS_TOTAL: &str = "room_evictions_total";
/// Chat messages relayed total (counter).
pub const CHAT_MESSAGES_TOTAL: &str = "chat_messages_total";
