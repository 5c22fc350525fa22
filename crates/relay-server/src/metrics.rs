//! Prometheus metrics recorder and `/metrics` endpoint handler.

use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use tracing::info;

/// Install the Prometheus metrics recorder (global).
///
/// Returns the `PrometheusHandle` used to render the `/metrics` endpoint.
/// Must be called once at startup before any metrics are recorded.
pub fn install_recorder() -> PrometheusHandle {
    let handle = PrometheusBuilder::new()
        .install_recorder()
        .expect("failed to install metrics recorder");
    info!("prometheus metrics recorder installed");
    handle
}

/// Render Prometheus text format from the installed recorder.
pub fn render(handle: &PrometheusHandle) -> String {
    handle.render()
}

// Metric name constants shared with relay-tasks.

/// WebSocket connections opened total (counter).
pub const WS_CONNECTIONS_TOTAL: &str = "ws_connections_total";
/// WebSocket disconnections total (counter, labels: reason).
pub const WS_DISCONNECTIONS_TOTAL: &str = "ws_disconnections_total";
/// Active WebSocket connections (gauge).
pub const WS_CONNECTIONS_ACTIVE: &str = "ws_connections_active";
/// Frames skipped because a recipient queue was full or closed (counter).
pub const WS_BROADCAST_DROPS_TOTAL: &str = "ws_broadcast_drops_total";
/// WebSocket connection lifetime seconds (histogram).
pub const WS_CONNECTION_DURATION_SECONDS: &str = "ws_connection_duration_seconds";
/// Inbound events handled (counter, labels: event).
pub const EVENTS_RECEIVED_TOTAL: &str = "events_received_total";
/// Inbound events rejected or failed (counter, labels: event).
pub const EVENT_ERRORS_TOTAL: &str = "event_errors_total";
/// Sessions removed by the sweeper (counter).
pub const SESSIONS_EXPIRED_TOTAL: &str = "sessions_expired_total";
/// Tasks admitted by the executor (counter).
pub const TASKS_SUBMITTED_TOTAL: &str = "tasks_submitted_total";
/// Tasks that reached `completed` (counter, labels: type).
pub const TASKS_COMPLETED_TOTAL: &str = "tasks_completed_total";
/// Tasks that reached `failed` (counter, labels: type).
pub const TASKS_FAILED_TOTAL: &str = "tasks_failed_total";
/// Tasks currently in `running` (gauge).
pub const TASKS_RUNNING: &str = "tasks_running";

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn render_without_global_install() {
        let handle = PrometheusBuilder::new().build_recorder().handle();
        let output = render(&handle);
        assert!(output.is_empty() || output.contains('#') || output.contains('\n'));
    }

    #[test]
    fn metric_constants_are_snake_case() {
        let names = [
            WS_CONNECTIONS_TOTAL,
            WS_DISCONNECTIONS_TOTAL,
            WS_CONNECTIONS_ACTIVE,
            WS_BROADCAST_DROPS_TOTAL,
            WS_CONNECTION_DURATION_SECONDS,
            EVENTS_RECEIVED_TOTAL,
            EVENT_ERRORS_TOTAL,
            SESSIONS_EXPIRED_TOTAL,
            TASKS_SUBMITTED_TOTAL,
            TASKS_COMPLETED_TOTAL,
            TASKS_FAILED_TOTAL,
            TASKS_RUNNING,
        ];
        for name in names {
            assert!(
                name.chars().all(|c| c.is_ascii_lowercase() || c == '_'),
                "metric name '{name}' must be snake_case"
            );
        }
    }
}
