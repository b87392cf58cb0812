//! Prometheus metrics recorder and `/metrics` endpoint handler.

use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use tracing::info;

/// Install the Prometheus metrics recorder (global).
///
/// Returns the `PrometheusHandle` used to render the `/metrics` endpoint.
/// Must be called once at daemon startup before any metrics are recorded.
pub fn install_recorder() -> PrometheusHandle {
    let builder = PrometheusBuilder::new();
    let handle = builder
        .install_recorder()
        .expect("failed to install metrics recorder");
    info!("prometheus metrics recorder installed");
    handle
}

/// Render Prometheus text format from the installed recorder.
pub fn render(handle: &PrometheusHandle) -> String {
    handle.render()
}

// Metric name constants to avoid typos across crates.

/// Live sessions (gauge).
pub const ACCOUNTS_ACTIVE: &str = "accounts_active";
/// Outbound sends (counter, labels: result).
pub const OUTBOUND_SENDS_TOTAL: &str = "outbound_sends_total";
/// Outbound admission rejections (counter, labels: reason).
pub const OUTBOUND_REJECTIONS_TOTAL: &str = "outbound_rejections_total";
/// Webhook delivery attempts (counter, labels: result).
pub const WEBHOOK_DELIVERIES_TOTAL: &str = "webhook_deliveries_total";
/// Webhook list cache hits (counter).
pub const WEBHOOK_LIST_CACHE_HITS_TOTAL: &str = "webhook_list_cache_hits_total";
/// Webhook list cache misses (counter).
pub const WEBHOOK_LIST_CACHE_MISSES_TOTAL: &str = "webhook_list_cache_misses_total";
/// Secret cache hits (counter).
pub const WEBHOOK_SECRET_CACHE_HITS_TOTAL: &str = "webhook_secret_cache_hits_total";
/// Secret cache misses (counter).
pub const WEBHOOK_SECRET_CACHE_MISSES_TOTAL: &str = "webhook_secret_cache_misses_total";
/// Delivery log flushes (counter, labels: result).
pub const DELIVERY_LOG_FLUSHES_TOTAL: &str = "delivery_log_flushes_total";
/// Inbound receiver posts (counter, labels: result).
pub const INBOUND_EVENTS_TOTAL: &str = "inbound_events_total";
