//! Shared handler state.

use std::sync::Arc;

use courier_relay::{AccountRegistry, LogBatcher, OutboundQueue, WebhookCache};
use courier_store::Store;
use metrics_exporter_prometheus::PrometheusHandle;

/// Everything the routes need, cheap to clone per request.
#[derive(Clone)]
pub struct AppState {
    /// Live session registry.
    pub registry: Arc<AccountRegistry>,
    /// Outbound admission gate.
    pub queue: Arc<OutboundQueue>,
    /// Webhook caches (mutations must invalidate through here).
    pub cache: Arc<WebhookCache>,
    /// Delivery log buffer.
    pub batcher: Arc<LogBatcher>,
    /// Persistence.
    pub store: Arc<Store>,
    /// Prometheus render handle for `/metrics`.
    pub metrics: PrometheusHandle,
}
