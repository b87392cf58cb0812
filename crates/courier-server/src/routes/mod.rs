//! Route table.

pub mod accounts;
pub mod incoming;
pub mod webhooks;

use axum::Router;
use axum::extract::State;
use axum::routing::{delete, get, post};
use tower_http::trace::TraceLayer;

use crate::state::AppState;

/// Build the full application router.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route(
            "/api/accounts",
            post(accounts::create_account).get(accounts::list_accounts),
        )
        .route(
            "/api/accounts/{account_id}",
            get(accounts::get_account).delete(accounts::delete_account),
        )
        .route("/api/accounts/{account_id}/qr", get(accounts::get_qr))
        .route(
            "/api/accounts/{account_id}/messages",
            post(accounts::send_message),
        )
        .route(
            "/api/accounts/{account_id}/logs",
            get(accounts::list_deliveries),
        )
        .route(
            "/api/accounts/{account_id}/webhooks",
            post(webhooks::create_webhook).get(webhooks::list_webhooks),
        )
        .route(
            "/api/webhooks/{webhook_id}",
            delete(webhooks::delete_webhook).patch(webhooks::update_webhook),
        )
        .route("/hooks/{account_id}", post(incoming::receive_event))
        .route("/health", get(health))
        .route("/metrics", get(render_metrics))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn health() -> &'static str {
    "ok"
}

async fn render_metrics(State(state): State<AppState>) -> String {
    crate::metrics::render(&state.metrics)
}
