//! The public inbound receiver.
//!
//! Externally posted events tagged to an account are validated against
//! the account's webhook secrets and recorded as inbound delivery
//! records. Deliberately simple: no business logic beyond logging.

use axum::Json;
use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode};
use courier_core::ids::AccountId;
use courier_core::webhook::{DeliveryDirection, DeliveryRecord};
use metrics::counter;
use serde_json::{Value, json};

use crate::error::ApiError;
use crate::state::AppState;

/// Header carrying the shared secret, same one the dispatcher sends.
const SECRET_HEADER: &str = "x-webhook-secret";

/// `POST /hooks/{account_id}`
pub(crate) async fn receive_event(
    State(state): State<AppState>,
    Path(account_id): Path<String>,
    headers: HeaderMap,
    Json(event): Json<Value>,
) -> Result<(StatusCode, Json<Value>), ApiError> {
    let id = AccountId::from_string(account_id);
    if state.store.get_account(&id)?.is_none() {
        counter!("inbound_events_total", "result" => "unknown_account").increment(1);
        return Err(ApiError::not_found(format!("account not found: {id}")));
    }

    let secret = headers
        .get(SECRET_HEADER)
        .and_then(|value| value.to_str().ok())
        .ok_or_else(|| {
            counter!("inbound_events_total", "result" => "missing_secret").increment(1);
            ApiError::unauthorized("missing webhook secret")
        })?;

    if !state.cache.validate_secret(&id, secret)? {
        counter!("inbound_events_total", "result" => "bad_secret").increment(1);
        return Err(ApiError::unauthorized("invalid webhook secret"));
    }

    counter!("inbound_events_total", "result" => "ok").increment(1);
    state.batcher.record(DeliveryRecord::success(
        id.clone(),
        DeliveryDirection::WebhookIncoming,
        None,
        Some(summarize(&event)),
    ));

    Ok((StatusCode::ACCEPTED, Json(json!({ "received": true }))))
}

/// Keep log rows bounded: a compact single-line rendering, truncated.
fn summarize(event: &Value) -> String {
    const MAX: usize = 512;
    let mut text = event.to_string();
    if text.len() > MAX {
        let mut cut = MAX;
        while !text.is_char_boundary(cut) {
            cut -= 1;
        }
        text.truncate(cut);
    }
    text
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn summarize_truncates_long_bodies() {
        let event = json!({ "data": "x".repeat(2000) });
        assert!(summarize(&event).len() <= 512);
    }

    #[test]
    fn summarize_keeps_short_bodies_whole() {
        let event = json!({ "kind": "ping" });
        assert_eq!(summarize(&event), event.to_string());
    }
}
