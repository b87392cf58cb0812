//! Webhook subscription endpoints.
//!
//! Every mutation invalidates the account's cached webhook lists and
//! secret verdicts before returning — a deleted webhook's secret must not
//! validate even once afterwards.

use axum::Json;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use courier_core::ids::{AccountId, WebhookId};
use courier_core::webhook::Webhook;
use courier_store::repositories::webhook::WebhookUpdate;
use serde::Deserialize;

use crate::error::ApiError;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct CreateWebhookRequest {
    url: String,
    #[serde(default)]
    secret: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct UpdateWebhookRequest {
    #[serde(default)]
    url: Option<String>,
    /// `null` clears the secret; omitted leaves it alone.
    #[serde(default, with = "double_option")]
    secret: Option<Option<String>>,
    #[serde(default)]
    is_active: Option<bool>,
}

/// Distinguishes an omitted field from an explicit `null`.
mod double_option {
    use serde::{Deserialize, Deserializer};

    pub(super) fn deserialize<'de, D>(
        deserializer: D,
    ) -> Result<Option<Option<String>>, D::Error>
    where
        D: Deserializer<'de>,
    {
        Option::<String>::deserialize(deserializer).map(Some)
    }
}

/// `POST /api/accounts/{account_id}/webhooks`
pub(crate) async fn create_webhook(
    State(state): State<AppState>,
    Path(account_id): Path<String>,
    Json(req): Json<CreateWebhookRequest>,
) -> Result<(StatusCode, Json<Webhook>), ApiError> {
    if !(req.url.starts_with("http://") || req.url.starts_with("https://")) {
        return Err(ApiError::bad_request("webhook url must be http(s)"));
    }
    let id = AccountId::from_string(account_id);
    let webhook = Webhook::new(id.clone(), req.url, req.secret);
    state.store.create_webhook(&webhook)?;
    state.cache.invalidate_account(&id);
    Ok((StatusCode::CREATED, Json(webhook)))
}

/// `GET /api/accounts/{account_id}/webhooks`
pub(crate) async fn list_webhooks(
    State(state): State<AppState>,
    Path(account_id): Path<String>,
) -> Result<Json<Vec<Webhook>>, ApiError> {
    let id = AccountId::from_string(account_id);
    Ok(Json(state.store.list_webhooks(&id, false)?))
}

/// `PATCH /api/webhooks/{webhook_id}`
pub(crate) async fn update_webhook(
    State(state): State<AppState>,
    Path(webhook_id): Path<String>,
    Json(req): Json<UpdateWebhookRequest>,
) -> Result<Json<Webhook>, ApiError> {
    let id = WebhookId::from_string(webhook_id);
    let existing = state
        .store
        .get_webhook(&id)?
        .ok_or_else(|| ApiError::not_found(format!("webhook not found: {id}")))?;

    let update = WebhookUpdate {
        url: req.url.as_deref(),
        secret: req.secret.as_ref().map(|inner| inner.as_deref()),
        is_active: req.is_active,
    };
    let _ = state.store.update_webhook(&id, &update)?;
    state.cache.invalidate_account(&existing.account_id);

    let webhook = state
        .store
        .get_webhook(&id)?
        .ok_or_else(|| ApiError::not_found(format!("webhook not found: {id}")))?;
    Ok(Json(webhook))
}

/// `DELETE /api/webhooks/{webhook_id}`
pub(crate) async fn delete_webhook(
    State(state): State<AppState>,
    Path(webhook_id): Path<String>,
) -> Result<StatusCode, ApiError> {
    let id = WebhookId::from_string(webhook_id);
    let existing = state
        .store
        .get_webhook(&id)?
        .ok_or_else(|| ApiError::not_found(format!("webhook not found: {id}")))?;

    let _ = state.store.delete_webhook(&id)?;
    // Invalidate AFTER the row is gone so a concurrent read-through cannot
    // repopulate the stale verdict.
    state.cache.invalidate_account(&existing.account_id);
    Ok(StatusCode::NO_CONTENT)
}
