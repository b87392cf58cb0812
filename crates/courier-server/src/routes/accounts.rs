//! Account endpoints: CRUD, QR retrieval, and the send path.

use axum::Json;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use courier_core::account::Account;
use courier_core::ids::AccountId;
use courier_relay::{OutboundPayload, SessionView};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

use crate::error::ApiError;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct CreateAccountRequest {
    name: String,
    #[serde(default)]
    description: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct SendMessageRequest {
    to: String,
    #[serde(default)]
    body: String,
    #[serde(default)]
    media_url: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct SendMessageResponse {
    status: &'static str,
    to: String,
}

#[derive(Debug, Deserialize)]
pub(crate) struct LogsQuery {
    #[serde(default)]
    limit: Option<i64>,
}

/// The persisted record with the live session fields overlaid — the
/// in-memory registry is authoritative while a session is up.
fn overlay(mut account: Account, view: Option<SessionView>) -> Account {
    if let Some(view) = view {
        account.status = view.status;
        account.qr_payload = view.qr_payload;
        account.phone_number = view.phone_number;
        account.error_message = view.error_message;
    }
    account
}

/// `POST /api/accounts`
pub(crate) async fn create_account(
    State(state): State<AppState>,
    Json(req): Json<CreateAccountRequest>,
) -> Result<(StatusCode, Json<Account>), ApiError> {
    if req.name.trim().is_empty() {
        return Err(ApiError::bad_request("account name is required"));
    }
    let account = state
        .registry
        .create_account(req.name.trim(), req.description)
        .await?;
    Ok((StatusCode::CREATED, Json(account)))
}

/// `GET /api/accounts`
pub(crate) async fn list_accounts(
    State(state): State<AppState>,
) -> Result<Json<Vec<Account>>, ApiError> {
    let accounts = state
        .store
        .list_accounts()?
        .into_iter()
        .map(|account| {
            let view = state.registry.session_view(&account.id);
            overlay(account, view)
        })
        .collect();
    Ok(Json(accounts))
}

/// `GET /api/accounts/{account_id}`
pub(crate) async fn get_account(
    State(state): State<AppState>,
    Path(account_id): Path<String>,
) -> Result<Json<Account>, ApiError> {
    let id = AccountId::from_string(account_id);
    let account = state
        .store
        .get_account(&id)?
        .ok_or_else(|| ApiError::not_found(format!("account not found: {id}")))?;
    Ok(Json(overlay(account, state.registry.session_view(&id))))
}

/// `GET /api/accounts/{account_id}/qr`
///
/// 404 once the session is past its QR phase — codes are single-use.
pub(crate) async fn get_qr(
    State(state): State<AppState>,
    Path(account_id): Path<String>,
) -> Result<Json<Value>, ApiError> {
    let id = AccountId::from_string(account_id);
    let entry = state.registry.entry(&id)?;
    match entry.qr_payload() {
        Some(payload) => Ok(Json(json!({ "accountId": id, "qr": payload }))),
        None => Err(ApiError::not_found("no QR payload available")),
    }
}

/// `DELETE /api/accounts/{account_id}`
pub(crate) async fn delete_account(
    State(state): State<AppState>,
    Path(account_id): Path<String>,
) -> Result<StatusCode, ApiError> {
    let id = AccountId::from_string(account_id);
    state.registry.delete_account(&id).await?;
    state.queue.remove_account(&id);
    Ok(StatusCode::NO_CONTENT)
}

/// `POST /api/accounts/{account_id}/messages`
pub(crate) async fn send_message(
    State(state): State<AppState>,
    Path(account_id): Path<String>,
    Json(req): Json<SendMessageRequest>,
) -> Result<Json<SendMessageResponse>, ApiError> {
    let id = AccountId::from_string(account_id);
    let entry = state.registry.entry(&id)?;
    let canonical = state
        .queue
        .enqueue(
            &entry,
            &req.to,
            OutboundPayload {
                body: req.body,
                media_url: req.media_url,
            },
        )
        .await?;
    Ok(Json(SendMessageResponse {
        status: "sent",
        to: canonical,
    }))
}

/// `GET /api/accounts/{account_id}/logs`
pub(crate) async fn list_deliveries(
    State(state): State<AppState>,
    Path(account_id): Path<String>,
    Query(query): Query<LogsQuery>,
) -> Result<Json<Vec<Value>>, ApiError> {
    let id = AccountId::from_string(account_id);
    if state.store.get_account(&id)?.is_none() {
        return Err(ApiError::not_found(format!("account not found: {id}")));
    }
    let limit = query.limit.unwrap_or(100).clamp(1, 1000);
    let rows = state
        .store
        .recent_delivery_logs(&id, limit)?
        .into_iter()
        .map(|row| {
            let mut value = serde_json::to_value(&row.record).unwrap_or(Value::Null);
            if let Some(object) = value.as_object_mut() {
                let _ = object.insert("id".into(), json!(row.id));
            }
            value
        })
        .collect();
    Ok(Json(rows))
}
