//! Gateway error → HTTP response mapping.

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use courier_relay::GatewayError;
use courier_store::StoreError;
use serde_json::json;

/// API-facing error with a status code and a stable error code string.
#[derive(Debug, thiserror::Error)]
#[error("{message}")]
pub struct ApiError {
    /// HTTP status.
    pub status: StatusCode,
    /// Stable machine-readable code.
    pub code: &'static str,
    /// Human-readable detail.
    pub message: String,
}

impl ApiError {
    /// 404 with a custom message.
    pub fn not_found(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::NOT_FOUND,
            code: "not_found",
            message: message.into(),
        }
    }

    /// 401 for a missing/invalid webhook secret.
    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::UNAUTHORIZED,
            code: "unauthorized",
            message: message.into(),
        }
    }

    /// 400 for malformed input.
    pub fn bad_request(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            code: "bad_request",
            message: message.into(),
        }
    }
}

impl From<GatewayError> for ApiError {
    fn from(err: GatewayError) -> Self {
        let status = match &err {
            GatewayError::AccountNotFound(_) => StatusCode::NOT_FOUND,
            GatewayError::NotReady { .. } => StatusCode::CONFLICT,
            GatewayError::QueueFull { .. } => StatusCode::TOO_MANY_REQUESTS,
            GatewayError::InvalidMedia(_) => StatusCode::BAD_REQUEST,
            GatewayError::SessionUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            GatewayError::Transport(_) => StatusCode::BAD_GATEWAY,
            GatewayError::Persistence(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        Self {
            status,
            code: err.kind(),
            message: err.to_string(),
        }
    }
}

impl From<StoreError> for ApiError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::AccountNotFound(id) => Self::not_found(format!("account not found: {id}")),
            StoreError::WebhookNotFound(id) => Self::not_found(format!("webhook not found: {id}")),
            other => Self {
                status: StatusCode::INTERNAL_SERVER_ERROR,
                code: "persistence",
                message: other.to_string(),
            },
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = Json(json!({
            "error": self.message,
            "code": self.code,
        }));
        (self.status, body).into_response()
    }
}
