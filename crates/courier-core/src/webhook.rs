//! Webhook subscriptions and delivery records.

use serde::{Deserialize, Serialize};

use crate::ids::{AccountId, WebhookId};

/// An outbound webhook subscription. Many per account, no ordering among
/// them.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Webhook {
    /// Webhook id (`wh_…`).
    pub id: WebhookId,
    /// Owning account.
    pub account_id: AccountId,
    /// Delivery target URL.
    pub url: String,
    /// Shared secret sent in the `x-webhook-secret` header and accepted on
    /// the inbound receiver.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub secret: Option<String>,
    /// Inactive webhooks are skipped by the dispatcher.
    pub is_active: bool,
    /// RFC 3339 creation timestamp.
    pub created_at: String,
    /// RFC 3339 last-update timestamp.
    pub updated_at: String,
}

impl Webhook {
    /// Build a fresh active webhook.
    pub fn new(account_id: AccountId, url: impl Into<String>, secret: Option<String>) -> Self {
        let now = chrono::Utc::now().to_rfc3339();
        Self {
            id: WebhookId::generate(),
            account_id,
            url: url.into(),
            secret,
            is_active: true,
            created_at: now.clone(),
            updated_at: now,
        }
    }
}

/// Direction of a logged delivery.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeliveryDirection {
    /// A message received from the transport.
    Incoming,
    /// A message sent through the transport.
    Outgoing,
    /// An outbound webhook delivery attempt.
    Webhook,
    /// An event posted to the public inbound receiver.
    WebhookIncoming,
}

impl DeliveryDirection {
    /// SQL/wire string form.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Incoming => "incoming",
            Self::Outgoing => "outgoing",
            Self::Webhook => "webhook",
            Self::WebhookIncoming => "webhook_incoming",
        }
    }
}

/// Outcome of a logged delivery.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeliveryStatus {
    /// Delivered / accepted.
    Success,
    /// Errored; `error_message` carries the detail.
    Failed,
}

impl DeliveryStatus {
    /// SQL/wire string form.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Success => "success",
            Self::Failed => "failed",
        }
    }
}

/// One append-only delivery log row. Produced by the send path, the
/// dispatcher, and the inbound receiver; buffered by the log batcher
/// before it reaches the store.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeliveryRecord {
    /// Account the traffic belongs to.
    pub account_id: AccountId,
    /// Traffic direction.
    pub direction: DeliveryDirection,
    /// Outcome.
    pub status: DeliveryStatus,
    /// Destination (routing address or webhook URL).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub recipient: Option<String>,
    /// Message body or payload summary.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    /// Error detail for failed deliveries.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    /// Media URL, when the payload carried one.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub media_url: Option<String>,
    /// RFC 3339 creation timestamp.
    pub created_at: String,
}

impl DeliveryRecord {
    /// Build a success record.
    pub fn success(
        account_id: AccountId,
        direction: DeliveryDirection,
        recipient: Option<String>,
        message: Option<String>,
    ) -> Self {
        Self {
            account_id,
            direction,
            status: DeliveryStatus::Success,
            recipient,
            message,
            error_message: None,
            media_url: None,
            created_at: chrono::Utc::now().to_rfc3339(),
        }
    }

    /// Build a failure record.
    pub fn failure(
        account_id: AccountId,
        direction: DeliveryDirection,
        recipient: Option<String>,
        message: Option<String>,
        error: impl Into<String>,
    ) -> Self {
        Self {
            account_id,
            direction,
            status: DeliveryStatus::Failed,
            recipient,
            message,
            error_message: Some(error.into()),
            media_url: None,
            created_at: chrono::Utc::now().to_rfc3339(),
        }
    }

    /// Attach a media URL.
    pub fn with_media_url(mut self, media_url: Option<String>) -> Self {
        self.media_url = media_url;
        self
    }
}
