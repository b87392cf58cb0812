//! The transport seam.
//!
//! A transport client is the external collaborator that actually speaks
//! the messaging protocol (concretely, an HTTP bridge in the gateway
//! binary). One client per account; lifecycle and inbound-message events
//! arrive on a dedicated mpsc channel whose ordering is the per-session
//! ordering guarantee the registry relies on.

use std::sync::Arc;

use async_trait::async_trait;
use courier_core::events::SessionEvent;
use courier_core::ids::AccountId;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

/// What an outbound send carries.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OutboundPayload {
    /// Message body.
    pub body: String,
    /// Optional media attachment URL.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub media_url: Option<String>,
}

impl OutboundPayload {
    /// Text-only payload.
    pub fn text(body: impl Into<String>) -> Self {
        Self {
            body: body.into(),
            media_url: None,
        }
    }
}

/// Transport-level failures.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// Session establishment failed.
    #[error("transport connect failed: {0}")]
    Connect(String),

    /// The send call failed.
    #[error("transport send failed: {0}")]
    Send(String),

    /// The handle is closed; no further calls will succeed.
    #[error("session closed")]
    Closed,
}

/// One account's live connection to the external messaging transport.
///
/// `connect` may take arbitrarily long and is always driven from a
/// background task; progress is reported through the event channel, not
/// the return value. `send` blocks the calling flow until the transport
/// acknowledges or fails — admission control above it is what bounds the
/// number of concurrent callers.
#[async_trait]
pub trait TransportClient: Send + Sync {
    /// Open the session. Lifecycle events stream on the channel handed out
    /// by the factory.
    async fn connect(&self) -> Result<(), TransportError>;

    /// Send one message to a canonical routing address.
    async fn send(&self, destination: &str, payload: &OutboundPayload)
    -> Result<(), TransportError>;

    /// Tear the session down. Idempotent.
    async fn destroy(&self) -> Result<(), TransportError>;

    /// Cheap pre-check: `false` once the underlying session is closed or
    /// broken. Send attempts against an unusable handle are rejected
    /// before the transport is invoked.
    fn is_usable(&self) -> bool;
}

/// Creates one client + event stream per account session.
pub trait TransportFactory: Send + Sync {
    /// Build a client for the account. The receiver is the session's
    /// single ordered event stream; the registry owns its consumer.
    fn create(&self, account_id: &AccountId)
    -> (Arc<dyn TransportClient>, mpsc::Receiver<SessionEvent>);
}
