//! Transport session events.
//!
//! Each live session has exactly one event stream, delivered over an mpsc
//! channel from the transport client to the registry's per-account consumer
//! task. Channel order is the only ordering guarantee in the system, and it
//! is per-session: events from different accounts are unrelated.

use serde::{Deserialize, Serialize};

/// A message received by a session from the outside world.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InboundMessage {
    /// Sender routing address.
    pub from: String,
    /// Recipient routing address (the account's own number).
    pub to: String,
    /// Message body.
    pub body: String,
    /// Sender-side timestamp, Unix seconds.
    pub timestamp: i64,
    /// Transport message type (`chat`, `image`, `audio`, …).
    pub message_type: String,
    /// Conversation id.
    pub chat_id: String,
    /// Whether the conversation is a group chat.
    pub is_group: bool,
    /// Media URL for non-text messages, when the transport resolved one.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub media_url: Option<String>,
}

/// Lifecycle and traffic events emitted by a session's transport client.
///
/// Delivery is at-least-once: consumers must treat duplicates as no-ops.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SessionEvent {
    /// A pairing QR code was issued (may repeat as codes rotate).
    QrReceived {
        /// Encoded QR payload.
        payload: String,
    },
    /// The session is live.
    #[serde(rename_all = "camelCase")]
    Ready {
        /// The session's own routing address as resolved by the transport.
        resolved_address: String,
    },
    /// Credentials were accepted; `Ready` follows.
    Authenticated,
    /// The transport rejected the credentials.
    AuthFailure {
        /// Transport-supplied reason.
        reason: String,
    },
    /// The session dropped.
    Disconnected {
        /// Transport-supplied reason.
        reason: String,
    },
    /// An inbound message arrived.
    MessageReceived {
        /// The message.
        message: InboundMessage,
    },
}

impl SessionEvent {
    /// Short name used in logs and metrics labels.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::QrReceived { .. } => "qr_received",
            Self::Ready { .. } => "ready",
            Self::Authenticated => "authenticated",
            Self::AuthFailure { .. } => "auth_failure",
            Self::Disconnected { .. } => "disconnected",
            Self::MessageReceived { .. } => "message_received",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn message() -> InboundMessage {
        InboundMessage {
            from: "15551234@c.us".into(),
            to: "15559999@c.us".into(),
            body: "hello".into(),
            timestamp: 1_754_000_000,
            message_type: "chat".into(),
            chat_id: "15551234@c.us".into(),
            is_group: false,
            media_url: None,
        }
    }

    #[test]
    fn events_tag_by_type() {
        let json = serde_json::to_value(SessionEvent::QrReceived {
            payload: "QRDATA".into(),
        })
        .unwrap();
        assert_eq!(json["type"], "qr_received");
        assert_eq!(json["payload"], "QRDATA");
    }

    #[test]
    fn ready_carries_resolved_address() {
        let json = serde_json::to_value(SessionEvent::Ready {
            resolved_address: "15551234@c.us".into(),
        })
        .unwrap();
        assert_eq!(json["type"], "ready");
        assert_eq!(json["resolvedAddress"], "15551234@c.us");
    }

    #[test]
    fn message_round_trips() {
        let event = SessionEvent::MessageReceived { message: message() };
        let json = serde_json::to_string(&event).unwrap();
        let back: SessionEvent = serde_json::from_str(&json).unwrap();
        assert_eq!(back, event);
    }

    #[test]
    fn kind_matches_serde_tag() {
        let event = SessionEvent::AuthFailure {
            reason: "bad creds".into(),
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], event.kind());
    }
}
