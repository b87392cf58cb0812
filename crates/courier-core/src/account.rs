//! Account model and the session lifecycle state machine.
//!
//! A session moves `initializing → qr_ready → ready`. The error branches
//! `auth_failed` and `disconnected` are reachable from any non-terminal
//! state, and a `disconnected` account re-enters `initializing` when it is
//! reconnected. Transition validity is centralized in
//! [`AccountStatus::can_transition_to`] so the registry and the store agree
//! on what a legal move is.

use serde::{Deserialize, Serialize};

use crate::ids::AccountId;

/// Lifecycle state of an account's messaging session.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AccountStatus {
    /// Transport client created, connection in progress.
    #[default]
    Initializing,
    /// A pairing QR code has been issued and awaits scanning.
    QrReady,
    /// Session is live; outbound sends are admitted.
    Ready,
    /// The transport rejected the stored credentials.
    AuthFailed,
    /// The session dropped; reconnect re-enters `Initializing`.
    Disconnected,
}

impl AccountStatus {
    /// SQL/wire string form.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Initializing => "initializing",
            Self::QrReady => "qr_ready",
            Self::Ready => "ready",
            Self::AuthFailed => "auth_failed",
            Self::Disconnected => "disconnected",
        }
    }

    /// Parse the SQL/wire string form.
    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "initializing" => Some(Self::Initializing),
            "qr_ready" => Some(Self::QrReady),
            "ready" => Some(Self::Ready),
            "auth_failed" => Some(Self::AuthFailed),
            "disconnected" => Some(Self::Disconnected),
            _ => None,
        }
    }

    /// Error branch states. `Disconnected` is recoverable via reconnect;
    /// `AuthFailed` requires re-pairing.
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::AuthFailed | Self::Disconnected)
    }

    /// Whether a transition to `next` is a legal move in the lifecycle
    /// graph. Self-transitions are legal everywhere: the transport delivers
    /// events at-least-once and duplicates must be absorbed, not rejected.
    pub fn can_transition_to(self, next: Self) -> bool {
        if self == next {
            return true;
        }
        match next {
            // Error branches are reachable from any non-terminal state.
            Self::AuthFailed | Self::Disconnected => !self.is_terminal(),
            // Reconnect path.
            Self::Initializing => self == Self::Disconnected,
            Self::QrReady => self == Self::Initializing,
            // Saved credentials skip the QR phase entirely.
            Self::Ready => matches!(self, Self::Initializing | Self::QrReady),
        }
    }
}

impl std::fmt::Display for AccountStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A messaging account: one external session plus its metadata.
///
/// The in-memory copy inside the registry is authoritative; the persisted
/// row trails it by one write per lifecycle event.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Account {
    /// Account id (`acct_…`).
    pub id: AccountId,
    /// Human-readable name.
    pub name: String,
    /// Optional free-form description.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Current session state.
    pub status: AccountStatus,
    /// Canonical routing number, captured when the session reaches `ready`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub phone_number: Option<String>,
    /// Pairing QR payload. Single-use: cleared once the session is `ready`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub qr_payload: Option<String>,
    /// Last lifecycle error, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    /// RFC 3339 creation timestamp.
    pub created_at: String,
    /// RFC 3339 last-update timestamp.
    pub updated_at: String,
}

impl Account {
    /// Build a fresh account in `Initializing` state.
    pub fn new(name: impl Into<String>, description: Option<String>) -> Self {
        let now = chrono::Utc::now().to_rfc3339();
        Self {
            id: AccountId::generate(),
            name: name.into(),
            description,
            status: AccountStatus::Initializing,
            phone_number: None,
            qr_payload: None,
            error_message: None,
            created_at: now.clone(),
            updated_at: now,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_round_trips_through_str() {
        for status in [
            AccountStatus::Initializing,
            AccountStatus::QrReady,
            AccountStatus::Ready,
            AccountStatus::AuthFailed,
            AccountStatus::Disconnected,
        ] {
            assert_eq!(AccountStatus::parse(status.as_str()), Some(status));
        }
        assert_eq!(AccountStatus::parse("bogus"), None);
    }

    #[test]
    fn happy_path_transitions_are_legal() {
        use AccountStatus::{Initializing, QrReady, Ready};
        assert!(Initializing.can_transition_to(QrReady));
        assert!(QrReady.can_transition_to(Ready));
        // Saved credentials: ready without a QR phase.
        assert!(Initializing.can_transition_to(Ready));
    }

    #[test]
    fn duplicate_events_are_self_transitions() {
        use AccountStatus::Ready;
        assert!(Ready.can_transition_to(Ready));
    }

    #[test]
    fn error_branches_reachable_from_non_terminal_only() {
        use AccountStatus::{AuthFailed, Disconnected, Initializing, QrReady, Ready};
        for from in [Initializing, QrReady, Ready] {
            assert!(from.can_transition_to(AuthFailed));
            assert!(from.can_transition_to(Disconnected));
        }
        assert!(!AuthFailed.can_transition_to(Disconnected));
        assert!(!Disconnected.can_transition_to(AuthFailed));
    }

    #[test]
    fn reconnect_reenters_initializing_from_disconnected_only() {
        use AccountStatus::{AuthFailed, Disconnected, Initializing, QrReady, Ready};
        assert!(Disconnected.can_transition_to(Initializing));
        assert!(!Ready.can_transition_to(Initializing));
        assert!(!QrReady.can_transition_to(Initializing));
        assert!(!AuthFailed.can_transition_to(Initializing));
    }

    #[test]
    fn backwards_moves_are_rejected() {
        use AccountStatus::{QrReady, Ready};
        assert!(!Ready.can_transition_to(QrReady));
    }

    #[test]
    fn new_account_starts_initializing() {
        let account = Account::new("support", None);
        assert_eq!(account.status, AccountStatus::Initializing);
        assert!(account.qr_payload.is_none());
        assert!(account.phone_number.is_none());
        assert!(account.id.as_str().starts_with("acct_"));
    }

    #[test]
    fn account_serializes_camel_case() {
        let account = Account::new("support", Some("front desk".into()));
        let json = serde_json::to_value(&account).unwrap();
        assert_eq!(json["status"], "initializing");
        assert!(json.get("createdAt").is_some());
        assert!(json.get("qrPayload").is_none(), "None fields are omitted");
    }
}
