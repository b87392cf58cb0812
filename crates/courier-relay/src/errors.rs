//! Gateway error taxonomy.
//!
//! Send-path errors surface synchronously to the caller; lifecycle errors
//! are absorbed into account state; webhook delivery failures become
//! delivery records and never leave the dispatcher.

use courier_core::account::AccountStatus;
use courier_store::StoreError;

/// Errors surfaced by registry and queue operations.
#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    /// No live session handle (or persisted row) for the account id.
    #[error("account not found: {0}")]
    AccountNotFound(String),

    /// The session exists but is not in `ready` state.
    #[error("account {account_id} is not ready (status: {status})")]
    NotReady {
        /// Account id.
        account_id: String,
        /// Observed status.
        status: AccountStatus,
    },

    /// The transport handle reports a closed/unusable session.
    #[error("session unavailable for account {0}")]
    SessionUnavailable(String),

    /// The account's send queue is at its admission cap.
    #[error("send queue full for account {account_id} (cap {cap})")]
    QueueFull {
        /// Account id.
        account_id: String,
        /// Configured cap.
        cap: usize,
    },

    /// Payload shape/size violation, rejected before admission.
    #[error("invalid media: {0}")]
    InvalidMedia(String),

    /// The transport's send call failed.
    #[error("transport send failed: {0}")]
    Transport(String),

    /// A non-batched store operation failed.
    #[error("persistence unavailable: {0}")]
    Persistence(#[from] StoreError),
}

impl GatewayError {
    /// Short label for logs and metrics.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::AccountNotFound(_) => "account_not_found",
            Self::NotReady { .. } => "not_ready",
            Self::SessionUnavailable(_) => "session_unavailable",
            Self::QueueFull { .. } => "queue_full",
            Self::InvalidMedia(_) => "invalid_media",
            Self::Transport(_) => "transport",
            Self::Persistence(_) => "persistence",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_mentions_account() {
        let err = GatewayError::NotReady {
            account_id: "acct_1".into(),
            status: AccountStatus::QrReady,
        };
        let text = err.to_string();
        assert!(text.contains("acct_1"));
        assert!(text.contains("qr_ready"));
    }

    #[test]
    fn store_errors_convert() {
        let err: GatewayError = StoreError::Internal("boom".into()).into();
        assert_eq!(err.kind(), "persistence");
    }
}
