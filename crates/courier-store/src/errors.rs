//! Store error types.

/// Convenience alias for store results.
pub type Result<T> = std::result::Result<T, StoreError>;

/// Errors surfaced by the persistence layer.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// Underlying `SQLite` error.
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// Connection pool exhausted or broken.
    #[error("connection pool error: {0}")]
    Pool(#[from] r2d2::Error),

    /// No account row with the given id.
    #[error("account not found: {0}")]
    AccountNotFound(String),

    /// No webhook row with the given id.
    #[error("webhook not found: {0}")]
    WebhookNotFound(String),

    /// Invariant violation inside the store itself.
    #[error("internal store error: {0}")]
    Internal(String),
}
