//! High-level `Store` facade.
//!
//! Composes the repositories behind a connection pool. Writes are
//! serialized through an in-process lock and retried on `SQLITE_BUSY`;
//! reads go straight to the pool. Callers never hold a connection across
//! an await point — every method checks one out, runs, and returns it.

use std::sync::Mutex;
use std::time::Duration;

use courier_core::account::Account;
use courier_core::ids::{AccountId, WebhookId};
use courier_core::webhook::{DeliveryRecord, Webhook};
use tracing::{debug, instrument};

use crate::connection::{ConnectionPool, PooledConnection};
use crate::errors::{Result, StoreError};
use crate::repositories::account::{AccountRepo, SessionStateUpdate};
use crate::repositories::delivery_log::{DeliveryLogRepo, DeliveryLogRow};
use crate::repositories::webhook::{WebhookRepo, WebhookUpdate};

/// Durable persistence for accounts, webhooks, and delivery logs.
///
/// INVARIANT: mutations are serialized by `write_lock`; `SQLite`'s own
/// locking is the backstop when other processes touch the file.
pub struct Store {
    pool: ConnectionPool,
    write_lock: Mutex<()>,
}

impl Store {
    const BUSY_MAX_RETRIES: u32 = 16;

    /// Wrap a connection pool.
    pub fn new(pool: ConnectionPool) -> Self {
        Self {
            pool,
            write_lock: Mutex::new(()),
        }
    }

    fn conn(&self) -> Result<PooledConnection> {
        Ok(self.pool.get()?)
    }

    fn with_write_lock<T>(&self, mut f: impl FnMut() -> Result<T>) -> Result<T> {
        let _guard = self
            .write_lock
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);

        let mut attempts = 0;
        loop {
            match f() {
                Ok(value) => return Ok(value),
                Err(err) if is_busy(&err) && attempts < Self::BUSY_MAX_RETRIES => {
                    attempts += 1;
                    let base_ms = u64::from(attempts).saturating_mul(10).min(250);
                    let jitter = rand::random::<u64>() % (base_ms / 2 + 1);
                    std::thread::sleep(Duration::from_millis(base_ms / 2 + jitter));
                }
                Err(err) => return Err(err),
            }
        }
    }

    // ─────────────────────────────────────────────────────────────────────
    // Accounts
    // ─────────────────────────────────────────────────────────────────────

    /// Persist a freshly created account.
    #[instrument(skip(self, account), fields(account_id = %account.id))]
    pub fn create_account(&self, account: &Account) -> Result<()> {
        self.with_write_lock(|| {
            let conn = self.conn()?;
            AccountRepo::insert(&conn, account)
        })
    }

    /// Fetch one account.
    pub fn get_account(&self, id: &AccountId) -> Result<Option<Account>> {
        let conn = self.conn()?;
        AccountRepo::get_by_id(&conn, id)
    }

    /// List all persisted accounts, oldest first.
    pub fn list_accounts(&self) -> Result<Vec<Account>> {
        let conn = self.conn()?;
        AccountRepo::list(&conn)
    }

    /// Mirror an in-memory session transition. Missing rows are tolerated:
    /// the account may have been deleted while the event was in flight.
    pub fn update_account_session(
        &self,
        id: &AccountId,
        update: &SessionStateUpdate<'_>,
    ) -> Result<bool> {
        self.with_write_lock(|| {
            let conn = self.conn()?;
            let updated = AccountRepo::update_session_state(&conn, id, update)?;
            if !updated {
                debug!(account_id = %id, "session state write matched no row");
            }
            Ok(updated)
        })
    }

    /// Delete an account row (webhooks cascade).
    #[instrument(skip(self), fields(account_id = %id))]
    pub fn delete_account(&self, id: &AccountId) -> Result<bool> {
        self.with_write_lock(|| {
            let conn = self.conn()?;
            AccountRepo::delete(&conn, id)
        })
    }

    // ─────────────────────────────────────────────────────────────────────
    // Webhooks
    // ─────────────────────────────────────────────────────────────────────

    /// Persist a new webhook; the owning account must exist.
    pub fn create_webhook(&self, webhook: &Webhook) -> Result<()> {
        self.with_write_lock(|| {
            let conn = self.conn()?;
            if AccountRepo::get_by_id(&conn, &webhook.account_id)?.is_none() {
                return Err(StoreError::AccountNotFound(
                    webhook.account_id.as_str().to_string(),
                ));
            }
            WebhookRepo::insert(&conn, webhook)
        })
    }

    /// Fetch one webhook.
    pub fn get_webhook(&self, id: &WebhookId) -> Result<Option<Webhook>> {
        let conn = self.conn()?;
        WebhookRepo::get_by_id(&conn, id)
    }

    /// List an account's webhooks.
    pub fn list_webhooks(&self, account_id: &AccountId, active_only: bool) -> Result<Vec<Webhook>> {
        let conn = self.conn()?;
        WebhookRepo::list_by_account(&conn, account_id, active_only)
    }

    /// Apply a partial webhook update.
    pub fn update_webhook(&self, id: &WebhookId, update: &WebhookUpdate<'_>) -> Result<bool> {
        self.with_write_lock(|| {
            let conn = self.conn()?;
            WebhookRepo::update(&conn, id, update)
        })
    }

    /// Delete a webhook.
    pub fn delete_webhook(&self, id: &WebhookId) -> Result<bool> {
        self.with_write_lock(|| {
            let conn = self.conn()?;
            WebhookRepo::delete(&conn, id)
        })
    }

    /// Whether any active webhook of the account carries this secret.
    pub fn has_active_secret(&self, account_id: &AccountId, secret: &str) -> Result<bool> {
        let conn = self.conn()?;
        WebhookRepo::has_active_secret(&conn, account_id, secret)
    }

    // ─────────────────────────────────────────────────────────────────────
    // Delivery logs
    // ─────────────────────────────────────────────────────────────────────

    /// Append a batch of delivery records (schema-drift tolerant).
    pub fn insert_delivery_logs(&self, records: &[DeliveryRecord]) -> Result<()> {
        self.with_write_lock(|| {
            let conn = self.conn()?;
            DeliveryLogRepo::insert_batch(&conn, records)
        })
    }

    /// Most recent delivery rows for an account, newest first.
    pub fn recent_delivery_logs(
        &self,
        account_id: &AccountId,
        limit: i64,
    ) -> Result<Vec<DeliveryLogRow>> {
        let conn = self.conn()?;
        DeliveryLogRepo::list_recent(&conn, account_id, limit)
    }
}

fn is_busy(err: &StoreError) -> bool {
    match err {
        StoreError::Sqlite(rusqlite::Error::SqliteFailure(code, _)) => matches!(
            code.code,
            rusqlite::ErrorCode::DatabaseBusy | rusqlite::ErrorCode::DatabaseLocked
        ),
        _ => false,
    }
}
