//! Webhook table queries.

use courier_core::ids::{AccountId, WebhookId};
use courier_core::webhook::Webhook;
use rusqlite::{Connection, OptionalExtension, Row, params};

use crate::errors::Result;

/// Partial update for a webhook row.
#[derive(Debug, Default)]
pub struct WebhookUpdate<'a> {
    /// Replace the target URL.
    pub url: Option<&'a str>,
    /// Replace the secret (`Some(None)` clears it).
    pub secret: Option<Option<&'a str>>,
    /// Enable/disable delivery.
    pub is_active: Option<bool>,
}

/// Queries over the `webhooks` table.
pub struct WebhookRepo;

impl WebhookRepo {
    /// Insert a new webhook subscription.
    pub fn insert(conn: &Connection, webhook: &Webhook) -> Result<()> {
        let _ = conn.execute(
            "INSERT INTO webhooks (id, account_id, url, secret, is_active, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                webhook.id.as_str(),
                webhook.account_id.as_str(),
                webhook.url,
                webhook.secret,
                webhook.is_active,
                webhook.created_at,
                webhook.updated_at,
            ],
        )?;
        Ok(())
    }

    /// Fetch one webhook by id.
    pub fn get_by_id(conn: &Connection, id: &WebhookId) -> Result<Option<Webhook>> {
        let webhook = conn
            .query_row(
                "SELECT id, account_id, url, secret, is_active, created_at, updated_at
                 FROM webhooks WHERE id = ?1",
                params![id.as_str()],
                map_webhook,
            )
            .optional()?;
        Ok(webhook)
    }

    /// List an account's webhooks, optionally only the active ones.
    pub fn list_by_account(
        conn: &Connection,
        account_id: &AccountId,
        active_only: bool,
    ) -> Result<Vec<Webhook>> {
        let sql = if active_only {
            "SELECT id, account_id, url, secret, is_active, created_at, updated_at
             FROM webhooks WHERE account_id = ?1 AND is_active = 1 ORDER BY created_at ASC"
        } else {
            "SELECT id, account_id, url, secret, is_active, created_at, updated_at
             FROM webhooks WHERE account_id = ?1 ORDER BY created_at ASC"
        };
        let mut stmt = conn.prepare(sql)?;
        let rows = stmt.query_map(params![account_id.as_str()], map_webhook)?;
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }

    /// Apply a partial update. Returns `false` when no row matched.
    pub fn update(conn: &Connection, id: &WebhookId, update: &WebhookUpdate<'_>) -> Result<bool> {
        let existing = match Self::get_by_id(conn, id)? {
            Some(w) => w,
            None => return Ok(false),
        };
        let url = update.url.unwrap_or(existing.url.as_str());
        let secret = match update.secret {
            Some(new) => new.map(str::to_string),
            None => existing.secret.clone(),
        };
        let is_active = update.is_active.unwrap_or(existing.is_active);
        let now = chrono::Utc::now().to_rfc3339();
        let changed = conn.execute(
            "UPDATE webhooks SET url = ?1, secret = ?2, is_active = ?3, updated_at = ?4 WHERE id = ?5",
            params![url, secret, is_active, now, id.as_str()],
        )?;
        Ok(changed > 0)
    }

    /// Delete a webhook. Returns `false` when no row matched.
    pub fn delete(conn: &Connection, id: &WebhookId) -> Result<bool> {
        let changed = conn.execute("DELETE FROM webhooks WHERE id = ?1", params![id.as_str()])?;
        Ok(changed > 0)
    }

    /// Whether any active webhook of the account carries this exact secret.
    /// Backs the secret-validation cache.
    pub fn has_active_secret(
        conn: &Connection,
        account_id: &AccountId,
        secret: &str,
    ) -> Result<bool> {
        let exists: i64 = conn.query_row(
            "SELECT EXISTS(
                 SELECT 1 FROM webhooks
                 WHERE account_id = ?1 AND is_active = 1 AND secret = ?2
             )",
            params![account_id.as_str(), secret],
            |row| row.get(0),
        )?;
        Ok(exists == 1)
    }
}

fn map_webhook(row: &Row<'_>) -> rusqlite::Result<Webhook> {
    Ok(Webhook {
        id: WebhookId::from_string(row.get::<_, String>(0)?),
        account_id: AccountId::from_string(row.get::<_, String>(1)?),
        url: row.get(2)?,
        secret: row.get(3)?,
        is_active: row.get(4)?,
        created_at: row.get(5)?,
        updated_at: row.get(6)?,
    })
}
