//! Time-bounded webhook caches with eager invalidation.
//!
//! Two sibling read-through caches share one invalidation discipline:
//!
//! - **Secret validation** keyed by `(account, presented secret)`, holding
//!   positive AND negative verdicts. Part of the key is attacker-supplied,
//!   so passive expiry alone is not enough — the daemon additionally runs
//!   [`WebhookCache::clear_secrets`] on a coarse hourly timer to bound
//!   growth from invalid guesses.
//! - **Active webhook lists** keyed by account, consumed by the
//!   dispatcher on every fan-out.
//!
//! Any webhook mutation (create/update/delete) and any account deletion
//! must call [`WebhookCache::invalidate_account`]: a just-deleted
//! webhook's secret has to stop validating immediately, not after the
//! TTL runs out.

use std::sync::Arc;
use std::time::{Duration, Instant};

use courier_core::ids::AccountId;
use courier_core::webhook::Webhook;
use courier_store::{Store, StoreError};
use dashmap::DashMap;
use metrics::counter;
use tracing::debug;

/// Default entry TTL (both caches).
pub const DEFAULT_TTL: Duration = Duration::from_secs(5 * 60);

struct ListEntry {
    webhooks: Arc<Vec<Webhook>>,
    expires_at: Instant,
}

struct SecretEntry {
    valid: bool,
    expires_at: Instant,
}

/// Read-through caches over the webhook table.
pub struct WebhookCache {
    store: Arc<Store>,
    ttl: Duration,
    lists: DashMap<AccountId, ListEntry>,
    secrets: DashMap<(AccountId, String), SecretEntry>,
}

impl WebhookCache {
    /// Cache with the default 5-minute TTL.
    pub fn new(store: Arc<Store>) -> Self {
        Self::with_ttl(store, DEFAULT_TTL)
    }

    /// Cache with an explicit TTL (tests use a short one).
    pub fn with_ttl(store: Arc<Store>, ttl: Duration) -> Self {
        Self {
            store,
            ttl,
            lists: DashMap::new(),
            secrets: DashMap::new(),
        }
    }

    /// Active webhooks for an account, cached.
    pub fn active_webhooks(&self, account_id: &AccountId) -> Result<Arc<Vec<Webhook>>, StoreError> {
        if let Some(entry) = self.lists.get(account_id) {
            if entry.expires_at > Instant::now() {
                counter!("webhook_list_cache_hits_total").increment(1);
                return Ok(Arc::clone(&entry.webhooks));
            }
        }
        counter!("webhook_list_cache_misses_total").increment(1);

        let webhooks = Arc::new(self.store.list_webhooks(account_id, true)?);
        let _ = self.lists.insert(
            account_id.clone(),
            ListEntry {
                webhooks: Arc::clone(&webhooks),
                expires_at: Instant::now() + self.ttl,
            },
        );
        Ok(webhooks)
    }

    /// Validate a presented secret against the account's active webhooks.
    /// Both verdicts are cached for the TTL.
    pub fn validate_secret(
        &self,
        account_id: &AccountId,
        secret: &str,
    ) -> Result<bool, StoreError> {
        let key = (account_id.clone(), secret.to_string());
        if let Some(entry) = self.secrets.get(&key) {
            if entry.expires_at > Instant::now() {
                counter!("webhook_secret_cache_hits_total").increment(1);
                return Ok(entry.valid);
            }
        }
        counter!("webhook_secret_cache_misses_total").increment(1);

        let valid = self.store.has_active_secret(account_id, secret)?;
        let _ = self.secrets.insert(
            key,
            SecretEntry {
                valid,
                expires_at: Instant::now() + self.ttl,
            },
        );
        Ok(valid)
    }

    /// Drop every cached entry scoped to the account. Called synchronously
    /// from each webhook mutation and from account deletion.
    pub fn invalidate_account(&self, account_id: &AccountId) {
        let _ = self.lists.remove(account_id);
        self.secrets.retain(|(id, _), _| id != account_id);
        debug!(account_id = %account_id, "webhook caches invalidated");
    }

    /// Coarse full clear of the secret cache (hourly defense against
    /// unbounded growth from invalid guesses).
    pub fn clear_secrets(&self) {
        let dropped = self.secrets.len();
        self.secrets.clear();
        debug!(dropped, "secret cache cleared");
    }

    /// Cached secret entries (tests/metrics).
    pub fn secret_entries(&self) -> usize {
        self.secrets.len()
    }

    /// Cached list entries (tests/metrics).
    pub fn list_entries(&self) -> usize {
        self.lists.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use courier_core::account::Account;
    use courier_store::connection::{ConnectionConfig, new_in_memory};
    use courier_store::migrations::run_migrations;

    fn setup() -> (Arc<Store>, Account) {
        let pool = new_in_memory(&ConnectionConfig::default()).unwrap();
        {
            let conn = pool.get().unwrap();
            run_migrations(&conn).unwrap();
        }
        let store = Arc::new(Store::new(pool));
        let account = Account::new("a", None);
        store.create_account(&account).unwrap();
        (store, account)
    }

    #[test]
    fn secret_verdicts_are_cached() {
        let (store, account) = setup();
        let webhook = Webhook::new(account.id.clone(), "https://x.example/hook", Some("s3cret".into()));
        store.create_webhook(&webhook).unwrap();

        let cache = WebhookCache::new(Arc::clone(&store));
        assert!(cache.validate_secret(&account.id, "s3cret").unwrap());
        assert!(!cache.validate_secret(&account.id, "guess").unwrap());
        // Both verdicts cached.
        assert_eq!(cache.secret_entries(), 2);
    }

    #[test]
    fn deleting_webhook_invalidates_cached_secret_immediately() {
        let (store, account) = setup();
        let webhook = Webhook::new(account.id.clone(), "https://x.example/hook", Some("s3cret".into()));
        store.create_webhook(&webhook).unwrap();

        let cache = WebhookCache::new(Arc::clone(&store));
        assert!(cache.validate_secret(&account.id, "s3cret").unwrap());

        let _ = store.delete_webhook(&webhook.id).unwrap();
        cache.invalidate_account(&account.id);

        // The same secret must fail right away, not after TTL expiry.
        assert!(!cache.validate_secret(&account.id, "s3cret").unwrap());
    }

    #[test]
    fn stale_cache_without_invalidation_would_still_validate() {
        // Documents why eager invalidation is required: the TTL alone keeps
        // serving the stale verdict.
        let (store, account) = setup();
        let webhook = Webhook::new(account.id.clone(), "https://x.example/hook", Some("s3cret".into()));
        store.create_webhook(&webhook).unwrap();

        let cache = WebhookCache::new(Arc::clone(&store));
        assert!(cache.validate_secret(&account.id, "s3cret").unwrap());
        let _ = store.delete_webhook(&webhook.id).unwrap();
        assert!(cache.validate_secret(&account.id, "s3cret").unwrap());
    }

    #[test]
    fn expired_entries_refetch() {
        let (store, account) = setup();
        let webhook = Webhook::new(account.id.clone(), "https://x.example/hook", Some("s3cret".into()));
        store.create_webhook(&webhook).unwrap();

        let cache = WebhookCache::with_ttl(Arc::clone(&store), Duration::from_millis(0));
        assert!(cache.validate_secret(&account.id, "s3cret").unwrap());
        let _ = store.delete_webhook(&webhook.id).unwrap();
        // TTL zero: next read goes through to the store.
        assert!(!cache.validate_secret(&account.id, "s3cret").unwrap());
    }

    #[test]
    fn list_cache_reads_through_and_invalidates() {
        let (store, account) = setup();
        let cache = WebhookCache::new(Arc::clone(&store));
        assert!(cache.active_webhooks(&account.id).unwrap().is_empty());

        let webhook = Webhook::new(account.id.clone(), "https://x.example/hook", None);
        store.create_webhook(&webhook).unwrap();
        // Cached empty list until invalidated.
        assert!(cache.active_webhooks(&account.id).unwrap().is_empty());
        cache.invalidate_account(&account.id);
        assert_eq!(cache.active_webhooks(&account.id).unwrap().len(), 1);
    }

    #[test]
    fn clear_secrets_leaves_lists_alone() {
        let (store, account) = setup();
        let cache = WebhookCache::new(Arc::clone(&store));
        let _ = cache.active_webhooks(&account.id).unwrap();
        let _ = cache.validate_secret(&account.id, "anything").unwrap();
        assert_eq!(cache.secret_entries(), 1);
        assert_eq!(cache.list_entries(), 1);

        cache.clear_secrets();
        assert_eq!(cache.secret_entries(), 0);
        assert_eq!(cache.list_entries(), 1);
    }

    #[test]
    fn invalidation_is_scoped_to_one_account() {
        let (store, account) = setup();
        let other = Account::new("b", None);
        store.create_account(&other).unwrap();

        let cache = WebhookCache::new(Arc::clone(&store));
        let _ = cache.validate_secret(&account.id, "x").unwrap();
        let _ = cache.validate_secret(&other.id, "y").unwrap();

        cache.invalidate_account(&account.id);
        assert_eq!(cache.secret_entries(), 1, "other account's entry survives");
    }
}
