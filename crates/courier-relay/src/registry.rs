//! The account registry: lifecycle state machine and session supervision.
//!
//! One [`AccountEntry`] per live session, held in a `DashMap` so status
//! lookups on one account never contend with transitions on another. Each
//! session gets a single consumer task draining its transport event
//! channel — that task is the only writer of lifecycle state, which
//! preserves per-session event order without a global lock.
//!
//! INVARIANT: an account id maps to at most one entry; `create_account`
//! registers the entry and its event consumer BEFORE the transport starts
//! connecting, so no early event is lost. Once `delete_account` removes
//! the entry, every subsequent operation on the id fails fast with
//! `AccountNotFound` — in-flight work is left to finish or fail naturally.

use std::sync::Arc;

use courier_core::account::{Account, AccountStatus};
use courier_core::events::{InboundMessage, SessionEvent};
use courier_core::ids::AccountId;
use courier_core::webhook::{DeliveryDirection, DeliveryRecord};
use courier_store::Store;
use courier_store::repositories::account::SessionStateUpdate;
use dashmap::DashMap;
use metrics::gauge;
use parking_lot::{Mutex, RwLock};
use serde::Serialize;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::batcher::LogBatcher;
use crate::dispatcher::WebhookDispatcher;
use crate::errors::GatewayError;
use crate::transport::{TransportClient, TransportFactory};
use crate::webhook_cache::WebhookCache;

/// In-memory session fields, the authoritative copy.
#[derive(Debug, Default)]
struct SessionRuntime {
    status: AccountStatus,
    qr_payload: Option<String>,
    phone_number: Option<String>,
    error_message: Option<String>,
}

/// Read-only snapshot of an account's session fields.
#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionView {
    /// Current status.
    pub status: AccountStatus,
    /// QR payload, present only until the session authenticates.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub qr_payload: Option<String>,
    /// Routing number once `ready`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub phone_number: Option<String>,
    /// Last lifecycle error.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
}

/// One live session: transport handle plus lifecycle state.
pub struct AccountEntry {
    id: AccountId,
    client: Arc<dyn TransportClient>,
    runtime: RwLock<SessionRuntime>,
    event_task: Mutex<Option<JoinHandle<()>>>,
}

impl AccountEntry {
    fn new(id: AccountId, client: Arc<dyn TransportClient>) -> Self {
        Self {
            id,
            client,
            runtime: RwLock::new(SessionRuntime::default()),
            event_task: Mutex::new(None),
        }
    }

    /// The account id.
    pub fn id(&self) -> &AccountId {
        &self.id
    }

    /// Current lifecycle status.
    pub fn status(&self) -> AccountStatus {
        self.runtime.read().status
    }

    /// The QR payload, if one is currently valid.
    pub fn qr_payload(&self) -> Option<String> {
        self.runtime.read().qr_payload.clone()
    }

    /// Snapshot every session field at once.
    pub fn session_view(&self) -> SessionView {
        let runtime = self.runtime.read();
        SessionView {
            status: runtime.status,
            qr_payload: runtime.qr_payload.clone(),
            phone_number: runtime.phone_number.clone(),
            error_message: runtime.error_message.clone(),
        }
    }

    pub(crate) fn client(&self) -> &Arc<dyn TransportClient> {
        &self.client
    }
}

/// Everything the per-session event consumer needs besides the entry.
struct RegistryShared {
    store: Arc<Store>,
    dispatcher: Arc<WebhookDispatcher>,
    batcher: Arc<LogBatcher>,
    cache: Arc<WebhookCache>,
}

/// Concurrency-safe map of account id → live session.
pub struct AccountRegistry {
    accounts: DashMap<AccountId, Arc<AccountEntry>>,
    factory: Arc<dyn TransportFactory>,
    shared: Arc<RegistryShared>,
}

impl AccountRegistry {
    /// Build a registry over the given collaborators.
    pub fn new(
        store: Arc<Store>,
        factory: Arc<dyn TransportFactory>,
        dispatcher: Arc<WebhookDispatcher>,
        batcher: Arc<LogBatcher>,
        cache: Arc<WebhookCache>,
    ) -> Self {
        Self {
            accounts: DashMap::new(),
            factory,
            shared: Arc::new(RegistryShared {
                store,
                dispatcher,
                batcher,
                cache,
            }),
        }
    }

    /// Create an account and start its session.
    ///
    /// Returns as soon as the record is persisted — the caller observes
    /// `initializing` and learns about later states by polling or through
    /// lifecycle events. The connection continues in the background.
    pub async fn create_account(
        &self,
        name: &str,
        description: Option<String>,
    ) -> Result<Account, GatewayError> {
        let account = Account::new(name, description);
        self.shared.store.create_account(&account)?;
        let _entry = self.start_session(&account.id);
        info!(account_id = %account.id, name = %account.name, "account created");
        Ok(account)
    }

    /// Re-establish the session of a persisted account at process start.
    ///
    /// Never propagates: a failure transitions this account to
    /// `disconnected` so the loop over the remaining accounts continues.
    pub async fn reconnect(&self, account: &Account) {
        debug!(account_id = %account.id, "reconnecting persisted account");
        let entry = self.start_session(&account.id);
        // The fresh runtime starts at `initializing`; mirror that to the
        // store so a crash mid-connect is visible as such.
        let update = SessionStateUpdate {
            status: AccountStatus::Initializing,
            ..Default::default()
        };
        if let Err(err) = self.shared.store.update_account_session(&account.id, &update) {
            warn!(account_id = %account.id, error = %err, "failed to persist reconnect state");
            apply_session_event(
                &self.shared,
                &entry,
                SessionEvent::Disconnected {
                    reason: format!("reconnect bookkeeping failed: {err}"),
                },
            )
            .await;
        }
    }

    /// Reconnect every account the store knows about. One account's
    /// failure must not block the others; errors land in that account's
    /// state.
    pub async fn reconnect_all(&self) -> usize {
        let accounts = match self.shared.store.list_accounts() {
            Ok(accounts) => accounts,
            Err(err) => {
                warn!(error = %err, "failed to list accounts for reconnect");
                return 0;
            }
        };
        let total = accounts.len();
        for account in &accounts {
            self.reconnect(account).await;
        }
        info!(accounts = total, "startup reconnect finished");
        total
    }

    /// Apply a lifecycle event to a live account (transport callbacks,
    /// tests). Fails fast once the account is deleted.
    pub async fn handle_lifecycle_event(
        &self,
        account_id: &AccountId,
        event: SessionEvent,
    ) -> Result<(), GatewayError> {
        let entry = self.entry(account_id)?;
        apply_session_event(&self.shared, &entry, event).await;
        Ok(())
    }

    /// Tear an account down: transport destroy (best-effort), in-memory
    /// handle removal, persisted record deletion, cache invalidation.
    pub async fn delete_account(&self, account_id: &AccountId) -> Result<(), GatewayError> {
        let Some((_, entry)) = self.accounts.remove(account_id) else {
            // No live session. Still delete a persisted row if one exists
            // (e.g. the session never came up after a crash).
            if self.shared.store.delete_account(account_id)? {
                self.shared.cache.invalidate_account(account_id);
                return Ok(());
            }
            return Err(GatewayError::AccountNotFound(
                account_id.as_str().to_string(),
            ));
        };
        gauge!("accounts_active").decrement(1.0);

        if let Some(task) = entry.event_task.lock().take() {
            task.abort();
        }
        if let Err(err) = entry.client.destroy().await {
            warn!(account_id = %account_id, error = %err, "transport teardown failed");
        }

        let _ = self.shared.store.delete_account(account_id)?;
        self.shared.cache.invalidate_account(account_id);
        info!(account_id = %account_id, "account deleted");
        Ok(())
    }

    /// The live entry for an account.
    pub fn entry(&self, account_id: &AccountId) -> Result<Arc<AccountEntry>, GatewayError> {
        self.accounts
            .get(account_id)
            .map(|entry| Arc::clone(&entry))
            .ok_or_else(|| GatewayError::AccountNotFound(account_id.as_str().to_string()))
    }

    /// Session snapshot, if the account has a live session.
    pub fn session_view(&self, account_id: &AccountId) -> Option<SessionView> {
        self.accounts
            .get(account_id)
            .map(|entry| entry.session_view())
    }

    /// Number of live sessions.
    pub fn len(&self) -> usize {
        self.accounts.len()
    }

    /// Whether no sessions are live.
    pub fn is_empty(&self) -> bool {
        self.accounts.is_empty()
    }

    /// Register the entry + event consumer, then let the transport connect
    /// in the background. Replaces (and tears down) any previous session
    /// for the id.
    fn start_session(&self, account_id: &AccountId) -> Arc<AccountEntry> {
        let (client, mut events) = self.factory.create(account_id);
        let entry = Arc::new(AccountEntry::new(account_id.clone(), client));

        if let Some(previous) = self.accounts.insert(account_id.clone(), Arc::clone(&entry)) {
            debug!(account_id = %account_id, "replacing existing session handle");
            if let Some(task) = previous.event_task.lock().take() {
                task.abort();
            }
            let old_client = Arc::clone(previous.client());
            let _teardown = tokio::spawn(async move {
                let _ = old_client.destroy().await;
            });
        } else {
            gauge!("accounts_active").increment(1.0);
        }

        // Consumer first: events must have a home before connect begins.
        let consumer_shared = Arc::clone(&self.shared);
        let consumer_entry = Arc::clone(&entry);
        let task = tokio::spawn(async move {
            while let Some(event) = events.recv().await {
                apply_session_event(&consumer_shared, &consumer_entry, event).await;
            }
            debug!(account_id = %consumer_entry.id, "session event stream closed");
        });
        *entry.event_task.lock() = Some(task);

        let connect_shared = Arc::clone(&self.shared);
        let connect_entry = Arc::clone(&entry);
        let _connect = tokio::spawn(async move {
            if let Err(err) = connect_entry.client.connect().await {
                warn!(account_id = %connect_entry.id, error = %err, "transport connect failed");
                apply_session_event(
                    &connect_shared,
                    &connect_entry,
                    SessionEvent::Disconnected {
                        reason: err.to_string(),
                    },
                )
                .await;
            }
        });

        entry
    }
}

/// Apply one session event: state transition + persistence mirror, or
/// inbound-message relay. The single consumer task per session makes this
/// the only lifecycle writer for its account.
async fn apply_session_event(
    shared: &Arc<RegistryShared>,
    entry: &Arc<AccountEntry>,
    event: SessionEvent,
) {
    debug!(account_id = %entry.id, event = event.kind(), "session event");

    match event {
        SessionEvent::MessageReceived { message } => {
            relay_inbound(shared, entry, message);
            return;
        }
        SessionEvent::Authenticated => {
            // No state in the lifecycle graph for this; the QR is spent
            // once credentials are accepted, `ready` does the transition.
            entry.runtime.write().qr_payload = None;
            persist_runtime(shared, entry);
            return;
        }
        _ => {}
    }

    let next = match &event {
        SessionEvent::QrReceived { .. } => AccountStatus::QrReady,
        SessionEvent::Ready { .. } => AccountStatus::Ready,
        SessionEvent::AuthFailure { .. } => AccountStatus::AuthFailed,
        SessionEvent::Disconnected { .. } => AccountStatus::Disconnected,
        // Handled above.
        SessionEvent::Authenticated | SessionEvent::MessageReceived { .. } => unreachable!(),
    };

    let changed = {
        let mut runtime = entry.runtime.write();
        let current = runtime.status;
        if !current.can_transition_to(next) {
            warn!(
                account_id = %entry.id,
                from = %current,
                to = %next,
                "ignoring invalid lifecycle transition"
            );
            return;
        }

        let before = (
            runtime.status,
            runtime.qr_payload.clone(),
            runtime.phone_number.clone(),
            runtime.error_message.clone(),
        );

        runtime.status = next;
        match event {
            SessionEvent::QrReceived { payload } => {
                runtime.qr_payload = Some(payload);
                runtime.error_message = None;
            }
            SessionEvent::Ready { resolved_address } => {
                // QR codes are single-use: never serve one for a session
                // that reached `ready`.
                runtime.qr_payload = None;
                runtime.error_message = None;
                runtime.phone_number = Some(routing_number(&resolved_address));
            }
            SessionEvent::AuthFailure { reason } | SessionEvent::Disconnected { reason } => {
                runtime.qr_payload = None;
                runtime.error_message = Some(reason);
            }
            SessionEvent::Authenticated | SessionEvent::MessageReceived { .. } => unreachable!(),
        }

        before
            != (
                runtime.status,
                runtime.qr_payload.clone(),
                runtime.phone_number.clone(),
                runtime.error_message.clone(),
            )
    };

    // Duplicate events are a no-op beyond re-confirming state.
    if changed {
        persist_runtime(shared, entry);
    }
}

/// Mirror the runtime to the store. Lifecycle writes have no caller to
/// surface errors to; failures are logged and the in-memory state stays
/// authoritative.
fn persist_runtime(shared: &Arc<RegistryShared>, entry: &Arc<AccountEntry>) {
    let view = entry.session_view();
    let update = SessionStateUpdate {
        status: view.status,
        phone_number: view.phone_number.as_deref(),
        qr_payload: view.qr_payload.as_deref(),
        error_message: view.error_message.as_deref(),
    };
    match shared.store.update_account_session(&entry.id, &update) {
        Ok(true) => {}
        Ok(false) => debug!(account_id = %entry.id, "session write raced account deletion"),
        Err(err) => warn!(account_id = %entry.id, error = %err, "failed to persist session state"),
    }
}

/// Record an inbound message and fire the webhook fan-out without blocking
/// the event loop.
fn relay_inbound(shared: &Arc<RegistryShared>, entry: &Arc<AccountEntry>, message: InboundMessage) {
    shared.batcher.record(
        DeliveryRecord::success(
            entry.id.clone(),
            DeliveryDirection::Incoming,
            Some(message.to.clone()),
            Some(message.body.clone()),
        )
        .with_media_url(message.media_url.clone()),
    );

    let dispatcher = Arc::clone(&shared.dispatcher);
    let account_id = entry.id.clone();
    let _fan_out = tokio::spawn(async move {
        let _ = dispatcher.dispatch(&account_id, &message).await;
    });
}

/// `"15551234@c.us"` → `"15551234"`. Addresses without a suffix pass
/// through unchanged.
fn routing_number(resolved_address: &str) -> String {
    resolved_address
        .split_once('@')
        .map_or(resolved_address, |(number, _)| number)
        .to_string()
}
