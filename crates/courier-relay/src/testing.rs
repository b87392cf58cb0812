//! Test doubles for the transport seam.
//!
//! Used by this crate's unit tests, the integration tests, and downstream
//! crates exercising the registry without a real bridge.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use courier_core::events::SessionEvent;
use courier_core::ids::AccountId;
use dashmap::DashMap;
use parking_lot::Mutex;
use tokio::sync::Notify;
use tokio::sync::mpsc;

use crate::transport::{OutboundPayload, TransportClient, TransportError, TransportFactory};

/// Scripted in-memory transport. Sends are recorded; lifecycle events are
/// injected through the handle returned by [`FakeTransportFactory`].
pub struct FakeTransport {
    /// Destination/payload pairs seen by `send`, in order.
    sent: Mutex<Vec<(String, OutboundPayload)>>,
    send_calls: AtomicUsize,
    usable: AtomicBool,
    fail_sends: AtomicBool,
    destroyed: AtomicBool,
    fail_destroy: AtomicBool,
    /// When set, `send` parks until `release_sends` is called — lets tests
    /// hold queue depth at a chosen level.
    hold_sends: AtomicBool,
    release: Notify,
}

impl Default for FakeTransport {
    fn default() -> Self {
        Self {
            sent: Mutex::new(Vec::new()),
            send_calls: AtomicUsize::new(0),
            usable: AtomicBool::new(true),
            fail_sends: AtomicBool::new(false),
            destroyed: AtomicBool::new(false),
            fail_destroy: AtomicBool::new(false),
            hold_sends: AtomicBool::new(false),
            release: Notify::new(),
        }
    }
}

impl FakeTransport {
    /// Number of times `send` was invoked (including failed sends).
    pub fn send_calls(&self) -> usize {
        self.send_calls.load(Ordering::SeqCst)
    }

    /// Recorded successful/attempted sends.
    pub fn sent(&self) -> Vec<(String, OutboundPayload)> {
        self.sent.lock().clone()
    }

    /// Mark the handle unusable (simulates a closed page/session).
    pub fn set_usable(&self, usable: bool) {
        self.usable.store(usable, Ordering::SeqCst);
    }

    /// Make subsequent sends fail.
    pub fn set_fail_sends(&self, fail: bool) {
        self.fail_sends.store(fail, Ordering::SeqCst);
    }

    /// Make `destroy` return an error.
    pub fn set_fail_destroy(&self, fail: bool) {
        self.fail_destroy.store(fail, Ordering::SeqCst);
    }

    /// Park future sends until [`Self::release_sends`].
    pub fn hold_sends(&self) {
        self.hold_sends.store(true, Ordering::SeqCst);
    }

    /// Release all parked sends.
    pub fn release_sends(&self) {
        self.hold_sends.store(false, Ordering::SeqCst);
        self.release.notify_waiters();
    }

    /// Whether `destroy` was called.
    pub fn destroyed(&self) -> bool {
        self.destroyed.load(Ordering::SeqCst)
    }
}

#[async_trait::async_trait]
impl TransportClient for FakeTransport {
    async fn connect(&self) -> Result<(), TransportError> {
        Ok(())
    }

    async fn send(
        &self,
        destination: &str,
        payload: &OutboundPayload,
    ) -> Result<(), TransportError> {
        let _ = self.send_calls.fetch_add(1, Ordering::SeqCst);
        loop {
            if !self.hold_sends.load(Ordering::SeqCst) {
                break;
            }
            let notified = self.release.notified();
            // Re-check after registering; release may have landed between
            // the load and the registration.
            if !self.hold_sends.load(Ordering::SeqCst) {
                break;
            }
            notified.await;
        }
        if self.fail_sends.load(Ordering::SeqCst) {
            return Err(TransportError::Send("scripted failure".into()));
        }
        self.sent
            .lock()
            .push((destination.to_string(), payload.clone()));
        Ok(())
    }

    async fn destroy(&self) -> Result<(), TransportError> {
        self.destroyed.store(true, Ordering::SeqCst);
        self.usable.store(false, Ordering::SeqCst);
        if self.fail_destroy.load(Ordering::SeqCst) {
            return Err(TransportError::Closed);
        }
        Ok(())
    }

    fn is_usable(&self) -> bool {
        self.usable.load(Ordering::SeqCst)
    }
}

/// Factory that hands out [`FakeTransport`]s and keeps the event senders
/// so tests can inject lifecycle events per account.
#[derive(Default)]
pub struct FakeTransportFactory {
    clients: DashMap<AccountId, Arc<FakeTransport>>,
    senders: DashMap<AccountId, mpsc::Sender<SessionEvent>>,
}

impl FakeTransportFactory {
    /// New empty factory.
    pub fn new() -> Self {
        Self::default()
    }

    /// The fake client created for an account.
    pub fn client(&self, account_id: &AccountId) -> Option<Arc<FakeTransport>> {
        self.clients.get(account_id).map(|c| Arc::clone(&c))
    }

    /// Inject a session event for an account. Panics if the session was
    /// never created — that is a test bug.
    pub async fn emit(&self, account_id: &AccountId, event: SessionEvent) {
        let sender = self
            .senders
            .get(account_id)
            .map(|s| s.clone())
            .expect("no session for account");
        sender.send(event).await.expect("event channel closed");
    }
}

impl TransportFactory for FakeTransportFactory {
    fn create(
        &self,
        account_id: &AccountId,
    ) -> (Arc<dyn TransportClient>, mpsc::Receiver<SessionEvent>) {
        let (tx, rx) = mpsc::channel(64);
        let client = Arc::new(FakeTransport::default());
        let _ = self.clients.insert(account_id.clone(), Arc::clone(&client));
        let _ = self.senders.insert(account_id.clone(), tx);
        (client, rx)
    }
}
