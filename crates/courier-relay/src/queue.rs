//! Per-account bounded send admission.
//!
//! The queue exists to bound concurrency, not to buffer or retry: an
//! admitted item lives exactly as long as its send attempt. Admission
//! checks run in a fixed order — payload shape, session state, depth cap,
//! transport usability — and every rejection happens before the transport
//! is invoked. Actual sends are serialized per account because one
//! session cannot multiplex writes.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use courier_core::account::AccountStatus;
use courier_core::ids::AccountId;
use courier_core::normalize::PhoneNumberNormalizer;
use courier_core::webhook::{DeliveryDirection, DeliveryRecord};
use dashmap::DashMap;
use metrics::counter;
use tracing::debug;

use crate::batcher::LogBatcher;
use crate::errors::GatewayError;
use crate::registry::AccountEntry;
use crate::transport::OutboundPayload;

/// Default per-account admission cap.
pub const DEFAULT_MAX_DEPTH: usize = 20;

/// Largest accepted message body, bytes.
const MAX_BODY_BYTES: usize = 64 * 1024;

/// Per-account lane: depth counter plus the send serialization lock.
struct Lane {
    depth: AtomicUsize,
    send_lock: tokio::sync::Mutex<()>,
}

/// Releases the admitted slot when the attempt completes, success or not.
struct DepthGuard {
    lane: Arc<Lane>,
}

impl DepthGuard {
    fn try_admit(lane: &Arc<Lane>, cap: usize) -> Option<Self> {
        lane.depth
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |depth| {
                (depth < cap).then_some(depth + 1)
            })
            .ok()
            .map(|_| Self {
                lane: Arc::clone(lane),
            })
    }
}

impl Drop for DepthGuard {
    fn drop(&mut self) {
        let _ = self.lane.depth.fetch_sub(1, Ordering::SeqCst);
    }
}

/// Bounded admission gate in front of each account's transport.
pub struct OutboundQueue {
    lanes: DashMap<AccountId, Arc<Lane>>,
    cap: usize,
    normalizer: Arc<PhoneNumberNormalizer>,
    batcher: Arc<LogBatcher>,
}

impl OutboundQueue {
    /// Queue with an explicit cap.
    pub fn new(cap: usize, normalizer: Arc<PhoneNumberNormalizer>, batcher: Arc<LogBatcher>) -> Self {
        Self {
            lanes: DashMap::new(),
            cap: cap.max(1),
            normalizer,
            batcher,
        }
    }

    /// Admit and perform one send. Returns the canonical destination on
    /// success; every failure is surfaced synchronously to the caller.
    ///
    /// Rejections (`NotReady`, `QueueFull`, `SessionUnavailable`,
    /// `InvalidMedia`) never touch the transport. A transport failure is
    /// surfaced AND recorded as a failed outgoing delivery.
    pub async fn enqueue(
        &self,
        entry: &AccountEntry,
        destination: &str,
        payload: OutboundPayload,
    ) -> Result<String, GatewayError> {
        validate_payload(&payload).inspect_err(|_| self.reject("invalid_media"))?;

        let status = entry.status();
        if status != AccountStatus::Ready {
            self.reject("not_ready");
            return Err(GatewayError::NotReady {
                account_id: entry.id().as_str().to_string(),
                status,
            });
        }

        let lane = self.lane(entry.id());
        let Some(_slot) = DepthGuard::try_admit(&lane, self.cap) else {
            self.reject("queue_full");
            return Err(GatewayError::QueueFull {
                account_id: entry.id().as_str().to_string(),
                cap: self.cap,
            });
        };

        if !entry.client().is_usable() {
            self.reject("session_unavailable");
            return Err(GatewayError::SessionUnavailable(
                entry.id().as_str().to_string(),
            ));
        }

        let canonical = self.normalizer.normalize(destination);
        debug!(account_id = %entry.id(), destination = %canonical, "send admitted");

        let _send = lane.send_lock.lock().await;
        // The session may have broken while this item waited its turn.
        if !entry.client().is_usable() {
            self.reject("session_unavailable");
            return Err(GatewayError::SessionUnavailable(
                entry.id().as_str().to_string(),
            ));
        }

        match entry.client().send(&canonical, &payload).await {
            Ok(()) => {
                counter!("outbound_sends_total", "result" => "ok").increment(1);
                self.batcher.record(
                    DeliveryRecord::success(
                        entry.id().clone(),
                        DeliveryDirection::Outgoing,
                        Some(canonical.clone()),
                        Some(payload.body.clone()),
                    )
                    .with_media_url(payload.media_url.clone()),
                );
                Ok(canonical)
            }
            Err(err) => {
                counter!("outbound_sends_total", "result" => "error").increment(1);
                self.batcher.record(
                    DeliveryRecord::failure(
                        entry.id().clone(),
                        DeliveryDirection::Outgoing,
                        Some(canonical),
                        Some(payload.body.clone()),
                        err.to_string(),
                    )
                    .with_media_url(payload.media_url.clone()),
                );
                Err(GatewayError::Transport(err.to_string()))
            }
        }
    }

    /// Current queue depth for an account.
    pub fn depth(&self, account_id: &AccountId) -> usize {
        self.lanes
            .get(account_id)
            .map_or(0, |lane| lane.depth.load(Ordering::SeqCst))
    }

    /// Drop the lane of a deleted account.
    pub fn remove_account(&self, account_id: &AccountId) {
        let _ = self.lanes.remove(account_id);
    }

    fn lane(&self, account_id: &AccountId) -> Arc<Lane> {
        self.lanes
            .entry(account_id.clone())
            .or_insert_with(|| {
                Arc::new(Lane {
                    depth: AtomicUsize::new(0),
                    send_lock: tokio::sync::Mutex::new(()),
                })
            })
            .clone()
    }

    fn reject(&self, reason: &'static str) {
        counter!("outbound_rejections_total", "reason" => reason).increment(1);
    }
}

/// Shape/size validation, rejected as `InvalidMedia` before admission.
fn validate_payload(payload: &OutboundPayload) -> Result<(), GatewayError> {
    if payload.body.is_empty() && payload.media_url.is_none() {
        return Err(GatewayError::InvalidMedia(
            "message requires a body or a media url".into(),
        ));
    }
    if payload.body.len() > MAX_BODY_BYTES {
        return Err(GatewayError::InvalidMedia(format!(
            "body exceeds {MAX_BODY_BYTES} bytes"
        )));
    }
    if let Some(url) = &payload.media_url {
        if !(url.starts_with("http://") || url.starts_with("https://")) {
            return Err(GatewayError::InvalidMedia(
                "media url must be http(s)".into(),
            ));
        }
    }
    Ok(())
}
