//! Webhook fan-out.
//!
//! One inbound event goes to every active webhook of the account in
//! parallel. Each target gets its own policy: recognized low-latency
//! automation platforms receive a reduced payload under a short timeout,
//! everything else gets the full event under a longer one. A delivery
//! failure is local to its webhook — it is recorded, never retried, and
//! never surfaced to the caller; the aggregate call only waits until every
//! attempt has settled.

use std::sync::Arc;
use std::time::Duration;

use courier_core::events::InboundMessage;
use courier_core::ids::AccountId;
use courier_core::webhook::{DeliveryDirection, DeliveryRecord, Webhook};
use futures::future::join_all;
use metrics::counter;
use serde_json::json;
use tracing::{debug, warn};

use crate::batcher::LogBatcher;
use crate::webhook_cache::WebhookCache;

/// Classification of a delivery target.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TargetClass {
    /// A recognized low-latency automation platform: reduced payload,
    /// short timeout.
    Automation,
    /// Everything else: full payload, long timeout.
    Standard,
}

/// Per-target delivery policy.
#[derive(Clone, Debug)]
pub struct DispatchPolicy {
    /// Substring markers identifying automation platforms in target URLs.
    pub automation_markers: Vec<String>,
    /// Timeout for automation targets.
    pub automation_timeout: Duration,
    /// Timeout for standard targets.
    pub default_timeout: Duration,
}

impl Default for DispatchPolicy {
    fn default() -> Self {
        Self {
            automation_markers: ["n8n", "zapier", "make.com", "pipedream"]
                .map(String::from)
                .to_vec(),
            automation_timeout: Duration::from_secs(5),
            default_timeout: Duration::from_secs(10),
        }
    }
}

impl DispatchPolicy {
    /// Classify a target URL.
    pub fn classify(&self, url: &str) -> TargetClass {
        let lowered = url.to_ascii_lowercase();
        if self
            .automation_markers
            .iter()
            .any(|marker| lowered.contains(marker.as_str()))
        {
            TargetClass::Automation
        } else {
            TargetClass::Standard
        }
    }

    fn timeout_for(&self, class: TargetClass) -> Duration {
        match class {
            TargetClass::Automation => self.automation_timeout,
            TargetClass::Standard => self.default_timeout,
        }
    }
}

/// Aggregate result of one fan-out (callers on the inbound path ignore
/// it; the HTTP surface reports it).
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct DispatchSummary {
    /// Attempts made.
    pub attempted: usize,
    /// 2xx responses.
    pub delivered: usize,
    /// Errors, timeouts, and non-2xx responses.
    pub failed: usize,
}

/// Fans inbound events out to an account's active webhooks.
pub struct WebhookDispatcher {
    http: reqwest::Client,
    cache: Arc<WebhookCache>,
    batcher: Arc<LogBatcher>,
    policy: DispatchPolicy,
}

impl WebhookDispatcher {
    /// Build a dispatcher. The reqwest client is shared; per-request
    /// timeouts come from the policy, not the client.
    pub fn new(cache: Arc<WebhookCache>, batcher: Arc<LogBatcher>, policy: DispatchPolicy) -> Self {
        Self {
            http: reqwest::Client::new(),
            cache,
            batcher,
            policy,
        }
    }

    /// Deliver an inbound event to every active webhook of the account.
    ///
    /// Completes once every attempt has settled; never short-circuits on
    /// an individual failure. Store trouble reading the webhook list is
    /// absorbed (logged, empty summary) — the inbound path must not fail
    /// because fan-out could not happen.
    pub async fn dispatch(
        &self,
        account_id: &AccountId,
        message: &InboundMessage,
    ) -> DispatchSummary {
        let webhooks = match self.cache.active_webhooks(account_id) {
            Ok(webhooks) => webhooks,
            Err(err) => {
                warn!(account_id = %account_id, error = %err, "failed to load webhooks, skipping fan-out");
                return DispatchSummary::default();
            }
        };
        if webhooks.is_empty() {
            return DispatchSummary::default();
        }

        let attempts = webhooks
            .iter()
            .map(|webhook| self.deliver(account_id, webhook, message));
        let outcomes = join_all(attempts).await;

        let delivered = outcomes.iter().filter(|ok| **ok).count();
        let summary = DispatchSummary {
            attempted: outcomes.len(),
            delivered,
            failed: outcomes.len() - delivered,
        };
        debug!(
            account_id = %account_id,
            attempted = summary.attempted,
            delivered = summary.delivered,
            "webhook fan-out settled"
        );
        summary
    }

    /// One delivery attempt. Returns whether the target accepted it; the
    /// outcome is recorded via the batcher either way.
    async fn deliver(
        &self,
        account_id: &AccountId,
        webhook: &Webhook,
        message: &InboundMessage,
    ) -> bool {
        let class = self.policy.classify(&webhook.url);
        let payload = build_payload(account_id, message, class);

        let mut request = self
            .http
            .post(&webhook.url)
            .timeout(self.policy.timeout_for(class))
            .header("x-account-id", account_id.as_str())
            .json(&payload);
        if let Some(secret) = &webhook.secret {
            request = request.header("x-webhook-secret", secret);
        }

        let outcome = match request.send().await {
            Ok(response) if response.status().is_success() => Ok(response.status().as_u16()),
            Ok(response) => Err(format!("http status {}", response.status().as_u16())),
            Err(err) if err.is_timeout() => Err("timeout".to_string()),
            Err(err) => Err(err.to_string()),
        };

        match outcome {
            Ok(status) => {
                counter!("webhook_deliveries_total", "result" => "ok").increment(1);
                self.batcher.record(
                    DeliveryRecord::success(
                        account_id.clone(),
                        DeliveryDirection::Webhook,
                        Some(webhook.url.clone()),
                        Some(format!("delivered ({status})")),
                    )
                    .with_media_url(message.media_url.clone()),
                );
                true
            }
            Err(detail) => {
                counter!("webhook_deliveries_total", "result" => "error").increment(1);
                warn!(
                    account_id = %account_id,
                    webhook_id = %webhook.id,
                    url = %webhook.url,
                    error = %detail,
                    "webhook delivery failed"
                );
                self.batcher.record(DeliveryRecord::failure(
                    account_id.clone(),
                    DeliveryDirection::Webhook,
                    Some(webhook.url.clone()),
                    None,
                    detail,
                ));
                false
            }
        }
    }
}

/// Shape the wire body for a target class.
fn build_payload(
    account_id: &AccountId,
    message: &InboundMessage,
    class: TargetClass,
) -> serde_json::Value {
    match class {
        // Reduced schema for automation platforms: flat, minimal, marked.
        TargetClass::Automation => json!({
            "accountId": account_id,
            "direction": "incoming",
            "from": message.from,
            "to": message.to,
            "message": message.body,
            "timestamp": message.timestamp,
            "type": message.message_type,
            "chatId": message.chat_id,
            "isGroup": message.is_group,
            "compact": true,
        }),
        TargetClass::Standard => json!({
            "accountId": account_id,
            "direction": "incoming",
            "event": "message_received",
            "message": message,
            "receivedAt": chrono::Utc::now().to_rfc3339(),
        }),
    }
}
