//! HTTP bridge transport adapter.
//!
//! The actual protocol work (browser automation, credential storage)
//! lives in an external bridge process. This adapter maps the abstract
//! transport seam onto the bridge's HTTP API:
//!
//! - `POST   {base}/sessions/{id}/start`  — open a session
//! - `GET    {base}/sessions/{id}/events` — long-poll for session events
//! - `POST   {base}/sessions/{id}/send`   — send one message
//! - `DELETE {base}/sessions/{id}`        — tear the session down
//!
//! The events endpoint returns a JSON array of [`SessionEvent`]s (empty on
//! poll timeout). A 404/410 from the bridge means the session is gone;
//! the adapter emits a final `disconnected` event and marks itself
//! unusable.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use courier_core::events::SessionEvent;
use courier_core::ids::AccountId;
use courier_relay::{OutboundPayload, TransportClient, TransportError, TransportFactory};
use parking_lot::Mutex;
use serde::Serialize;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

/// Consecutive poll failures tolerated before the session is declared
/// disconnected.
const MAX_POLL_FAILURES: u32 = 5;

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct BridgeSendRequest<'a> {
    to: &'a str,
    body: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    media_url: Option<&'a str>,
}

/// One account's session on the external bridge.
pub struct BridgeTransport {
    account_id: AccountId,
    base_url: String,
    http: reqwest::Client,
    events: mpsc::Sender<SessionEvent>,
    closed: Arc<AtomicBool>,
    poll_task: Mutex<Option<JoinHandle<()>>>,
}

impl BridgeTransport {
    fn session_url(&self, suffix: &str) -> String {
        format!(
            "{}/sessions/{}{suffix}",
            self.base_url.trim_end_matches('/'),
            self.account_id
        )
    }

    /// Long-poll loop: forward bridge events into the session channel
    /// until the bridge, the channel, or the session goes away.
    async fn poll_events(
        account_id: AccountId,
        url: String,
        http: reqwest::Client,
        events: mpsc::Sender<SessionEvent>,
        closed: Arc<AtomicBool>,
    ) {
        let mut failures: u32 = 0;
        loop {
            if closed.load(Ordering::SeqCst) {
                break;
            }
            let response = http
                .get(&url)
                .timeout(Duration::from_secs(35))
                .send()
                .await;

            match response {
                Ok(response) if response.status().is_success() => {
                    failures = 0;
                    let batch: Vec<SessionEvent> = match response.json().await {
                        Ok(batch) => batch,
                        Err(err) => {
                            warn!(account_id = %account_id, error = %err, "malformed bridge event batch");
                            continue;
                        }
                    };
                    for event in batch {
                        if events.send(event).await.is_err() {
                            // Consumer gone (account deleted); stop polling.
                            closed.store(true, Ordering::SeqCst);
                            return;
                        }
                    }
                }
                Ok(response)
                    if response.status() == reqwest::StatusCode::NOT_FOUND
                        || response.status() == reqwest::StatusCode::GONE =>
                {
                    debug!(account_id = %account_id, "bridge session gone");
                    closed.store(true, Ordering::SeqCst);
                    let _ = events
                        .send(SessionEvent::Disconnected {
                            reason: "bridge session gone".into(),
                        })
                        .await;
                    return;
                }
                Ok(response) => {
                    failures += 1;
                    warn!(
                        account_id = %account_id,
                        status = response.status().as_u16(),
                        failures,
                        "bridge event poll rejected"
                    );
                }
                Err(err) => {
                    failures += 1;
                    warn!(account_id = %account_id, error = %err, failures, "bridge event poll failed");
                }
            }

            if failures >= MAX_POLL_FAILURES {
                closed.store(true, Ordering::SeqCst);
                let _ = events
                    .send(SessionEvent::Disconnected {
                        reason: "bridge unreachable".into(),
                    })
                    .await;
                return;
            }
            if failures > 0 {
                tokio::time::sleep(Duration::from_millis(500 * u64::from(failures))).await;
            }
        }
    }
}

#[async_trait]
impl TransportClient for BridgeTransport {
    async fn connect(&self) -> Result<(), TransportError> {
        let response = self
            .http
            .post(self.session_url("/start"))
            .send()
            .await
            .map_err(|err| TransportError::Connect(err.to_string()))?;
        if !response.status().is_success() {
            return Err(TransportError::Connect(format!(
                "bridge returned {}",
                response.status().as_u16()
            )));
        }

        let task = tokio::spawn(Self::poll_events(
            self.account_id.clone(),
            self.session_url("/events"),
            self.http.clone(),
            self.events.clone(),
            Arc::clone(&self.closed),
        ));
        *self.poll_task.lock() = Some(task);
        debug!(account_id = %self.account_id, "bridge session started");
        Ok(())
    }

    async fn send(
        &self,
        destination: &str,
        payload: &OutboundPayload,
    ) -> Result<(), TransportError> {
        if !self.is_usable() {
            return Err(TransportError::Closed);
        }
        let request = BridgeSendRequest {
            to: destination,
            body: &payload.body,
            media_url: payload.media_url.as_deref(),
        };
        let response = self
            .http
            .post(self.session_url("/send"))
            .json(&request)
            .send()
            .await
            .map_err(|err| TransportError::Send(err.to_string()))?;

        if response.status().is_success() {
            Ok(())
        } else {
            let status = response.status().as_u16();
            let detail = response.text().await.unwrap_or_default();
            Err(TransportError::Send(format!(
                "bridge returned {status}: {detail}"
            )))
        }
    }

    async fn destroy(&self) -> Result<(), TransportError> {
        self.closed.store(true, Ordering::SeqCst);
        if let Some(task) = self.poll_task.lock().take() {
            task.abort();
        }
        let response = self
            .http
            .delete(self.session_url(""))
            .send()
            .await
            .map_err(|err| TransportError::Send(err.to_string()))?;
        if response.status().is_success() || response.status() == reqwest::StatusCode::NOT_FOUND {
            Ok(())
        } else {
            Err(TransportError::Send(format!(
                "bridge teardown returned {}",
                response.status().as_u16()
            )))
        }
    }

    fn is_usable(&self) -> bool {
        !self.closed.load(Ordering::SeqCst)
    }
}

/// Creates bridge-backed transports against one bridge base URL.
pub struct BridgeFactory {
    base_url: String,
    http: reqwest::Client,
}

impl BridgeFactory {
    /// Factory for the given bridge base URL.
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            http: reqwest::Client::new(),
        }
    }
}

impl TransportFactory for BridgeFactory {
    fn create(
        &self,
        account_id: &AccountId,
    ) -> (Arc<dyn TransportClient>, mpsc::Receiver<SessionEvent>) {
        let (tx, rx) = mpsc::channel(64);
        let transport = Arc::new(BridgeTransport {
            account_id: account_id.clone(),
            base_url: self.base_url.clone(),
            http: self.http.clone(),
            events: tx,
            closed: Arc::new(AtomicBool::new(false)),
            poll_task: Mutex::new(None),
        });
        (transport, rx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    async fn bridge_pair(
        server: &MockServer,
    ) -> (Arc<dyn TransportClient>, mpsc::Receiver<SessionEvent>) {
        let factory = BridgeFactory::new(server.uri());
        factory.create(&AccountId::from("acct_1"))
    }

    #[tokio::test]
    async fn connect_starts_session_and_streams_events() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/sessions/acct_1/start"))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;
        // First poll returns one event; then the session is reported gone.
        Mock::given(method("GET"))
            .and(path("/sessions/acct_1/events"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!([
                { "type": "qr_received", "payload": "QRDATA" }
            ])))
            .up_to_n_times(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/sessions/acct_1/events"))
            .respond_with(ResponseTemplate::new(410))
            .mount(&server)
            .await;

        let (client, mut rx) = bridge_pair(&server).await;
        client.connect().await.unwrap();

        assert_eq!(
            rx.recv().await,
            Some(SessionEvent::QrReceived {
                payload: "QRDATA".into()
            })
        );
        assert_eq!(
            rx.recv().await,
            Some(SessionEvent::Disconnected {
                reason: "bridge session gone".into()
            })
        );
        assert!(!client.is_usable());
    }

    #[tokio::test]
    async fn connect_failure_surfaces() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/sessions/acct_1/start"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;

        let (client, _rx) = bridge_pair(&server).await;
        let err = client.connect().await.unwrap_err();
        assert!(matches!(err, TransportError::Connect(_)));
    }

    #[tokio::test]
    async fn send_posts_payload_to_bridge() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/sessions/acct_1/send"))
            .and(body_json(serde_json::json!({
                "to": "919876543210@c.us",
                "body": "hi",
            })))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;

        let (client, _rx) = bridge_pair(&server).await;
        client
            .send("919876543210@c.us", &OutboundPayload::text("hi"))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn send_failure_carries_bridge_detail() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/sessions/acct_1/send"))
            .respond_with(ResponseTemplate::new(503).set_body_string("page closed"))
            .mount(&server)
            .await;

        let (client, _rx) = bridge_pair(&server).await;
        let err = client
            .send("919876543210@c.us", &OutboundPayload::text("hi"))
            .await
            .unwrap_err();
        let text = err.to_string();
        assert!(text.contains("503"));
        assert!(text.contains("page closed"));
    }

    #[tokio::test]
    async fn destroy_deletes_session_and_marks_unusable() {
        let server = MockServer::start().await;
        Mock::given(method("DELETE"))
            .and(path("/sessions/acct_1"))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;

        let (client, _rx) = bridge_pair(&server).await;
        client.destroy().await.unwrap();
        assert!(!client.is_usable());

        // Sends against a destroyed handle are rejected locally.
        let err = client
            .send("1@c.us", &OutboundPayload::text("late"))
            .await
            .unwrap_err();
        assert!(matches!(err, TransportError::Closed));
    }

    #[tokio::test]
    async fn destroy_tolerates_already_gone_session() {
        let server = MockServer::start().await;
        Mock::given(method("DELETE"))
            .and(path("/sessions/acct_1"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let (client, _rx) = bridge_pair(&server).await;
        client.destroy().await.unwrap();
    }
}
