//! End-to-end flow over the in-memory store, fake transport, and real
//! HTTP webhook targets.

use std::sync::Arc;
use std::time::Duration;

use courier_core::account::AccountStatus;
use courier_core::events::{InboundMessage, SessionEvent};
use courier_core::normalize::PhoneNumberNormalizer;
use courier_core::webhook::{DeliveryDirection, DeliveryStatus, Webhook};
use courier_relay::testing::FakeTransportFactory;
use courier_relay::{
    AccountRegistry, DispatchPolicy, LogBatcher, OutboundPayload, OutboundQueue, TransportFactory,
    WebhookCache, WebhookDispatcher,
};
use courier_store::Store;
use courier_store::connection::{ConnectionConfig, new_in_memory};
use courier_store::migrations::run_migrations;
use wiremock::matchers::method;
use wiremock::{Mock, MockServer, ResponseTemplate};

struct Gateway {
    registry: AccountRegistry,
    queue: OutboundQueue,
    dispatcher: Arc<WebhookDispatcher>,
    cache: Arc<WebhookCache>,
    batcher: Arc<LogBatcher>,
    store: Arc<Store>,
    factory: Arc<FakeTransportFactory>,
}

fn gateway() -> Gateway {
    let pool = new_in_memory(&ConnectionConfig::default()).unwrap();
    {
        let conn = pool.get().unwrap();
        run_migrations(&conn).unwrap();
    }
    let store = Arc::new(Store::new(pool));
    let cache = Arc::new(WebhookCache::new(Arc::clone(&store)));
    let batcher = Arc::new(LogBatcher::new(Arc::clone(&store)));
    let dispatcher = Arc::new(WebhookDispatcher::new(
        Arc::clone(&cache),
        Arc::clone(&batcher),
        DispatchPolicy {
            automation_timeout: Duration::from_millis(250),
            default_timeout: Duration::from_millis(500),
            ..Default::default()
        },
    ));
    let factory = Arc::new(FakeTransportFactory::new());
    let registry = AccountRegistry::new(
        Arc::clone(&store),
        Arc::clone(&factory) as Arc<dyn TransportFactory>,
        Arc::clone(&dispatcher),
        Arc::clone(&batcher),
        Arc::clone(&cache),
    );
    let queue = OutboundQueue::new(
        20,
        Arc::new(PhoneNumberNormalizer::new("91", "@c.us")),
        Arc::clone(&batcher),
    );
    Gateway {
        registry,
        queue,
        dispatcher,
        cache,
        batcher,
        store,
        factory,
    }
}

fn inbound(body: &str) -> InboundMessage {
    InboundMessage {
        from: "15551234@c.us".into(),
        to: "15559999@c.us".into(),
        body: body.into(),
        timestamp: 1_754_000_000,
        message_type: "chat".into(),
        chat_id: "15551234@c.us".into(),
        is_group: false,
        media_url: None,
    }
}

#[tokio::test]
async fn account_walks_the_lifecycle_and_retires_its_qr() {
    let g = gateway();

    // Create: caller observes `initializing`.
    let account = g.registry.create_account("support", None).await.unwrap();
    assert_eq!(account.status, AccountStatus::Initializing);

    // Transport emits a QR; payload becomes retrievable.
    g.factory
        .emit(
            &account.id,
            SessionEvent::QrReceived {
                payload: "QRDATA".into(),
            },
        )
        .await;
    // Transport reports ready with the resolved address.
    g.factory
        .emit(
            &account.id,
            SessionEvent::Ready {
                resolved_address: "15551234@c.us".into(),
            },
        )
        .await;

    // Drain the per-session consumer.
    for _ in 0..50 {
        tokio::task::yield_now().await;
    }

    let entry = g.registry.entry(&account.id).unwrap();
    assert_eq!(entry.status(), AccountStatus::Ready);
    assert!(entry.qr_payload().is_none(), "ready session serves no QR");
    assert_eq!(
        entry.session_view().phone_number.as_deref(),
        Some("15551234")
    );
}

#[tokio::test]
async fn inbound_message_fans_out_and_outbound_send_is_logged() {
    let g = gateway();
    let account = g.registry.create_account("support", None).await.unwrap();
    g.registry
        .handle_lifecycle_event(
            &account.id,
            SessionEvent::Ready {
                resolved_address: "15559999@c.us".into(),
            },
        )
        .await
        .unwrap();

    // One webhook subscriber.
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server)
        .await;
    g.store
        .create_webhook(&Webhook::new(account.id.clone(), server.uri(), None))
        .unwrap();

    // Inbound: recorded + dispatched.
    let summary = g.dispatcher.dispatch(&account.id, &inbound("ping")).await;
    assert_eq!(summary.delivered, 1);

    // Outbound: admitted, sent, recorded.
    let entry = g.registry.entry(&account.id).unwrap();
    let canonical = g
        .queue
        .enqueue(&entry, "9876543210", OutboundPayload::text("pong"))
        .await
        .unwrap();
    assert_eq!(canonical, "919876543210@c.us");

    g.batcher.flush();
    let rows = g.store.recent_delivery_logs(&account.id, 10).unwrap();
    let outgoing = rows
        .iter()
        .filter(|r| r.record.direction == DeliveryDirection::Outgoing)
        .count();
    let webhook_records = rows
        .iter()
        .filter(|r| r.record.direction == DeliveryDirection::Webhook)
        .count();
    assert_eq!(outgoing, 1);
    assert_eq!(webhook_records, 1);
    assert!(rows.iter().all(|r| r.record.status == DeliveryStatus::Success));
}

#[tokio::test]
async fn deleted_webhook_secret_stops_validating_immediately() {
    let g = gateway();
    let account = g.registry.create_account("support", None).await.unwrap();
    let webhook = Webhook::new(
        account.id.clone(),
        "https://hooks.example/inbound",
        Some("s3cret".into()),
    );
    g.store.create_webhook(&webhook).unwrap();

    // Warm the cache with a positive verdict.
    assert!(g.cache.validate_secret(&account.id, "s3cret").unwrap());

    // Delete + invalidate (what the HTTP mutation path does).
    let _ = g.store.delete_webhook(&webhook.id).unwrap();
    g.cache.invalidate_account(&account.id);

    assert!(
        !g.cache.validate_secret(&account.id, "s3cret").unwrap(),
        "stale verdict must not outlive the webhook"
    );
}

#[tokio::test]
async fn delete_account_cuts_off_the_send_path() {
    let g = gateway();
    let account = g.registry.create_account("support", None).await.unwrap();
    g.registry
        .handle_lifecycle_event(
            &account.id,
            SessionEvent::Ready {
                resolved_address: "1@c.us".into(),
            },
        )
        .await
        .unwrap();
    let entry = g.registry.entry(&account.id).unwrap();

    g.registry.delete_account(&account.id).await.unwrap();
    g.queue.remove_account(&account.id);

    // The registry no longer resolves the account.
    assert!(g.registry.entry(&account.id).is_err());
    // A caller still holding the old entry is stopped by the usability
    // pre-check: destroy() marked the fake transport unusable.
    let err = g
        .queue
        .enqueue(&entry, "9876543210", OutboundPayload::text("late"))
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        courier_relay::GatewayError::SessionUnavailable(_)
    ));
}
