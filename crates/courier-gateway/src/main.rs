//! Courier gateway daemon.
//!
//! Wires settings, store, relay components, and the HTTP server together;
//! reconnects persisted accounts at startup; runs the background flush
//! and cache-clear loops; shuts down cleanly on SIGINT/SIGTERM.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use courier_core::normalize::PhoneNumberNormalizer;
use courier_gateway::bridge::BridgeFactory;
use courier_relay::{
    AccountRegistry, DispatchPolicy, LogBatcher, OutboundQueue, TransportFactory, WebhookCache,
    WebhookDispatcher,
};
use courier_server::{AppState, router};
use courier_settings::CourierSettings;
use courier_store::Store;
use courier_store::connection::{ConnectionConfig, open_pool};
use courier_store::migrations::run_migrations;
use tokio_util::sync::CancellationToken;
use tracing::info;

#[global_allocator]
static GLOBAL: mimalloc::MiMalloc = mimalloc::MiMalloc;

/// Multi-account messaging gateway.
#[derive(Debug, Parser)]
#[command(name = "courier", version, about)]
struct Cli {
    /// Settings file (default: ~/.courier/settings.json).
    #[arg(long)]
    settings: Option<PathBuf>,

    /// Database file (overrides the settings value).
    #[arg(long)]
    db: Option<PathBuf>,

    /// Bind port (overrides the settings value).
    #[arg(long)]
    port: Option<u16>,
}

fn expand_home(path: &str) -> PathBuf {
    if let Some(rest) = path.strip_prefix("~/") {
        if let Some(home) = std::env::var_os("HOME") {
            return PathBuf::from(home).join(rest);
        }
    }
    PathBuf::from(path)
}

fn load_settings(cli: &Cli) -> CourierSettings {
    let path = cli
        .settings
        .clone()
        .unwrap_or_else(courier_settings::settings_path);
    let settings = match courier_settings::load_settings_from_path(&path) {
        Ok(settings) => settings,
        Err(err) => {
            eprintln!("warning: {err}; using default settings");
            CourierSettings::default()
        }
    };
    courier_settings::init_settings(settings.clone());
    settings
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,courier=debug".into()),
        )
        .init();

    let cli = Cli::parse();
    let mut settings = load_settings(&cli);
    if let Some(port) = cli.port {
        settings.server.port = port;
    }

    // Persistence.
    let db_path = cli
        .db
        .clone()
        .unwrap_or_else(|| expand_home(&settings.database.path));
    if let Some(parent) = db_path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("creating {}", parent.display()))?;
    }
    let pool = open_pool(&db_path, &ConnectionConfig::default())?;
    {
        let conn = pool.get()?;
        run_migrations(&conn)?;
    }
    let store = Arc::new(Store::new(pool));

    // Relay components.
    let metrics = courier_server::metrics::install_recorder();
    let cache = Arc::new(WebhookCache::new(Arc::clone(&store)));
    let batcher = Arc::new(LogBatcher::with_thresholds(
        Arc::clone(&store),
        settings.logging.batch_size,
        Duration::from_secs(settings.logging.flush_interval_secs),
    ));
    let dispatcher = Arc::new(WebhookDispatcher::new(
        Arc::clone(&cache),
        Arc::clone(&batcher),
        DispatchPolicy {
            automation_markers: settings.dispatch.automation_markers.clone(),
            automation_timeout: Duration::from_secs(settings.dispatch.automation_timeout_secs),
            default_timeout: Duration::from_secs(settings.dispatch.default_timeout_secs),
        },
    ));
    let factory: Arc<dyn TransportFactory> =
        Arc::new(BridgeFactory::new(settings.transport.bridge_url.clone()));
    let registry = Arc::new(AccountRegistry::new(
        Arc::clone(&store),
        factory,
        Arc::clone(&dispatcher),
        Arc::clone(&batcher),
        Arc::clone(&cache),
    ));
    let normalizer = Arc::new(PhoneNumberNormalizer::new(
        settings.transport.default_country_code.clone(),
        settings.transport.routing_suffix.clone(),
    ));
    let queue = Arc::new(OutboundQueue::new(
        settings.queue.max_depth,
        normalizer,
        Arc::clone(&batcher),
    ));

    // Background loops.
    let shutdown = CancellationToken::new();
    let batcher_task = batcher.spawn(shutdown.clone());
    let clear_task = {
        let cache = Arc::clone(&cache);
        let shutdown = shutdown.clone();
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(Duration::from_secs(60 * 60));
            let _ = interval.tick().await;
            loop {
                tokio::select! {
                    _ = interval.tick() => cache.clear_secrets(),
                    () = shutdown.cancelled() => break,
                }
            }
        })
    };

    // Re-establish every persisted session; one account's failure must
    // not block the rest.
    let reconnected = registry.reconnect_all().await;
    info!(accounts = reconnected, "sessions restarted");

    // HTTP surface.
    let app = router(AppState {
        registry,
        queue,
        cache,
        batcher: Arc::clone(&batcher),
        store,
        metrics,
    });
    let bind = format!("{}:{}", settings.server.host, settings.server.port);
    let listener = tokio::net::TcpListener::bind(&bind)
        .await
        .with_context(|| format!("binding {bind}"))?;
    info!(addr = %bind, db = %db_path.display(), "courier gateway listening");

    let serve_shutdown = shutdown.clone();
    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            shutdown_signal().await;
            serve_shutdown.cancel();
        })
        .await
        .context("server error")?;

    // Drain background work; the batcher does a final flush on cancel.
    shutdown.cancel();
    let _ = batcher_task.await;
    let _ = clear_task.await;
    info!("courier gateway stopped");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        let _ = tokio::signal::ctrl_c().await;
    };
    #[cfg(unix)]
    let terminate = async {
        let mut sig = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler");
        let _ = sig.recv().await;
    };
    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }
    info!("shutdown signal received");
}
