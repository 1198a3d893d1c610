//! Toolcrib Server - Workshop Tool Inventory
//!
//! REST API server for tool check-out, calibration tracking and alerts.

use anyhow::Context;
use sqlx::postgres::PgPoolOptions;
use std::{net::SocketAddr, sync::Arc, time::Duration};
use tokio::time::MissedTickBehavior;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt};

use toolcrib_server::{
    api,
    clock::{Clock, SystemClock},
    config::{AppConfig, NotifierTransport, StoreBackend},
    repository::{MemoryStore, Repository, Store},
    services::{
        alerts::AlertEvaluator,
        email::EmailNotifier,
        notifier::{LogNotifier, Notifier, TelegramNotifier},
        scans::{MemoryScanMailbox, RedisScanMailbox, ScanMailbox},
        Services,
    },
    AppState,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables from .env file
    dotenvy::dotenv().ok();

    // Load configuration
    let config = AppConfig::load().context("Failed to load configuration")?;

    // Initialize tracing
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| format!("toolcrib_server={},tower_http=debug", config.logging.level).into());

    let json = config.logging.format.eq_ignore_ascii_case("json");
    let (file_layer, _log_guard) = match &config.logging.directory {
        Some(directory) => {
            let appender = tracing_appender::rolling::daily(directory, "toolcrib.log");
            let (writer, guard) = tracing_appender::non_blocking(appender);
            (Some(fmt::layer().with_ansi(false).with_writer(writer)), Some(guard))
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(filter)
        .with((!json).then(fmt::layer))
        .with(json.then(|| fmt::layer().json()))
        .with(file_layer)
        .init();

    tracing::info!("Starting Toolcrib Server v{}", env!("CARGO_PKG_VERSION"));

    let store = connect_store(&config).await?;
    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let notifier = build_notifier(&config);

    let mailbox: Arc<dyn ScanMailbox> = match &config.bridge.redis_url {
        Some(url) => {
            let mailbox = RedisScanMailbox::new(url, config.bridge.scan_ttl_secs)
                .await
                .context("Failed to connect to Redis")?;
            tracing::info!("Connected to Redis");
            Arc::new(mailbox)
        }
        None => Arc::new(MemoryScanMailbox::new(config.bridge.scan_ttl_secs, clock.clone())),
    };

    let services = Services::new(store, notifier, mailbox, clock, &config);

    if config.alerts.scan_interval_secs > 0 {
        spawn_alert_scan(
            services.alerts.clone(),
            Duration::from_secs(config.alerts.scan_interval_secs),
        );
    }

    // Save server address before moving config
    let addr = SocketAddr::new(
        config.server.host.parse().context("Invalid host address")?,
        config.server.port,
    );

    // Create application state
    let state = AppState {
        config: Arc::new(config),
        services: Arc::new(services),
    };

    let app = api::router(state);

    tracing::info!("Server listening on http://{}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

/// Open the configured store, running migrations for Postgres
async fn connect_store(config: &AppConfig) -> anyhow::Result<Arc<dyn Store>> {
    match config.database.backend {
        StoreBackend::Postgres => {
            let pool = PgPoolOptions::new()
                .max_connections(config.database.max_connections)
                .min_connections(config.database.min_connections)
                .connect(&config.database.url)
                .await
                .context("Failed to connect to database")?;

            tracing::info!("Connected to database");

            sqlx::migrate!("./migrations")
                .run(&pool)
                .await
                .context("Failed to run database migrations")?;

            tracing::info!("Database migrations completed");
            Ok(Arc::new(Repository::new(pool)))
        }
        StoreBackend::Memory => {
            tracing::warn!("Using the in-memory store; data is lost on restart");
            Ok(Arc::new(MemoryStore::new()))
        }
    }
}

fn build_notifier(config: &AppConfig) -> Arc<dyn Notifier> {
    let supervisor = config.notifier.supervisor_channel.clone();
    if supervisor.is_none() {
        tracing::warn!("notifier.supervisor_channel is not set; supervisor notices will not be delivered");
    }

    match config.notifier.transport {
        NotifierTransport::Log => Arc::new(LogNotifier),
        NotifierTransport::Telegram => match config.notifier.telegram.bot_token.clone() {
            Some(token) => Arc::new(TelegramNotifier::new(&config.notifier.telegram, token, supervisor)),
            None => {
                tracing::warn!("Telegram transport selected without a bot token; falling back to log");
                Arc::new(LogNotifier)
            }
        },
        NotifierTransport::Email => Arc::new(EmailNotifier::new(config.notifier.email.clone(), supervisor)),
    }
}

/// Run an alert evaluation every `period`
fn spawn_alert_scan(alerts: AlertEvaluator, period: Duration) {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        loop {
            ticker.tick().await;
            if let Err(e) = alerts.evaluate().await {
                tracing::error!("Alert evaluation failed: {}", e);
            }
        }
    });
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutting down");
}
