//! Price Feed Relay Binary
//!
//! Starts the trade stream, the price cache ingest, the publish loop and the
//! health listener.
//!
//! # Usage
//!
//! ```bash
//! cargo run --bin price-feed-relay
//! ```
//!
//! # Environment Variables
//!
//! ## Required
//! - `RPC_URL`: Ledger JSON-RPC endpoint
//! - `PRIVATE_KEY`: Signing credential (64 hex digits, optional `0x`)
//!
//! ## Optional
//! - `PORT`: Health listener port (default: 5000)
//! - `PRICE_FEED_SYMBOLS`: Comma-separated symbols (default: 23 majors)
//! - `PRICE_FEED_QUOTE_ASSET`: Quote asset (default: USDT)
//! - `PRICE_FEED_WS_BASE_URL`: Combined-stream URL (default: Binance public data stream)
//! - `PRICE_FEED_RECONNECT_DELAY_MS`: Reconnect delay (default: 1500)
//! - `PRICE_FEED_IDLE_TIMEOUT_SECS`: Read idle timeout, 0 disables (default: 60)
//! - `PUBLISH_INTERVAL_SECS`: Pause between publish cycles (default: 5)
//! - `PUBLISH_INITIAL_DELAY_SECS`: Delay before the first cycle (default: 5)
//! - `PUBLISH_RECEIPT_TIMEOUT_SECS`: Receipt wait bound (default: 30)
//! - `LEDGER_SCHEMA_NAME`: Registered schema name (default: somnixPriceFeeds)
//! - `OTEL_ENABLED`: Export spans over OTLP (default: false)
//! - `RUST_LOG`: Log level (default: info)

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context as _;
use price_feed_relay::application::services::{
    PublishScheduler, SchemaRegistrar, SystemClock, run_ingest,
};
use price_feed_relay::infrastructure::binance::FeedClient;
use price_feed_relay::infrastructure::health::{HealthServer, HealthServerState};
use price_feed_relay::infrastructure::ledger::JsonRpcLedger;
use price_feed_relay::infrastructure::telemetry;
use price_feed_relay::{
    FeedEvent, LedgerPort, PrometheusMetrics, RelayConfig, RelayContext, RelayMetrics,
    init_metrics,
};
use tokio::signal;
use tokio::sync::mpsc;

/// Graceful shutdown timeout.
const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(10);

/// Capacity of the feed event channel.
const FEED_CHANNEL_CAPACITY: usize = 1024;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    if rustls::crypto::ring::default_provider()
        .install_default()
        .is_err()
    {
        anyhow::bail!("failed to install rustls crypto provider");
    }

    load_dotenv();

    let _telemetry_guard = telemetry::init();

    tracing::info!(version = env!("CARGO_PKG_VERSION"), "Starting price feed relay");

    if let Err(e) = init_metrics() {
        tracing::warn!(error = %e, "Prometheus recorder unavailable, metrics disabled");
    }

    let config = RelayConfig::from_env().context("invalid configuration")?;
    log_config(&config);

    let metrics: Arc<dyn RelayMetrics> = Arc::new(PrometheusMetrics);
    let ctx = RelayContext::with_metrics(config.feed.symbols.clone(), metrics);
    tracing::info!(
        schema_id = %ctx.schema_id(),
        schema = %ctx.schema().text(),
        "Price schema"
    );

    let ledger: Arc<dyn LedgerPort> = Arc::new(
        JsonRpcLedger::connect(&config.rpc_url, &config.signing_key, &config.ledger)
            .context("failed to create ledger clients")?,
    );

    let registrar = Arc::new(
        SchemaRegistrar::new(
            Arc::clone(&ledger),
            &ctx.schema(),
            config.ledger.schema_name.clone(),
            config.publish.receipt_timeout,
        )
        .with_metrics(ctx.metrics()),
    );
    let scheduler = Arc::new(
        PublishScheduler::new(
            config.publish.clone(),
            ctx.cache(),
            ctx.schema(),
            registrar,
            ledger,
            Arc::new(SystemClock),
        )
        .with_metrics(ctx.metrics()),
    );

    let health_state = Arc::new(HealthServerState::new(
        env!("CARGO_PKG_VERSION").to_string(),
        ctx.schema_id(),
        ctx.feed_state(),
        scheduler.stats(),
    ));
    let health_listener = HealthServer::bind(config.port)
        .await
        .context("failed to bind health listener")?;
    let health_server = HealthServer::new(config.port, health_state, ctx.child_token());

    let (feed_tx, feed_rx) = mpsc::channel::<FeedEvent>(FEED_CHANNEL_CAPACITY);
    let feed_client = Arc::new(FeedClient::new(
        config.feed.client_config(),
        ctx.symbols(),
        feed_tx,
        ctx.child_token(),
    ));

    let mut tasks = tokio::task::JoinSet::new();

    tasks.spawn(run_ingest(
        feed_rx,
        ctx.cache(),
        ctx.feed_state(),
        ctx.child_token(),
    ));

    tasks.spawn(async move {
        if let Err(e) = feed_client.run().await {
            tracing::error!(error = %e, "Feed client error");
        }
    });

    tasks.spawn(async move {
        if let Err(e) = health_server.serve(health_listener).await {
            tracing::error!(error = %e, "Health server error");
        }
    });

    tasks.spawn(scheduler.run(ctx.child_token()));

    tracing::info!("Price feed relay ready");

    await_shutdown().await;
    ctx.shutdown();

    tracing::info!(
        timeout_secs = SHUTDOWN_TIMEOUT.as_secs(),
        "Graceful shutdown started"
    );
    let drained = tokio::time::timeout(SHUTDOWN_TIMEOUT, async {
        while tasks.join_next().await.is_some() {}
    })
    .await;
    if drained.is_err() {
        tracing::warn!("Tasks still running after shutdown timeout, aborting");
        tasks.abort_all();
    }

    tracing::info!("Price feed relay stopped");
    Ok(())
}

/// Load .env file from current or ancestor directories.
fn load_dotenv() {
    if dotenvy::dotenv().is_ok() {
        return;
    }

    if let Ok(cwd) = std::env::current_dir() {
        let mut dir = cwd.as_path();
        while let Some(parent) = dir.parent() {
            let env_path = parent.join(".env");
            if env_path.exists() {
                let _ = dotenvy::from_path(&env_path);
                return;
            }
            dir = parent;
        }
    }
}

/// Log the parsed configuration.
fn log_config(config: &RelayConfig) {
    tracing::info!(
        port = config.port,
        symbols = config.feed.symbols.len(),
        quote_asset = %config.feed.quote_asset,
        interval_secs = config.publish.interval.as_secs(),
        schema_name = %config.ledger.schema_name,
        "Configuration loaded"
    );
    tracing::debug!(
        rpc_url = %config.rpc_url,
        stream_url = %config.feed.client_config().url,
        "Endpoints"
    );
}

/// Wait for shutdown signal (SIGTERM or SIGINT).
#[allow(clippy::expect_used)]
async fn await_shutdown() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("signal handler installation is critical for graceful shutdown");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("SIGTERM handler installation is critical for graceful shutdown")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            tracing::info!("Received Ctrl+C, initiating shutdown");
        }
        () = terminate => {
            tracing::info!("Received SIGTERM, initiating shutdown");
        }
    }
}
