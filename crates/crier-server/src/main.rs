//! # crier
//!
//! Channel broadcast fan-out server.
//!
//! ## Usage
//!
//! ```bash
//! # Run with default settings
//! crier
//!
//! # Run with environment variables
//! CRIER_PORT=8080 CRIER_HOST=0.0.0.0 crier
//! ```
//!
//! Configuration is read from `crier.toml` when present; see
//! [`config::Config`].

mod config;
mod handlers;
mod metrics;

use anyhow::Result;
use crier_core::{Broadcaster, BroadcasterConfig, Store};
use crier_store::SqliteStore;
use crier_transport::{DeliveryConfig, HttpBatchForwarder, HttpDelivery, HttpPreviewResolver};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "crier=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load configuration
    let config = config::Config::load()?;

    tracing::info!("Starting crier on {}:{}", config.host, config.port);

    // Initialize metrics
    if config.metrics.enabled {
        metrics::init_metrics();
        if let Err(e) = metrics::start_metrics_server(config.metrics.port) {
            tracing::error!("Failed to start metrics server: {}", e);
        }
    }

    // Open the store
    let options = SqliteConnectOptions::from_str(&config.store.url)?.create_if_missing(true);
    let pool = SqlitePoolOptions::new().connect_with(options).await?;
    SqliteStore::init(&pool).await?;
    let store: Arc<dyn Store> = Arc::new(SqliteStore::new(pool));

    // Wire up the delivery collaborator
    let timeout = Duration::from_millis(config.delivery.timeout_ms);
    let delivery = Arc::new(HttpDelivery::new(DeliveryConfig {
        base_url: config.delivery.base_url.clone(),
        timeout,
    })?);
    let resolver = Arc::new(HttpPreviewResolver::new(
        config.delivery.base_url.clone(),
        timeout,
    )?);

    // Build the fan-out engine
    let mut broadcaster = Broadcaster::with_config(
        store.clone(),
        delivery,
        resolver,
        BroadcasterConfig {
            fanout_workers: config.fanout.workers,
            catchup_pacing: Duration::from_millis(config.fanout.catchup_pacing_ms),
        },
    );
    if !config.fanout.nodes.is_empty() {
        tracing::info!(nodes = config.fanout.nodes.len(), "batched dispatch enabled");
        let forwarder = Arc::new(HttpBatchForwarder::new(config.fanout.nodes.clone(), timeout)?);
        broadcaster = broadcaster.batched(forwarder, config.fanout.batch_size);
    }

    let state = Arc::new(handlers::AppState {
        store,
        broadcaster: Arc::new(broadcaster),
        config,
    });

    // Start the server
    handlers::run_server(state).await?;

    Ok(())
}
