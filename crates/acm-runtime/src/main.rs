// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! ACM Runtime - Automation Composition Supervision Server
//!
//! Runs the supervision engine against a Postgres store:
//! - Periodic sweep of definitions and instances in transition
//! - Inbound participant message handling
//! - Outbound participant commands and syncs

use std::sync::Arc;
use tracing::{debug, error, info, warn};

use acm_runtime::config::Config;
use acm_runtime::migrations;
use acm_runtime::publisher::ChannelPublisher;
use acm_runtime::runtime::SupervisionRuntime;
use acm_runtime::store::PostgresStore;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "acm_runtime=info".into()),
        )
        .init();

    // Load .env file if present
    if let Err(e) = dotenvy::dotenv() {
        warn!("No .env file loaded: {}", e);
    }

    let config = Config::from_env()?;

    info!(
        scan_interval_ms = config.scan_interval.as_millis() as u64,
        max_status_wait_ms = config.timeouts.max_status_wait_ms,
        max_operation_wait_ms = config.timeouts.max_operation_wait_ms,
        "Starting ACM supervision runtime"
    );

    let pool = sqlx::postgres::PgPoolOptions::new()
        .max_connections(10)
        .connect(&config.database_url)
        .await?;

    info!("Connected to database");

    migrations::run(&pool).await?;

    info!("Database schema verified");

    // The bus adapter is not part of this binary; outbound traffic is logged.
    let (publisher, mut outbound) = ChannelPublisher::new(config.inbound_queue_size);
    let outbound_handle = tokio::spawn(async move {
        while let Some(message) = outbound.recv().await {
            match serde_json::to_string(&message) {
                Ok(json) => debug!(
                    message_type = %message.message_type(),
                    participant_id = %message.participant_id(),
                    payload = %json,
                    "Outbound participant message"
                ),
                Err(e) => error!(error = %e, "Failed to serialize outbound message"),
            }
        }
    });

    let runtime = SupervisionRuntime::builder()
        .store(Arc::new(PostgresStore::new(pool)))
        .publisher(Arc::new(publisher))
        .config(&config)
        .build()?
        .start()
        .await?;

    info!("Supervision runtime ready");

    // Wait for shutdown signal
    tokio::signal::ctrl_c().await?;
    info!("Shutdown signal received");

    runtime.shutdown().await?;
    outbound_handle.abort();

    info!("ACM supervision runtime shut down");

    Ok(())
}
