// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Background worker running the periodic supervision sweep.
//!
//! Acknowledgements move most transitions on as they arrive. The sweep
//! catches what they cannot: elapsed timeouts, lost acknowledgements and
//! records left mid-transition by a restart.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Notify;
use tracing::{debug, error, info};

use crate::config::{Config, DEFAULT_SCAN_INTERVAL_MS};
use crate::supervision::SupervisionScanner;

/// Configuration for the supervision worker.
#[derive(Debug, Clone)]
pub struct SupervisionWorkerConfig {
    /// How often to sweep.
    pub poll_interval: Duration,
}

impl Default for SupervisionWorkerConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_millis(DEFAULT_SCAN_INTERVAL_MS),
        }
    }
}

impl From<&Config> for SupervisionWorkerConfig {
    fn from(config: &Config) -> Self {
        Self {
            poll_interval: config.scan_interval,
        }
    }
}

/// Background worker that sweeps definitions and instances in transition.
pub struct SupervisionWorker {
    scanner: Arc<SupervisionScanner>,
    config: SupervisionWorkerConfig,
    shutdown: Arc<Notify>,
}

impl SupervisionWorker {
    /// Create a new supervision worker.
    pub fn new(scanner: Arc<SupervisionScanner>, config: SupervisionWorkerConfig) -> Self {
        Self {
            scanner,
            config,
            shutdown: Arc::new(Notify::new()),
        }
    }

    /// Get a handle that can be used to signal shutdown.
    pub fn shutdown_handle(&self) -> Arc<Notify> {
        self.shutdown.clone()
    }

    /// Run the sweep loop until the shutdown signal is received.
    pub async fn run(&self) {
        info!(
            poll_interval_ms = self.config.poll_interval.as_millis() as u64,
            "Supervision worker started"
        );

        loop {
            tokio::select! {
                biased;

                _ = self.shutdown.notified() => {
                    info!("Supervision worker received shutdown signal");
                    break;
                }

                _ = tokio::time::sleep(self.config.poll_interval) => {
                    match self.scanner.run().await {
                        Ok(report) => debug!(?report, "Supervision sweep done"),
                        Err(e) => error!(error = %e, "Supervision sweep failed"),
                    }
                }
            }
        }

        info!("Supervision worker stopped");
    }
}
