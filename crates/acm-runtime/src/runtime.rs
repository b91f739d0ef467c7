// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Embeddable supervision runtime.
//!
//! [`SupervisionRuntime`] wires the store, the publisher, the periodic sweep
//! and the inbound consumer together so the engine can run inside an
//! existing tokio application.
//!
//! # Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use acm_runtime::publisher::ChannelPublisher;
//! use acm_runtime::runtime::SupervisionRuntime;
//! use acm_runtime::store::PostgresStore;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let pool = sqlx::PgPool::connect("postgres://...").await?;
//!     let (publisher, outbound) = ChannelPublisher::new(1024);
//!
//!     let runtime = SupervisionRuntime::builder()
//!         .store(Arc::new(PostgresStore::new(pool)))
//!         .publisher(Arc::new(publisher))
//!         .build()?
//!         .start()
//!         .await?;
//!
//!     // Feed participant messages in, forward `outbound` to the bus.
//!     runtime.inbound().send(message).await?;
//!     runtime.transitions().deploy(instance_id).await?;
//!
//!     runtime.shutdown().await?;
//!     Ok(())
//! }
//! ```

use std::sync::Arc;
use std::time::Duration;

use acm_models::DocMessage;
use anyhow::Result;
use tokio::sync::{Notify, mpsc};
use tokio::task::JoinHandle;
use tracing::{error, info};

use crate::config::{
    Config, DEFAULT_INBOUND_QUEUE_SIZE, DEFAULT_SCAN_INTERVAL_MS, OperationTimeouts,
};
use crate::handler::SupervisionHandler;
use crate::inbound::InboundConsumer;
use crate::locks::KeyedLocks;
use crate::publisher::{MessagePublisher, SupervisionPublisher};
use crate::store::InstanceStore;
use crate::supervision::SupervisionScanner;
use crate::transitions::TransitionService;
use crate::worker::{SupervisionWorker, SupervisionWorkerConfig};

/// Builder for creating a [`SupervisionRuntime`].
pub struct SupervisionRuntimeBuilder {
    store: Option<Arc<dyn InstanceStore>>,
    publisher: Option<Arc<dyn MessagePublisher>>,
    scan_interval: Duration,
    timeouts: OperationTimeouts,
    inbound_queue_size: usize,
}

impl Default for SupervisionRuntimeBuilder {
    fn default() -> Self {
        Self {
            store: None,
            publisher: None,
            scan_interval: Duration::from_millis(DEFAULT_SCAN_INTERVAL_MS),
            timeouts: OperationTimeouts::default(),
            inbound_queue_size: DEFAULT_INBOUND_QUEUE_SIZE,
        }
    }
}

impl SupervisionRuntimeBuilder {
    /// Create a new builder with default settings.
    pub fn new() -> Self {
        Self::default()
    }

    /// Take the sweep interval, timeouts and queue size from `config`.
    pub fn config(mut self, config: &Config) -> Self {
        self.scan_interval = config.scan_interval;
        self.timeouts = config.timeouts.clone();
        self.inbound_queue_size = config.inbound_queue_size;
        self
    }

    /// Set the instance store (required).
    pub fn store(mut self, store: Arc<dyn InstanceStore>) -> Self {
        self.store = Some(store);
        self
    }

    /// Set the outbound message publisher (required).
    pub fn publisher(mut self, publisher: Arc<dyn MessagePublisher>) -> Self {
        self.publisher = Some(publisher);
        self
    }

    /// Set the supervision sweep interval.
    ///
    /// Default: 10 seconds
    pub fn scan_interval(mut self, interval: Duration) -> Self {
        self.scan_interval = interval;
        self
    }

    /// Set the per-operation timeouts.
    ///
    /// Default: 200 seconds for every operation
    pub fn timeouts(mut self, timeouts: OperationTimeouts) -> Self {
        self.timeouts = timeouts;
        self
    }

    /// Set the capacity of the inbound message queue.
    ///
    /// Default: 1024
    pub fn inbound_queue_size(mut self, size: usize) -> Self {
        self.inbound_queue_size = size;
        self
    }

    /// Build the runtime configuration.
    ///
    /// Returns an error if required fields are missing.
    pub fn build(self) -> Result<SupervisionRuntimeConfig> {
        let store = self
            .store
            .ok_or_else(|| anyhow::anyhow!("store is required"))?;
        let publisher = self
            .publisher
            .ok_or_else(|| anyhow::anyhow!("publisher is required"))?;
        if self.inbound_queue_size == 0 {
            return Err(anyhow::anyhow!("inbound_queue_size must be positive"));
        }

        Ok(SupervisionRuntimeConfig {
            store,
            publisher,
            scan_interval: self.scan_interval,
            timeouts: self.timeouts,
            inbound_queue_size: self.inbound_queue_size,
        })
    }
}

/// Configuration for a [`SupervisionRuntime`].
pub struct SupervisionRuntimeConfig {
    store: Arc<dyn InstanceStore>,
    publisher: Arc<dyn MessagePublisher>,
    scan_interval: Duration,
    timeouts: OperationTimeouts,
    inbound_queue_size: usize,
}

impl SupervisionRuntimeConfig {
    /// Start the runtime, spawning the supervision worker and inbound consumer.
    pub async fn start(self) -> Result<SupervisionRuntime> {
        let publisher = SupervisionPublisher::new(self.publisher);
        let locks = Arc::new(KeyedLocks::new());

        let scanner = Arc::new(SupervisionScanner::new(
            self.store.clone(),
            publisher.clone(),
            self.timeouts,
            locks.clone(),
        ));
        let handler = Arc::new(SupervisionHandler::new(
            self.store.clone(),
            publisher.clone(),
            scanner.clone(),
        ));
        let transitions = Arc::new(TransitionService::new(self.store, publisher, locks));

        // Create supervision worker
        let worker = SupervisionWorker::new(
            scanner.clone(),
            SupervisionWorkerConfig {
                poll_interval: self.scan_interval,
            },
        );
        let worker_shutdown = worker.shutdown_handle();
        let worker_handle = tokio::spawn(async move {
            worker.run().await;
        });

        // Create inbound consumer
        let (inbound_tx, inbound_rx) = mpsc::channel(self.inbound_queue_size);
        let consumer = InboundConsumer::new(handler.clone(), inbound_rx);
        let consumer_shutdown = consumer.shutdown_handle();
        let consumer_handle = tokio::spawn(consumer.run());

        info!(
            scan_interval_ms = self.scan_interval.as_millis() as u64,
            inbound_queue_size = self.inbound_queue_size,
            "SupervisionRuntime started"
        );

        Ok(SupervisionRuntime {
            worker_handle,
            consumer_handle,
            worker_shutdown,
            consumer_shutdown,
            inbound_tx,
            scanner,
            handler,
            transitions,
        })
    }
}

/// A running supervision engine that can be embedded in an application.
///
/// The runtime manages:
/// - Supervision worker for the periodic sweep
/// - Inbound consumer applying participant messages
///
/// Call [`shutdown`](Self::shutdown) for graceful termination.
pub struct SupervisionRuntime {
    worker_handle: JoinHandle<()>,
    consumer_handle: JoinHandle<()>,
    worker_shutdown: Arc<Notify>,
    consumer_shutdown: Arc<Notify>,
    inbound_tx: mpsc::Sender<DocMessage>,
    scanner: Arc<SupervisionScanner>,
    handler: Arc<SupervisionHandler>,
    transitions: Arc<TransitionService>,
}

impl SupervisionRuntime {
    /// Create a new builder for configuring the runtime.
    pub fn builder() -> SupervisionRuntimeBuilder {
        SupervisionRuntimeBuilder::new()
    }

    /// Sender for participant messages received from the bus.
    pub fn inbound(&self) -> mpsc::Sender<DocMessage> {
        self.inbound_tx.clone()
    }

    /// Service starting transitions on instances and definitions.
    pub fn transitions(&self) -> &Arc<TransitionService> {
        &self.transitions
    }

    /// Scanner shared by the sweep and the message handler.
    pub fn scanner(&self) -> &Arc<SupervisionScanner> {
        &self.scanner
    }

    /// Handler applying participant messages.
    pub fn handler(&self) -> &Arc<SupervisionHandler> {
        &self.handler
    }

    /// Gracefully shut down the runtime.
    ///
    /// Signals the supervision worker and inbound consumer to stop, then waits
    /// for them (and any message handlers still running) to complete.
    pub async fn shutdown(self) -> Result<()> {
        info!("SupervisionRuntime shutting down...");

        self.worker_shutdown.notify_one();
        self.consumer_shutdown.notify_one();

        if let Err(e) = self.worker_handle.await {
            error!("Supervision worker task panicked: {}", e);
        }

        if let Err(e) = self.consumer_handle.await {
            error!("Inbound consumer task panicked: {}", e);
            return Err(anyhow::anyhow!("inbound consumer task panicked: {}", e));
        }

        info!("SupervisionRuntime shutdown complete");
        Ok(())
    }

    /// Check if the runtime is still running.
    pub fn is_running(&self) -> bool {
        !self.worker_handle.is_finished() && !self.consumer_handle.is_finished()
    }
}
