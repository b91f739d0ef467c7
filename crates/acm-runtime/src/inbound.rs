// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Inbound message consumer.
//!
//! Drains the inbound [`DocMessage`] channel and handles every message on
//! its own task. Messages for different records proceed in parallel; the
//! handler's per-record locks serialize messages for the same record.

use std::sync::Arc;

use acm_models::DocMessage;
use tokio::sync::{Notify, mpsc};
use tokio::task::JoinSet;
use tracing::{error, info};

use crate::handler::SupervisionHandler;

/// Background task feeding inbound messages to a [`SupervisionHandler`].
pub struct InboundConsumer {
    handler: Arc<SupervisionHandler>,
    receiver: mpsc::Receiver<DocMessage>,
    shutdown: Arc<Notify>,
}

impl InboundConsumer {
    /// Create a consumer reading from `receiver`.
    pub fn new(handler: Arc<SupervisionHandler>, receiver: mpsc::Receiver<DocMessage>) -> Self {
        Self {
            handler,
            receiver,
            shutdown: Arc::new(Notify::new()),
        }
    }

    /// Get a handle that can be used to signal shutdown.
    pub fn shutdown_handle(&self) -> Arc<Notify> {
        self.shutdown.clone()
    }

    /// Consume until shutdown or until every sender is dropped.
    ///
    /// Handlers still running when the loop ends are awaited before returning.
    pub async fn run(mut self) {
        info!("Inbound consumer started");
        let mut tasks = JoinSet::new();

        loop {
            tokio::select! {
                biased;

                _ = self.shutdown.notified() => {
                    info!("Inbound consumer received shutdown signal");
                    break;
                }

                Some(joined) = tasks.join_next(), if !tasks.is_empty() => {
                    if let Err(e) = joined {
                        error!("Message handler task panicked: {}", e);
                    }
                }

                received = self.receiver.recv() => {
                    let Some(message) = received else {
                        info!("Inbound channel closed");
                        break;
                    };
                    let handler = self.handler.clone();
                    tasks.spawn(async move {
                        let message_type = message.message_type;
                        if let Err(e) = handler.handle(message).await {
                            error!(
                                message_type = %message_type,
                                error = %e,
                                "Failed to handle participant message"
                            );
                        }
                    });
                }
            }
        }

        while let Some(joined) = tasks.join_next().await {
            if let Err(e) = joined {
                error!("Message handler task panicked: {}", e);
            }
        }
        info!("Inbound consumer stopped");
    }
}
