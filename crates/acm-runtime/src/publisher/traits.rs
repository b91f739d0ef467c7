// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Publisher trait definitions.
//!
//! Defines the hand-off point between the supervision engine and whatever
//! transport carries messages to participants.

use acm_models::ParticipantMessage;
use async_trait::async_trait;
use thiserror::Error;

/// Errors from publishing.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum PublishError {
    /// The receiving side of the outbound channel is gone.
    #[error("Outbound channel closed")]
    ChannelClosed,

    /// Message could not be serialized.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Transport rejected the message.
    #[error("Transport error: {0}")]
    Transport(String),
}

/// Result type for publisher operations.
pub type Result<T> = std::result::Result<T, PublishError>;

/// Sends one message to the participant it addresses.
#[async_trait]
pub trait MessagePublisher: Send + Sync {
    /// Publish a message.
    async fn publish(&self, message: ParticipantMessage) -> Result<()>;

    /// Publisher type name for logging.
    fn publisher_type(&self) -> &'static str;
}
