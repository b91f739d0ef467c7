// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Recording publisher for testing.
//!
//! Keeps every published message in memory so tests can assert on what
//! the engine sent, to whom, and in which order.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use acm_models::{ParticipantMessage, ParticipantMessageType};
use async_trait::async_trait;
use tokio::sync::Mutex;
use uuid::Uuid;

use super::traits::*;

/// Publisher that records messages instead of sending them.
#[derive(Default, Clone)]
pub struct RecordingPublisher {
    messages: Arc<Mutex<Vec<ParticipantMessage>>>,
    /// If true, every publish fails with a transport error.
    failing: Arc<AtomicBool>,
}

impl RecordingPublisher {
    /// Create an empty recording publisher.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a recording publisher that rejects every message.
    pub fn failing() -> Self {
        let publisher = Self::default();
        publisher.failing.store(true, Ordering::SeqCst);
        publisher
    }

    /// Every message published so far.
    pub async fn messages(&self) -> Vec<ParticipantMessage> {
        self.messages.lock().await.clone()
    }

    /// Drain the recorded messages.
    pub async fn take(&self) -> Vec<ParticipantMessage> {
        std::mem::take(&mut *self.messages.lock().await)
    }

    /// Recorded messages of one type.
    pub async fn of_type(&self, message_type: ParticipantMessageType) -> Vec<ParticipantMessage> {
        self.messages
            .lock()
            .await
            .iter()
            .filter(|m| m.message_type() == message_type)
            .cloned()
            .collect()
    }

    /// Recorded messages addressed to one participant.
    pub async fn for_participant(&self, participant_id: Uuid) -> Vec<ParticipantMessage> {
        self.messages
            .lock()
            .await
            .iter()
            .filter(|m| m.participant_id() == participant_id)
            .cloned()
            .collect()
    }
}

#[async_trait]
impl MessagePublisher for RecordingPublisher {
    async fn publish(&self, message: ParticipantMessage) -> Result<()> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(PublishError::Transport("recording publisher set to fail".into()));
        }
        self.messages.lock().await.push(message);
        Ok(())
    }

    fn publisher_type(&self) -> &'static str {
        "recording"
    }
}
