// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Channel-backed publisher.
//!
//! Pushes outbound messages onto a bounded tokio channel; the bus adapter
//! owns the receiver and forwards to the real transport.

use acm_models::ParticipantMessage;
use async_trait::async_trait;
use tokio::sync::mpsc;

use super::traits::*;

/// Publisher writing to a bounded mpsc channel.
#[derive(Clone)]
pub struct ChannelPublisher {
    tx: mpsc::Sender<ParticipantMessage>,
}

impl ChannelPublisher {
    /// Create a publisher and the receiver the transport reads from.
    pub fn new(capacity: usize) -> (Self, mpsc::Receiver<ParticipantMessage>) {
        let (tx, rx) = mpsc::channel(capacity);
        (Self { tx }, rx)
    }
}

#[async_trait]
impl MessagePublisher for ChannelPublisher {
    async fn publish(&self, message: ParticipantMessage) -> Result<()> {
        self.tx
            .send(message)
            .await
            .map_err(|_| PublishError::ChannelClosed)
    }

    fn publisher_type(&self) -> &'static str {
        "channel"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use acm_models::messages::PrimeCommand;
    use chrono::Utc;
    use uuid::Uuid;

    fn prime(participant_id: Uuid) -> ParticipantMessage {
        ParticipantMessage::ParticipantPrime(PrimeCommand {
            message_id: Uuid::new_v4(),
            participant_id,
            composition_id: Uuid::new_v4(),
            definitions: Vec::new(),
            timestamp: Utc::now(),
        })
    }

    #[tokio::test]
    async fn test_publish_reaches_receiver() {
        let (publisher, mut rx) = ChannelPublisher::new(4);
        let participant = Uuid::new_v4();

        publisher.publish(prime(participant)).await.unwrap();

        let received = rx.recv().await.unwrap();
        assert_eq!(received.participant_id(), participant);
    }

    #[tokio::test]
    async fn test_publish_after_receiver_dropped() {
        let (publisher, rx) = ChannelPublisher::new(1);
        drop(rx);

        let result = publisher.publish(prime(Uuid::new_v4())).await;
        assert!(matches!(result, Err(PublishError::ChannelClosed)));
    }
}
