// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Supervision-level publishing operations.
//!
//! Each operation builds its payloads through [`crate::batcher`] and hands
//! them to the configured [`MessagePublisher`], one message per participant.

use std::sync::Arc;

use acm_models::{AutomationComposition, AutomationCompositionDefinition, ParticipantMessage};
use tracing::debug;
use uuid::Uuid;

use super::traits::{MessagePublisher, Result};
use crate::batcher;

/// Publishes supervision commands and syncs.
#[derive(Clone)]
pub struct SupervisionPublisher {
    publisher: Arc<dyn MessagePublisher>,
}

impl SupervisionPublisher {
    /// Wrap a message publisher.
    pub fn new(publisher: Arc<dyn MessagePublisher>) -> Self {
        Self { publisher }
    }

    async fn publish_all(&self, operation: &'static str, messages: Vec<ParticipantMessage>) -> Result<()> {
        debug!(
            operation,
            count = messages.len(),
            publisher = self.publisher.publisher_type(),
            "Publishing participant messages"
        );
        for message in messages {
            self.publisher.publish(message).await?;
        }
        Ok(())
    }

    /// Deploy the elements starting at `start_phase`.
    pub async fn send_deploy_command(
        &self,
        ac: &AutomationComposition,
        definition: &AutomationCompositionDefinition,
        start_phase: i32,
        first_start_phase: bool,
    ) -> Result<()> {
        self.publish_all(
            "deploy",
            batcher::deploy_messages(ac, definition, start_phase, first_start_phase),
        )
        .await
    }

    /// Lock, unlock, undeploy or delete the elements starting at `start_phase`.
    pub async fn send_state_change_command(
        &self,
        ac: &AutomationComposition,
        definition: &AutomationCompositionDefinition,
        start_phase: i32,
        first_start_phase: bool,
    ) -> Result<()> {
        self.publish_all(
            "state_change",
            batcher::state_change_messages(ac, definition, start_phase, first_start_phase),
        )
        .await
    }

    /// Push updated properties to every element.
    pub async fn send_update_command(
        &self,
        ac: &AutomationComposition,
        definition: &AutomationCompositionDefinition,
    ) -> Result<()> {
        self.publish_all("update", batcher::update_messages(ac, definition))
            .await
    }

    /// Migrate (or revert) the elements executing `stage`.
    pub async fn send_migrate_command(
        &self,
        ac: &AutomationComposition,
        definition: &AutomationCompositionDefinition,
        stage: i32,
    ) -> Result<()> {
        self.publish_all("migrate", batcher::migrate_messages(ac, definition, stage))
            .await
    }

    /// Ask every participant to validate a migration to `target`.
    pub async fn send_migrate_precheck(
        &self,
        ac: &AutomationComposition,
        target: &AutomationCompositionDefinition,
    ) -> Result<()> {
        self.publish_all(
            "migrate_precheck",
            batcher::migrate_precheck_messages(ac, target),
        )
        .await
    }

    /// Prepare (or review) the elements executing `stage`.
    pub async fn send_prepare_command(
        &self,
        ac: &AutomationComposition,
        definition: &AutomationCompositionDefinition,
        stage: i32,
        pre_deploy: bool,
    ) -> Result<()> {
        self.publish_all(
            "prepare",
            batcher::prepare_messages(ac, definition, stage, pre_deploy),
        )
        .await
    }

    /// Ask every element's participant to review it.
    pub async fn send_review_command(
        &self,
        ac: &AutomationComposition,
        definition: &AutomationCompositionDefinition,
    ) -> Result<()> {
        self.publish_all("review", batcher::review_messages(ac, definition))
            .await
    }

    /// Prime a definition on its participants.
    pub async fn send_prime_command(&self, definition: &AutomationCompositionDefinition) -> Result<()> {
        self.publish_all("prime", batcher::prime_messages(definition))
            .await
    }

    /// Deprime a definition on its participants.
    pub async fn send_deprime_command(&self, definition: &AutomationCompositionDefinition) -> Result<()> {
        self.publish_all("deprime", batcher::deprime_messages(definition))
            .await
    }

    /// Broadcast the current state of an instance.
    pub async fn send_sync(
        &self,
        ac: &AutomationComposition,
        definition: &AutomationCompositionDefinition,
    ) -> Result<()> {
        self.publish_all("sync", batcher::sync_messages(ac, definition))
            .await
    }

    /// Broadcast the current state of a definition.
    pub async fn send_definition_sync(
        &self,
        definition: &AutomationCompositionDefinition,
    ) -> Result<()> {
        self.publish_all(
            "definition_sync",
            batcher::definition_sync_messages(definition),
        )
        .await
    }

    /// Tell a participant it no longer owns any element of `ac`.
    pub async fn send_delete_sync(
        &self,
        ac: &AutomationComposition,
        participant_id: Uuid,
    ) -> Result<()> {
        self.publish_all(
            "delete_sync",
            vec![batcher::delete_sync_message(ac, participant_id)],
        )
        .await
    }

    /// Send a reconnecting participant its share of one definition and its instances.
    pub async fn send_restart(
        &self,
        participant_id: Uuid,
        definition: &AutomationCompositionDefinition,
        instances: &[AutomationComposition],
    ) -> Result<()> {
        self.publish_all(
            "restart",
            vec![batcher::restart_message(participant_id, definition, instances)],
        )
        .await
    }
}
