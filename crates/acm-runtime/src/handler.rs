// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Inbound participant message handling.
//!
//! Each [`DocMessage`] is applied to the one instance or definition it names,
//! under that record's lock, and the record is scanned right away so an
//! acknowledgement can move a transition on without waiting for the sweep.

use std::sync::Arc;

use acm_models::{DocMessage, ParticipantMessageType};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::error::Result;
use crate::publisher::SupervisionPublisher;
use crate::store::InstanceStore;
use crate::supervision::SupervisionScanner;

/// Applies participant messages and runs the follow-up scan.
pub struct SupervisionHandler {
    store: Arc<dyn InstanceStore>,
    publisher: SupervisionPublisher,
    scanner: Arc<SupervisionScanner>,
}

impl SupervisionHandler {
    /// Create a handler sharing the scanner (and its locks) with the sweep.
    pub fn new(
        store: Arc<dyn InstanceStore>,
        publisher: SupervisionPublisher,
        scanner: Arc<SupervisionScanner>,
    ) -> Self {
        Self {
            store,
            publisher,
            scanner,
        }
    }

    /// Handle one inbound message.
    pub async fn handle(&self, message: DocMessage) -> Result<()> {
        debug!(
            message_type = %message.message_type,
            participant_id = %message.participant_id,
            instance_id = ?message.instance_id,
            composition_id = ?message.composition_id,
            "Handling participant message"
        );

        match message.message_type {
            ParticipantMessageType::AutomationCompositionDeployAck
            | ParticipantMessageType::AutomationCompositionStatechangeAck => {
                self.handle_instance_message(&message).await
            }
            ParticipantMessageType::ParticipantStatus => {
                if message.instance_id.is_some() {
                    self.handle_instance_message(&message).await
                } else if message.composition_id.is_some() {
                    self.handle_definition_message(&message).await
                } else {
                    debug!(
                        participant_id = %message.participant_id,
                        "Status names no instance or definition; ignored"
                    );
                    Ok(())
                }
            }
            ParticipantMessageType::ParticipantPrimeAck => {
                self.handle_definition_message(&message).await
            }
            ParticipantMessageType::ParticipantRegister => {
                self.handle_participant_restart(message.participant_id)
                    .await
            }
            ParticipantMessageType::ParticipantDeregister => {
                info!(participant_id = %message.participant_id, "Participant deregistered");
                Ok(())
            }
            other => {
                warn!(message_type = %other, "Outbound message type received inbound; ignored");
                Ok(())
            }
        }
    }

    async fn handle_instance_message(&self, message: &DocMessage) -> Result<()> {
        let Some(instance_id) = message.instance_id else {
            debug!("Instance message without instance id; ignored");
            return Ok(());
        };
        let _guard = self.scanner.locks().lock(instance_id).await;
        let Some(mut ac) = self.store.get_instance(instance_id).await? else {
            warn!(%instance_id, "Message for unknown automation composition");
            return Ok(());
        };

        let sync = self.scanner.simple().scan_message(&mut ac, message);
        if !sync.is_pending() {
            return Ok(());
        }
        self.scanner.scan_instance(&mut ac, sync).await
    }

    async fn handle_definition_message(&self, message: &DocMessage) -> Result<()> {
        let Some(composition_id) = message.composition_id else {
            debug!("Definition message without composition id; ignored");
            return Ok(());
        };
        let _guard = self.scanner.locks().lock(composition_id).await;
        let Some(mut definition) = self.store.get_definition(composition_id).await? else {
            warn!(%composition_id, "Message for unknown composition definition");
            return Ok(());
        };

        let mut sync = self
            .scanner
            .definitions()
            .scan_message(&mut definition, message);
        if !sync.is_pending() {
            return Ok(());
        }
        self.scanner
            .definitions()
            .scan(&mut definition, &mut sync)
            .await
    }

    /// Send a (re)registering participant everything it owns, one payload per definition.
    pub async fn handle_participant_restart(&self, participant_id: Uuid) -> Result<()> {
        let definitions = self
            .store
            .list_definitions_by_participant(participant_id)
            .await?;
        let instances = self
            .store
            .list_instances_by_participant(participant_id)
            .await?;

        for definition in &definitions {
            self.publisher
                .send_restart(participant_id, definition, &instances)
                .await?;
        }

        info!(
            %participant_id,
            definitions = definitions.len(),
            instances = instances.len(),
            "Participant restart sent"
        );
        Ok(())
    }
}
