// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Priming and depriming of composition definitions.
//!
//! A definition is primed (or deprimed) once every node template state has
//! reached the final state of the operation. Participants report progress
//! through PARTICIPANT_PRIME_ACK and node template output through
//! PARTICIPANT_STATUS.

use acm_models::properties;
use acm_models::{
    AcTypeState, AutomationCompositionDefinition, DocMessage, ParticipantMessageType,
    StateChangeResult,
};
use tracing::{debug, info, warn};

use super::context::elapsed_ms;
use super::{ScanContext, UpdateSync};
use crate::config::Operation;
use crate::error::Result;

/// Scanner for definitions in PRIMING or DEPRIMING.
#[derive(Clone)]
pub struct AcDefinitionScanner {
    ctx: ScanContext,
}

impl AcDefinitionScanner {
    /// Create a scanner over `ctx`.
    pub fn new(ctx: ScanContext) -> Self {
        Self { ctx }
    }

    /// Apply one participant message to `definition`.
    pub fn scan_message(
        &self,
        definition: &mut AutomationCompositionDefinition,
        message: &DocMessage,
    ) -> UpdateSync {
        if message.composition_id != Some(definition.composition_id) {
            debug!(
                composition_id = %definition.composition_id,
                message_composition_id = ?message.composition_id,
                "Message is for another definition; ignored"
            );
            return UpdateSync::default();
        }

        match message.message_type {
            ParticipantMessageType::ParticipantStatus => {
                let Some(definition_id) = &message.ac_element_definition_id else {
                    return UpdateSync::default();
                };
                let Some(state) = definition
                    .element_state_map
                    .values_mut()
                    .find(|state| &state.node_template_id == definition_id)
                else {
                    warn!(
                        composition_id = %definition.composition_id,
                        %definition_id,
                        "Status for unknown node template"
                    );
                    return UpdateSync::default();
                };
                if state
                    .participant_id
                    .is_some_and(|owner| owner != message.participant_id)
                {
                    warn!(
                        composition_id = %definition.composition_id,
                        %definition_id,
                        participant_id = %message.participant_id,
                        "Status from a participant that does not own the node template"
                    );
                    return UpdateSync::default();
                }
                match &message.out_properties {
                    Some(out_properties) => {
                        properties::recursive_merge(&mut state.out_properties, out_properties);
                        UpdateSync::updated_and_sync()
                    }
                    None => UpdateSync::default(),
                }
            }
            ParticipantMessageType::ParticipantPrimeAck => {
                let mut matched = false;
                for state in definition
                    .element_state_map
                    .values_mut()
                    .filter(|state| state.participant_id == Some(message.participant_id))
                {
                    if let Some(composition_state) = message.composition_state {
                        state.state = composition_state;
                    }
                    state.message = message.message.clone();
                    matched = true;
                }
                if !matched {
                    warn!(
                        composition_id = %definition.composition_id,
                        participant_id = %message.participant_id,
                        "Prime acknowledgement from a participant owning no node template"
                    );
                    return UpdateSync::default();
                }

                let mut sync = UpdateSync::updated();
                if message.state_change_result == StateChangeResult::Failed {
                    warn!(
                        composition_id = %definition.composition_id,
                        participant_id = %message.participant_id,
                        message = ?message.message,
                        "Participant reported a failed prime"
                    );
                    definition.state_change_result = StateChangeResult::Failed;
                    sync.to_be_sync = true;
                }
                sync
            }
            other => {
                debug!(message_type = %other, "Message type not handled by definition scan");
                UpdateSync::default()
            }
        }
    }

    /// Complete or time out a priming operation, then flush.
    pub async fn scan(
        &self,
        definition: &mut AutomationCompositionDefinition,
        sync: &mut UpdateSync,
    ) -> Result<()> {
        if definition.state_change_result == StateChangeResult::Failed {
            debug!(composition_id = %definition.composition_id, "Definition failed; not scanned");
            return self.save_and_sync(definition, sync).await;
        }

        let final_state = match definition.state {
            AcTypeState::Priming | AcTypeState::Primed => AcTypeState::Primed,
            _ => AcTypeState::Commissioned,
        };
        let completed = definition
            .element_state_map
            .values()
            .all(|state| state.state == final_state);

        if completed {
            if definition.state != final_state
                || definition.state_change_result != StateChangeResult::NoError
            {
                definition.state = final_state;
                definition.state_change_result = StateChangeResult::NoError;
                sync.updated = true;
                sync.to_be_sync = true;
                info!(
                    composition_id = %definition.composition_id,
                    state = %final_state,
                    "Composition definition transition completed"
                );
            }
        } else if definition.state_change_result == StateChangeResult::Timeout {
            debug!(composition_id = %definition.composition_id, "Definition already timed out");
        } else {
            let operation = Operation::for_definition(definition.state);
            let timeout_ms = self.ctx.timeouts.timeout_ms(operation);
            let elapsed = elapsed_ms(definition.last_msg);
            if elapsed > timeout_ms {
                warn!(
                    composition_id = %definition.composition_id,
                    operation = ?operation,
                    elapsed_ms = elapsed,
                    timeout_ms,
                    "Composition definition timed out"
                );
                definition.state_change_result = StateChangeResult::Timeout;
                sync.updated = true;
                sync.to_be_sync = true;
            }
        }

        self.save_and_sync(definition, sync).await
    }

    async fn save_and_sync(
        &self,
        definition: &AutomationCompositionDefinition,
        sync: &mut UpdateSync,
    ) -> Result<()> {
        if sync.updated {
            self.ctx.store.update_definition_state(definition).await?;
        }
        if sync.to_be_sync {
            self.ctx.publisher.send_definition_sync(definition).await?;
        }
        *sync = UpdateSync::default();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::OperationTimeouts;
    use crate::store::InstanceStore;
    use crate::supervision::testing::{Harness, harness};
    use acm_models::{ParticipantMessage, ParticipantMessageType, ToscaConceptIdentifier};
    use serde_json::json;
    use uuid::Uuid;

    async fn priming(h: &Harness) -> AutomationCompositionDefinition {
        let mut definition = h.definition.clone();
        definition.set_cascaded_state(AcTypeState::Priming);
        h.store.update_definition_state(&definition).await.unwrap();
        definition
    }

    fn prime_ack(definition: &AutomationCompositionDefinition, participant: Uuid) -> DocMessage {
        let mut message = DocMessage::new(ParticipantMessageType::ParticipantPrimeAck, participant);
        message.composition_id = Some(definition.composition_id);
        message.composition_state = Some(AcTypeState::Primed);
        message
    }

    #[tokio::test]
    async fn test_prime_completes_after_all_acks() {
        let h = harness(OperationTimeouts::default()).await;
        let scanner = AcDefinitionScanner::new(h.ctx.clone());
        let mut definition = priming(&h).await;

        let message = prime_ack(&definition, h.p1);
        let mut sync = scanner.scan_message(&mut definition, &message);
        assert_eq!(sync, UpdateSync::updated());
        scanner.scan(&mut definition, &mut sync).await.unwrap();
        assert_eq!(definition.state, AcTypeState::Priming);
        assert!(h.recorder.messages().await.is_empty());

        let message = prime_ack(&definition, h.p2);
        let mut sync = scanner.scan_message(&mut definition, &message);
        scanner.scan(&mut definition, &mut sync).await.unwrap();

        let stored = h
            .store
            .get_definition(definition.composition_id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(stored.state, AcTypeState::Primed);
        assert_eq!(stored.state_change_result, StateChangeResult::NoError);
        assert_eq!(
            h.recorder
                .of_type(ParticipantMessageType::ParticipantSync)
                .await
                .len(),
            2
        );
    }

    #[tokio::test]
    async fn test_failed_prime_ack() {
        let h = harness(OperationTimeouts::default()).await;
        let scanner = AcDefinitionScanner::new(h.ctx.clone());
        let mut definition = priming(&h).await;

        let mut message = prime_ack(&definition, h.p1);
        message.composition_state = Some(AcTypeState::Commissioned);
        message.state_change_result = StateChangeResult::Failed;

        let mut sync = scanner.scan_message(&mut definition, &message);
        assert_eq!(sync, UpdateSync::updated_and_sync());
        scanner.scan(&mut definition, &mut sync).await.unwrap();

        let stored = h
            .store
            .get_definition(definition.composition_id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(stored.state_change_result, StateChangeResult::Failed);
        assert_eq!(stored.state, AcTypeState::Priming);
    }

    #[tokio::test]
    async fn test_ack_from_unknown_participant_is_dropped() {
        let h = harness(OperationTimeouts::default()).await;
        let scanner = AcDefinitionScanner::new(h.ctx.clone());
        let mut definition = priming(&h).await;
        let before = definition.clone();

        let message = prime_ack(&definition, Uuid::new_v4());
        let sync = scanner.scan_message(&mut definition, &message);

        assert!(!sync.is_pending());
        assert_eq!(definition, before);
    }

    #[tokio::test]
    async fn test_status_merges_node_template_out_properties() {
        let h = harness(OperationTimeouts::default()).await;
        let scanner = AcDefinitionScanner::new(h.ctx.clone());
        let mut definition = h.definition.clone();

        let mut message = DocMessage::new(ParticipantMessageType::ParticipantStatus, h.p2);
        message.composition_id = Some(definition.composition_id);
        message.ac_element_definition_id = Some(ToscaConceptIdentifier::new("b", "1.0.0"));
        message.out_properties = json!({"endpoint": "http://b"}).as_object().cloned();

        let sync = scanner.scan_message(&mut definition, &message);

        assert_eq!(sync, UpdateSync::updated_and_sync());
        assert_eq!(
            definition.element_state_map["b"].out_properties["endpoint"],
            json!("http://b")
        );

        // same node template, wrong participant
        message.participant_id = h.p1;
        assert!(!scanner.scan_message(&mut definition, &message).is_pending());
    }

    #[tokio::test]
    async fn test_prime_timeout_is_sticky() {
        let h = harness(OperationTimeouts::uniform(-1)).await;
        let scanner = AcDefinitionScanner::new(h.ctx.clone());
        let mut definition = priming(&h).await;

        let mut sync = UpdateSync::default();
        scanner.scan(&mut definition, &mut sync).await.unwrap();
        assert_eq!(definition.state_change_result, StateChangeResult::Timeout);
        let messages = h.recorder.take().await;
        assert_eq!(messages.len(), 2);
        assert!(messages.iter().all(|m| matches!(
            m,
            ParticipantMessage::ParticipantSync(payload) if payload.state == AcTypeState::Priming
        )));

        scanner.scan(&mut definition, &mut sync).await.unwrap();
        assert!(h.recorder.messages().await.is_empty());
    }
}
