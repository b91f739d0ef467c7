// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Participant messages against instances, and unordered transitions.
//!
//! Applies element status reports and acknowledgements to an instance, and
//! drives the transitions that fan out to every element at once (update,
//! migration precheck, review): complete when no element is left in a
//! transitional state, otherwise check the timeout.

use acm_models::properties;
use acm_models::{
    AutomationComposition, AutomationCompositionDefinition, DocMessage, ParticipantMessageType,
    StateChangeResult, SubState,
};
use tracing::{debug, warn};

use super::{ScanContext, UpdateSync};
use crate::error::Result;

/// Applies participant messages and scans phase-less transitions.
#[derive(Clone)]
pub struct SimpleScanner {
    ctx: ScanContext,
}

impl SimpleScanner {
    /// Create a scanner over `ctx`.
    pub fn new(ctx: ScanContext) -> Self {
        Self { ctx }
    }

    /// Apply one participant message to `ac`.
    ///
    /// Messages for another instance, unknown elements or elements owned by a
    /// different participant are dropped with nothing owed.
    pub fn scan_message(&self, ac: &mut AutomationComposition, message: &DocMessage) -> UpdateSync {
        if message.instance_id != Some(ac.instance_id) {
            debug!(
                instance_id = %ac.instance_id,
                message_instance_id = ?message.instance_id,
                "Message is for another instance; ignored"
            );
            return UpdateSync::default();
        }
        let Some(element_id) = message.instance_element_id else {
            debug!(instance_id = %ac.instance_id, "Message has no element id; ignored");
            return UpdateSync::default();
        };

        match message.message_type {
            ParticipantMessageType::ParticipantStatus => {
                let Some(element) = ac.element_mut(element_id) else {
                    warn!(instance_id = %ac.instance_id, %element_id, "Status for unknown element");
                    return UpdateSync::default();
                };
                if let Some(out_properties) = &message.out_properties {
                    properties::recursive_merge(&mut element.out_properties, out_properties);
                }
                if message.operational_state.is_some() {
                    element.operational_state = message.operational_state.clone();
                }
                if message.use_state.is_some() {
                    element.use_state = message.use_state.clone();
                }
                UpdateSync::updated_and_sync()
            }
            ParticipantMessageType::AutomationCompositionDeployAck
            | ParticipantMessageType::AutomationCompositionStatechangeAck => {
                let instance_id = ac.instance_id;
                let instance_in_transition = ac.is_in_transition();
                let Some(element) = ac.element_mut(element_id) else {
                    warn!(%instance_id, %element_id, "Acknowledgement for unknown element");
                    return UpdateSync::default();
                };
                if element.participant_id != message.participant_id {
                    warn!(
                        %instance_id,
                        %element_id,
                        participant_id = %message.participant_id,
                        "Acknowledgement from a participant that does not own the element"
                    );
                    return UpdateSync::default();
                }
                if !instance_in_transition || !element.is_in_transition() {
                    debug!(
                        %instance_id,
                        %element_id,
                        deploy_state = %element.deploy_state,
                        lock_state = %element.lock_state,
                        "Acknowledgement outside a running transition; ignored"
                    );
                    return UpdateSync::default();
                }

                // Stage only moves forward within a transition
                if element.sub_state != SubState::None {
                    match message.stage {
                        Some(stage) if element.sub_state == SubState::Preparing => {
                            element.stage = element.stage.max(Some(stage));
                        }
                        _ => element.sub_state = SubState::None,
                    }
                } else {
                    if let Some(deploy_state) = message.deploy_state {
                        element.deploy_state = deploy_state;
                    }
                    if let Some(lock_state) = message.lock_state {
                        element.lock_state = lock_state;
                    }
                    if message.stage.is_some() {
                        element.stage = element.stage.max(message.stage);
                    }
                }
                element.message = message.message.clone();

                let mut sync = UpdateSync::updated();
                if message.state_change_result == StateChangeResult::Failed {
                    warn!(
                        %instance_id,
                        %element_id,
                        message = ?message.message,
                        "Participant reported a failed state change"
                    );
                    ac.state_change_result = StateChangeResult::Failed;
                    sync.to_be_sync = true;
                }
                sync
            }
            other => {
                debug!(message_type = %other, "Message type not handled by instance scan");
                UpdateSync::default()
            }
        }
    }

    /// Complete the transition if no element is still moving, otherwise check the timeout.
    pub async fn simple_scan(
        &self,
        ac: &mut AutomationComposition,
        definition: &AutomationCompositionDefinition,
        sync: &mut UpdateSync,
    ) -> Result<()> {
        let completed = ac.elements.iter().all(|element| !element.is_in_transition());
        if completed {
            self.ctx.complete(ac, definition, sync).await
        } else {
            self.ctx.handle_timeout(ac, definition, sync).await
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::OperationTimeouts;
    use crate::supervision::testing::harness;
    use acm_models::{DeployState, LockState, ParticipantMessageType};
    use serde_json::json;
    use uuid::Uuid;

    #[tokio::test]
    async fn test_status_merges_out_properties() {
        let h = harness(OperationTimeouts::default()).await;
        let scanner = SimpleScanner::new(h.ctx.clone());
        let mut ac = h.stored_instance(DeployState::Deployed, LockState::Locked).await;
        let element_id = ac.elements[0].id;
        ac.elements[0]
            .out_properties
            .insert("status".to_string(), json!({"a": 1}));

        let mut message = DocMessage::new(ParticipantMessageType::ParticipantStatus, h.p1);
        message.instance_id = Some(ac.instance_id);
        message.instance_element_id = Some(element_id);
        message.operational_state = Some("ENABLED".to_string());
        message.out_properties = json!({"status": {"b": 2}}).as_object().cloned();

        let sync = scanner.scan_message(&mut ac, &message);

        assert_eq!(sync, UpdateSync::updated_and_sync());
        let element = ac.element(element_id).unwrap();
        assert_eq!(element.out_properties["status"], json!({"a": 1, "b": 2}));
        assert_eq!(element.operational_state.as_deref(), Some("ENABLED"));
    }

    #[tokio::test]
    async fn test_ack_updates_element_state() {
        let h = harness(OperationTimeouts::default()).await;
        let scanner = SimpleScanner::new(h.ctx.clone());
        let mut ac = h.stored_instance(DeployState::Deploying, LockState::None).await;
        let element_id = ac.elements[0].id;

        let message = DocMessage::element_ack(
            ParticipantMessageType::AutomationCompositionDeployAck,
            h.p1,
            ac.instance_id,
            element_id,
            DeployState::Deployed,
            LockState::Locked,
        );
        let sync = scanner.scan_message(&mut ac, &message);

        assert_eq!(sync, UpdateSync::updated());
        let element = ac.element(element_id).unwrap();
        assert_eq!(element.deploy_state, DeployState::Deployed);
        assert_eq!(element.lock_state, LockState::Locked);
        assert_eq!(ac.state_change_result, StateChangeResult::NoError);
    }

    #[tokio::test]
    async fn test_ack_on_steady_instance_is_dropped() {
        let h = harness(OperationTimeouts::default()).await;
        let scanner = SimpleScanner::new(h.ctx.clone());
        let mut ac = h.stored_instance(DeployState::Deployed, LockState::Locked).await;
        let before = ac.clone();

        let mut message = DocMessage::element_ack(
            ParticipantMessageType::AutomationCompositionDeployAck,
            h.p1,
            ac.instance_id,
            ac.elements[0].id,
            DeployState::Migrating,
            LockState::Locked,
        );
        message.stage = Some(2);
        let sync = scanner.scan_message(&mut ac, &message);

        assert!(!sync.is_pending());
        assert_eq!(ac, before);
        assert_eq!(ac.elements[0].deploy_state, DeployState::Deployed);
        assert_eq!(ac.elements[0].stage, None);
    }

    #[tokio::test]
    async fn test_ack_for_settled_element_is_dropped() {
        let h = harness(OperationTimeouts::default()).await;
        let scanner = SimpleScanner::new(h.ctx.clone());
        let mut ac = h.stored_instance(DeployState::Deploying, LockState::None).await;
        ac.elements[0].deploy_state = DeployState::Deployed;
        ac.elements[0].lock_state = LockState::Locked;
        let before = ac.clone();

        let message = DocMessage::element_ack(
            ParticipantMessageType::AutomationCompositionDeployAck,
            h.p1,
            ac.instance_id,
            ac.elements[0].id,
            DeployState::Undeploying,
            LockState::None,
        );
        let sync = scanner.scan_message(&mut ac, &message);

        assert!(!sync.is_pending());
        assert_eq!(ac, before);
    }

    #[tokio::test]
    async fn test_stale_stage_ack_does_not_move_stage_back() {
        let h = harness(OperationTimeouts::default()).await;
        let scanner = SimpleScanner::new(h.ctx.clone());
        let mut ac = h.stored_instance(DeployState::Migrating, LockState::Locked).await;
        let (instance_id, element_id) = (ac.instance_id, ac.elements[0].id);

        let ack = |stage| {
            let mut message = DocMessage::element_ack(
                ParticipantMessageType::AutomationCompositionDeployAck,
                h.p1,
                instance_id,
                element_id,
                DeployState::Migrating,
                LockState::Locked,
            );
            message.stage = Some(stage);
            message
        };
        let (current, stale) = (ack(2), ack(0));

        scanner.scan_message(&mut ac, &current);
        assert_eq!(ac.element(element_id).unwrap().stage, Some(2));

        scanner.scan_message(&mut ac, &stale);
        let element = ac.element(element_id).unwrap();
        assert_eq!(element.stage, Some(2));
        assert_eq!(element.deploy_state, DeployState::Migrating);
    }

    #[tokio::test]
    async fn test_prepare_ack_keeps_highest_stage() {
        let h = harness(OperationTimeouts::default()).await;
        let scanner = SimpleScanner::new(h.ctx.clone());
        let mut ac = h.stored_instance(DeployState::Undeployed, LockState::None).await;
        ac.sub_state = SubState::Preparing;
        for element in &mut ac.elements {
            element.sub_state = SubState::Preparing;
        }
        let element_id = ac.elements[0].id;

        for stage in [1, 0] {
            let mut message = DocMessage::element_ack(
                ParticipantMessageType::AutomationCompositionStatechangeAck,
                h.p1,
                ac.instance_id,
                element_id,
                DeployState::Undeployed,
                LockState::None,
            );
            message.stage = Some(stage);
            scanner.scan_message(&mut ac, &message);
        }

        let element = ac.element(element_id).unwrap();
        assert_eq!(element.stage, Some(1));
        assert_eq!(element.sub_state, SubState::Preparing);
    }

    #[tokio::test]
    async fn test_repeated_status_is_idempotent() {
        let h = harness(OperationTimeouts::default()).await;
        let scanner = SimpleScanner::new(h.ctx.clone());
        let mut ac = h.stored_instance(DeployState::Deployed, LockState::Locked).await;
        ac.elements[0]
            .out_properties
            .insert("status".to_string(), json!({"a": 1, "items": [1, 2, 3]}));

        let mut message = DocMessage::new(ParticipantMessageType::ParticipantStatus, h.p1);
        message.instance_id = Some(ac.instance_id);
        message.instance_element_id = Some(ac.elements[0].id);
        message.use_state = Some("IDLE".to_string());
        message.out_properties = json!({"status": {"b": {"c": 2}, "items": [4, 5]}})
            .as_object()
            .cloned();

        scanner.scan_message(&mut ac, &message);
        let once = ac.clone();
        scanner.scan_message(&mut ac, &message);

        assert_eq!(ac, once);
        assert_eq!(
            ac.elements[0].out_properties["status"],
            json!({"a": 1, "b": {"c": 2}, "items": [4, 5, 3]})
        );
    }

    #[tokio::test]
    async fn test_repeated_deploy_ack_is_idempotent() {
        let h = harness(OperationTimeouts::default()).await;
        let scanner = SimpleScanner::new(h.ctx.clone());
        let mut ac = h.stored_instance(DeployState::Deploying, LockState::None).await;

        let message = DocMessage::element_ack(
            ParticipantMessageType::AutomationCompositionDeployAck,
            h.p1,
            ac.instance_id,
            ac.elements[0].id,
            DeployState::Deployed,
            LockState::Locked,
        );

        let first = scanner.scan_message(&mut ac, &message);
        let once = ac.clone();
        let second = scanner.scan_message(&mut ac, &message);

        assert!(first.is_pending());
        assert!(!second.is_pending());
        assert_eq!(ac, once);
        assert_eq!(ac.elements[0].deploy_state, DeployState::Deployed);
    }

    #[tokio::test]
    async fn test_repeated_stage_ack_is_idempotent() {
        let h = harness(OperationTimeouts::default()).await;
        let scanner = SimpleScanner::new(h.ctx.clone());
        let mut ac = h.stored_instance(DeployState::Migrating, LockState::Locked).await;

        let mut message = DocMessage::element_ack(
            ParticipantMessageType::AutomationCompositionDeployAck,
            h.p1,
            ac.instance_id,
            ac.elements[0].id,
            DeployState::Migrating,
            LockState::Locked,
        );
        message.stage = Some(2);

        scanner.scan_message(&mut ac, &message);
        let once = ac.clone();
        scanner.scan_message(&mut ac, &message);

        assert_eq!(ac, once);
    }

    #[tokio::test]
    async fn test_failed_ack_marks_instance_failed() {
        let h = harness(OperationTimeouts::default()).await;
        let scanner = SimpleScanner::new(h.ctx.clone());
        let mut ac = h.stored_instance(DeployState::Deploying, LockState::None).await;

        let mut message = DocMessage::element_ack(
            ParticipantMessageType::AutomationCompositionDeployAck,
            h.p1,
            ac.instance_id,
            ac.elements[0].id,
            DeployState::Deploying,
            LockState::None,
        );
        message.state_change_result = StateChangeResult::Failed;
        message.message = Some("boom".to_string());

        let sync = scanner.scan_message(&mut ac, &message);

        assert_eq!(sync, UpdateSync::updated_and_sync());
        assert_eq!(ac.state_change_result, StateChangeResult::Failed);
        assert_eq!(ac.elements[0].message.as_deref(), Some("boom"));
    }

    #[tokio::test]
    async fn test_mismatched_messages_are_dropped() {
        let h = harness(OperationTimeouts::default()).await;
        let scanner = SimpleScanner::new(h.ctx.clone());
        let mut ac = h.stored_instance(DeployState::Deploying, LockState::None).await;
        let before = ac.clone();

        // another instance
        let message = DocMessage::element_ack(
            ParticipantMessageType::AutomationCompositionDeployAck,
            h.p1,
            Uuid::new_v4(),
            ac.elements[0].id,
            DeployState::Deployed,
            LockState::Locked,
        );
        assert!(!scanner.scan_message(&mut ac, &message).is_pending());

        // unknown element
        let message = DocMessage::element_ack(
            ParticipantMessageType::AutomationCompositionDeployAck,
            h.p1,
            ac.instance_id,
            Uuid::new_v4(),
            DeployState::Deployed,
            LockState::Locked,
        );
        assert!(!scanner.scan_message(&mut ac, &message).is_pending());

        // element owned by p1, ack from p2
        let message = DocMessage::element_ack(
            ParticipantMessageType::AutomationCompositionDeployAck,
            h.p2,
            ac.instance_id,
            ac.elements[0].id,
            DeployState::Deployed,
            LockState::Locked,
        );
        assert!(!scanner.scan_message(&mut ac, &message).is_pending());

        assert_eq!(ac, before);
    }

    #[tokio::test]
    async fn test_ack_during_review_clears_sub_state() {
        let h = harness(OperationTimeouts::default()).await;
        let scanner = SimpleScanner::new(h.ctx.clone());
        let mut ac = h.stored_instance(DeployState::Deployed, LockState::Locked).await;
        ac.sub_state = SubState::Reviewing;
        for element in &mut ac.elements {
            element.sub_state = SubState::Reviewing;
        }

        for (index, participant) in [(0, h.p1), (1, h.p2)] {
            let message = DocMessage::element_ack(
                ParticipantMessageType::AutomationCompositionDeployAck,
                participant,
                ac.instance_id,
                ac.elements[index].id,
                DeployState::Deployed,
                LockState::Locked,
            );
            scanner.scan_message(&mut ac, &message);
        }
        assert!(ac.elements.iter().all(|e| e.sub_state == SubState::None));

        let mut sync = UpdateSync::updated();
        scanner
            .simple_scan(&mut ac, &h.definition, &mut sync)
            .await
            .unwrap();

        let stored = h.reload(&ac).await.unwrap();
        assert_eq!(stored.sub_state, SubState::None);
        assert_eq!(stored.deploy_state, DeployState::Deployed);
        assert_eq!(h.recorder.messages().await.len(), 2);
    }

    #[tokio::test]
    async fn test_update_times_out() {
        let h = harness(OperationTimeouts::uniform(-1)).await;
        let scanner = SimpleScanner::new(h.ctx.clone());
        let mut ac = h.stored_instance(DeployState::Updating, LockState::Locked).await;

        let mut sync = UpdateSync::default();
        scanner
            .simple_scan(&mut ac, &h.definition, &mut sync)
            .await
            .unwrap();

        let stored = h.reload(&ac).await.unwrap();
        assert_eq!(stored.state_change_result, StateChangeResult::Timeout);
        assert_eq!(stored.deploy_state, DeployState::Updating);
        assert!(!sync.is_pending());
    }
}
