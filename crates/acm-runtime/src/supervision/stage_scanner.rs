// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Stage-ordered transitions: migrate, migration revert and prepare.
//!
//! Each element declares the stages it takes part in (`stage.migrate`,
//! `stage.prepare`). Elements move through their own stage sets
//! independently. The instance `phase` is the stage last commanded. A new
//! stage is only commanded once no in-flight element is still executing a
//! stage at or below it.
//!
//! | Element                  | Effective stage                    |
//! |--------------------------|------------------------------------|
//! | in flight, acked a stage | the acked stage                    |
//! | in flight, no ack yet    | first stage of its own set         |
//! | done                     | not counted                        |
//! | removed by migration     | dropped from the instance          |

use std::collections::BTreeSet;

use acm_models::stage_utils::{self, StageEpisode};
use acm_models::{
    AutomationComposition, AutomationCompositionDefinition, DeployState, StateChangeResult,
};
use chrono::Utc;
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::{ScanContext, UpdateSync};
use crate::batcher;
use crate::error::Result;

/// Scanner for stage-ordered transitions.
#[derive(Clone)]
pub struct StageScanner {
    ctx: ScanContext,
}

impl StageScanner {
    /// Create a scanner over `ctx`.
    pub fn new(ctx: ScanContext) -> Self {
        Self { ctx }
    }

    /// Advance, complete or time out a stage-ordered transition.
    ///
    /// `definition` is the definition the instance currently references;
    /// `target` the one a forward migration is moving to.
    pub async fn scan_stage(
        &self,
        ac: &mut AutomationComposition,
        definition: &AutomationCompositionDefinition,
        target: Option<&AutomationCompositionDefinition>,
        sync: &mut UpdateSync,
    ) -> Result<()> {
        let migrating = ac.deploy_state == DeployState::Migrating;
        let stage_definition = match (migrating, target) {
            (true, Some(target)) => target,
            (true, None) => {
                warn!(
                    instance_id = %ac.instance_id,
                    composition_target_id = ?ac.composition_target_id,
                    "Migration target definition not found; using current definition"
                );
                definition
            }
            (false, _) => definition,
        };
        let episode = stage_utils::episode_of(ac);

        self.drop_removed_elements(ac, sync).await?;

        let pending: BTreeSet<i32> = ac
            .elements
            .iter()
            .filter(|element| element.is_in_transition())
            .map(|element| batcher::element_current_stage(element, stage_definition, episode))
            .collect();

        let Some(&lowest) = pending.first() else {
            return self.ctx.complete(ac, stage_definition, sync).await;
        };

        let next = match ac.phase {
            None => Some(lowest),
            Some(current) if lowest > current => stage_utils::next_stage(current, &pending),
            Some(_) => None,
        };

        let Some(next) = next.filter(|_| ac.state_change_result != StateChangeResult::Timeout)
        else {
            debug!(
                instance_id = %ac.instance_id,
                stage = ?ac.phase,
                "Stage still in flight"
            );
            return self.ctx.handle_timeout(ac, definition, sync).await;
        };

        ac.phase = Some(next);
        ac.last_msg = Utc::now();
        sync.updated = true;
        info!(
            instance_id = %ac.instance_id,
            deploy_state = %ac.deploy_state,
            sub_state = %ac.sub_state,
            stage = next,
            "Moving to next stage"
        );
        self.ctx.save_and_sync(ac, definition, sync).await?;

        match episode {
            StageEpisode::Migrate => {
                self.ctx
                    .publisher
                    .send_migrate_command(ac, stage_definition, next)
                    .await?
            }
            StageEpisode::Prepare => {
                self.ctx
                    .publisher
                    .send_prepare_command(ac, definition, next, true)
                    .await?
            }
        }
        Ok(())
    }

    /// Remove elements a migration deleted, telling participants left without any element.
    async fn drop_removed_elements(
        &self,
        ac: &mut AutomationComposition,
        sync: &mut UpdateSync,
    ) -> Result<()> {
        let removed: Vec<(Uuid, Uuid)> = ac
            .elements
            .iter()
            .filter(|element| element.deploy_state == DeployState::Deleted)
            .map(|element| (element.id, element.participant_id))
            .collect();
        if removed.is_empty() {
            return Ok(());
        }

        for (element_id, _) in &removed {
            ac.remove_element(*element_id);
            self.ctx
                .store
                .delete_element(ac.instance_id, *element_id)
                .await?;
            info!(instance_id = %ac.instance_id, %element_id, "Removed migrated-out element");
        }
        sync.updated = true;

        let participants: BTreeSet<Uuid> = removed.iter().map(|(_, p)| *p).collect();
        for participant_id in participants {
            if ac
                .elements
                .iter()
                .all(|element| element.participant_id != participant_id)
            {
                self.ctx
                    .publisher
                    .send_delete_sync(ac, participant_id)
                    .await?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::OperationTimeouts;
    use crate::store::InstanceStore;
    use crate::supervision::testing::{self, harness};
    use acm_models::messages::MigrateCommand;
    use acm_models::state_utils;
    use acm_models::{
        LockState, MigrationState, ParticipantMessage, ParticipantMessageType, SubState,
    };

    fn migrate_command(message: &ParticipantMessage) -> &MigrateCommand {
        match message {
            ParticipantMessage::AutomationCompositionMigration(command) => command,
            other => panic!("unexpected message {other:?}"),
        }
    }

    async fn migrating(
        h: &testing::Harness,
    ) -> (AutomationComposition, AutomationCompositionDefinition) {
        let target = testing::definition(h.p1, h.p2);
        h.store.save_definition(&target).await.unwrap();
        let mut ac = h.stored_instance(DeployState::Deployed, LockState::Locked).await;
        ac.composition_target_id = Some(target.composition_id);
        state_utils::set_cascaded_state(
            &mut ac,
            DeployState::Migrating,
            LockState::Locked,
            SubState::None,
        );
        ac.phase = Some(0);
        h.store.update_instance(&ac).await.unwrap();
        (ac, target)
    }

    #[tokio::test]
    async fn test_stage_in_flight_sends_nothing() {
        let h = harness(OperationTimeouts::default()).await;
        let scanner = StageScanner::new(h.ctx.clone());
        let (mut ac, target) = migrating(&h).await;
        // "a" acked stage 0 and is still executing it
        ac.elements[0].stage = Some(0);

        let mut sync = UpdateSync::default();
        scanner
            .scan_stage(&mut ac, &h.definition, Some(&target), &mut sync)
            .await
            .unwrap();

        assert!(h.recorder.messages().await.is_empty());
        assert_eq!(h.reload(&ac).await.unwrap().phase, Some(0));
    }

    #[tokio::test]
    async fn test_moves_to_lowest_pending_stage() {
        let h = harness(OperationTimeouts::default()).await;
        let scanner = StageScanner::new(h.ctx.clone());
        let (mut ac, target) = migrating(&h).await;
        // "a" finished stage 0 and moves on to 2; "b" runs stage 1 only
        ac.elements[0].stage = Some(2);

        let mut sync = UpdateSync::updated();
        scanner
            .scan_stage(&mut ac, &h.definition, Some(&target), &mut sync)
            .await
            .unwrap();

        assert_eq!(h.reload(&ac).await.unwrap().phase, Some(1));
        let messages = h.recorder.take().await;
        assert_eq!(messages.len(), 1);
        let command = migrate_command(&messages[0]);
        assert_eq!(command.participant_id, h.p2);
        assert_eq!(command.stage, 1);
        assert_eq!(command.composition_target_id, target.composition_id);
        assert!(!command.rollback);
    }

    #[tokio::test]
    async fn test_completion_switches_definition() {
        let h = harness(OperationTimeouts::default()).await;
        let scanner = StageScanner::new(h.ctx.clone());
        let (mut ac, target) = migrating(&h).await;
        for element in &mut ac.elements {
            element.deploy_state = DeployState::Deployed;
            element.stage = Some(2);
        }

        let mut sync = UpdateSync::updated();
        scanner
            .scan_stage(&mut ac, &h.definition, Some(&target), &mut sync)
            .await
            .unwrap();

        let stored = h.reload(&ac).await.unwrap();
        assert_eq!(stored.deploy_state, DeployState::Deployed);
        assert_eq!(stored.composition_id, target.composition_id);
        assert_eq!(stored.composition_target_id, None);
        assert_eq!(stored.phase, None);
        assert!(stored.elements.iter().all(|e| e.stage.is_none()));
        let syncs = h.recorder.of_type(ParticipantMessageType::ParticipantSync).await;
        assert_eq!(syncs.len(), 2);
    }

    #[tokio::test]
    async fn test_removed_element_is_dropped() {
        let h = harness(OperationTimeouts::default()).await;
        let scanner = StageScanner::new(h.ctx.clone());
        let (mut ac, target) = migrating(&h).await;
        ac.elements[1].migration_state = MigrationState::Removed;
        ac.elements[1].deploy_state = DeployState::Deleted;
        ac.elements[0].stage = Some(0);
        let removed_id = ac.elements[1].id;

        let mut sync = UpdateSync::updated();
        scanner
            .scan_stage(&mut ac, &h.definition, Some(&target), &mut sync)
            .await
            .unwrap();

        let stored = h.reload(&ac).await.unwrap();
        assert!(stored.element(removed_id).is_none());
        assert_eq!(stored.elements.len(), 1);

        let messages = h.recorder.take().await;
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].participant_id(), h.p2);
        assert!(matches!(
            &messages[0],
            ParticipantMessage::ParticipantSync(payload) if payload.delete
        ));
    }

    #[tokio::test]
    async fn test_revert_uses_current_definition() {
        let h = harness(OperationTimeouts::default()).await;
        let scanner = StageScanner::new(h.ctx.clone());
        let (mut ac, target) = migrating(&h).await;
        ac.deploy_state = DeployState::MigrationReverting;
        ac.phase = None;

        let mut sync = UpdateSync::default();
        scanner
            .scan_stage(&mut ac, &h.definition, Some(&target), &mut sync)
            .await
            .unwrap();

        let messages = h.recorder.take().await;
        assert!(!messages.is_empty());
        for message in &messages {
            let command = migrate_command(message);
            assert!(command.rollback);
            assert_eq!(command.stage, 0);
        }
    }

    #[tokio::test]
    async fn test_prepare_walks_prepare_stages() {
        let h = harness(OperationTimeouts::default()).await;
        let scanner = StageScanner::new(h.ctx.clone());
        let mut ac = h.stored_instance(DeployState::Undeployed, LockState::None).await;
        state_utils::set_cascaded_state(
            &mut ac,
            DeployState::Undeployed,
            LockState::None,
            SubState::Preparing,
        );
        ac.phase = Some(0);
        // "a" done with prepare, "b" still at its first prepare stage
        ac.elements[0].sub_state = SubState::None;

        let mut sync = UpdateSync::updated();
        scanner
            .scan_stage(&mut ac, &h.definition, None, &mut sync)
            .await
            .unwrap();

        let messages = h.recorder.take().await;
        assert_eq!(messages.len(), 1);
        match &messages[0] {
            ParticipantMessage::AutomationCompositionPrepare(command) => {
                assert_eq!(command.stage, 1);
                assert!(command.pre_deploy);
                assert_eq!(command.participant_id, h.p2);
            }
            other => panic!("unexpected message {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_migration_timeout() {
        let h = harness(OperationTimeouts::uniform(-1)).await;
        let scanner = StageScanner::new(h.ctx.clone());
        let (mut ac, target) = migrating(&h).await;
        ac.elements[0].stage = Some(0);

        let mut sync = UpdateSync::default();
        scanner
            .scan_stage(&mut ac, &h.definition, Some(&target), &mut sync)
            .await
            .unwrap();

        let stored = h.reload(&ac).await.unwrap();
        assert_eq!(stored.state_change_result, StateChangeResult::Timeout);
        assert_eq!(stored.deploy_state, DeployState::Migrating);
    }
}
