// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Transition entry points.
//!
//! Each operation checks the current state, cascades the transitional state
//! onto every element, seeds the first phase or stage, persists, and sends
//! the first command. From then on the scanners drive the transition.
//!
//! An operation is refused while the record is mid-transition, unless the
//! running transition ended FAILED or TIMEOUT and the caller retries the same
//! operation.
//!
//! | Operation            | From                 | Transitional state        | Ordered by |
//! |----------------------|----------------------|---------------------------|------------|
//! | `deploy`             | UNDEPLOYED           | DEPLOYING                 | phase      |
//! | `undeploy`           | DEPLOYED             | UNDEPLOYING               | phase      |
//! | `lock`               | DEPLOYED / UNLOCKED  | LOCKING                   | phase      |
//! | `unlock`             | DEPLOYED / LOCKED    | UNLOCKING                 | phase      |
//! | `delete`             | UNDEPLOYED           | DELETING                  | phase      |
//! | `update`             | DEPLOYED             | UPDATING                  | none       |
//! | `migrate`            | DEPLOYED / LOCKED    | MIGRATING                 | stage      |
//! | `revert_migration`   | MIGRATING, failed    | MIGRATION_REVERTING       | stage      |
//! | `migration_precheck` | DEPLOYED             | MIGRATION_PRECHECKING     | none       |
//! | `prepare`            | UNDEPLOYED           | PREPARING                 | stage      |
//! | `review`             | DEPLOYED             | REVIEWING                 | none       |
//! | `prime`              | COMMISSIONED         | PRIMING                   | none       |
//! | `deprime`            | PRIMED               | DEPRIMING                 | none       |

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use acm_models::properties;
use acm_models::stage_utils;
use acm_models::state_utils;
use acm_models::{
    AcTypeState, AutomationComposition, AutomationCompositionDefinition,
    AutomationCompositionElement, DeployState, LockState, MigrationState, StateChangeResult,
    SubState,
};
use serde_json::{Map, Value};
use tracing::info;
use uuid::Uuid;

use crate::error::{Error, Result};
use crate::locks::KeyedLocks;
use crate::publisher::SupervisionPublisher;
use crate::store::InstanceStore;

fn is_failed(result: StateChangeResult) -> bool {
    matches!(
        result,
        StateChangeResult::Failed | StateChangeResult::Timeout
    )
}

/// Refuse `operation` unless the instance is at rest in an allowed state, or the same
/// operation ended FAILED or TIMEOUT and is being retried.
fn check_instance(
    ac: &AutomationComposition,
    operation: &str,
    allowed: bool,
    retrying: bool,
) -> Result<()> {
    if allowed && !ac.is_in_transition() {
        return Ok(());
    }
    if retrying && is_failed(ac.state_change_result) {
        return Ok(());
    }
    Err(Error::InvalidState(format!(
        "{operation} not allowed for automation composition {} in {}/{}/{} ({})",
        ac.instance_id, ac.deploy_state, ac.lock_state, ac.sub_state, ac.state_change_result
    )))
}

fn require_primed(definition: &AutomationCompositionDefinition) -> Result<()> {
    if definition.state == AcTypeState::Primed {
        Ok(())
    } else {
        Err(Error::InvalidState(format!(
            "composition definition {} is {}, not PRIMED",
            definition.composition_id, definition.state
        )))
    }
}

/// Starts transitions on instances and definitions.
pub struct TransitionService {
    store: Arc<dyn InstanceStore>,
    publisher: SupervisionPublisher,
    locks: Arc<KeyedLocks>,
}

impl TransitionService {
    /// Create a service sharing `locks` with the scanners.
    pub fn new(
        store: Arc<dyn InstanceStore>,
        publisher: SupervisionPublisher,
        locks: Arc<KeyedLocks>,
    ) -> Self {
        Self {
            store,
            publisher,
            locks,
        }
    }

    async fn load_instance(&self, instance_id: Uuid) -> Result<AutomationComposition> {
        self.store
            .get_instance(instance_id)
            .await?
            .ok_or(Error::InstanceNotFound(instance_id))
    }

    async fn load_definition(&self, composition_id: Uuid) -> Result<AutomationCompositionDefinition> {
        self.store
            .get_definition(composition_id)
            .await?
            .ok_or(Error::DefinitionNotFound(composition_id))
    }

    /// Cascade the states, seed the first start phase and persist.
    async fn start_phased(
        &self,
        mut ac: AutomationComposition,
        definition: &AutomationCompositionDefinition,
        deploy: DeployState,
        lock: LockState,
    ) -> Result<(AutomationComposition, i32)> {
        state_utils::set_cascaded_state(&mut ac, deploy, lock, SubState::None);
        ac.state_change_result = StateChangeResult::NoError;
        let phase = stage_utils::first_start_phase(&ac, definition);
        ac.phase = Some(phase);
        let ac = self.store.update_instance(&ac).await?;
        info!(
            instance_id = %ac.instance_id,
            deploy_state = %ac.deploy_state,
            lock_state = %ac.lock_state,
            phase,
            "Automation composition transition started"
        );
        Ok((ac, phase))
    }

    /// Deploy an undeployed instance.
    pub async fn deploy(&self, instance_id: Uuid) -> Result<AutomationComposition> {
        let _guard = self.locks.lock(instance_id).await;
        let ac = self.load_instance(instance_id).await?;
        let definition = self.load_definition(ac.composition_id).await?;
        require_primed(&definition)?;
        check_instance(
            &ac,
            "deploy",
            ac.deploy_state == DeployState::Undeployed,
            ac.deploy_state == DeployState::Deploying,
        )?;

        let (ac, phase) = self
            .start_phased(ac, &definition, DeployState::Deploying, LockState::None)
            .await?;
        self.publisher
            .send_deploy_command(&ac, &definition, phase, true)
            .await?;
        Ok(ac)
    }

    /// Undeploy a deployed instance.
    ///
    /// Also accepted as a rollback of a deploy that ended FAILED or TIMEOUT.
    pub async fn undeploy(&self, instance_id: Uuid) -> Result<AutomationComposition> {
        let _guard = self.locks.lock(instance_id).await;
        let ac = self.load_instance(instance_id).await?;
        let definition = self.load_definition(ac.composition_id).await?;
        check_instance(
            &ac,
            "undeploy",
            ac.deploy_state == DeployState::Deployed,
            matches!(
                ac.deploy_state,
                DeployState::Undeploying | DeployState::Deploying
            ),
        )?;

        let lock = ac.lock_state;
        let (ac, phase) = self
            .start_phased(ac, &definition, DeployState::Undeploying, lock)
            .await?;
        self.publisher
            .send_state_change_command(&ac, &definition, phase, true)
            .await?;
        Ok(ac)
    }

    /// Lock an unlocked, deployed instance.
    pub async fn lock(&self, instance_id: Uuid) -> Result<AutomationComposition> {
        let _guard = self.locks.lock(instance_id).await;
        let ac = self.load_instance(instance_id).await?;
        let definition = self.load_definition(ac.composition_id).await?;
        check_instance(
            &ac,
            "lock",
            ac.deploy_state == DeployState::Deployed && ac.lock_state == LockState::Unlocked,
            ac.lock_state == LockState::Locking,
        )?;

        let (ac, phase) = self
            .start_phased(ac, &definition, DeployState::Deployed, LockState::Locking)
            .await?;
        self.publisher
            .send_state_change_command(&ac, &definition, phase, true)
            .await?;
        Ok(ac)
    }

    /// Unlock a locked, deployed instance.
    pub async fn unlock(&self, instance_id: Uuid) -> Result<AutomationComposition> {
        let _guard = self.locks.lock(instance_id).await;
        let ac = self.load_instance(instance_id).await?;
        let definition = self.load_definition(ac.composition_id).await?;
        check_instance(
            &ac,
            "unlock",
            ac.deploy_state == DeployState::Deployed && ac.lock_state == LockState::Locked,
            ac.lock_state == LockState::Unlocking,
        )?;

        let (ac, phase) = self
            .start_phased(ac, &definition, DeployState::Deployed, LockState::Unlocking)
            .await?;
        self.publisher
            .send_state_change_command(&ac, &definition, phase, true)
            .await?;
        Ok(ac)
    }

    /// Delete an undeployed instance. The record is removed once every element acks.
    pub async fn delete(&self, instance_id: Uuid) -> Result<AutomationComposition> {
        let _guard = self.locks.lock(instance_id).await;
        let ac = self.load_instance(instance_id).await?;
        let definition = self.load_definition(ac.composition_id).await?;
        check_instance(
            &ac,
            "delete",
            ac.deploy_state == DeployState::Undeployed,
            ac.deploy_state == DeployState::Deleting,
        )?;

        let (ac, phase) = self
            .start_phased(ac, &definition, DeployState::Deleting, LockState::None)
            .await?;
        self.publisher
            .send_state_change_command(&ac, &definition, phase, true)
            .await?;
        Ok(ac)
    }

    /// Merge new properties into elements.
    ///
    /// A deployed instance moves to UPDATING and every participant receives the
    /// new properties. An undeployed instance only stores them.
    pub async fn update(
        &self,
        instance_id: Uuid,
        element_properties: BTreeMap<Uuid, Map<String, Value>>,
    ) -> Result<AutomationComposition> {
        let _guard = self.locks.lock(instance_id).await;
        let mut ac = self.load_instance(instance_id).await?;
        let definition = self.load_definition(ac.composition_id).await?;
        check_instance(
            &ac,
            "update",
            matches!(
                ac.deploy_state,
                DeployState::Deployed | DeployState::Undeployed
            ),
            ac.deploy_state == DeployState::Updating,
        )?;

        for (element_id, overlay) in &element_properties {
            let element = ac.element_mut(*element_id).ok_or_else(|| {
                Error::InvalidState(format!(
                    "element {element_id} not found in automation composition {instance_id}"
                ))
            })?;
            properties::recursive_merge(&mut element.properties, overlay);
        }

        if ac.deploy_state == DeployState::Undeployed {
            let ac = self.store.update_instance(&ac).await?;
            info!(%instance_id, "Undeployed automation composition properties updated");
            return Ok(ac);
        }

        let lock = ac.lock_state;
        state_utils::set_cascaded_state(&mut ac, DeployState::Updating, lock, SubState::None);
        ac.state_change_result = StateChangeResult::NoError;
        ac.phase = None;
        let ac = self.store.update_instance(&ac).await?;
        info!(%instance_id, "Automation composition update started");
        self.publisher.send_update_command(&ac, &definition).await?;
        Ok(ac)
    }

    /// Migrate a deployed instance to `target_id`.
    ///
    /// Elements whose node template is missing from the target are removed;
    /// `new_elements` are added. Stages are resolved against the target.
    pub async fn migrate(
        &self,
        instance_id: Uuid,
        target_id: Uuid,
        new_elements: Vec<AutomationCompositionElement>,
    ) -> Result<AutomationComposition> {
        let _guard = self.locks.lock(instance_id).await;
        let mut ac = self.load_instance(instance_id).await?;
        let target = self.load_definition(target_id).await?;
        require_primed(&target)?;
        check_instance(
            &ac,
            "migrate",
            ac.deploy_state == DeployState::Deployed && ac.lock_state == LockState::Locked,
            ac.deploy_state == DeployState::Migrating
                && ac.composition_target_id == Some(target_id),
        )?;
        if ac.composition_id == target_id {
            return Err(Error::InvalidState(format!(
                "automation composition {instance_id} already uses {target_id}"
            )));
        }

        let target_names: BTreeSet<&str> = target
            .service_template
            .element_templates()
            .map(|(name, _)| name.as_str())
            .collect();
        for element in &mut ac.elements {
            if element.migration_state == MigrationState::Default
                && !target_names.contains(element.definition.name.as_str())
            {
                element.migration_state = MigrationState::Removed;
            }
        }
        for mut element in new_elements {
            if ac.element(element.id).is_none() {
                element.migration_state = MigrationState::New;
                ac.elements.push(element);
            }
        }

        ac.composition_target_id = Some(target_id);
        let lock = ac.lock_state;
        state_utils::set_cascaded_state(&mut ac, DeployState::Migrating, lock, SubState::None);
        ac.state_change_result = StateChangeResult::NoError;
        let stage = stage_utils::first_stage(&ac, &target);
        ac.phase = Some(stage);
        let ac = self.store.update_instance(&ac).await?;
        info!(%instance_id, %target_id, stage, "Automation composition migration started");
        self.publisher
            .send_migrate_command(&ac, &target, stage)
            .await?;
        Ok(ac)
    }

    /// Roll back a migration that ended FAILED or TIMEOUT.
    ///
    /// Elements the migration added are removed again and removed ones recreated.
    pub async fn revert_migration(&self, instance_id: Uuid) -> Result<AutomationComposition> {
        let _guard = self.locks.lock(instance_id).await;
        let mut ac = self.load_instance(instance_id).await?;
        let definition = self.load_definition(ac.composition_id).await?;
        check_instance(
            &ac,
            "revert migration",
            false,
            matches!(
                ac.deploy_state,
                DeployState::Migrating | DeployState::MigrationReverting
            ),
        )?;

        if ac.deploy_state == DeployState::Migrating {
            for element in &mut ac.elements {
                element.migration_state = match element.migration_state {
                    MigrationState::New => MigrationState::Removed,
                    MigrationState::Removed => MigrationState::New,
                    other => other,
                };
            }
        }

        let lock = ac.lock_state;
        state_utils::set_cascaded_state(
            &mut ac,
            DeployState::MigrationReverting,
            lock,
            SubState::None,
        );
        ac.state_change_result = StateChangeResult::NoError;
        let stage = stage_utils::first_stage(&ac, &definition);
        ac.phase = Some(stage);
        let ac = self.store.update_instance(&ac).await?;
        info!(%instance_id, stage, "Automation composition migration revert started");
        self.publisher
            .send_migrate_command(&ac, &definition, stage)
            .await?;
        Ok(ac)
    }

    /// Ask participants whether a migration to `target_id` would succeed.
    pub async fn migration_precheck(
        &self,
        instance_id: Uuid,
        target_id: Uuid,
    ) -> Result<AutomationComposition> {
        let _guard = self.locks.lock(instance_id).await;
        let mut ac = self.load_instance(instance_id).await?;
        let target = self.load_definition(target_id).await?;
        require_primed(&target)?;
        check_instance(
            &ac,
            "migration precheck",
            ac.deploy_state == DeployState::Deployed,
            ac.sub_state == SubState::MigrationPrechecking,
        )?;

        let (deploy, lock) = (ac.deploy_state, ac.lock_state);
        state_utils::set_cascaded_state(&mut ac, deploy, lock, SubState::MigrationPrechecking);
        ac.state_change_result = StateChangeResult::NoError;
        ac.phase = None;
        let ac = self.store.update_instance(&ac).await?;
        info!(%instance_id, %target_id, "Migration precheck started");
        self.publisher.send_migrate_precheck(&ac, &target).await?;
        Ok(ac)
    }

    /// Run the pre-deploy preparation stages of an undeployed instance.
    pub async fn prepare(&self, instance_id: Uuid) -> Result<AutomationComposition> {
        let _guard = self.locks.lock(instance_id).await;
        let mut ac = self.load_instance(instance_id).await?;
        let definition = self.load_definition(ac.composition_id).await?;
        require_primed(&definition)?;
        check_instance(
            &ac,
            "prepare",
            ac.deploy_state == DeployState::Undeployed,
            ac.sub_state == SubState::Preparing,
        )?;

        state_utils::set_cascaded_state(
            &mut ac,
            DeployState::Undeployed,
            LockState::None,
            SubState::Preparing,
        );
        ac.state_change_result = StateChangeResult::NoError;
        let stage = stage_utils::first_stage(&ac, &definition);
        ac.phase = Some(stage);
        let ac = self.store.update_instance(&ac).await?;
        info!(%instance_id, stage, "Automation composition preparation started");
        self.publisher
            .send_prepare_command(&ac, &definition, stage, true)
            .await?;
        Ok(ac)
    }

    /// Ask every participant to review a deployed instance.
    pub async fn review(&self, instance_id: Uuid) -> Result<AutomationComposition> {
        let _guard = self.locks.lock(instance_id).await;
        let mut ac = self.load_instance(instance_id).await?;
        let definition = self.load_definition(ac.composition_id).await?;
        check_instance(
            &ac,
            "review",
            ac.deploy_state == DeployState::Deployed,
            ac.sub_state == SubState::Reviewing,
        )?;

        let lock = ac.lock_state;
        state_utils::set_cascaded_state(&mut ac, DeployState::Deployed, lock, SubState::Reviewing);
        ac.state_change_result = StateChangeResult::NoError;
        ac.phase = None;
        let ac = self.store.update_instance(&ac).await?;
        info!(%instance_id, "Automation composition review started");
        self.publisher.send_review_command(&ac, &definition).await?;
        Ok(ac)
    }

    /// Prime a commissioned definition on the participants owning its node templates.
    pub async fn prime(&self, composition_id: Uuid) -> Result<AutomationCompositionDefinition> {
        let _guard = self.locks.lock(composition_id).await;
        let mut definition = self.load_definition(composition_id).await?;
        let allowed = definition.state == AcTypeState::Commissioned;
        let retrying = definition.state == AcTypeState::Priming
            && is_failed(definition.state_change_result);
        if !allowed && !retrying {
            return Err(Error::InvalidState(format!(
                "prime not allowed for composition definition {composition_id} in {} ({})",
                definition.state, definition.state_change_result
            )));
        }
        if let Some((name, _)) = definition
            .element_state_map
            .iter()
            .find(|(_, state)| state.participant_id.is_none())
        {
            return Err(Error::InvalidState(format!(
                "node template {name} of composition definition {composition_id} has no participant"
            )));
        }

        definition.set_cascaded_state(AcTypeState::Priming);
        definition.state_change_result = StateChangeResult::NoError;
        self.store.update_definition_state(&definition).await?;
        info!(%composition_id, "Composition definition priming started");
        self.publisher.send_prime_command(&definition).await?;
        Ok(definition)
    }

    /// Deprime a primed definition.
    pub async fn deprime(&self, composition_id: Uuid) -> Result<AutomationCompositionDefinition> {
        let _guard = self.locks.lock(composition_id).await;
        let mut definition = self.load_definition(composition_id).await?;
        let allowed = definition.state == AcTypeState::Primed;
        let retrying = definition.state == AcTypeState::Depriming
            && is_failed(definition.state_change_result);
        if !allowed && !retrying {
            return Err(Error::InvalidState(format!(
                "deprime not allowed for composition definition {composition_id} in {} ({})",
                definition.state, definition.state_change_result
            )));
        }

        definition.set_cascaded_state(AcTypeState::Depriming);
        definition.state_change_result = StateChangeResult::NoError;
        self.store.update_definition_state(&definition).await?;
        info!(%composition_id, "Composition definition depriming started");
        self.publisher.send_deprime_command(&definition).await?;
        Ok(definition)
    }
}
