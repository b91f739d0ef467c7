// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Completion, timeout and flush steps shared by the instance scanners.

use std::sync::Arc;

use acm_models::state::{DeployState, MigrationState, StateChangeResult, SubState};
use acm_models::state_utils;
use acm_models::{AutomationComposition, AutomationCompositionDefinition};
use chrono::{DateTime, Utc};
use tracing::{debug, info, warn};

use super::UpdateSync;
use crate::config::{Operation, OperationTimeouts};
use crate::error::Result;
use crate::publisher::SupervisionPublisher;
use crate::store::InstanceStore;

/// Milliseconds elapsed since `since`.
pub(crate) fn elapsed_ms(since: DateTime<Utc>) -> i64 {
    (Utc::now() - since).num_milliseconds()
}

/// Collaborators every scanner needs.
#[derive(Clone)]
pub struct ScanContext {
    pub(crate) store: Arc<dyn InstanceStore>,
    pub(crate) publisher: SupervisionPublisher,
    pub(crate) timeouts: OperationTimeouts,
}

impl ScanContext {
    /// Bundle a store, a publisher and the timeout table.
    pub fn new(
        store: Arc<dyn InstanceStore>,
        publisher: SupervisionPublisher,
        timeouts: OperationTimeouts,
    ) -> Self {
        Self {
            store,
            publisher,
            timeouts,
        }
    }

    /// Finish the running transition and flush.
    ///
    /// `definition` is the definition the instance references once the transition is
    /// done; it is only used for the sync broadcast.
    pub(crate) async fn complete(
        &self,
        ac: &mut AutomationComposition,
        definition: &AutomationCompositionDefinition,
        sync: &mut UpdateSync,
    ) -> Result<()> {
        let deploy = ac.deploy_state;
        match deploy {
            DeployState::Migrating => {
                if let Some(target) = ac.composition_target_id.take() {
                    ac.composition_id = target;
                }
            }
            DeployState::MigrationReverting => ac.composition_target_id = None,
            _ => {}
        }

        ac.deploy_state = state_utils::deploy_completed(deploy);
        ac.lock_state = state_utils::lock_completed(deploy, ac.lock_state);
        ac.sub_state = SubState::None;
        ac.phase = None;
        ac.last_msg = Utc::now();
        if ac.state_change_result == StateChangeResult::Timeout {
            ac.state_change_result = StateChangeResult::NoError;
        }
        for element in &mut ac.elements {
            element.stage = None;
            element.migration_state = MigrationState::Default;
        }

        if ac.deploy_state == DeployState::Deleted {
            sync.to_be_delete = true;
        }
        sync.updated = true;
        sync.to_be_sync = true;

        info!(
            instance_id = %ac.instance_id,
            deploy_state = %ac.deploy_state,
            lock_state = %ac.lock_state,
            "Automation composition transition completed"
        );

        self.save_and_sync(ac, definition, sync).await
    }

    /// Mark the instance TIMEOUT if its wait expired, then flush.
    ///
    /// An instance already in TIMEOUT is left as it is.
    pub(crate) async fn handle_timeout(
        &self,
        ac: &mut AutomationComposition,
        definition: &AutomationCompositionDefinition,
        sync: &mut UpdateSync,
    ) -> Result<()> {
        if ac.state_change_result == StateChangeResult::Timeout {
            debug!(instance_id = %ac.instance_id, "Automation composition already timed out");
            return self.save_and_sync(ac, definition, sync).await;
        }

        let operation = Operation::for_instance(ac.deploy_state, ac.lock_state, ac.sub_state);
        let timeout_ms = self.timeouts.timeout_ms(operation);
        let elapsed = elapsed_ms(ac.last_msg);
        let waiting = ac.elements.iter().any(|element| element.is_in_transition());

        if waiting && elapsed > timeout_ms {
            warn!(
                instance_id = %ac.instance_id,
                operation = ?operation,
                elapsed_ms = elapsed,
                timeout_ms,
                "Automation composition timed out"
            );
            ac.state_change_result = StateChangeResult::Timeout;
            sync.updated = true;
            sync.to_be_sync = true;
        } else {
            debug!(
                instance_id = %ac.instance_id,
                elapsed_ms = elapsed,
                "Automation composition still in progress"
            );
        }

        self.save_and_sync(ac, definition, sync).await
    }

    /// Write back, delete and broadcast as `sync` demands, then clear it.
    pub(crate) async fn save_and_sync(
        &self,
        ac: &mut AutomationComposition,
        definition: &AutomationCompositionDefinition,
        sync: &mut UpdateSync,
    ) -> Result<()> {
        if sync.to_be_delete {
            self.store.delete_instance(ac.instance_id).await?;
            info!(instance_id = %ac.instance_id, "Automation composition deleted");
        } else if sync.updated {
            *ac = self.store.update_instance(ac).await?;
        }

        if sync.to_be_sync {
            self.publisher.send_sync(ac, definition).await?;
        }

        *sync = UpdateSync::default();
        Ok(())
    }
}
