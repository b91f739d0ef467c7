// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Sweep entry point and per-instance dispatch.

use std::sync::Arc;

use acm_models::state_utils;
use acm_models::{AutomationComposition, DeployState, StateChangeResult, SubState};
use tracing::{debug, error, info};
use uuid::Uuid;

use super::{
    AcDefinitionScanner, PhaseScanner, ScanContext, SimpleScanner, StageScanner, UpdateSync,
};
use crate::config::OperationTimeouts;
use crate::error::{Error, Result};
use crate::locks::KeyedLocks;
use crate::publisher::SupervisionPublisher;
use crate::store::InstanceStore;

/// Which scanner drives an instance in a given state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScanRoute {
    /// Nothing to drive; only flush what is owed.
    Idle,
    /// Stage-ordered: migrate, migration revert, prepare.
    Stage,
    /// Unordered: update, migration precheck, review.
    Simple,
    /// Phase-ordered: deploy, undeploy, lock, unlock, delete.
    Phase,
}

impl ScanRoute {
    /// Route for `ac` as it stands.
    pub fn for_instance(ac: &AutomationComposition) -> Self {
        if !ac.is_in_transition() || ac.state_change_result == StateChangeResult::Failed {
            Self::Idle
        } else if state_utils::is_migrating(ac.deploy_state) || ac.sub_state == SubState::Preparing
        {
            Self::Stage
        } else if ac.deploy_state == DeployState::Updating
            || matches!(
                ac.sub_state,
                SubState::MigrationPrechecking | SubState::Reviewing
            )
        {
            Self::Simple
        } else {
            Self::Phase
        }
    }
}

/// Outcome of one sweep.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepReport {
    /// Definitions scanned.
    pub definitions: usize,
    /// Instances scanned.
    pub instances: usize,
    /// Records whose scan failed.
    pub failures: usize,
}

/// Drives definitions and instances towards their target state.
pub struct SupervisionScanner {
    ctx: ScanContext,
    locks: Arc<KeyedLocks>,
    simple: SimpleScanner,
    phase: PhaseScanner,
    stage: StageScanner,
    definitions: AcDefinitionScanner,
}

impl SupervisionScanner {
    /// Create a scanner sharing `locks` with every other writer.
    pub fn new(
        store: Arc<dyn InstanceStore>,
        publisher: SupervisionPublisher,
        timeouts: OperationTimeouts,
        locks: Arc<KeyedLocks>,
    ) -> Self {
        let ctx = ScanContext::new(store, publisher, timeouts);
        Self {
            simple: SimpleScanner::new(ctx.clone()),
            phase: PhaseScanner::new(ctx.clone()),
            stage: StageScanner::new(ctx.clone()),
            definitions: AcDefinitionScanner::new(ctx.clone()),
            ctx,
            locks,
        }
    }

    /// Message-level instance scanner.
    pub fn simple(&self) -> &SimpleScanner {
        &self.simple
    }

    /// Definition scanner.
    pub fn definitions(&self) -> &AcDefinitionScanner {
        &self.definitions
    }

    /// Locks shared with the other writers.
    pub fn locks(&self) -> &Arc<KeyedLocks> {
        &self.locks
    }

    /// One sweep: every definition in transition, then every instance in transition.
    ///
    /// A failure on one record is logged and does not stop the sweep.
    pub async fn run(&self) -> Result<SweepReport> {
        let mut report = SweepReport::default();

        let definitions = self.ctx.store.list_definitions_in_transition().await?;
        for definition in definitions {
            report.definitions += 1;
            if let Err(e) = self.scan_definition_by_id(definition.composition_id).await {
                report.failures += 1;
                error!(
                    composition_id = %definition.composition_id,
                    error = %e,
                    "Composition definition scan failed"
                );
            }
        }

        let instances = self.ctx.store.list_instances_in_transition().await?;
        for ac in instances {
            report.instances += 1;
            if let Err(e) = self.scan_instance_by_id(ac.instance_id).await {
                report.failures += 1;
                error!(
                    instance_id = %ac.instance_id,
                    error = %e,
                    "Automation composition scan failed"
                );
            }
        }

        if report.definitions + report.instances > 0 {
            info!(
                definitions = report.definitions,
                instances = report.instances,
                failures = report.failures,
                "Supervision sweep finished"
            );
        } else {
            debug!("Supervision sweep found nothing in transition");
        }
        Ok(report)
    }

    /// Reload and scan one definition under its lock.
    pub async fn scan_definition_by_id(&self, composition_id: Uuid) -> Result<()> {
        let _guard = self.locks.lock(composition_id).await;
        let Some(mut definition) = self.ctx.store.get_definition(composition_id).await? else {
            debug!(%composition_id, "Composition definition gone before scan");
            return Ok(());
        };
        if !definition.is_in_transition() {
            return Ok(());
        }
        let mut sync = UpdateSync::default();
        self.definitions.scan(&mut definition, &mut sync).await
    }

    /// Reload and scan one instance under its lock.
    pub async fn scan_instance_by_id(&self, instance_id: Uuid) -> Result<()> {
        let _guard = self.locks.lock(instance_id).await;
        let Some(mut ac) = self.ctx.store.get_instance(instance_id).await? else {
            debug!(%instance_id, "Automation composition gone before scan");
            return Ok(());
        };
        self.scan_instance(&mut ac, UpdateSync::default()).await
    }

    /// Scan `ac`, carrying what earlier steps already owe. The caller holds its lock.
    pub async fn scan_instance(
        &self,
        ac: &mut AutomationComposition,
        mut sync: UpdateSync,
    ) -> Result<()> {
        let definition = self
            .ctx
            .store
            .get_definition(ac.composition_id)
            .await?
            .ok_or(Error::DefinitionNotFound(ac.composition_id))?;

        let route = ScanRoute::for_instance(ac);
        debug!(
            instance_id = %ac.instance_id,
            deploy_state = %ac.deploy_state,
            lock_state = %ac.lock_state,
            sub_state = %ac.sub_state,
            route = ?route,
            "Scanning automation composition"
        );

        match route {
            ScanRoute::Idle => self.ctx.save_and_sync(ac, &definition, &mut sync).await,
            ScanRoute::Stage => {
                let target = match ac.composition_target_id {
                    Some(target_id) => self.ctx.store.get_definition(target_id).await?,
                    None => None,
                };
                self.stage
                    .scan_stage(ac, &definition, target.as_ref(), &mut sync)
                    .await
            }
            ScanRoute::Simple => self.simple.simple_scan(ac, &definition, &mut sync).await,
            ScanRoute::Phase => {
                self.phase
                    .scan_with_phase(ac, &definition, &mut sync)
                    .await
            }
        }
    }
}
