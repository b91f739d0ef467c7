// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Start-phase ordered transitions.
//!
//! Deploy, undeploy, lock, unlock and delete run element groups in order of
//! their node template's `startPhase`: ascending for forward transitions,
//! descending for backward ones. The instance `phase` is the group currently
//! commanded. The scanner moves it on once every element of that group has
//! left its transitional state.
//!
//! ```text
//!   phase 0 ──ack──► phase 1 ──ack──► phase 2 ──ack──► complete
//!   (forward: deploy, unlock)
//!
//!   phase 2 ──ack──► phase 1 ──ack──► phase 0 ──ack──► complete
//!   (backward: undeploy, lock, delete)
//! ```

use std::collections::BTreeSet;

use acm_models::stage_utils;
use acm_models::state_utils;
use acm_models::{
    AutomationComposition, AutomationCompositionDefinition, DeployState, StateChangeResult,
};
use chrono::Utc;
use tracing::{debug, info, warn};

use super::{ScanContext, UpdateSync};
use crate::error::Result;

/// Scanner for phase-ordered transitions.
#[derive(Clone)]
pub struct PhaseScanner {
    ctx: ScanContext,
}

impl PhaseScanner {
    /// Create a scanner over `ctx`.
    pub fn new(ctx: ScanContext) -> Self {
        Self { ctx }
    }

    /// Advance, complete or time out a phase-ordered transition.
    pub async fn scan_with_phase(
        &self,
        ac: &mut AutomationComposition,
        definition: &AutomationCompositionDefinition,
        sync: &mut UpdateSync,
    ) -> Result<()> {
        if ac.elements.iter().all(|element| !element.is_in_transition()) {
            return self.ctx.complete(ac, definition, sync).await;
        }

        let mut pending = BTreeSet::new();
        for element in ac.elements.iter().filter(|element| element.is_in_transition()) {
            match stage_utils::resolve_start_phase(element, definition) {
                Some(phase) => {
                    pending.insert(phase);
                }
                None => warn!(
                    instance_id = %ac.instance_id,
                    element_id = %element.id,
                    definition = %element.definition,
                    "No node template matches element definition; element skipped"
                ),
            }
        }

        let forward = state_utils::is_forward(ac.deploy_state, ac.lock_state);
        let next = if forward {
            pending.first().copied()
        } else {
            pending.last().copied()
        };

        let Some(next) = next else {
            return self.ctx.handle_timeout(ac, definition, sync).await;
        };

        let moves_on = match ac.phase {
            None => true,
            Some(current) if forward => next > current,
            Some(current) => next < current,
        };

        if !moves_on || ac.state_change_result == StateChangeResult::Timeout {
            debug!(
                instance_id = %ac.instance_id,
                phase = ?ac.phase,
                "Phase still in flight"
            );
            return self.ctx.handle_timeout(ac, definition, sync).await;
        }

        ac.phase = Some(next);
        ac.last_msg = Utc::now();
        sync.updated = true;
        info!(
            instance_id = %ac.instance_id,
            deploy_state = %ac.deploy_state,
            lock_state = %ac.lock_state,
            phase = next,
            "Moving to next start phase"
        );
        self.ctx.save_and_sync(ac, definition, sync).await?;

        if ac.deploy_state == DeployState::Deploying {
            self.ctx
                .publisher
                .send_deploy_command(ac, definition, next, false)
                .await?;
        } else {
            self.ctx
                .publisher
                .send_state_change_command(ac, definition, next, false)
                .await?;
        }
        Ok(())
    }
}
