// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Transition predicates and completed-state mappings.

use chrono::Utc;

use crate::concepts::AutomationComposition;
use crate::state::{DeployOrder, DeployState, LockOrder, LockState, SubState};

/// True while a deploy, lock or sub-state operation is in flight.
pub fn is_in_transitional_state(deploy: DeployState, lock: LockState, sub: SubState) -> bool {
    matches!(
        deploy,
        DeployState::Deploying
            | DeployState::Undeploying
            | DeployState::Deleting
            | DeployState::Updating
            | DeployState::Migrating
            | DeployState::MigrationReverting
    ) || matches!(lock, LockState::Locking | LockState::Unlocking)
        || sub != SubState::None
}

/// Deploy state reached once a transitional deploy state completes.
pub fn deploy_completed(deploy: DeployState) -> DeployState {
    match deploy {
        DeployState::Migrating
        | DeployState::MigrationReverting
        | DeployState::Updating
        | DeployState::Deploying => DeployState::Deployed,
        DeployState::Undeploying => DeployState::Undeployed,
        DeployState::Deleting => DeployState::Deleted,
        other => other,
    }
}

/// Lock state reached once a transition completes.
///
/// A completed deploy leaves the instance locked; a completed undeploy leaves no lock at all.
pub fn lock_completed(deploy: DeployState, lock: LockState) -> LockState {
    if lock == LockState::Locking || deploy == DeployState::Deploying {
        LockState::Locked
    } else if lock == LockState::Unlocking {
        LockState::Unlocked
    } else if deploy == DeployState::Undeploying {
        LockState::None
    } else {
        lock
    }
}

/// Forward transitions walk phases in ascending order, backward ones descending.
pub fn is_forward(deploy: DeployState, lock: LockState) -> bool {
    deploy == DeployState::Deploying || lock == LockState::Unlocking
}

/// True for a migration in either direction.
pub fn is_migrating(deploy: DeployState) -> bool {
    matches!(
        deploy,
        DeployState::Migrating | DeployState::MigrationReverting
    )
}

/// Deploy order matching a transitional deploy state.
pub fn state_deploy_to_order(deploy: DeployState) -> DeployOrder {
    match deploy {
        DeployState::Deploying => DeployOrder::Deploy,
        DeployState::Undeploying => DeployOrder::Undeploy,
        DeployState::Deleting => DeployOrder::Delete,
        _ => DeployOrder::None,
    }
}

/// Lock order matching a transitional lock state.
pub fn state_lock_to_order(lock: LockState) -> LockOrder {
    match lock {
        LockState::Locking => LockOrder::Lock,
        LockState::Unlocking => LockOrder::Unlock,
        _ => LockOrder::None,
    }
}

/// Start an instance-wide transition.
///
/// Sets the instance-level states, stamps `last_msg` and pushes the same states onto every
/// element, clearing each element's `message` and `stage`.
pub fn set_cascaded_state(
    ac: &mut AutomationComposition,
    deploy: DeployState,
    lock: LockState,
    sub: SubState,
) {
    ac.deploy_state = deploy;
    ac.lock_state = lock;
    ac.sub_state = sub;
    ac.last_msg = Utc::now();
    for element in &mut ac.elements {
        element.deploy_state = deploy;
        element.lock_state = lock;
        element.sub_state = sub;
        element.message = None;
        element.stage = None;
    }
}
