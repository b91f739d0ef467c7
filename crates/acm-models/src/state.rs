// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! State enums shared by instances, elements and definitions.
//!
//! All enums serialize as `SCREAMING_SNAKE_CASE` on the wire and render the
//! same way through [`std::fmt::Display`], so log fields and persisted columns
//! read identically.

use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

/// Deployment state of an instance or element.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum DeployState {
    /// Not deployed on any participant.
    #[default]
    Undeployed,
    /// Deployment in progress.
    Deploying,
    /// Deployed on every owning participant.
    Deployed,
    /// Undeployment in progress.
    Undeploying,
    /// Deletion in progress.
    Deleting,
    /// Deleted; the record is removed once observed.
    Deleted,
    /// Property update in progress.
    Updating,
    /// Migration to the target definition in progress.
    Migrating,
    /// Rollback of a migration in progress.
    MigrationReverting,
}

/// Lock state of an instance or element.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum LockState {
    /// Not applicable (element not deployed).
    #[default]
    None,
    /// Lock in progress.
    Locking,
    /// Locked.
    Locked,
    /// Unlock in progress.
    Unlocking,
    /// Unlocked.
    Unlocked,
}

/// Secondary operation running alongside a steady deploy/lock state.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum SubState {
    /// No secondary operation.
    #[default]
    None,
    /// Participants are validating a migration without applying it.
    MigrationPrechecking,
    /// Participants are preparing elements before deployment.
    Preparing,
    /// Participants are reviewing deployed elements.
    Reviewing,
}

/// Outcome of the last state change.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum StateChangeResult {
    /// No error recorded.
    #[default]
    NoError,
    /// A participant reported failure.
    Failed,
    /// No acknowledgement arrived within the configured wait.
    Timeout,
}

/// Priming state of a composition definition or one of its node templates.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum AcTypeState {
    /// Stored but not distributed to participants.
    #[default]
    Commissioned,
    /// Priming in progress.
    Priming,
    /// Primed on every owning participant.
    Primed,
    /// Depriming in progress.
    Depriming,
}

/// Role of an element within a running migration.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum MigrationState {
    /// Element exists in both the source and the target definition.
    #[default]
    Default,
    /// Element is introduced by the target definition.
    New,
    /// Element is dropped by the target definition.
    Removed,
}

/// Deploy order sent to a participant.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum DeployOrder {
    /// Leave the deploy state unchanged.
    #[default]
    None,
    /// Undeploy the element.
    Undeploy,
    /// Delete the element.
    Delete,
    /// Deploy the element.
    Deploy,
    /// Apply updated properties.
    Update,
    /// Migrate the element to the target definition.
    Migrate,
}

/// Lock order sent to a participant.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum LockOrder {
    /// Leave the lock state unchanged.
    #[default]
    None,
    /// Unlock the element.
    Unlock,
    /// Lock the element.
    Lock,
}
