// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Per-step persistence and broadcast accumulator.

use std::ops::{BitOr, BitOrAssign};

/// What one reconciliation step still owes the store and the participants.
///
/// Produced fresh per step and OR-merged across sub-steps, so a step ends
/// with at most one write and at most one broadcast.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct UpdateSync {
    /// The instance or definition must be written back.
    pub updated: bool,
    /// A full state broadcast must go out.
    pub to_be_sync: bool,
    /// The instance record must be removed instead of written back.
    pub to_be_delete: bool,
}

impl UpdateSync {
    /// Persistence required, no broadcast.
    pub fn updated() -> Self {
        Self {
            updated: true,
            ..Self::default()
        }
    }

    /// Persistence and broadcast required.
    pub fn updated_and_sync() -> Self {
        Self {
            updated: true,
            to_be_sync: true,
            ..Self::default()
        }
    }

    /// Whether anything is owed.
    pub fn is_pending(&self) -> bool {
        self.updated || self.to_be_sync || self.to_be_delete
    }

    /// Fold another accumulator into this one.
    pub fn merge(&mut self, other: UpdateSync) {
        self.updated |= other.updated;
        self.to_be_sync |= other.to_be_sync;
        self.to_be_delete |= other.to_be_delete;
    }
}

impl BitOr for UpdateSync {
    type Output = UpdateSync;

    fn bitor(mut self, rhs: UpdateSync) -> UpdateSync {
        self.merge(rhs);
        self
    }
}

impl BitOrAssign for UpdateSync {
    fn bitor_assign(&mut self, rhs: UpdateSync) {
        self.merge(rhs);
    }
}
