// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Supervision module - reconciliation of instances and definitions.
//!
//! Every scan ends in exactly one flush: at most one write of the record
//! (or its deletion) and at most one sync broadcast, as accumulated in an
//! [`UpdateSync`].
//!
//! ```text
//!                      ┌──────────────────────┐
//!   sweep / message ──►│  SupervisionScanner  │
//!                      └──────────┬───────────┘
//!            ┌─────────────┬──────┴──────┬──────────────────┐
//!            ▼             ▼             ▼                  ▼
//!      PhaseScanner   StageScanner  SimpleScanner   AcDefinitionScanner
//!      deploy/lock/   migrate/      update/precheck/  prime/deprime
//!      delete         revert/prepare review
//! ```

mod ac_definition_scanner;
mod context;
mod phase_scanner;
mod scanner;
mod simple_scanner;
mod stage_scanner;
mod update_sync;

#[cfg(test)]
pub(crate) mod testing;

pub use ac_definition_scanner::AcDefinitionScanner;
pub use context::ScanContext;
pub use phase_scanner::PhaseScanner;
pub use scanner::{ScanRoute, SupervisionScanner, SweepReport};
pub use simple_scanner::SimpleScanner;
pub use stage_scanner::StageScanner;
pub use update_sync::UpdateSync;
