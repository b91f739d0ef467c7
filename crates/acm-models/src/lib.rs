// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Domain model for automation composition supervision.
//!
//! An *automation composition* is a set of elements, each owned by a remote
//! participant, that is driven through deploy, lock, update, migrate and
//! prepare transitions by the supervision engine in `acm-runtime`. This crate
//! holds everything that engine reasons about without performing I/O:
//!
//! | Module | Contents |
//! |--------|----------|
//! | [`state`] | Deploy, lock, sub, prime and migration state enums plus outbound orders |
//! | [`concepts`] | Instances, elements, definitions and the service template they reference |
//! | [`state_utils`] | Transition predicates and completed-state mappings |
//! | [`stage_utils`] | Stage sets, start phases and stage advancement |
//! | [`properties`] | Deep merge of property trees |
//! | [`messages`] | Inbound acknowledgements and outbound participant messages |
//!
//! # Transition shapes
//!
//! ```text
//!   phase-ordered                 stage-ordered               un-ordered
//!   (deploy/undeploy/lock)        (migrate/revert/prepare)    (update/review/precheck)
//!
//!   phase 0 ──► phase 1 ──► …     stage 0 ──► stage 1 ──► …   all elements at once
//!   (reversed for backward
//!    transitions)
//! ```

#![deny(missing_docs)]

pub mod concepts;
pub mod error;
pub mod messages;
pub mod properties;
pub mod stage_utils;
pub mod state;
pub mod state_utils;

pub use concepts::{
    AutomationComposition, AutomationCompositionDefinition, AutomationCompositionElement,
    NodeTemplate, NodeTemplateState, ServiceTemplate, ToscaConceptIdentifier,
};
pub use error::{ModelError, Result};
pub use messages::{DocMessage, ParticipantMessage, ParticipantMessageType};
pub use state::{
    AcTypeState, DeployOrder, DeployState, LockOrder, LockState, MigrationState,
    StateChangeResult, SubState,
};
