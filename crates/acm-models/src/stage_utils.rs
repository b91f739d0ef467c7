// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Stage sets and start phases declared on node templates.
//!
//! A node template may declare:
//!
//! ```yaml
//! properties:
//!   startPhase: 1          # deploy/undeploy/lock ordering
//!   stage:                 # migrate/prepare ordering
//!     migrate: [0, 2]
//!     prepare: [1]
//! ```
//!
//! The legacy shorthand `stage: [0, 2]` is read as the migrate set. Anything
//! missing or malformed resolves to stage/phase 0.

use std::collections::BTreeSet;
use std::ops::Bound;

use serde_json::{Map, Value};

use crate::concepts::{
    AutomationComposition, AutomationCompositionDefinition, AutomationCompositionElement,
};
use crate::state_utils;

/// Property holding the start phase.
pub const START_PHASE: &str = "startPhase";
/// Property holding the stage declaration.
pub const STAGE: &str = "stage";
/// Key of the migrate stage list inside a stage map.
pub const STAGE_MIGRATE: &str = "migrate";
/// Key of the prepare stage list inside a stage map.
pub const STAGE_PREPARE: &str = "prepare";

/// The kind of stage-ordered episode a stage set applies to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StageEpisode {
    /// Migration or migration revert.
    Migrate,
    /// Pre-deploy preparation.
    Prepare,
}

fn as_int(value: &Value) -> Option<i32> {
    match value {
        Value::Number(n) => n
            .as_i64()
            .or_else(|| n.as_f64().filter(|f| f.fract() == 0.0).map(|f| f as i64))
            .and_then(|i| i32::try_from(i).ok()),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn int_set(value: Option<&Value>) -> BTreeSet<i32> {
    match value {
        Some(Value::Array(items)) => items.iter().filter_map(as_int).collect(),
        _ => BTreeSet::new(),
    }
}

/// Resolve the stage set of an episode from a node template's properties.
///
/// Always non-empty; defaults to `{0}`.
pub fn find_stage_set(properties: &Map<String, Value>, episode: StageEpisode) -> BTreeSet<i32> {
    let set = match (properties.get(STAGE), episode) {
        (Some(Value::Object(stages)), StageEpisode::Migrate) => int_set(stages.get(STAGE_MIGRATE)),
        (Some(Value::Object(stages)), StageEpisode::Prepare) => int_set(stages.get(STAGE_PREPARE)),
        (Some(list @ Value::Array(_)), StageEpisode::Migrate) => int_set(Some(list)),
        _ => BTreeSet::new(),
    };
    if set.is_empty() {
        BTreeSet::from([0])
    } else {
        set
    }
}

/// Resolve the start phase from a node template's properties, defaulting to 0.
pub fn find_start_phase(properties: &Map<String, Value>) -> i32 {
    properties.get(START_PHASE).and_then(as_int).unwrap_or(0)
}

/// Smallest stage in `stage_set` strictly greater than `current`.
///
/// `None` means the episode has no further stage.
pub fn next_stage(current: i32, stage_set: &BTreeSet<i32>) -> Option<i32> {
    stage_set
        .range((Bound::Excluded(current), Bound::Unbounded))
        .next()
        .copied()
}

/// Episode an instance is running, judged from its deploy state.
pub fn episode_of(ac: &AutomationComposition) -> StageEpisode {
    if state_utils::is_migrating(ac.deploy_state) {
        StageEpisode::Migrate
    } else {
        StageEpisode::Prepare
    }
}

/// Stage set of one element, looked up by node template name; `{0}` if unresolved.
pub fn element_stage_set(
    element: &AutomationCompositionElement,
    definition: &AutomationCompositionDefinition,
    episode: StageEpisode,
) -> BTreeSet<i32> {
    match definition.service_template.node_template(&element.definition) {
        Some(template) => find_stage_set(&template.properties, episode),
        None => BTreeSet::from([0]),
    }
}

/// Start phase of one element, or `None` when its definition name and version do not
/// match a node template exactly.
pub fn resolve_start_phase(
    element: &AutomationCompositionElement,
    definition: &AutomationCompositionDefinition,
) -> Option<i32> {
    definition
        .service_template
        .node_template_exact(&element.definition)
        .map(|template| find_start_phase(&template.properties))
}

/// Lowest stage any element starts the current episode at.
pub fn first_stage(ac: &AutomationComposition, definition: &AutomationCompositionDefinition) -> i32 {
    let episode = episode_of(ac);
    ac.elements
        .iter()
        .filter_map(|element| element_stage_set(element, definition, episode).first().copied())
        .min()
        .unwrap_or(0)
}

/// Highest stage any element reaches in the current episode.
pub fn last_stage(ac: &AutomationComposition, definition: &AutomationCompositionDefinition) -> i32 {
    let episode = episode_of(ac);
    ac.elements
        .iter()
        .filter_map(|element| element_stage_set(element, definition, episode).last().copied())
        .max()
        .unwrap_or(0)
}

/// Phase a phase-ordered transition starts at.
///
/// Forward transitions start at the lowest declared phase, backward ones at the highest.
/// Elements without an exact node template match count as phase 0.
pub fn first_start_phase(
    ac: &AutomationComposition,
    definition: &AutomationCompositionDefinition,
) -> i32 {
    let phases = ac
        .elements
        .iter()
        .map(|element| resolve_start_phase(element, definition).unwrap_or(0));
    let phase = if state_utils::is_forward(ac.deploy_state, ac.lock_state) {
        phases.min()
    } else {
        phases.max()
    };
    phase.unwrap_or(0)
}
