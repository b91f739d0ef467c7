// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Instances, elements, composition definitions and service templates.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

use crate::error::ModelError;
use crate::state::{
    AcTypeState, DeployState, LockState, MigrationState, StateChangeResult, SubState,
};
use crate::state_utils;

/// Node type of the template describing the composition itself rather than one of its elements.
pub const AUTOMATION_COMPOSITION_NODE_TYPE: &str = "org.onap.policy.clamp.acm.AutomationComposition";

/// Name and version reference into a service template.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ToscaConceptIdentifier {
    /// Concept name.
    pub name: String,
    /// Concept version.
    pub version: String,
}

impl ToscaConceptIdentifier {
    /// Create an identifier.
    pub fn new(name: impl Into<String>, version: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            version: version.into(),
        }
    }
}

impl fmt::Display for ToscaConceptIdentifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.name, self.version)
    }
}

impl FromStr for ToscaConceptIdentifier {
    type Err = ModelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.rsplit_once(':') {
            Some((name, version)) if !name.is_empty() && !version.is_empty() => {
                Ok(Self::new(name, version))
            }
            _ => Err(ModelError::InvalidIdentifier(s.to_string())),
        }
    }
}

/// A node template declared by a service template.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeTemplate {
    /// Template version; the name is the key in [`ServiceTemplate::node_templates`].
    pub version: String,
    /// Node type name.
    #[serde(rename = "type")]
    pub type_name: String,
    /// Node type version.
    #[serde(default)]
    pub type_version: Option<String>,
    /// Free-text description.
    #[serde(default)]
    pub description: Option<String>,
    /// Declared properties, including `startPhase` and `stage`.
    #[serde(default)]
    pub properties: Map<String, Value>,
}

/// The parsed definition document a composition definition is built from.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServiceTemplate {
    /// Template name.
    pub name: String,
    /// Template version.
    pub version: String,
    /// Node templates keyed by name.
    #[serde(default)]
    pub node_templates: BTreeMap<String, NodeTemplate>,
}

impl ServiceTemplate {
    /// Look up a node template by name only.
    pub fn node_template(&self, id: &ToscaConceptIdentifier) -> Option<&NodeTemplate> {
        self.node_templates.get(&id.name)
    }

    /// Look up a node template whose name and version both match.
    pub fn node_template_exact(&self, id: &ToscaConceptIdentifier) -> Option<&NodeTemplate> {
        self.node_template(id)
            .filter(|template| template.version == id.version)
    }

    /// Node templates describing composition elements.
    pub fn element_templates(&self) -> impl Iterator<Item = (&String, &NodeTemplate)> {
        self.node_templates
            .iter()
            .filter(|(_, template)| template.type_name != AUTOMATION_COMPOSITION_NODE_TYPE)
    }
}

/// Priming state of one node template within a definition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeTemplateState {
    /// Row identifier.
    pub node_template_state_id: Uuid,
    /// Node template this state tracks.
    pub node_template_id: ToscaConceptIdentifier,
    /// Participant that primes this node template, once assigned.
    #[serde(default)]
    pub participant_id: Option<Uuid>,
    /// Priming state reported by the participant.
    pub state: AcTypeState,
    /// Last status text reported by the participant.
    #[serde(default)]
    pub message: Option<String>,
    /// Output properties reported by the participant.
    #[serde(default)]
    pub out_properties: Map<String, Value>,
}

/// A composition *type*: a service template plus per-node-template priming state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AutomationCompositionDefinition {
    /// Definition identifier.
    pub composition_id: Uuid,
    /// Service template the definition was commissioned from.
    pub service_template: ServiceTemplate,
    /// Overall priming state.
    pub state: AcTypeState,
    /// Outcome of the last priming change.
    #[serde(default)]
    pub state_change_result: StateChangeResult,
    /// Timestamp of the last state-relevant event.
    pub last_msg: DateTime<Utc>,
    /// Node template states keyed by node template name.
    #[serde(default)]
    pub element_state_map: BTreeMap<String, NodeTemplateState>,
}

impl AutomationCompositionDefinition {
    /// Commission a definition: one COMMISSIONED state entry per element node template.
    pub fn commission(composition_id: Uuid, service_template: ServiceTemplate) -> Self {
        let element_state_map = service_template
            .element_templates()
            .map(|(name, template)| {
                (
                    name.clone(),
                    NodeTemplateState {
                        node_template_state_id: Uuid::new_v4(),
                        node_template_id: ToscaConceptIdentifier::new(
                            name.clone(),
                            template.version.clone(),
                        ),
                        participant_id: None,
                        state: AcTypeState::Commissioned,
                        message: None,
                        out_properties: Map::new(),
                    },
                )
            })
            .collect();

        Self {
            composition_id,
            service_template,
            state: AcTypeState::Commissioned,
            state_change_result: StateChangeResult::NoError,
            last_msg: Utc::now(),
            element_state_map,
        }
    }

    /// Assign the participant owning a node template. Returns false if the template is unknown.
    pub fn assign_participant(&mut self, node_template: &str, participant_id: Uuid) -> bool {
        match self.element_state_map.get_mut(node_template) {
            Some(state) => {
                state.participant_id = Some(participant_id);
                true
            }
            None => false,
        }
    }

    /// Distinct participants owning at least one node template.
    pub fn participant_ids(&self) -> BTreeSet<Uuid> {
        self.element_state_map
            .values()
            .filter_map(|state| state.participant_id)
            .collect()
    }

    /// Whether a priming or depriming operation is in flight.
    pub fn is_in_transition(&self) -> bool {
        matches!(self.state, AcTypeState::Priming | AcTypeState::Depriming)
    }

    /// Set the definition and every node template to `state`, stamping `last_msg`.
    pub fn set_cascaded_state(&mut self, state: AcTypeState) {
        self.state = state;
        self.last_msg = Utc::now();
        for element in self.element_state_map.values_mut() {
            element.state = state;
            element.message = None;
        }
    }
}

/// One element of an instance, owned by a single participant.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AutomationCompositionElement {
    /// Element identifier.
    pub id: Uuid,
    /// Node template the element instantiates.
    pub definition: ToscaConceptIdentifier,
    /// Owning participant.
    pub participant_id: Uuid,
    /// Deploy state.
    #[serde(default)]
    pub deploy_state: DeployState,
    /// Lock state.
    #[serde(default)]
    pub lock_state: LockState,
    /// Secondary operation state.
    #[serde(default)]
    pub sub_state: SubState,
    /// Role within a running migration.
    #[serde(default)]
    pub migration_state: MigrationState,
    /// Stage the element is currently executing within a migrate or prepare episode.
    #[serde(default)]
    pub stage: Option<i32>,
    /// Input properties overlaid on the node template defaults.
    #[serde(default)]
    pub properties: Map<String, Value>,
    /// Output properties reported by the participant.
    #[serde(default)]
    pub out_properties: Map<String, Value>,
    /// Last status text reported by the participant.
    #[serde(default)]
    pub message: Option<String>,
    /// Operational state reported by the participant.
    #[serde(default)]
    pub operational_state: Option<String>,
    /// Use state reported by the participant.
    #[serde(default)]
    pub use_state: Option<String>,
    /// Free-text description.
    #[serde(default)]
    pub description: Option<String>,
}

impl AutomationCompositionElement {
    /// Create an undeployed element.
    pub fn new(id: Uuid, definition: ToscaConceptIdentifier, participant_id: Uuid) -> Self {
        Self {
            id,
            definition,
            participant_id,
            deploy_state: DeployState::Undeployed,
            lock_state: LockState::None,
            sub_state: SubState::None,
            migration_state: MigrationState::Default,
            stage: None,
            properties: Map::new(),
            out_properties: Map::new(),
            message: None,
            operational_state: None,
            use_state: None,
            description: None,
        }
    }

    /// Whether this element still has work outstanding.
    pub fn is_in_transition(&self) -> bool {
        state_utils::is_in_transitional_state(self.deploy_state, self.lock_state, self.sub_state)
    }
}

/// An automation composition instance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AutomationComposition {
    /// Instance identifier.
    pub instance_id: Uuid,
    /// Instance name.
    pub name: String,
    /// Instance version.
    pub version: String,
    /// Current definition.
    pub composition_id: Uuid,
    /// Destination definition while migrating.
    #[serde(default)]
    pub composition_target_id: Option<Uuid>,
    /// Deploy state.
    #[serde(default)]
    pub deploy_state: DeployState,
    /// Lock state.
    #[serde(default)]
    pub lock_state: LockState,
    /// Secondary operation state.
    #[serde(default)]
    pub sub_state: SubState,
    /// Outcome of the last state change.
    #[serde(default)]
    pub state_change_result: StateChangeResult,
    /// Phase or stage cursor of the running transition.
    #[serde(default)]
    pub phase: Option<i32>,
    /// Timestamp of the last state-relevant event.
    pub last_msg: DateTime<Utc>,
    /// Free-text description.
    #[serde(default)]
    pub description: Option<String>,
    /// Elements in insertion order.
    #[serde(default)]
    pub elements: Vec<AutomationCompositionElement>,
}

impl AutomationComposition {
    /// Create an undeployed instance of `composition_id`.
    pub fn new(
        instance_id: Uuid,
        name: impl Into<String>,
        version: impl Into<String>,
        composition_id: Uuid,
    ) -> Self {
        Self {
            instance_id,
            name: name.into(),
            version: version.into(),
            composition_id,
            composition_target_id: None,
            deploy_state: DeployState::Undeployed,
            lock_state: LockState::None,
            sub_state: SubState::None,
            state_change_result: StateChangeResult::NoError,
            phase: None,
            last_msg: Utc::now(),
            description: None,
            elements: Vec::new(),
        }
    }

    /// Find an element by id.
    pub fn element(&self, id: Uuid) -> Option<&AutomationCompositionElement> {
        self.elements.iter().find(|element| element.id == id)
    }

    /// Find an element by id for mutation.
    pub fn element_mut(&mut self, id: Uuid) -> Option<&mut AutomationCompositionElement> {
        self.elements.iter_mut().find(|element| element.id == id)
    }

    /// Remove an element, keeping the order of the rest.
    pub fn remove_element(&mut self, id: Uuid) -> Option<AutomationCompositionElement> {
        let index = self.elements.iter().position(|element| element.id == id)?;
        Some(self.elements.remove(index))
    }

    /// Distinct participants owning at least one element.
    pub fn participant_ids(&self) -> BTreeSet<Uuid> {
        self.elements
            .iter()
            .map(|element| element.participant_id)
            .collect()
    }

    /// Whether the instance as a whole is mid-transition.
    pub fn is_in_transition(&self) -> bool {
        state_utils::is_in_transitional_state(self.deploy_state, self.lock_state, self.sub_state)
    }
}
