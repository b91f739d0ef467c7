// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Participant messages.
//!
//! Inbound acknowledgements arrive as [`DocMessage`], a flat document that
//! the bus adapter fills from whichever wire message it decoded. Outbound
//! commands are [`ParticipantMessage`] values tagged by `messageType`; each
//! one addresses exactly one participant.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use strum::{Display, EnumString};
use uuid::Uuid;

use crate::concepts::{NodeTemplate, ToscaConceptIdentifier};
use crate::state::{
    AcTypeState, DeployOrder, DeployState, LockOrder, LockState, MigrationState,
    StateChangeResult, SubState,
};

/// Every message type exchanged with participants.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum ParticipantMessageType {
    /// Periodic or event-driven element/definition status.
    ParticipantStatus,
    /// Participant announces itself, typically after a restart.
    ParticipantRegister,
    /// Participant leaves.
    ParticipantDeregister,
    /// Acknowledgement of a prime or deprime command.
    ParticipantPrimeAck,
    /// Acknowledgement of a deploy, update, migrate or prepare command.
    AutomationCompositionDeployAck,
    /// Acknowledgement of a state change command.
    AutomationCompositionStatechangeAck,
    /// Outbound prime/deprime command.
    ParticipantPrime,
    /// Outbound full state synchronisation.
    ParticipantSync,
    /// Outbound restart payload.
    ParticipantRestart,
    /// Outbound deploy command.
    AutomationCompositionDeploy,
    /// Outbound property update command.
    AutomationCompositionUpdate,
    /// Outbound state change command.
    AutomationCompositionStateChange,
    /// Outbound migrate command.
    AutomationCompositionMigration,
    /// Outbound prepare/review command.
    AutomationCompositionPrepare,
}

/// Inbound acknowledgement handed to exactly one scanner. Never persisted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DocMessage {
    /// Message type.
    pub message_type: ParticipantMessageType,
    /// Sending participant.
    pub participant_id: Uuid,
    /// Addressed definition, for definition-scoped messages.
    #[serde(default)]
    pub composition_id: Option<Uuid>,
    /// Addressed instance, for instance-scoped messages.
    #[serde(default)]
    pub instance_id: Option<Uuid>,
    /// Addressed element, for instance-scoped messages.
    #[serde(default)]
    pub instance_element_id: Option<Uuid>,
    /// Addressed node template, for definition-scoped messages.
    #[serde(default)]
    pub ac_element_definition_id: Option<ToscaConceptIdentifier>,
    /// Reported priming state.
    #[serde(default)]
    pub composition_state: Option<AcTypeState>,
    /// Reported deploy state.
    #[serde(default)]
    pub deploy_state: Option<DeployState>,
    /// Reported lock state.
    #[serde(default)]
    pub lock_state: Option<LockState>,
    /// Outcome reported by the participant.
    #[serde(default)]
    pub state_change_result: StateChangeResult,
    /// Free-text status.
    #[serde(default)]
    pub message: Option<String>,
    /// Reported output properties.
    #[serde(default)]
    pub out_properties: Option<Map<String, Value>>,
    /// Reported operational state.
    #[serde(default)]
    pub operational_state: Option<String>,
    /// Reported use state.
    #[serde(default)]
    pub use_state: Option<String>,
    /// Stage the element moved on to, during a staged episode.
    #[serde(default)]
    pub stage: Option<i32>,
}

impl DocMessage {
    /// A message of `message_type` from `participant_id` with every optional field empty.
    pub fn new(message_type: ParticipantMessageType, participant_id: Uuid) -> Self {
        Self {
            message_type,
            participant_id,
            composition_id: None,
            instance_id: None,
            instance_element_id: None,
            ac_element_definition_id: None,
            composition_state: None,
            deploy_state: None,
            lock_state: None,
            state_change_result: StateChangeResult::NoError,
            message: None,
            out_properties: None,
            operational_state: None,
            use_state: None,
            stage: None,
        }
    }

    /// Acknowledgement of an element-level deploy or state change.
    pub fn element_ack(
        message_type: ParticipantMessageType,
        participant_id: Uuid,
        instance_id: Uuid,
        element_id: Uuid,
        deploy_state: DeployState,
        lock_state: LockState,
    ) -> Self {
        Self {
            instance_id: Some(instance_id),
            instance_element_id: Some(element_id),
            deploy_state: Some(deploy_state),
            lock_state: Some(lock_state),
            ..Self::new(message_type, participant_id)
        }
    }
}

/// Per-element payload of deploy, update, state change, migrate and prepare commands.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AcElementDeploy {
    /// Element identifier.
    pub id: Uuid,
    /// Node template the element instantiates.
    pub definition: ToscaConceptIdentifier,
    /// What the participant should do with the element.
    pub ordered_state: DeployOrder,
    /// Node template defaults with the element's own properties merged on top.
    pub properties: Map<String, Value>,
    /// Role within a running migration.
    #[serde(default)]
    pub migration_state: MigrationState,
}

/// Element definition distributed when priming, syncing or restarting.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AcElementDefinition {
    /// Node template identifier.
    pub ac_element_definition_id: ToscaConceptIdentifier,
    /// The node template itself.
    pub automation_composition_element_tosca_node_template: NodeTemplate,
    /// Output properties last reported for this node template.
    #[serde(default)]
    pub out_properties: Map<String, Value>,
}

/// Full state snapshot of one element for sync and restart payloads.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AcElementRestart {
    /// Element identifier.
    pub id: Uuid,
    /// Node template the element instantiates.
    pub definition: ToscaConceptIdentifier,
    /// Owning participant.
    pub participant_id: Uuid,
    /// Deploy state.
    pub deploy_state: DeployState,
    /// Lock state.
    pub lock_state: LockState,
    /// Secondary operation state.
    pub sub_state: SubState,
    /// Operational state.
    #[serde(default)]
    pub operational_state: Option<String>,
    /// Use state.
    #[serde(default)]
    pub use_state: Option<String>,
    /// Input properties.
    pub properties: Map<String, Value>,
    /// Output properties.
    pub out_properties: Map<String, Value>,
}

/// Snapshot of one instance restricted to one participant's elements.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ParticipantRestartAc {
    /// Instance identifier.
    pub automation_composition_id: Uuid,
    /// Destination definition while migrating.
    #[serde(default)]
    pub composition_target_id: Option<Uuid>,
    /// The participant's elements; empty when the instance was removed from the participant.
    pub ac_element_list: Vec<AcElementRestart>,
}

/// Deploy or property update command.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeployCommand {
    /// Message identifier.
    pub message_id: Uuid,
    /// Addressed participant.
    pub participant_id: Uuid,
    /// Instance identifier.
    pub automation_composition_id: Uuid,
    /// Definition identifier.
    pub composition_id: Uuid,
    /// Phase this command applies to.
    pub start_phase: i32,
    /// Whether this is the first phase of the transition.
    pub first_start_phase: bool,
    /// Elements of this participant at `start_phase`.
    pub elements: Vec<AcElementDeploy>,
    /// Creation time.
    pub timestamp: DateTime<Utc>,
}

/// Lock, unlock, undeploy or delete command.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StateChangeCommand {
    /// Message identifier.
    pub message_id: Uuid,
    /// Addressed participant.
    pub participant_id: Uuid,
    /// Instance identifier.
    pub automation_composition_id: Uuid,
    /// Definition identifier.
    pub composition_id: Uuid,
    /// Deploy order.
    pub deploy_order_state: DeployOrder,
    /// Lock order.
    pub lock_order_state: LockOrder,
    /// Phase this command applies to.
    pub start_phase: i32,
    /// Whether this is the first phase of the transition.
    pub first_start_phase: bool,
    /// Elements of this participant at `start_phase`.
    pub elements: Vec<AcElementDeploy>,
    /// Creation time.
    pub timestamp: DateTime<Utc>,
}

/// Migrate, migration revert or migration precheck command.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MigrateCommand {
    /// Message identifier.
    pub message_id: Uuid,
    /// Addressed participant.
    pub participant_id: Uuid,
    /// Instance identifier.
    pub automation_composition_id: Uuid,
    /// Definition the instance is moving from.
    pub composition_id: Uuid,
    /// Definition the instance is moving to.
    pub composition_target_id: Uuid,
    /// Stage this command applies to.
    pub stage: i32,
    /// True when rolling back a failed migration.
    pub rollback: bool,
    /// True when only validating the migration.
    pub precheck: bool,
    /// Elements of this participant.
    pub elements: Vec<AcElementDeploy>,
    /// Creation time.
    pub timestamp: DateTime<Utc>,
}

/// Prepare or review command.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PrepareCommand {
    /// Message identifier.
    pub message_id: Uuid,
    /// Addressed participant.
    pub participant_id: Uuid,
    /// Instance identifier.
    pub automation_composition_id: Uuid,
    /// Definition identifier.
    pub composition_id: Uuid,
    /// Stage this command applies to.
    pub stage: i32,
    /// True for pre-deploy preparation, false for review.
    pub pre_deploy: bool,
    /// Elements of this participant.
    pub elements: Vec<AcElementDeploy>,
    /// Creation time.
    pub timestamp: DateTime<Utc>,
}

/// Prime or deprime command; depriming carries no definitions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PrimeCommand {
    /// Message identifier.
    pub message_id: Uuid,
    /// Addressed participant.
    pub participant_id: Uuid,
    /// Definition identifier.
    pub composition_id: Uuid,
    /// Node templates this participant primes.
    pub definitions: Vec<AcElementDefinition>,
    /// Creation time.
    pub timestamp: DateTime<Utc>,
}

/// Full state of one definition and its instances for one participant.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncPayload {
    /// Message identifier.
    pub message_id: Uuid,
    /// Addressed participant.
    pub participant_id: Uuid,
    /// Definition identifier.
    pub composition_id: Uuid,
    /// Priming state of the definition.
    pub state: AcTypeState,
    /// Node templates this participant owns.
    pub definitions: Vec<AcElementDefinition>,
    /// Instance snapshots restricted to this participant's elements.
    pub automation_composition_list: Vec<ParticipantRestartAc>,
    /// True when the participant should forget the listed instances.
    pub delete: bool,
    /// Creation time.
    pub timestamp: DateTime<Utc>,
}

/// Outbound message addressed to a single participant.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "messageType", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ParticipantMessage {
    /// Deploy elements of one phase.
    AutomationCompositionDeploy(DeployCommand),
    /// Apply updated properties.
    AutomationCompositionUpdate(DeployCommand),
    /// Change deploy or lock state of elements of one phase.
    AutomationCompositionStateChange(StateChangeCommand),
    /// Migrate elements of one stage.
    AutomationCompositionMigration(MigrateCommand),
    /// Prepare or review elements of one stage.
    AutomationCompositionPrepare(PrepareCommand),
    /// Prime or deprime node templates.
    ParticipantPrime(PrimeCommand),
    /// Broadcast of current state.
    ParticipantSync(SyncPayload),
    /// State a reconnecting participant needs to resume.
    ParticipantRestart(SyncPayload),
}

impl ParticipantMessage {
    /// Addressed participant.
    pub fn participant_id(&self) -> Uuid {
        match self {
            Self::AutomationCompositionDeploy(m) | Self::AutomationCompositionUpdate(m) => {
                m.participant_id
            }
            Self::AutomationCompositionStateChange(m) => m.participant_id,
            Self::AutomationCompositionMigration(m) => m.participant_id,
            Self::AutomationCompositionPrepare(m) => m.participant_id,
            Self::ParticipantPrime(m) => m.participant_id,
            Self::ParticipantSync(m) | Self::ParticipantRestart(m) => m.participant_id,
        }
    }

    /// Message type of this variant.
    pub fn message_type(&self) -> ParticipantMessageType {
        match self {
            Self::AutomationCompositionDeploy(_) => ParticipantMessageType::AutomationCompositionDeploy,
            Self::AutomationCompositionUpdate(_) => ParticipantMessageType::AutomationCompositionUpdate,
            Self::AutomationCompositionStateChange(_) => {
                ParticipantMessageType::AutomationCompositionStateChange
            }
            Self::AutomationCompositionMigration(_) => {
                ParticipantMessageType::AutomationCompositionMigration
            }
            Self::AutomationCompositionPrepare(_) => {
                ParticipantMessageType::AutomationCompositionPrepare
            }
            Self::ParticipantPrime(_) => ParticipantMessageType::ParticipantPrime,
            Self::ParticipantSync(_) => ParticipantMessageType::ParticipantSync,
            Self::ParticipantRestart(_) => ParticipantMessageType::ParticipantRestart,
        }
    }
}
