// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Per-participant message batching.
//!
//! Every builder here turns one reconciliation step into at most one
//! [`ParticipantMessage`] per participant. Element payloads are grouped by
//! owning participant; a participant with nothing to do at the current
//! phase or stage gets no message at all.
//!
//! ```text
//!   elements                       messages
//!   ┌────────────┬──────┐          ┌──────────────────────────┐
//!   │ e1  (p1)   │ ph 0 │ ───┐     │ p1: deploy ph 0 [e1, e3] │
//!   │ e2  (p2)   │ ph 1 │    ├───► └──────────────────────────┘
//!   │ e3  (p1)   │ ph 0 │ ───┘     (p2 waits for phase 1)
//!   └────────────┴──────┘
//! ```

use std::collections::{BTreeMap, BTreeSet};

use acm_models::concepts::{
    AutomationComposition, AutomationCompositionDefinition, AutomationCompositionElement,
};
use acm_models::messages::{
    AcElementDefinition, AcElementDeploy, AcElementRestart, DeployCommand, MigrateCommand,
    ParticipantMessage, ParticipantRestartAc, PrepareCommand, PrimeCommand, StateChangeCommand,
    SyncPayload,
};
use acm_models::properties;
use acm_models::stage_utils::{self, StageEpisode};
use acm_models::state::{AcTypeState, DeployOrder, DeployState, MigrationState};
use acm_models::state_utils;
use chrono::Utc;
use serde_json::{Map, Value};
use uuid::Uuid;

fn by_participant<T>(items: impl IntoIterator<Item = (Uuid, T)>) -> BTreeMap<Uuid, Vec<T>> {
    let mut grouped: BTreeMap<Uuid, Vec<T>> = BTreeMap::new();
    for (participant_id, item) in items {
        grouped.entry(participant_id).or_default().push(item);
    }
    grouped
}

/// Node template defaults with the element's own properties merged on top.
pub fn element_properties(
    element: &AutomationCompositionElement,
    definition: &AutomationCompositionDefinition,
) -> Map<String, Value> {
    match definition.service_template.node_template(&element.definition) {
        Some(template) => properties::merged(&template.properties, &element.properties),
        None => element.properties.clone(),
    }
}

fn element_deploy(
    element: &AutomationCompositionElement,
    definition: &AutomationCompositionDefinition,
    ordered_state: DeployOrder,
) -> AcElementDeploy {
    AcElementDeploy {
        id: element.id,
        definition: element.definition.clone(),
        ordered_state,
        properties: element_properties(element, definition),
        migration_state: element.migration_state,
    }
}

fn phase_elements(
    ac: &AutomationComposition,
    definition: &AutomationCompositionDefinition,
    start_phase: i32,
    ordered_state: DeployOrder,
) -> BTreeMap<Uuid, Vec<AcElementDeploy>> {
    by_participant(
        ac.elements
            .iter()
            .filter(|element| element.is_in_transition())
            .filter(|element| {
                stage_utils::resolve_start_phase(element, definition).unwrap_or(0) == start_phase
            })
            .map(|element| {
                (
                    element.participant_id,
                    element_deploy(element, definition, ordered_state),
                )
            }),
    )
}

/// Deploy commands for the elements starting at `start_phase`.
pub fn deploy_messages(
    ac: &AutomationComposition,
    definition: &AutomationCompositionDefinition,
    start_phase: i32,
    first_start_phase: bool,
) -> Vec<ParticipantMessage> {
    phase_elements(ac, definition, start_phase, DeployOrder::Deploy)
        .into_iter()
        .map(|(participant_id, elements)| {
            ParticipantMessage::AutomationCompositionDeploy(DeployCommand {
                message_id: Uuid::new_v4(),
                participant_id,
                automation_composition_id: ac.instance_id,
                composition_id: ac.composition_id,
                start_phase,
                first_start_phase,
                elements,
                timestamp: Utc::now(),
            })
        })
        .collect()
}

/// State change commands for the elements starting at `start_phase`.
pub fn state_change_messages(
    ac: &AutomationComposition,
    definition: &AutomationCompositionDefinition,
    start_phase: i32,
    first_start_phase: bool,
) -> Vec<ParticipantMessage> {
    let deploy_order = state_utils::state_deploy_to_order(ac.deploy_state);
    let lock_order = state_utils::state_lock_to_order(ac.lock_state);
    phase_elements(ac, definition, start_phase, deploy_order)
        .into_iter()
        .map(|(participant_id, elements)| {
            ParticipantMessage::AutomationCompositionStateChange(StateChangeCommand {
                message_id: Uuid::new_v4(),
                participant_id,
                automation_composition_id: ac.instance_id,
                composition_id: ac.composition_id,
                deploy_order_state: deploy_order,
                lock_order_state: lock_order,
                start_phase,
                first_start_phase,
                elements,
                timestamp: Utc::now(),
            })
        })
        .collect()
}

/// Property update commands covering every element.
pub fn update_messages(
    ac: &AutomationComposition,
    definition: &AutomationCompositionDefinition,
) -> Vec<ParticipantMessage> {
    by_participant(ac.elements.iter().map(|element| {
        (
            element.participant_id,
            element_deploy(element, definition, DeployOrder::Update),
        )
    }))
    .into_iter()
    .map(|(participant_id, elements)| {
        ParticipantMessage::AutomationCompositionUpdate(DeployCommand {
            message_id: Uuid::new_v4(),
            participant_id,
            automation_composition_id: ac.instance_id,
            composition_id: ac.composition_id,
            start_phase: 0,
            first_start_phase: true,
            elements,
            timestamp: Utc::now(),
        })
    })
    .collect()
}

/// Stage an in-flight element is executing, defaulting to the first stage of its set.
pub fn element_current_stage(
    element: &AutomationCompositionElement,
    definition: &AutomationCompositionDefinition,
    episode: StageEpisode,
) -> i32 {
    element.stage.unwrap_or_else(|| {
        stage_utils::element_stage_set(element, definition, episode)
            .first()
            .copied()
            .unwrap_or(0)
    })
}

fn migrate_order(element: &AutomationCompositionElement) -> DeployOrder {
    match element.migration_state {
        MigrationState::Removed => DeployOrder::Delete,
        _ => DeployOrder::Migrate,
    }
}

/// Migrate (or revert) commands for the in-flight elements executing `stage`.
///
/// `definition` is the definition the instance is moving *to*: the target for a forward
/// migration, the current one for a revert.
pub fn migrate_messages(
    ac: &AutomationComposition,
    definition: &AutomationCompositionDefinition,
    stage: i32,
) -> Vec<ParticipantMessage> {
    let rollback = ac.deploy_state == DeployState::MigrationReverting;
    let (from, to) = if rollback {
        (
            ac.composition_target_id.unwrap_or(ac.composition_id),
            ac.composition_id,
        )
    } else {
        (
            ac.composition_id,
            ac.composition_target_id.unwrap_or(definition.composition_id),
        )
    };

    by_participant(
        ac.elements
            .iter()
            .filter(|element| element.is_in_transition())
            .filter(|element| {
                element_current_stage(element, definition, StageEpisode::Migrate) == stage
            })
            .map(|element| {
                (
                    element.participant_id,
                    element_deploy(element, definition, migrate_order(element)),
                )
            }),
    )
    .into_iter()
    .map(|(participant_id, elements)| {
        ParticipantMessage::AutomationCompositionMigration(MigrateCommand {
            message_id: Uuid::new_v4(),
            participant_id,
            automation_composition_id: ac.instance_id,
            composition_id: from,
            composition_target_id: to,
            stage,
            rollback,
            precheck: false,
            elements,
            timestamp: Utc::now(),
        })
    })
    .collect()
}

/// Migration precheck commands covering every element, resolved against `target`.
pub fn migrate_precheck_messages(
    ac: &AutomationComposition,
    target: &AutomationCompositionDefinition,
) -> Vec<ParticipantMessage> {
    by_participant(ac.elements.iter().map(|element| {
        (
            element.participant_id,
            element_deploy(element, target, migrate_order(element)),
        )
    }))
    .into_iter()
    .map(|(participant_id, elements)| {
        ParticipantMessage::AutomationCompositionMigration(MigrateCommand {
            message_id: Uuid::new_v4(),
            participant_id,
            automation_composition_id: ac.instance_id,
            composition_id: ac.composition_id,
            composition_target_id: target.composition_id,
            stage: 0,
            rollback: false,
            precheck: true,
            elements,
            timestamp: Utc::now(),
        })
    })
    .collect()
}

/// Prepare (`pre_deploy`) or review commands for the in-flight elements executing `stage`.
pub fn prepare_messages(
    ac: &AutomationComposition,
    definition: &AutomationCompositionDefinition,
    stage: i32,
    pre_deploy: bool,
) -> Vec<ParticipantMessage> {
    by_participant(
        ac.elements
            .iter()
            .filter(|element| element.is_in_transition())
            .filter(|element| {
                element_current_stage(element, definition, StageEpisode::Prepare) == stage
            })
            .map(|element| {
                (
                    element.participant_id,
                    element_deploy(element, definition, DeployOrder::None),
                )
            }),
    )
    .into_iter()
    .map(|(participant_id, elements)| {
        ParticipantMessage::AutomationCompositionPrepare(PrepareCommand {
            message_id: Uuid::new_v4(),
            participant_id,
            automation_composition_id: ac.instance_id,
            composition_id: ac.composition_id,
            stage,
            pre_deploy,
            elements,
            timestamp: Utc::now(),
        })
    })
    .collect()
}

/// Review commands covering every in-flight element, regardless of stage.
pub fn review_messages(
    ac: &AutomationComposition,
    definition: &AutomationCompositionDefinition,
) -> Vec<ParticipantMessage> {
    by_participant(
        ac.elements
            .iter()
            .filter(|element| element.is_in_transition())
            .map(|element| {
                (
                    element.participant_id,
                    element_deploy(element, definition, DeployOrder::None),
                )
            }),
    )
    .into_iter()
    .map(|(participant_id, elements)| {
        ParticipantMessage::AutomationCompositionPrepare(PrepareCommand {
            message_id: Uuid::new_v4(),
            participant_id,
            automation_composition_id: ac.instance_id,
            composition_id: ac.composition_id,
            stage: 0,
            pre_deploy: false,
            elements,
            timestamp: Utc::now(),
        })
    })
    .collect()
}

/// Node templates of `definition` owned by `participant_id`.
pub fn participant_definitions(
    definition: &AutomationCompositionDefinition,
    participant_id: Uuid,
) -> Vec<AcElementDefinition> {
    definition
        .element_state_map
        .iter()
        .filter(|(_, state)| state.participant_id == Some(participant_id))
        .filter_map(|(name, state)| {
            definition
                .service_template
                .node_templates
                .get(name)
                .map(|template| AcElementDefinition {
                    ac_element_definition_id: state.node_template_id.clone(),
                    automation_composition_element_tosca_node_template: template.clone(),
                    out_properties: state.out_properties.clone(),
                })
        })
        .collect()
}

/// Prime commands, one per participant owning a node template.
pub fn prime_messages(definition: &AutomationCompositionDefinition) -> Vec<ParticipantMessage> {
    definition
        .participant_ids()
        .into_iter()
        .map(|participant_id| {
            ParticipantMessage::ParticipantPrime(PrimeCommand {
                message_id: Uuid::new_v4(),
                participant_id,
                composition_id: definition.composition_id,
                definitions: participant_definitions(definition, participant_id),
                timestamp: Utc::now(),
            })
        })
        .collect()
}

/// Deprime commands, one per participant owning a node template.
pub fn deprime_messages(definition: &AutomationCompositionDefinition) -> Vec<ParticipantMessage> {
    definition
        .participant_ids()
        .into_iter()
        .map(|participant_id| {
            ParticipantMessage::ParticipantPrime(PrimeCommand {
                message_id: Uuid::new_v4(),
                participant_id,
                composition_id: definition.composition_id,
                definitions: Vec::new(),
                timestamp: Utc::now(),
            })
        })
        .collect()
}

fn element_restart(element: &AutomationCompositionElement) -> AcElementRestart {
    AcElementRestart {
        id: element.id,
        definition: element.definition.clone(),
        participant_id: element.participant_id,
        deploy_state: element.deploy_state,
        lock_state: element.lock_state,
        sub_state: element.sub_state,
        operational_state: element.operational_state.clone(),
        use_state: element.use_state.clone(),
        properties: element.properties.clone(),
        out_properties: element.out_properties.clone(),
    }
}

/// Snapshot of `ac` restricted to the elements `participant_id` owns.
pub fn participant_snapshot(ac: &AutomationComposition, participant_id: Uuid) -> ParticipantRestartAc {
    ParticipantRestartAc {
        automation_composition_id: ac.instance_id,
        composition_target_id: ac.composition_target_id,
        ac_element_list: ac
            .elements
            .iter()
            .filter(|element| element.participant_id == participant_id)
            .map(element_restart)
            .collect(),
    }
}

/// Full-state broadcast of an instance, one message per participant it spans.
pub fn sync_messages(
    ac: &AutomationComposition,
    definition: &AutomationCompositionDefinition,
) -> Vec<ParticipantMessage> {
    ac.participant_ids()
        .into_iter()
        .map(|participant_id| {
            let names: BTreeSet<&str> = ac
                .elements
                .iter()
                .filter(|element| element.participant_id == participant_id)
                .map(|element| element.definition.name.as_str())
                .collect();
            let definitions = participant_definitions(definition, participant_id)
                .into_iter()
                .filter(|d| names.contains(d.ac_element_definition_id.name.as_str()))
                .collect();

            ParticipantMessage::ParticipantSync(SyncPayload {
                message_id: Uuid::new_v4(),
                participant_id,
                composition_id: ac.composition_id,
                state: definition.state,
                definitions,
                automation_composition_list: vec![participant_snapshot(ac, participant_id)],
                delete: ac.deploy_state == DeployState::Deleted,
                timestamp: Utc::now(),
            })
        })
        .collect()
}

/// Full-state broadcast of a definition, one message per participant owning a node template.
pub fn definition_sync_messages(
    definition: &AutomationCompositionDefinition,
) -> Vec<ParticipantMessage> {
    definition
        .participant_ids()
        .into_iter()
        .map(|participant_id| {
            ParticipantMessage::ParticipantSync(SyncPayload {
                message_id: Uuid::new_v4(),
                participant_id,
                composition_id: definition.composition_id,
                state: definition.state,
                definitions: participant_definitions(definition, participant_id),
                automation_composition_list: Vec::new(),
                delete: definition.state == AcTypeState::Commissioned,
                timestamp: Utc::now(),
            })
        })
        .collect()
}

/// Tell `participant_id` it no longer owns any element of `ac`.
pub fn delete_sync_message(ac: &AutomationComposition, participant_id: Uuid) -> ParticipantMessage {
    ParticipantMessage::ParticipantSync(SyncPayload {
        message_id: Uuid::new_v4(),
        participant_id,
        composition_id: ac.composition_id,
        state: AcTypeState::Primed,
        definitions: Vec::new(),
        automation_composition_list: vec![ParticipantRestartAc {
            automation_composition_id: ac.instance_id,
            composition_target_id: ac.composition_target_id,
            ac_element_list: Vec::new(),
        }],
        delete: true,
        timestamp: Utc::now(),
    })
}

/// Everything a reconnecting participant needs about one definition and its instances.
///
/// Only instances referencing `definition` (as current or target) and only the elements
/// `participant_id` owns are included.
pub fn restart_message(
    participant_id: Uuid,
    definition: &AutomationCompositionDefinition,
    instances: &[AutomationComposition],
) -> ParticipantMessage {
    let automation_composition_list = instances
        .iter()
        .filter(|ac| {
            ac.composition_id == definition.composition_id
                || ac.composition_target_id == Some(definition.composition_id)
        })
        .map(|ac| participant_snapshot(ac, participant_id))
        .filter(|snapshot| !snapshot.ac_element_list.is_empty())
        .collect();

    ParticipantMessage::ParticipantRestart(SyncPayload {
        message_id: Uuid::new_v4(),
        participant_id,
        composition_id: definition.composition_id,
        state: definition.state,
        definitions: participant_definitions(definition, participant_id),
        automation_composition_list,
        delete: false,
        timestamp: Utc::now(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use acm_models::concepts::{NodeTemplate, ServiceTemplate, ToscaConceptIdentifier};
    use acm_models::state::{LockOrder, LockState};
    use serde_json::json;

    const ELEMENT_TYPE: &str = "org.onap.policy.clamp.acm.AutomationCompositionElement";

    struct Fixture {
        definition: AutomationCompositionDefinition,
        ac: AutomationComposition,
        p1: Uuid,
        p2: Uuid,
    }

    fn template(properties: Value) -> NodeTemplate {
        NodeTemplate {
            version: "1.0.0".to_string(),
            type_name: ELEMENT_TYPE.to_string(),
            properties: match properties {
                Value::Object(map) => map,
                _ => Map::new(),
            },
            ..Default::default()
        }
    }

    // e1 (p1, phase 0), e2 (p2, phase 1), e3 (p1, phase 0)
    fn fixture() -> Fixture {
        let p1 = Uuid::new_v4();
        let p2 = Uuid::new_v4();
        let mut service_template = ServiceTemplate::default();
        service_template.node_templates.insert(
            "a".to_string(),
            template(json!({"startPhase": 0, "url": "http://a", "headers": {"x": "1"}})),
        );
        service_template.node_templates.insert(
            "b".to_string(),
            template(json!({"startPhase": 1, "stage": {"migrate": [2]}})),
        );
        let mut definition =
            AutomationCompositionDefinition::commission(Uuid::new_v4(), service_template);
        definition.assign_participant("a", p1);
        definition.assign_participant("b", p2);

        let mut ac = AutomationComposition::new(
            Uuid::new_v4(),
            "ac",
            "1.0.0",
            definition.composition_id,
        );
        for (name, participant) in [("a", p1), ("b", p2), ("a", p1)] {
            ac.elements.push(AutomationCompositionElement::new(
                Uuid::new_v4(),
                ToscaConceptIdentifier::new(name, "1.0.0"),
                participant,
            ));
        }
        ac.elements[0]
            .properties
            .insert("headers".to_string(), json!({"y": "2"}));
        state_utils::set_cascaded_state(
            &mut ac,
            DeployState::Deploying,
            LockState::None,
            acm_models::SubState::None,
        );

        Fixture {
            definition,
            ac,
            p1,
            p2,
        }
    }

    #[test]
    fn test_deploy_groups_by_participant_and_phase() {
        let f = fixture();

        let messages = deploy_messages(&f.ac, &f.definition, 0, true);
        assert_eq!(messages.len(), 1);
        let ParticipantMessage::AutomationCompositionDeploy(cmd) = &messages[0] else {
            panic!("expected deploy command");
        };
        assert_eq!(cmd.participant_id, f.p1);
        assert_eq!(cmd.elements.len(), 2);
        assert!(cmd.first_start_phase);
        assert_eq!(
            Value::Object(cmd.elements[0].properties.clone()),
            json!({"startPhase": 0, "url": "http://a", "headers": {"x": "1", "y": "2"}})
        );

        let messages = deploy_messages(&f.ac, &f.definition, 1, false);
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].participant_id(), f.p2);
    }

    #[test]
    fn test_completed_elements_are_not_resent() {
        let mut f = fixture();
        f.ac.elements[0].deploy_state = DeployState::Deployed;

        let messages = deploy_messages(&f.ac, &f.definition, 0, true);
        let ParticipantMessage::AutomationCompositionDeploy(cmd) = &messages[0] else {
            panic!("expected deploy command");
        };
        assert_eq!(cmd.elements.len(), 1);
        assert_eq!(cmd.elements[0].id, f.ac.elements[2].id);
    }

    #[test]
    fn test_state_change_orders() {
        let mut f = fixture();
        state_utils::set_cascaded_state(
            &mut f.ac,
            DeployState::Deployed,
            LockState::Unlocking,
            acm_models::SubState::None,
        );

        let messages = state_change_messages(&f.ac, &f.definition, 1, false);
        assert_eq!(messages.len(), 1);
        let ParticipantMessage::AutomationCompositionStateChange(cmd) = &messages[0] else {
            panic!("expected state change command");
        };
        assert_eq!(cmd.deploy_order_state, DeployOrder::None);
        assert_eq!(cmd.lock_order_state, LockOrder::Unlock);
    }

    #[test]
    fn test_migrate_targets_current_stage_only() {
        let mut f = fixture();
        let target = f.definition.clone();
        f.ac.composition_target_id = Some(Uuid::new_v4());
        state_utils::set_cascaded_state(
            &mut f.ac,
            DeployState::Migrating,
            LockState::Locked,
            acm_models::SubState::None,
        );
        f.ac.elements[2].migration_state = MigrationState::Removed;

        let stage_zero = migrate_messages(&f.ac, &target, 0);
        assert_eq!(stage_zero.len(), 1);
        let ParticipantMessage::AutomationCompositionMigration(cmd) = &stage_zero[0] else {
            panic!("expected migrate command");
        };
        assert_eq!(cmd.participant_id, f.p1);
        assert!(!cmd.rollback);
        assert_eq!(cmd.composition_target_id, f.ac.composition_target_id.unwrap());
        assert_eq!(cmd.elements[1].ordered_state, DeployOrder::Delete);

        let stage_two = migrate_messages(&f.ac, &target, 2);
        assert_eq!(stage_two.len(), 1);
        assert_eq!(stage_two[0].participant_id(), f.p2);
    }

    #[test]
    fn test_review_covers_every_stage() {
        let mut f = fixture();
        state_utils::set_cascaded_state(
            &mut f.ac,
            DeployState::Deployed,
            LockState::Locked,
            acm_models::SubState::Reviewing,
        );

        let messages = review_messages(&f.ac, &f.definition);
        assert_eq!(messages.len(), 2);
        let total: usize = messages
            .iter()
            .map(|m| match m {
                ParticipantMessage::AutomationCompositionPrepare(cmd) => {
                    assert!(!cmd.pre_deploy);
                    cmd.elements.len()
                }
                other => panic!("unexpected message {other:?}"),
            })
            .sum();
        assert_eq!(total, 3);
    }

    #[test]
    fn test_prime_and_deprime() {
        let f = fixture();

        let prime = prime_messages(&f.definition);
        assert_eq!(prime.len(), 2);
        for message in &prime {
            let ParticipantMessage::ParticipantPrime(cmd) = message else {
                panic!("expected prime command");
            };
            assert_eq!(cmd.definitions.len(), 1);
        }

        let deprime = deprime_messages(&f.definition);
        assert!(deprime.iter().all(|m| matches!(
            m,
            ParticipantMessage::ParticipantPrime(cmd) if cmd.definitions.is_empty()
        )));
    }

    #[test]
    fn test_restart_contains_only_owned_elements() {
        let f = fixture();
        let unrelated = AutomationComposition::new(Uuid::new_v4(), "other", "1.0.0", Uuid::new_v4());

        let message = restart_message(f.p2, &f.definition, &[f.ac.clone(), unrelated]);
        let ParticipantMessage::ParticipantRestart(payload) = message else {
            panic!("expected restart payload");
        };
        assert_eq!(payload.definitions.len(), 1);
        assert_eq!(payload.automation_composition_list.len(), 1);
        let elements = &payload.automation_composition_list[0].ac_element_list;
        assert_eq!(elements.len(), 1);
        assert_eq!(elements[0].id, f.ac.elements[1].id);
        assert_eq!(elements[0].deploy_state, DeployState::Deploying);
    }

    #[test]
    fn test_sync_and_delete_sync() {
        let mut f = fixture();
        f.ac.deploy_state = DeployState::Deleted;

        let sync = sync_messages(&f.ac, &f.definition);
        assert_eq!(sync.len(), 2);
        assert!(sync.iter().all(|m| matches!(
            m,
            ParticipantMessage::ParticipantSync(payload) if payload.delete
        )));

        let ParticipantMessage::ParticipantSync(payload) = delete_sync_message(&f.ac, f.p1) else {
            panic!("expected sync payload");
        };
        assert!(payload.delete);
        assert!(payload.automation_composition_list[0].ac_element_list.is_empty());
    }
}
