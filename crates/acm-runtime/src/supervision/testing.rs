// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Shared fixtures for the scanner unit tests.

use std::sync::Arc;

use acm_models::state_utils;
use acm_models::{
    AcTypeState, AutomationComposition, AutomationCompositionDefinition,
    AutomationCompositionElement, DeployState, LockState, NodeTemplate, ServiceTemplate, SubState,
    ToscaConceptIdentifier,
};
use serde_json::{Map, Value, json};
use uuid::Uuid;

use super::ScanContext;
use crate::config::OperationTimeouts;
use crate::publisher::{RecordingPublisher, SupervisionPublisher};
use crate::store::{InstanceStore, MemoryStore};

const ELEMENT_TYPE: &str = "org.onap.policy.clamp.acm.AutomationCompositionElement";

pub(crate) struct Harness {
    pub store: Arc<MemoryStore>,
    pub recorder: RecordingPublisher,
    pub ctx: ScanContext,
    pub definition: AutomationCompositionDefinition,
    pub p1: Uuid,
    pub p2: Uuid,
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

/// Primed definition: "a" (p1, phase 0, migrate [0, 2]), "b" (p2, phase 1, migrate [1]).
pub(crate) fn definition(p1: Uuid, p2: Uuid) -> AutomationCompositionDefinition {
    let mut service_template = ServiceTemplate {
        name: "fixture".to_string(),
        version: "1.0.0".to_string(),
        ..Default::default()
    };
    service_template.node_templates.insert(
        "a".to_string(),
        template(json!({"startPhase": 0, "stage": {"migrate": [0, 2], "prepare": [0]}})),
    );
    service_template.node_templates.insert(
        "b".to_string(),
        template(json!({"startPhase": 1, "stage": {"migrate": [1], "prepare": [1]}})),
    );
    let mut definition =
        AutomationCompositionDefinition::commission(Uuid::new_v4(), service_template);
    definition.assign_participant("a", p1);
    definition.assign_participant("b", p2);
    definition.set_cascaded_state(AcTypeState::Primed);
    definition
}

/// Instance with one "a" element on p1 and one "b" element on p2, in the given states.
pub(crate) fn instance(
    definition: &AutomationCompositionDefinition,
    p1: Uuid,
    p2: Uuid,
    deploy: DeployState,
    lock: LockState,
) -> AutomationComposition {
    let mut ac = AutomationComposition::new(
        Uuid::new_v4(),
        "fixture-instance",
        "1.0.0",
        definition.composition_id,
    );
    ac.elements.push(AutomationCompositionElement::new(
        Uuid::new_v4(),
        ToscaConceptIdentifier::new("a", "1.0.0"),
        p1,
    ));
    ac.elements.push(AutomationCompositionElement::new(
        Uuid::new_v4(),
        ToscaConceptIdentifier::new("b", "1.0.0"),
        p2,
    ));
    state_utils::set_cascaded_state(&mut ac, deploy, lock, SubState::None);
    ac
}

pub(crate) async fn harness(timeouts: OperationTimeouts) -> Harness {
    let store = Arc::new(MemoryStore::new());
    let recorder = RecordingPublisher::new();
    let p1 = Uuid::new_v4();
    let p2 = Uuid::new_v4();
    let definition = definition(p1, p2);
    store.save_definition(&definition).await.unwrap();
    let ctx = ScanContext::new(
        store.clone(),
        SupervisionPublisher::new(Arc::new(recorder.clone())),
        timeouts,
    );
    Harness {
        store,
        recorder,
        ctx,
        definition,
        p1,
        p2,
    }
}

impl Harness {
    pub async fn stored_instance(
        &self,
        deploy: DeployState,
        lock: LockState,
    ) -> AutomationComposition {
        let ac = instance(&self.definition, self.p1, self.p2, deploy, lock);
        self.store.save_instance(&ac).await.unwrap();
        ac
    }

    pub async fn reload(&self, ac: &AutomationComposition) -> Option<AutomationComposition> {
        self.store.get_instance(ac.instance_id).await.unwrap()
    }
}
