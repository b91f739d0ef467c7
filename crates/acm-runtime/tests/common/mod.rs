// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Common test infrastructure for acm-runtime integration tests.
//!
//! Provides [`TestContext`], an in-memory store, a recording publisher and the
//! engine services wired the way [`SupervisionRuntime`] wires them.
//!
//! [`SupervisionRuntime`]: acm_runtime::runtime::SupervisionRuntime

#![allow(dead_code)]

use std::sync::Arc;

use acm_models::state_utils;
use acm_models::{
    AcTypeState, AutomationComposition, AutomationCompositionDefinition,
    AutomationCompositionElement, DeployState, DocMessage, LockState, ParticipantMessageType,
    ServiceTemplate, SubState, ToscaConceptIdentifier,
};
use acm_runtime::config::OperationTimeouts;
use acm_runtime::handler::SupervisionHandler;
use acm_runtime::locks::KeyedLocks;
use acm_runtime::publisher::{RecordingPublisher, SupervisionPublisher};
use acm_runtime::store::{InstanceStore, MemoryStore};
use acm_runtime::supervision::SupervisionScanner;
use acm_runtime::transitions::TransitionService;
use uuid::Uuid;

/// Node template deployed in phase 0, migrated in stages 0 and 2.
pub const MICROSERVICE: &str = "org.onap.domain.pmsh.PMSH_DCAEMicroservice";
/// Node template deployed in phase 1, migrated in stage 1.
pub const POLICY: &str = "org.onap.domain.pmsh.PMSH_MonitoringPolicy";
/// Node template version used in the fixture.
pub const VERSION: &str = "1.2.3";

/// Load the service template fixture.
pub fn service_template() -> ServiceTemplate {
    serde_yaml::from_str(include_str!("../fixtures/service_template.yaml"))
        .expect("service template fixture should parse")
}

/// Engine services over a memory store and a recording publisher.
pub struct TestContext {
    pub store: Arc<MemoryStore>,
    pub recorder: RecordingPublisher,
    pub scanner: Arc<SupervisionScanner>,
    pub handler: SupervisionHandler,
    pub transitions: TransitionService,
    /// Owns the microservice element.
    pub p1: Uuid,
    /// Owns the policy element.
    pub p2: Uuid,
}

impl TestContext {
    /// Create a context with the given timeouts.
    pub fn new(timeouts: OperationTimeouts) -> Self {
        let store = Arc::new(MemoryStore::new());
        let recorder = RecordingPublisher::new();
        let publisher = SupervisionPublisher::new(Arc::new(recorder.clone()));
        let locks = Arc::new(KeyedLocks::new());
        let scanner = Arc::new(SupervisionScanner::new(
            store.clone(),
            publisher.clone(),
            timeouts,
            locks.clone(),
        ));
        let handler = SupervisionHandler::new(store.clone(), publisher.clone(), scanner.clone());
        let transitions = TransitionService::new(store.clone(), publisher, locks);
        Self {
            store,
            recorder,
            scanner,
            handler,
            transitions,
            p1: Uuid::new_v4(),
            p2: Uuid::new_v4(),
        }
    }

    /// Commission the fixture with both participants assigned, in `state`.
    pub async fn definition(&self, state: AcTypeState) -> AutomationCompositionDefinition {
        let mut definition =
            AutomationCompositionDefinition::commission(Uuid::new_v4(), service_template());
        definition.assign_participant(MICROSERVICE, self.p1);
        definition.assign_participant(POLICY, self.p2);
        definition.set_cascaded_state(state);
        self.store.save_definition(&definition).await.unwrap();
        definition
    }

    /// Store an instance of `definition` with one element per participant.
    pub async fn instance(
        &self,
        definition: &AutomationCompositionDefinition,
        deploy: DeployState,
        lock: LockState,
    ) -> AutomationComposition {
        let mut ac = AutomationComposition::new(
            Uuid::new_v4(),
            "pmsh-instance",
            "1.0.0",
            definition.composition_id,
        );
        ac.elements.push(AutomationCompositionElement::new(
            Uuid::new_v4(),
            ToscaConceptIdentifier::new(MICROSERVICE, VERSION),
            self.p1,
        ));
        ac.elements.push(AutomationCompositionElement::new(
            Uuid::new_v4(),
            ToscaConceptIdentifier::new(POLICY, VERSION),
            self.p2,
        ));
        state_utils::set_cascaded_state(&mut ac, deploy, lock, SubState::None);
        self.store.save_instance(&ac).await.unwrap();
        ac
    }

    /// Reload an instance; `None` once it has been deleted.
    pub async fn reload(&self, instance_id: Uuid) -> Option<AutomationComposition> {
        self.store.get_instance(instance_id).await.unwrap()
    }

    /// Reload a definition.
    pub async fn reload_definition(&self, composition_id: Uuid) -> AutomationCompositionDefinition {
        self.store
            .get_definition(composition_id)
            .await
            .unwrap()
            .expect("definition should exist")
    }

    /// Deliver an acknowledgement for one element of `ac`.
    pub async fn ack(
        &self,
        ac: &AutomationComposition,
        index: usize,
        message_type: ParticipantMessageType,
        deploy: DeployState,
        lock: LockState,
        stage: Option<i32>,
    ) {
        let element = &ac.elements[index];
        let mut message = DocMessage::element_ack(
            message_type,
            element.participant_id,
            ac.instance_id,
            element.id,
            deploy,
            lock,
        );
        message.stage = stage;
        self.handler.handle(message).await.unwrap();
    }
}
