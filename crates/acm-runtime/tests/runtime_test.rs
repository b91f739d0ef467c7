// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! End-to-end tests through the embeddable runtime.
//!
//! Acknowledgements go through the inbound queue and are handled by the
//! background consumer, so assertions poll the store.

mod common;

use std::sync::Arc;
use std::time::Duration;

use acm_models::{
    AcTypeState, AutomationCompositionDefinition, DeployState, DocMessage, LockState,
    ParticipantMessageType,
};
use acm_runtime::publisher::RecordingPublisher;
use acm_runtime::runtime::SupervisionRuntime;
use acm_runtime::store::{InstanceStore, MemoryStore};
use common::{MICROSERVICE, POLICY, VERSION};
use uuid::Uuid;

async fn wait_for<F, Fut>(mut check: F)
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = bool>,
{
    for _ in 0..200 {
        if check().await {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("condition not reached within 2s");
}

#[tokio::test]
async fn test_runtime_deploys_through_inbound_queue() {
    let store = Arc::new(MemoryStore::new());
    let recorder = RecordingPublisher::new();
    let (p1, p2) = (Uuid::new_v4(), Uuid::new_v4());

    let mut definition =
        AutomationCompositionDefinition::commission(Uuid::new_v4(), common::service_template());
    definition.assign_participant(MICROSERVICE, p1);
    definition.assign_participant(POLICY, p2);
    definition.set_cascaded_state(AcTypeState::Primed);
    store.save_definition(&definition).await.unwrap();

    let mut ac = acm_models::AutomationComposition::new(
        Uuid::new_v4(),
        "runtime-instance",
        "1.0.0",
        definition.composition_id,
    );
    for (name, participant) in [(MICROSERVICE, p1), (POLICY, p2)] {
        ac.elements.push(acm_models::AutomationCompositionElement::new(
            Uuid::new_v4(),
            acm_models::ToscaConceptIdentifier::new(name, VERSION),
            participant,
        ));
    }
    store.save_instance(&ac).await.unwrap();

    let runtime = SupervisionRuntime::builder()
        .store(store.clone())
        .publisher(Arc::new(recorder.clone()))
        .scan_interval(Duration::from_secs(60))
        .build()
        .unwrap()
        .start()
        .await
        .unwrap();

    runtime.transitions().deploy(ac.instance_id).await.unwrap();

    let inbound = runtime.inbound();
    for element in &ac.elements {
        inbound
            .send(DocMessage::element_ack(
                ParticipantMessageType::AutomationCompositionDeployAck,
                element.participant_id,
                ac.instance_id,
                element.id,
                DeployState::Deployed,
                LockState::Locked,
            ))
            .await
            .unwrap();
    }

    let instance_id = ac.instance_id;
    wait_for(|| {
        let store = store.clone();
        async move {
            store
                .get_instance(instance_id)
                .await
                .unwrap()
                .is_some_and(|ac| ac.deploy_state == DeployState::Deployed)
        }
    })
    .await;

    let syncs = recorder
        .of_type(ParticipantMessageType::ParticipantSync)
        .await;
    assert_eq!(syncs.len(), 2);

    runtime.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_runtime_sweep_times_out_in_background() {
    let store = Arc::new(MemoryStore::new());
    let p1 = Uuid::new_v4();
    let p2 = Uuid::new_v4();
    let mut definition =
        AutomationCompositionDefinition::commission(Uuid::new_v4(), common::service_template());
    definition.assign_participant(MICROSERVICE, p1);
    definition.assign_participant(POLICY, p2);
    store.save_definition(&definition).await.unwrap();

    let runtime = SupervisionRuntime::builder()
        .store(store.clone())
        .publisher(Arc::new(RecordingPublisher::new()))
        .scan_interval(Duration::from_millis(20))
        .timeouts(acm_runtime::config::OperationTimeouts::uniform(-1))
        .build()
        .unwrap()
        .start()
        .await
        .unwrap();

    runtime
        .transitions()
        .prime(definition.composition_id)
        .await
        .unwrap();

    let composition_id = definition.composition_id;
    wait_for(|| {
        let store = store.clone();
        async move {
            store
                .get_definition(composition_id)
                .await
                .unwrap()
                .is_some_and(|d| {
                    d.state_change_result == acm_models::StateChangeResult::Timeout
                })
        }
    })
    .await;

    assert!(runtime.is_running());
    runtime.shutdown().await.unwrap();
}
