// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! In-process store.
//!
//! Keeps clones of every instance and definition behind a `RwLock`. Used by
//! tests and by embedders that persist elsewhere.

use std::collections::HashMap;

use acm_models::{AutomationComposition, AutomationCompositionDefinition};
use async_trait::async_trait;
use tokio::sync::RwLock;
use uuid::Uuid;

use super::{InstanceStore, StoreError};

/// In-memory [`InstanceStore`].
#[derive(Default)]
pub struct MemoryStore {
    instances: RwLock<HashMap<Uuid, AutomationComposition>>,
    definitions: RwLock<HashMap<Uuid, AutomationCompositionDefinition>>,
}

impl MemoryStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored instances.
    pub async fn instance_count(&self) -> usize {
        self.instances.read().await.len()
    }
}

#[async_trait]
impl InstanceStore for MemoryStore {
    async fn get_instance(
        &self,
        instance_id: Uuid,
    ) -> Result<Option<AutomationComposition>, StoreError> {
        Ok(self.instances.read().await.get(&instance_id).cloned())
    }

    async fn list_instances_in_transition(
        &self,
    ) -> Result<Vec<AutomationComposition>, StoreError> {
        let mut instances: Vec<_> = self
            .instances
            .read()
            .await
            .values()
            .filter(|ac| ac.is_in_transition())
            .cloned()
            .collect();
        instances.sort_by_key(|ac| ac.last_msg);
        Ok(instances)
    }

    async fn list_instances_by_participant(
        &self,
        participant_id: Uuid,
    ) -> Result<Vec<AutomationComposition>, StoreError> {
        Ok(self
            .instances
            .read()
            .await
            .values()
            .filter(|ac| ac.participant_ids().contains(&participant_id))
            .cloned()
            .collect())
    }

    async fn save_instance(&self, ac: &AutomationComposition) -> Result<(), StoreError> {
        let mut instances = self.instances.write().await;
        if instances.contains_key(&ac.instance_id) {
            return Err(StoreError::AlreadyExists(ac.instance_id));
        }
        instances.insert(ac.instance_id, ac.clone());
        Ok(())
    }

    async fn update_instance(
        &self,
        ac: &AutomationComposition,
    ) -> Result<AutomationComposition, StoreError> {
        let mut instances = self.instances.write().await;
        match instances.get_mut(&ac.instance_id) {
            Some(stored) => {
                *stored = ac.clone();
                Ok(stored.clone())
            }
            None => Err(StoreError::InstanceNotFound(ac.instance_id)),
        }
    }

    async fn delete_instance(&self, instance_id: Uuid) -> Result<(), StoreError> {
        self.instances
            .write()
            .await
            .remove(&instance_id)
            .map(|_| ())
            .ok_or(StoreError::InstanceNotFound(instance_id))
    }

    async fn delete_element(&self, instance_id: Uuid, element_id: Uuid) -> Result<(), StoreError> {
        let mut instances = self.instances.write().await;
        let ac = instances
            .get_mut(&instance_id)
            .ok_or(StoreError::InstanceNotFound(instance_id))?;
        ac.remove_element(element_id);
        Ok(())
    }

    async fn get_definition(
        &self,
        composition_id: Uuid,
    ) -> Result<Option<AutomationCompositionDefinition>, StoreError> {
        Ok(self.definitions.read().await.get(&composition_id).cloned())
    }

    async fn list_definitions_in_transition(
        &self,
    ) -> Result<Vec<AutomationCompositionDefinition>, StoreError> {
        Ok(self
            .definitions
            .read()
            .await
            .values()
            .filter(|definition| definition.is_in_transition())
            .cloned()
            .collect())
    }

    async fn list_definitions_by_participant(
        &self,
        participant_id: Uuid,
    ) -> Result<Vec<AutomationCompositionDefinition>, StoreError> {
        Ok(self
            .definitions
            .read()
            .await
            .values()
            .filter(|definition| definition.participant_ids().contains(&participant_id))
            .cloned()
            .collect())
    }

    async fn save_definition(
        &self,
        definition: &AutomationCompositionDefinition,
    ) -> Result<(), StoreError> {
        let mut definitions = self.definitions.write().await;
        if definitions.contains_key(&definition.composition_id) {
            return Err(StoreError::AlreadyExists(definition.composition_id));
        }
        definitions.insert(definition.composition_id, definition.clone());
        Ok(())
    }

    async fn update_definition_state(
        &self,
        definition: &AutomationCompositionDefinition,
    ) -> Result<(), StoreError> {
        let mut definitions = self.definitions.write().await;
        let stored = definitions
            .get_mut(&definition.composition_id)
            .ok_or(StoreError::DefinitionNotFound(definition.composition_id))?;
        stored.state = definition.state;
        stored.state_change_result = definition.state_change_result;
        stored.last_msg = definition.last_msg;
        stored.element_state_map = definition.element_state_map.clone();
        Ok(())
    }
}
