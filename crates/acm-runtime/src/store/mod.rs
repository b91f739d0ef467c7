// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Durable storage for instances and composition definitions.
//!
//! The supervision engine reads an instance or definition at the start of
//! every reconciliation step and writes it back at most once per step. The
//! per-id locks in [`crate::locks`] serialize steps within one process; the
//! store is the arbiter across processes.

pub mod memory;
pub mod postgres;

pub use self::memory::MemoryStore;
pub use self::postgres::PostgresStore;

use acm_models::{AutomationComposition, AutomationCompositionDefinition};
use async_trait::async_trait;
use thiserror::Error;
use uuid::Uuid;

/// Errors from store operations.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum StoreError {
    /// Database operation failed.
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Stored document could not be (de)serialized.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Instance was not found.
    #[error("Instance not found: {0}")]
    InstanceNotFound(Uuid),

    /// Composition definition was not found.
    #[error("Composition definition not found: {0}")]
    DefinitionNotFound(Uuid),

    /// Record already exists.
    #[error("Already exists: {0}")]
    AlreadyExists(Uuid),
}

/// Storage interface used by the supervision engine.
#[allow(missing_docs)]
#[async_trait]
pub trait InstanceStore: Send + Sync {
    async fn get_instance(
        &self,
        instance_id: Uuid,
    ) -> Result<Option<AutomationComposition>, StoreError>;

    /// Instances whose deploy, lock or sub-state is transitional.
    async fn list_instances_in_transition(&self)
    -> Result<Vec<AutomationComposition>, StoreError>;

    /// Instances with at least one element owned by `participant_id`.
    async fn list_instances_by_participant(
        &self,
        participant_id: Uuid,
    ) -> Result<Vec<AutomationComposition>, StoreError>;

    /// Insert a new instance.
    async fn save_instance(&self, ac: &AutomationComposition) -> Result<(), StoreError>;

    /// Replace a stored instance and return what was persisted.
    async fn update_instance(
        &self,
        ac: &AutomationComposition,
    ) -> Result<AutomationComposition, StoreError>;

    async fn delete_instance(&self, instance_id: Uuid) -> Result<(), StoreError>;

    /// Remove one element from a stored instance.
    async fn delete_element(&self, instance_id: Uuid, element_id: Uuid) -> Result<(), StoreError>;

    async fn get_definition(
        &self,
        composition_id: Uuid,
    ) -> Result<Option<AutomationCompositionDefinition>, StoreError>;

    /// Definitions that are priming or depriming.
    async fn list_definitions_in_transition(
        &self,
    ) -> Result<Vec<AutomationCompositionDefinition>, StoreError>;

    /// Definitions with at least one node template owned by `participant_id`.
    async fn list_definitions_by_participant(
        &self,
        participant_id: Uuid,
    ) -> Result<Vec<AutomationCompositionDefinition>, StoreError>;

    /// Insert a new definition.
    async fn save_definition(
        &self,
        definition: &AutomationCompositionDefinition,
    ) -> Result<(), StoreError>;

    /// Persist priming state, result and node template states of a definition.
    async fn update_definition_state(
        &self,
        definition: &AutomationCompositionDefinition,
    ) -> Result<(), StoreError>;
}
