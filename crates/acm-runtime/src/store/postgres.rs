// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! PostgreSQL-backed store.
//!
//! Each instance and definition is one JSONB document. `in_transition` and
//! `participant_ids` are denormalized on every write so the sweep and
//! participant restart lookups stay index scans.

use acm_models::{AutomationComposition, AutomationCompositionDefinition};
use async_trait::async_trait;
use sqlx::PgPool;
use sqlx::types::Json;
use uuid::Uuid;

use super::{InstanceStore, StoreError};

/// PostgreSQL-backed [`InstanceStore`].
#[derive(Clone)]
pub struct PostgresStore {
    pool: PgPool,
}

impl PostgresStore {
    /// Create a new Postgres-backed store.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

// ============================================================================
// Instance Operations
// ============================================================================

/// Insert a new instance document.
pub async fn insert_instance(pool: &PgPool, ac: &AutomationComposition) -> Result<(), StoreError> {
    let participant_ids: Vec<Uuid> = ac.participant_ids().into_iter().collect();
    let result = sqlx::query(
        r#"
        INSERT INTO automation_composition
            (instance_id, composition_id, deploy_state, lock_state, sub_state,
             state_change_result, in_transition, participant_ids, last_msg, document)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
        ON CONFLICT (instance_id) DO NOTHING
        "#,
    )
    .bind(ac.instance_id)
    .bind(ac.composition_id)
    .bind(ac.deploy_state.to_string())
    .bind(ac.lock_state.to_string())
    .bind(ac.sub_state.to_string())
    .bind(ac.state_change_result.to_string())
    .bind(ac.is_in_transition())
    .bind(&participant_ids)
    .bind(ac.last_msg)
    .bind(Json(ac))
    .execute(pool)
    .await?;

    if result.rows_affected() == 0 {
        return Err(StoreError::AlreadyExists(ac.instance_id));
    }

    Ok(())
}

/// Replace an instance document and return the stored copy.
pub async fn replace_instance(
    pool: &PgPool,
    ac: &AutomationComposition,
) -> Result<AutomationComposition, StoreError> {
    let participant_ids: Vec<Uuid> = ac.participant_ids().into_iter().collect();
    let row: Option<(Json<AutomationComposition>,)> = sqlx::query_as(
        r#"
        UPDATE automation_composition
        SET composition_id = $2,
            deploy_state = $3,
            lock_state = $4,
            sub_state = $5,
            state_change_result = $6,
            in_transition = $7,
            participant_ids = $8,
            last_msg = $9,
            document = $10,
            updated_at = NOW()
        WHERE instance_id = $1
        RETURNING document
        "#,
    )
    .bind(ac.instance_id)
    .bind(ac.composition_id)
    .bind(ac.deploy_state.to_string())
    .bind(ac.lock_state.to_string())
    .bind(ac.sub_state.to_string())
    .bind(ac.state_change_result.to_string())
    .bind(ac.is_in_transition())
    .bind(&participant_ids)
    .bind(ac.last_msg)
    .bind(Json(ac))
    .fetch_optional(pool)
    .await?;

    row.map(|(Json(stored),)| stored)
        .ok_or(StoreError::InstanceNotFound(ac.instance_id))
}

/// Load one instance document.
pub async fn get_instance(
    pool: &PgPool,
    instance_id: Uuid,
) -> Result<Option<AutomationComposition>, StoreError> {
    let row: Option<(Json<AutomationComposition>,)> =
        sqlx::query_as("SELECT document FROM automation_composition WHERE instance_id = $1")
            .bind(instance_id)
            .fetch_optional(pool)
            .await?;

    Ok(row.map(|(Json(ac),)| ac))
}

/// Load every transitional instance, oldest activity first.
pub async fn list_instances_in_transition(
    pool: &PgPool,
) -> Result<Vec<AutomationComposition>, StoreError> {
    let rows: Vec<(Json<AutomationComposition>,)> = sqlx::query_as(
        r#"
        SELECT document FROM automation_composition
        WHERE in_transition
        ORDER BY last_msg
        "#,
    )
    .fetch_all(pool)
    .await?;

    Ok(rows.into_iter().map(|(Json(ac),)| ac).collect())
}

/// Load instances with an element owned by `participant_id`.
pub async fn list_instances_by_participant(
    pool: &PgPool,
    participant_id: Uuid,
) -> Result<Vec<AutomationComposition>, StoreError> {
    let rows: Vec<(Json<AutomationComposition>,)> = sqlx::query_as(
        "SELECT document FROM automation_composition WHERE $1 = ANY(participant_ids)",
    )
    .bind(participant_id)
    .fetch_all(pool)
    .await?;

    Ok(rows.into_iter().map(|(Json(ac),)| ac).collect())
}

/// Delete an instance document.
pub async fn delete_instance(pool: &PgPool, instance_id: Uuid) -> Result<(), StoreError> {
    let result = sqlx::query("DELETE FROM automation_composition WHERE instance_id = $1")
        .bind(instance_id)
        .execute(pool)
        .await?;

    if result.rows_affected() == 0 {
        return Err(StoreError::InstanceNotFound(instance_id));
    }

    Ok(())
}

/// Drop one element from an instance document.
pub async fn delete_element(
    pool: &PgPool,
    instance_id: Uuid,
    element_id: Uuid,
) -> Result<(), StoreError> {
    let result = sqlx::query(
        r#"
        UPDATE automation_composition
        SET document = jsonb_set(
                document,
                '{elements}',
                COALESCE(
                    (SELECT jsonb_agg(e)
                     FROM jsonb_array_elements(document->'elements') AS e
                     WHERE e->>'id' <> $2::text),
                    '[]'::jsonb)),
            updated_at = NOW()
        WHERE instance_id = $1
        "#,
    )
    .bind(instance_id)
    .bind(element_id.to_string())
    .execute(pool)
    .await?;

    if result.rows_affected() == 0 {
        return Err(StoreError::InstanceNotFound(instance_id));
    }

    Ok(())
}

// ============================================================================
// Definition Operations
// ============================================================================

/// Insert a new definition document.
pub async fn insert_definition(
    pool: &PgPool,
    definition: &AutomationCompositionDefinition,
) -> Result<(), StoreError> {
    let participant_ids: Vec<Uuid> = definition.participant_ids().into_iter().collect();
    let result = sqlx::query(
        r#"
        INSERT INTO ac_definition
            (composition_id, state, state_change_result, in_transition, participant_ids,
             last_msg, document)
        VALUES ($1, $2, $3, $4, $5, $6, $7)
        ON CONFLICT (composition_id) DO NOTHING
        "#,
    )
    .bind(definition.composition_id)
    .bind(definition.state.to_string())
    .bind(definition.state_change_result.to_string())
    .bind(definition.is_in_transition())
    .bind(&participant_ids)
    .bind(definition.last_msg)
    .bind(Json(definition))
    .execute(pool)
    .await?;

    if result.rows_affected() == 0 {
        return Err(StoreError::AlreadyExists(definition.composition_id));
    }

    Ok(())
}

/// Replace the state columns and document of a definition.
pub async fn update_definition_state(
    pool: &PgPool,
    definition: &AutomationCompositionDefinition,
) -> Result<(), StoreError> {
    let participant_ids: Vec<Uuid> = definition.participant_ids().into_iter().collect();
    let result = sqlx::query(
        r#"
        UPDATE ac_definition
        SET state = $2,
            state_change_result = $3,
            in_transition = $4,
            participant_ids = $5,
            last_msg = $6,
            document = $7,
            updated_at = NOW()
        WHERE composition_id = $1
        "#,
    )
    .bind(definition.composition_id)
    .bind(definition.state.to_string())
    .bind(definition.state_change_result.to_string())
    .bind(definition.is_in_transition())
    .bind(&participant_ids)
    .bind(definition.last_msg)
    .bind(Json(definition))
    .execute(pool)
    .await?;

    if result.rows_affected() == 0 {
        return Err(StoreError::DefinitionNotFound(definition.composition_id));
    }

    Ok(())
}

/// Load one definition document.
pub async fn get_definition(
    pool: &PgPool,
    composition_id: Uuid,
) -> Result<Option<AutomationCompositionDefinition>, StoreError> {
    let row: Option<(Json<AutomationCompositionDefinition>,)> =
        sqlx::query_as("SELECT document FROM ac_definition WHERE composition_id = $1")
            .bind(composition_id)
            .fetch_optional(pool)
            .await?;

    Ok(row.map(|(Json(definition),)| definition))
}

/// Load every priming or depriming definition.
pub async fn list_definitions_in_transition(
    pool: &PgPool,
) -> Result<Vec<AutomationCompositionDefinition>, StoreError> {
    let rows: Vec<(Json<AutomationCompositionDefinition>,)> = sqlx::query_as(
        "SELECT document FROM ac_definition WHERE in_transition ORDER BY last_msg",
    )
    .fetch_all(pool)
    .await?;

    Ok(rows.into_iter().map(|(Json(definition),)| definition).collect())
}

/// Load definitions with a node template owned by `participant_id`.
pub async fn list_definitions_by_participant(
    pool: &PgPool,
    participant_id: Uuid,
) -> Result<Vec<AutomationCompositionDefinition>, StoreError> {
    let rows: Vec<(Json<AutomationCompositionDefinition>,)> =
        sqlx::query_as("SELECT document FROM ac_definition WHERE $1 = ANY(participant_ids)")
            .bind(participant_id)
            .fetch_all(pool)
            .await?;

    Ok(rows.into_iter().map(|(Json(definition),)| definition).collect())
}

#[async_trait]
impl InstanceStore for PostgresStore {
    async fn get_instance(
        &self,
        instance_id: Uuid,
    ) -> Result<Option<AutomationComposition>, StoreError> {
        get_instance(&self.pool, instance_id).await
    }

    async fn list_instances_in_transition(
        &self,
    ) -> Result<Vec<AutomationComposition>, StoreError> {
        list_instances_in_transition(&self.pool).await
    }

    async fn list_instances_by_participant(
        &self,
        participant_id: Uuid,
    ) -> Result<Vec<AutomationComposition>, StoreError> {
        list_instances_by_participant(&self.pool, participant_id).await
    }

    async fn save_instance(&self, ac: &AutomationComposition) -> Result<(), StoreError> {
        insert_instance(&self.pool, ac).await
    }

    async fn update_instance(
        &self,
        ac: &AutomationComposition,
    ) -> Result<AutomationComposition, StoreError> {
        replace_instance(&self.pool, ac).await
    }

    async fn delete_instance(&self, instance_id: Uuid) -> Result<(), StoreError> {
        delete_instance(&self.pool, instance_id).await
    }

    async fn delete_element(&self, instance_id: Uuid, element_id: Uuid) -> Result<(), StoreError> {
        delete_element(&self.pool, instance_id, element_id).await
    }

    async fn get_definition(
        &self,
        composition_id: Uuid,
    ) -> Result<Option<AutomationCompositionDefinition>, StoreError> {
        get_definition(&self.pool, composition_id).await
    }

    async fn list_definitions_in_transition(
        &self,
    ) -> Result<Vec<AutomationCompositionDefinition>, StoreError> {
        list_definitions_in_transition(&self.pool).await
    }

    async fn list_definitions_by_participant(
        &self,
        participant_id: Uuid,
    ) -> Result<Vec<AutomationCompositionDefinition>, StoreError> {
        list_definitions_by_participant(&self.pool, participant_id).await
    }

    async fn save_definition(
        &self,
        definition: &AutomationCompositionDefinition,
    ) -> Result<(), StoreError> {
        insert_definition(&self.pool, definition).await
    }

    async fn update_definition_state(
        &self,
        definition: &AutomationCompositionDefinition,
    ) -> Result<(), StoreError> {
        update_definition_state(&self.pool, definition).await
    }
}
