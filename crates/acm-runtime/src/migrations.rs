// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Database schema for the Postgres store.
//!
//! The schema is idempotent (`CREATE ... IF NOT EXISTS`) and applied as raw SQL
//! on every start.
//!
//! # Example
//!
//! ```ignore
//! use sqlx::PgPool;
//! use acm_runtime::migrations;
//!
//! let pool = PgPool::connect(&database_url).await?;
//! migrations::run(&pool).await?;
//! ```

use sqlx::PgPool;

/// Schema applied by [`run`].
pub const SCHEMA: &str = include_str!("../migrations/schema.sql");

/// Create the store tables and indexes if they do not exist.
pub async fn run(pool: &PgPool) -> Result<(), sqlx::Error> {
    sqlx::raw_sql(SCHEMA).execute(pool).await?;
    Ok(())
}
