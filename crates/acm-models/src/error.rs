// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Error types for acm-models.

use thiserror::Error;

/// Model errors.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ModelError {
    /// A concept identifier was not of the form `name:version`.
    #[error("Invalid concept identifier: {0}")]
    InvalidIdentifier(String),

    /// JSON serialization/deserialization failed.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Result type using [`ModelError`].
pub type Result<T> = std::result::Result<T, ModelError>;
