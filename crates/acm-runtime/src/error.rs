// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Error types for acm-runtime.

use thiserror::Error;
use uuid::Uuid;

/// Runtime errors.
///
/// Participant-reported failures and timeouts are recorded on the instance
/// or definition, never returned here. These variants cover infrastructure
/// and request validation only.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum Error {
    /// Configuration loading failed.
    #[error("Configuration error: {0}")]
    Config(#[from] crate::config::ConfigError),

    /// Store operation failed.
    #[error("Store error: {0}")]
    Store(#[from] crate::store::StoreError),

    /// Publishing a participant message failed.
    #[error("Publish error: {0}")]
    Publish(#[from] crate::publisher::PublishError),

    /// JSON serialization/deserialization failed.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Instance was not found.
    #[error("Instance not found: {0}")]
    InstanceNotFound(Uuid),

    /// Composition definition was not found.
    #[error("Composition definition not found: {0}")]
    DefinitionNotFound(Uuid),

    /// The requested transition is not allowed from the current state.
    #[error("Invalid state: {0}")]
    InvalidState(String),

    /// Other error.
    #[error("{0}")]
    Other(String),
}

/// Result type using runtime Error.
pub type Result<T> = std::result::Result<T, Error>;
