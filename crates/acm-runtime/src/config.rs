// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Configuration for acm-runtime.

use std::time::Duration;

use acm_models::{AcTypeState, DeployState, LockState, SubState};

/// Default period between supervision sweeps.
pub const DEFAULT_SCAN_INTERVAL_MS: u64 = 10_000;
/// Default wait for instance operations.
pub const DEFAULT_MAX_STATUS_WAIT_MS: i64 = 200_000;
/// Default wait for definition priming operations.
pub const DEFAULT_MAX_OPERATION_WAIT_MS: i64 = 200_000;
/// Default capacity of the inbound acknowledgement queue.
pub const DEFAULT_INBOUND_QUEUE_SIZE: usize = 1024;

/// Runtime configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    /// Database URL for the Postgres store.
    pub database_url: String,
    /// Period between supervision sweeps.
    pub scan_interval: Duration,
    /// Per-operation timeouts.
    pub timeouts: OperationTimeouts,
    /// Capacity of the inbound acknowledgement queue.
    pub inbound_queue_size: usize,
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        let database_url = std::env::var("ACM_DATABASE_URL")
            .map_err(|_| ConfigError::MissingEnvVar("ACM_DATABASE_URL"))?;

        let scan_interval_ms: u64 = parse_var("ACM_SUPERVISION_SCAN_INTERVAL_MS")?
            .unwrap_or(DEFAULT_SCAN_INTERVAL_MS);

        let inbound_queue_size: usize =
            parse_var("ACM_INBOUND_QUEUE_SIZE")?.unwrap_or(DEFAULT_INBOUND_QUEUE_SIZE);
        if inbound_queue_size == 0 {
            return Err(ConfigError::Invalid {
                var: "ACM_INBOUND_QUEUE_SIZE",
                value: "0".to_string(),
            });
        }

        Ok(Self {
            database_url,
            scan_interval: Duration::from_millis(scan_interval_ms),
            timeouts: OperationTimeouts::from_env()?,
            inbound_queue_size,
        })
    }
}

fn parse_var<T: std::str::FromStr>(var: &'static str) -> Result<Option<T>, ConfigError> {
    match std::env::var(var) {
        Ok(value) => value
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| ConfigError::Invalid { var, value }),
        Err(_) => Ok(None),
    }
}

/// Operation a timeout is looked up for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    /// Deploy.
    Deploy,
    /// Undeploy.
    Undeploy,
    /// Property update.
    Update,
    /// Migrate, migration revert and migration precheck.
    Migrate,
    /// Delete.
    Delete,
    /// Prime a definition.
    Prime,
    /// Deprime a definition.
    Deprime,
    /// Any other instance operation (lock, unlock, prepare, review).
    Default,
}

impl Operation {
    /// Operation an instance in these states is running.
    pub fn for_instance(deploy: DeployState, _lock: LockState, sub: SubState) -> Self {
        match (deploy, sub) {
            (DeployState::Deploying, _) => Self::Deploy,
            (DeployState::Undeploying, _) => Self::Undeploy,
            (DeployState::Updating, _) => Self::Update,
            (DeployState::Migrating | DeployState::MigrationReverting, _) => Self::Migrate,
            (_, SubState::MigrationPrechecking) => Self::Migrate,
            (DeployState::Deleting, _) => Self::Delete,
            _ => Self::Default,
        }
    }

    /// Operation a definition in this state is running.
    pub fn for_definition(state: AcTypeState) -> Self {
        match state {
            AcTypeState::Priming => Self::Prime,
            AcTypeState::Depriming => Self::Deprime,
            _ => Self::Default,
        }
    }
}

/// Per-operation timeouts in milliseconds.
///
/// A negative value means the operation is expired as soon as it is checked.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OperationTimeouts {
    /// Fallback for instance operations.
    pub max_status_wait_ms: i64,
    /// Fallback for definition operations.
    pub max_operation_wait_ms: i64,
    /// Deploy override.
    pub deploy_ms: Option<i64>,
    /// Undeploy override.
    pub undeploy_ms: Option<i64>,
    /// Update override.
    pub update_ms: Option<i64>,
    /// Migrate override.
    pub migrate_ms: Option<i64>,
    /// Delete override.
    pub delete_ms: Option<i64>,
    /// Prime override.
    pub prime_ms: Option<i64>,
    /// Deprime override.
    pub deprime_ms: Option<i64>,
}

impl Default for OperationTimeouts {
    fn default() -> Self {
        Self {
            max_status_wait_ms: DEFAULT_MAX_STATUS_WAIT_MS,
            max_operation_wait_ms: DEFAULT_MAX_OPERATION_WAIT_MS,
            deploy_ms: None,
            undeploy_ms: None,
            update_ms: None,
            migrate_ms: None,
            delete_ms: None,
            prime_ms: None,
            deprime_ms: None,
        }
    }
}

impl OperationTimeouts {
    /// Load timeouts from environment variables.
    ///
    /// Environment variables:
    /// - `ACM_MAX_STATUS_WAIT_MS` (default: 200000)
    /// - `ACM_MAX_OPERATION_WAIT_MS` (default: 200000)
    /// - `ACM_TIMEOUT_{DEPLOY,UNDEPLOY,UPDATE,MIGRATE,DELETE,PRIME,DEPRIME}_MS` (optional)
    pub fn from_env() -> Result<Self, ConfigError> {
        Ok(Self {
            max_status_wait_ms: parse_var("ACM_MAX_STATUS_WAIT_MS")?
                .unwrap_or(DEFAULT_MAX_STATUS_WAIT_MS),
            max_operation_wait_ms: parse_var("ACM_MAX_OPERATION_WAIT_MS")?
                .unwrap_or(DEFAULT_MAX_OPERATION_WAIT_MS),
            deploy_ms: parse_var("ACM_TIMEOUT_DEPLOY_MS")?,
            undeploy_ms: parse_var("ACM_TIMEOUT_UNDEPLOY_MS")?,
            update_ms: parse_var("ACM_TIMEOUT_UPDATE_MS")?,
            migrate_ms: parse_var("ACM_TIMEOUT_MIGRATE_MS")?,
            delete_ms: parse_var("ACM_TIMEOUT_DELETE_MS")?,
            prime_ms: parse_var("ACM_TIMEOUT_PRIME_MS")?,
            deprime_ms: parse_var("ACM_TIMEOUT_DEPRIME_MS")?,
        })
    }

    /// Same wait for every operation.
    pub fn uniform(ms: i64) -> Self {
        Self {
            max_status_wait_ms: ms,
            max_operation_wait_ms: ms,
            ..Self::default()
        }
    }

    /// Timeout for `op` in milliseconds.
    pub fn timeout_ms(&self, op: Operation) -> i64 {
        let status = self.max_status_wait_ms;
        let operation = self.max_operation_wait_ms;
        match op {
            Operation::Deploy => self.deploy_ms.unwrap_or(status),
            Operation::Undeploy => self.undeploy_ms.unwrap_or(status),
            Operation::Update => self.update_ms.unwrap_or(status),
            Operation::Migrate => self.migrate_ms.unwrap_or(status),
            Operation::Delete => self.delete_ms.unwrap_or(status),
            Operation::Prime => self.prime_ms.unwrap_or(operation),
            Operation::Deprime => self.deprime_ms.unwrap_or(operation),
            Operation::Default => status,
        }
    }
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// A required environment variable is missing.
    #[error("Missing required environment variable: {0}")]
    MissingEnvVar(&'static str),
    /// An environment variable could not be parsed.
    #[error("Invalid value for {var}: {value}")]
    Invalid {
        /// Variable name.
        var: &'static str,
        /// Offending value.
        value: String,
    },
}
