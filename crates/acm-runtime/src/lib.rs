// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! ACM Runtime - Automation Composition Supervision Engine
//!
//! This crate drives automation composition instances and their composition
//! definitions through multi-step transitions carried out by remote
//! participants. It sends ordered commands, applies acknowledgements, detects
//! timeouts and broadcasts state syncs.
//!
//! # Architecture
//!
//! ```text
//! ┌───────────────────────────┐        ┌───────────────────────────┐
//! │   Commissioning / API     │        │   Participants (bus)      │
//! └─────────────┬─────────────┘        └──────┬─────────────▲──────┘
//!               │ deploy, migrate, prime…     │ acks        │ commands, syncs
//!               ▼                             ▼             │
//! ┌───────────────────────────────────────────────────────────────────────┐
//! │                      acm-runtime (This Crate)                          │
//! │  ┌──────────────┐  ┌──────────────┐  ┌──────────────┐  ┌────────────┐ │
//! │  │ Transition   │  │   Inbound    │  │ Supervision  │  │ Publisher  │ │
//! │  │ Service      │  │   Consumer   │  │ Worker       │  │ (batcher)  │ │
//! │  └──────────────┘  └──────────────┘  └──────────────┘  └────────────┘ │
//! │                 ▲ per-record locks (KeyedLocks) ▲                      │
//! └───────────────────────────────────────────────────────────────────────┘
//!               │
//!               ▼
//! ┌───────────────────────────────────────────────────────────────────────┐
//! │                    InstanceStore (PostgreSQL / memory)                 │
//! └───────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Scanners
//!
//! | Scanner | Drives |
//! |---------|--------|
//! | `PhaseScanner` | Deploy, undeploy, lock, unlock, delete in start-phase order |
//! | `StageScanner` | Migrate, migration revert, prepare in stage order |
//! | `SimpleScanner` | Update, migration precheck, review; applies acknowledgements |
//! | `AcDefinitionScanner` | Prime and deprime of composition definitions |
//!
//! # Configuration
//!
//! | Variable | Default | Meaning |
//! |----------|---------|---------|
//! | `ACM_DATABASE_URL` | required | Postgres connection string |
//! | `ACM_SUPERVISION_SCAN_INTERVAL_MS` | `10000` | Sweep period |
//! | `ACM_MAX_STATUS_WAIT_MS` | `200000` | Instance operation timeout |
//! | `ACM_MAX_OPERATION_WAIT_MS` | `200000` | Definition operation timeout |
//! | `ACM_TIMEOUT_<OP>_MS` | unset | Per-operation override |
//! | `ACM_INBOUND_QUEUE_SIZE` | `1024` | Inbound message queue capacity |

#![deny(missing_docs)]

pub mod batcher;
pub mod config;
pub mod error;
pub mod handler;
pub mod inbound;
pub mod locks;
pub mod migrations;
pub mod publisher;
pub mod runtime;
pub mod store;
pub mod supervision;
pub mod transitions;
pub mod worker;

pub use error::{Error, Result};
