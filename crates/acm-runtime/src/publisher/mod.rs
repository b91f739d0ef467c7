// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Publisher module - outbound participant messaging.

pub mod channel;
pub mod mock;
mod participant;
mod traits;

pub use channel::ChannelPublisher;
pub use mock::RecordingPublisher;
pub use participant::SupervisionPublisher;
pub use traits::*;
