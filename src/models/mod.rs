// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@kernel.org>

//! Data models for the application.

pub mod alert;
pub mod monitoring;
pub mod snapshot;
pub mod token;

pub use alert::{AlertRecord, AlertState, Urgency};
pub use monitoring::{ActiveWindow, MonitoringConfig, RecoveryBands};
pub use snapshot::MetricsSnapshot;
pub use token::OAuthToken;

/// Identifier of the person the bot serves (the messaging platform's user id).
pub type UserId = u64;
