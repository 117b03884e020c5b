// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Services module - business logic layer.

pub mod api_client;
pub mod commands;
pub mod daily;
pub mod kms;
pub mod metrics;
pub mod notifier;
pub mod oauth;
pub mod rate_limit;
pub mod scheduler;
pub mod stress;
pub mod tokens;
pub mod whoop;

pub use api_client::{ApiRequest, RateLimitedApiClient, RetryPolicy};
pub use commands::{Commands, JobSettings, MonitoringStatus};
pub use daily::DailyRefresher;
pub use kms::KmsService;
pub use metrics::{MetricsFetcher, MetricsSource, WorkoutSummary};
pub use notifier::{
    AdviceGenerator, AdviceRequest, LogNotifier, Notifier, StaticAdvisor, TelegramNotifier,
};
pub use oauth::OAuthFlow;
pub use rate_limit::RateLimiter;
pub use scheduler::{Cadence, JobHandler, Scheduler};
pub use stress::{MonitorDeps, MonitorState, StressMonitor, TickOutcome};
pub use tokens::TokenManager;
pub use whoop::{TokenGrant, WhoopClient};
