// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@kernel.org>

//! WHOOP Sentinel: WHOOP integration for a personal notification bot.
//!
//! Keeps WHOOP OAuth tokens alive, pulls daily metrics, and watches strain
//! during the day to send stress alerts.

pub mod config;
pub mod db;
pub mod error;
pub mod middleware;
pub mod models;
pub mod routes;
pub mod services;
pub mod time_utils;

use config::Config;
use db::Store;
use services::{
    AdviceGenerator, Commands, DailyRefresher, JobSettings, MetricsFetcher, MetricsSource,
    MonitorDeps, Notifier, OAuthFlow, RateLimitedApiClient, Scheduler, StressMonitor,
    TokenManager, WhoopClient,
};
use std::sync::Arc;
use std::time::Duration;

/// Shared application state.
pub struct AppState {
    pub config: Config,
    pub store: Arc<dyn Store>,
    pub commands: Commands,
}

impl AppState {
    /// Wire every service for the configured owner.
    pub fn assemble(
        config: Config,
        store: Arc<dyn Store>,
        notifier: Arc<dyn Notifier>,
        advisor: Arc<dyn AdviceGenerator>,
    ) -> Self {
        let user_id = config.owner_user_id;
        let whoop = WhoopClient::new(config.whoop.clone());
        let tokens = TokenManager::new(whoop.clone(), store.clone());
        let api = RateLimitedApiClient::new(whoop.clone(), tokens.clone());
        let source: Arc<dyn MetricsSource> = Arc::new(MetricsFetcher::new(api));

        let monitor = Arc::new(StressMonitor::new(
            user_id,
            MonitorDeps {
                source: source.clone(),
                store: store.clone(),
                advisor,
                notifier,
            },
            config.recovery_bands,
            config.monitoring_defaults.clone(),
        ));
        let refresher = Arc::new(DailyRefresher::new(user_id, source.clone(), store.clone()));
        let oauth = OAuthFlow::new(whoop, tokens, config.oauth_state_key.clone());

        let commands = Commands::new(
            user_id,
            oauth,
            source,
            store.clone(),
            monitor,
            refresher,
            Scheduler::new(),
            JobSettings {
                poll_interval: Duration::from_secs(u64::from(config.poll_interval_minutes) * 60),
                daily_refresh_at: config.daily_refresh_at,
            },
        );

        Self {
            config,
            store,
            commands,
        }
    }
}
