// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! User-facing operations, called by the HTTP layer.
//!
//! Also owns the scheduled jobs: the stress poll is registered while
//! monitoring is enabled and cancelled when it is disabled.

use crate::db::Store;
use crate::error::AppError;
use crate::models::{AlertRecord, MetricsSnapshot, MonitoringConfig, UserId};
use crate::services::daily::{refresh_job, DailyRefresher};
use crate::services::metrics::{collect_snapshot, MetricsSource};
use crate::services::oauth::OAuthFlow;
use crate::services::scheduler::{Cadence, JobInfo, Scheduler};
use crate::services::stress::{poll_job, MonitorState, StressMonitor};
use chrono::{DateTime, Local, NaiveTime, Utc};
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;

pub const STRESS_JOB: &str = "whoop_stress_monitoring";
pub const DAILY_JOB: &str = "whoop_daily_refresh";

pub const DEFAULT_ALERT_LIMIT: usize = 10;
pub const MAX_ALERT_LIMIT: usize = 100;

/// Monitoring settings plus live state.
#[derive(Debug, Clone, Serialize)]
pub struct MonitoringStatus {
    pub config: MonitoringConfig,
    pub state: MonitorState,
    pub cooldown_until: Option<DateTime<Utc>>,
    pub scheduled: Vec<JobInfo>,
}

/// Scheduling parameters.
#[derive(Debug, Clone, Copy)]
pub struct JobSettings {
    pub poll_interval: Duration,
    pub daily_refresh_at: NaiveTime,
}

#[derive(Clone)]
pub struct Commands {
    user_id: UserId,
    oauth: OAuthFlow,
    source: Arc<dyn MetricsSource>,
    store: Arc<dyn Store>,
    monitor: Arc<StressMonitor>,
    refresher: Arc<DailyRefresher>,
    scheduler: Scheduler,
    jobs: JobSettings,
    /// Serializes read-modify-write of the monitoring settings.
    settings: Arc<Mutex<()>>,
}

impl Commands {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        user_id: UserId,
        oauth: OAuthFlow,
        source: Arc<dyn MetricsSource>,
        store: Arc<dyn Store>,
        monitor: Arc<StressMonitor>,
        refresher: Arc<DailyRefresher>,
        scheduler: Scheduler,
        jobs: JobSettings,
    ) -> Self {
        Self {
            user_id,
            oauth,
            source,
            store,
            monitor,
            refresher,
            scheduler,
            jobs,
            settings: Arc::new(Mutex::new(())),
        }
    }

    pub fn user_id(&self) -> UserId {
        self.user_id
    }

    pub fn monitor(&self) -> &Arc<StressMonitor> {
        &self.monitor
    }

    pub fn scheduler(&self) -> &Scheduler {
        &self.scheduler
    }

    /// Load persisted settings and register the jobs.
    pub async fn start(&self, defaults: &MonitoringConfig) -> Result<(), AppError> {
        let _settings = self.settings.lock().await;
        let config = match self.store.get_monitoring_config(self.user_id).await? {
            Some(stored) => stored,
            None => {
                self.store
                    .put_monitoring_config(self.user_id, defaults)
                    .await?;
                defaults.clone()
            }
        };

        self.monitor.reconfigure(config.clone()).await?;
        if config.enabled {
            self.monitor.enable().await?;
            self.schedule_poll(&config);
        }

        self.scheduler.register(
            DAILY_JOB,
            Cadence::DailyAt(self.jobs.daily_refresh_at),
            refresh_job(self.refresher.clone()),
        );

        tracing::info!(
            user_id = self.user_id,
            monitoring = config.enabled,
            "Scheduled jobs started"
        );
        Ok(())
    }

    fn schedule_poll(&self, config: &MonitoringConfig) {
        self.scheduler.register(
            STRESS_JOB,
            Cadence::Every {
                interval: self.jobs.poll_interval,
                window: Some(config.active_window),
            },
            poll_job(self.monitor.clone()),
        );
    }

    // ─── WHOOP connection ────────────────────────────────────────────────────

    pub fn connect(&self) -> Result<String, AppError> {
        self.oauth.connect(self.user_id)
    }

    pub async fn submit_code(&self, raw_code: &str) -> Result<(), AppError> {
        self.oauth.submit_code(self.user_id, raw_code).await
    }

    /// Browser redirect completion. The user comes from the signed state.
    pub async fn complete_callback(&self, code: &str, state: &str) -> Result<UserId, AppError> {
        self.oauth.complete_callback(code, state).await
    }

    // ─── Metrics ─────────────────────────────────────────────────────────────

    /// Fetch today's metrics on demand. Nothing is stored.
    pub async fn current_metrics(&self) -> Result<MetricsSnapshot, AppError> {
        let now = Local::now();
        let snapshot = collect_snapshot(
            self.source.as_ref(),
            self.user_id,
            now.date_naive(),
            now.with_timezone(&Utc),
        )
        .await?;

        if snapshot.is_empty() {
            return Err(AppError::ApiUnavailable(
                "No WHOOP metrics could be fetched".to_string(),
            ));
        }
        Ok(snapshot)
    }

    pub async fn today_snapshot(&self) -> Result<MetricsSnapshot, AppError> {
        let today = Local::now().date_naive();
        self.store
            .get_snapshot(self.user_id, today)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Snapshot for {}", today)))
    }

    // ─── Monitoring ──────────────────────────────────────────────────────────

    pub async fn set_monitoring(&self, enabled: bool) -> Result<MonitoringStatus, AppError> {
        let _settings = self.settings.lock().await;
        let config = MonitoringConfig {
            enabled,
            ..self.monitor.config().await
        };
        self.store
            .put_monitoring_config(self.user_id, &config)
            .await?;

        if enabled {
            self.monitor.enable().await?;
            self.schedule_poll(&config);
        } else {
            self.scheduler.cancel(STRESS_JOB);
            self.monitor.disable().await;
        }

        self.monitoring_status().await
    }

    /// Validated before anything is stored or applied.
    pub async fn set_threshold(&self, threshold: f64) -> Result<MonitoringConfig, AppError> {
        let _settings = self.settings.lock().await;
        let updated = self.monitor.config().await.with_threshold(threshold)?;
        self.store
            .put_monitoring_config(self.user_id, &updated)
            .await?;
        self.monitor.set_threshold(threshold).await
    }

    pub async fn monitoring_status(&self) -> Result<MonitoringStatus, AppError> {
        let config = self.monitor.config().await;
        let cooldown_until = self
            .monitor
            .alert_state()
            .await
            .and_then(|s| s.cooldown_until(config.cooldown()))
            .filter(|until| *until > Utc::now());

        Ok(MonitoringStatus {
            state: self.monitor.state().await,
            cooldown_until,
            scheduled: self.scheduler.next_runs(),
            config,
        })
    }

    /// Most recent alerts, newest first.
    pub async fn alert_history(&self, limit: Option<usize>) -> Result<Vec<AlertRecord>, AppError> {
        let limit = limit
            .unwrap_or(DEFAULT_ALERT_LIMIT)
            .clamp(1, MAX_ALERT_LIMIT);
        self.store.recent_alerts(self.user_id, limit).await
    }
}
