// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Stress monitoring.
//!
//! A polling state machine over `Disabled`, `Idle` and `Cooldown`. Each tick
//! inside the active window compares the day's strain to the threshold and
//! raises at most one alert per cooldown period. A failed poll changes
//! nothing, so the next tick starts from the same state.

use crate::db::Store;
use crate::error::AppError;
use crate::models::{
    AlertRecord, AlertState, MonitoringConfig, RecoveryBands, Urgency, UserId,
};
use crate::services::metrics::MetricsSource;
use crate::services::notifier::{canned_advice, AdviceGenerator, AdviceRequest, Notifier};
use crate::services::scheduler::{JobFuture, JobHandler};
use chrono::{DateTime, Local, Utc};
use serde::Serialize;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum MonitorState {
    Disabled,
    Idle,
    Cooldown,
}

/// What one tick did.
#[derive(Debug, Clone, PartialEq)]
pub enum TickOutcome {
    Disabled,
    OutsideWindow,
    /// Previous tick still running.
    Busy,
    CoolingDown { until: DateTime<Utc> },
    /// Provider has no strain score yet.
    NoData,
    BelowThreshold { strain: f64 },
    /// Fetch failed; logged and skipped.
    Skipped,
    Alerted(AlertRecord),
}

/// Collaborators of the monitor.
#[derive(Clone)]
pub struct MonitorDeps {
    pub source: Arc<dyn MetricsSource>,
    pub store: Arc<dyn Store>,
    pub advisor: Arc<dyn AdviceGenerator>,
    pub notifier: Arc<dyn Notifier>,
}

pub struct StressMonitor {
    user_id: UserId,
    deps: MonitorDeps,
    bands: RecoveryBands,
    config: RwLock<MonitoringConfig>,
    /// `None` while disabled.
    alert_state: Mutex<Option<AlertState>>,
    running: AtomicBool,
}

/// Clears the running flag when a tick ends, however it ends.
struct RunningGuard<'a>(&'a AtomicBool);

impl Drop for RunningGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

impl StressMonitor {
    /// New monitor in the `Disabled` state, holding `config` for later.
    pub fn new(
        user_id: UserId,
        deps: MonitorDeps,
        bands: RecoveryBands,
        config: MonitoringConfig,
    ) -> Self {
        Self {
            user_id,
            deps,
            bands,
            config: RwLock::new(MonitoringConfig {
                enabled: false,
                ..config
            }),
            alert_state: Mutex::new(None),
            running: AtomicBool::new(false),
        }
    }

    pub fn user_id(&self) -> UserId {
        self.user_id
    }

    pub async fn config(&self) -> MonitoringConfig {
        self.config.read().await.clone()
    }

    pub async fn alert_state(&self) -> Option<AlertState> {
        self.alert_state.lock().await.clone()
    }

    pub async fn state_at(&self, now: DateTime<Utc>) -> MonitorState {
        let cooldown = self.config.read().await.cooldown();
        match self.alert_state.lock().await.as_ref() {
            None => MonitorState::Disabled,
            Some(state) if state.in_cooldown(now, cooldown) => MonitorState::Cooldown,
            Some(_) => MonitorState::Idle,
        }
    }

    pub async fn state(&self) -> MonitorState {
        self.state_at(Utc::now()).await
    }

    /// `Disabled -> Idle`. A running cooldown is restored from the newest
    /// alert on record.
    pub async fn enable(&self) -> Result<(), AppError> {
        let mut alert_state = self.alert_state.lock().await;
        if alert_state.is_some() {
            return Ok(());
        }

        let last = self.deps.store.recent_alerts(self.user_id, 1).await?;
        let restored = AlertState {
            last_alert_at: last.first().map(|a| a.timestamp),
            last_urgency: last.first().map(|a| a.urgency_level),
        };
        if let Some(at) = restored.last_alert_at {
            tracing::info!(user_id = self.user_id, last_alert_at = %at, "Restored alert state");
        }

        *alert_state = Some(restored);
        self.config.write().await.enabled = true;

        tracing::info!(user_id = self.user_id, "Stress monitoring enabled");
        Ok(())
    }

    /// Any state `-> Disabled`. Alert state is dropped.
    pub async fn disable(&self) {
        *self.alert_state.lock().await = None;
        self.config.write().await.enabled = false;
        tracing::info!(user_id = self.user_id, "Stress monitoring disabled");
    }

    /// Replace threshold, cooldown and window. Enablement is not touched and
    /// a running cooldown keeps running.
    pub async fn reconfigure(&self, config: MonitoringConfig) -> Result<(), AppError> {
        config.validate()?;
        let mut current = self.config.write().await;
        *current = MonitoringConfig {
            enabled: current.enabled,
            ..config
        };
        tracing::info!(
            user_id = self.user_id,
            threshold = current.threshold,
            cooldown_minutes = current.cooldown_minutes,
            "Stress monitoring reconfigured"
        );
        Ok(())
    }

    pub async fn set_threshold(&self, threshold: f64) -> Result<MonitoringConfig, AppError> {
        let mut current = self.config.write().await;
        let updated = current.with_threshold(threshold)?;
        *current = updated.clone();
        tracing::info!(user_id = self.user_id, threshold, "Stress threshold updated");
        Ok(updated)
    }

    /// Evaluate once, now.
    pub async fn tick(&self) -> TickOutcome {
        self.tick_at(Local::now()).await
    }

    /// Evaluate once at `now`. The active window is judged in local time.
    pub async fn tick_at(&self, now: DateTime<Local>) -> TickOutcome {
        if self
            .running
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            tracing::debug!(user_id = self.user_id, "Stress check still running, skipping tick");
            return TickOutcome::Busy;
        }
        let _running = RunningGuard(&self.running);

        let user_id = self.user_id;
        let now_utc = now.with_timezone(&Utc);
        let config = self.config().await;

        let Some(alert_state) = self.alert_state().await else {
            return TickOutcome::Disabled;
        };

        if !config.active_window.contains(now.time()) {
            tracing::debug!(user_id, "Outside active window for stress monitoring");
            return TickOutcome::OutsideWindow;
        }

        if alert_state.in_cooldown(now_utc, config.cooldown()) {
            let until = alert_state
                .cooldown_until(config.cooldown())
                .unwrap_or(now_utc);
            tracing::debug!(user_id, until = %until, "Cooldown active, skipping stress check");
            return TickOutcome::CoolingDown { until };
        }

        let date = now.date_naive();
        let strain = match self.deps.source.current_strain(user_id, date).await {
            Ok(Some(strain)) => strain,
            Ok(None) => {
                tracing::debug!(user_id, "No strain score available yet");
                return TickOutcome::NoData;
            }
            Err(e) if e.is_reauth_required() => {
                tracing::error!(user_id, error = %e, "Stress check needs WHOOP reconnect");
                return TickOutcome::Skipped;
            }
            Err(e) => {
                tracing::warn!(user_id, error = %e, "Strain fetch failed, skipping this poll");
                return TickOutcome::Skipped;
            }
        };

        if strain < config.threshold {
            tracing::debug!(user_id, strain, threshold = config.threshold, "Strain below threshold");
            return TickOutcome::BelowThreshold { strain };
        }

        let recovery = match self.deps.source.recovery(user_id, date).await {
            Ok(recovery) => recovery,
            Err(e) => {
                tracing::warn!(user_id, error = %e, "Recovery fetch failed, alerting without it");
                None
            }
        };

        let record = self
            .raise_alert(now_utc, strain, recovery, config.threshold)
            .await;
        TickOutcome::Alerted(record)
    }

    async fn raise_alert(
        &self,
        now: DateTime<Utc>,
        strain: f64,
        recovery: Option<f64>,
        threshold: f64,
    ) -> AlertRecord {
        let user_id = self.user_id;
        let urgency = Urgency::classify(recovery, &self.bands);

        let request = AdviceRequest {
            urgency,
            strain,
            recovery,
            threshold,
        };
        let advice_text = match self.deps.advisor.advice(&request).await {
            Ok(text) if !text.trim().is_empty() => text,
            Ok(_) => canned_advice(urgency).to_string(),
            Err(e) => {
                tracing::warn!(user_id, error = %e, "Advice generation failed, using canned advice");
                canned_advice(urgency).to_string()
            }
        };

        let record = AlertRecord {
            timestamp: now,
            strain_value: strain,
            recovery_value: recovery,
            urgency_level: urgency,
            advice_text,
        };

        if let Err(e) = self.deps.store.append_alert(user_id, &record).await {
            tracing::error!(user_id, error = %e, "Failed to record alert");
        }

        if let Err(e) = self
            .deps
            .notifier
            .notify(user_id, &record.notification_text())
            .await
        {
            tracing::error!(user_id, error = %e, "Failed to deliver stress alert");
        }

        // Disabled meanwhile: the alert completes but leaves no state behind.
        if let Some(state) = self.alert_state.lock().await.as_mut() {
            state.last_alert_at = Some(now);
            state.last_urgency = Some(urgency);
        }

        tracing::info!(
            user_id,
            strain,
            recovery = ?recovery,
            urgency = %urgency,
            "Stress alert sent"
        );
        record
    }
}

/// Scheduler handler running one tick per occurrence.
pub fn poll_job(monitor: Arc<StressMonitor>) -> JobHandler {
    Arc::new(move || -> JobFuture {
        let monitor = monitor.clone();
        Box::pin(async move {
            let outcome = monitor.tick().await;
            tracing::debug!(user_id = monitor.user_id(), ?outcome, "Stress tick finished");
            Ok::<(), anyhow::Error>(())
        })
    })
}
