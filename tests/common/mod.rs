// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

use async_trait::async_trait;
use chrono::{Duration, NaiveDate, Utc};
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use whoop_sentinel::config::Config;
use whoop_sentinel::db::{FirestoreDb, MemoryDb, Store};
use whoop_sentinel::error::AppError;
use whoop_sentinel::models::{OAuthToken, UserId};
use whoop_sentinel::routes::create_router;
use whoop_sentinel::services::{
    KmsService, LogNotifier, MetricsSource, Notifier, StaticAdvisor, WorkoutSummary,
};
use whoop_sentinel::AppState;

/// Owner of `Config::test_default()`.
#[allow(dead_code)]
pub const OWNER: UserId = 42;

/// Check if emulator is available via environment variable.
#[allow(dead_code)]
pub fn emulator_available() -> bool {
    std::env::var("FIRESTORE_EMULATOR_HOST").is_ok()
}

/// Skip test with message if emulator not available.
#[macro_export]
macro_rules! require_emulator {
    () => {
        if !crate::common::emulator_available() {
            eprintln!("⚠️  Skipping: FIRESTORE_EMULATOR_HOST not set");
            return;
        }
    };
}

/// Create a test database connection.
#[allow(dead_code)]
pub async fn test_db() -> FirestoreDb {
    FirestoreDb::new("test-project", KmsService::new_mock())
        .await
        .expect("Failed to connect to Firestore emulator")
}

/// Create a test app backed by memory storage.
/// Returns the router and the shared state.
#[allow(dead_code)]
pub fn create_test_app() -> (axum::Router, Arc<AppState>) {
    create_test_app_with(Config::test_default())
}

#[allow(dead_code)]
pub fn create_test_app_with(config: Config) -> (axum::Router, Arc<AppState>) {
    let state = Arc::new(AppState::assemble(
        config,
        Arc::new(MemoryDb::new()),
        Arc::new(LogNotifier),
        Arc::new(StaticAdvisor),
    ));
    (create_router(state.clone()), state)
}

/// Bearer header value for `user_id`.
#[allow(dead_code)]
pub fn bearer(user_id: UserId, config: &Config) -> String {
    let jwt = whoop_sentinel::middleware::auth::create_jwt(user_id, &config.jwt_signing_key)
        .expect("Failed to create JWT");
    format!("Bearer {}", jwt)
}

/// Store a token pair expiring in `expires_in` seconds.
#[allow(dead_code)]
pub async fn seed_token(
    store: &dyn Store,
    user_id: UserId,
    access: &str,
    refresh: Option<&str>,
    expires_in: i64,
) -> OAuthToken {
    let token = OAuthToken {
        access_token: access.to_string(),
        refresh_token: refresh.map(str::to_string),
        obtained_at: Utc::now() - Duration::hours(1),
        expires_at: Utc::now() + Duration::seconds(expires_in),
    };
    store
        .put_token(user_id, &token)
        .await
        .expect("Failed to seed token");
    token
}

/// Token endpoint success body.
#[allow(dead_code)]
pub fn token_body(access: &str, refresh: Option<&str>, expires_in: i64) -> serde_json::Value {
    let mut body = serde_json::json!({
        "access_token": access,
        "expires_in": expires_in,
        "token_type": "bearer",
        "scope": "offline read:recovery",
    });
    if let Some(refresh) = refresh {
        body["refresh_token"] = serde_json::json!(refresh);
    }
    body
}

/// One scripted answer of `FakeSource`.
#[allow(dead_code)]
#[derive(Debug, Clone)]
pub enum Reading {
    Value(f64),
    Missing,
    Unavailable,
    Revoked,
}

impl Reading {
    fn resolve(self) -> Result<Option<f64>, AppError> {
        match self {
            Reading::Value(v) => Ok(Some(v)),
            Reading::Missing => Ok(None),
            Reading::Unavailable => Err(AppError::ApiUnavailable("scripted outage".to_string())),
            Reading::Revoked => Err(AppError::ReauthRequired),
        }
    }
}

/// Scripted `MetricsSource`.
///
/// Strain and recovery readings are consumed in order; the last one repeats.
/// Sleep and workouts are fixed.
#[allow(dead_code)]
#[derive(Default)]
pub struct FakeSource {
    strain: Mutex<VecDeque<Reading>>,
    recovery: Mutex<VecDeque<Reading>>,
    pub sleep_hours: Mutex<Option<f64>>,
    pub workouts: Mutex<Option<WorkoutSummary>>,
    pub strain_calls: Mutex<u32>,
}

#[allow(dead_code)]
impl FakeSource {
    pub fn new(strain: Vec<Reading>, recovery: Vec<Reading>) -> Self {
        Self {
            strain: Mutex::new(strain.into()),
            recovery: Mutex::new(recovery.into()),
            sleep_hours: Mutex::new(None),
            workouts: Mutex::new(Some(WorkoutSummary::default())),
            strain_calls: Mutex::new(0),
        }
    }

    pub fn steady(strain: f64, recovery: f64) -> Self {
        Self::new(vec![Reading::Value(strain)], vec![Reading::Value(recovery)])
    }

    pub fn set_strain(&self, readings: Vec<Reading>) {
        *self.strain.lock().unwrap() = readings.into();
    }

    pub fn set_recovery(&self, readings: Vec<Reading>) {
        *self.recovery.lock().unwrap() = readings.into();
    }

    pub fn strain_calls(&self) -> u32 {
        *self.strain_calls.lock().unwrap()
    }

    fn next(queue: &Mutex<VecDeque<Reading>>) -> Reading {
        let mut queue = queue.lock().unwrap();
        if queue.len() > 1 {
            queue.pop_front().unwrap_or(Reading::Missing)
        } else {
            queue.front().cloned().unwrap_or(Reading::Missing)
        }
    }
}

#[async_trait]
impl MetricsSource for FakeSource {
    async fn recovery(&self, _user_id: UserId, _date: NaiveDate) -> Result<Option<f64>, AppError> {
        Self::next(&self.recovery).resolve()
    }

    async fn sleep_hours(
        &self,
        _user_id: UserId,
        _date: NaiveDate,
    ) -> Result<Option<f64>, AppError> {
        Ok(*self.sleep_hours.lock().unwrap())
    }

    async fn day_strain(&self, _user_id: UserId, _date: NaiveDate) -> Result<Option<f64>, AppError> {
        *self.strain_calls.lock().unwrap() += 1;
        Self::next(&self.strain).resolve()
    }

    async fn workouts(&self, _user_id: UserId, _date: NaiveDate) -> Result<WorkoutSummary, AppError> {
        let workouts = *self.workouts.lock().unwrap();
        workouts.ok_or_else(|| AppError::ApiUnavailable("scripted outage".to_string()))
    }
}

/// `Notifier` that keeps every message.
#[allow(dead_code)]
#[derive(Default)]
pub struct RecordingNotifier {
    pub sent: Mutex<Vec<(UserId, String)>>,
    pub fail: Mutex<bool>,
}

#[allow(dead_code)]
impl RecordingNotifier {
    pub fn messages(&self) -> Vec<String> {
        self.sent
            .lock()
            .unwrap()
            .iter()
            .map(|(_, text)| text.clone())
            .collect()
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn notify(&self, user_id: UserId, text: &str) -> anyhow::Result<()> {
        if *self.fail.lock().unwrap() {
            anyhow::bail!("delivery failed");
        }
        self.sent.lock().unwrap().push((user_id, text.to_string()));
        Ok(())
    }
}
