// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Typed WHOOP metric queries.
//!
//! Each query covers one calendar day and costs exactly one API call.

use crate::error::AppError;
use crate::models::{MetricsSnapshot, UserId};
use crate::services::api_client::{ApiRequest, RateLimitedApiClient};
use crate::time_utils::day_bounds;
use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use serde::de::DeserializeOwned;
use serde::Deserialize;

pub const CYCLE_PATH: &str = "/v2/cycle";
pub const RECOVERY_PATH: &str = "/v2/recovery";
pub const SLEEP_PATH: &str = "/v2/activity/sleep";
pub const WORKOUT_PATH: &str = "/v2/activity/workout";

const MILLIS_PER_HOUR: f64 = 3_600_000.0;

/// Workouts of one day.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct WorkoutSummary {
    pub count: u32,
    pub total_strain: f64,
}

impl WorkoutSummary {
    /// Strain estimate when the cycle has none yet.
    pub fn strain_estimate(&self) -> Option<f64> {
        (self.total_strain > 0.0).then_some(self.total_strain)
    }
}

/// Source of daily metrics. `Ok(None)` means the provider has no score yet.
#[async_trait]
pub trait MetricsSource: Send + Sync {
    async fn recovery(&self, user_id: UserId, date: NaiveDate) -> Result<Option<f64>, AppError>;

    async fn sleep_hours(&self, user_id: UserId, date: NaiveDate)
        -> Result<Option<f64>, AppError>;

    /// Day strain as scored on the physiological cycle.
    async fn day_strain(&self, user_id: UserId, date: NaiveDate) -> Result<Option<f64>, AppError>;

    async fn workouts(&self, user_id: UserId, date: NaiveDate) -> Result<WorkoutSummary, AppError>;

    /// Day strain, falling back to the sum of workout strains.
    async fn current_strain(
        &self,
        user_id: UserId,
        date: NaiveDate,
    ) -> Result<Option<f64>, AppError> {
        match self.day_strain(user_id, date).await? {
            Some(strain) => Ok(Some(strain)),
            None => Ok(self.workouts(user_id, date).await?.strain_estimate()),
        }
    }
}

/// Fetch every metric for `date`, keeping whatever succeeded.
///
/// Four queries, one each for recovery, sleep, cycle and workouts, issued
/// together. Failures are logged and leave their field empty.
/// `ReauthRequired` aborts, since no other query can succeed either.
pub async fn collect_snapshot(
    source: &dyn MetricsSource,
    user_id: UserId,
    date: NaiveDate,
    now: DateTime<Utc>,
) -> Result<MetricsSnapshot, AppError> {
    let (recovery, sleep, cycle, workouts) = futures_util::join!(
        source.recovery(user_id, date),
        source.sleep_hours(user_id, date),
        source.day_strain(user_id, date),
        source.workouts(user_id, date),
    );

    let mut snapshot = MetricsSnapshot::empty(date, now);
    snapshot.recovery_pct = partial(user_id, "recovery", recovery)?.flatten();
    snapshot.sleep_hours = partial(user_id, "sleep", sleep)?.flatten();
    let cycle_strain = partial(user_id, "cycle", cycle)?.flatten();
    let workouts = partial(user_id, "workouts", workouts)?;

    snapshot.workout_count = workouts.map(|w| w.count);
    snapshot.strain = cycle_strain.or_else(|| workouts.and_then(|w| w.strain_estimate()));

    Ok(snapshot)
}

fn partial<T>(
    user_id: UserId,
    metric: &'static str,
    result: Result<T, AppError>,
) -> Result<Option<T>, AppError> {
    match result {
        Ok(value) => Ok(Some(value)),
        Err(e) if e.is_reauth_required() => Err(e),
        Err(e) => {
            tracing::warn!(user_id, metric, error = %e, "Metric fetch failed, leaving it empty");
            Ok(None)
        }
    }
}

// ─── Wire types ──────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
struct Page<T> {
    #[serde(default = "Vec::new")]
    records: Vec<T>,
}

#[derive(Debug, Deserialize)]
struct CycleRecord {
    score: Option<CycleScore>,
}

#[derive(Debug, Deserialize)]
struct CycleScore {
    strain: Option<f64>,
}

#[derive(Debug, Deserialize)]
struct RecoveryRecord {
    score: Option<RecoveryScore>,
}

#[derive(Debug, Deserialize)]
struct RecoveryScore {
    recovery_score: Option<f64>,
}

#[derive(Debug, Deserialize)]
struct SleepRecord {
    score: Option<SleepScore>,
}

#[derive(Debug, Deserialize)]
struct SleepScore {
    stage_summary: Option<StageSummary>,
}

#[derive(Debug, Deserialize)]
struct StageSummary {
    total_in_bed_time_milli: Option<f64>,
}

#[derive(Debug, Deserialize)]
struct WorkoutRecord {
    score: Option<WorkoutScore>,
}

#[derive(Debug, Deserialize)]
struct WorkoutScore {
    strain: Option<f64>,
}

/// `MetricsSource` backed by the WHOOP v2 API.
#[derive(Clone)]
pub struct MetricsFetcher {
    client: RateLimitedApiClient,
}

impl MetricsFetcher {
    pub fn new(client: RateLimitedApiClient) -> Self {
        Self { client }
    }

    pub fn client(&self) -> &RateLimitedApiClient {
        &self.client
    }

    async fn records<T: DeserializeOwned>(
        &self,
        user_id: UserId,
        path: &str,
        date: NaiveDate,
    ) -> Result<Vec<T>, AppError> {
        let (start, end) = day_bounds(date);
        let request = ApiRequest::get(path)
            .with_query("start", start)
            .with_query("end", end);

        let body = self.client.execute(user_id, &request).await?;
        let page: Page<T> = serde_json::from_value(body)
            .map_err(|e| AppError::ApiUnavailable(format!("Unexpected {} payload: {}", path, e)))?;
        Ok(page.records)
    }
}

#[async_trait]
impl MetricsSource for MetricsFetcher {
    async fn recovery(&self, user_id: UserId, date: NaiveDate) -> Result<Option<f64>, AppError> {
        let records: Vec<RecoveryRecord> = self.records(user_id, RECOVERY_PATH, date).await?;
        Ok(records
            .into_iter()
            .next()
            .and_then(|r| r.score)
            .and_then(|s| s.recovery_score))
    }

    async fn sleep_hours(
        &self,
        user_id: UserId,
        date: NaiveDate,
    ) -> Result<Option<f64>, AppError> {
        let records: Vec<SleepRecord> = self.records(user_id, SLEEP_PATH, date).await?;
        Ok(records
            .into_iter()
            .next()
            .and_then(|r| r.score)
            .and_then(|s| s.stage_summary)
            .and_then(|s| s.total_in_bed_time_milli)
            .map(|ms| ms / MILLIS_PER_HOUR))
    }

    async fn day_strain(&self, user_id: UserId, date: NaiveDate) -> Result<Option<f64>, AppError> {
        let records: Vec<CycleRecord> = self.records(user_id, CYCLE_PATH, date).await?;
        Ok(records
            .into_iter()
            .next()
            .and_then(|r| r.score)
            .and_then(|s| s.strain))
    }

    async fn workouts(&self, user_id: UserId, date: NaiveDate) -> Result<WorkoutSummary, AppError> {
        let records: Vec<WorkoutRecord> = self.records(user_id, WORKOUT_PATH, date).await?;
        let total_strain = records
            .iter()
            .filter_map(|w| w.score.as_ref().and_then(|s| s.strain))
            .sum();
        Ok(WorkoutSummary {
            count: records.len() as u32,
            total_strain,
        })
    }
}
