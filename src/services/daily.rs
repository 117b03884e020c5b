// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Once-a-day metrics pull into the day's `MetricsSnapshot`.

use crate::db::Store;
use crate::error::AppError;
use crate::models::{MetricsSnapshot, UserId};
use crate::services::metrics::{collect_snapshot, MetricsSource};
use crate::services::scheduler::{JobFuture, JobHandler};
use chrono::{DateTime, Local, NaiveDate, Utc};
use std::sync::Arc;

pub struct DailyRefresher {
    user_id: UserId,
    source: Arc<dyn MetricsSource>,
    store: Arc<dyn Store>,
}

impl DailyRefresher {
    pub fn new(user_id: UserId, source: Arc<dyn MetricsSource>, store: Arc<dyn Store>) -> Self {
        Self {
            user_id,
            source,
            store,
        }
    }

    /// Refresh the snapshot for the current local date.
    pub async fn refresh_today(&self) -> Result<MetricsSnapshot, AppError> {
        let now = Local::now();
        self.refresh_day(now.date_naive(), now.with_timezone(&Utc))
            .await
    }

    /// Fetch `date` and merge it into the stored snapshot.
    ///
    /// Re-running overwrites fields that were fetched this time and keeps the
    /// rest. Days before `today` are closed.
    pub async fn refresh_day(
        &self,
        date: NaiveDate,
        now: DateTime<Utc>,
    ) -> Result<MetricsSnapshot, AppError> {
        let user_id = self.user_id;
        let today = now.with_timezone(&Local).date_naive();
        if date < today {
            return Err(AppError::BadRequest(format!(
                "Snapshot for {} is closed",
                date
            )));
        }

        let fresh = collect_snapshot(self.source.as_ref(), user_id, date, now).await?;
        let existing = self.store.get_snapshot(user_id, date).await?;

        if fresh.is_empty() {
            tracing::warn!(user_id, %date, "Daily refresh fetched nothing, keeping previous snapshot");
            return Ok(existing.unwrap_or(fresh));
        }

        let snapshot = match existing {
            Some(mut snapshot) => {
                snapshot.merge_from(&fresh);
                snapshot
            }
            None => fresh,
        };

        self.store.upsert_snapshot(user_id, &snapshot).await?;

        tracing::info!(
            user_id,
            %date,
            recovery = ?snapshot.recovery_pct,
            sleep_hours = ?snapshot.sleep_hours,
            strain = ?snapshot.strain,
            workouts = ?snapshot.workout_count,
            "Daily metrics snapshot stored"
        );
        Ok(snapshot)
    }
}

/// Scheduler handler refreshing today's snapshot.
pub fn refresh_job(refresher: Arc<DailyRefresher>) -> JobHandler {
    Arc::new(move || -> JobFuture {
        let refresher = refresher.clone();
        Box::pin(async move {
            refresher.refresh_today().await?;
            Ok::<(), anyhow::Error>(())
        })
    })
}
