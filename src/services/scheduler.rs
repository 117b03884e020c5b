// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! In-process job scheduler.
//!
//! Interval jobs run in their own loop task: sleep until the next
//! occurrence, then run the handler. Daily jobs are fired by a shared
//! `tokio-cron-scheduler` instance and drained by a loop task of their own.
//! Either way, occurrences of one job never overlap, and a slow job cannot
//! hold up any other job.
//!
//! Cancelling a job stops its loop. A handler already running is left to
//! finish. Missed occurrences (process down) are not replayed.

use crate::models::ActiveWindow;
use chrono::{DateTime, Days, Local, NaiveDate, NaiveTime, Timelike, Utc};
use dashmap::DashMap;
use serde::Serialize;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, OnceCell};
use tokio::task::JoinHandle;
use tokio_cron_scheduler::{Job as CronJob, JobScheduler, JobSchedulerError};
use uuid::Uuid;

pub type JobFuture = Pin<Box<dyn Future<Output = anyhow::Result<()>> + Send>>;

/// Async job body. Called once per occurrence.
pub type JobHandler = Arc<dyn Fn() -> JobFuture + Send + Sync>;

/// When a job runs.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Cadence {
    /// Every day at a local time.
    DailyAt(NaiveTime),
    /// Every `interval`, optionally only inside a local time window.
    Every {
        interval: Duration,
        window: Option<ActiveWindow>,
    },
}

/// Six-field cron expression (sec min hour dom month dow) for a daily run.
pub fn daily_cron_expr(at: NaiveTime) -> String {
    format!("{} {} {} * * *", at.second(), at.minute(), at.hour())
}

/// Time from `now` to the next interval occurrence.
pub fn interval_delay(
    interval: Duration,
    window: Option<ActiveWindow>,
    now: DateTime<Local>,
) -> Duration {
    let Some(window) = window else {
        return interval;
    };
    let candidate = chrono::Duration::from_std(interval)
        .ok()
        .map(|step| now + step);
    match candidate {
        Some(at) if window.contains(at.time()) => interval,
        _ => (next_local(now, window.start) - now)
            .to_std()
            .unwrap_or(Duration::ZERO),
    }
}

/// First instant after `now` whose local time is `at`.
fn next_local(now: DateTime<Local>, at: NaiveTime) -> DateTime<Local> {
    let today = now.date_naive();
    let candidate = local_at(today, at).filter(|t| *t > now);
    candidate
        .or_else(|| today.checked_add_days(Days::new(1)).and_then(|d| local_at(d, at)))
        // DST gap on both days: try again in an hour.
        .unwrap_or(now + chrono::Duration::hours(1))
}

fn local_at(date: NaiveDate, at: NaiveTime) -> Option<DateTime<Local>> {
    date.and_time(at).and_local_timezone(Local).earliest()
}

/// Next scheduled occurrence of a job.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct JobInfo {
    pub name: String,
    pub next_run: DateTime<Utc>,
}

struct Job {
    handle: JoinHandle<()>,
}

type NextRuns = Arc<DashMap<String, DateTime<Utc>>>;

/// Process-wide scheduler. Clones share the same jobs.
#[derive(Clone, Default)]
pub struct Scheduler {
    jobs: Arc<DashMap<String, Job>>,
    next_runs: NextRuns,
    /// Started on the first daily registration.
    cron: Arc<OnceCell<JobScheduler>>,
}

impl Scheduler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `handler` under `name`, replacing any job of that name.
    ///
    /// The old loop is stopped before the new one is stored.
    pub fn register(&self, name: &str, cadence: Cadence, handler: JobHandler) {
        match self.jobs.entry(name.to_string()) {
            dashmap::mapref::entry::Entry::Occupied(mut entry) => {
                entry.get().handle.abort();
                self.next_runs.remove(name);
                let handle = self.spawn(name, cadence, handler);
                entry.insert(Job { handle });
                tracing::info!(job = name, ?cadence, "Job re-registered");
            }
            dashmap::mapref::entry::Entry::Vacant(entry) => {
                let handle = self.spawn(name, cadence, handler);
                entry.insert(Job { handle });
                tracing::info!(job = name, ?cadence, "Job registered");
            }
        }
    }

    fn spawn(&self, name: &str, cadence: Cadence, handler: JobHandler) -> JoinHandle<()> {
        let name = name.to_string();
        let next_runs = self.next_runs.clone();
        match cadence {
            Cadence::DailyAt(at) => {
                tokio::spawn(run_daily(name, at, handler, next_runs, self.cron.clone()))
            }
            Cadence::Every { interval, window } => {
                tokio::spawn(run_interval(name, interval, window, handler, next_runs))
            }
        }
    }

    /// Stop the job called `name`. Returns false if there was none.
    pub fn cancel(&self, name: &str) -> bool {
        self.next_runs.remove(name);
        match self.jobs.remove(name) {
            Some((_, job)) => {
                job.handle.abort();
                tracing::info!(job = name, "Job cancelled");
                true
            }
            None => false,
        }
    }

    pub fn is_registered(&self, name: &str) -> bool {
        self.jobs.contains_key(name)
    }

    /// Next occurrence of every registered job, by name.
    pub fn next_runs(&self) -> Vec<JobInfo> {
        let mut runs: Vec<JobInfo> = self
            .next_runs
            .iter()
            .filter(|entry| self.jobs.contains_key(entry.key()))
            .map(|entry| JobInfo {
                name: entry.key().clone(),
                next_run: *entry.value(),
            })
            .collect();
        runs.sort_by(|a, b| a.name.cmp(&b.name));
        runs
    }

    /// Stop every job.
    pub fn shutdown(&self) {
        let names: Vec<String> = self.jobs.iter().map(|e| e.key().clone()).collect();
        for name in names {
            self.cancel(&name);
        }
    }
}

async fn run_once(name: &str, handler: &JobHandler) {
    tracing::debug!(job = %name, "Running scheduled job");
    // Own task: stopping the job must not stop a run in progress.
    match tokio::spawn(handler()).await {
        Ok(Ok(())) => tracing::debug!(job = %name, "Scheduled job finished"),
        Ok(Err(e)) => tracing::warn!(job = %name, error = %e, "Scheduled job failed"),
        Err(e) => tracing::error!(job = %name, error = %e, "Scheduled job panicked"),
    }
}

async fn run_interval(
    name: String,
    interval: Duration,
    window: Option<ActiveWindow>,
    handler: JobHandler,
    next_runs: NextRuns,
) {
    loop {
        let now = Local::now();
        let delay = interval_delay(interval, window, now);
        let next = now.with_timezone(&Utc)
            + chrono::Duration::from_std(delay).unwrap_or_else(|_| chrono::Duration::zero());
        next_runs.insert(name.clone(), next);

        tokio::time::sleep(delay).await;
        run_once(&name, &handler).await;
    }
}

async fn start_cron() -> Result<JobScheduler, JobSchedulerError> {
    let scheduler = JobScheduler::new().await?;
    scheduler.start().await?;
    tracing::info!("Cron scheduler started");
    Ok(scheduler)
}

/// A daily job living in the cron scheduler. Dropping it removes the job.
struct CronEntry {
    scheduler: JobScheduler,
    id: Uuid,
}

impl CronEntry {
    async fn record_next(&self, name: &str, next_runs: &NextRuns) {
        let mut scheduler = self.scheduler.clone();
        match scheduler.next_tick_for_job(self.id).await {
            Ok(Some(next)) => {
                next_runs.insert(name.to_string(), next);
            }
            Ok(None) => {}
            Err(e) => tracing::warn!(job = %name, error = %e, "Next cron tick unknown"),
        }
    }
}

impl Drop for CronEntry {
    fn drop(&mut self) {
        let scheduler = self.scheduler.clone();
        let id = self.id;
        if let Ok(runtime) = tokio::runtime::Handle::try_current() {
            runtime.spawn(async move {
                if let Err(e) = scheduler.remove(&id).await {
                    tracing::warn!(job_uuid = %id, error = %e, "Failed to remove cron job");
                }
            });
        }
    }
}

async fn add_daily(
    scheduler: &JobScheduler,
    at: NaiveTime,
    fire: mpsc::Sender<()>,
) -> Result<CronEntry, JobSchedulerError> {
    let job = CronJob::new_async_tz(daily_cron_expr(at).as_str(), Local, move |_id, _cron| {
        let fire = fire.clone();
        Box::pin(async move {
            // Full means a fire is already pending.
            let _ = fire.try_send(());
        })
    })?;
    let id = scheduler.add(job).await?;
    Ok(CronEntry {
        scheduler: scheduler.clone(),
        id,
    })
}

async fn run_daily(
    name: String,
    at: NaiveTime,
    handler: JobHandler,
    next_runs: NextRuns,
    cron: Arc<OnceCell<JobScheduler>>,
) {
    let scheduler = match cron.get_or_try_init(start_cron).await {
        Ok(scheduler) => scheduler.clone(),
        Err(e) => {
            tracing::error!(job = %name, error = %e, "Cron scheduler unavailable");
            return;
        }
    };

    let (fire_tx, mut fire_rx) = mpsc::channel::<()>(1);
    let entry = match add_daily(&scheduler, at, fire_tx).await {
        Ok(entry) => entry,
        Err(e) => {
            tracing::error!(job = %name, error = %e, "Failed to add daily job");
            return;
        }
    };

    loop {
        entry.record_next(&name, &next_runs).await;
        if fire_rx.recv().await.is_none() {
            return;
        }
        run_once(&name, &handler).await;
        // Occurrences that fired during the run are skipped.
        while fire_rx.try_recv().is_ok() {}
    }
}
