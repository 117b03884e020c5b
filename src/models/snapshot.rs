//! Daily metrics snapshot, one per user per calendar day.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

/// Aggregated WHOOP metrics for one day. Missing fields mean the fetch failed
/// or the provider had no data yet.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricsSnapshot {
    pub date: NaiveDate,
    #[serde(default)]
    pub recovery_pct: Option<f64>,
    #[serde(default)]
    pub sleep_hours: Option<f64>,
    #[serde(default)]
    pub strain: Option<f64>,
    #[serde(default)]
    pub workout_count: Option<u32>,
    pub updated_at: DateTime<Utc>,
}

impl MetricsSnapshot {
    pub fn empty(date: NaiveDate, now: DateTime<Utc>) -> Self {
        Self {
            date,
            recovery_pct: None,
            sleep_hours: None,
            strain: None,
            workout_count: None,
            updated_at: now,
        }
    }

    /// Overlay the fields `newer` managed to fetch onto `self`.
    pub fn merge_from(&mut self, newer: &MetricsSnapshot) {
        debug_assert_eq!(self.date, newer.date);
        if newer.recovery_pct.is_some() {
            self.recovery_pct = newer.recovery_pct;
        }
        if newer.sleep_hours.is_some() {
            self.sleep_hours = newer.sleep_hours;
        }
        if newer.strain.is_some() {
            self.strain = newer.strain;
        }
        if newer.workout_count.is_some() {
            self.workout_count = newer.workout_count;
        }
        self.updated_at = newer.updated_at;
    }

    /// True if nothing at all could be fetched.
    pub fn is_empty(&self) -> bool {
        self.recovery_pct.is_none()
            && self.sleep_hours.is_none()
            && self.strain.is_none()
            && self.workout_count.is_none()
    }
}
