//! Persistence layer.
//!
//! `Store` is the storage contract the services are written against.
//! Production uses Firestore; tests and local runs use the in-memory store.

pub mod firestore;
pub mod memory;

pub use firestore::FirestoreDb;
pub use memory::MemoryDb;

use crate::error::AppError;
use crate::models::{AlertRecord, MetricsSnapshot, MonitoringConfig, OAuthToken, UserId};
use async_trait::async_trait;
use chrono::NaiveDate;

/// Collection names as constants.
pub mod collections {
    pub const TOKENS: &str = "whoop_tokens";
    pub const MONITORING: &str = "monitoring_config";
    pub const ALERTS: &str = "alerts";
    /// Daily metrics snapshots (keyed by `{user_id}_{date}`)
    pub const SNAPSHOTS: &str = "metrics_snapshots";
}

/// Durable state for every user, one row per concern.
///
/// Writes of a single row are atomic: readers never observe half of a token
/// pair or snapshot.
#[async_trait]
pub trait Store: Send + Sync {
    async fn get_token(&self, user_id: UserId) -> Result<Option<OAuthToken>, AppError>;

    async fn put_token(&self, user_id: UserId, token: &OAuthToken) -> Result<(), AppError>;

    async fn delete_token(&self, user_id: UserId) -> Result<(), AppError>;

    async fn get_monitoring_config(
        &self,
        user_id: UserId,
    ) -> Result<Option<MonitoringConfig>, AppError>;

    async fn put_monitoring_config(
        &self,
        user_id: UserId,
        config: &MonitoringConfig,
    ) -> Result<(), AppError>;

    /// Append to the alert log. Records are never updated.
    async fn append_alert(&self, user_id: UserId, record: &AlertRecord) -> Result<(), AppError>;

    /// Most recent alerts, newest first.
    async fn recent_alerts(
        &self,
        user_id: UserId,
        limit: usize,
    ) -> Result<Vec<AlertRecord>, AppError>;

    /// Insert or replace the snapshot for `snapshot.date`.
    async fn upsert_snapshot(
        &self,
        user_id: UserId,
        snapshot: &MetricsSnapshot,
    ) -> Result<(), AppError>;

    async fn get_snapshot(
        &self,
        user_id: UserId,
        date: NaiveDate,
    ) -> Result<Option<MetricsSnapshot>, AppError>;
}

/// Document id for a user's snapshot of one day.
pub fn snapshot_doc_id(user_id: UserId, date: NaiveDate) -> String {
    format!("{}_{}", user_id, date.format("%Y-%m-%d"))
}
