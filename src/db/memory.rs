//! In-process `Store` for tests and single-instance local runs.

use crate::db::Store;
use crate::error::AppError;
use crate::models::{AlertRecord, MetricsSnapshot, MonitoringConfig, OAuthToken, UserId};
use async_trait::async_trait;
use chrono::NaiveDate;
use std::collections::HashMap;
use tokio::sync::RwLock;

#[derive(Default)]
pub struct MemoryDb {
    tokens: RwLock<HashMap<UserId, OAuthToken>>,
    monitoring: RwLock<HashMap<UserId, MonitoringConfig>>,
    alerts: RwLock<HashMap<UserId, Vec<AlertRecord>>>,
    snapshots: RwLock<HashMap<(UserId, NaiveDate), MetricsSnapshot>>,
}

impl MemoryDb {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Store for MemoryDb {
    async fn get_token(&self, user_id: UserId) -> Result<Option<OAuthToken>, AppError> {
        Ok(self.tokens.read().await.get(&user_id).cloned())
    }

    async fn put_token(&self, user_id: UserId, token: &OAuthToken) -> Result<(), AppError> {
        self.tokens.write().await.insert(user_id, token.clone());
        Ok(())
    }

    async fn delete_token(&self, user_id: UserId) -> Result<(), AppError> {
        self.tokens.write().await.remove(&user_id);
        Ok(())
    }

    async fn get_monitoring_config(
        &self,
        user_id: UserId,
    ) -> Result<Option<MonitoringConfig>, AppError> {
        Ok(self.monitoring.read().await.get(&user_id).cloned())
    }

    async fn put_monitoring_config(
        &self,
        user_id: UserId,
        config: &MonitoringConfig,
    ) -> Result<(), AppError> {
        self.monitoring
            .write()
            .await
            .insert(user_id, config.clone());
        Ok(())
    }

    async fn append_alert(&self, user_id: UserId, record: &AlertRecord) -> Result<(), AppError> {
        self.alerts
            .write()
            .await
            .entry(user_id)
            .or_default()
            .push(record.clone());
        Ok(())
    }

    async fn recent_alerts(
        &self,
        user_id: UserId,
        limit: usize,
    ) -> Result<Vec<AlertRecord>, AppError> {
        let alerts = self.alerts.read().await;
        let mut records = alerts.get(&user_id).cloned().unwrap_or_default();
        records.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
        records.truncate(limit);
        Ok(records)
    }

    async fn upsert_snapshot(
        &self,
        user_id: UserId,
        snapshot: &MetricsSnapshot,
    ) -> Result<(), AppError> {
        self.snapshots
            .write()
            .await
            .insert((user_id, snapshot.date), snapshot.clone());
        Ok(())
    }

    async fn get_snapshot(
        &self,
        user_id: UserId,
        date: NaiveDate,
    ) -> Result<Option<MetricsSnapshot>, AppError> {
        Ok(self.snapshots.read().await.get(&(user_id, date)).cloned())
    }
}
