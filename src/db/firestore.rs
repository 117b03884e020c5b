// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Firestore-backed `Store`.
//!
//! Provides typed operations for:
//! - Tokens (one KMS-sealed document per user)
//! - Monitoring config (one document per user)
//! - Alerts (append-only log)
//! - Daily metrics snapshots (one document per user per day)

use crate::db::{collections, snapshot_doc_id, Store};
use crate::error::AppError;
use crate::models::{AlertRecord, MetricsSnapshot, MonitoringConfig, OAuthToken, Urgency, UserId};
use crate::services::KmsService;
use crate::time_utils::format_utc_rfc3339;
use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

/// Stored form of an `OAuthToken`.
///
/// The whole pair is a single ciphertext so that a write can never leave a
/// new access token next to a stale refresh token.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SealedToken {
    /// KMS ciphertext of the JSON-encoded token (base64)
    pub sealed: String,
    /// Plaintext expiry, for operators (ISO 8601)
    pub expires_at: String,
    pub updated_at: String,
}

/// Stored form of an `AlertRecord`.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct AlertDoc {
    user_id: UserId,
    /// ISO 8601, `Z` suffix, so lexical order is time order
    timestamp: String,
    strain_value: f64,
    recovery_value: Option<f64>,
    urgency_level: Urgency,
    advice_text: String,
}

impl AlertDoc {
    fn from_record(user_id: UserId, record: &AlertRecord) -> Self {
        Self {
            user_id,
            timestamp: format_utc_rfc3339(record.timestamp),
            strain_value: record.strain_value,
            recovery_value: record.recovery_value,
            urgency_level: record.urgency_level,
            advice_text: record.advice_text.clone(),
        }
    }

    fn into_record(self) -> Result<AlertRecord, AppError> {
        let timestamp = DateTime::parse_from_rfc3339(&self.timestamp)
            .map_err(|e| AppError::Database(format!("Bad alert timestamp: {}", e)))?
            .with_timezone(&Utc);
        Ok(AlertRecord {
            timestamp,
            strain_value: self.strain_value,
            recovery_value: self.recovery_value,
            urgency_level: self.urgency_level,
            advice_text: self.advice_text,
        })
    }
}

/// Firestore database client.
#[derive(Clone)]
pub struct FirestoreDb {
    client: Option<firestore::FirestoreDb>,
    kms: KmsService,
}

impl FirestoreDb {
    /// Create a new Firestore client.
    ///
    /// For local development with emulator, set FIRESTORE_EMULATOR_HOST.
    pub async fn new(project_id: &str, kms: KmsService) -> Result<Self, AppError> {
        if std::env::var("FIRESTORE_EMULATOR_HOST").is_ok() {
            return Self::create_emulator_client(project_id, kms).await;
        }

        let client = firestore::FirestoreDb::new(project_id)
            .await
            .map_err(|e| AppError::Database(format!("Failed to connect to Firestore: {}", e)))?;

        tracing::info!(project = project_id, "Connected to Firestore");

        Ok(Self {
            client: Some(client),
            kms,
        })
    }

    /// Create a Firestore client for the emulator with unauthenticated access.
    async fn create_emulator_client(project_id: &str, kms: KmsService) -> Result<Self, AppError> {
        tracing::info!("Using unauthenticated connection for Firestore Emulator");

        let token_source = gcloud_sdk::ExternalJwtFunctionSource::new(|| async {
            Ok(gcloud_sdk::Token {
                token_type: "Bearer".to_string(),
                token: gcloud_sdk::SecretValue::new(
                    "eyJhbGciOiJub25lIn0.eyJ1aWQiOiJ0ZXN0In0."
                        .to_string()
                        .into(),
                ),
                expiry: chrono::Utc::now() + chrono::Duration::hours(1),
            })
        });

        let options = firestore::FirestoreDbOptions::new(project_id.to_string());

        let client = firestore::FirestoreDb::with_options_token_source(
            options,
            gcloud_sdk::GCP_DEFAULT_SCOPES.clone(),
            gcloud_sdk::TokenSourceType::ExternalSource(Box::new(token_source)),
        )
        .await
        .map_err(|e| {
            AppError::Database(format!("Failed to connect to Firestore Emulator: {}", e))
        })?;

        tracing::info!(
            project = project_id,
            "Connected to Firestore (Emulator/Unauthenticated)"
        );

        Ok(Self {
            client: Some(client),
            kms,
        })
    }

    /// Offline client: every operation fails with a database error.
    pub fn new_offline(kms: KmsService) -> Self {
        Self { client: None, kms }
    }

    fn get_client(&self) -> Result<&firestore::FirestoreDb, AppError> {
        self.client
            .as_ref()
            .ok_or_else(|| AppError::Database("Database not connected (offline mode)".to_string()))
    }

    async fn seal_token(&self, user_id: UserId, token: &OAuthToken) -> Result<SealedToken, AppError> {
        let plaintext = serde_json::to_string(token)
            .map_err(|e| AppError::Internal(anyhow::anyhow!("Token encode failed: {}", e)))?;
        let sealed = self.kms.encrypt(&plaintext, user_id).await?;
        Ok(SealedToken {
            sealed,
            expires_at: format_utc_rfc3339(token.expires_at),
            updated_at: format_utc_rfc3339(Utc::now()),
        })
    }

    async fn open_token(&self, user_id: UserId, doc: &SealedToken) -> Result<OAuthToken, AppError> {
        let plaintext = self.kms.decrypt(&doc.sealed, user_id).await?;
        serde_json::from_str(&plaintext)
            .map_err(|e| AppError::Internal(anyhow::anyhow!("Token decode failed: {}", e)))
    }
}

#[async_trait]
impl Store for FirestoreDb {
    // ─── Token Operations ────────────────────────────────────────

    async fn get_token(&self, user_id: UserId) -> Result<Option<OAuthToken>, AppError> {
        let doc: Option<SealedToken> = self
            .get_client()?
            .fluent()
            .select()
            .by_id_in(collections::TOKENS)
            .obj()
            .one(&user_id.to_string())
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;

        match doc {
            Some(doc) => Ok(Some(self.open_token(user_id, &doc).await?)),
            None => Ok(None),
        }
    }

    async fn put_token(&self, user_id: UserId, token: &OAuthToken) -> Result<(), AppError> {
        let doc = self.seal_token(user_id, token).await?;
        let _: () = self
            .get_client()?
            .fluent()
            .update()
            .in_col(collections::TOKENS)
            .document_id(user_id.to_string())
            .object(&doc)
            .execute()
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;
        Ok(())
    }

    async fn delete_token(&self, user_id: UserId) -> Result<(), AppError> {
        self.get_client()?
            .fluent()
            .delete()
            .from(collections::TOKENS)
            .document_id(user_id.to_string())
            .execute()
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;
        Ok(())
    }

    // ─── Monitoring Config ───────────────────────────────────────

    async fn get_monitoring_config(
        &self,
        user_id: UserId,
    ) -> Result<Option<MonitoringConfig>, AppError> {
        self.get_client()?
            .fluent()
            .select()
            .by_id_in(collections::MONITORING)
            .obj()
            .one(&user_id.to_string())
            .await
            .map_err(|e| AppError::Database(e.to_string()))
    }

    async fn put_monitoring_config(
        &self,
        user_id: UserId,
        config: &MonitoringConfig,
    ) -> Result<(), AppError> {
        let _: () = self
            .get_client()?
            .fluent()
            .update()
            .in_col(collections::MONITORING)
            .document_id(user_id.to_string())
            .object(config)
            .execute()
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;
        Ok(())
    }

    // ─── Alert Log ───────────────────────────────────────────────

    async fn append_alert(&self, user_id: UserId, record: &AlertRecord) -> Result<(), AppError> {
        let doc = AlertDoc::from_record(user_id, record);
        let doc_id = format!("{}_{}", user_id, record.timestamp.timestamp_millis());

        let _: () = self
            .get_client()?
            .fluent()
            .update()
            .in_col(collections::ALERTS)
            .document_id(doc_id)
            .object(&doc)
            .execute()
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;
        Ok(())
    }

    async fn recent_alerts(
        &self,
        user_id: UserId,
        limit: usize,
    ) -> Result<Vec<AlertRecord>, AppError> {
        let docs: Vec<AlertDoc> = self
            .get_client()?
            .fluent()
            .select()
            .from(collections::ALERTS)
            .filter(|q| q.for_all([q.field("user_id").eq(user_id)]))
            .order_by([("timestamp", firestore::FirestoreQueryDirection::Descending)])
            .limit(limit as u32)
            .obj()
            .query()
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;

        docs.into_iter().map(AlertDoc::into_record).collect()
    }

    // ─── Snapshots ───────────────────────────────────────────────

    async fn upsert_snapshot(
        &self,
        user_id: UserId,
        snapshot: &MetricsSnapshot,
    ) -> Result<(), AppError> {
        let _: () = self
            .get_client()?
            .fluent()
            .update()
            .in_col(collections::SNAPSHOTS)
            .document_id(snapshot_doc_id(user_id, snapshot.date))
            .object(snapshot)
            .execute()
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;
        Ok(())
    }

    async fn get_snapshot(
        &self,
        user_id: UserId,
        date: NaiveDate,
    ) -> Result<Option<MetricsSnapshot>, AppError> {
        self.get_client()?
            .fluent()
            .select()
            .by_id_in(collections::SNAPSHOTS)
            .obj()
            .one(&snapshot_doc_id(user_id, date))
            .await
            .map_err(|e| AppError::Database(e.to_string()))
    }
}
