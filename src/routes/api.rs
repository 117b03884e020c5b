// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! API routes for the messaging front-end.

use crate::error::Result;
use crate::middleware::auth::AuthUser;
use crate::models::{AlertRecord, MetricsSnapshot, MonitoringConfig};
use crate::services::MonitoringStatus;
use crate::AppState;
use axum::{
    extract::{Query, State},
    http::StatusCode,
    routing::{get, post, put},
    Extension, Json, Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// API routes (require authentication via JWT).
/// The auth middleware is applied in routes/mod.rs for these routes.
pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/api/whoop/connect", post(connect))
        .route("/api/whoop/code", post(submit_code))
        .route("/api/whoop/metrics", get(current_metrics))
        .route("/api/monitoring", get(monitoring_status).put(set_monitoring))
        .route("/api/monitoring/threshold", put(set_threshold))
        .route("/api/alerts", get(alert_history))
        .route("/api/snapshots/today", get(today_snapshot))
}

// ─── WHOOP Connection ────────────────────────────────────────

#[derive(Serialize)]
pub struct ConnectResponse {
    pub authorization_url: String,
}

async fn connect(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
) -> Result<Json<ConnectResponse>> {
    let authorization_url = state.commands.connect()?;
    tracing::info!(user_id = user.user_id, "Issued WHOOP authorization link");
    Ok(Json(ConnectResponse { authorization_url }))
}

#[derive(Deserialize)]
pub struct SubmitCodeRequest {
    /// Bare code or the full redirect URL.
    pub code: String,
}

async fn submit_code(
    State(state): State<Arc<AppState>>,
    Json(body): Json<SubmitCodeRequest>,
) -> Result<StatusCode> {
    state.commands.submit_code(&body.code).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn current_metrics(State(state): State<Arc<AppState>>) -> Result<Json<MetricsSnapshot>> {
    Ok(Json(state.commands.current_metrics().await?))
}

// ─── Monitoring ──────────────────────────────────────────────

async fn monitoring_status(State(state): State<Arc<AppState>>) -> Result<Json<MonitoringStatus>> {
    Ok(Json(state.commands.monitoring_status().await?))
}

#[derive(Deserialize)]
pub struct SetMonitoringRequest {
    pub enabled: bool,
}

async fn set_monitoring(
    State(state): State<Arc<AppState>>,
    Json(body): Json<SetMonitoringRequest>,
) -> Result<Json<MonitoringStatus>> {
    Ok(Json(state.commands.set_monitoring(body.enabled).await?))
}

#[derive(Deserialize)]
pub struct SetThresholdRequest {
    pub threshold: f64,
}

async fn set_threshold(
    State(state): State<Arc<AppState>>,
    Json(body): Json<SetThresholdRequest>,
) -> Result<Json<MonitoringConfig>> {
    Ok(Json(state.commands.set_threshold(body.threshold).await?))
}

// ─── History ─────────────────────────────────────────────────

#[derive(Deserialize)]
pub struct AlertHistoryParams {
    #[serde(default)]
    pub limit: Option<usize>,
}

async fn alert_history(
    State(state): State<Arc<AppState>>,
    Query(params): Query<AlertHistoryParams>,
) -> Result<Json<Vec<AlertRecord>>> {
    Ok(Json(state.commands.alert_history(params.limit).await?))
}

async fn today_snapshot(State(state): State<Arc<AppState>>) -> Result<Json<MetricsSnapshot>> {
    Ok(Json(state.commands.today_snapshot().await?))
}
