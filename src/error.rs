// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Application error types with consistent API responses.
//!
//! The WHOOP-facing variants follow one propagation rule: the client and the
//! token manager resolve everything they can through retry or refresh, and
//! only `ReauthRequired` and `ConfigInvalid` are meant for the user.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use std::time::Duration;

/// Application error type that converts to HTTP responses.
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    /// Network failure or 5xx from the provider. Retried internally.
    #[error("Transient network error: {0}")]
    TransientNetwork(String),

    /// Provider throttled us; retry after the hinted delay.
    #[error("Rate limited by WHOOP (retry after {retry_after:?})")]
    RateLimited { retry_after: Duration },

    /// Access token rejected with 401. Triggers one forced refresh.
    #[error("WHOOP access token rejected")]
    AuthExpired,

    /// Refresh token rejected. The user has to reconnect.
    #[error("WHOOP authorization revoked, reconnect needed")]
    ReauthRequired,

    /// Retries exhausted. Callers skip the cycle.
    #[error("WHOOP API unavailable: {0}")]
    ApiUnavailable(String),

    /// Rejected at the configuration boundary; nothing was applied.
    #[error("Invalid configuration: {0}")]
    ConfigInvalid(String),

    #[error("WHOOP is not connected")]
    NotConnected,

    #[error("Authorization code rejected: {0}")]
    AuthorizationCodeRejected(String),

    #[error("Authentication required")]
    Unauthorized,

    #[error("Resource not found: {0}")]
    NotFound(String),

    #[error("Invalid request: {0}")]
    BadRequest(String),

    #[error("Database error: {0}")]
    Database(String),

    #[error("Internal server error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl AppError {
    /// True for failures a retry can fix without user action.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            AppError::TransientNetwork(_) | AppError::RateLimited { .. }
        )
    }

    /// True when the only way forward is a fresh OAuth connect.
    pub fn is_reauth_required(&self) -> bool {
        matches!(self, AppError::ReauthRequired | AppError::NotConnected)
    }
}

/// JSON error response body
#[derive(Serialize)]
struct ErrorResponse {
    error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    details: Option<String>,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, error, details) = match &self {
            AppError::ReauthRequired => (StatusCode::UNAUTHORIZED, "reconnect_required", None),
            AppError::NotConnected => (StatusCode::UNAUTHORIZED, "not_connected", None),
            AppError::Unauthorized => (StatusCode::UNAUTHORIZED, "unauthorized", None),
            AppError::AuthorizationCodeRejected(msg) => (
                StatusCode::BAD_REQUEST,
                "authorization_code_rejected",
                Some(msg.clone()),
            ),
            AppError::ConfigInvalid(msg) => {
                (StatusCode::BAD_REQUEST, "config_invalid", Some(msg.clone()))
            }
            AppError::BadRequest(msg) => {
                (StatusCode::BAD_REQUEST, "bad_request", Some(msg.clone()))
            }
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, "not_found", Some(msg.clone())),
            AppError::TransientNetwork(_)
            | AppError::RateLimited { .. }
            | AppError::AuthExpired
            | AppError::ApiUnavailable(_) => (
                StatusCode::SERVICE_UNAVAILABLE,
                "whoop_unavailable",
                Some(self.to_string()),
            ),
            AppError::Database(msg) => {
                tracing::error!(error = %msg, "Database error");
                (StatusCode::INTERNAL_SERVER_ERROR, "database_error", None)
            }
            AppError::Internal(err) => {
                tracing::error!(error = %err, "Internal server error");
                (StatusCode::INTERNAL_SERVER_ERROR, "internal_error", None)
            }
        };

        let body = ErrorResponse {
            error: error.to_string(),
            details,
        };

        (status, Json(body)).into_response()
    }
}

/// Result type alias for handlers and services
pub type Result<T> = std::result::Result<T, AppError>;
