// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! WHOOP OAuth redirect target.

use axum::{
    extract::{Query, State},
    response::Html,
    routing::get,
    Router,
};
use serde::Deserialize;
use std::sync::Arc;

use crate::error::{AppError, Result};
use crate::AppState;

pub fn routes() -> Router<Arc<AppState>> {
    Router::new().route("/auth/whoop/callback", get(auth_callback))
}

#[derive(Deserialize)]
pub struct CallbackParams {
    #[serde(default)]
    code: Option<String>,
    #[serde(default)]
    state: Option<String>,
    #[serde(default)]
    error: Option<String>,
}

/// OAuth callback - exchange the code and store the tokens.
async fn auth_callback(
    State(state): State<Arc<AppState>>,
    Query(params): Query<CallbackParams>,
) -> Result<Html<&'static str>> {
    if let Some(error) = params.error {
        tracing::warn!(error = %error, "OAuth error from WHOOP");
        return Err(AppError::BadRequest(format!("WHOOP authorization failed: {}", error)));
    }

    let (Some(code), Some(oauth_state)) = (params.code, params.state) else {
        return Err(AppError::BadRequest(
            "Missing code or state parameter".to_string(),
        ));
    };

    let user_id = state
        .commands
        .complete_callback(&code, &oauth_state)
        .await?;

    tracing::info!(user_id, "OAuth successful, tokens stored");

    Ok(Html(
        "<!doctype html><title>WHOOP connected</title>\
         <p>WHOOP connected. You can close this window.</p>",
    ))
}
