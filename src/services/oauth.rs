// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! WHOOP authorization-code flow.
//!
//! `connect` opens a pending session and hands out an authorization URL.
//! The code comes back either through the browser callback (signed `state`)
//! or pasted by the user. Codes are single-use: a code is burned on its
//! first attempt, and a failed exchange closes the pending session.

use crate::error::AppError;
use crate::models::UserId;
use crate::services::tokens::TokenManager;
use crate::services::whoop::WhoopClient;
use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use chrono::{DateTime, Duration, Utc};
use dashmap::DashMap;
use hmac::{Hmac, Mac};
use sha2::Sha256;
use std::sync::Arc;

type HmacSha256 = Hmac<Sha256>;

/// How long an authorization link (and its `state`) stays valid.
pub const STATE_MAX_AGE_SECS: i64 = 10 * 60;

#[derive(Clone)]
pub struct OAuthFlow {
    client: WhoopClient,
    tokens: TokenManager,
    state_key: Arc<Vec<u8>>,
    /// Pending connect sessions, by start time.
    pending: Arc<DashMap<UserId, DateTime<Utc>>>,
    /// Codes already attempted, by first use.
    used_codes: Arc<DashMap<String, DateTime<Utc>>>,
}

impl OAuthFlow {
    pub fn new(client: WhoopClient, tokens: TokenManager, state_key: Vec<u8>) -> Self {
        Self {
            client,
            tokens,
            state_key: Arc::new(state_key),
            pending: Arc::new(DashMap::new()),
            used_codes: Arc::new(DashMap::new()),
        }
    }

    /// Begin a connect: returns the URL the user must open.
    pub fn connect(&self, user_id: UserId) -> Result<String, AppError> {
        let now = Utc::now();
        let state = sign_state(user_id, now, &self.state_key)?;
        self.pending.insert(user_id, now);

        tracing::info!(user_id, "Starting WHOOP OAuth flow");
        Ok(self.client.authorization_url(&state))
    }

    /// Complete the flow from the browser redirect.
    pub async fn complete_callback(&self, code: &str, state: &str) -> Result<UserId, AppError> {
        let user_id = verify_state(state, &self.state_key, Utc::now()).ok_or_else(|| {
            AppError::BadRequest("Invalid or expired OAuth state".to_string())
        })?;

        self.submit_code(user_id, code).await?;
        Ok(user_id)
    }

    /// Complete the flow with a code the user pasted (bare or as a URL).
    pub async fn submit_code(&self, user_id: UserId, raw: &str) -> Result<(), AppError> {
        let code = clean_code(raw);
        if code.is_empty() {
            return Err(AppError::BadRequest("Authorization code is empty".to_string()));
        }

        let now = Utc::now();
        self.prune(now);

        let started = self.pending.get(&user_id).map(|at| *at).ok_or_else(|| {
            AppError::AuthorizationCodeRejected(
                "No connect in progress, request a new authorization link".to_string(),
            )
        })?;
        if now - started > Duration::seconds(STATE_MAX_AGE_SECS) {
            self.pending.remove(&user_id);
            return Err(AppError::AuthorizationCodeRejected(
                "Authorization link expired, request a new one".to_string(),
            ));
        }

        if self.used_codes.insert(code.clone(), now).is_some() {
            tracing::warn!(user_id, "Authorization code reused");
            return Err(AppError::AuthorizationCodeRejected(
                "Code already used, request a new authorization link".to_string(),
            ));
        }

        let grant = match self.client.exchange_code(&code).await {
            Ok(grant) => grant,
            Err(e) => {
                self.pending.remove(&user_id);
                tracing::warn!(user_id, error = %e, "Authorization code exchange failed");
                return Err(e);
            }
        };

        self.pending.remove(&user_id);
        self.tokens.store_grant(user_id, grant).await?;

        tracing::info!(user_id, "WHOOP connected");
        Ok(())
    }

    fn prune(&self, now: DateTime<Utc>) {
        let max_age = Duration::seconds(STATE_MAX_AGE_SECS);
        self.used_codes.retain(|_, at| now - *at <= max_age);
    }
}

/// Extract the authorization code from whatever the user pasted.
///
/// Accepts a bare code, a code with trailing `&...`/`?...` junk, or a full
/// redirect URL carrying `code=`.
pub fn clean_code(raw: &str) -> String {
    let raw = raw.trim();
    let candidate = match raw.find("code=") {
        Some(pos) => &raw[pos + "code=".len()..],
        None => raw,
    };

    let code = candidate
        .split(['&', '?', '#'])
        .next()
        .unwrap_or_default()
        .trim();

    urlencoding::decode(code)
        .map(|c| c.into_owned())
        .unwrap_or_else(|_| code.to_string())
}

/// Build `base64url("user_id|timestamp_hex|signature_hex")`.
pub fn sign_state(user_id: UserId, now: DateTime<Utc>, secret: &[u8]) -> Result<String, AppError> {
    let payload = format!("{}|{:x}", user_id, now.timestamp_millis());

    let mut mac = HmacSha256::new_from_slice(secret)
        .map_err(|e| AppError::Internal(anyhow::anyhow!("HMAC init failed: {}", e)))?;
    mac.update(payload.as_bytes());
    let signature = hex::encode(mac.finalize().into_bytes());

    Ok(URL_SAFE_NO_PAD.encode(format!("{}|{}", payload, signature)))
}

/// Verify a signed state and return its user id.
pub fn verify_state(state: &str, secret: &[u8], now: DateTime<Utc>) -> Option<UserId> {
    let bytes = URL_SAFE_NO_PAD.decode(state).ok()?;
    let state_str = String::from_utf8(bytes).ok()?;

    let parts: Vec<&str> = state_str.splitn(3, '|').collect();
    let [user_part, timestamp_hex, signature_hex] = parts.as_slice() else {
        return None;
    };

    let payload = format!("{}|{}", user_part, timestamp_hex);
    let signature = hex::decode(signature_hex).ok()?;

    let mut mac = HmacSha256::new_from_slice(secret).ok()?;
    mac.update(payload.as_bytes());
    if mac.verify_slice(&signature).is_err() {
        tracing::error!("OAuth state signature mismatch! Potential tampering.");
        return None;
    }

    let issued_ms = i64::from_str_radix(timestamp_hex, 16).ok()?;
    let issued = DateTime::<Utc>::from_timestamp_millis(issued_ms)?;
    if now - issued > Duration::seconds(STATE_MAX_AGE_SECS) || issued > now + Duration::minutes(1) {
        tracing::warn!("OAuth state expired");
        return None;
    }

    user_part.parse().ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    const SECRET: &[u8] = b"secret_key";

    #[test]
    fn test_state_round_trip() {
        let now = Utc::now();
        let state = sign_state(42, now, SECRET).unwrap();
        assert_eq!(verify_state(&state, SECRET, now), Some(42));
    }

    #[test]
    fn test_state_wrong_secret() {
        let now = Utc::now();
        let state = sign_state(42, now, SECRET).unwrap();
        assert_eq!(verify_state(&state, b"wrong_key", now), None);
    }

    #[test]
    fn test_state_expired() {
        let now = Utc::now();
        let state = sign_state(42, now, SECRET).unwrap();
        assert_eq!(verify_state(&state, SECRET, now + Duration::minutes(11)), None);
        assert_eq!(verify_state(&state, SECRET, now + Duration::minutes(9)), Some(42));
    }

    #[test]
    fn test_state_tampered_user() {
        let now = Utc::now();
        let state = sign_state(42, now, SECRET).unwrap();
        let decoded = String::from_utf8(URL_SAFE_NO_PAD.decode(&state).unwrap()).unwrap();
        let forged = URL_SAFE_NO_PAD.encode(decoded.replacen("42|", "43|", 1));
        assert_eq!(verify_state(&forged, SECRET, now), None);
    }

    #[test]
    fn test_state_malformed() {
        let encoded = URL_SAFE_NO_PAD.encode("invalid|format");
        assert_eq!(verify_state(&encoded, SECRET, Utc::now()), None);
        assert_eq!(verify_state("***", SECRET, Utc::now()), None);
    }

    #[test]
    fn test_clean_code() {
        assert_eq!(clean_code("  abc123  "), "abc123");
        assert_eq!(clean_code("abc123&scope=read"), "abc123");
        assert_eq!(clean_code("abc123?x=1"), "abc123");
        assert_eq!(
            clean_code("http://localhost:8080/auth/whoop/callback?code=abc123&scope=offline&state=xyz"),
            "abc123"
        );
        assert_eq!(clean_code(""), "");
    }
}
