// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! WHOOP HTTP client.
//!
//! Single requests only: no retries, no token management. Every failure is
//! mapped onto the `AppError` taxonomy so the layers above can decide what
//! to retry.

use crate::config::WhoopConfig;
use crate::error::AppError;
use reqwest::header::{HeaderMap, RETRY_AFTER};
use reqwest::StatusCode;
use serde::Deserialize;
use std::time::Duration;

/// Delay assumed when a 429 carries no usable `Retry-After`.
pub const DEFAULT_RETRY_AFTER: Duration = Duration::from_secs(60);

/// Upper bound on any single WHOOP request, connect included.
pub const HTTP_TIMEOUT: Duration = Duration::from_secs(20);

/// Token endpoint response.
#[derive(Debug, Clone, Deserialize)]
pub struct TokenGrant {
    pub access_token: String,
    pub expires_in: i64,
    #[serde(default)]
    pub refresh_token: Option<String>,
}

/// WHOOP API client.
#[derive(Clone)]
pub struct WhoopClient {
    http: reqwest::Client,
    config: WhoopConfig,
}

impl WhoopClient {
    pub fn new(config: WhoopConfig) -> Self {
        let http = reqwest::Client::builder()
            .timeout(HTTP_TIMEOUT)
            .connect_timeout(Duration::from_secs(10))
            .build()
            .unwrap_or_else(|e| {
                tracing::error!(error = %e, "Failed building WHOOP HTTP client, using defaults");
                reqwest::Client::new()
            });
        Self { http, config }
    }

    /// Browser URL that starts the authorization-code grant.
    pub fn authorization_url(&self, state: &str) -> String {
        format!(
            "{}?client_id={}&redirect_uri={}&response_type=code&scope={}&state={}",
            self.config.oauth_url,
            urlencoding::encode(&self.config.client_id),
            urlencoding::encode(&self.config.redirect_uri),
            urlencoding::encode(&self.config.scopes.join(" ")),
            urlencoding::encode(state),
        )
    }

    /// Exchange an authorization code for a token pair.
    pub async fn exchange_code(&self, code: &str) -> Result<TokenGrant, AppError> {
        let response = self
            .http
            .post(&self.config.token_url)
            .form(&[
                ("client_id", self.config.client_id.as_str()),
                ("client_secret", self.config.client_secret.as_str()),
                ("code", code),
                ("redirect_uri", self.config.redirect_uri.as_str()),
                ("grant_type", "authorization_code"),
            ])
            .send()
            .await
            .map_err(|e| AppError::TransientNetwork(format!("Token exchange failed: {}", e)))?;

        let status = response.status();
        if status.is_client_error() {
            let body = response.text().await.unwrap_or_default();
            tracing::warn!(status = %status, body = %body, "WHOOP rejected authorization code");
            return Err(AppError::AuthorizationCodeRejected(format!(
                "HTTP {}",
                status.as_u16()
            )));
        }

        parse_json(check_status(response).await?).await
    }

    /// Redeem a refresh token.
    ///
    /// A 400/401 here means the refresh token itself is dead and surfaces as
    /// `ReauthRequired`.
    pub async fn refresh_token(&self, refresh_token: &str) -> Result<TokenGrant, AppError> {
        let response = self
            .http
            .post(&self.config.token_url)
            .form(&[
                ("client_id", self.config.client_id.as_str()),
                ("client_secret", self.config.client_secret.as_str()),
                ("refresh_token", refresh_token),
                ("grant_type", "refresh_token"),
                ("scope", "offline"),
            ])
            .send()
            .await
            .map_err(|e| AppError::TransientNetwork(format!("Token refresh failed: {}", e)))?;

        let status = response.status();
        if status == StatusCode::BAD_REQUEST || status == StatusCode::UNAUTHORIZED {
            let body = response.text().await.unwrap_or_default();
            tracing::warn!(status = %status, body = %body, "WHOOP rejected refresh token");
            return Err(AppError::ReauthRequired);
        }

        parse_json(check_status(response).await?).await
    }

    /// GET `{api_url}{path}` with a bearer token.
    pub async fn get(
        &self,
        access_token: &str,
        path: &str,
        query: &[(String, String)],
    ) -> Result<serde_json::Value, AppError> {
        let url = format!("{}{}", self.config.api_url, path);

        let response = self
            .http
            .get(&url)
            .bearer_auth(access_token)
            .query(query)
            .send()
            .await
            .map_err(|e| AppError::TransientNetwork(e.to_string()))?;

        parse_json(check_status(response).await?).await
    }
}

/// Map non-success statuses onto the error taxonomy.
async fn check_status(response: reqwest::Response) -> Result<reqwest::Response, AppError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    if status == StatusCode::TOO_MANY_REQUESTS {
        let retry_after = parse_retry_after(response.headers());
        tracing::warn!(
            retry_after_secs = retry_after.as_secs(),
            "WHOOP rate limit hit (429)"
        );
        return Err(AppError::RateLimited { retry_after });
    }

    if status == StatusCode::UNAUTHORIZED {
        return Err(AppError::AuthExpired);
    }

    let body = response.text().await.unwrap_or_default();
    if status.is_server_error() {
        return Err(AppError::TransientNetwork(format!("HTTP {}: {}", status, body)));
    }

    Err(AppError::ApiUnavailable(format!("HTTP {}: {}", status, body)))
}

async fn parse_json<T: for<'de> Deserialize<'de>>(
    response: reqwest::Response,
) -> Result<T, AppError> {
    response
        .json()
        .await
        .map_err(|e| AppError::ApiUnavailable(format!("JSON parse error: {}", e)))
}

/// `Retry-After` in seconds, or the default when absent or unparsable.
pub fn parse_retry_after(headers: &HeaderMap) -> Duration {
    headers
        .get(RETRY_AFTER)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.trim().parse::<u64>().ok())
        .map(Duration::from_secs)
        .unwrap_or(DEFAULT_RETRY_AFTER)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use reqwest::header::HeaderValue;

    #[test]
    fn test_parse_retry_after() {
        let mut headers = HeaderMap::new();
        assert_eq!(parse_retry_after(&headers), DEFAULT_RETRY_AFTER);

        headers.insert(RETRY_AFTER, HeaderValue::from_static("30"));
        assert_eq!(parse_retry_after(&headers), Duration::from_secs(30));

        headers.insert(
            RETRY_AFTER,
            HeaderValue::from_static("Wed, 21 Oct 2015 07:28:00 GMT"),
        );
        assert_eq!(parse_retry_after(&headers), DEFAULT_RETRY_AFTER);
    }

    #[test]
    fn test_authorization_url_encodes_scopes_and_state() {
        let client = WhoopClient::new(Config::test_default().whoop);
        let url = client.authorization_url("abc=");

        assert!(url.starts_with("https://api.prod.whoop.com/oauth/oauth2/auth?"));
        assert!(url.contains("response_type=code"));
        assert!(url.contains("scope=read%3Arecovery%20read%3Acycles"));
        assert!(url.contains("offline"));
        assert!(url.contains("state=abc%3D"));
        assert!(url.contains("redirect_uri=http%3A%2F%2Flocalhost%3A8080%2Fauth%2Fwhoop%2Fcallback"));
    }
}
