// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Resilient WHOOP API access.
//!
//! `RateLimitedApiClient::execute` is the only path to the metrics API:
//! - a valid token is ensured before the first attempt
//! - calls pass the local rate ceiling
//! - a 401 gets one forced refresh, then `ReauthRequired`
//! - a 429 waits exactly the hinted delay and retries once
//! - 5xx and network failures back off exponentially with jitter
//! - every attempt is cut off at the overall deadline
//!
//! The hinted 429 wait pushes the deadline back by the same amount.
//!
//! Whatever cannot be resolved ends as `ApiUnavailable` (skip this cycle) or
//! `ReauthRequired` (user must reconnect).

use crate::error::AppError;
use crate::models::UserId;
use crate::services::rate_limit::RateLimiter;
use crate::services::tokens::TokenManager;
use crate::services::whoop::WhoopClient;
use rand::Rng;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

/// A GET against the metrics API.
#[derive(Debug, Clone, PartialEq)]
pub struct ApiRequest {
    pub path: String,
    pub query: Vec<(String, String)>,
}

impl ApiRequest {
    pub fn get(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            query: Vec::new(),
        }
    }

    pub fn with_query(mut self, key: &str, value: impl Into<String>) -> Self {
        self.query.push((key.to_string(), value.into()));
        self
    }
}

/// Backoff for transient failures.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
    /// Fraction of the delay added or removed at random.
    pub jitter: f64,
    /// Budget for the whole call. Attempts are cut off and retries stop here.
    pub deadline: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            base_delay: Duration::from_secs(1),
            jitter: 0.25,
            deadline: Duration::from_secs(30),
        }
    }
}

impl RetryPolicy {
    /// Un-jittered delay after failed attempt `attempt` (1-based).
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(16);
        self.base_delay.saturating_mul(1u32 << exponent)
    }

    fn jittered(&self, delay: Duration) -> Duration {
        if self.jitter <= 0.0 {
            return delay;
        }
        let factor = rand::thread_rng().gen_range((1.0 - self.jitter)..=(1.0 + self.jitter));
        delay.mul_f64(factor)
    }
}

#[derive(Clone)]
pub struct RateLimitedApiClient {
    whoop: WhoopClient,
    tokens: TokenManager,
    limiter: Arc<RateLimiter>,
    policy: RetryPolicy,
}

impl RateLimitedApiClient {
    pub fn new(whoop: WhoopClient, tokens: TokenManager) -> Self {
        Self {
            whoop,
            tokens,
            limiter: Arc::new(RateLimiter::default()),
            policy: RetryPolicy::default(),
        }
    }

    pub fn with_limiter(mut self, limiter: RateLimiter) -> Self {
        self.limiter = Arc::new(limiter);
        self
    }

    pub fn with_retry_policy(mut self, policy: RetryPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn tokens(&self) -> &TokenManager {
        &self.tokens
    }

    /// Execute `request` for `user_id`.
    pub async fn execute(
        &self,
        user_id: UserId,
        request: &ApiRequest,
    ) -> Result<serde_json::Value, AppError> {
        let mut deadline_at = Instant::now() + self.policy.deadline;

        let mut access_token = self
            .tokens
            .ensure_valid_token(user_id)
            .await
            .map_err(unavailable_if_retryable)?;

        let mut failures = 0u32;
        let mut forced_refresh = false;
        let mut rate_limited = false;

        loop {
            self.limiter.acquire().await;

            let remaining = deadline_at.saturating_duration_since(Instant::now());
            let attempt = tokio::time::timeout(
                remaining,
                self.whoop.get(&access_token, &request.path, &request.query),
            )
            .await;

            let err = match attempt {
                Ok(Ok(body)) => return Ok(body),
                Ok(Err(e)) => e,
                Err(_) => {
                    tracing::warn!(
                        user_id,
                        path = %request.path,
                        deadline_secs = self.policy.deadline.as_secs(),
                        "No WHOOP response before the deadline"
                    );
                    return Err(AppError::ApiUnavailable(format!(
                        "No response from {} before the deadline",
                        request.path
                    )));
                }
            };

            match err {
                AppError::AuthExpired if !forced_refresh => {
                    forced_refresh = true;
                    access_token = self
                        .tokens
                        .force_refresh(user_id, &access_token)
                        .await
                        .map_err(unavailable_if_retryable)?;
                }
                AppError::AuthExpired => {
                    tracing::warn!(user_id, path = %request.path, "Token rejected after refresh");
                    return Err(AppError::ReauthRequired);
                }
                AppError::RateLimited { retry_after } if !rate_limited => {
                    rate_limited = true;
                    tracing::warn!(
                        user_id,
                        path = %request.path,
                        retry_after_secs = retry_after.as_secs(),
                        "Rate limited by WHOOP, waiting before retry"
                    );
                    tokio::time::sleep(retry_after).await;
                    deadline_at += retry_after;
                }
                AppError::RateLimited { .. } => {
                    return Err(AppError::ApiUnavailable(
                        "Still rate limited after waiting".to_string(),
                    ));
                }
                AppError::TransientNetwork(msg) => {
                    failures += 1;
                    if failures >= self.policy.max_attempts {
                        tracing::warn!(user_id, attempts = failures, error = %msg, "Retries exhausted");
                        return Err(AppError::ApiUnavailable(msg));
                    }

                    let delay = self.policy.jittered(self.policy.delay_for(failures));
                    if Instant::now() + delay > deadline_at {
                        tracing::warn!(user_id, attempts = failures, error = %msg, "Retry deadline reached");
                        return Err(AppError::ApiUnavailable(msg));
                    }

                    tracing::warn!(
                        user_id,
                        attempt = failures,
                        delay_ms = delay.as_millis() as u64,
                        error = %msg,
                        "Transient WHOOP failure, backing off"
                    );
                    tokio::time::sleep(delay).await;
                }
                other => return Err(other),
            }
        }
    }
}

fn unavailable_if_retryable(err: AppError) -> AppError {
    if err.is_retryable() {
        AppError::ApiUnavailable(err.to_string())
    } else {
        err
    }
}
