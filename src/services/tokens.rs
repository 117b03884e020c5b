// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! WHOOP token lifecycle.
//!
//! `TokenManager` is the only writer of `OAuthToken`. Every request path
//! calls `ensure_valid_token` first; refreshes for one user are serialized
//! behind a per-user lock so concurrent callers share a single refresh.

use crate::db::Store;
use crate::error::AppError;
use crate::models::{OAuthToken, UserId};
use crate::services::whoop::{TokenGrant, WhoopClient};
use chrono::{Duration, Utc};
use dashmap::DashMap;
use std::sync::Arc;
use tokio::sync::Mutex;

/// Margin before token expiration when we proactively refresh (5 minutes).
pub const TOKEN_REFRESH_MARGIN_SECS: i64 = 5 * 60;

/// Upper bound on one refresh call. Refreshes are never cancelled midway.
pub const REFRESH_TIMEOUT: std::time::Duration = std::time::Duration::from_secs(30);

/// Decrypted tokens, shared by all clones of the manager.
pub type TokenCache = Arc<DashMap<UserId, OAuthToken>>;

/// Per-user mutex serializing token mutation.
pub type RefreshLocks = Arc<DashMap<UserId, Arc<Mutex<()>>>>;

#[derive(Clone)]
pub struct TokenManager {
    client: WhoopClient,
    store: Arc<dyn Store>,
    token_cache: TokenCache,
    refresh_locks: RefreshLocks,
}

impl TokenManager {
    pub fn new(client: WhoopClient, store: Arc<dyn Store>) -> Self {
        Self {
            client,
            store,
            token_cache: Arc::new(DashMap::new()),
            refresh_locks: Arc::new(DashMap::new()),
        }
    }

    fn margin() -> Duration {
        Duration::seconds(TOKEN_REFRESH_MARGIN_SECS)
    }

    fn lock_for(&self, user_id: UserId) -> Arc<Mutex<()>> {
        self.refresh_locks
            .entry(user_id)
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    /// Cached token that is still outside the refresh margin.
    fn fresh_cached(&self, user_id: UserId) -> Option<String> {
        let cached = self.token_cache.get(&user_id)?;
        if cached.expires_within(Utc::now(), Self::margin()) {
            return None;
        }
        Some(cached.access_token.clone())
    }

    /// Return an access token that is good for at least the refresh margin,
    /// refreshing first if needed.
    ///
    /// Without a refresh token the current access token is returned even when
    /// stale; the provider decides whether it still works.
    pub async fn ensure_valid_token(&self, user_id: UserId) -> Result<String, AppError> {
        if let Some(token) = self.fresh_cached(user_id) {
            return Ok(token);
        }

        let lock = self.lock_for(user_id);
        let _guard = lock.lock().await;

        // Another caller may have refreshed while we waited.
        if let Some(token) = self.fresh_cached(user_id) {
            return Ok(token);
        }

        let current = self.load(user_id).await?;
        if !current.expires_within(Utc::now(), Self::margin()) {
            return Ok(current.access_token);
        }

        if current.usable_refresh_token().is_none() {
            tracing::warn!(
                user_id,
                "Access token near expiry and no refresh token, reusing it"
            );
            return Ok(current.access_token);
        }

        tracing::info!(user_id, "Access token expiring, refreshing");
        self.refresh_locked(user_id, current).await
    }

    /// Refresh after the provider rejected `rejected_access_token` with 401.
    ///
    /// If the stored token already differs from the rejected one, somebody
    /// else refreshed in the meantime and their token is returned.
    pub async fn force_refresh(
        &self,
        user_id: UserId,
        rejected_access_token: &str,
    ) -> Result<String, AppError> {
        let lock = self.lock_for(user_id);
        let _guard = lock.lock().await;

        let current = match self.token_cache.get(&user_id) {
            Some(cached) => cached.clone(),
            None => self.load(user_id).await?,
        };

        if current.access_token != rejected_access_token {
            return Ok(current.access_token);
        }

        if current.usable_refresh_token().is_none() {
            tracing::warn!(user_id, "Access token rejected and no refresh token available");
            self.token_cache.remove(&user_id);
            return Err(AppError::ReauthRequired);
        }

        tracing::info!(user_id, "Access token rejected, forcing refresh");
        self.refresh_locked(user_id, current).await
    }

    /// Persist the result of a successful authorization-code exchange.
    pub async fn store_grant(
        &self,
        user_id: UserId,
        grant: TokenGrant,
    ) -> Result<OAuthToken, AppError> {
        let lock = self.lock_for(user_id);
        let _guard = lock.lock().await;

        let refresh_token = grant.refresh_token.filter(|rt| !rt.is_empty());
        if refresh_token.is_none() {
            tracing::warn!(
                user_id,
                "No refresh token granted, was the offline scope approved?"
            );
        }

        let token = OAuthToken::issued(grant.access_token, refresh_token, grant.expires_in, Utc::now());
        self.store.put_token(user_id, &token).await?;
        self.token_cache.insert(user_id, token.clone());

        tracing::info!(user_id, expires_at = %token.expires_at, "WHOOP tokens stored");
        Ok(token)
    }

    /// True if a token pair is on file for `user_id`.
    pub async fn is_connected(&self, user_id: UserId) -> Result<bool, AppError> {
        if self.token_cache.contains_key(&user_id) {
            return Ok(true);
        }
        Ok(self.store.get_token(user_id).await?.is_some())
    }

    async fn load(&self, user_id: UserId) -> Result<OAuthToken, AppError> {
        let token = self
            .store
            .get_token(user_id)
            .await?
            .ok_or(AppError::NotConnected)?;
        self.token_cache.insert(user_id, token.clone());
        Ok(token)
    }

    /// Redeem the refresh token. Caller holds the user's lock.
    async fn refresh_locked(
        &self,
        user_id: UserId,
        current: OAuthToken,
    ) -> Result<String, AppError> {
        let refresh_token = current
            .usable_refresh_token()
            .ok_or(AppError::ReauthRequired)?
            .to_string();

        let result = tokio::time::timeout(REFRESH_TIMEOUT, self.client.refresh_token(&refresh_token)).await;

        let grant = match result {
            Err(_) => {
                tracing::warn!(user_id, "Token refresh timed out");
                return Err(AppError::TransientNetwork(
                    "Token refresh timed out".to_string(),
                ));
            }
            Ok(Ok(grant)) => grant,
            Ok(Err(AppError::ReauthRequired)) => {
                return self.adopt_stored_or_reauth(user_id, &current).await;
            }
            Ok(Err(e)) => return Err(e),
        };

        // WHOOP may omit the refresh token on refresh; keep the old one then.
        let refresh_token = grant
            .refresh_token
            .filter(|rt| !rt.is_empty())
            .or(current.refresh_token);

        let token = OAuthToken::issued(grant.access_token, refresh_token, grant.expires_in, Utc::now());
        self.store.put_token(user_id, &token).await?;
        self.token_cache.insert(user_id, token.clone());

        tracing::info!(user_id, expires_at = %token.expires_at, "Token refreshed and cached");
        Ok(token.access_token)
    }

    /// The refresh token was rejected. If another process already rotated
    /// the pair, use theirs; otherwise the user has to reconnect.
    async fn adopt_stored_or_reauth(
        &self,
        user_id: UserId,
        rejected: &OAuthToken,
    ) -> Result<String, AppError> {
        match self.store.get_token(user_id).await? {
            Some(stored) if stored.refresh_token != rejected.refresh_token => {
                tracing::info!(
                    user_id,
                    "Refresh token race detected, adopting stored tokens"
                );
                self.token_cache.insert(user_id, stored.clone());
                Ok(stored.access_token)
            }
            _ => {
                tracing::warn!(user_id, "Refresh token rejected, reconnect required");
                self.token_cache.remove(&user_id);
                Err(AppError::ReauthRequired)
            }
        }
    }
}
