// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Token refresh against a mock WHOOP token endpoint.

use std::sync::Arc;
use whoop_sentinel::config::Config;
use whoop_sentinel::db::{MemoryDb, Store};
use whoop_sentinel::error::AppError;
use whoop_sentinel::services::{TokenManager, WhoopClient};
use wiremock::matchers::{body_string_contains, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

mod common;
use common::{seed_token, token_body, OWNER};

const TOKEN_PATH: &str = "/oauth/oauth2/token";

fn manager(server: &MockServer, store: Arc<dyn Store>) -> TokenManager {
    let config = Config::test_default().with_whoop_base_url(&server.uri());
    TokenManager::new(WhoopClient::new(config.whoop), store)
}

#[tokio::test]
async fn test_fresh_token_makes_no_network_call() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(TOKEN_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_json(token_body("x", Some("y"), 3600)))
        .expect(0)
        .mount(&server)
        .await;

    let store: Arc<dyn Store> = Arc::new(MemoryDb::new());
    seed_token(store.as_ref(), OWNER, "access-1", Some("refresh-1"), 3600).await;
    let tokens = manager(&server, store);

    for _ in 0..3 {
        assert_eq!(tokens.ensure_valid_token(OWNER).await.unwrap(), "access-1");
    }
}

#[tokio::test]
async fn test_expiring_token_is_refreshed_and_persisted() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(TOKEN_PATH))
        .and(body_string_contains("grant_type=refresh_token"))
        .and(body_string_contains("refresh_token=refresh-1"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(token_body("access-2", Some("refresh-2"), 3600)),
        )
        .expect(1)
        .mount(&server)
        .await;

    let store: Arc<dyn Store> = Arc::new(MemoryDb::new());
    // Inside the five minute margin.
    seed_token(store.as_ref(), OWNER, "access-1", Some("refresh-1"), 120).await;
    let tokens = manager(&server, store.clone());

    assert_eq!(tokens.ensure_valid_token(OWNER).await.unwrap(), "access-2");

    let stored = store.get_token(OWNER).await.unwrap().unwrap();
    assert_eq!(stored.access_token, "access-2");
    assert_eq!(stored.refresh_token.as_deref(), Some("refresh-2"));
    assert!(stored.expires_at > chrono::Utc::now() + chrono::Duration::minutes(50));

    // Now fresh: served from cache.
    assert_eq!(tokens.ensure_valid_token(OWNER).await.unwrap(), "access-2");
}

#[tokio::test]
async fn test_concurrent_callers_share_one_refresh() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(TOKEN_PATH))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(token_body("access-2", Some("refresh-2"), 3600))
                .set_delay(std::time::Duration::from_millis(200)),
        )
        .expect(1)
        .mount(&server)
        .await;

    let store: Arc<dyn Store> = Arc::new(MemoryDb::new());
    seed_token(store.as_ref(), OWNER, "access-1", Some("refresh-1"), 0).await;
    let tokens = manager(&server, store);

    let calls = (0..10).map(|_| {
        let tokens = tokens.clone();
        async move { tokens.ensure_valid_token(OWNER).await }
    });
    let results = futures_util::future::join_all(calls).await;

    for result in results {
        assert_eq!(result.unwrap(), "access-2");
    }
}

#[tokio::test]
async fn test_refresh_without_new_refresh_token_keeps_old_one() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(TOKEN_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_json(token_body("access-2", None, 3600)))
        .expect(1)
        .mount(&server)
        .await;

    let store: Arc<dyn Store> = Arc::new(MemoryDb::new());
    seed_token(store.as_ref(), OWNER, "access-1", Some("refresh-1"), 10).await;
    let tokens = manager(&server, store.clone());

    assert_eq!(tokens.ensure_valid_token(OWNER).await.unwrap(), "access-2");
    let stored = store.get_token(OWNER).await.unwrap().unwrap();
    assert_eq!(stored.refresh_token.as_deref(), Some("refresh-1"));
}

#[tokio::test]
async fn test_stale_token_without_refresh_token_is_returned_as_is() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(TOKEN_PATH))
        .respond_with(ResponseTemplate::new(500))
        .expect(0)
        .mount(&server)
        .await;

    let store: Arc<dyn Store> = Arc::new(MemoryDb::new());
    seed_token(store.as_ref(), OWNER, "access-1", None, -60).await;
    let tokens = manager(&server, store);

    assert_eq!(tokens.ensure_valid_token(OWNER).await.unwrap(), "access-1");
}

#[tokio::test]
async fn test_rejected_refresh_token_requires_reauth() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(TOKEN_PATH))
        .respond_with(
            ResponseTemplate::new(400).set_body_json(serde_json::json!({"error": "invalid_grant"})),
        )
        .expect(1)
        .mount(&server)
        .await;

    let store: Arc<dyn Store> = Arc::new(MemoryDb::new());
    seed_token(store.as_ref(), OWNER, "access-1", Some("refresh-1"), 0).await;
    let tokens = manager(&server, store);

    let err = tokens.ensure_valid_token(OWNER).await.unwrap_err();
    assert!(matches!(err, AppError::ReauthRequired), "got {:?}", err);
}

#[tokio::test]
async fn test_refresh_server_error_is_transient() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(TOKEN_PATH))
        .respond_with(ResponseTemplate::new(503))
        .mount(&server)
        .await;

    let store: Arc<dyn Store> = Arc::new(MemoryDb::new());
    seed_token(store.as_ref(), OWNER, "access-1", Some("refresh-1"), 0).await;
    let tokens = manager(&server, store.clone());

    let err = tokens.ensure_valid_token(OWNER).await.unwrap_err();
    assert!(err.is_retryable(), "got {:?}", err);

    // The stored pair is untouched.
    let stored = store.get_token(OWNER).await.unwrap().unwrap();
    assert_eq!(stored.access_token, "access-1");
    assert_eq!(stored.refresh_token.as_deref(), Some("refresh-1"));
}

#[tokio::test]
async fn test_not_connected_without_stored_token() {
    let server = MockServer::start().await;
    let tokens = manager(&server, Arc::new(MemoryDb::new()));

    let err = tokens.ensure_valid_token(OWNER).await.unwrap_err();
    assert!(matches!(err, AppError::NotConnected));
    assert!(!tokens.is_connected(OWNER).await.unwrap());
}

#[tokio::test]
async fn test_lost_refresh_race_adopts_stored_pair() {
    let server = MockServer::start().await;
    // The first redemption of refresh-1 wins, any later one is refused.
    Mock::given(method("POST"))
        .and(path(TOKEN_PATH))
        .and(body_string_contains("refresh_token=refresh-1"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(token_body("access-2", Some("refresh-2"), 3600)),
        )
        .up_to_n_times(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path(TOKEN_PATH))
        .and(body_string_contains("refresh_token=refresh-1"))
        .respond_with(
            ResponseTemplate::new(400).set_body_json(serde_json::json!({"error": "invalid_grant"})),
        )
        .mount(&server)
        .await;

    let store: Arc<dyn Store> = Arc::new(MemoryDb::new());
    seed_token(store.as_ref(), OWNER, "access-1", Some("refresh-1"), 3600).await;

    // Two processes sharing one store.
    let winner = manager(&server, store.clone());
    let loser = manager(&server, store.clone());

    // The loser caches access-1 before the winner rotates the pair.
    assert_eq!(loser.ensure_valid_token(OWNER).await.unwrap(), "access-1");
    assert_eq!(winner.force_refresh(OWNER, "access-1").await.unwrap(), "access-2");

    assert_eq!(loser.force_refresh(OWNER, "access-1").await.unwrap(), "access-2");
    assert_eq!(loser.ensure_valid_token(OWNER).await.unwrap(), "access-2");
}

#[tokio::test]
async fn test_force_refresh_returns_newer_token_without_network() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(TOKEN_PATH))
        .respond_with(ResponseTemplate::new(500))
        .expect(0)
        .mount(&server)
        .await;

    let store: Arc<dyn Store> = Arc::new(MemoryDb::new());
    seed_token(store.as_ref(), OWNER, "access-2", Some("refresh-2"), 3600).await;
    let tokens = manager(&server, store);

    // access-1 was rejected, but access-2 is already on file.
    assert_eq!(tokens.force_refresh(OWNER, "access-1").await.unwrap(), "access-2");
}

#[tokio::test]
async fn test_force_refresh_without_refresh_token_requires_reauth() {
    let server = MockServer::start().await;
    let store: Arc<dyn Store> = Arc::new(MemoryDb::new());
    seed_token(store.as_ref(), OWNER, "access-1", None, 3600).await;
    let tokens = manager(&server, store);

    let err = tokens.force_refresh(OWNER, "access-1").await.unwrap_err();
    assert!(matches!(err, AppError::ReauthRequired));
}
