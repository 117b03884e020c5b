// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Authorization-code flow against a mock WHOOP token endpoint.

use axum::{
    body::Body,
    http::{Request, StatusCode},
};
use chrono::{Duration, Utc};
use tower::ServiceExt;
use whoop_sentinel::config::Config;
use whoop_sentinel::db::Store;
use whoop_sentinel::error::AppError;
use whoop_sentinel::services::oauth::sign_state;
use wiremock::matchers::{body_string_contains, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

mod common;
use common::{create_test_app_with, token_body, OWNER};

const TOKEN_PATH: &str = "/oauth/oauth2/token";

fn config_for(server: &MockServer) -> Config {
    Config::test_default().with_whoop_base_url(&server.uri())
}

fn state_param(authorization_url: &str) -> String {
    authorization_url
        .split("state=")
        .nth(1)
        .expect("URL carries a state")
        .to_string()
}

async fn mount_exchange(server: &MockServer, code: &str, expected_calls: u64) {
    Mock::given(method("POST"))
        .and(path(TOKEN_PATH))
        .and(body_string_contains("grant_type=authorization_code"))
        .and(body_string_contains(format!("code={}", code)))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(token_body("access-1", Some("refresh-1"), 3600)),
        )
        .expect(expected_calls)
        .mount(server)
        .await;
}

#[tokio::test]
async fn test_pasted_redirect_url_connects() {
    let server = MockServer::start().await;
    mount_exchange(&server, "abc123", 1).await;
    let (_, state) = create_test_app_with(config_for(&server));

    state.commands.connect().unwrap();
    state
        .commands
        .submit_code("http://localhost:8080/auth/whoop/callback?code=abc123&scope=offline&state=x")
        .await
        .unwrap();

    let token = state.store.get_token(OWNER).await.unwrap().unwrap();
    assert_eq!(token.access_token, "access-1");
    assert_eq!(token.refresh_token.as_deref(), Some("refresh-1"));
    assert!(token.expires_at > Utc::now() + Duration::minutes(55));
}

#[tokio::test]
async fn test_reused_code_is_rejected_without_exchange() {
    let server = MockServer::start().await;
    mount_exchange(&server, "abc123", 1).await;
    let (_, state) = create_test_app_with(config_for(&server));

    state.commands.connect().unwrap();
    state.commands.submit_code("abc123").await.unwrap();

    state.commands.connect().unwrap();
    let err = state.commands.submit_code("abc123").await.unwrap_err();
    assert!(matches!(err, AppError::AuthorizationCodeRejected(_)), "got {:?}", err);
}

#[tokio::test]
async fn test_failed_exchange_consumes_the_session() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(TOKEN_PATH))
        .respond_with(
            ResponseTemplate::new(400).set_body_json(serde_json::json!({"error": "invalid_grant"})),
        )
        .expect(1)
        .mount(&server)
        .await;
    let (_, state) = create_test_app_with(config_for(&server));

    state.commands.connect().unwrap();
    let err = state.commands.submit_code("stale-code").await.unwrap_err();
    assert!(matches!(err, AppError::AuthorizationCodeRejected(_)), "got {:?}", err);

    // A second code needs a fresh link.
    let err = state.commands.submit_code("other-code").await.unwrap_err();
    assert!(matches!(err, AppError::AuthorizationCodeRejected(_)), "got {:?}", err);
    assert!(state.store.get_token(OWNER).await.unwrap().is_none());
}

#[tokio::test]
async fn test_empty_code_is_bad_request() {
    let server = MockServer::start().await;
    let (_, state) = create_test_app_with(config_for(&server));

    state.commands.connect().unwrap();
    let err = state.commands.submit_code("   ").await.unwrap_err();
    assert!(matches!(err, AppError::BadRequest(_)));
}

#[tokio::test]
async fn test_browser_callback_connects() {
    let server = MockServer::start().await;
    mount_exchange(&server, "cb-code", 1).await;
    let (app, state) = create_test_app_with(config_for(&server));

    let url = state.commands.connect().unwrap();
    let uri = format!(
        "/auth/whoop/callback?code=cb-code&state={}",
        state_param(&url)
    );

    let response = app
        .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert!(state.store.get_token(OWNER).await.unwrap().is_some());
}

#[tokio::test]
async fn test_callback_with_expired_state() {
    let server = MockServer::start().await;
    mount_exchange(&server, "late-code", 0).await;
    let (app, state) = create_test_app_with(config_for(&server));
    state.commands.connect().unwrap();

    let stale = sign_state(
        OWNER,
        Utc::now() - Duration::minutes(11),
        &state.config.oauth_state_key,
    )
    .unwrap();
    let uri = format!("/auth/whoop/callback?code=late-code&state={}", stale);

    let response = app
        .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert!(state.store.get_token(OWNER).await.unwrap().is_none());
}

#[tokio::test]
async fn test_grant_without_refresh_token_is_stored() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(TOKEN_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_json(token_body("access-1", None, 3600)))
        .expect(1)
        .mount(&server)
        .await;
    let (_, state) = create_test_app_with(config_for(&server));

    state.commands.connect().unwrap();
    state.commands.submit_code("no-offline").await.unwrap();

    let token = state.store.get_token(OWNER).await.unwrap().unwrap();
    assert_eq!(token.refresh_token, None);
}
