//! Refresh-token grant against a mock token endpoint

use chrono::Utc;
use serde_json::json;
use wiremock::matchers::{body_string_contains, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use mediapush_core::ports::{ITokenRefresher, RefreshError};
use mediapush_remote::{OAuthSettings, OAuthTokenRefresher};

fn settings(server: &MockServer) -> OAuthSettings {
    OAuthSettings {
        client_id: "test-client".to_string(),
        client_secret: Some("test-secret".to_string()),
        auth_url: "https://accounts.example.test/auth".to_string(),
        token_url: format!("{}/token", server.uri()),
        redirect_uri: "http://127.0.0.1:8400/callback".to_string(),
        redirect_port: 8400,
        scopes: vec!["https://example.test/scope".to_string()],
    }
}

#[tokio::test]
async fn test_refresh_keeps_refresh_token_when_not_rotated() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/token"))
        .and(body_string_contains("grant_type=refresh_token"))
        .and(body_string_contains("refresh_token=stored-refresh"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "access_token": "new-access",
            "token_type": "Bearer",
            "expires_in": 3599
        })))
        .expect(1)
        .mount(&server)
        .await;

    let refresher = OAuthTokenRefresher::new(&settings(&server)).unwrap();
    let credential = refresher.refresh("stored-refresh").await.unwrap();

    assert_eq!(credential.access_token(), "new-access");
    assert_eq!(credential.refresh_token(), "stored-refresh");
    let remaining = credential.expires_at() - Utc::now();
    assert!(remaining.num_seconds() > 3500);
    assert!(remaining.num_seconds() <= 3599);
}

#[tokio::test]
async fn test_refresh_takes_rotated_refresh_token() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "access_token": "new-access",
            "refresh_token": "rotated-refresh",
            "token_type": "Bearer",
            "expires_in": 60
        })))
        .mount(&server)
        .await;

    let refresher = OAuthTokenRefresher::new(&settings(&server)).unwrap();
    let credential = refresher.refresh("old-refresh").await.unwrap();
    assert_eq!(credential.refresh_token(), "rotated-refresh");
}

#[tokio::test]
async fn test_invalid_grant_is_revoked() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/token"))
        .respond_with(ResponseTemplate::new(400).set_body_json(json!({
            "error": "invalid_grant",
            "error_description": "Token has been expired or revoked."
        })))
        .mount(&server)
        .await;

    let refresher = OAuthTokenRefresher::new(&settings(&server)).unwrap();
    let err = refresher.refresh("revoked-refresh").await.unwrap_err();
    assert_eq!(
        err,
        RefreshError::Revoked("Token has been expired or revoked.".to_string())
    );
}

#[tokio::test]
async fn test_server_failure_is_transient() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/token"))
        .respond_with(ResponseTemplate::new(503).set_body_string("unavailable"))
        .mount(&server)
        .await;

    let refresher = OAuthTokenRefresher::new(&settings(&server)).unwrap();
    let err = refresher.refresh("stored-refresh").await.unwrap_err();
    assert!(matches!(err, RefreshError::Transient(_)));
}

#[tokio::test]
async fn test_other_oauth_errors_are_transient() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/token"))
        .respond_with(ResponseTemplate::new(400).set_body_json(json!({
            "error": "invalid_request"
        })))
        .mount(&server)
        .await;

    let refresher = OAuthTokenRefresher::new(&settings(&server)).unwrap();
    let err = refresher.refresh("stored-refresh").await.unwrap_err();
    assert!(matches!(err, RefreshError::Transient(_)));
}
