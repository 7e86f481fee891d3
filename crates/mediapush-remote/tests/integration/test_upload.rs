//! Phase 1 wire protocol and HTTP error mapping

use std::sync::Arc;
use std::time::Duration;

use wiremock::matchers::{header, method, path};
use wiremock::{Mock, ResponseTemplate};

use mediapush_core::ports::{IRemoteStore, RemoteError, TransferSession};
use mediapush_remote::rate_limit::{AdaptiveRateLimiter, Endpoint};
use mediapush_remote::{RemoteClient, RemoteStoreProvider};

use crate::common::{self, ACCESS_TOKEN};

// ============================================================================
// Raw uploads
// ============================================================================

#[tokio::test]
async fn test_small_file_goes_in_one_raw_request() {
    let (server, client) = common::setup().await;

    Mock::given(method("POST"))
        .and(path("/v1/uploads"))
        .and(header("X-Upload-Protocol", "raw"))
        .and(header("X-Upload-File-Name", "IMG_0001.jpg"))
        .and(header("authorization", "Bearer test-access-token"))
        .respond_with(ResponseTemplate::new(200).set_body_string("token-raw\n"))
        .expect(1)
        .mount(&server)
        .await;

    let content = b"small jpeg payload";
    let (_dir, request) = common::staged_file(content, 1024);
    let provider = RemoteStoreProvider::new(client);
    let mut session = TransferSession::new(request.chunk_size);

    let token = provider
        .upload_bytes(ACCESS_TOKEN, &request, &mut session)
        .await
        .expect("raw upload failed");

    assert_eq!(token.as_str(), "token-raw");
    assert_eq!(session.token.as_ref().map(|t| t.as_str()), Some("token-raw"));
    assert!(session.upload_url.is_none());

    let received = common::requests_to(&server, "/v1/uploads").await;
    assert_eq!(received.len(), 1);
    assert_eq!(received[0].body, content);
    assert_eq!(
        common::header(&received[0], "X-Upload-Content-Type"),
        Some("image/jpeg")
    );
}

#[tokio::test]
async fn test_payload_equal_to_chunk_size_is_single_request() {
    let (server, client) = common::setup().await;
    Mock::given(method("POST"))
        .and(path("/v1/uploads"))
        .and(header("X-Upload-Protocol", "raw"))
        .respond_with(ResponseTemplate::new(200).set_body_string("t"))
        .expect(1)
        .mount(&server)
        .await;

    let (_dir, request) = common::staged_file(&[7u8; 8], 8);
    let mut session = TransferSession::new(8);
    mediapush_remote::upload::upload_file(&client, ACCESS_TOKEN, &request, &mut session)
        .await
        .unwrap();
}

#[tokio::test]
async fn test_empty_token_body_is_server_error() {
    let (server, client) = common::setup().await;
    Mock::given(method("POST"))
        .and(path("/v1/uploads"))
        .respond_with(ResponseTemplate::new(200).set_body_string("   "))
        .mount(&server)
        .await;

    let (_dir, request) = common::staged_file(b"abc", 1024);
    let mut session = TransferSession::new(1024);
    let err = mediapush_remote::upload::upload_file(&client, ACCESS_TOKEN, &request, &mut session)
        .await
        .unwrap_err();
    assert!(matches!(err, RemoteError::Server { .. }));
}

// ============================================================================
// Resumable uploads
// ============================================================================

async fn mount_resumable(server: &wiremock::MockServer) {
    Mock::given(method("POST"))
        .and(path("/v1/uploads"))
        .and(header("X-Upload-Protocol", "resumable"))
        .and(header("X-Upload-Command", "start"))
        .and(header("X-Upload-Raw-Size", "10"))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("X-Upload-URL", format!("{}/session/abc", server.uri()).as_str()),
        )
        .mount(server)
        .await;

    Mock::given(method("POST"))
        .and(path("/session/abc"))
        .and(|req: &wiremock::Request| {
            common::header(req, "X-Upload-Command").is_some_and(|c| c.contains("finalize"))
        })
        .respond_with(ResponseTemplate::new(200).set_body_string("token-big"))
        .mount(server)
        .await;

    Mock::given(method("POST"))
        .and(path("/session/abc"))
        .and(|req: &wiremock::Request| common::header(req, "X-Upload-Command") == Some("upload"))
        .respond_with(ResponseTemplate::new(200))
        .mount(server)
        .await;
}

#[tokio::test]
async fn test_large_file_uses_resumable_chunks() {
    let (server, client) = common::setup().await;
    mount_resumable(&server).await;

    let content = b"0123456789";
    let (_dir, request) = common::staged_file(content, 4);
    let mut session = TransferSession::new(4);

    let token = mediapush_remote::upload::upload_file(&client, ACCESS_TOKEN, &request, &mut session)
        .await
        .expect("resumable upload failed");

    assert_eq!(token.as_str(), "token-big");
    assert_eq!(session.cursor, 10);
    assert!(session.upload_url.as_deref().unwrap().ends_with("/session/abc"));

    let chunks = common::requests_to(&server, "/session/abc").await;
    let offsets: Vec<&str> = chunks
        .iter()
        .map(|r| common::header(r, "X-Upload-Offset").unwrap())
        .collect();
    assert_eq!(offsets, vec!["0", "4", "8"]);

    let sizes: Vec<usize> = chunks.iter().map(|r| r.body.len()).collect();
    assert_eq!(sizes, vec![4, 4, 2]);

    let joined: Vec<u8> = chunks.iter().flat_map(|r| r.body.clone()).collect();
    assert_eq!(joined, content);

    assert_eq!(
        common::header(&chunks[2], "X-Upload-Command"),
        Some("upload, finalize")
    );
}

#[tokio::test]
async fn test_retry_continues_from_session_cursor() {
    let (server, client) = common::setup().await;
    mount_resumable(&server).await;

    let (_dir, request) = common::staged_file(b"0123456789", 4);
    let mut session = TransferSession::new(4);
    session.upload_url = Some(format!("{}/session/abc", server.uri()));
    session.cursor = 8;

    let token = mediapush_remote::upload::upload_file(&client, ACCESS_TOKEN, &request, &mut session)
        .await
        .unwrap();
    assert_eq!(token.as_str(), "token-big");

    // No new session, one final chunk carrying the last two bytes
    assert!(common::requests_to(&server, "/v1/uploads").await.is_empty());
    let chunks = common::requests_to(&server, "/session/abc").await;
    assert_eq!(chunks.len(), 1);
    assert_eq!(chunks[0].body, b"89");
    assert_eq!(common::header(&chunks[0], "X-Upload-Offset"), Some("8"));
}

#[tokio::test]
async fn test_start_without_upload_url_is_server_error() {
    let (server, client) = common::setup().await;
    Mock::given(method("POST"))
        .and(path("/v1/uploads"))
        .respond_with(ResponseTemplate::new(200))
        .mount(&server)
        .await;

    let (_dir, request) = common::staged_file(b"0123456789", 4);
    let mut session = TransferSession::new(4);
    let err = mediapush_remote::upload::upload_file(&client, ACCESS_TOKEN, &request, &mut session)
        .await
        .unwrap_err();
    assert!(matches!(err, RemoteError::Server { .. }));
}

// ============================================================================
// Status mapping
// ============================================================================

async fn upload_with_status(template: ResponseTemplate) -> RemoteError {
    let (server, client) = common::setup().await;
    Mock::given(method("POST"))
        .and(path("/v1/uploads"))
        .respond_with(template)
        .mount(&server)
        .await;

    let (_dir, request) = common::staged_file(b"abc", 1024);
    let mut session = TransferSession::new(1024);
    mediapush_remote::upload::upload_file(&client, ACCESS_TOKEN, &request, &mut session)
        .await
        .unwrap_err()
}

#[tokio::test]
async fn test_http_status_mapping() {
    assert!(matches!(
        upload_with_status(ResponseTemplate::new(401)).await,
        RemoteError::AuthExpired(_)
    ));
    assert_eq!(
        upload_with_status(ResponseTemplate::new(429).insert_header("Retry-After", "7")).await,
        RemoteError::RateLimited {
            retry_after: Some(Duration::from_secs(7))
        }
    );
    assert!(matches!(
        upload_with_status(ResponseTemplate::new(503).set_body_string("backend down")).await,
        RemoteError::Server { status: 503, ref message } if message == "backend down"
    ));
    assert!(matches!(
        upload_with_status(ResponseTemplate::new(413)).await,
        RemoteError::Client {
            status: Some(413),
            ..
        }
    ));
    assert!(matches!(
        upload_with_status(ResponseTemplate::new(415)).await,
        RemoteError::Client {
            status: Some(415),
            ..
        }
    ));
}

#[tokio::test]
async fn test_connection_refused_is_network_error() {
    // Nothing listens on the discard port
    let client = RemoteClient::new("http://127.0.0.1:9");
    let (_dir, request) = common::staged_file(b"abc", 1024);
    let mut session = TransferSession::new(1024);

    let err = mediapush_remote::upload::upload_file(&client, ACCESS_TOKEN, &request, &mut session)
        .await
        .unwrap_err();
    assert!(matches!(err, RemoteError::Network(_)));
}

#[tokio::test]
async fn test_missing_staged_file_is_network_error() {
    let (_server, client) = common::setup().await;
    let (dir, request) = common::staged_file(b"abc", 1024);
    drop(dir);

    let mut session = TransferSession::new(1024);
    let err = mediapush_remote::upload::upload_file(&client, ACCESS_TOKEN, &request, &mut session)
        .await
        .unwrap_err();
    assert!(matches!(err, RemoteError::Network(_)));
}

#[tokio::test]
async fn test_throttle_shrinks_limiter_bucket() {
    let server = wiremock::MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/uploads"))
        .respond_with(ResponseTemplate::new(429))
        .mount(&server)
        .await;

    let limiter = Arc::new(AdaptiveRateLimiter::new(60, 60));
    let client = RemoteClient::new(server.uri()).with_rate_limiter(limiter.clone());
    let (_dir, request) = common::staged_file(b"abc", 1024);
    let mut session = TransferSession::new(1024);

    let err = mediapush_remote::upload::upload_file(&client, ACCESS_TOKEN, &request, &mut session)
        .await
        .unwrap_err();
    assert_eq!(err, RemoteError::RateLimited { retry_after: None });
    assert_eq!(limiter.bucket(Endpoint::Upload).effective_capacity(), 30);
    assert_eq!(limiter.bucket(Endpoint::Commit).effective_capacity(), 60);
}
