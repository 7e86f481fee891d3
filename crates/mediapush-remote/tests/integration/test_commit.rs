//! Phase 2 wire protocol

use serde_json::json;
use wiremock::matchers::{body_json, method, path};
use wiremock::{Mock, ResponseTemplate};

use mediapush_core::domain::{RemoteId, TransferToken};
use mediapush_core::ports::{CommitEntry, IRemoteStore, RemoteError};
use mediapush_remote::RemoteStoreProvider;

use crate::common::{self, ACCESS_TOKEN};

fn entry(token: &str, file_name: &str) -> CommitEntry {
    CommitEntry {
        token: TransferToken::new(token).unwrap(),
        file_name: file_name.to_string(),
        description: None,
    }
}

#[tokio::test]
async fn test_commit_sends_batch_create_and_maps_results() {
    let (server, client) = common::setup().await;

    Mock::given(method("POST"))
        .and(path("/v1/mediaItems:batchCreate"))
        .and(body_json(json!({
            "newMediaItems": [
                {"simpleMediaItem": {"uploadToken": "tok-a", "fileName": "a.jpg"}},
                {"description": "beach", "simpleMediaItem": {"uploadToken": "tok-b", "fileName": "b.jpg"}},
                {"simpleMediaItem": {"uploadToken": "tok-c", "fileName": "c.mp4"}}
            ]
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "newMediaItemResults": [
                {
                    "uploadToken": "tok-a",
                    "status": {"message": "Success"},
                    "mediaItem": {"id": "remote-a"}
                },
                {
                    "uploadToken": "tok-b",
                    "status": {"code": 9, "message": "Upload token expired"}
                },
                {
                    "uploadToken": "tok-c",
                    "status": {"code": 3, "message": "Unsupported media"}
                }
            ]
        })))
        .expect(1)
        .mount(&server)
        .await;

    let provider = RemoteStoreProvider::new(client);
    let entries = vec![
        entry("tok-a", "a.jpg"),
        CommitEntry {
            description: Some("beach".to_string()),
            ..entry("tok-b", "b.jpg")
        },
        entry("tok-c", "c.mp4"),
    ];

    let results = provider.commit(ACCESS_TOKEN, &entries).await.unwrap();
    assert_eq!(results.len(), 3);
    assert_eq!(results[0], Ok(RemoteId::new("remote-a").unwrap()));
    assert!(matches!(results[1], Err(RemoteError::InvalidTransferToken(_))));
    assert!(matches!(results[2], Err(RemoteError::Client { .. })));
}

#[tokio::test]
async fn test_commit_per_item_transient_codes() {
    let (server, client) = common::setup().await;
    Mock::given(method("POST"))
        .and(path("/v1/mediaItems:batchCreate"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "newMediaItemResults": [
                {"uploadToken": "t1", "status": {"code": 14, "message": "Unavailable"}},
                {"uploadToken": "t2", "status": {"code": 8, "message": "Quota"}},
                {"uploadToken": "t3", "status": {"code": 16, "message": "Unauthenticated"}}
            ]
        })))
        .mount(&server)
        .await;

    let provider = RemoteStoreProvider::new(client);
    let results = provider
        .commit(
            ACCESS_TOKEN,
            &[entry("t1", "1.jpg"), entry("t2", "2.jpg"), entry("t3", "3.jpg")],
        )
        .await
        .unwrap();

    assert!(matches!(results[0], Err(RemoteError::Network(_))));
    assert_eq!(results[1], Err(RemoteError::RateLimited { retry_after: None }));
    assert!(matches!(results[2], Err(RemoteError::AuthExpired(_))));
}

#[tokio::test]
async fn test_commit_request_level_failure() {
    let (server, client) = common::setup().await;
    Mock::given(method("POST"))
        .and(path("/v1/mediaItems:batchCreate"))
        .respond_with(ResponseTemplate::new(401))
        .mount(&server)
        .await;

    let provider = RemoteStoreProvider::new(client);
    let err = provider
        .commit(ACCESS_TOKEN, &[entry("t1", "1.jpg")])
        .await
        .unwrap_err();
    assert!(matches!(err, RemoteError::AuthExpired(_)));
}

#[tokio::test]
async fn test_commit_nothing_makes_no_request() {
    let (server, client) = common::setup().await;
    let provider = RemoteStoreProvider::new(client);

    let results = provider.commit(ACCESS_TOKEN, &[]).await.unwrap();
    assert!(results.is_empty());
    assert!(server.received_requests().await.unwrap_or_default().is_empty());
}
