//! Shared test helpers for the remote store integration tests

use std::path::PathBuf;

use tempfile::TempDir;
use wiremock::{MockServer, Request};

use mediapush_core::ports::UploadRequest;
use mediapush_remote::RemoteClient;

pub const ACCESS_TOKEN: &str = "test-access-token";

/// Starts a mock server and a client pointed at it
pub async fn setup() -> (MockServer, RemoteClient) {
    let server = MockServer::start().await;
    let client = RemoteClient::new(server.uri());
    (server, client)
}

/// Writes `content` to a staged file and describes it for phase 1
pub fn staged_file(content: &[u8], chunk_size: u64) -> (TempDir, UploadRequest) {
    let dir = tempfile::tempdir().unwrap();
    let path: PathBuf = dir.path().join("IMG_0001.jpg");
    std::fs::write(&path, content).unwrap();
    let request = UploadRequest {
        path,
        file_name: "IMG_0001.jpg".to_string(),
        mime_type: "image/jpeg".to_string(),
        size_bytes: content.len() as u64,
        chunk_size,
    };
    (dir, request)
}

/// Header value as a string, if present
pub fn header<'a>(request: &'a Request, name: &str) -> Option<&'a str> {
    request.headers.get(name).and_then(|v| v.to_str().ok())
}

/// Requests the server received on `path`, in arrival order
pub async fn requests_to(server: &MockServer, path: &str) -> Vec<Request> {
    server
        .received_requests()
        .await
        .unwrap_or_default()
        .into_iter()
        .filter(|r| r.url.path() == path)
        .collect()
}
