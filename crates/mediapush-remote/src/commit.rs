//! Phase 2: redeeming transfer tokens
//!
//! `POST {base}/v1/mediaItems:batchCreate` creates one remote item per
//! transfer token. The HTTP status covers the request as a whole; each
//! entry carries its own status code, which decides how the orchestrator
//! treats that item.
//!
//! | code        | meaning                      | mapped to                  |
//! |-------------|------------------------------|----------------------------|
//! | 0           | created                      | `Ok(RemoteId)`             |
//! | 5, 9        | token unknown or expired     | `InvalidTransferToken`     |
//! | 16          | unauthenticated              | `AuthExpired`              |
//! | 8           | resource exhausted           | `RateLimited`              |
//! | 4, 13, 14   | deadline, internal, unavailable | `Network` (transient)   |
//! | other       | permanent rejection          | `Client`                   |

use reqwest::Method;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use mediapush_core::domain::RemoteId;
use mediapush_core::ports::{CommitEntry, RemoteError};

use crate::client::{map_transport_error, RemoteClient};
use crate::rate_limit::Endpoint;

/// Phase 2 endpoint, relative to the base URL
pub const BATCH_CREATE_PATH: &str = "/v1/mediaItems:batchCreate";

// ============================================================================
// Wire types
// ============================================================================

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct BatchCreateRequest<'a> {
    new_media_items: Vec<NewMediaItem<'a>>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct NewMediaItem<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    description: Option<&'a str>,
    simple_media_item: SimpleMediaItem<'a>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct SimpleMediaItem<'a> {
    upload_token: &'a str,
    file_name: &'a str,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct BatchCreateResponse {
    #[serde(default)]
    new_media_item_results: Vec<NewMediaItemResult>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct NewMediaItemResult {
    upload_token: Option<String>,
    status: Option<ItemStatus>,
    media_item: Option<CreatedMediaItem>,
}

#[derive(Debug, Deserialize)]
struct ItemStatus {
    #[serde(default)]
    code: i32,
    #[serde(default)]
    message: String,
}

#[derive(Debug, Deserialize)]
struct CreatedMediaItem {
    id: String,
}

// ============================================================================
// Result mapping
// ============================================================================

/// Maps a per-item status code onto the error taxonomy
pub fn classify_item_status(code: i32, message: String) -> RemoteError {
    match code {
        5 | 9 => RemoteError::InvalidTransferToken(message),
        16 => RemoteError::AuthExpired(message),
        8 => RemoteError::RateLimited { retry_after: None },
        4 | 13 | 14 => RemoteError::Network(format!("status {code}: {message}")),
        _ => RemoteError::Client {
            status: None,
            message: format!("status {code}: {message}"),
        },
    }
}

fn map_result(result: NewMediaItemResult) -> Result<RemoteId, RemoteError> {
    let (code, message) = result
        .status
        .map(|s| (s.code, s.message))
        .unwrap_or((0, String::new()));

    if code != 0 {
        return Err(classify_item_status(code, message));
    }

    match result.media_item {
        Some(item) => RemoteId::new(item.id).map_err(|e| RemoteError::Server {
            status: 200,
            message: format!("commit returned an unusable media item id: {e}"),
        }),
        None => Err(RemoteError::Server {
            status: 200,
            message: "commit succeeded without a media item".to_string(),
        }),
    }
}

/// Pairs results with entries by upload token, falling back to position
fn match_results(
    entries: &[CommitEntry],
    results: Vec<NewMediaItemResult>,
) -> Vec<Result<RemoteId, RemoteError>> {
    let mut by_position: Vec<Option<NewMediaItemResult>> = results.into_iter().map(Some).collect();

    entries
        .iter()
        .enumerate()
        .map(|(index, entry)| {
            let token = entry.token.as_str();
            let slot = by_position
                .iter()
                .position(|r| {
                    r.as_ref()
                        .and_then(|r| r.upload_token.as_deref())
                        .is_some_and(|t| t == token)
                })
                .or_else(|| {
                    by_position
                        .get(index)
                        .and_then(|r| r.as_ref())
                        .filter(|r| r.upload_token.is_none())
                        .map(|_| index)
                });

            match slot.and_then(|i| by_position[i].take()) {
                Some(result) => map_result(result),
                None => {
                    warn!(file_name = %entry.file_name, "Commit response had no result for entry");
                    Err(RemoteError::Server {
                        status: 200,
                        message: "commit response omitted this item".to_string(),
                    })
                }
            }
        })
        .collect()
}

/// Creates remote items for every entry, one result per entry in order
pub async fn commit_items(
    client: &RemoteClient,
    access_token: &str,
    entries: &[CommitEntry],
) -> Result<Vec<Result<RemoteId, RemoteError>>, RemoteError> {
    if entries.is_empty() {
        return Ok(Vec::new());
    }

    let payload = BatchCreateRequest {
        new_media_items: entries
            .iter()
            .map(|entry| NewMediaItem {
                description: entry.description.as_deref(),
                simple_media_item: SimpleMediaItem {
                    upload_token: entry.token.as_str(),
                    file_name: &entry.file_name,
                },
            })
            .collect(),
    };

    debug!(entries = entries.len(), "Committing transfer tokens");

    let builder = client
        .request(Method::POST, BATCH_CREATE_PATH, access_token)
        .json(&payload);
    let response = client.send(builder, Endpoint::Commit).await?;

    let body: BatchCreateResponse = response.json().await.map_err(|e| {
        if e.is_decode() {
            RemoteError::Server {
                status: 200,
                message: format!("unreadable commit response: {e}"),
            }
        } else {
            map_transport_error(e)
        }
    })?;

    Ok(match_results(entries, body.new_media_item_results))
}

#[cfg(test)]
mod tests {
    use mediapush_core::domain::TransferToken;

    use super::*;

    fn entry(token: &str) -> CommitEntry {
        CommitEntry {
            token: TransferToken::new(token).unwrap(),
            file_name: format!("{token}.jpg"),
            description: None,
        }
    }

    fn result(token: Option<&str>, code: i32, id: Option<&str>) -> NewMediaItemResult {
        NewMediaItemResult {
            upload_token: token.map(str::to_string),
            status: Some(ItemStatus {
                code,
                message: "msg".to_string(),
            }),
            media_item: id.map(|id| CreatedMediaItem { id: id.to_string() }),
        }
    }

    #[test]
    fn test_classify_item_status() {
        assert!(matches!(
            classify_item_status(5, String::new()),
            RemoteError::InvalidTransferToken(_)
        ));
        assert!(matches!(
            classify_item_status(9, String::new()),
            RemoteError::InvalidTransferToken(_)
        ));
        assert!(matches!(
            classify_item_status(16, String::new()),
            RemoteError::AuthExpired(_)
        ));
        assert_eq!(
            classify_item_status(8, String::new()),
            RemoteError::RateLimited { retry_after: None }
        );
        for code in [4, 13, 14] {
            assert!(matches!(
                classify_item_status(code, String::new()),
                RemoteError::Network(_)
            ));
        }
        assert!(matches!(
            classify_item_status(3, String::new()),
            RemoteError::Client { status: None, .. }
        ));
    }

    #[test]
    fn test_results_matched_by_token_out_of_order() {
        let entries = vec![entry("t1"), entry("t2")];
        let results = vec![
            result(Some("t2"), 5, None),
            result(Some("t1"), 0, Some("remote-1")),
        ];
        let mapped = match_results(&entries, results);
        assert_eq!(mapped[0], Ok(RemoteId::new("remote-1").unwrap()));
        assert!(matches!(mapped[1], Err(RemoteError::InvalidTransferToken(_))));
    }

    #[test]
    fn test_results_matched_by_position_without_tokens() {
        let entries = vec![entry("t1"), entry("t2")];
        let results = vec![result(None, 0, Some("r1")), result(None, 0, Some("r2"))];
        let mapped = match_results(&entries, results);
        assert_eq!(mapped[1], Ok(RemoteId::new("r2").unwrap()));
    }

    #[test]
    fn test_missing_result_is_transient() {
        let entries = vec![entry("t1"), entry("t2")];
        let mapped = match_results(&entries, vec![result(Some("t1"), 0, Some("r1"))]);
        assert!(mapped[0].is_ok());
        assert!(matches!(mapped[1], Err(RemoteError::Server { .. })));
    }

    #[test]
    fn test_success_without_media_item_is_error() {
        assert!(map_result(result(None, 0, None)).is_err());
    }

    #[test]
    fn test_request_serialization() {
        let entries = [CommitEntry {
            description: Some("holiday".to_string()),
            ..entry("tok")
        }];
        let payload = BatchCreateRequest {
            new_media_items: entries
                .iter()
                .map(|e| NewMediaItem {
                    description: e.description.as_deref(),
                    simple_media_item: SimpleMediaItem {
                        upload_token: e.token.as_str(),
                        file_name: &e.file_name,
                    },
                })
                .collect(),
        };
        let json = serde_json::to_value(&payload).unwrap();
        assert_eq!(
            json,
            serde_json::json!({
                "newMediaItems": [{
                    "description": "holiday",
                    "simpleMediaItem": {"uploadToken": "tok", "fileName": "tok.jpg"}
                }]
            })
        );
    }
}
