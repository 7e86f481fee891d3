//! Remote content store HTTP client
//!
//! Provides a thin typed wrapper over `reqwest::Client` that handles
//! bearer authentication, endpoint construction, proactive rate limiting
//! and the mapping of HTTP outcomes onto [`RemoteError`].
//!
//! ## Usage
//!
//! ```rust,no_run
//! use mediapush_remote::client::RemoteClient;
//! use mediapush_remote::rate_limit::Endpoint;
//! use reqwest::Method;
//!
//! # async fn example() -> Result<(), mediapush_core::ports::RemoteError> {
//! let client = RemoteClient::new("https://photoslibrary.googleapis.com");
//! let request = client.request(Method::POST, "/v1/uploads", "access-token");
//! let response = client.send(request, Endpoint::Upload).await?;
//! # let _ = response;
//! # Ok(())
//! # }
//! ```

use std::sync::Arc;
use std::time::Duration;

use reqwest::{Client, Method, RequestBuilder, Response, StatusCode};
use tracing::{debug, info, warn};

use mediapush_core::ports::RemoteError;

use crate::rate_limit::{parse_retry_after, AdaptiveRateLimiter, Endpoint};

/// Default API host
pub const DEFAULT_BASE_URL: &str = "https://photoslibrary.googleapis.com";

/// Longest error body quoted in a [`RemoteError`] message
const MAX_ERROR_BODY: usize = 512;

/// HTTP client for the remote content store
///
/// Holds no credential: the access token is supplied per request so the
/// credential coordinator stays the single owner of the current token.
#[derive(Clone)]
pub struct RemoteClient {
    client: Client,
    base_url: String,
    rate_limiter: Option<Arc<AdaptiveRateLimiter>>,
}

impl std::fmt::Debug for RemoteClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RemoteClient")
            .field("base_url", &self.base_url)
            .field("rate_limited", &self.rate_limiter.is_some())
            .finish()
    }
}

impl RemoteClient {
    /// Creates a client for the given base URL (no trailing slash needed)
    pub fn new(base_url: impl Into<String>) -> Self {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        Self {
            client: Client::new(),
            base_url,
            rate_limiter: None,
        }
    }

    /// Attaches an adaptive rate limiter shared across workers
    pub fn with_rate_limiter(mut self, limiter: Arc<AdaptiveRateLimiter>) -> Self {
        self.rate_limiter = Some(limiter);
        self
    }

    pub fn rate_limiter(&self) -> Option<&Arc<AdaptiveRateLimiter>> {
        self.rate_limiter.as_ref()
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Authenticated request builder for a path relative to the base URL
    pub fn request(&self, method: Method, path: &str, access_token: &str) -> RequestBuilder {
        let url = format!("{}{}", self.base_url, path);
        self.client.request(method, url).bearer_auth(access_token)
    }

    /// Authenticated request builder for an absolute URL (resumable sessions)
    pub fn request_url(&self, method: Method, url: &str, access_token: &str) -> RequestBuilder {
        self.client.request(method, url).bearer_auth(access_token)
    }

    /// Sends a request and maps the outcome
    ///
    /// Acquires a rate-limit token for `endpoint` first. Any non-2xx status
    /// is converted into the matching [`RemoteError`]; a 429 also halves the
    /// endpoint's bucket.
    pub async fn send(
        &self,
        request: RequestBuilder,
        endpoint: Endpoint,
    ) -> Result<Response, RemoteError> {
        if let Some(ref limiter) = self.rate_limiter {
            limiter.acquire(endpoint).await;
        }

        let response = request.send().await.map_err(map_transport_error)?;
        let status = response.status();

        if status.is_success() {
            if let Some(ref limiter) = self.rate_limiter {
                limiter.on_success(endpoint);
            }
            return Ok(response);
        }

        if status == StatusCode::TOO_MANY_REQUESTS {
            if let Some(ref limiter) = self.rate_limiter {
                limiter.on_throttle(endpoint);
            }
        }

        Err(error_from_response(response).await)
    }
}

/// Maps a reqwest transport failure (no HTTP status) to a transient error
pub(crate) fn map_transport_error(err: reqwest::Error) -> RemoteError {
    if err.is_timeout() {
        debug!(error = %err, "Request timed out");
    }
    RemoteError::Network(err.to_string())
}

/// Converts a non-success response into a [`RemoteError`]
pub(crate) async fn error_from_response(response: Response) -> RemoteError {
    let status = response.status();
    let retry_after = response
        .headers()
        .get(reqwest::header::RETRY_AFTER)
        .and_then(|v| v.to_str().ok())
        .and_then(parse_retry_after);

    let body = response.text().await.unwrap_or_default();
    let mut message = body.trim().to_string();
    if message.len() > MAX_ERROR_BODY {
        let cut = (0..=MAX_ERROR_BODY)
            .rev()
            .find(|&i| message.is_char_boundary(i))
            .unwrap_or(0);
        message.truncate(cut);
    }
    if message.is_empty() {
        message = status
            .canonical_reason()
            .unwrap_or("no response body")
            .to_string();
    }

    classify_status(status, retry_after, message)
}

/// HTTP status → error class
pub(crate) fn classify_status(
    status: StatusCode,
    retry_after: Option<Duration>,
    message: String,
) -> RemoteError {
    match status {
        StatusCode::UNAUTHORIZED => {
            info!("Remote rejected the access token");
            RemoteError::AuthExpired(message)
        }
        StatusCode::TOO_MANY_REQUESTS => {
            warn!(
                retry_after_ms = retry_after.map(|d| d.as_millis() as u64),
                "Remote rate limit hit"
            );
            RemoteError::RateLimited { retry_after }
        }
        s if s.is_server_error() => RemoteError::Server {
            status: s.as_u16(),
            message,
        },
        s => RemoteError::Client {
            status: Some(s.as_u16()),
            message,
        },
    }
}
