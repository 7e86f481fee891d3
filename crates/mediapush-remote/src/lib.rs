//! MediaPush Remote - content store HTTP client
//!
//! Provides async clients for:
//! - OAuth2 authentication (Authorization Code with PKCE, refresh grant)
//! - Phase 1 byte transfer (single raw request or resumable chunks)
//! - Phase 2 batch commit of transfer tokens
//!
//! ## Modules
//!
//! - [`auth`] - OAuth2 flows and the `ITokenRefresher` adapter
//! - [`client`] - Authenticated HTTP client and status mapping
//! - [`upload`] - Phase 1 wire protocol
//! - [`commit`] - Phase 2 wire protocol
//! - [`provider`] - `IRemoteStore` adapter
//! - [`rate_limit`] - Adaptive per-endpoint token buckets
//!
//! Failures are reported as [`mediapush_core::ports::RemoteError`] so the
//! orchestrator can classify them without knowing about HTTP.

pub mod auth;
pub mod client;
pub mod commit;
pub mod provider;
pub mod rate_limit;
pub mod upload;

pub use auth::{OAuthSettings, OAuthTokenRefresher};
pub use client::RemoteClient;
pub use provider::RemoteStoreProvider;
