//! Remote content store port (driven/secondary port)
//!
//! This module defines the two-phase transfer interface: phase 1 streams an
//! item's bytes and yields an opaque [`TransferToken`]; phase 2 redeems the
//! token to create the remote item.
//!
//! ## Design Notes
//!
//! - Unlike the storage ports, this port returns a typed [`RemoteError`]:
//!   the orchestrator's retry policy switches on the failure class.
//! - [`TransferSession`] is in-memory only and lives for one item's upload.
//!   A crash discards it; the item restarts phase 1 from byte 0.

use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

use crate::domain::{ErrorKind, RemoteId, TransferToken};

// ============================================================================
// RemoteError
// ============================================================================

/// Failure reported by the remote store
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum RemoteError {
    /// Connection or IO failure
    #[error("network error: {0}")]
    Network(String),

    /// The phase exceeded its deadline
    #[error("timed out after {0:?}")]
    Timeout(Duration),

    /// HTTP 429 or a per-item rate-limit status
    #[error("rate limited (retry after {retry_after:?})")]
    RateLimited {
        /// Server-suggested delay
        retry_after: Option<Duration>,
    },

    /// HTTP 5xx
    #[error("server error {status}: {message}")]
    Server { status: u16, message: String },

    /// HTTP 401 or an auth-expired per-item status
    #[error("authentication expired: {0}")]
    AuthExpired(String),

    /// Commit rejected the transfer token
    #[error("invalid transfer token: {0}")]
    InvalidTransferToken(String),

    /// Permanent rejection
    #[error("client error{}: {message}", .status.map(|s| format!(" {s}")).unwrap_or_default())]
    Client {
        status: Option<u16>,
        message: String,
    },
}

impl RemoteError {
    /// Maps the failure onto the shared taxonomy
    pub fn kind(&self) -> ErrorKind {
        match self {
            RemoteError::Network(_) | RemoteError::Timeout(_) | RemoteError::Server { .. } => {
                ErrorKind::TransientNetwork
            }
            RemoteError::RateLimited { .. } => ErrorKind::TransientRateLimit,
            RemoteError::AuthExpired(_) => ErrorKind::AuthExpired,
            RemoteError::InvalidTransferToken(_) => ErrorKind::InvalidTransferToken,
            RemoteError::Client { .. } => ErrorKind::ClientError,
        }
    }

    /// Server-suggested delay, if any
    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            RemoteError::RateLimited { retry_after } => *retry_after,
            _ => None,
        }
    }
}

// ============================================================================
// Requests and sessions
// ============================================================================

/// Everything phase 1 needs to send one item
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadRequest {
    /// Staged copy to read from
    pub path: PathBuf,
    pub file_name: String,
    pub mime_type: String,
    pub size_bytes: u64,
    /// Chunk size chosen from the item's size class
    pub chunk_size: u64,
}

impl UploadRequest {
    /// Payloads that fit in one chunk go in a single raw request
    pub fn fits_single_request(&self) -> bool {
        self.size_bytes <= self.chunk_size
    }
}

/// In-memory state of one item's phase-1 transfer
#[derive(Debug, Clone, Default)]
pub struct TransferSession {
    /// Token received when phase 1 finished
    pub token: Option<TransferToken>,
    pub chunk_size: u64,
    /// Bytes acknowledged by the remote so far
    pub cursor: u64,
    /// Resumable session URL returned by the start request
    pub upload_url: Option<String>,
}

impl TransferSession {
    pub fn new(chunk_size: u64) -> Self {
        Self {
            chunk_size,
            ..Self::default()
        }
    }

    /// Drops everything learned from the remote; the next attempt starts over
    pub fn reset(&mut self) {
        self.token = None;
        self.cursor = 0;
        self.upload_url = None;
    }
}

/// One item to create in phase 2
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommitEntry {
    pub token: TransferToken,
    pub file_name: String,
    pub description: Option<String>,
}

// ============================================================================
// IRemoteStore trait
// ============================================================================

/// Port trait for the remote content store
///
/// The access token is passed per call; the credential coordinator decides
/// which token is current.
#[async_trait::async_trait]
pub trait IRemoteStore: Send + Sync {
    /// Phase 1: stream the staged bytes and return the transfer token
    ///
    /// Updates `session` as chunks are acknowledged.
    async fn upload_bytes(
        &self,
        access_token: &str,
        request: &UploadRequest,
        session: &mut TransferSession,
    ) -> Result<TransferToken, RemoteError>;

    /// Phase 2: redeem transfer tokens, one result per entry, in order
    ///
    /// The outer error covers the whole request (HTTP failure); the inner
    /// results carry per-item statuses.
    async fn commit(
        &self,
        access_token: &str,
        entries: &[CommitEntry],
    ) -> Result<Vec<Result<RemoteId, RemoteError>>, RemoteError>;
}
