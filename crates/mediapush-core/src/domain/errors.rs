//! Domain error types
//!
//! This module defines error types specific to domain operations
//! (validation failures, invalid state transitions) and the [`ErrorKind`]
//! taxonomy every transfer failure is classified into.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors that can occur in domain operations
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DomainError {
    /// Invalid hash format (expected lowercase SHA-256 hex)
    #[error("Invalid hash format: {0}")]
    InvalidHash(String),

    /// Invalid state transition attempt
    #[error("Invalid state transition from {from} to {to}")]
    InvalidState {
        /// The current state
        from: String,
        /// The attempted target state
        to: String,
    },

    /// Generic validation failure
    #[error("Validation failed: {0}")]
    ValidationFailed(String),

    /// Invalid remote ID format
    #[error("Invalid remote ID: {0}")]
    InvalidRemoteId(String),

    /// ID parsing error
    #[error("Invalid ID format: {0}")]
    InvalidId(String),

    /// A stored enum value could not be parsed
    #[error("Unknown {kind} value: {value}")]
    UnknownValue {
        /// Which enum was being parsed
        kind: &'static str,
        /// The offending value
        value: String,
    },
}

/// Classification of a transfer failure
///
/// Every failure recorded on an item carries one of these kinds in its
/// `last_error` (rendered as `"<kind>: <message>"`), which is what the
/// orchestrator's retry policy switches on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ErrorKind {
    /// Connection, IO, timeout or 5xx failure
    TransientNetwork,
    /// The remote asked us to slow down
    TransientRateLimit,
    /// The bearer credential expired or was rejected
    AuthExpired,
    /// The refresh grant was revoked; uploads halt until re-authorization
    AuthRevoked,
    /// Phase 2 rejected the transfer token; phase 1 must be redone
    InvalidTransferToken,
    /// Malformed request, unsupported format, size over limit
    ClientError,
    /// The staged copy is missing or empty
    LocalMissing,
    /// Not enough free space at the staging volume
    InsufficientSpace,
    /// Content already stored remotely
    Duplicate,
}

impl ErrorKind {
    /// Returns the stable kebab-case name used in `last_error`
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::TransientNetwork => "transient-network",
            ErrorKind::TransientRateLimit => "transient-rate-limit",
            ErrorKind::AuthExpired => "auth-expired",
            ErrorKind::AuthRevoked => "auth-revoked",
            ErrorKind::InvalidTransferToken => "invalid-transfer-token",
            ErrorKind::ClientError => "client-error",
            ErrorKind::LocalMissing => "local-missing",
            ErrorKind::InsufficientSpace => "insufficient-space",
            ErrorKind::Duplicate => "duplicate",
        }
    }

    /// Returns true if the orchestrator retries this kind automatically
    pub fn is_retriable(&self) -> bool {
        matches!(
            self,
            ErrorKind::TransientNetwork
                | ErrorKind::TransientRateLimit
                | ErrorKind::AuthExpired
                | ErrorKind::InvalidTransferToken
        )
    }

    /// Returns true if this kind ends the item's processing for good
    pub fn is_terminal_for_item(&self) -> bool {
        matches!(self, ErrorKind::ClientError | ErrorKind::LocalMissing)
    }

    /// Formats a `last_error` value for this kind
    pub fn describe(&self, message: impl fmt::Display) -> String {
        format!("{}: {}", self.as_str(), message)
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ErrorKind {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "transient-network" => Ok(ErrorKind::TransientNetwork),
            "transient-rate-limit" => Ok(ErrorKind::TransientRateLimit),
            "auth-expired" => Ok(ErrorKind::AuthExpired),
            "auth-revoked" => Ok(ErrorKind::AuthRevoked),
            "invalid-transfer-token" => Ok(ErrorKind::InvalidTransferToken),
            "client-error" => Ok(ErrorKind::ClientError),
            "local-missing" => Ok(ErrorKind::LocalMissing),
            "insufficient-space" => Ok(ErrorKind::InsufficientSpace),
            "duplicate" => Ok(ErrorKind::Duplicate),
            other => Err(DomainError::UnknownValue {
                kind: "error kind",
                value: other.to_string(),
            }),
        }
    }
}
