//! Credential persistence and refresh ports
//!
//! [`ICredentialStore`] persists the single process-wide credential.
//! [`ITokenRefresher`] exchanges a refresh token for a new credential and
//! distinguishes a revoked grant from a transient failure.

use thiserror::Error;

use crate::domain::Credential;

/// Failure of a refresh-token exchange
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum RefreshError {
    /// The grant was revoked or is otherwise invalid; the user must log in
    #[error("refresh grant revoked: {0}")]
    Revoked(String),

    /// Network or server trouble; try again later
    #[error("refresh failed: {0}")]
    Transient(String),
}

/// Port trait for the stored credential
#[async_trait::async_trait]
pub trait ICredentialStore: Send + Sync {
    /// Loads the stored credential, if any
    async fn load(&self) -> anyhow::Result<Option<Credential>>;

    /// Replaces the stored credential atomically
    async fn save(&self, credential: &Credential) -> anyhow::Result<()>;

    /// Removes the stored credential
    async fn clear(&self) -> anyhow::Result<()>;
}

/// Port trait for the token endpoint
#[async_trait::async_trait]
pub trait ITokenRefresher: Send + Sync {
    /// Exchanges `refresh_token` for a fresh credential
    ///
    /// Providers that do not rotate refresh tokens may return a credential
    /// carrying the same refresh token.
    async fn refresh(&self, refresh_token: &str) -> Result<Credential, RefreshError>;
}
