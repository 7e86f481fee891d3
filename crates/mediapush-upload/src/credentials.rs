//! Credential coordinator
//!
//! Owns the process-wide [`Credential`]. Workers ask for a valid access
//! token through [`CredentialCoordinator::get_valid_credential`]; when the
//! token is inside the refresh window exactly one refresh runs and every
//! other caller waits on the same lock, then re-reads the cache.
//!
//! ## States
//!
//! ```text
//! unauthenticated ──authorize──► authenticated ──window──► expiring-soon
//!                                      ▲                        │
//!                                      └────── refreshing ◄─────┘
//!                                                 │ revoked
//!                                                 ▼
//!                                   reauthentication-required
//! ```
//!
//! A revoked grant clears the stored credential; every later call reports
//! [`CredentialError::ReauthenticationRequired`] until
//! [`CredentialCoordinator::authorize`] installs a new credential.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use chrono::{Duration, Utc};
use thiserror::Error;
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, info, warn};

use mediapush_core::domain::{Credential, CredentialState};
use mediapush_core::ports::{ICredentialStore, ITokenRefresher, RefreshError};

/// Why no usable access token could be produced
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum CredentialError {
    /// Nothing stored; the user never logged in or logged out
    #[error("Not authenticated. Run 'mediapush auth login' first.")]
    NotAuthenticated,

    /// The refresh grant was revoked
    #[error("Re-authentication required: {0}")]
    ReauthenticationRequired(String),

    /// The token endpoint failed transiently
    #[error("Credential refresh failed: {0}")]
    Refresh(String),

    /// The credential store failed
    #[error("Credential store error: {0}")]
    Store(String),
}

impl CredentialError {
    /// True when only user interaction can recover
    pub fn requires_login(&self) -> bool {
        matches!(
            self,
            CredentialError::NotAuthenticated | CredentialError::ReauthenticationRequired(_)
        )
    }
}

#[derive(Debug, Default)]
struct Cached {
    credential: Option<Credential>,
    /// The store has been read at least once
    loaded: bool,
    /// Set by a revoked refresh; cleared by `authorize`
    revoked: Option<String>,
}

/// Single owner of the shared credential
pub struct CredentialCoordinator {
    store: Arc<dyn ICredentialStore>,
    refresher: Arc<dyn ITokenRefresher>,
    refresh_window: Duration,
    cache: RwLock<Cached>,
    refresh_lock: Mutex<()>,
    refreshing: AtomicBool,
}

impl CredentialCoordinator {
    pub fn new(
        store: Arc<dyn ICredentialStore>,
        refresher: Arc<dyn ITokenRefresher>,
        refresh_window: Duration,
    ) -> Self {
        Self {
            store,
            refresher,
            refresh_window,
            cache: RwLock::new(Cached::default()),
            refresh_lock: Mutex::new(()),
            refreshing: AtomicBool::new(false),
        }
    }

    /// Cached credential, reading the store on first use
    async fn current(&self) -> Result<Option<Credential>, CredentialError> {
        {
            let cache = self.cache.read().await;
            if let Some(ref reason) = cache.revoked {
                return Err(CredentialError::ReauthenticationRequired(reason.clone()));
            }
            if cache.loaded {
                return Ok(cache.credential.clone());
            }
        }

        let mut cache = self.cache.write().await;
        if !cache.loaded {
            cache.credential = self
                .store
                .load()
                .await
                .map_err(|e| CredentialError::Store(format!("{e:#}")))?;
            cache.loaded = true;
            debug!(found = cache.credential.is_some(), "Loaded stored credential");
        }
        Ok(cache.credential.clone())
    }

    fn is_fresh(&self, credential: &Credential) -> bool {
        !credential.expires_within(self.refresh_window, Utc::now())
    }

    /// Returns an access token valid beyond the refresh window
    ///
    /// Refreshes at most once at a time; concurrent callers share the
    /// result. A transient refresh failure still returns the cached token
    /// if it has not actually expired yet.
    pub async fn get_valid_credential(&self) -> Result<Credential, CredentialError> {
        let credential = self
            .current()
            .await?
            .ok_or(CredentialError::NotAuthenticated)?;
        if self.is_fresh(&credential) {
            return Ok(credential);
        }

        let _guard = self.refresh_lock.lock().await;

        // Another caller may have refreshed while we waited
        let credential = self
            .current()
            .await?
            .ok_or(CredentialError::NotAuthenticated)?;
        if self.is_fresh(&credential) {
            debug!("Credential refreshed by a concurrent caller");
            return Ok(credential);
        }

        self.refreshing.store(true, Ordering::Release);
        let result = self.refresher.refresh(credential.refresh_token()).await;
        self.refreshing.store(false, Ordering::Release);

        match result {
            Ok(fresh) => {
                self.store
                    .save(&fresh)
                    .await
                    .map_err(|e| CredentialError::Store(format!("{e:#}")))?;
                let mut cache = self.cache.write().await;
                cache.credential = Some(fresh.clone());
                cache.loaded = true;
                info!(expires_at = %fresh.expires_at(), "Access token refreshed");
                Ok(fresh)
            }
            Err(RefreshError::Revoked(reason)) => {
                warn!(%reason, "Refresh grant revoked; clearing stored credential");
                if let Err(e) = self.store.clear().await {
                    warn!(error = %e, "Failed to clear revoked credential");
                }
                let mut cache = self.cache.write().await;
                cache.credential = None;
                cache.loaded = true;
                cache.revoked = Some(reason.clone());
                Err(CredentialError::ReauthenticationRequired(reason))
            }
            Err(RefreshError::Transient(message)) => {
                if credential.expires_at() > Utc::now() {
                    warn!(%message, "Refresh failed; using the current token until it expires");
                    Ok(credential)
                } else {
                    Err(CredentialError::Refresh(message))
                }
            }
        }
    }

    /// Forces the next caller to refresh if `stale_access_token` is still cached
    ///
    /// Several workers hitting 401 with the same token cause one refresh.
    pub async fn invalidate(&self, stale_access_token: &str) {
        let mut cache = self.cache.write().await;
        let Some(current) = cache.credential.as_ref() else {
            return;
        };
        if current.access_token() != stale_access_token {
            debug!("Credential already replaced; ignoring invalidation");
            return;
        }
        let expired = Credential::new(
            current.access_token(),
            current.refresh_token(),
            Utc::now() - Duration::seconds(1),
        );
        cache.credential = Some(expired);
        info!("Access token rejected by the remote; refresh forced");
    }

    /// Installs a new credential after an interactive login
    pub async fn authorize(&self, credential: Credential) -> Result<(), CredentialError> {
        let _guard = self.refresh_lock.lock().await;
        self.store
            .save(&credential)
            .await
            .map_err(|e| CredentialError::Store(format!("{e:#}")))?;
        let mut cache = self.cache.write().await;
        cache.credential = Some(credential);
        cache.loaded = true;
        cache.revoked = None;
        info!("Credential authorized");
        Ok(())
    }

    /// Removes the stored credential
    pub async fn logout(&self) -> Result<(), CredentialError> {
        let _guard = self.refresh_lock.lock().await;
        self.store
            .clear()
            .await
            .map_err(|e| CredentialError::Store(format!("{e:#}")))?;
        let mut cache = self.cache.write().await;
        *cache = Cached {
            loaded: true,
            ..Cached::default()
        };
        info!("Credential removed");
        Ok(())
    }

    /// Current lifecycle state
    pub async fn state(&self) -> CredentialState {
        if self.refreshing.load(Ordering::Acquire) {
            return CredentialState::Refreshing;
        }
        match self.current().await {
            Ok(Some(credential)) => credential.state_at(self.refresh_window, Utc::now()),
            Ok(None) => CredentialState::Unauthenticated,
            Err(CredentialError::ReauthenticationRequired(_)) => {
                CredentialState::ReauthenticationRequired
            }
            Err(e) => {
                warn!(error = %e, "Cannot read credential state");
                CredentialState::Unauthenticated
            }
        }
    }
}
