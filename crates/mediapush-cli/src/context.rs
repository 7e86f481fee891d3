//! Wiring shared by every command
//!
//! Loads the configuration, opens the state database and assembles the
//! upload engine from the concrete adapters.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{bail, Context, Result};

use mediapush_cache::{DatabasePool, SqliteCredentialStore, SqliteItemStore};
use mediapush_core::config::Config;
use mediapush_core::domain::Credential;
use mediapush_core::ports::{ITokenRefresher, RefreshError};
use mediapush_remote::{OAuthSettings, OAuthTokenRefresher, RemoteStoreProvider};
use mediapush_upload::{
    CredentialCoordinator, LocalDirectoryAccessor, StatvfsProbe, TracingObserver, UploadEngine,
};

/// Loads and validates the configuration
///
/// An explicit `--config` path must exist. The default path is optional,
/// but a file that is present and malformed is still an error.
pub fn load_config(explicit: Option<&Path>) -> Result<(Config, PathBuf)> {
    let (config, path) = match explicit {
        Some(path) => (
            Config::load(path)
                .with_context(|| format!("Failed to load config from {}", path.display()))?,
            path.to_path_buf(),
        ),
        None => {
            let path = Config::default_path();
            let config = if path.exists() {
                Config::load(&path)
                    .with_context(|| format!("Failed to load config from {}", path.display()))?
            } else {
                Config::default()
            };
            (config, path)
        }
    };

    let errors = config.validate();
    if !errors.is_empty() {
        let details: Vec<String> = errors.iter().map(ToString::to_string).collect();
        bail!(
            "Invalid configuration in {}:\n  {}",
            path.display(),
            details.join("\n  ")
        );
    }

    Ok((config, path))
}

/// Refresher for commands that never contact the content store
struct OfflineRefresher;

#[async_trait::async_trait]
impl ITokenRefresher for OfflineRefresher {
    async fn refresh(&self, _refresh_token: &str) -> Result<Credential, RefreshError> {
        Err(RefreshError::Transient(
            "token refresh is not available for this command".to_string(),
        ))
    }
}

/// Opened database plus configuration
pub struct AppContext {
    config: Config,
    db: DatabasePool,
}

impl AppContext {
    pub async fn open(config: Config) -> Result<Self> {
        let db = DatabasePool::new(&config.storage.database_path)
            .await
            .context("Failed to open state database")?;
        Ok(Self { config, db })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn item_store(&self) -> Arc<SqliteItemStore> {
        Arc::new(SqliteItemStore::new(self.db.pool().clone()))
    }

    /// OAuth settings; fails when `auth.client_id` is unset
    pub fn oauth_settings(&self) -> Result<OAuthSettings> {
        OAuthSettings::from_config(&self.config.auth)
    }

    /// Coordinator that refreshes against the token endpoint
    pub fn credentials(&self) -> Result<Arc<CredentialCoordinator>> {
        let settings = self.oauth_settings()?;
        let refresher = OAuthTokenRefresher::new(&settings)?;
        Ok(self.coordinator(Arc::new(refresher)))
    }

    /// Coordinator for local-only commands; works without a client id
    pub fn offline_credentials(&self) -> Arc<CredentialCoordinator> {
        self.coordinator(Arc::new(OfflineRefresher))
    }

    fn coordinator(&self, refresher: Arc<dyn ITokenRefresher>) -> Arc<CredentialCoordinator> {
        Arc::new(CredentialCoordinator::new(
            Arc::new(SqliteCredentialStore::new(self.db.pool().clone())),
            refresher,
            self.config.auth.refresh_window(),
        ))
    }

    /// Engine over a library directory
    ///
    /// Source locators are absolute, so commands that do not enumerate may
    /// pass any root.
    pub fn engine(
        &self,
        library_root: PathBuf,
        credentials: Arc<CredentialCoordinator>,
    ) -> UploadEngine {
        let accessor =
            LocalDirectoryAccessor::new(library_root, self.config.storage.staging_dir.clone());
        UploadEngine::new(
            self.config.clone(),
            self.item_store(),
            Arc::new(accessor),
            Arc::new(RemoteStoreProvider::from_config(&self.config.remote)),
            credentials,
            Arc::new(StatvfsProbe),
            Arc::new(TracingObserver),
        )
    }

    /// Engine for commands that only read or reshuffle local state
    pub fn local_engine(&self) -> UploadEngine {
        self.engine(PathBuf::from("."), self.offline_credentials())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_load_config_missing_explicit_path_fails() {
        let dir = tempfile::TempDir::new().unwrap();
        let result = load_config(Some(&dir.path().join("absent.yaml")));
        assert!(result.is_err());
    }

    #[test]
    fn test_load_config_rejects_invalid_values() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("config.yaml");
        std::fs::write(&path, "upload:\n  concurrency: 0\n").unwrap();

        let err = load_config(Some(&path)).unwrap_err();
        assert!(err.to_string().contains("Invalid configuration"));
    }

    #[test]
    fn test_load_config_reads_overrides() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("config.yaml");
        std::fs::write(&path, "upload:\n  concurrency: 4\n").unwrap();

        let (config, loaded_from) = load_config(Some(&path)).unwrap();
        assert_eq!(config.upload.concurrency, 4);
        assert_eq!(loaded_from, path);
    }

    #[tokio::test]
    async fn test_offline_credentials_need_no_client_id() {
        let dir = tempfile::TempDir::new().unwrap();
        let mut config = Config::default();
        config.storage.database_path = dir.path().join("state.db");
        config.storage.staging_dir = dir.path().join("staging");

        let ctx = AppContext::open(config).await.unwrap();
        assert!(ctx.credentials().is_err());
        let state = ctx.offline_credentials().state().await;
        assert_eq!(state.as_str(), "unauthenticated");
    }
}
