//! RemoteStoreProvider - IRemoteStore implementation over HTTP
//!
//! Wraps the [`RemoteClient`] and delegates to the [`upload`] and
//! [`commit`] modules to fulfil the [`IRemoteStore`] port contract.
//!
//! Authentication is not handled here: the credential coordinator passes
//! the current access token into every call.

use std::sync::Arc;

use tracing::debug;

use mediapush_core::config::RemoteConfig;
use mediapush_core::domain::{RemoteId, TransferToken};
use mediapush_core::ports::{
    CommitEntry, IRemoteStore, RemoteError, TransferSession, UploadRequest,
};

use crate::client::RemoteClient;
use crate::commit;
use crate::rate_limit::AdaptiveRateLimiter;
use crate::upload;

/// HTTP adapter for the remote content store
pub struct RemoteStoreProvider {
    client: RemoteClient,
}

impl RemoteStoreProvider {
    pub fn new(client: RemoteClient) -> Self {
        Self { client }
    }

    /// Client for `remote.base_url` with a limiter sized from the quotas
    pub fn from_config(config: &RemoteConfig) -> Self {
        let limiter = Arc::new(AdaptiveRateLimiter::from_config(config));
        Self::new(RemoteClient::new(config.base_url.clone()).with_rate_limiter(limiter))
    }

    pub fn client(&self) -> &RemoteClient {
        &self.client
    }
}

#[async_trait::async_trait]
impl IRemoteStore for RemoteStoreProvider {
    async fn upload_bytes(
        &self,
        access_token: &str,
        request: &UploadRequest,
        session: &mut TransferSession,
    ) -> Result<TransferToken, RemoteError> {
        debug!(
            file_name = %request.file_name,
            size_bytes = request.size_bytes,
            single = request.fits_single_request(),
            "Phase 1 starting"
        );
        upload::upload_file(&self.client, access_token, request, session).await
    }

    async fn commit(
        &self,
        access_token: &str,
        entries: &[CommitEntry],
    ) -> Result<Vec<Result<RemoteId, RemoteError>>, RemoteError> {
        commit::commit_items(&self.client, access_token, entries).await
    }
}
