//! Upload orchestrator
//!
//! Drives each staged item through the two-phase transfer with a bounded
//! worker pool. Every worker owns one item end to end; the item store's
//! compare-and-set is the only synchronisation between workers.
//!
//! ## Per-item flow
//!
//! 1. Pre-flight: the staged copy exists and is non-empty, else
//!    `failed`/`missing-local-copy`.
//! 2. Claim: `staged → uploading`. A refused claim means someone else owns
//!    the item (or its content); the worker moves on silently.
//! 3. Phase 1: stream the bytes, receive a transfer token.
//! 4. Phase 2: redeem the token, receive the remote id.
//! 5. `uploading → committed`.
//!
//! ## Failure handling
//!
//! | kind                     | action                                                   |
//! |--------------------------|----------------------------------------------------------|
//! | auth-expired (first)     | invalidate the token, retry the same phase, not counted  |
//! | transient, auth-expired  | back off, retry the same phase up to `max_phase_attempts`|
//! | invalid-transfer-token   | drop the session, restart phase 1, counted               |
//! | client-error             | `failed`/`client-error`                                  |
//! | credential unusable      | `uploading → staged`, halt the batch                     |
//!
//! Counted retries increment `retry_count`; once it exceeds `max_retries`
//! the item fails as `retries-exhausted`. When a phase runs out of attempts
//! the item goes back to `staged` for the next cycle.

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use mediapush_core::config::{Config, TransferConfig};
use mediapush_core::domain::{
    BatchSummary, ErrorKind, ItemId, ItemStatus, MediaItem, RemoteId, StatusReason, TransferToken,
};
use mediapush_core::ports::{
    CommitEntry, IItemStore, IRemoteStore, IUploadObserver, RemoteError, TransferSession,
    TransitionMetadata, UploadEvent, UploadRequest,
};

use crate::credentials::{CredentialCoordinator, CredentialError};
use crate::retry::BackoffSchedule;

// ============================================================================
// PauseHandle
// ============================================================================

/// Cooperative pause and abort for a running batch
///
/// `pause` stops admitting items; in-flight items finish their current
/// phase and return to `staged`. `abort` also cancels in-flight phases.
#[derive(Debug, Clone, Default)]
pub struct PauseHandle {
    pause: CancellationToken,
    abort: CancellationToken,
}

impl PauseHandle {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn pause(&self) {
        if !self.pause.is_cancelled() {
            info!("Pause requested; no new items will start");
        }
        self.pause.cancel();
    }

    /// Pauses and cancels in-flight phases
    pub fn abort(&self) {
        if !self.abort.is_cancelled() {
            info!("Abort requested; cancelling in-flight transfers");
        }
        self.pause.cancel();
        self.abort.cancel();
    }

    pub fn is_paused(&self) -> bool {
        self.pause.is_cancelled()
    }

    pub fn is_aborted(&self) -> bool {
        self.abort.is_cancelled()
    }

    pub async fn paused(&self) {
        self.pause.cancelled().await;
    }

    pub async fn aborted(&self) {
        self.abort.cancelled().await;
    }
}

// ============================================================================
// Settings and results
// ============================================================================

#[derive(Debug, Clone)]
pub struct OrchestratorSettings {
    pub concurrency: usize,
    pub max_retries: u32,
    pub max_phase_attempts: u32,
    pub transfer: TransferConfig,
    pub backoff: BackoffSchedule,
}

impl OrchestratorSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            concurrency: config.upload.concurrency,
            max_retries: config.upload.max_retries,
            max_phase_attempts: config.upload.max_phase_attempts,
            transfer: config.transfer.clone(),
            backoff: BackoffSchedule::from_config(&config.retry),
        }
    }
}

/// Where one item ended up after the batch
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ItemOutcome {
    Committed(RemoteId),
    Failed(StatusReason),
    /// Back in `staged` (or never started) for a later cycle
    Requeued,
    /// Back in `staged` because the credential became unusable
    Halted,
    /// The claim was refused or lost to another owner
    NotClaimed,
}

/// Result of [`UploadOrchestrator::run_batch`]
#[derive(Debug, Clone, Default)]
pub struct BatchRun {
    pub summary: BatchSummary,
    pub outcomes: Vec<(ItemId, ItemOutcome)>,
}

impl BatchRun {
    fn record(&mut self, id: ItemId, outcome: ItemOutcome) {
        match outcome {
            ItemOutcome::Committed(_) => self.summary.committed += 1,
            ItemOutcome::Failed(_) => self.summary.failed += 1,
            ItemOutcome::Requeued => self.summary.requeued += 1,
            ItemOutcome::Halted => {
                self.summary.requeued += 1;
                self.summary.halted = true;
            }
            ItemOutcome::NotClaimed => {}
        }
        self.outcomes.push((id, outcome));
    }

    pub fn outcome(&self, id: &ItemId) -> Option<&ItemOutcome> {
        self.outcomes
            .iter()
            .find(|(item_id, _)| item_id == id)
            .map(|(_, outcome)| outcome)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Transfer,
    Commit,
}

enum PhaseOutput {
    Transferred(TransferToken),
    Committed(RemoteId),
}

enum PhaseFailure {
    Aborted,
    Credential(CredentialError),
    Remote {
        error: RemoteError,
        access_token: String,
    },
}

// ============================================================================
// UploadOrchestrator
// ============================================================================

/// Worker pool driving items from `staged` to a final status
#[derive(Clone)]
pub struct UploadOrchestrator {
    store: Arc<dyn IItemStore>,
    remote: Arc<dyn IRemoteStore>,
    credentials: Arc<CredentialCoordinator>,
    observer: Arc<dyn IUploadObserver>,
    settings: OrchestratorSettings,
}

impl UploadOrchestrator {
    pub fn new(
        store: Arc<dyn IItemStore>,
        remote: Arc<dyn IRemoteStore>,
        credentials: Arc<CredentialCoordinator>,
        observer: Arc<dyn IUploadObserver>,
        settings: OrchestratorSettings,
    ) -> Self {
        Self {
            store,
            remote,
            credentials,
            observer,
            settings,
        }
    }

    pub fn settings(&self) -> &OrchestratorSettings {
        &self.settings
    }

    /// Uploads `items` with at most `concurrency` in flight
    ///
    /// Returns once every admitted worker finished. Items not admitted
    /// because of a pause or a halt are reported as requeued.
    #[tracing::instrument(skip(self, items, handle), fields(items = items.len()))]
    pub async fn run_batch(
        &self,
        items: Vec<MediaItem>,
        concurrency: usize,
        handle: &PauseHandle,
    ) -> BatchRun {
        let permits = Arc::new(Semaphore::new(concurrency.max(1)));
        let halt = Arc::new(AtomicBool::new(false));
        let mut workers = JoinSet::new();
        let mut run = BatchRun::default();

        for item in items {
            let permit = tokio::select! {
                biased;
                _ = handle.paused() => None,
                permit = permits.clone().acquire_owned() => permit.ok(),
            };
            let Some(permit) = permit else {
                run.record(item.id().clone(), ItemOutcome::Requeued);
                continue;
            };
            if halt.load(Ordering::Acquire) {
                run.record(item.id().clone(), ItemOutcome::Requeued);
                continue;
            }

            let worker = self.clone();
            let handle = handle.clone();
            let halt = halt.clone();
            workers.spawn(async move {
                let _permit = permit;
                let id = item.id().clone();
                let outcome = worker.process_item(&item, &handle, &halt).await;
                (id, outcome)
            });
        }

        while let Some(joined) = workers.join_next().await {
            match joined {
                Ok((id, outcome)) => run.record(id, outcome),
                Err(e) => error!(error = %e, "Upload worker panicked"),
            }
        }

        run.summary.halted |= halt.load(Ordering::Acquire);
        info!(
            committed = run.summary.committed,
            failed = run.summary.failed,
            requeued = run.summary.requeued,
            halted = run.summary.halted,
            "Worker pool drained"
        );
        run
    }

    async fn process_item(
        &self,
        item: &MediaItem,
        handle: &PauseHandle,
        halt: &AtomicBool,
    ) -> ItemOutcome {
        match self.upload_item(item, handle, halt).await {
            Ok(outcome) => outcome,
            Err(e) => {
                error!(item_id = %item.id(), error = %format!("{e:#}"), "Item store error during upload");
                // Release the claim if we hold it; recovery covers the rest
                let meta = TransitionMetadata::new()
                    .with_error(ErrorKind::TransientNetwork.describe(format!("{e:#}")));
                self.store
                    .transition(item.id(), ItemStatus::Uploading, ItemStatus::Staged, &meta)
                    .await
                    .ok();
                ItemOutcome::Requeued
            }
        }
    }

    async fn upload_item(
        &self,
        item: &MediaItem,
        handle: &PauseHandle,
        halt: &AtomicBool,
    ) -> Result<ItemOutcome> {
        let id = item.id();

        let Some((staged_path, size_bytes)) = self.preflight(item).await else {
            let message = ErrorKind::LocalMissing.describe(format!(
                "staged copy missing or empty: {}",
                item.staged_path()
                    .map_or_else(|| "<none>".to_string(), |p| p.display().to_string())
            ));
            let meta = TransitionMetadata::new()
                .with_reason(StatusReason::MissingLocalCopy)
                .with_error(message)
                .clearing_staged_path();
            return Ok(
                if self
                    .move_item(id, ItemStatus::Staged, ItemStatus::Failed, &meta)
                    .await?
                {
                    ItemOutcome::Failed(StatusReason::MissingLocalCopy)
                } else {
                    ItemOutcome::NotClaimed
                },
            );
        };

        let claim = TransitionMetadata::new().touching_attempt();
        if !self
            .move_item(id, ItemStatus::Staged, ItemStatus::Uploading, &claim)
            .await?
        {
            debug!(item_id = %id, "Claim refused; item owned elsewhere");
            return Ok(ItemOutcome::NotClaimed);
        }

        let class = self.settings.transfer.size_class(size_bytes);
        let request = UploadRequest {
            path: staged_path,
            file_name: item.file_name().to_string(),
            mime_type: item.mime_type().to_string(),
            size_bytes,
            chunk_size: self.settings.transfer.chunk_bytes(class),
        };
        let timeout = self.settings.transfer.phase_timeout(class);
        let mut session = TransferSession::new(request.chunk_size);

        let mut phase = Phase::Transfer;
        let mut phase_attempts = 0u32;
        let mut auth_retry_used = false;
        let mut retry_count = item.retry_count();

        debug!(item_id = %id, size_bytes, ?class, "Item claimed");

        loop {
            if handle.is_paused() {
                info!(item_id = %id, ?phase, "Paused; returning item to staged");
                return self.hand_back(id, None, ItemOutcome::Requeued).await;
            }

            let failure = match self
                .run_phase(phase, &request, &mut session, timeout, handle)
                .await
            {
                Ok(PhaseOutput::Transferred(token)) => {
                    debug!(item_id = %id, "Phase 1 complete");
                    session.token = Some(token);
                    phase = Phase::Commit;
                    phase_attempts = 0;
                    auth_retry_used = false;
                    continue;
                }
                Ok(PhaseOutput::Committed(remote_id)) => {
                    let meta = TransitionMetadata::new()
                        .with_remote_id(remote_id.clone())
                        .clearing_error()
                        .clearing_staged_path();
                    if self
                        .move_item(id, ItemStatus::Uploading, ItemStatus::Committed, &meta)
                        .await?
                    {
                        info!(item_id = %id, remote_id = %remote_id, "Item committed");
                        return Ok(ItemOutcome::Committed(remote_id));
                    }
                    warn!(item_id = %id, "Item changed status before commit could be recorded");
                    return Ok(ItemOutcome::NotClaimed);
                }
                Err(failure) => failure,
            };

            let (error, access_token) = match failure {
                PhaseFailure::Aborted => {
                    info!(item_id = %id, ?phase, "Aborted; returning item to staged");
                    return self.hand_back(id, None, ItemOutcome::Requeued).await;
                }
                PhaseFailure::Credential(e) if e.requires_login() => {
                    halt.store(true, Ordering::Release);
                    warn!(item_id = %id, error = %e, "Credential unusable; halting batch");
                    let message = ErrorKind::AuthRevoked.describe(&e);
                    return self.hand_back(id, Some(message), ItemOutcome::Halted).await;
                }
                PhaseFailure::Credential(e) => (RemoteError::Network(e.to_string()), None),
                PhaseFailure::Remote {
                    error,
                    access_token,
                } => (error, Some(access_token)),
            };

            let kind = error.kind();
            let message = kind.describe(&error);

            match kind {
                ErrorKind::AuthExpired if !auth_retry_used => {
                    auth_retry_used = true;
                    info!(item_id = %id, ?phase, "Access token rejected; refreshing once");
                    if let Some(ref token) = access_token {
                        self.credentials.invalidate(token).await;
                    }
                    continue;
                }
                ErrorKind::ClientError => {
                    warn!(item_id = %id, ?phase, error = %error, "Remote rejected item");
                    return self
                        .fail(id, StatusReason::ClientError, message)
                        .await;
                }
                ErrorKind::InvalidTransferToken => {
                    info!(item_id = %id, "Transfer token rejected; restarting phase 1");
                    session.reset();
                    phase = Phase::Transfer;
                    phase_attempts = 0;
                    auth_retry_used = false;
                    retry_count += 1;
                    if !self.count_retry(id, &message).await? {
                        return Ok(ItemOutcome::NotClaimed);
                    }
                    if retry_count > self.settings.max_retries {
                        return self
                            .fail(id, StatusReason::RetriesExhausted, message)
                            .await;
                    }
                }
                _ => {
                    phase_attempts += 1;
                    retry_count += 1;
                    if !self.count_retry(id, &message).await? {
                        return Ok(ItemOutcome::NotClaimed);
                    }
                    if retry_count > self.settings.max_retries {
                        warn!(item_id = %id, retry_count, "Retries exhausted");
                        return self
                            .fail(id, StatusReason::RetriesExhausted, message)
                            .await;
                    }
                    if phase_attempts >= self.settings.max_phase_attempts {
                        info!(
                            item_id = %id,
                            ?phase,
                            phase_attempts,
                            "Phase attempts used up; deferring to the next cycle"
                        );
                        return self
                            .hand_back(id, Some(message), ItemOutcome::Requeued)
                            .await;
                    }

                    let delay = self
                        .settings
                        .backoff
                        .delay(phase_attempts - 1, error.retry_after());
                    warn!(
                        item_id = %id,
                        ?phase,
                        attempt = phase_attempts,
                        delay_ms = delay.as_millis() as u64,
                        error = %error,
                        "Transient failure, retrying"
                    );
                    tokio::select! {
                        biased;
                        _ = handle.aborted() => {
                            return self.hand_back(id, None, ItemOutcome::Requeued).await;
                        }
                        _ = tokio::time::sleep(delay) => {}
                    }
                }
            }
        }
    }

    /// Staged path and length when the copy is present and non-empty
    async fn preflight(&self, item: &MediaItem) -> Option<(PathBuf, u64)> {
        let path = item.staged_path()?;
        let metadata = tokio::fs::metadata(path).await.ok()?;
        (metadata.is_file() && metadata.len() > 0).then(|| (path.to_path_buf(), metadata.len()))
    }

    async fn run_phase(
        &self,
        phase: Phase,
        request: &UploadRequest,
        session: &mut TransferSession,
        timeout: Duration,
        handle: &PauseHandle,
    ) -> Result<PhaseOutput, PhaseFailure> {
        let credential = self
            .credentials
            .get_valid_credential()
            .await
            .map_err(PhaseFailure::Credential)?;
        let access_token = credential.access_token().to_string();

        let work = async {
            match phase {
                Phase::Transfer => self
                    .remote
                    .upload_bytes(&access_token, request, session)
                    .await
                    .map(PhaseOutput::Transferred),
                Phase::Commit => {
                    let token = session.token.clone().ok_or_else(|| {
                        RemoteError::InvalidTransferToken("no transfer token held".to_string())
                    })?;
                    let entry = CommitEntry {
                        token,
                        file_name: request.file_name.clone(),
                        description: None,
                    };
                    let mut results = self
                        .remote
                        .commit(&access_token, std::slice::from_ref(&entry))
                        .await?;
                    if results.is_empty() {
                        return Err(RemoteError::Server {
                            status: 200,
                            message: "commit returned no result".to_string(),
                        });
                    }
                    results.swap_remove(0).map(PhaseOutput::Committed)
                }
            }
        };

        let result = tokio::select! {
            biased;
            _ = handle.aborted() => return Err(PhaseFailure::Aborted),
            result = tokio::time::timeout(timeout, work) => result,
        };

        match result {
            Ok(Ok(output)) => Ok(output),
            Ok(Err(error)) => Err(PhaseFailure::Remote {
                error,
                access_token,
            }),
            Err(_) => Err(PhaseFailure::Remote {
                error: RemoteError::Timeout(timeout),
                access_token,
            }),
        }
    }

    /// Applies a transition and reports it to the observer
    async fn move_item(
        &self,
        id: &ItemId,
        from: ItemStatus,
        to: ItemStatus,
        meta: &TransitionMetadata,
    ) -> Result<bool> {
        let applied = self.store.transition(id, from, to, meta).await?;
        if applied && from != to {
            self.observer.on_event(&UploadEvent::ItemTransitioned {
                item_id: id.clone(),
                from,
                to,
                detail: meta
                    .last_error
                    .clone()
                    .or_else(|| meta.status_reason.map(|r| r.to_string())),
            });
        }
        Ok(applied)
    }

    /// Annotates a counted retry; false if the claim was lost
    async fn count_retry(&self, id: &ItemId, message: &str) -> Result<bool> {
        let meta = TransitionMetadata::new()
            .counting_retry()
            .with_error(message);
        self.move_item(id, ItemStatus::Uploading, ItemStatus::Uploading, &meta)
            .await
    }

    async fn hand_back(
        &self,
        id: &ItemId,
        message: Option<String>,
        outcome: ItemOutcome,
    ) -> Result<ItemOutcome> {
        let mut meta = TransitionMetadata::new();
        if let Some(message) = message {
            meta = meta.with_error(message);
        }
        Ok(
            if self
                .move_item(id, ItemStatus::Uploading, ItemStatus::Staged, &meta)
                .await?
            {
                outcome
            } else {
                ItemOutcome::NotClaimed
            },
        )
    }

    async fn fail(
        &self,
        id: &ItemId,
        reason: StatusReason,
        message: String,
    ) -> Result<ItemOutcome> {
        let meta = TransitionMetadata::new()
            .with_reason(reason)
            .with_error(message)
            .clearing_staged_path();
        Ok(
            if self
                .move_item(id, ItemStatus::Uploading, ItemStatus::Failed, &meta)
                .await?
            {
                ItemOutcome::Failed(reason)
            } else {
                ItemOutcome::NotClaimed
            },
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_pause_handle_states() {
        let handle = PauseHandle::new();
        assert!(!handle.is_paused());
        assert!(!handle.is_aborted());

        handle.pause();
        assert!(handle.is_paused());
        assert!(!handle.is_aborted());
        handle.paused().await;

        let handle = PauseHandle::new();
        handle.abort();
        assert!(handle.is_paused());
        assert!(handle.is_aborted());
        handle.aborted().await;
    }

    #[test]
    fn test_batch_run_summary() {
        let mut run = BatchRun::default();
        let id = |s: &str| ItemId::new(s).unwrap();
        run.record(id("a"), ItemOutcome::Committed(RemoteId::new("r").unwrap()));
        run.record(id("b"), ItemOutcome::Failed(StatusReason::ClientError));
        run.record(id("c"), ItemOutcome::Requeued);
        run.record(id("d"), ItemOutcome::Halted);
        run.record(id("e"), ItemOutcome::NotClaimed);

        assert_eq!(
            run.summary,
            BatchSummary {
                committed: 1,
                failed: 1,
                skipped: 0,
                requeued: 2,
                halted: true,
            }
        );
        assert_eq!(run.outcome(&id("e")), Some(&ItemOutcome::NotClaimed));
    }
}
