//! Upload cycle engine
//!
//! The [`UploadEngine`] runs one upload cycle over the item store: it picks a
//! disk-bounded batch, stages and fingerprints it, filters duplicates and
//! hands the rest to the [`UploadOrchestrator`].
//!
//! ## Cycle Flow
//!
//! 1. **Requeue** (optional): `failed → pending` for the retry sweep
//! 2. **Pre-pass**: fingerprint `staged` items that have no fingerprint yet
//! 3. **Plan**: select and record a batch within the free-space budget
//! 4. **Stage**: export the batch's `pending` items
//! 5. **Fingerprint**: hash the freshly staged copies
//! 6. **Dedup**: skip duplicates of committed items, defer in-batch twins
//! 7. **Upload**: bounded worker pool, two-phase transfer per item
//! 8. **Settle**: re-check deferred twins, release staged copies, close the
//!    batch
//!
//! Cycles are re-entrant: anything left `pending` or `staged` is picked up by
//! the next one.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

use mediapush_core::config::Config;
use mediapush_core::domain::{
    BatchDescriptor, BatchSummary, ErrorKind, ItemId, ItemStatus, MediaClass, MediaItem,
    StatusReason,
};
use mediapush_core::ports::{
    ClassTotal, IItemStore, IMediaAccessor, IRemoteStore, IUploadObserver, ItemFilter, StageOutcome,
    TransitionMetadata, UploadEvent, UpsertReport,
};

use crate::credentials::CredentialCoordinator;
use crate::dedup::{DedupAction, DedupEngine};
use crate::fingerprint::Fingerprinter;
use crate::lock::InstanceLock;
use crate::orchestrator::{
    BatchRun, ItemOutcome, OrchestratorSettings, PauseHandle, UploadOrchestrator,
};
use crate::planner::{BatchPlanner, FreeSpaceProbe};

/// Rows scanned per fingerprint pre-pass
const PREPASS_LIMIT: usize = 1_000;

/// Failed items listed by [`UploadEngine::status`]
const STATUS_FAILED_LIMIT: usize = 50;

// ============================================================================
// Options and reports
// ============================================================================

/// Knobs for one cycle, usually from the command line
#[derive(Debug, Clone, Default)]
pub struct CycleOptions {
    /// Restrict the cycle to photos or videos
    pub media_class: Option<MediaClass>,
    /// Move `failed` items back to `pending` before planning
    pub retry_failed: bool,
    /// Overrides `upload.concurrency`
    pub concurrency: Option<usize>,
}

impl CycleOptions {
    fn filter(&self) -> ItemFilter {
        let filter = ItemFilter::new();
        match self.media_class {
            Some(class) => filter.with_media_class(class),
            None => filter,
        }
    }
}

/// What one cycle did
#[derive(Debug, Clone, Default)]
pub struct CycleReport {
    /// The planned batch; `None` only if the cycle stopped before planning
    pub batch: Option<BatchDescriptor>,
    pub summary: BatchSummary,
    pub fingerprinted: usize,
    pub staged: usize,
    pub still_downloading: usize,
    pub export_failed: usize,
    /// In-batch duplicates held back behind their first twin
    pub deferred: usize,
    /// `failed` items moved back to `pending` by the retry sweep
    pub requeued_failed: u64,
}

/// Snapshot of the item store for reporting
#[derive(Debug, Clone, Default)]
pub struct StatusReport {
    pub by_status: HashMap<ItemStatus, u64>,
    pub pending_by_class: HashMap<MediaClass, ClassTotal>,
    pub committed_by_class: HashMap<MediaClass, ClassTotal>,
    /// Most recently failed items with their terminal reason
    pub failed: Vec<MediaItem>,
    pub needs_review: u64,
    pub last_batch: Option<BatchDescriptor>,
}

impl StatusReport {
    pub fn count(&self, status: ItemStatus) -> u64 {
        self.by_status.get(&status).copied().unwrap_or(0)
    }
}

// ============================================================================
// UploadEngine
// ============================================================================

/// Runs upload cycles against the configured ports
pub struct UploadEngine {
    config: Config,
    store: Arc<dyn IItemStore>,
    accessor: Arc<dyn IMediaAccessor>,
    observer: Arc<dyn IUploadObserver>,
    planner: BatchPlanner,
    dedup: DedupEngine,
    fingerprinter: Fingerprinter,
    orchestrator: UploadOrchestrator,
}

impl UploadEngine {
    pub fn new(
        config: Config,
        store: Arc<dyn IItemStore>,
        accessor: Arc<dyn IMediaAccessor>,
        remote: Arc<dyn IRemoteStore>,
        credentials: Arc<CredentialCoordinator>,
        probe: Arc<dyn FreeSpaceProbe>,
        observer: Arc<dyn IUploadObserver>,
    ) -> Self {
        let planner = BatchPlanner::new(
            store.clone(),
            probe,
            config.planner.clone(),
            config.storage.staging_dir.clone(),
        );
        let dedup = DedupEngine::new(store.clone(), &config.dedup);
        let fingerprinter = Fingerprinter::new(config.dedup.fingerprint_concurrency);
        let orchestrator = UploadOrchestrator::new(
            store.clone(),
            remote,
            credentials,
            observer.clone(),
            OrchestratorSettings::from_config(&config),
        );

        Self {
            config,
            store,
            accessor,
            observer,
            planner,
            dedup,
            fingerprinter,
            orchestrator,
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Takes the single-instance lock on this engine's state database
    pub fn lock(&self) -> Result<InstanceLock> {
        InstanceLock::acquire(&self.config.storage.database_path)
            .context("Failed to lock state database")
    }

    /// Returns items stranded in `uploading` by a crash to `staged`
    ///
    /// Requires the instance lock, so no other process can have one of
    /// those rows in flight.
    pub async fn recover(&self, _lock: &InstanceLock) -> Result<u64> {
        let recovered = self
            .store
            .recover_interrupted()
            .await
            .context("Failed to recover interrupted uploads")?;
        if recovered > 0 {
            info!(recovered, "Recovered interrupted uploads");
        }
        Ok(recovered)
    }

    /// Enumerates the library and records new items as `pending`
    #[tracing::instrument(skip(self))]
    pub async fn scan(&self) -> Result<UpsertReport> {
        let items = self
            .accessor
            .enumerate()
            .await
            .context("Failed to enumerate media library")?;
        let report = self
            .store
            .upsert_many(&items)
            .await
            .context("Failed to record scanned items")?;
        info!(
            found = items.len(),
            inserted = report.inserted,
            updated = report.updated,
            "Library scanned"
        );
        Ok(report)
    }

    /// Computes the next batch without recording or staging anything
    pub async fn plan(&self, options: &CycleOptions) -> Result<BatchDescriptor> {
        self.planner.plan(&options.filter()).await
    }

    /// Moves `failed` items back to `pending`
    pub async fn retry_failed(&self, media_class: Option<MediaClass>) -> Result<u64> {
        let options = CycleOptions {
            media_class,
            ..CycleOptions::default()
        };
        let filter = options.filter().with_status(ItemStatus::Failed);
        let requeued = self
            .store
            .requeue_failed(&filter)
            .await
            .context("Failed to requeue failed items")?;
        info!(requeued, "Failed items returned to pending");
        Ok(requeued)
    }

    /// Gathers counts and recent failures
    pub async fn status(&self) -> Result<StatusReport> {
        let by_status = self.store.total_by_status().await?;
        let pending_by_class = self.store.total_by_class(ItemStatus::Pending).await?;
        let committed_by_class = self.store.total_by_class(ItemStatus::Committed).await?;
        let failed = self
            .store
            .query(
                &ItemFilter::new().with_status(ItemStatus::Failed),
                STATUS_FAILED_LIMIT,
            )
            .await?;
        let needs_review = self
            .store
            .count(&ItemFilter::new().with_needs_review(true))
            .await?;
        let last_batch = self.store.recent_batches(1).await?.into_iter().next();

        Ok(StatusReport {
            by_status,
            pending_by_class,
            committed_by_class,
            failed,
            needs_review,
            last_batch,
        })
    }

    /// Runs one upload cycle
    #[tracing::instrument(skip(self, handle))]
    pub async fn run_cycle(
        &self,
        options: &CycleOptions,
        handle: &PauseHandle,
    ) -> Result<CycleReport> {
        let mut report = CycleReport::default();

        if options.retry_failed {
            report.requeued_failed = self.retry_failed(options.media_class).await?;
        }

        let prepass = self
            .store
            .query(
                &options.filter().with_status(ItemStatus::Staged),
                PREPASS_LIMIT,
            )
            .await?
            .into_iter()
            .filter(|item| item.content_fingerprint().is_none())
            .collect::<Vec<_>>();
        if !prepass.is_empty() {
            debug!(count = prepass.len(), "Fingerprinting previously staged items");
            self.fingerprint_items(prepass, &mut report).await?;
        }

        let batch = self.planner.plan(&options.filter()).await?;
        self.planner.record(&batch).await?;
        if batch.is_empty() {
            info!("Nothing to upload");
            report.batch = Some(batch);
            return Ok(report);
        }

        self.observer.on_event(&UploadEvent::BatchStarted {
            batch_id: batch.id,
            item_count: batch.item_count(),
            total_bytes: batch.total_bytes,
        });

        let mut to_stage = Vec::new();
        let mut ready = Vec::new();
        for id in &batch.item_ids {
            match self.store.get(id).await? {
                Some(item) if item.status() == ItemStatus::Pending => to_stage.push(item),
                Some(item) if item.status() == ItemStatus::Staged => ready.push(item),
                Some(item) => {
                    debug!(item_id = %id, status = %item.status(), "Batch member moved on")
                }
                None => debug!(item_id = %id, "Batch member vanished"),
            }
        }

        let newly_staged = self.stage_items(&to_stage, &mut report).await?;
        ready.extend(self.fingerprint_items(newly_staged, &mut report).await?);

        let mut summary = BatchSummary {
            failed: report.export_failed,
            requeued: report.still_downloading,
            ..BatchSummary::default()
        };

        // Fingerprinting finishes in any order; in-batch dedup keys on plan order
        let position: HashMap<&ItemId, usize> = batch
            .item_ids
            .iter()
            .enumerate()
            .map(|(i, id)| (id, i))
            .collect();
        ready.sort_by_key(|item| position.get(item.id()).copied().unwrap_or(usize::MAX));

        let mut proceed = Vec::with_capacity(ready.len());
        for item in ready {
            if item.content_fingerprint().is_none() {
                continue;
            }
            let verdict = self.dedup.check(&item).await?;
            match self.dedup.apply(&item, &verdict).await? {
                DedupAction::Upload => proceed.push(item),
                DedupAction::Skipped => {
                    summary.skipped += 1;
                    self.settle_skipped(&item).await;
                }
                DedupAction::NotOwned => {}
            }
        }

        let (leaders, deferred) = DedupEngine::partition_in_batch(proceed);
        report.deferred = deferred.len();

        let staged_paths: HashMap<ItemId, PathBuf> = leaders
            .iter()
            .filter_map(|item| Some((item.id().clone(), item.staged_path()?.to_path_buf())))
            .collect();

        let concurrency = options
            .concurrency
            .unwrap_or(self.config.upload.concurrency);
        let run = self
            .orchestrator
            .run_batch(leaders, concurrency, handle)
            .await;
        self.release_finished(&run, &staged_paths).await;

        let twins = self.dedup.resolve_deferred(&deferred).await?;
        for item in &twins.skipped {
            self.settle_skipped(item).await;
        }

        summary.committed += run.summary.committed;
        summary.failed += run.summary.failed;
        summary.requeued += run.summary.requeued + twins.still_staged;
        summary.skipped += twins.skipped.len();
        summary.halted = run.summary.halted;

        self.store
            .complete_batch(&batch.id, &summary)
            .await
            .context("Failed to close batch")?;
        self.observer.on_event(&UploadEvent::BatchFinished {
            batch_id: batch.id,
            summary: summary.clone(),
        });

        report.summary = summary;
        report.batch = Some(batch);
        Ok(report)
    }

    /// Exports pending items; returns the ones now `staged`
    async fn stage_items(
        &self,
        items: &[MediaItem],
        report: &mut CycleReport,
    ) -> Result<Vec<MediaItem>> {
        if items.is_empty() {
            return Ok(Vec::new());
        }

        let outcomes = self
            .accessor
            .stage(items)
            .await
            .context("Failed to stage batch")?;

        let mut staged = Vec::with_capacity(outcomes.len());
        for (id, outcome) in outcomes {
            match outcome {
                StageOutcome::Staged(path) => {
                    let meta = TransitionMetadata::new().with_staged_path(path.clone());
                    if self
                        .notify_transition(&id, ItemStatus::Pending, ItemStatus::Staged, &meta)
                        .await?
                    {
                        report.staged += 1;
                        if let Some(item) = self.store.get(&id).await? {
                            staged.push(item);
                        }
                    } else {
                        // Someone else moved it; drop our copy
                        self.accessor.release(&id, &path).await.ok();
                    }
                }
                StageOutcome::StillDownloading => {
                    debug!(item_id = %id, "Original still downloading; left pending");
                    report.still_downloading += 1;
                }
                StageOutcome::Failed(message) => {
                    warn!(item_id = %id, error = %message, "Export failed");
                    let meta = TransitionMetadata::new()
                        .with_reason(StatusReason::ExportFailed)
                        .with_error(ErrorKind::LocalMissing.describe(message));
                    if self
                        .notify_transition(&id, ItemStatus::Pending, ItemStatus::Failed, &meta)
                        .await?
                    {
                        report.export_failed += 1;
                    }
                }
            }
        }
        Ok(staged)
    }

    /// Fingerprints staged items; returns the updated rows still `staged`
    async fn fingerprint_items(
        &self,
        items: Vec<MediaItem>,
        report: &mut CycleReport,
    ) -> Result<Vec<MediaItem>> {
        let mut tasks = JoinSet::new();
        for item in items {
            let Some(path) = item.staged_path().map(|p| p.to_path_buf()) else {
                continue;
            };
            let fingerprinter = self.fingerprinter.clone();
            tasks.spawn(async move {
                let result = fingerprinter.fingerprint(path, item.media_class()).await;
                (item, result)
            });
        }

        let mut ready = Vec::new();
        while let Some(joined) = tasks.join_next().await {
            let (item, result) = joined.context("Fingerprint task panicked")?;
            match result {
                Ok(fingerprints) => {
                    let mut meta =
                        TransitionMetadata::new().with_content_fingerprint(fingerprints.content);
                    if let Some((hash, dimensions)) = fingerprints.visual {
                        meta = meta.with_visual_fingerprint(hash, dimensions);
                    }
                    if self
                        .store
                        .transition(item.id(), ItemStatus::Staged, ItemStatus::Staged, &meta)
                        .await?
                    {
                        report.fingerprinted += 1;
                        if let Some(updated) = self.store.get(item.id()).await? {
                            ready.push(updated);
                        }
                    }
                }
                Err(e) => {
                    warn!(item_id = %item.id(), error = %e, "Cannot fingerprint staged copy");
                    let meta = TransitionMetadata::new()
                        .with_reason(StatusReason::MissingLocalCopy)
                        .with_error(ErrorKind::LocalMissing.describe(&e))
                        .clearing_staged_path();
                    self.notify_transition(item.id(), ItemStatus::Staged, ItemStatus::Failed, &meta)
                        .await?;
                }
            }
        }
        Ok(ready)
    }

    async fn notify_transition(
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

    /// Reports a dedup skip and drops its staged copy
    async fn settle_skipped(&self, item: &MediaItem) {
        let reason = match self.store.get(item.id()).await {
            Ok(Some(current)) if current.status() == ItemStatus::Skipped => current.status_reason(),
            _ => return,
        };
        self.observer.on_event(&UploadEvent::ItemTransitioned {
            item_id: item.id().clone(),
            from: ItemStatus::Staged,
            to: ItemStatus::Skipped,
            detail: reason.map(|r| r.to_string()),
        });
        if let Some(path) = item.staged_path() {
            if let Err(e) = self.accessor.release(item.id(), path).await {
                warn!(item_id = %item.id(), error = %format!("{e:#}"), "Failed to release staged copy");
            }
        }
    }

    /// Deletes staged copies of items that reached a terminal status
    async fn release_finished(&self, run: &BatchRun, staged_paths: &HashMap<ItemId, PathBuf>) {
        for (id, outcome) in &run.outcomes {
            if !matches!(outcome, ItemOutcome::Committed(_) | ItemOutcome::Failed(_)) {
                continue;
            }
            let Some(path) = staged_paths.get(id) else {
                continue;
            };
            if let Err(e) = self.accessor.release(id, path).await {
                warn!(item_id = %id, error = %format!("{e:#}"), "Failed to release staged copy");
            }
        }
    }
}
