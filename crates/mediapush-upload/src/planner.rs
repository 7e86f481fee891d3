//! Disk-aware batch planner
//!
//! A batch is the set of items staged and uploaded in one cycle. Staging
//! copies bytes onto the local volume, so the planner bounds a batch by
//!
//! ```text
//! budget = min(ceiling, free - safety_margin)
//! ```
//!
//! and walks eligible items in priority order (preferred class first, then
//! ascending size), adding each one that still fits. Items too large for
//! `free - safety_margin` on their own are excluded as `insufficient-space`
//! and stay where they are until a later pass finds more room.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use tracing::{debug, info, warn};

use mediapush_core::config::PlannerConfig;
use mediapush_core::domain::{BatchDescriptor, ErrorKind};
use mediapush_core::ports::{IItemStore, ItemFilter, TransitionMetadata};

use crate::UploadError;

/// Reports free bytes on the volume holding a path
pub trait FreeSpaceProbe: Send + Sync {
    fn free_bytes(&self, path: &Path) -> Result<u64, UploadError>;
}

/// `statvfs(3)` probe; measures the nearest existing ancestor of the path
#[derive(Debug, Clone, Copy, Default)]
pub struct StatvfsProbe;

impl StatvfsProbe {
    fn existing_ancestor(path: &Path) -> PathBuf {
        path.ancestors()
            .find(|p| p.exists())
            .map_or_else(|| PathBuf::from("/"), Path::to_path_buf)
    }
}

#[cfg(unix)]
impl FreeSpaceProbe for StatvfsProbe {
    fn free_bytes(&self, path: &Path) -> Result<u64, UploadError> {
        use std::ffi::CString;
        use std::os::unix::ffi::OsStrExt;

        let target = Self::existing_ancestor(path);
        let c_path = CString::new(target.as_os_str().as_bytes()).map_err(|e| {
            UploadError::FreeSpace {
                path: target.clone(),
                source: std::io::Error::new(std::io::ErrorKind::InvalidInput, e),
            }
        })?;

        // SAFETY: c_path is NUL terminated and stat is a valid out-pointer
        let mut stat: libc::statvfs = unsafe { std::mem::zeroed() };
        let rc = unsafe { libc::statvfs(c_path.as_ptr(), &mut stat) };
        if rc != 0 {
            return Err(UploadError::FreeSpace {
                path: target,
                source: std::io::Error::last_os_error(),
            });
        }

        #[allow(clippy::unnecessary_cast)]
        let free = (stat.f_bavail as u64).saturating_mul(stat.f_frsize as u64);
        Ok(free)
    }
}

#[cfg(not(unix))]
impl FreeSpaceProbe for StatvfsProbe {
    fn free_bytes(&self, path: &Path) -> Result<u64, UploadError> {
        Err(UploadError::FreeSpace {
            path: path.to_path_buf(),
            source: std::io::Error::new(
                std::io::ErrorKind::Unsupported,
                "free space probing needs statvfs",
            ),
        })
    }
}

/// Budget arithmetic, separated from I/O
pub fn compute_budget(config: &PlannerConfig, free_bytes: u64) -> (u64, u64) {
    let usable = free_bytes.saturating_sub(config.safety_margin_bytes());
    let budget = config.ceiling.bytes(free_bytes).min(usable);
    (usable, budget)
}

/// Selects disk-bounded batches from the item store
pub struct BatchPlanner {
    store: Arc<dyn IItemStore>,
    probe: Arc<dyn FreeSpaceProbe>,
    config: PlannerConfig,
    staging_dir: PathBuf,
}

impl BatchPlanner {
    pub fn new(
        store: Arc<dyn IItemStore>,
        probe: Arc<dyn FreeSpaceProbe>,
        config: PlannerConfig,
        staging_dir: PathBuf,
    ) -> Self {
        Self {
            store,
            probe,
            config,
            staging_dir,
        }
    }

    /// Computes the next batch without writing anything
    ///
    /// `filter` narrows the candidates (class, status); its preferred class
    /// is replaced by the configured priority.
    #[tracing::instrument(skip(self, filter))]
    pub async fn plan(&self, filter: &ItemFilter) -> Result<BatchDescriptor> {
        let free = self
            .probe
            .free_bytes(&self.staging_dir)
            .context("Failed to measure free space at the staging directory")?;
        let (usable, budget) = compute_budget(&self.config, free);

        let filter = filter
            .clone()
            .with_preferred_class(self.config.priority.preferred_class());
        // Oversized items are skipped over rather than ending the walk, so
        // look further than one batch worth of rows
        let window = self.config.max_items.saturating_mul(4).max(64);
        let candidates = self
            .store
            .select_eligible(&filter, window)
            .await
            .context("Failed to select eligible items")?;

        let mut batch = BatchDescriptor::new(free, budget);
        for item in candidates {
            let size = item.size_bytes();
            let shortfall = if size > usable {
                Some(format!(
                    "{size} bytes needed, {usable} usable after the safety margin"
                ))
            } else if size > budget {
                Some(format!(
                    "{size} bytes needed, above the batch ceiling of {budget} bytes"
                ))
            } else {
                None
            };
            if let Some(message) = shortfall {
                batch.exclude(
                    item.id().clone(),
                    size,
                    ErrorKind::InsufficientSpace.describe(message),
                );
                continue;
            }
            if batch.item_count() >= self.config.max_items {
                break;
            }
            if batch.total_bytes.saturating_add(size) <= budget {
                batch.push(item.id().clone(), size);
            }
        }

        info!(
            batch_id = %batch.id,
            items = batch.item_count(),
            total_bytes = batch.total_bytes,
            free_bytes = free,
            budget_bytes = budget,
            excluded = batch.excluded.len(),
            "Batch planned"
        );
        Ok(batch)
    }

    /// Persists a planned batch and annotates its excluded items
    ///
    /// Empty batches are not recorded.
    pub async fn record(&self, batch: &BatchDescriptor) -> Result<()> {
        for excluded in &batch.excluded {
            let Some(item) = self.store.get(&excluded.item_id).await? else {
                continue;
            };
            let meta = TransitionMetadata::new().with_error(excluded.reason.clone());
            if !self
                .store
                .transition(item.id(), item.status(), item.status(), &meta)
                .await?
            {
                debug!(item_id = %item.id(), "Excluded item changed status; not annotated");
            }
        }

        if batch.is_empty() {
            if !batch.excluded.is_empty() {
                warn!(
                    excluded = batch.excluded.len(),
                    "No item fits the free space budget"
                );
            }
            return Ok(());
        }

        self.store
            .record_batch(batch)
            .await
            .context("Failed to record batch")
    }
}
