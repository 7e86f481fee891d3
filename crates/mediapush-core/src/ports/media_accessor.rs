//! Media accessor port (driven/secondary port)
//!
//! The accessor knows where media lives. It enumerates items and exports
//! their bytes to a staging location the orchestrator can read from.

use std::path::{Path, PathBuf};

use crate::domain::{ItemId, MediaItem};

/// Result of exporting one item
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StageOutcome {
    /// A readable copy now exists at this path
    Staged(PathBuf),
    /// The original is still being fetched (e.g. from a cloud library);
    /// the item stays `pending`
    StillDownloading,
    /// Export failed permanently
    Failed(String),
}

/// Port trait for the local media library
#[async_trait::async_trait]
pub trait IMediaAccessor: Send + Sync {
    /// Lists every item the library currently holds, as `pending` items
    async fn enumerate(&self) -> anyhow::Result<Vec<MediaItem>>;

    /// Exports the given items to staging, one outcome per item
    async fn stage(&self, items: &[MediaItem]) -> anyhow::Result<Vec<(ItemId, StageOutcome)>>;

    /// Deletes a staged copy after the item reached a terminal outcome
    async fn release(&self, id: &ItemId, staged_path: &Path) -> anyhow::Result<()>;
}
