//! Item store port (driven/secondary port)
//!
//! This module defines the interface for persisting media items, their
//! transfer status and the batches the planner records.
//!
//! ## Design Notes
//!
//! - Uses `anyhow::Result` because storage errors are adapter-specific
//!   and don't need domain-level classification.
//! - The store is the only writer of item status. Every status change goes
//!   through [`IItemStore::transition`], a compare-and-set that returns
//!   `false` without writing when the row is not in the expected status.
//! - `from == to` is an annotation: metadata only, still guarded by the
//!   status check.

use std::collections::HashMap;
use std::path::PathBuf;

use crate::domain::{
    BatchDescriptor, BatchId, BatchSummary, ContentHash, ItemId, ItemStatus, MediaClass,
    MediaItem, PerceptualHash, PixelDimensions, RemoteId, StatusReason,
};

// ============================================================================
// ItemFilter
// ============================================================================

/// Filter criteria for querying media items
///
/// Empty fields don't filter. Multiple filters are combined with AND logic.
///
/// # Example
///
/// ```
/// use mediapush_core::ports::ItemFilter;
/// use mediapush_core::domain::{ItemStatus, MediaClass};
///
/// // Staged videos, photos ordered after videos
/// let filter = ItemFilter::new()
///     .with_status(ItemStatus::Staged)
///     .with_media_class(MediaClass::Video)
///     .with_preferred_class(MediaClass::Video);
/// assert!(!filter.is_empty());
/// ```
#[derive(Debug, Clone)]
pub struct ItemFilter {
    /// Accept any of these statuses
    pub statuses: Vec<ItemStatus>,
    /// Restrict to one media class
    pub media_class: Option<MediaClass>,
    /// Filter by terminal reason
    pub status_reason: Option<StatusReason>,
    /// Filter by the review flag
    pub needs_review: Option<bool>,
    /// Class ordered first by `select_eligible`
    pub preferred_class: MediaClass,
}

impl Default for ItemFilter {
    fn default() -> Self {
        Self {
            statuses: Vec::new(),
            media_class: None,
            status_reason: None,
            needs_review: None,
            preferred_class: MediaClass::Photo,
        }
    }
}

impl ItemFilter {
    /// Creates a new empty filter (matches all items)
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a status to the accepted set
    pub fn with_status(mut self, status: ItemStatus) -> Self {
        if !self.statuses.contains(&status) {
            self.statuses.push(status);
        }
        self
    }

    pub fn with_media_class(mut self, class: MediaClass) -> Self {
        self.media_class = Some(class);
        self
    }

    pub fn with_status_reason(mut self, reason: StatusReason) -> Self {
        self.status_reason = Some(reason);
        self
    }

    pub fn with_needs_review(mut self, needs_review: bool) -> Self {
        self.needs_review = Some(needs_review);
        self
    }

    pub fn with_preferred_class(mut self, class: MediaClass) -> Self {
        self.preferred_class = class;
        self
    }

    /// Returns true if no filters are set
    pub fn is_empty(&self) -> bool {
        self.statuses.is_empty()
            && self.media_class.is_none()
            && self.status_reason.is_none()
            && self.needs_review.is_none()
    }

    /// Returns true if `item` passes every set criterion
    pub fn matches(&self, item: &MediaItem) -> bool {
        (self.statuses.is_empty() || self.statuses.contains(&item.status()))
            && self.media_class.map_or(true, |c| c == item.media_class())
            && self
                .status_reason
                .map_or(true, |r| item.status_reason() == Some(r))
            && self.needs_review.map_or(true, |n| n == item.needs_review())
    }
}

// ============================================================================
// TransitionMetadata
// ============================================================================

/// Column updates applied together with a status transition
///
/// Unset fields leave the column untouched. When the status actually
/// changes and no reason is given, `status_reason` is cleared.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TransitionMetadata {
    pub content_fingerprint: Option<ContentHash>,
    pub visual_fingerprint: Option<(PerceptualHash, PixelDimensions)>,
    pub staged_path: Option<PathBuf>,
    pub clear_staged_path: bool,
    /// Required when entering `committed`, rejected otherwise
    pub remote_id: Option<RemoteId>,
    pub status_reason: Option<StatusReason>,
    pub last_error: Option<String>,
    pub clear_last_error: bool,
    pub increment_retry: bool,
    pub reset_retry: bool,
    /// Stamp `last_attempt_at` with the current time
    pub touch_attempt: bool,
    pub needs_review: Option<bool>,
}

impl TransitionMetadata {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_content_fingerprint(mut self, hash: ContentHash) -> Self {
        self.content_fingerprint = Some(hash);
        self
    }

    pub fn with_visual_fingerprint(
        mut self,
        hash: PerceptualHash,
        dimensions: PixelDimensions,
    ) -> Self {
        self.visual_fingerprint = Some((hash, dimensions));
        self
    }

    pub fn with_staged_path(mut self, path: PathBuf) -> Self {
        self.staged_path = Some(path);
        self.clear_staged_path = false;
        self
    }

    pub fn clearing_staged_path(mut self) -> Self {
        self.staged_path = None;
        self.clear_staged_path = true;
        self
    }

    pub fn with_remote_id(mut self, remote_id: RemoteId) -> Self {
        self.remote_id = Some(remote_id);
        self
    }

    pub fn with_reason(mut self, reason: StatusReason) -> Self {
        self.status_reason = Some(reason);
        self
    }

    pub fn with_error(mut self, message: impl Into<String>) -> Self {
        self.last_error = Some(message.into());
        self.clear_last_error = false;
        self
    }

    pub fn clearing_error(mut self) -> Self {
        self.last_error = None;
        self.clear_last_error = true;
        self
    }

    /// Counts one more attempt and stamps `last_attempt_at`
    pub fn counting_retry(mut self) -> Self {
        self.increment_retry = true;
        self.touch_attempt = true;
        self
    }

    pub fn resetting_retries(mut self) -> Self {
        self.reset_retry = true;
        self
    }

    pub fn touching_attempt(mut self) -> Self {
        self.touch_attempt = true;
        self
    }

    pub fn with_needs_review(mut self, needs_review: bool) -> Self {
        self.needs_review = Some(needs_review);
        self
    }
}

// ============================================================================
// Results
// ============================================================================

/// Outcome of [`IItemStore::upsert_many`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct UpsertReport {
    pub inserted: u64,
    pub updated: u64,
}

/// Count and byte total of one group
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ClassTotal {
    pub count: u64,
    pub bytes: u64,
}

// ============================================================================
// IItemStore trait
// ============================================================================

/// Port trait for the durable item table
///
/// ## Implementation Notes
///
/// - `transition` must be atomic with respect to concurrent callers: two
///   identical calls racing yield exactly one `true`.
/// - Entering `uploading` requires a content fingerprint and fails (`false`)
///   if another row with the same fingerprint is `uploading` or `committed`.
/// - Transitions the domain state machine forbids are errors, not `false`.
#[async_trait::async_trait]
pub trait IItemStore: Send + Sync {
    /// Inserts new rows; refreshes scan metadata (locator, size, mime,
    /// class, created_at) on existing rows without touching status
    async fn upsert_many(&self, items: &[MediaItem]) -> anyhow::Result<UpsertReport>;

    /// Retrieves an item by id
    async fn get(&self, id: &ItemId) -> anyhow::Result<Option<MediaItem>>;

    /// The committed row with this fingerprint, else the first non-skipped one
    async fn find_by_fingerprint(&self, hash: &ContentHash) -> anyhow::Result<Option<MediaItem>>;

    /// Rows in `pending` or `staged` that pass `filter`, ordered by
    /// preferred class first then ascending size
    async fn select_eligible(
        &self,
        filter: &ItemFilter,
        limit: usize,
    ) -> anyhow::Result<Vec<MediaItem>>;

    /// Compare-and-set status change
    async fn transition(
        &self,
        id: &ItemId,
        from: ItemStatus,
        to: ItemStatus,
        metadata: &TransitionMetadata,
    ) -> anyhow::Result<bool>;

    /// Row counts per status
    async fn total_by_status(&self) -> anyhow::Result<HashMap<ItemStatus, u64>>;

    /// Counts and bytes per class for rows in `status`
    async fn total_by_class(
        &self,
        status: ItemStatus,
    ) -> anyhow::Result<HashMap<MediaClass, ClassTotal>>;

    /// Rows that pass `filter`, most recently updated first
    async fn query(&self, filter: &ItemFilter, limit: usize) -> anyhow::Result<Vec<MediaItem>>;

    /// Number of rows that pass `filter`
    async fn count(&self, filter: &ItemFilter) -> anyhow::Result<u64>;

    /// Committed images with exactly these pixel dimensions and a stored
    /// perceptual fingerprint
    async fn find_committed_images_by_dimensions(
        &self,
        dimensions: PixelDimensions,
    ) -> anyhow::Result<Vec<MediaItem>>;

    /// Persists a freshly planned batch
    async fn record_batch(&self, batch: &BatchDescriptor) -> anyhow::Result<()>;

    /// Marks a batch complete with its outcome counts
    async fn complete_batch(&self, id: &BatchId, summary: &BatchSummary) -> anyhow::Result<()>;

    async fn get_batch(&self, id: &BatchId) -> anyhow::Result<Option<BatchDescriptor>>;

    /// Most recently created batches, newest first
    async fn recent_batches(&self, limit: usize) -> anyhow::Result<Vec<BatchDescriptor>>;

    /// Moves every `uploading` row back to `staged`; run once at startup,
    /// only while holding the single-instance lock on the database
    async fn recover_interrupted(&self) -> anyhow::Result<u64>;

    /// Moves matching `failed` rows to `pending`, resetting `retry_count`
    /// and clearing `status_reason`
    async fn requeue_failed(&self, filter: &ItemFilter) -> anyhow::Result<u64>;
}
