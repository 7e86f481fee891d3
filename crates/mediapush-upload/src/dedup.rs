//! Duplicate detection
//!
//! Three checks run before an item is handed to a worker:
//!
//! 1. **Exact**: another item with the same content fingerprint is already
//!    committed. The item is skipped as `duplicate-exact` with no network
//!    call.
//! 2. **Visual**: for images, a committed image with identical pixel
//!    dimensions whose dHash is within `max_hamming_distance` bits. Policy
//!    `skip` skips the item as `duplicate-visual`; policy `warn` lets it
//!    through with `needs_review` set.
//! 3. **In batch**: of several batch members sharing a fingerprint only the
//!    first proceeds. The others are deferred and re-checked once the
//!    workers finish.

use std::collections::HashSet;
use std::sync::Arc;

use anyhow::Result;
use tracing::{debug, info};

use mediapush_core::config::{DedupConfig, VisualPolicy};
use mediapush_core::domain::{ErrorKind, ItemId, ItemStatus, MediaClass, MediaItem, StatusReason};
use mediapush_core::ports::{IItemStore, TransitionMetadata};

/// Outcome of checking one staged item
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DedupVerdict {
    /// Nothing similar is committed
    Unique,
    /// Byte-identical content is committed as `of`
    ExactDuplicate { of: ItemId },
    /// A committed image looks the same
    VisualDuplicate { of: ItemId, distance: u32 },
}

/// What applying a verdict did to the item
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DedupAction {
    /// Still `staged`; hand it to a worker
    Upload,
    /// Moved to `skipped` by this call
    Skipped,
    /// No longer `staged`; another owner moved it first
    NotOwned,
}

/// Deferred in-batch duplicates after the worker pool drained
#[derive(Debug, Default)]
pub struct DeferredOutcome {
    /// Skipped now that their twin is committed
    pub skipped: Vec<MediaItem>,
    /// Left `staged` for the next cycle
    pub still_staged: usize,
}

pub struct DedupEngine {
    store: Arc<dyn IItemStore>,
    policy: VisualPolicy,
    max_distance: u32,
}

impl DedupEngine {
    pub fn new(store: Arc<dyn IItemStore>, config: &DedupConfig) -> Self {
        Self {
            store,
            policy: config.visual_policy,
            max_distance: config.max_hamming_distance,
        }
    }

    /// Committed item with the same content, if any
    async fn committed_twin(&self, item: &MediaItem) -> Result<Option<ItemId>> {
        let Some(hash) = item.content_fingerprint() else {
            return Ok(None);
        };
        Ok(self
            .store
            .find_by_fingerprint(hash)
            .await?
            .filter(|other| other.id() != item.id() && other.status() == ItemStatus::Committed)
            .map(|other| other.id().clone()))
    }

    /// Classifies a fingerprinted item
    pub async fn check(&self, item: &MediaItem) -> Result<DedupVerdict> {
        if let Some(of) = self.committed_twin(item).await? {
            return Ok(DedupVerdict::ExactDuplicate { of });
        }

        if item.media_class() != MediaClass::Photo {
            return Ok(DedupVerdict::Unique);
        }
        let (Some(hash), Some(dimensions)) =
            (item.perceptual_fingerprint(), item.pixel_dimensions())
        else {
            return Ok(DedupVerdict::Unique);
        };

        let closest = self
            .store
            .find_committed_images_by_dimensions(dimensions)
            .await?
            .into_iter()
            .filter(|other| other.id() != item.id())
            .filter_map(|other| {
                let distance = other.perceptual_fingerprint()?.hamming_distance(&hash);
                Some((distance, other.id().clone()))
            })
            .min_by_key(|(distance, _)| *distance);

        Ok(match closest {
            Some((distance, of)) if distance <= self.max_distance => {
                DedupVerdict::VisualDuplicate { of, distance }
            }
            _ => DedupVerdict::Unique,
        })
    }

    /// Records the verdict on a `staged` item
    ///
    /// Only a transition that actually applied counts: if the item left
    /// `staged` meanwhile, its new owner decides what happens to it.
    pub async fn apply(&self, item: &MediaItem, verdict: &DedupVerdict) -> Result<DedupAction> {
        let (meta, target) = match verdict {
            DedupVerdict::Unique => return Ok(DedupAction::Upload),
            DedupVerdict::ExactDuplicate { of } => {
                info!(item_id = %item.id(), duplicate_of = %of, "Skipping exact duplicate");
                let meta = TransitionMetadata::new()
                    .with_reason(StatusReason::DuplicateExact)
                    .with_error(ErrorKind::Duplicate.describe(format!("same content as {of}")))
                    .clearing_staged_path();
                (meta, ItemStatus::Skipped)
            }
            DedupVerdict::VisualDuplicate { of, distance } => match self.policy {
                VisualPolicy::Skip => {
                    info!(
                        item_id = %item.id(),
                        duplicate_of = %of,
                        distance,
                        "Skipping visual duplicate"
                    );
                    let meta = TransitionMetadata::new()
                        .with_reason(StatusReason::DuplicateVisual)
                        .with_error(ErrorKind::Duplicate.describe(format!(
                            "looks like {of} (distance {distance})"
                        )))
                        .clearing_staged_path();
                    (meta, ItemStatus::Skipped)
                }
                VisualPolicy::Warn => {
                    info!(
                        item_id = %item.id(),
                        similar_to = %of,
                        distance,
                        "Near duplicate flagged for review"
                    );
                    (
                        TransitionMetadata::new().with_needs_review(true),
                        ItemStatus::Staged,
                    )
                }
            },
        };

        let applied = self
            .store
            .transition(item.id(), ItemStatus::Staged, target, &meta)
            .await?;
        Ok(match (applied, target) {
            (false, _) => {
                debug!(item_id = %item.id(), "Item left staged before its verdict applied");
                DedupAction::NotOwned
            }
            (true, ItemStatus::Skipped) => DedupAction::Skipped,
            (true, _) => DedupAction::Upload,
        })
    }

    /// Splits a batch into items to upload now and in-batch duplicates
    ///
    /// Order is preserved; the first item per fingerprint leads.
    pub fn partition_in_batch(items: Vec<MediaItem>) -> (Vec<MediaItem>, Vec<MediaItem>) {
        let mut seen = HashSet::new();
        let mut leaders = Vec::with_capacity(items.len());
        let mut deferred = Vec::new();

        for item in items {
            match item.content_fingerprint() {
                Some(hash) if !seen.insert(hash.clone()) => {
                    debug!(item_id = %item.id(), "Deferring in-batch duplicate");
                    deferred.push(item);
                }
                _ => leaders.push(item),
            }
        }
        (leaders, deferred)
    }

    /// Re-checks deferred items after the batch ran
    ///
    /// Items whose content is now committed are skipped; the rest stay
    /// `staged` for the next cycle.
    pub async fn resolve_deferred(&self, deferred: &[MediaItem]) -> Result<DeferredOutcome> {
        let mut outcome = DeferredOutcome::default();
        for item in deferred {
            let Some(of) = self.committed_twin(item).await? else {
                outcome.still_staged += 1;
                continue;
            };
            match self
                .apply(item, &DedupVerdict::ExactDuplicate { of })
                .await?
            {
                DedupAction::Skipped => outcome.skipped.push(item.clone()),
                DedupAction::Upload => outcome.still_staged += 1,
                DedupAction::NotOwned => {}
            }
        }
        Ok(outcome)
    }
}
