//! Batch descriptors recorded by the planner
//!
//! A batch is the disk-bounded set of items selected for one cycle. The
//! descriptor is persisted before any transfer starts so a crash leaves a
//! record of what was attempted.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::newtypes::{BatchId, ItemId};

/// An item the planner left out, and why
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExcludedItem {
    pub item_id: ItemId,
    pub size_bytes: u64,
    /// `<kind>: <message>` line, also written to the item's `last_error`
    pub reason: String,
}

/// Outcome counts written when a batch finishes
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchSummary {
    pub committed: usize,
    pub failed: usize,
    pub skipped: usize,
    /// Items returned to `staged` (pause, abort, revoked credential, deferred)
    pub requeued: usize,
    /// True if the batch stopped admitting items early
    pub halted: bool,
}

impl BatchSummary {
    /// Number of items that reached an outcome, requeued ones included
    pub fn total(&self) -> usize {
        self.committed + self.failed + self.skipped + self.requeued
    }
}

/// The planner's record of one batch
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchDescriptor {
    pub id: BatchId,
    pub created_at: DateTime<Utc>,
    /// Selected items, in planning order
    pub item_ids: Vec<ItemId>,
    pub total_bytes: u64,
    /// Free bytes observed at the staging volume when planning
    pub free_space_bytes: u64,
    /// `min(ceiling, free - margin)`
    pub budget_bytes: u64,
    pub excluded: Vec<ExcludedItem>,
    pub completed_at: Option<DateTime<Utc>>,
    pub summary: Option<BatchSummary>,
}

impl BatchDescriptor {
    pub fn new(free_space_bytes: u64, budget_bytes: u64) -> Self {
        Self {
            id: BatchId::new(),
            created_at: Utc::now(),
            item_ids: Vec::new(),
            total_bytes: 0,
            free_space_bytes,
            budget_bytes,
            excluded: Vec::new(),
            completed_at: None,
            summary: None,
        }
    }

    pub fn item_count(&self) -> usize {
        self.item_ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.item_ids.is_empty()
    }

    pub fn is_complete(&self) -> bool {
        self.completed_at.is_some()
    }

    /// Appends an item; the caller enforces the budget
    pub fn push(&mut self, item_id: ItemId, size_bytes: u64) {
        self.item_ids.push(item_id);
        self.total_bytes = self.total_bytes.saturating_add(size_bytes);
    }

    pub fn exclude(&mut self, item_id: ItemId, size_bytes: u64, reason: impl Into<String>) {
        self.excluded.push(ExcludedItem {
            item_id,
            size_bytes,
            reason: reason.into(),
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_push_accumulates_bytes() {
        let mut batch = BatchDescriptor::new(10_000, 5_000);
        batch.push(ItemId::new("a").unwrap(), 1_000);
        batch.push(ItemId::new("b").unwrap(), 2_500);
        assert_eq!(batch.item_count(), 2);
        assert_eq!(batch.total_bytes, 3_500);
        assert!(!batch.is_complete());
    }

    #[test]
    fn test_exclude_records_reason() {
        let mut batch = BatchDescriptor::new(0, 0);
        batch.exclude(ItemId::new("big").unwrap(), 9, "insufficient-space");
        assert!(batch.is_empty());
        assert_eq!(batch.excluded[0].reason, "insufficient-space");
    }

    #[test]
    fn test_summary_total() {
        let summary = BatchSummary {
            committed: 3,
            failed: 1,
            skipped: 2,
            requeued: 4,
            halted: true,
        };
        assert_eq!(summary.total(), 10);
    }
}
