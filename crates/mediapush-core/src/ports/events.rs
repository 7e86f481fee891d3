//! Upload observer port (driving-side notifications)
//!
//! The orchestrator reports progress through [`IUploadObserver`]. Observers
//! are called inline from worker tasks and must not block.

use crate::domain::{BatchId, BatchSummary, ItemId, ItemStatus};

/// Progress event emitted by the upload engine
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UploadEvent {
    BatchStarted {
        batch_id: BatchId,
        item_count: usize,
        total_bytes: u64,
    },
    ItemTransitioned {
        item_id: ItemId,
        from: ItemStatus,
        to: ItemStatus,
        /// `last_error` or terminal reason, when there is one
        detail: Option<String>,
    },
    BatchFinished {
        batch_id: BatchId,
        summary: BatchSummary,
    },
}

/// Port trait for progress observers
pub trait IUploadObserver: Send + Sync {
    fn on_event(&self, event: &UploadEvent);
}

/// Observer that ignores every event
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopObserver;

impl IUploadObserver for NoopObserver {
    fn on_event(&self, _event: &UploadEvent) {}
}
