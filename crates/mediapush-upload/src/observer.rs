//! Observer that forwards upload events to `tracing`

use tracing::{debug, info, warn};

use mediapush_core::domain::ItemStatus;
use mediapush_core::ports::{IUploadObserver, UploadEvent};

#[derive(Debug, Clone, Copy, Default)]
pub struct TracingObserver;

impl IUploadObserver for TracingObserver {
    fn on_event(&self, event: &UploadEvent) {
        match event {
            UploadEvent::BatchStarted {
                batch_id,
                item_count,
                total_bytes,
            } => info!(%batch_id, item_count, total_bytes, "Batch started"),
            UploadEvent::ItemTransitioned {
                item_id,
                from,
                to,
                detail,
            } => match to {
                ItemStatus::Failed => warn!(
                    %item_id,
                    %from,
                    detail = detail.as_deref().unwrap_or(""),
                    "Item failed"
                ),
                ItemStatus::Committed | ItemStatus::Skipped => {
                    info!(%item_id, %from, %to, "Item finished")
                }
                _ => debug!(
                    %item_id,
                    %from,
                    %to,
                    detail = detail.as_deref().unwrap_or(""),
                    "Item transitioned"
                ),
            },
            UploadEvent::BatchFinished { batch_id, summary } => info!(
                %batch_id,
                committed = summary.committed,
                failed = summary.failed,
                skipped = summary.skipped,
                requeued = summary.requeued,
                halted = summary.halted,
                "Batch finished"
            ),
        }
    }
}
