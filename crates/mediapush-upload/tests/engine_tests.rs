//! End-to-end cycle tests for the upload engine
//!
//! A temporary directory plays the media library; staging, fingerprinting
//! and dedup run for real while the remote store is faked.

mod common;

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use image::{Rgb, RgbImage};

use common::{FakeProbe, Harness, GB};
use mediapush_core::config::{Config, DiskCeiling, VisualPolicy};
use mediapush_core::domain::{ItemId, ItemStatus, MediaClass, MediaItem, StatusReason};
use mediapush_core::ports::{IItemStore, TransitionMetadata, UploadEvent};
use mediapush_upload::{
    CycleOptions, LocalDirectoryAccessor, PauseHandle, UploadEngine, UploadError,
};

fn engine(h: &Harness, config: Config, free_bytes: u64) -> UploadEngine {
    UploadEngine::new(
        config,
        h.store.clone(),
        Arc::new(LocalDirectoryAccessor::new(
            h.library_dir(),
            h.staging_dir(),
        )),
        h.remote.clone(),
        h.credentials.clone(),
        Arc::new(FakeProbe(free_bytes)),
        h.observer.clone(),
    )
}

fn write(h: &Harness, name: &str, bytes: &[u8]) {
    let path = h.library_dir().join(name);
    std::fs::create_dir_all(path.parent().unwrap()).unwrap();
    std::fs::write(path, bytes).unwrap();
}

fn write_gradient(path: &Path, tweak: bool) {
    std::fs::create_dir_all(path.parent().unwrap()).unwrap();
    let mut img = RgbImage::from_fn(64, 48, |x, y| Rgb([(x * 4) as u8, (y * 5) as u8, 90]));
    if tweak {
        img.put_pixel(0, 0, Rgb([3, 1, 91]));
    }
    img.save(path).unwrap();
}

fn id(s: &str) -> ItemId {
    ItemId::new(s).unwrap()
}

#[tokio::test]
async fn test_cycle_uploads_library() {
    let h = Harness::new().await;
    write(&h, "a.jpg", b"alpha photo");
    write(&h, "trip/b.mp4", b"video bytes here");
    let engine = engine(&h, h.config().build(), 100 * GB);

    let scanned = engine.scan().await.unwrap();
    assert_eq!(scanned.inserted, 2);

    let report = engine
        .run_cycle(&CycleOptions::default(), &PauseHandle::new())
        .await
        .unwrap();

    assert_eq!(report.staged, 2);
    assert_eq!(report.fingerprinted, 2);
    assert_eq!(report.summary.committed, 2);
    assert_eq!(report.summary.failed, 0);

    let a = h.item("a.jpg").await;
    assert_eq!(a.status(), ItemStatus::Committed);
    assert!(a.content_fingerprint().is_some());
    assert_eq!(h.item("trip/b.mp4").await.status(), ItemStatus::Committed);

    // Staged copies are released after commit
    assert!(!h.staging_dir().join("a.jpg").exists());
    assert!(!h.staging_dir().join("trip/b.mp4").exists());

    let batch = report.batch.unwrap();
    let stored = h.store.get_batch(&batch.id).await.unwrap().unwrap();
    assert!(stored.completed_at.is_some());
    assert_eq!(stored.summary.unwrap().committed, 2);

    let events = h.observer.events();
    assert!(matches!(
        events.first(),
        Some(UploadEvent::BatchStarted { item_count: 2, .. })
    ));
    assert!(matches!(
        events.last(),
        Some(UploadEvent::BatchFinished { .. })
    ));
}

#[tokio::test]
async fn test_rescan_keeps_status() {
    let h = Harness::new().await;
    write(&h, "a.jpg", b"alpha photo");
    let engine = engine(&h, h.config().build(), 100 * GB);

    engine.scan().await.unwrap();
    engine
        .run_cycle(&CycleOptions::default(), &PauseHandle::new())
        .await
        .unwrap();
    let again = engine.scan().await.unwrap();

    assert_eq!(again.inserted, 0);
    assert_eq!(h.item("a.jpg").await.status(), ItemStatus::Committed);
}

#[tokio::test]
async fn test_identical_files_upload_once() {
    let h = Harness::new().await;
    write(&h, "a.jpg", b"the very same bytes");
    write(&h, "b.jpg", b"the very same bytes");
    let engine = engine(&h, h.config().build(), 100 * GB);
    engine.scan().await.unwrap();

    let report = engine
        .run_cycle(&CycleOptions::default(), &PauseHandle::new())
        .await
        .unwrap();

    assert_eq!(report.deferred, 1);
    assert_eq!(report.summary.committed, 1);
    assert_eq!(report.summary.skipped, 1);
    assert_eq!(h.remote.upload_calls(), 1);

    assert_eq!(h.item("a.jpg").await.status(), ItemStatus::Committed);
    let b = h.item("b.jpg").await;
    assert_eq!(b.status(), ItemStatus::Skipped);
    assert_eq!(b.status_reason(), Some(StatusReason::DuplicateExact));
    assert!(b.last_error().unwrap().starts_with("duplicate: "));
    assert!(!h.staging_dir().join("b.jpg").exists());

    // A later copy of the same content is skipped without a network call
    write(&h, "later/c.jpg", b"the very same bytes");
    engine.scan().await.unwrap();
    let report = engine
        .run_cycle(&CycleOptions::default(), &PauseHandle::new())
        .await
        .unwrap();

    assert_eq!(report.summary.skipped, 1);
    assert_eq!(report.summary.committed, 0);
    assert_eq!(h.remote.upload_calls(), 1);
    assert_eq!(
        h.item("later/c.jpg").await.status_reason(),
        Some(StatusReason::DuplicateExact)
    );
}

#[tokio::test]
async fn test_no_room_yields_empty_batch() {
    let h = Harness::new().await;
    let big = MediaItem::new(
        id("huge.mov"),
        "/library/huge.mov",
        2 * GB,
        MediaClass::Video,
        "video/quicktime",
        Utc::now(),
    );
    h.store.upsert_many(&[big]).await.unwrap();
    let engine = engine(&h, h.config().planner_safety_margin_gb(5).build(), 4 * GB);

    let planned = engine.plan(&CycleOptions::default()).await.unwrap();
    assert!(planned.is_empty());
    assert_eq!(planned.excluded.len(), 1);
    assert_eq!(planned.budget_bytes, 0);

    let report = engine
        .run_cycle(&CycleOptions::default(), &PauseHandle::new())
        .await
        .unwrap();

    assert!(report.batch.unwrap().is_empty());
    let item = h.item("huge.mov").await;
    assert_eq!(item.status(), ItemStatus::Pending);
    assert!(item
        .last_error()
        .unwrap()
        .starts_with("insufficient-space: "));
    assert_eq!(h.remote.upload_calls(), 0);
    assert!(h.store.recent_batches(5).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_item_above_ceiling_is_excluded_with_reason() {
    let h = Harness::new().await;
    write(&h, "small.jpg", b"small photo");
    let engine = engine(
        &h,
        h.config()
            .planner_ceiling(DiskCeiling::AbsoluteGb(1))
            .planner_safety_margin_gb(5)
            .build(),
        100 * GB,
    );
    engine.scan().await.unwrap();
    let big = MediaItem::new(
        id("long.mov"),
        "/library/long.mov",
        2 * GB,
        MediaClass::Video,
        "video/quicktime",
        Utc::now(),
    );
    h.store.upsert_many(&[big]).await.unwrap();

    let planned = engine.plan(&CycleOptions::default()).await.unwrap();
    assert_eq!(planned.item_ids, vec![id("small.jpg")]);
    assert_eq!(planned.excluded.len(), 1);
    assert_eq!(planned.excluded[0].item_id, id("long.mov"));
    assert!(planned.excluded[0].reason.contains("ceiling"));

    let report = engine
        .run_cycle(&CycleOptions::default(), &PauseHandle::new())
        .await
        .unwrap();
    assert_eq!(report.summary.committed, 1);

    let item = h.item("long.mov").await;
    assert_eq!(item.status(), ItemStatus::Pending);
    let error = item.last_error().unwrap();
    assert!(error.starts_with("insufficient-space: "));
    assert!(error.contains("ceiling"));
}

#[tokio::test]
async fn test_class_filter_limits_cycle() {
    let h = Harness::new().await;
    write(&h, "a.jpg", b"photo");
    write(&h, "b.mp4", b"video");
    let engine = engine(&h, h.config().build(), 100 * GB);
    engine.scan().await.unwrap();

    let options = CycleOptions {
        media_class: Some(MediaClass::Photo),
        ..CycleOptions::default()
    };
    engine
        .run_cycle(&options, &PauseHandle::new())
        .await
        .unwrap();

    assert_eq!(h.item("a.jpg").await.status(), ItemStatus::Committed);
    assert_eq!(h.item("b.mp4").await.status(), ItemStatus::Pending);
}

#[tokio::test]
async fn test_export_failure_then_retry() {
    let h = Harness::new().await;
    write(&h, "a.jpg", b"photo");
    let engine = engine(&h, h.config().build(), 100 * GB);
    engine.scan().await.unwrap();
    std::fs::remove_file(h.library_dir().join("a.jpg")).unwrap();

    let report = engine
        .run_cycle(&CycleOptions::default(), &PauseHandle::new())
        .await
        .unwrap();

    assert_eq!(report.export_failed, 1);
    assert_eq!(report.summary.failed, 1);
    let item = h.item("a.jpg").await;
    assert_eq!(item.status(), ItemStatus::Failed);
    assert_eq!(item.status_reason(), Some(StatusReason::ExportFailed));

    write(&h, "a.jpg", b"photo");
    let report = engine
        .run_cycle(
            &CycleOptions {
                retry_failed: true,
                ..CycleOptions::default()
            },
            &PauseHandle::new(),
        )
        .await
        .unwrap();

    assert_eq!(report.requeued_failed, 1);
    let item = h.item("a.jpg").await;
    assert_eq!(item.status(), ItemStatus::Committed);
    assert_eq!(item.retry_count(), 0);
}

#[tokio::test]
async fn test_staged_items_without_fingerprint_are_hashed_first() {
    let h = Harness::new().await;
    let engine = engine(&h, h.config().build(), 100 * GB);
    let staged = h.staging_dir().join("old.jpg");
    std::fs::create_dir_all(h.staging_dir()).unwrap();
    std::fs::write(&staged, b"staged by an earlier run").unwrap();
    let item = MediaItem::new(
        id("old.jpg"),
        "/library/old.jpg",
        24,
        MediaClass::Photo,
        "image/jpeg",
        Utc::now(),
    );
    h.store.upsert_many(&[item]).await.unwrap();
    h.store
        .transition(
            &id("old.jpg"),
            ItemStatus::Pending,
            ItemStatus::Staged,
            &TransitionMetadata::new().with_staged_path(staged.clone()),
        )
        .await
        .unwrap();

    let report = engine
        .run_cycle(&CycleOptions::default(), &PauseHandle::new())
        .await
        .unwrap();

    assert_eq!(report.fingerprinted, 1);
    assert_eq!(report.summary.committed, 1);
    assert!(!staged.exists());
}

#[tokio::test]
async fn test_recover_returns_interrupted_items() {
    let h = Harness::new().await;
    let engine = engine(&h, h.config().build(), 100 * GB);
    let item = h.staged_item("a.jpg", b"bytes").await;
    h.store
        .transition(
            item.id(),
            ItemStatus::Staged,
            ItemStatus::Uploading,
            &TransitionMetadata::new(),
        )
        .await
        .unwrap();

    let lock = engine.lock().unwrap();
    assert_eq!(engine.recover(&lock).await.unwrap(), 1);
    assert_eq!(h.item("a.jpg").await.status(), ItemStatus::Staged);
    assert_eq!(engine.recover(&lock).await.unwrap(), 0);
}

#[tokio::test]
async fn test_second_instance_cannot_recover_while_upload_in_flight() {
    let h = Harness::new().await;
    write(&h, "a.jpg", b"photo bytes");
    h.remote.set_upload_delay(Duration::from_millis(300));

    let first = engine(&h, h.config().build(), 100 * GB);
    let second = engine(&h, h.config().build(), 100 * GB);
    let lock = first.lock().unwrap();
    first.recover(&lock).await.unwrap();
    first.scan().await.unwrap();

    let handle = PauseHandle::new();
    let opts = CycleOptions::default();
    let run = first.run_cycle(&opts, &handle);
    let contender = async {
        while h.remote.upload_calls() == 0 {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        assert_eq!(h.item("a.jpg").await.status(), ItemStatus::Uploading);
        let refused = second.lock().unwrap_err();
        assert!(
            matches!(
                refused.downcast_ref::<UploadError>(),
                Some(UploadError::AlreadyRunning(_))
            ),
            "unexpected error: {refused:#}"
        );
        assert_eq!(h.item("a.jpg").await.status(), ItemStatus::Uploading);
    };
    let (report, ()) = tokio::join!(run, contender);

    assert_eq!(report.unwrap().summary.committed, 1);
    assert_eq!(h.remote.upload_calls(), 1);
    assert_eq!(h.remote.commit_calls(), 1);
    assert_eq!(h.item("a.jpg").await.status(), ItemStatus::Committed);

    drop(lock);
    let lock = second.lock().unwrap();
    assert_eq!(second.recover(&lock).await.unwrap(), 0);
}

#[tokio::test]
async fn test_visual_duplicate_flagged_under_warn() {
    let h = Harness::new().await;
    let engine = engine(&h, h.config().build(), 100 * GB);
    write_gradient(&h.library_dir().join("one.png"), false);
    engine.scan().await.unwrap();
    engine
        .run_cycle(&CycleOptions::default(), &PauseHandle::new())
        .await
        .unwrap();
    assert!(h.item("one.png").await.perceptual_fingerprint().is_some());

    write_gradient(&h.library_dir().join("two.png"), true);
    engine.scan().await.unwrap();
    engine
        .run_cycle(&CycleOptions::default(), &PauseHandle::new())
        .await
        .unwrap();

    let two = h.item("two.png").await;
    assert_eq!(two.status(), ItemStatus::Committed);
    assert!(two.needs_review());
    assert_eq!(engine.status().await.unwrap().needs_review, 1);
    assert_eq!(h.remote.upload_calls(), 2);
}

#[tokio::test]
async fn test_visual_duplicate_skipped_under_skip_policy() {
    let h = Harness::new().await;
    let config = h.config().dedup_visual_policy(VisualPolicy::Skip).build();
    let engine = engine(&h, config, 100 * GB);
    write_gradient(&h.library_dir().join("one.png"), false);
    engine.scan().await.unwrap();
    engine
        .run_cycle(&CycleOptions::default(), &PauseHandle::new())
        .await
        .unwrap();

    write_gradient(&h.library_dir().join("two.png"), true);
    engine.scan().await.unwrap();
    engine
        .run_cycle(&CycleOptions::default(), &PauseHandle::new())
        .await
        .unwrap();

    let two = h.item("two.png").await;
    assert_eq!(two.status(), ItemStatus::Skipped);
    assert_eq!(two.status_reason(), Some(StatusReason::DuplicateVisual));
    assert_eq!(h.remote.upload_calls(), 1);
}

#[tokio::test]
async fn test_status_report() {
    let h = Harness::new().await;
    write(&h, "a.jpg", b"photo");
    write(&h, "b.mp4", b"video");
    let engine = engine(&h, h.config().build(), 100 * GB);
    engine.scan().await.unwrap();

    let before = engine.status().await.unwrap();
    assert_eq!(before.count(ItemStatus::Pending), 2);
    assert_eq!(before.pending_by_class[&MediaClass::Photo].count, 1);
    assert_eq!(before.pending_by_class[&MediaClass::Video].bytes, 5);
    assert!(before.last_batch.is_none());

    engine
        .run_cycle(&CycleOptions::default(), &PauseHandle::new())
        .await
        .unwrap();

    let after = engine.status().await.unwrap();
    assert_eq!(after.count(ItemStatus::Committed), 2);
    assert_eq!(after.count(ItemStatus::Pending), 0);
    assert!(after.failed.is_empty());
    assert_eq!(after.last_batch.unwrap().summary.unwrap().committed, 2);
}
