//! Duplicate verdicts applied against the real item store

mod common;

use common::Harness;
use mediapush_core::config::DedupConfig;
use mediapush_core::domain::{ItemId, ItemStatus, RemoteId, StatusReason};
use mediapush_core::ports::{IItemStore, TransitionMetadata};
use mediapush_upload::dedup::{DedupAction, DedupEngine, DedupVerdict};

fn id(s: &str) -> ItemId {
    ItemId::new(s).unwrap()
}

/// Commits `a.jpg` with the given bytes
async fn committed(h: &Harness, bytes: &[u8]) {
    h.staged_item("a.jpg", bytes).await;
    let store = &h.store;
    assert!(store
        .transition(
            &id("a.jpg"),
            ItemStatus::Staged,
            ItemStatus::Uploading,
            &TransitionMetadata::new()
        )
        .await
        .unwrap());
    assert!(store
        .transition(
            &id("a.jpg"),
            ItemStatus::Uploading,
            ItemStatus::Committed,
            &TransitionMetadata::new().with_remote_id(RemoteId::new("remote-a").unwrap())
        )
        .await
        .unwrap());
}

fn engine(h: &Harness) -> DedupEngine {
    DedupEngine::new(h.store.clone(), &DedupConfig::default())
}

#[tokio::test]
async fn test_exact_duplicate_is_skipped() {
    let h = Harness::new().await;
    committed(&h, b"same bytes").await;
    let b = h.staged_item("b.jpg", b"same bytes").await;
    let dedup = engine(&h);

    let verdict = dedup.check(&b).await.unwrap();
    assert_eq!(verdict, DedupVerdict::ExactDuplicate { of: id("a.jpg") });
    assert_eq!(dedup.apply(&b, &verdict).await.unwrap(), DedupAction::Skipped);

    let b = h.item("b.jpg").await;
    assert_eq!(b.status(), ItemStatus::Skipped);
    assert_eq!(b.status_reason(), Some(StatusReason::DuplicateExact));
}

#[tokio::test]
async fn test_verdict_on_item_that_left_staged_is_not_counted() {
    let h = Harness::new().await;
    committed(&h, b"same bytes").await;
    let b = h.staged_item("b.jpg", b"same bytes").await;
    let dedup = engine(&h);
    let verdict = dedup.check(&b).await.unwrap();

    // Another owner settles the item first
    assert!(h
        .store
        .transition(
            &id("b.jpg"),
            ItemStatus::Staged,
            ItemStatus::Failed,
            &TransitionMetadata::new().with_reason(StatusReason::MissingLocalCopy)
        )
        .await
        .unwrap());

    assert_eq!(dedup.apply(&b, &verdict).await.unwrap(), DedupAction::NotOwned);
    let b = h.item("b.jpg").await;
    assert_eq!(b.status(), ItemStatus::Failed);
    assert_eq!(b.status_reason(), Some(StatusReason::MissingLocalCopy));
}

#[tokio::test]
async fn test_resolve_deferred_counts_only_applied_skips() {
    let h = Harness::new().await;
    committed(&h, b"same bytes").await;
    let b = h.staged_item("b.jpg", b"same bytes").await;
    let c = h.staged_item("c.jpg", b"same bytes").await;
    let d = h.staged_item("d.jpg", b"other bytes").await;
    assert!(h
        .store
        .transition(
            &id("c.jpg"),
            ItemStatus::Staged,
            ItemStatus::Failed,
            &TransitionMetadata::new().with_reason(StatusReason::MissingLocalCopy)
        )
        .await
        .unwrap());

    let outcome = engine(&h).resolve_deferred(&[b, c, d]).await.unwrap();

    let skipped: Vec<&str> = outcome.skipped.iter().map(|i| i.id().as_str()).collect();
    assert_eq!(skipped, vec!["b.jpg"]);
    assert_eq!(outcome.still_staged, 1);
    assert_eq!(h.item("c.jpg").await.status(), ItemStatus::Failed);
    assert_eq!(h.item("d.jpg").await.status(), ItemStatus::Staged);
}
