//! Integration tests for SqliteCredentialStore and DatabasePool setup

use chrono::{Duration, SubsecRound, Utc};

use mediapush_cache::{DatabasePool, SqliteCredentialStore};
use mediapush_core::domain::Credential;
use mediapush_core::ports::ICredentialStore;

async fn setup() -> SqliteCredentialStore {
    let pool = DatabasePool::in_memory()
        .await
        .expect("Failed to create in-memory database");
    SqliteCredentialStore::new(pool.pool().clone())
}

#[tokio::test]
async fn test_load_empty() {
    let store = setup().await;
    assert!(store.load().await.unwrap().is_none());
}

#[tokio::test]
async fn test_save_load_and_replace() {
    let store = setup().await;
    let expires = Utc::now().trunc_subsecs(6) + Duration::hours(1);

    store
        .save(&Credential::new("access-1", "refresh-1", expires))
        .await
        .unwrap();
    let loaded = store.load().await.unwrap().unwrap();
    assert_eq!(loaded.access_token(), "access-1");
    assert_eq!(loaded.refresh_token(), "refresh-1");
    assert_eq!(loaded.expires_at(), expires);

    let later = expires + Duration::hours(1);
    store
        .save(&Credential::new("access-2", "refresh-2", later))
        .await
        .unwrap();
    let loaded = store.load().await.unwrap().unwrap();
    assert_eq!(loaded.access_token(), "access-2");
    assert_eq!(loaded.refresh_token(), "refresh-2");
    assert_eq!(loaded.expires_at(), later);
}

#[tokio::test]
async fn test_clear() {
    let store = setup().await;
    store
        .save(&Credential::new("a", "r", Utc::now()))
        .await
        .unwrap();
    store.clear().await.unwrap();
    assert!(store.load().await.unwrap().is_none());

    // Clearing twice is harmless
    store.clear().await.unwrap();
}

#[tokio::test]
async fn test_migrations_recorded_once() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("nested").join("state.db");

    let pool = DatabasePool::new(&path).await.unwrap();
    assert_eq!(pool.applied_migrations().await.unwrap(), vec![1]);
    drop(pool);

    // Reopening applies nothing new and keeps the data
    let pool = DatabasePool::new(&path).await.unwrap();
    assert_eq!(pool.applied_migrations().await.unwrap(), vec![1]);
}

#[cfg(unix)]
#[tokio::test]
async fn test_database_file_is_owner_only() {
    use std::os::unix::fs::PermissionsExt;

    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("state.db");
    let _pool = DatabasePool::new(&path).await.unwrap();

    let mode = std::fs::metadata(&path).unwrap().permissions().mode();
    assert_eq!(mode & 0o777, 0o600);
}

#[tokio::test]
async fn test_credential_survives_reopen() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("state.db");
    let expires = Utc::now().trunc_subsecs(6) + Duration::minutes(30);

    {
        let pool = DatabasePool::new(&path).await.unwrap();
        let store = SqliteCredentialStore::new(pool.pool().clone());
        store
            .save(&Credential::new("access", "refresh", expires))
            .await
            .unwrap();
        pool.pool().close().await;
    }

    let pool = DatabasePool::new(&path).await.unwrap();
    let store = SqliteCredentialStore::new(pool.pool().clone());
    let loaded = store.load().await.unwrap().unwrap();
    assert_eq!(loaded.refresh_token(), "refresh");
    assert_eq!(loaded.expires_at(), expires);
}
