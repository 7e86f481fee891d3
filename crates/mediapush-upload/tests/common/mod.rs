//! Shared fakes and fixtures for the upload integration tests
//!
//! The item store is the real SQLite adapter on an in-memory database; the
//! remote store, token refresher and free-space probe are scripted fakes.

#![allow(dead_code)]

use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::Utc;
use tempfile::TempDir;

use mediapush_cache::{DatabasePool, SqliteItemStore};
use mediapush_core::config::{Config, ConfigBuilder};
use mediapush_core::domain::{
    Credential, ItemId, ItemStatus, MediaClass, MediaItem, RemoteId, TransferToken,
};
use mediapush_core::ports::{
    CommitEntry, ICredentialStore, IItemStore, IRemoteStore, ITokenRefresher, IUploadObserver,
    RefreshError, RemoteError, TransferSession, TransitionMetadata, UploadEvent, UploadRequest,
};
use mediapush_upload::fingerprint::content_hash;
use mediapush_upload::{
    CredentialCoordinator, FreeSpaceProbe, OrchestratorSettings, UploadError, UploadOrchestrator,
};

pub const GB: u64 = 1024 * 1024 * 1024;

// ============================================================================
// FakeRemote
// ============================================================================

/// Remote store answering from scripted queues
///
/// Unscripted uploads return `tok-<n>`; unscripted commits return
/// `remote-<file name>`.
#[derive(Default)]
pub struct FakeRemote {
    uploads: Mutex<VecDeque<Result<(), RemoteError>>>,
    commits: Mutex<VecDeque<Result<(), RemoteError>>>,
    upload_delay: Mutex<Option<Duration>>,
    upload_calls: AtomicUsize,
    commit_calls: AtomicUsize,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
    access_tokens: Mutex<Vec<String>>,
}

impl FakeRemote {
    pub fn script_upload(&self, result: Result<(), RemoteError>) {
        self.uploads.lock().unwrap().push_back(result);
    }

    pub fn script_commit(&self, result: Result<(), RemoteError>) {
        self.commits.lock().unwrap().push_back(result);
    }

    pub fn set_upload_delay(&self, delay: Duration) {
        *self.upload_delay.lock().unwrap() = Some(delay);
    }

    pub fn upload_calls(&self) -> usize {
        self.upload_calls.load(Ordering::SeqCst)
    }

    pub fn commit_calls(&self) -> usize {
        self.commit_calls.load(Ordering::SeqCst)
    }

    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    pub fn access_tokens(&self) -> Vec<String> {
        self.access_tokens.lock().unwrap().clone()
    }
}

#[async_trait::async_trait]
impl IRemoteStore for FakeRemote {
    async fn upload_bytes(
        &self,
        access_token: &str,
        request: &UploadRequest,
        _session: &mut TransferSession,
    ) -> Result<TransferToken, RemoteError> {
        let n = self.upload_calls.fetch_add(1, Ordering::SeqCst) + 1;
        self.access_tokens
            .lock()
            .unwrap()
            .push(access_token.to_string());

        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);
        let delay = *self.upload_delay.lock().unwrap();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        assert!(request.size_bytes > 0);
        let scripted = self.uploads.lock().unwrap().pop_front();
        scripted.unwrap_or(Ok(()))?;
        Ok(TransferToken::new(format!("tok-{n}")).unwrap())
    }

    async fn commit(
        &self,
        access_token: &str,
        entries: &[CommitEntry],
    ) -> Result<Vec<Result<RemoteId, RemoteError>>, RemoteError> {
        self.commit_calls.fetch_add(1, Ordering::SeqCst);
        self.access_tokens
            .lock()
            .unwrap()
            .push(access_token.to_string());

        let mut results = Vec::with_capacity(entries.len());
        for entry in entries {
            let scripted = self.commits.lock().unwrap().pop_front();
            results.push(
                scripted
                    .unwrap_or(Ok(()))
                    .map(|()| RemoteId::new(format!("remote-{}", entry.file_name)).unwrap()),
            );
        }
        Ok(results)
    }
}

// ============================================================================
// Credentials
// ============================================================================

#[derive(Default)]
pub struct MemoryCredentialStore {
    credential: Mutex<Option<Credential>>,
}

impl MemoryCredentialStore {
    pub fn with(credential: Credential) -> Self {
        Self {
            credential: Mutex::new(Some(credential)),
        }
    }

    pub fn stored(&self) -> Option<Credential> {
        self.credential.lock().unwrap().clone()
    }
}

#[async_trait::async_trait]
impl ICredentialStore for MemoryCredentialStore {
    async fn load(&self) -> anyhow::Result<Option<Credential>> {
        Ok(self.credential.lock().unwrap().clone())
    }

    async fn save(&self, credential: &Credential) -> anyhow::Result<()> {
        *self.credential.lock().unwrap() = Some(credential.clone());
        Ok(())
    }

    async fn clear(&self) -> anyhow::Result<()> {
        *self.credential.lock().unwrap() = None;
        Ok(())
    }
}

/// Refresher answering from a script; unscripted calls mint `fresh-<n>`
#[derive(Default)]
pub struct FakeRefresher {
    script: Mutex<VecDeque<RefreshError>>,
    calls: AtomicUsize,
}

impl FakeRefresher {
    pub fn fail_next(&self, error: RefreshError) {
        self.script.lock().unwrap().push_back(error);
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait::async_trait]
impl ITokenRefresher for FakeRefresher {
    async fn refresh(&self, refresh_token: &str) -> Result<Credential, RefreshError> {
        let n = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        if let Some(error) = self.script.lock().unwrap().pop_front() {
            return Err(error);
        }
        Ok(Credential::new(
            format!("fresh-{n}"),
            refresh_token,
            Utc::now() + chrono::Duration::hours(1),
        ))
    }
}

pub fn valid_credential() -> Credential {
    Credential::new(
        "access-1",
        "refresh-1",
        Utc::now() + chrono::Duration::hours(1),
    )
}

// ============================================================================
// Observer and probe
// ============================================================================

#[derive(Default)]
pub struct RecordingObserver {
    events: Mutex<Vec<UploadEvent>>,
}

impl RecordingObserver {
    pub fn events(&self) -> Vec<UploadEvent> {
        self.events.lock().unwrap().clone()
    }

    /// `(from, to)` pairs reported for one item, in order
    pub fn transitions_of(&self, id: &str) -> Vec<(ItemStatus, ItemStatus)> {
        self.events()
            .into_iter()
            .filter_map(|event| match event {
                UploadEvent::ItemTransitioned {
                    item_id, from, to, ..
                } if item_id.as_str() == id => Some((from, to)),
                _ => None,
            })
            .collect()
    }
}

impl IUploadObserver for RecordingObserver {
    fn on_event(&self, event: &UploadEvent) {
        self.events.lock().unwrap().push(event.clone());
    }
}

pub struct FakeProbe(pub u64);

impl FreeSpaceProbe for FakeProbe {
    fn free_bytes(&self, _path: &Path) -> Result<u64, UploadError> {
        Ok(self.0)
    }
}

// ============================================================================
// Harness
// ============================================================================

pub struct Harness {
    _db: DatabasePool,
    pub dir: TempDir,
    pub store: Arc<SqliteItemStore>,
    pub remote: Arc<FakeRemote>,
    pub refresher: Arc<FakeRefresher>,
    pub credential_store: Arc<MemoryCredentialStore>,
    pub credentials: Arc<CredentialCoordinator>,
    pub observer: Arc<RecordingObserver>,
}

impl Harness {
    pub async fn new() -> Self {
        Self::with_credential(valid_credential()).await
    }

    pub async fn with_credential(credential: Credential) -> Self {
        let db = DatabasePool::in_memory()
            .await
            .expect("Failed to create in-memory database");
        let store = Arc::new(SqliteItemStore::new(db.pool().clone()));
        let refresher = Arc::new(FakeRefresher::default());
        let credential_store = Arc::new(MemoryCredentialStore::with(credential));
        let credentials = Arc::new(CredentialCoordinator::new(
            credential_store.clone(),
            refresher.clone(),
            chrono::Duration::seconds(300),
        ));

        Self {
            _db: db,
            dir: TempDir::new().unwrap(),
            store,
            remote: Arc::new(FakeRemote::default()),
            refresher,
            credential_store,
            credentials,
            observer: Arc::new(RecordingObserver::default()),
        }
    }

    pub fn staging_dir(&self) -> PathBuf {
        self.dir.path().join("staging")
    }

    pub fn library_dir(&self) -> PathBuf {
        self.dir.path().join("library")
    }

    /// Config with millisecond backoff and the harness directories
    pub fn config(&self) -> ConfigBuilder {
        ConfigBuilder::new()
            .database_path(self.dir.path().join("unused.db"))
            .staging_dir(self.staging_dir())
            .retry_delays_ms(1, 5)
            .upload_max_retries(5)
            .upload_max_phase_attempts(3)
    }

    pub fn orchestrator(&self, config: &Config) -> UploadOrchestrator {
        UploadOrchestrator::new(
            self.store.clone(),
            self.remote.clone(),
            self.credentials.clone(),
            self.observer.clone(),
            OrchestratorSettings::from_config(config),
        )
    }

    /// Writes a staged copy and records the item as fingerprinted `staged`
    pub async fn staged_item(&self, id: &str, bytes: &[u8]) -> MediaItem {
        let path = self.staging_dir().join(id);
        std::fs::create_dir_all(self.staging_dir()).unwrap();
        std::fs::write(&path, bytes).unwrap();

        let item = MediaItem::new(
            ItemId::new(id).unwrap(),
            format!("/library/{id}"),
            bytes.len() as u64,
            MediaClass::Photo,
            "image/jpeg",
            Utc::now(),
        );
        self.store.upsert_many(&[item]).await.unwrap();

        let meta = TransitionMetadata::new()
            .with_staged_path(path.clone())
            .with_content_fingerprint(content_hash(&path).unwrap());
        assert!(self
            .store
            .transition(
                &ItemId::new(id).unwrap(),
                ItemStatus::Pending,
                ItemStatus::Staged,
                &meta
            )
            .await
            .unwrap());
        self.item(id).await
    }

    pub async fn item(&self, id: &str) -> MediaItem {
        self.store
            .get(&ItemId::new(id).unwrap())
            .await
            .unwrap()
            .unwrap_or_else(|| panic!("item {id} not found"))
    }
}
