//! MediaPush Upload - upload orchestration engine
//!
//! Provides:
//! - Content and perceptual fingerprinting
//! - Exact and visual deduplication
//! - Disk-aware batch planning
//! - Credential refresh coordination
//! - A bounded worker pool driving the two-phase transfer
//!
//! ## Modules
//!
//! - [`engine`] - One upload cycle, end to end
//! - [`orchestrator`] - Per-item state machine and worker pool
//! - [`planner`] - Free-space budget and batch selection
//! - [`dedup`] - Duplicate detection against committed items
//! - [`fingerprint`] - SHA-256 and difference hash computation
//! - [`credentials`] - Shared credential with coalesced refresh
//! - [`retry`] - Backoff schedule
//! - [`filesystem`] - Directory-backed media accessor
//! - [`lock`] - Single-instance guard on the state database
//! - [`observer`] - Tracing observer for progress events

pub mod credentials;
pub mod dedup;
pub mod engine;
pub mod filesystem;
pub mod fingerprint;
pub mod lock;
pub mod observer;
pub mod orchestrator;
pub mod planner;
pub mod retry;

use std::path::PathBuf;

use thiserror::Error;

pub use credentials::{CredentialCoordinator, CredentialError};
pub use engine::{CycleOptions, CycleReport, StatusReport, UploadEngine};
pub use filesystem::LocalDirectoryAccessor;
pub use lock::InstanceLock;
pub use observer::TracingObserver;
pub use orchestrator::{
    BatchRun, ItemOutcome, OrchestratorSettings, PauseHandle, UploadOrchestrator,
};
pub use planner::{BatchPlanner, FreeSpaceProbe, StatvfsProbe};

/// Errors raised by the local side of the upload pipeline
#[derive(Debug, Error)]
pub enum UploadError {
    /// An I/O error occurred while reading or staging a file
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    /// The staged copy is missing or empty
    #[error("Staged copy missing: {0}")]
    MissingLocalCopy(PathBuf),

    /// The image could not be decoded for perceptual hashing
    #[error("Cannot decode image {path}: {message}")]
    ImageDecode { path: PathBuf, message: String },

    /// A blocking fingerprint task panicked or was cancelled
    #[error("Fingerprint task failed: {0}")]
    TaskFailed(String),

    /// Free space at the staging volume could not be determined
    #[error("Cannot measure free space at {path}: {source}")]
    FreeSpace {
        path: PathBuf,
        source: std::io::Error,
    },

    /// Another process holds the state database
    #[error("Another mediapush process is using this database (lock file {0})")]
    AlreadyRunning(PathBuf),

    /// A domain-level error propagated from mediapush-core
    #[error("Domain error: {0}")]
    DomainError(#[from] mediapush_core::domain::DomainError),
}
