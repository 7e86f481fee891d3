//! MediaItem domain entity
//!
//! A `MediaItem` is one locally discovered photo or video and its progress
//! toward the remote content store.
//!
//! ## State Machine
//!
//! ```text
//!   ┌─────────┐  export   ┌────────┐  claim   ┌───────────┐  commit  ┌───────────┐
//!   │ Pending │ ────────► │ Staged │ ───────► │ Uploading │ ───────► │ Committed │
//!   └─────────┘           └────────┘ ◄─────── └───────────┘          └───────────┘
//!     ▲   │                 │    pause/abort/     │
//!     │   │ export failed   │    crash recovery   │ client error / exhausted
//!     │   ▼                 ▼                     ▼
//!     │ ┌────────┐   ┌─────────┐            ┌────────┐
//!     │ │ Failed │   │ Skipped │            │ Failed │
//!     │ └────────┘   └─────────┘            └────────┘
//!     └──── manual retry ──┘
//! ```
//!
//! `committed` and `skipped` are terminal. `failed` only leaves through the
//! manual retry sweep.

use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::errors::DomainError;
use super::newtypes::{ContentHash, ItemId, PerceptualHash, RemoteId};

// ============================================================================
// ItemStatus
// ============================================================================

/// Transfer status of a media item
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ItemStatus {
    /// Discovered, not yet exported to staging
    #[default]
    Pending,
    /// A local copy exists at `staged_path`
    Staged,
    /// Claimed by a worker; bytes in flight
    Uploading,
    /// Stored remotely; `remote_id` is set
    Committed,
    /// Gave up; see `status_reason`
    Failed,
    /// Deliberately not uploaded (duplicate)
    Skipped,
}

impl ItemStatus {
    /// All statuses, in lifecycle order
    pub const ALL: [ItemStatus; 6] = [
        ItemStatus::Pending,
        ItemStatus::Staged,
        ItemStatus::Uploading,
        ItemStatus::Committed,
        ItemStatus::Failed,
        ItemStatus::Skipped,
    ];

    /// Returns the lowercase name stored in the database
    pub fn as_str(&self) -> &'static str {
        match self {
            ItemStatus::Pending => "pending",
            ItemStatus::Staged => "staged",
            ItemStatus::Uploading => "uploading",
            ItemStatus::Committed => "committed",
            ItemStatus::Failed => "failed",
            ItemStatus::Skipped => "skipped",
        }
    }

    /// Returns true if no transition leaves this status
    pub fn is_terminal(&self) -> bool {
        matches!(self, ItemStatus::Committed | ItemStatus::Skipped)
    }

    /// Returns true if the planner may pick the item up
    pub fn is_eligible(&self) -> bool {
        matches!(self, ItemStatus::Pending | ItemStatus::Staged)
    }

    /// Checks if moving from `self` to `target` is a legal status change
    ///
    /// Valid transitions:
    /// - Pending -> Staged, Failed (export failed), Skipped
    /// - Staged -> Uploading, Skipped, Failed (local copy missing)
    /// - Uploading -> Committed, Failed, Staged (pause, abort, revoked credential, recovery)
    /// - Failed -> Pending (manual retry)
    ///
    /// Same-status updates are annotations and are handled by the store,
    /// not by this table.
    pub fn can_transition_to(&self, target: ItemStatus) -> bool {
        use ItemStatus::*;
        matches!(
            (self, target),
            (Pending, Staged)
                | (Pending, Failed)
                | (Pending, Skipped)
                | (Staged, Uploading)
                | (Staged, Skipped)
                | (Staged, Failed)
                | (Uploading, Committed)
                | (Uploading, Failed)
                | (Uploading, Staged)
                | (Failed, Pending)
        )
    }

    /// Validates a transition, treating `from == to` as an annotation
    ///
    /// # Errors
    ///
    /// Returns `DomainError::InvalidState` if the state machine forbids it.
    pub fn check_transition(&self, target: ItemStatus) -> Result<(), DomainError> {
        if *self == target || self.can_transition_to(target) {
            Ok(())
        } else {
            Err(DomainError::InvalidState {
                from: self.as_str().to_string(),
                to: target.as_str().to_string(),
            })
        }
    }
}

impl fmt::Display for ItemStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ItemStatus {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(ItemStatus::Pending),
            "staged" => Ok(ItemStatus::Staged),
            "uploading" => Ok(ItemStatus::Uploading),
            "committed" => Ok(ItemStatus::Committed),
            "failed" => Ok(ItemStatus::Failed),
            "skipped" => Ok(ItemStatus::Skipped),
            other => Err(DomainError::UnknownValue {
                kind: "status",
                value: other.to_string(),
            }),
        }
    }
}

// ============================================================================
// StatusReason
// ============================================================================

/// Machine-readable reason attached to `failed` and `skipped` items
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum StatusReason {
    /// Byte-identical content already committed
    DuplicateExact,
    /// Visually near-identical image already committed
    DuplicateVisual,
    /// Staged copy vanished or is empty
    MissingLocalCopy,
    /// The remote rejected the item permanently
    ClientError,
    /// Transient failures exceeded the retry ceiling
    RetriesExhausted,
    /// The accessor could not export the item
    ExportFailed,
}

impl StatusReason {
    /// Returns the stable kebab-case name
    pub fn as_str(&self) -> &'static str {
        match self {
            StatusReason::DuplicateExact => "duplicate-exact",
            StatusReason::DuplicateVisual => "duplicate-visual",
            StatusReason::MissingLocalCopy => "missing-local-copy",
            StatusReason::ClientError => "client-error",
            StatusReason::RetriesExhausted => "retries-exhausted",
            StatusReason::ExportFailed => "export-failed",
        }
    }
}

impl fmt::Display for StatusReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for StatusReason {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "duplicate-exact" => Ok(StatusReason::DuplicateExact),
            "duplicate-visual" => Ok(StatusReason::DuplicateVisual),
            "missing-local-copy" => Ok(StatusReason::MissingLocalCopy),
            "client-error" => Ok(StatusReason::ClientError),
            "retries-exhausted" => Ok(StatusReason::RetriesExhausted),
            "export-failed" => Ok(StatusReason::ExportFailed),
            other => Err(DomainError::UnknownValue {
                kind: "status reason",
                value: other.to_string(),
            }),
        }
    }
}

// ============================================================================
// MediaClass / SizeClass / PixelDimensions
// ============================================================================

/// Kind of media
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MediaClass {
    Photo,
    Video,
}

impl MediaClass {
    /// Returns the lowercase name stored in the database
    pub fn as_str(&self) -> &'static str {
        match self {
            MediaClass::Photo => "photo",
            MediaClass::Video => "video",
        }
    }

    /// Guess the class from a MIME type
    pub fn from_mime(mime: &str) -> Option<Self> {
        if mime.starts_with("image/") {
            Some(MediaClass::Photo)
        } else if mime.starts_with("video/") {
            Some(MediaClass::Video)
        } else {
            None
        }
    }
}

impl fmt::Display for MediaClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MediaClass {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "photo" => Ok(MediaClass::Photo),
            "video" => Ok(MediaClass::Video),
            other => Err(DomainError::UnknownValue {
                kind: "media class",
                value: other.to_string(),
            }),
        }
    }
}

/// Transfer size class; picks chunk size and per-phase timeout
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SizeClass {
    Small,
    Large,
}

impl SizeClass {
    /// Classify a payload; sizes strictly above the threshold are large
    pub fn for_size(size_bytes: u64, large_threshold_bytes: u64) -> Self {
        if size_bytes > large_threshold_bytes {
            SizeClass::Large
        } else {
            SizeClass::Small
        }
    }
}

/// Pixel size of an image
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PixelDimensions {
    pub width: u32,
    pub height: u32,
}

impl PixelDimensions {
    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }
}

impl fmt::Display for PixelDimensions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

// ============================================================================
// MediaItem
// ============================================================================

/// One photo or video tracked by the item store
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MediaItem {
    /// Stable accessor identifier
    id: ItemId,
    /// SHA-256 of the bytes, once computed
    content_fingerprint: Option<ContentHash>,
    /// dHash of the image, once computed
    perceptual_fingerprint: Option<PerceptualHash>,
    /// Image dimensions, alongside the perceptual fingerprint
    pixel_dimensions: Option<PixelDimensions>,
    /// Permanent reference to the original (path or library URI)
    source_locator: String,
    /// Temporary exported copy, set while staged
    staged_path: Option<PathBuf>,
    size_bytes: u64,
    media_class: MediaClass,
    mime_type: String,
    /// Capture/creation time reported by the accessor
    created_at: DateTime<Utc>,
    status: ItemStatus,
    status_reason: Option<StatusReason>,
    retry_count: u32,
    last_attempt_at: Option<DateTime<Utc>>,
    last_error: Option<String>,
    /// Set only while `status == Committed`
    remote_id: Option<RemoteId>,
    /// A near-duplicate was found and the policy let the item through
    needs_review: bool,
    updated_at: DateTime<Utc>,
}

impl MediaItem {
    /// Creates a freshly discovered item in `pending`
    pub fn new(
        id: ItemId,
        source_locator: impl Into<String>,
        size_bytes: u64,
        media_class: MediaClass,
        mime_type: impl Into<String>,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            content_fingerprint: None,
            perceptual_fingerprint: None,
            pixel_dimensions: None,
            source_locator: source_locator.into(),
            staged_path: None,
            size_bytes,
            media_class,
            mime_type: mime_type.into(),
            created_at,
            status: ItemStatus::Pending,
            status_reason: None,
            retry_count: 0,
            last_attempt_at: None,
            last_error: None,
            remote_id: None,
            needs_review: false,
            updated_at: Utc::now(),
        }
    }

    // --- Getters ---

    pub fn id(&self) -> &ItemId {
        &self.id
    }

    pub fn content_fingerprint(&self) -> Option<&ContentHash> {
        self.content_fingerprint.as_ref()
    }

    pub fn perceptual_fingerprint(&self) -> Option<PerceptualHash> {
        self.perceptual_fingerprint
    }

    pub fn pixel_dimensions(&self) -> Option<PixelDimensions> {
        self.pixel_dimensions
    }

    pub fn source_locator(&self) -> &str {
        &self.source_locator
    }

    pub fn staged_path(&self) -> Option<&Path> {
        self.staged_path.as_deref()
    }

    pub fn size_bytes(&self) -> u64 {
        self.size_bytes
    }

    pub fn media_class(&self) -> MediaClass {
        self.media_class
    }

    pub fn mime_type(&self) -> &str {
        &self.mime_type
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn status(&self) -> ItemStatus {
        self.status
    }

    pub fn status_reason(&self) -> Option<StatusReason> {
        self.status_reason
    }

    pub fn retry_count(&self) -> u32 {
        self.retry_count
    }

    pub fn last_attempt_at(&self) -> Option<DateTime<Utc>> {
        self.last_attempt_at
    }

    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    pub fn remote_id(&self) -> Option<&RemoteId> {
        self.remote_id.as_ref()
    }

    pub fn needs_review(&self) -> bool {
        self.needs_review
    }

    pub fn updated_at(&self) -> DateTime<Utc> {
        self.updated_at
    }

    /// File name sent to the remote store, derived from the locator
    pub fn file_name(&self) -> &str {
        self.source_locator
            .rsplit(['/', '\\'])
            .next()
            .filter(|name| !name.is_empty())
            .unwrap_or_else(|| self.id.as_str())
    }

    /// Returns true if the item is an image with both visual fingerprint parts
    pub fn has_visual_fingerprint(&self) -> bool {
        self.perceptual_fingerprint.is_some() && self.pixel_dimensions.is_some()
    }

    // --- Builders used when rehydrating rows ---

    #[must_use]
    pub fn with_status(mut self, status: ItemStatus) -> Self {
        self.status = status;
        self
    }

    #[must_use]
    pub fn with_status_reason(mut self, reason: Option<StatusReason>) -> Self {
        self.status_reason = reason;
        self
    }

    #[must_use]
    pub fn with_content_fingerprint(mut self, hash: Option<ContentHash>) -> Self {
        self.content_fingerprint = hash;
        self
    }

    #[must_use]
    pub fn with_visual_fingerprint(
        mut self,
        hash: Option<PerceptualHash>,
        dimensions: Option<PixelDimensions>,
    ) -> Self {
        self.perceptual_fingerprint = hash;
        self.pixel_dimensions = dimensions;
        self
    }

    #[must_use]
    pub fn with_staged_path(mut self, path: Option<PathBuf>) -> Self {
        self.staged_path = path;
        self
    }

    #[must_use]
    pub fn with_retry_state(
        mut self,
        retry_count: u32,
        last_attempt_at: Option<DateTime<Utc>>,
        last_error: Option<String>,
    ) -> Self {
        self.retry_count = retry_count;
        self.last_attempt_at = last_attempt_at;
        self.last_error = last_error;
        self
    }

    #[must_use]
    pub fn with_remote_id(mut self, remote_id: Option<RemoteId>) -> Self {
        self.remote_id = remote_id;
        self
    }

    #[must_use]
    pub fn with_needs_review(mut self, needs_review: bool) -> Self {
        self.needs_review = needs_review;
        self
    }

    #[must_use]
    pub fn with_updated_at(mut self, updated_at: DateTime<Utc>) -> Self {
        self.updated_at = updated_at;
        self
    }

    /// Checks the `remote_id` iff `committed` invariant
    ///
    /// # Errors
    ///
    /// Returns `DomainError::ValidationFailed` when the invariant is broken.
    pub fn validate(&self) -> Result<(), DomainError> {
        match (self.status, self.remote_id.is_some()) {
            (ItemStatus::Committed, false) => Err(DomainError::ValidationFailed(format!(
                "committed item {} has no remote id",
                self.id
            ))),
            (status, true) if status != ItemStatus::Committed => {
                Err(DomainError::ValidationFailed(format!(
                    "item {} in status {} carries a remote id",
                    self.id, status
                )))
            }
            _ => Ok(()),
        }
    }
}
