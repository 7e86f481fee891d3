//! Directory-backed media accessor (secondary/driven adapter)
//!
//! Implements [`IMediaAccessor`] over a plain directory tree, which is how
//! the CLI exposes a local library.
//!
//! ## Design Decisions
//!
//! - **Identity**: an item's id is its path relative to the library root,
//!   with `/` separators, so rescanning the same tree is idempotent.
//! - **Classification by extension**: only known photo and video extensions
//!   are enumerated; hidden files and directories are ignored.
//! - **Atomic staging**: copies land in `<staging>/<id>.partial` and are
//!   renamed into place, so a crash never leaves a truncated staged file
//!   under the final name.

use std::io::ErrorKind;
use std::path::{Component, Path, PathBuf};

use anyhow::{bail, Context};
use chrono::{DateTime, Utc};
use tracing::{debug, instrument, warn};

use mediapush_core::domain::{ItemId, MediaClass, MediaItem};
use mediapush_core::ports::{IMediaAccessor, StageOutcome};

/// Extension to MIME type, lowercase
const KNOWN_TYPES: &[(&str, &str)] = &[
    ("jpg", "image/jpeg"),
    ("jpeg", "image/jpeg"),
    ("png", "image/png"),
    ("gif", "image/gif"),
    ("webp", "image/webp"),
    ("heic", "image/heic"),
    ("heif", "image/heif"),
    ("tif", "image/tiff"),
    ("tiff", "image/tiff"),
    ("bmp", "image/bmp"),
    ("dng", "image/x-adobe-dng"),
    ("mp4", "video/mp4"),
    ("mov", "video/quicktime"),
    ("m4v", "video/x-m4v"),
    ("avi", "video/x-msvideo"),
    ("mkv", "video/x-matroska"),
    ("3gp", "video/3gpp"),
    ("webm", "video/webm"),
];

/// MIME type for a file name, if it is a known media type
pub fn mime_for_path(path: &Path) -> Option<&'static str> {
    let ext = path.extension()?.to_str()?.to_ascii_lowercase();
    KNOWN_TYPES
        .iter()
        .find(|(known, _)| *known == ext)
        .map(|(_, mime)| *mime)
}

/// Media library rooted at a directory
#[derive(Debug, Clone)]
pub struct LocalDirectoryAccessor {
    root: PathBuf,
    staging_dir: PathBuf,
}

impl LocalDirectoryAccessor {
    pub fn new(root: impl Into<PathBuf>, staging_dir: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            staging_dir: staging_dir.into(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn staging_dir(&self) -> &Path {
        &self.staging_dir
    }

    fn staged_path_for(&self, id: &ItemId) -> PathBuf {
        self.staging_dir.join(id.as_str())
    }

    /// Walks the tree on the calling thread
    fn walk(root: &Path, staging_dir: &Path) -> anyhow::Result<Vec<MediaItem>> {
        let mut items = Vec::new();
        let mut pending = vec![root.to_path_buf()];

        while let Some(dir) = pending.pop() {
            let entries = match std::fs::read_dir(&dir) {
                Ok(entries) => entries,
                Err(e) if dir.as_path() != root => {
                    warn!(dir = %dir.display(), error = %e, "Skipping unreadable directory");
                    continue;
                }
                Err(e) => {
                    return Err(e)
                        .with_context(|| format!("Failed to read library root {}", root.display()))
                }
            };

            for entry in entries {
                let entry = entry?;
                let path = entry.path();
                if entry.file_name().to_string_lossy().starts_with('.') {
                    continue;
                }
                let file_type = entry.file_type()?;
                if file_type.is_dir() {
                    if path.as_path() != staging_dir {
                        pending.push(path);
                    }
                    continue;
                }
                if !file_type.is_file() {
                    continue;
                }
                let Some(mime) = mime_for_path(&path) else {
                    continue;
                };
                let Some(class) = MediaClass::from_mime(mime) else {
                    continue;
                };
                let Some(id) = relative_id(root, &path) else {
                    debug!(path = %path.display(), "Skipping non UTF-8 path");
                    continue;
                };

                let metadata = entry.metadata()?;
                let created_at = metadata
                    .modified()
                    .map(DateTime::<Utc>::from)
                    .unwrap_or_else(|_| Utc::now());

                items.push(MediaItem::new(
                    ItemId::new(id)?,
                    path.to_string_lossy(),
                    metadata.len(),
                    class,
                    mime,
                    created_at,
                ));
            }
        }

        items.sort_by(|a, b| a.id().cmp(b.id()));
        Ok(items)
    }

    async fn stage_one(&self, item: &MediaItem) -> StageOutcome {
        let source = Path::new(item.source_locator());
        match tokio::fs::metadata(source).await {
            Ok(m) if m.is_file() => {}
            Ok(_) => return StageOutcome::Failed("source is not a regular file".to_string()),
            Err(e) if e.kind() == ErrorKind::NotFound => {
                return StageOutcome::Failed(format!("source missing: {}", source.display()))
            }
            Err(e) => return StageOutcome::Failed(format!("cannot stat source: {e}")),
        }

        let target = self.staged_path_for(item.id());
        let partial = {
            let mut p = target.as_os_str().to_owned();
            p.push(".partial");
            PathBuf::from(p)
        };

        let copy = async {
            if let Some(parent) = target.parent() {
                tokio::fs::create_dir_all(parent).await?;
            }
            tokio::fs::copy(source, &partial).await?;
            tokio::fs::rename(&partial, &target).await
        };

        match copy.await {
            Ok(()) => {
                debug!(item_id = %item.id(), staged = %target.display(), "Item staged");
                StageOutcome::Staged(target)
            }
            Err(e) => {
                tokio::fs::remove_file(&partial).await.ok();
                StageOutcome::Failed(format!("copy to staging failed: {e}"))
            }
        }
    }
}

/// Relative path from `root` with `/` separators
fn relative_id(root: &Path, path: &Path) -> Option<String> {
    let relative = path.strip_prefix(root).ok()?;
    let parts = relative
        .components()
        .map(|c| match c {
            Component::Normal(part) => part.to_str(),
            _ => None,
        })
        .collect::<Option<Vec<_>>>()?;
    Some(parts.join("/"))
}

#[async_trait::async_trait]
impl IMediaAccessor for LocalDirectoryAccessor {
    #[instrument(skip(self), fields(root = %self.root.display()))]
    async fn enumerate(&self) -> anyhow::Result<Vec<MediaItem>> {
        let root = self.root.clone();
        let staging_dir = self.staging_dir.clone();
        let items = tokio::task::spawn_blocking(move || Self::walk(&root, &staging_dir))
            .await
            .context("Library walk task failed")??;
        debug!(count = items.len(), "Library enumerated");
        Ok(items)
    }

    #[instrument(skip(self, items), fields(count = items.len()))]
    async fn stage(&self, items: &[MediaItem]) -> anyhow::Result<Vec<(ItemId, StageOutcome)>> {
        tokio::fs::create_dir_all(&self.staging_dir)
            .await
            .with_context(|| {
                format!(
                    "Failed to create staging directory {}",
                    self.staging_dir.display()
                )
            })?;

        let mut outcomes = Vec::with_capacity(items.len());
        for item in items {
            outcomes.push((item.id().clone(), self.stage_one(item).await));
        }
        Ok(outcomes)
    }

    async fn release(&self, id: &ItemId, staged_path: &Path) -> anyhow::Result<()> {
        if !staged_path.starts_with(&self.staging_dir) {
            bail!(
                "Refusing to delete {} outside the staging directory",
                staged_path.display()
            );
        }
        match tokio::fs::remove_file(staged_path).await {
            Ok(()) => {
                debug!(item_id = %id, "Staged copy released");
                Ok(())
            }
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e).with_context(|| format!("Failed to release {}", staged_path.display())),
        }
    }
}
