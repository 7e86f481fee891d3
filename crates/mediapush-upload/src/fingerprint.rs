//! Content and perceptual fingerprints
//!
//! The content fingerprint is the SHA-256 of the staged bytes, hex encoded.
//! Images additionally get a 64-bit difference hash (dHash): the picture is
//! reduced to a 9x8 grayscale thumbnail and each bit records whether a pixel
//! is brighter than its right-hand neighbour.
//!
//! Hashing is CPU bound and runs on the blocking pool, bounded by its own
//! semaphore so it never competes with transfer workers for permits.

use std::io::Read;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use image::imageops::FilterType;
use image::GrayImage;
use sha2::{Digest, Sha256};
use tokio::sync::Semaphore;
use tracing::debug;

use mediapush_core::domain::{ContentHash, MediaClass, PerceptualHash, PixelDimensions};

use crate::UploadError;

const READ_BUFFER_SIZE: usize = 64 * 1024;

/// Fingerprints computed for one staged file
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Fingerprints {
    pub content: ContentHash,
    /// `None` for videos and for images the decoder cannot read
    pub visual: Option<(PerceptualHash, PixelDimensions)>,
}

/// Streams a file through SHA-256
pub fn content_hash(path: &Path) -> Result<ContentHash, UploadError> {
    let mut file = std::fs::File::open(path)?;
    let mut hasher = Sha256::new();
    let mut buf = vec![0u8; READ_BUFFER_SIZE];
    loop {
        let n = file.read(&mut buf)?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }
    let mut digest = [0u8; 32];
    digest.copy_from_slice(&hasher.finalize());
    Ok(ContentHash::from_digest(digest))
}

/// Difference hash of an already reduced 9x8 grayscale image
fn dhash_bits(thumb: &GrayImage) -> u64 {
    let mut bits = 0u64;
    for y in 0..8 {
        for x in 0..8 {
            let left = thumb.get_pixel(x, y).0[0];
            let right = thumb.get_pixel(x + 1, y).0[0];
            bits = (bits << 1) | u64::from(left > right);
        }
    }
    bits
}

/// Decodes an image and returns its dHash and pixel dimensions
pub fn visual_hash(path: &Path) -> Result<(PerceptualHash, PixelDimensions), UploadError> {
    let decode_error = |message: String| UploadError::ImageDecode {
        path: path.to_path_buf(),
        message,
    };

    let img = image::io::Reader::open(path)?
        .with_guessed_format()?
        .decode()
        .map_err(|e| decode_error(e.to_string()))?;

    let dimensions = PixelDimensions::new(img.width(), img.height());
    let thumb = img.resize_exact(9, 8, FilterType::Triangle).into_luma8();

    Ok((PerceptualHash::from_bits(dhash_bits(&thumb)), dimensions))
}

/// Computes every fingerprint that applies to `class`
pub fn fingerprint_file(path: &Path, class: MediaClass) -> Result<Fingerprints, UploadError> {
    let content = content_hash(path)?;

    let visual = match class {
        MediaClass::Photo => match visual_hash(path) {
            Ok(visual) => Some(visual),
            Err(e) => {
                // HEIC and RAW files land here; exact dedup still applies
                debug!(path = %path.display(), error = %e, "No perceptual fingerprint");
                None
            }
        },
        MediaClass::Video => None,
    };

    Ok(Fingerprints { content, visual })
}

/// Runs fingerprinting on the blocking pool with bounded parallelism
#[derive(Debug, Clone)]
pub struct Fingerprinter {
    permits: Arc<Semaphore>,
}

impl Fingerprinter {
    pub fn new(concurrency: usize) -> Self {
        Self {
            permits: Arc::new(Semaphore::new(concurrency.max(1))),
        }
    }

    /// Fingerprints one staged file
    pub async fn fingerprint(
        &self,
        path: PathBuf,
        class: MediaClass,
    ) -> Result<Fingerprints, UploadError> {
        let _permit = self
            .permits
            .acquire()
            .await
            .map_err(|e| UploadError::TaskFailed(e.to_string()))?;

        tokio::task::spawn_blocking(move || fingerprint_file(&path, class))
            .await
            .map_err(|e| UploadError::TaskFailed(e.to_string()))?
    }
}
