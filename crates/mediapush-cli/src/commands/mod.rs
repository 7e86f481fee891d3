//! Subcommand implementations
//!
//! Each command owns its arguments and an `execute` method taking the
//! shared [`crate::context::AppContext`].

pub mod auth;
pub mod plan;
pub mod retry;
pub mod scan;
pub mod status;
pub mod upload;

use clap::Args;
use mediapush_core::domain::MediaClass;

/// `--photos-only` / `--videos-only`
#[derive(Debug, Clone, Copy, Default, Args)]
pub struct ClassArgs {
    /// Only consider photos
    #[arg(long, conflicts_with = "videos_only")]
    pub photos_only: bool,

    /// Only consider videos
    #[arg(long)]
    pub videos_only: bool,
}

impl ClassArgs {
    pub fn media_class(&self) -> Option<MediaClass> {
        match (self.photos_only, self.videos_only) {
            (true, _) => Some(MediaClass::Photo),
            (_, true) => Some(MediaClass::Video),
            _ => None,
        }
    }
}
