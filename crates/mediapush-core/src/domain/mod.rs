//! Domain entities and business logic
//!
//! This module contains the core domain types for MediaPush:
//! - Newtypes for type-safe identifiers and fingerprints
//! - Media items and their transfer state machine
//! - Batch descriptors recorded by the planner
//! - Bearer credentials
//! - The error taxonomy used for retry classification

pub mod batch;
pub mod credential;
pub mod errors;
pub mod media_item;
pub mod newtypes;

// Re-export commonly used types
pub use batch::{BatchDescriptor, BatchSummary, ExcludedItem};
pub use credential::{Credential, CredentialState};
pub use errors::{DomainError, ErrorKind};
pub use media_item::{
    ItemStatus, MediaClass, MediaItem, PixelDimensions, SizeClass, StatusReason,
};
pub use newtypes::*;
