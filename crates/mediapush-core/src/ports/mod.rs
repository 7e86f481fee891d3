//! Port definitions (hexagonal architecture interfaces)
//!
//! This module defines the port traits that form the boundaries of the
//! hexagonal architecture. Ports are interfaces that the domain core
//! depends on, but whose implementations live in adapter crates.
//!
//! ## Ports Overview
//!
//! - [`IItemStore`] - Durable item table with compare-and-set transitions
//! - [`IRemoteStore`] - Two-phase transfer to the remote content store
//! - [`IMediaAccessor`] - Enumerates local media and stages copies
//! - [`ICredentialStore`] / [`ITokenRefresher`] - Credential persistence and refresh
//! - [`IUploadObserver`] - Progress events

pub mod credential_store;
pub mod events;
pub mod item_store;
pub mod media_accessor;
pub mod remote_store;

pub use credential_store::{ICredentialStore, ITokenRefresher, RefreshError};
pub use events::{IUploadObserver, NoopObserver, UploadEvent};
pub use item_store::{ClassTotal, IItemStore, ItemFilter, TransitionMetadata, UpsertReport};
pub use media_accessor::{IMediaAccessor, StageOutcome};
pub use remote_store::{CommitEntry, IRemoteStore, RemoteError, TransferSession, UploadRequest};
