//! MediaPush Cache - Local state persistence
//!
//! SQLite-based storage for:
//! - Media items and their transfer status
//! - Planned batches
//! - The bearer credential
//!
//! ## Architecture
//!
//! This crate implements the `IItemStore` and `ICredentialStore` ports from
//! `mediapush-core` using SQLite as the storage backend. It is a driven
//! (secondary) adapter in the hexagonal architecture.
//!
//! ## Key Components
//!
//! - [`DatabasePool`] - Connection pool with migration support
//! - [`SqliteItemStore`] - `IItemStore` with compare-and-set transitions
//! - [`SqliteCredentialStore`] - Single-row `ICredentialStore`
//! - [`CacheError`] - Error types for cache operations
//!
//! ## Usage
//!
//! ```no_run
//! use std::path::Path;
//! use mediapush_cache::{DatabasePool, SqliteItemStore};
//!
//! # async fn example() -> anyhow::Result<()> {
//! let pool = DatabasePool::new(Path::new("/home/user/.local/share/mediapush/mediapush.db")).await?;
//! let store = SqliteItemStore::new(pool.pool().clone());
//! // Use store as IItemStore...
//! # Ok(())
//! # }
//! ```

pub mod credentials;
pub mod pool;
pub mod repository;

pub use credentials::SqliteCredentialStore;
pub use pool::DatabasePool;
pub use repository::SqliteItemStore;

/// Errors that can occur during cache operations
#[derive(Debug, thiserror::Error)]
pub enum CacheError {
    /// Failed to establish a database connection
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    /// A database query failed
    #[error("Query failed: {0}")]
    QueryFailed(String),

    /// Schema migration failed
    #[error("Migration failed: {0}")]
    MigrationFailed(String),

    /// Serialization or deserialization of domain types failed
    #[error("Serialization error: {0}")]
    SerializationError(String),

    /// A write would break a store invariant
    #[error("Invariant violated: {0}")]
    InvariantViolated(String),
}

impl From<sqlx::Error> for CacheError {
    fn from(e: sqlx::Error) -> Self {
        CacheError::QueryFailed(e.to_string())
    }
}
