//! SQLite implementation of ICredentialStore
//!
//! The credential lives in a single row (`id = 1`) of the `credentials`
//! table, inside the same owner-only database file as the item table.
//! Saves replace the row in one transaction so a reader never observes an
//! access token paired with a stale refresh token.

use chrono::{DateTime, SecondsFormat, Utc};
use sqlx::{Row, SqlitePool};

use mediapush_core::domain::Credential;
use mediapush_core::ports::ICredentialStore;

use crate::CacheError;

/// Single-row credential store backed by SQLite
pub struct SqliteCredentialStore {
    pool: SqlitePool,
}

impl SqliteCredentialStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

fn parse_expiry(s: &str) -> Result<DateTime<Utc>, CacheError> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| {
            CacheError::SerializationError(format!("Failed to parse credential expiry '{}': {}", s, e))
        })
}

#[async_trait::async_trait]
impl ICredentialStore for SqliteCredentialStore {
    async fn load(&self) -> anyhow::Result<Option<Credential>> {
        let row = sqlx::query(
            "SELECT access_token, refresh_token, expires_at FROM credentials WHERE id = 1",
        )
        .fetch_optional(&self.pool)
        .await?;

        let Some(row) = row else {
            return Ok(None);
        };

        let access_token: String = row.get("access_token");
        let refresh_token: String = row.get("refresh_token");
        let expires_at: String = row.get("expires_at");

        Ok(Some(Credential::new(
            access_token,
            refresh_token,
            parse_expiry(&expires_at)?,
        )))
    }

    async fn save(&self, credential: &Credential) -> anyhow::Result<()> {
        let now = Utc::now().to_rfc3339_opts(SecondsFormat::Micros, true);
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            "INSERT INTO credentials (id, access_token, refresh_token, expires_at, updated_at) \
             VALUES (1, ?, ?, ?, ?) \
             ON CONFLICT(id) DO UPDATE SET \
                 access_token = excluded.access_token, \
                 refresh_token = excluded.refresh_token, \
                 expires_at = excluded.expires_at, \
                 updated_at = excluded.updated_at",
        )
        .bind(credential.access_token())
        .bind(credential.refresh_token())
        .bind(
            credential
                .expires_at()
                .to_rfc3339_opts(SecondsFormat::Micros, true),
        )
        .bind(&now)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;

        tracing::debug!(expires_at = %credential.expires_at(), "Saved credential");
        Ok(())
    }

    async fn clear(&self) -> anyhow::Result<()> {
        sqlx::query("DELETE FROM credentials WHERE id = 1")
            .execute(&self.pool)
            .await?;
        tracing::info!("Cleared stored credential");
        Ok(())
    }
}
