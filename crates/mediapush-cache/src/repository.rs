//! SQLite implementation of IItemStore
//!
//! This module provides the concrete SQLite-based implementation of the
//! item store port defined in mediapush-core. It handles domain type
//! serialization/deserialization and SQL query construction.
//!
//! ## Type Mapping
//!
//! | Domain Type          | SQL Type | Strategy                                   |
//! |----------------------|----------|--------------------------------------------|
//! | ItemId, RemoteId     | TEXT     | String via `.as_str()` / `::new()`         |
//! | ContentHash          | TEXT     | Lowercase hex via `.as_str()` / `ContentHash::new()` |
//! | PerceptualHash       | INTEGER  | Bit pattern via `to_i64()` / `from_i64()`  |
//! | PixelDimensions      | 2x INTEGER | `pixel_width`, `pixel_height`            |
//! | ItemStatus, MediaClass, StatusReason | TEXT | `.as_str()` / `FromStr`      |
//! | DateTime<Utc>        | TEXT     | RFC 3339 with microseconds (sortable)      |
//! | BatchDescriptor lists | TEXT    | serde_json arrays                          |
//!
//! ## Compare-and-set
//!
//! Every status change is a single `UPDATE ... WHERE id = ? AND status = ?`.
//! SQLite serialises writers, so two racing identical transitions see
//! exactly one affected row between them. Entering `uploading` also checks
//! that no other row with the same fingerprint is `uploading` or
//! `committed`; the partial unique index backs that check.

use std::collections::HashMap;
use std::path::PathBuf;
use std::str::FromStr;

use chrono::{DateTime, SecondsFormat, Utc};
use sqlx::sqlite::SqliteRow;
use sqlx::{QueryBuilder, Row, Sqlite, SqlitePool};

use mediapush_core::domain::{
    BatchDescriptor, BatchId, BatchSummary, ContentHash, ExcludedItem, ItemId, ItemStatus,
    MediaClass, MediaItem, PerceptualHash, PixelDimensions, RemoteId, StatusReason,
};
use mediapush_core::ports::{ClassTotal, IItemStore, ItemFilter, TransitionMetadata, UpsertReport};

use crate::CacheError;

/// SQLite-based implementation of the item store port
///
/// All operations are performed through a connection pool for concurrency.
pub struct SqliteItemStore {
    pool: SqlitePool,
}

impl SqliteItemStore {
    /// Creates a new store instance with the given connection pool
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

// ============================================================================
// Helper functions for type conversion
// ============================================================================

/// Format a timestamp so that lexical order matches chronological order
fn format_datetime(dt: &DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(SecondsFormat::Micros, true)
}

/// Parse a DateTime<Utc> from an ISO 8601 string
fn parse_datetime(s: &str) -> Result<DateTime<Utc>, CacheError> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .or_else(|_| {
            // SQLite default format, for rows written by hand
            chrono::NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S").map(|ndt| ndt.and_utc())
        })
        .map_err(|e| {
            CacheError::SerializationError(format!("Failed to parse datetime '{}': {}", s, e))
        })
}

/// Parse an optional DateTime<Utc> from an optional string
fn parse_optional_datetime(s: Option<String>) -> Result<Option<DateTime<Utc>>, CacheError> {
    match s {
        Some(ref val) if !val.is_empty() => parse_datetime(val).map(Some),
        _ => Ok(None),
    }
}

/// Builds a `map_err` adapter for a column value that failed to parse
fn serialization<'a, E: std::fmt::Display>(
    what: &'a str,
    value: &'a str,
) -> impl FnOnce(E) -> CacheError + 'a {
    move |e| CacheError::SerializationError(format!("Invalid {what} '{value}': {e}"))
}

/// True for SQLite UNIQUE constraint failures
fn is_unique_violation(err: &sqlx::Error) -> bool {
    match err {
        sqlx::Error::Database(db_err) => db_err.message().contains("UNIQUE constraint"),
        _ => false,
    }
}

// ============================================================================
// Row mapping functions
// ============================================================================

/// Reconstruct a MediaItem from a database row
fn media_item_from_row(row: &SqliteRow) -> Result<MediaItem, CacheError> {
    let id_str: String = row.get("id");
    let fingerprint_str: Option<String> = row.get("content_fingerprint");
    let perceptual: Option<i64> = row.get("perceptual_fingerprint");
    let pixel_width: Option<i64> = row.get("pixel_width");
    let pixel_height: Option<i64> = row.get("pixel_height");
    let source_locator: String = row.get("source_locator");
    let staged_path: Option<String> = row.get("staged_path");
    let size_bytes: i64 = row.get("size_bytes");
    let media_class_str: String = row.get("media_class");
    let mime_type: String = row.get("mime_type");
    let created_at_str: String = row.get("created_at");
    let status_str: String = row.get("status");
    let reason_str: Option<String> = row.get("status_reason");
    let retry_count: i64 = row.get("retry_count");
    let last_attempt_str: Option<String> = row.get("last_attempt_at");
    let last_error: Option<String> = row.get("last_error");
    let remote_id_str: Option<String> = row.get("remote_id");
    let needs_review: bool = row.get("needs_review");
    let updated_at_str: String = row.get("updated_at");

    let id = ItemId::new(id_str.clone()).map_err(serialization("ItemId", &id_str))?;
    let media_class =
        MediaClass::from_str(&media_class_str).map_err(serialization("media class", &media_class_str))?;
    let status = ItemStatus::from_str(&status_str).map_err(serialization("status", &status_str))?;
    let status_reason = reason_str
        .as_deref()
        .map(|r| StatusReason::from_str(r).map_err(serialization("status reason", r)))
        .transpose()?;
    let content_fingerprint = fingerprint_str
        .as_deref()
        .map(|h| ContentHash::new(h).map_err(serialization("ContentHash", h)))
        .transpose()?;
    let remote_id = remote_id_str
        .as_deref()
        .map(|r| RemoteId::new(r).map_err(serialization("RemoteId", r)))
        .transpose()?;
    let dimensions = match (pixel_width, pixel_height) {
        (Some(w), Some(h)) => Some(PixelDimensions::new(
            u32::try_from(w).map_err(serialization("pixel width", &id_str))?,
            u32::try_from(h).map_err(serialization("pixel height", &id_str))?,
        )),
        _ => None,
    };

    let item = MediaItem::new(
        id,
        source_locator,
        size_bytes.max(0) as u64,
        media_class,
        mime_type,
        parse_datetime(&created_at_str)?,
    )
    .with_status(status)
    .with_status_reason(status_reason)
    .with_content_fingerprint(content_fingerprint)
    .with_visual_fingerprint(perceptual.map(PerceptualHash::from_i64), dimensions)
    .with_staged_path(staged_path.map(PathBuf::from))
    .with_retry_state(
        retry_count.max(0) as u32,
        parse_optional_datetime(last_attempt_str)?,
        last_error,
    )
    .with_remote_id(remote_id)
    .with_needs_review(needs_review)
    .with_updated_at(parse_datetime(&updated_at_str)?);

    Ok(item)
}

/// Reconstruct a BatchDescriptor from a database row
fn batch_from_row(row: &SqliteRow) -> Result<BatchDescriptor, CacheError> {
    let id_str: String = row.get("id");
    let created_at_str: String = row.get("created_at");
    let item_ids_str: String = row.get("item_ids");
    let total_bytes: i64 = row.get("total_bytes");
    let free_space_bytes: i64 = row.get("free_space_bytes");
    let budget_bytes: i64 = row.get("budget_bytes");
    let excluded_str: String = row.get("excluded");
    let completed_at_str: Option<String> = row.get("completed_at");
    let summary_str: Option<String> = row.get("summary");

    let id = BatchId::from_str(&id_str).map_err(serialization("BatchId", &id_str))?;
    let item_ids: Vec<ItemId> =
        serde_json::from_str(&item_ids_str).map_err(serialization("item_ids JSON", &id_str))?;
    let excluded: Vec<ExcludedItem> =
        serde_json::from_str(&excluded_str).map_err(serialization("excluded JSON", &id_str))?;
    let summary: Option<BatchSummary> = match summary_str {
        Some(ref s) if !s.is_empty() => {
            Some(serde_json::from_str(s).map_err(serialization("summary JSON", &id_str))?)
        }
        _ => None,
    };

    Ok(BatchDescriptor {
        id,
        created_at: parse_datetime(&created_at_str)?,
        item_ids,
        total_bytes: total_bytes.max(0) as u64,
        free_space_bytes: free_space_bytes.max(0) as u64,
        budget_bytes: budget_bytes.max(0) as u64,
        excluded,
        completed_at: parse_optional_datetime(completed_at_str)?,
        summary,
    })
}

/// Appends the `AND ...` clauses shared by filter-driven queries
fn push_filter(qb: &mut QueryBuilder<'_, Sqlite>, filter: &ItemFilter) {
    if !filter.statuses.is_empty() {
        qb.push(" AND status IN (");
        let mut separated = qb.separated(", ");
        for status in &filter.statuses {
            separated.push_bind(status.as_str());
        }
        separated.push_unseparated(")");
    }
    if let Some(class) = filter.media_class {
        qb.push(" AND media_class = ").push_bind(class.as_str());
    }
    if let Some(reason) = filter.status_reason {
        qb.push(" AND status_reason = ").push_bind(reason.as_str());
    }
    if let Some(needs_review) = filter.needs_review {
        qb.push(" AND needs_review = ").push_bind(needs_review);
    }
}

fn limit_i64(limit: usize) -> i64 {
    i64::try_from(limit).unwrap_or(i64::MAX)
}

// ============================================================================
// IItemStore implementation
// ============================================================================

#[async_trait::async_trait]
impl IItemStore for SqliteItemStore {
    async fn upsert_many(&self, items: &[MediaItem]) -> anyhow::Result<UpsertReport> {
        let mut report = UpsertReport::default();
        let now = format_datetime(&Utc::now());
        let mut tx = self.pool.begin().await?;

        for item in items {
            let exists: Option<i64> = sqlx::query_scalar("SELECT 1 FROM media_items WHERE id = ?")
                .bind(item.id().as_str())
                .fetch_optional(&mut *tx)
                .await?;

            if exists.is_some() {
                // Scan metadata only; status and transfer columns belong to the CAS path
                sqlx::query(
                    "UPDATE media_items SET source_locator = ?, size_bytes = ?, mime_type = ?, \
                     media_class = ?, created_at = ?, updated_at = ? WHERE id = ?",
                )
                .bind(item.source_locator())
                .bind(item.size_bytes() as i64)
                .bind(item.mime_type())
                .bind(item.media_class().as_str())
                .bind(format_datetime(&item.created_at()))
                .bind(&now)
                .bind(item.id().as_str())
                .execute(&mut *tx)
                .await?;
                report.updated += 1;
            } else {
                sqlx::query(
                    "INSERT INTO media_items \
                     (id, source_locator, size_bytes, media_class, mime_type, created_at, \
                      status, retry_count, needs_review, updated_at) \
                     VALUES (?, ?, ?, ?, ?, ?, 'pending', 0, 0, ?)",
                )
                .bind(item.id().as_str())
                .bind(item.source_locator())
                .bind(item.size_bytes() as i64)
                .bind(item.media_class().as_str())
                .bind(item.mime_type())
                .bind(format_datetime(&item.created_at()))
                .bind(&now)
                .execute(&mut *tx)
                .await?;
                report.inserted += 1;
            }
        }

        tx.commit().await?;
        tracing::debug!(
            inserted = report.inserted,
            updated = report.updated,
            "Upserted media items"
        );
        Ok(report)
    }

    async fn get(&self, id: &ItemId) -> anyhow::Result<Option<MediaItem>> {
        let row = sqlx::query("SELECT * FROM media_items WHERE id = ?")
            .bind(id.as_str())
            .fetch_optional(&self.pool)
            .await?;

        match row {
            Some(ref r) => Ok(Some(media_item_from_row(r)?)),
            None => Ok(None),
        }
    }

    async fn find_by_fingerprint(&self, hash: &ContentHash) -> anyhow::Result<Option<MediaItem>> {
        let row = sqlx::query(
            "SELECT * FROM media_items \
             WHERE content_fingerprint = ? AND status != 'skipped' \
             ORDER BY CASE status WHEN 'committed' THEN 0 ELSE 1 END, created_at ASC, id ASC \
             LIMIT 1",
        )
        .bind(hash.as_str())
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(ref r) => Ok(Some(media_item_from_row(r)?)),
            None => Ok(None),
        }
    }

    async fn select_eligible(
        &self,
        filter: &ItemFilter,
        limit: usize,
    ) -> anyhow::Result<Vec<MediaItem>> {
        let mut qb: QueryBuilder<Sqlite> =
            QueryBuilder::new("SELECT * FROM media_items WHERE status IN ('pending', 'staged')");
        push_filter(&mut qb, filter);
        qb.push(" ORDER BY CASE WHEN media_class = ")
            .push_bind(filter.preferred_class.as_str())
            .push(" THEN 0 ELSE 1 END, size_bytes ASC, id ASC LIMIT ")
            .push_bind(limit_i64(limit));

        let rows = qb.build().fetch_all(&self.pool).await?;
        let mut items = Vec::with_capacity(rows.len());
        for row in &rows {
            items.push(media_item_from_row(row)?);
        }
        Ok(items)
    }

    async fn transition(
        &self,
        id: &ItemId,
        from: ItemStatus,
        to: ItemStatus,
        metadata: &TransitionMetadata,
    ) -> anyhow::Result<bool> {
        from.check_transition(to)?;

        let entering = |status: ItemStatus| to == status && from != status;
        if entering(ItemStatus::Committed) && metadata.remote_id.is_none() {
            return Err(CacheError::InvariantViolated(format!(
                "item {id} cannot be committed without a remote id"
            ))
            .into());
        }
        if metadata.remote_id.is_some() && to != ItemStatus::Committed {
            return Err(CacheError::InvariantViolated(format!(
                "item {id} may only carry a remote id when committed"
            ))
            .into());
        }

        let now = format_datetime(&Utc::now());
        let mut qb: QueryBuilder<Sqlite> = QueryBuilder::new("UPDATE media_items SET status = ");
        qb.push_bind(to.as_str());
        qb.push(", updated_at = ").push_bind(now.clone());

        if let Some(ref hash) = metadata.content_fingerprint {
            qb.push(", content_fingerprint = ")
                .push_bind(hash.as_str().to_string());
        }
        if let Some((hash, dims)) = metadata.visual_fingerprint {
            qb.push(", perceptual_fingerprint = ").push_bind(hash.to_i64());
            qb.push(", pixel_width = ").push_bind(i64::from(dims.width));
            qb.push(", pixel_height = ").push_bind(i64::from(dims.height));
        }
        if let Some(ref path) = metadata.staged_path {
            qb.push(", staged_path = ")
                .push_bind(path.to_string_lossy().into_owned());
        } else if metadata.clear_staged_path {
            qb.push(", staged_path = NULL");
        }
        if let Some(ref remote_id) = metadata.remote_id {
            qb.push(", remote_id = ").push_bind(remote_id.as_str().to_string());
        }
        if let Some(reason) = metadata.status_reason {
            qb.push(", status_reason = ").push_bind(reason.as_str());
        } else if from != to {
            qb.push(", status_reason = NULL");
        }
        if let Some(ref message) = metadata.last_error {
            qb.push(", last_error = ").push_bind(message.clone());
        } else if metadata.clear_last_error {
            qb.push(", last_error = NULL");
        }
        if metadata.reset_retry {
            qb.push(", retry_count = 0");
        } else if metadata.increment_retry {
            qb.push(", retry_count = retry_count + 1");
        }
        if metadata.touch_attempt {
            qb.push(", last_attempt_at = ").push_bind(now);
        }
        if let Some(needs_review) = metadata.needs_review {
            qb.push(", needs_review = ").push_bind(needs_review);
        }

        qb.push(" WHERE id = ").push_bind(id.as_str().to_string());
        qb.push(" AND status = ").push_bind(from.as_str());

        if entering(ItemStatus::Uploading) {
            // The fingerprint is either set by this update or already stored
            match metadata.content_fingerprint {
                Some(ref hash) => {
                    qb.push(
                        " AND NOT EXISTS (SELECT 1 FROM media_items other \
                         WHERE other.content_fingerprint = ",
                    )
                    .push_bind(hash.as_str().to_string());
                }
                None => {
                    qb.push(
                        " AND content_fingerprint IS NOT NULL \
                         AND NOT EXISTS (SELECT 1 FROM media_items other \
                         WHERE other.content_fingerprint = media_items.content_fingerprint",
                    );
                }
            }
            qb.push(
                " AND other.id != media_items.id \
                 AND other.status IN ('uploading', 'committed'))",
            );
        }

        match qb.build().execute(&self.pool).await {
            Ok(result) => {
                let applied = result.rows_affected() == 1;
                tracing::trace!(
                    item_id = %id,
                    from = %from,
                    to = %to,
                    applied,
                    "Item transition"
                );
                Ok(applied)
            }
            Err(e) if is_unique_violation(&e) => {
                tracing::debug!(
                    item_id = %id,
                    "Transition lost the fingerprint claim to another row"
                );
                Ok(false)
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn total_by_status(&self) -> anyhow::Result<HashMap<ItemStatus, u64>> {
        let rows = sqlx::query("SELECT status, COUNT(*) AS count FROM media_items GROUP BY status")
            .fetch_all(&self.pool)
            .await?;

        let mut counts: HashMap<ItemStatus, u64> =
            ItemStatus::ALL.iter().map(|s| (*s, 0)).collect();
        for row in &rows {
            let status_str: String = row.get("status");
            let count: i64 = row.get("count");
            let status =
                ItemStatus::from_str(&status_str).map_err(serialization("status", &status_str))?;
            counts.insert(status, count.max(0) as u64);
        }
        Ok(counts)
    }

    async fn total_by_class(
        &self,
        status: ItemStatus,
    ) -> anyhow::Result<HashMap<MediaClass, ClassTotal>> {
        let rows = sqlx::query(
            "SELECT media_class, COUNT(*) AS count, COALESCE(SUM(size_bytes), 0) AS bytes \
             FROM media_items WHERE status = ? GROUP BY media_class",
        )
        .bind(status.as_str())
        .fetch_all(&self.pool)
        .await?;

        let mut totals = HashMap::new();
        for row in &rows {
            let class_str: String = row.get("media_class");
            let count: i64 = row.get("count");
            let bytes: i64 = row.get("bytes");
            let class =
                MediaClass::from_str(&class_str).map_err(serialization("media class", &class_str))?;
            totals.insert(
                class,
                ClassTotal {
                    count: count.max(0) as u64,
                    bytes: bytes.max(0) as u64,
                },
            );
        }
        Ok(totals)
    }

    async fn query(&self, filter: &ItemFilter, limit: usize) -> anyhow::Result<Vec<MediaItem>> {
        let mut qb: QueryBuilder<Sqlite> = QueryBuilder::new("SELECT * FROM media_items WHERE 1=1");
        push_filter(&mut qb, filter);
        qb.push(" ORDER BY updated_at DESC, id ASC LIMIT ")
            .push_bind(limit_i64(limit));

        let rows = qb.build().fetch_all(&self.pool).await?;
        let mut items = Vec::with_capacity(rows.len());
        for row in &rows {
            items.push(media_item_from_row(row)?);
        }
        Ok(items)
    }

    async fn count(&self, filter: &ItemFilter) -> anyhow::Result<u64> {
        let mut qb: QueryBuilder<Sqlite> =
            QueryBuilder::new("SELECT COUNT(*) AS count FROM media_items WHERE 1=1");
        push_filter(&mut qb, filter);

        let row = qb.build().fetch_one(&self.pool).await?;
        let count: i64 = row.get("count");
        Ok(count.max(0) as u64)
    }

    async fn find_committed_images_by_dimensions(
        &self,
        dimensions: PixelDimensions,
    ) -> anyhow::Result<Vec<MediaItem>> {
        let rows = sqlx::query(
            "SELECT * FROM media_items \
             WHERE status = 'committed' AND media_class = 'photo' \
             AND pixel_width = ? AND pixel_height = ? \
             AND perceptual_fingerprint IS NOT NULL",
        )
        .bind(i64::from(dimensions.width))
        .bind(i64::from(dimensions.height))
        .fetch_all(&self.pool)
        .await?;

        let mut items = Vec::with_capacity(rows.len());
        for row in &rows {
            items.push(media_item_from_row(row)?);
        }
        Ok(items)
    }

    async fn record_batch(&self, batch: &BatchDescriptor) -> anyhow::Result<()> {
        let item_ids = serde_json::to_string(&batch.item_ids)
            .map_err(|e| anyhow::anyhow!("Failed to serialize batch item ids: {}", e))?;
        let excluded = serde_json::to_string(&batch.excluded)
            .map_err(|e| anyhow::anyhow!("Failed to serialize excluded items: {}", e))?;
        let summary = match batch.summary {
            Some(ref s) => Some(
                serde_json::to_string(s)
                    .map_err(|e| anyhow::anyhow!("Failed to serialize batch summary: {}", e))?,
            ),
            None => None,
        };

        sqlx::query(
            "INSERT INTO batches \
             (id, created_at, item_ids, item_count, total_bytes, free_space_bytes, \
              budget_bytes, excluded, completed_at, summary) \
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(batch.id.to_string())
        .bind(format_datetime(&batch.created_at))
        .bind(&item_ids)
        .bind(batch.item_count() as i64)
        .bind(batch.total_bytes as i64)
        .bind(batch.free_space_bytes as i64)
        .bind(batch.budget_bytes as i64)
        .bind(&excluded)
        .bind(batch.completed_at.as_ref().map(format_datetime))
        .bind(&summary)
        .execute(&self.pool)
        .await?;

        tracing::debug!(
            batch_id = %batch.id,
            items = batch.item_count(),
            total_bytes = batch.total_bytes,
            "Recorded batch"
        );
        Ok(())
    }

    async fn complete_batch(&self, id: &BatchId, summary: &BatchSummary) -> anyhow::Result<()> {
        let summary_json = serde_json::to_string(summary)
            .map_err(|e| anyhow::anyhow!("Failed to serialize batch summary: {}", e))?;

        let result = sqlx::query("UPDATE batches SET completed_at = ?, summary = ? WHERE id = ?")
            .bind(format_datetime(&Utc::now()))
            .bind(&summary_json)
            .bind(id.to_string())
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            anyhow::bail!("Batch not found: {}", id);
        }
        Ok(())
    }

    async fn get_batch(&self, id: &BatchId) -> anyhow::Result<Option<BatchDescriptor>> {
        let row = sqlx::query("SELECT * FROM batches WHERE id = ?")
            .bind(id.to_string())
            .fetch_optional(&self.pool)
            .await?;

        match row {
            Some(ref r) => Ok(Some(batch_from_row(r)?)),
            None => Ok(None),
        }
    }

    async fn recent_batches(&self, limit: usize) -> anyhow::Result<Vec<BatchDescriptor>> {
        let rows = sqlx::query("SELECT * FROM batches ORDER BY created_at DESC LIMIT ?")
            .bind(limit_i64(limit))
            .fetch_all(&self.pool)
            .await?;

        let mut batches = Vec::with_capacity(rows.len());
        for row in &rows {
            batches.push(batch_from_row(row)?);
        }
        Ok(batches)
    }

    async fn recover_interrupted(&self) -> anyhow::Result<u64> {
        let result = sqlx::query(
            "UPDATE media_items SET status = 'staged', updated_at = ?, \
             last_error = 'transient-network: interrupted before completion' \
             WHERE status = 'uploading'",
        )
        .bind(format_datetime(&Utc::now()))
        .execute(&self.pool)
        .await?;

        let recovered = result.rows_affected();
        if recovered > 0 {
            tracing::warn!(recovered, "Returned interrupted uploads to staged");
        }
        Ok(recovered)
    }

    async fn requeue_failed(&self, filter: &ItemFilter) -> anyhow::Result<u64> {
        let mut qb: QueryBuilder<Sqlite> = QueryBuilder::new(
            "UPDATE media_items SET status = 'pending', retry_count = 0, \
             status_reason = NULL, last_error = NULL, staged_path = NULL, updated_at = ",
        );
        qb.push_bind(format_datetime(&Utc::now()));
        qb.push(" WHERE status = 'failed'");
        if let Some(class) = filter.media_class {
            qb.push(" AND media_class = ").push_bind(class.as_str());
        }
        if let Some(reason) = filter.status_reason {
            qb.push(" AND status_reason = ").push_bind(reason.as_str());
        }

        let result = qb.build().execute(&self.pool).await?;
        let requeued = result.rows_affected();
        tracing::info!(requeued, "Requeued failed items");
        Ok(requeued)
    }
}
