//! # Sync Record Repository
//!
//! Provides database persistence for sync records.
//!
//! ## Overview
//!
//! One row per (route, relative path). Writes are upserts on that key, so a
//! record is created on the first successful sync and replaced on every later
//! one. Records are never deleted by the sync pipeline.

use crate::record::{MediaRecord, PendingRecreation, SyncRecord};
use crate::stage::Direction;
use crate::{Result, SyncError};
use async_trait::async_trait;
use chrono::DateTime;
use sqlx::{FromRow, SqlitePool};
use std::collections::BTreeMap;
use std::path::PathBuf;

// ============================================================================
// Repository Trait
// ============================================================================

/// Repository trait for sync record persistence
#[async_trait]
pub trait SyncRecordRepository: Send + Sync {
    /// Find the record of one document
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails
    async fn find(&self, route: &str, relative_path: &str) -> Result<Option<SyncRecord>>;

    /// Insert or replace the record keyed by its route and relative path
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails
    async fn upsert(&self, record: &SyncRecord) -> Result<()>;

    /// All records of a route, ordered by relative path
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails
    async fn list_by_route(&self, route: &str) -> Result<Vec<SyncRecord>>;
}

// ============================================================================
// SQLite Implementation
// ============================================================================

/// SQLite implementation of SyncRecordRepository
pub struct SqliteSyncRecordRepository {
    pool: SqlitePool,
}

impl SqliteSyncRecordRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

/// Database row representation of a sync record
#[derive(Debug, FromRow)]
struct SyncRecordRow {
    route: String,
    relative_path: String,
    source_path: String,
    structured_id: String,
    html_id: String,
    content_hash: String,
    last_direction: String,
    media_json: String,
    pending_json: String,
    last_synced_at: i64,
}

impl TryFrom<SyncRecordRow> for SyncRecord {
    type Error = SyncError;

    fn try_from(row: SyncRecordRow) -> Result<Self> {
        let media: BTreeMap<String, MediaRecord> = serde_json::from_str(&row.media_json)
            .map_err(|e| SyncError::Serialization(format!("media_json: {}", e)))?;
        let pending_recreations: Vec<PendingRecreation> = serde_json::from_str(&row.pending_json)
            .map_err(|e| SyncError::Serialization(format!("pending_json: {}", e)))?;
        let last_synced_at = DateTime::from_timestamp_millis(row.last_synced_at).ok_or_else(|| {
            SyncError::Database(format!("Invalid last_synced_at: {}", row.last_synced_at))
        })?;

        Ok(SyncRecord {
            route: row.route,
            relative_path: row.relative_path,
            source_path: PathBuf::from(row.source_path),
            structured_id: row.structured_id,
            html_id: row.html_id,
            content_hash: row.content_hash,
            last_direction: row.last_direction.parse::<Direction>()?,
            media,
            pending_recreations,
            last_synced_at,
        })
    }
}

const SELECT_COLUMNS: &str = r#"
    SELECT route, relative_path, source_path, structured_id, html_id,
           content_hash, last_direction, media_json, pending_json, last_synced_at
    FROM sync_records
"#;

#[async_trait]
impl SyncRecordRepository for SqliteSyncRecordRepository {
    async fn find(&self, route: &str, relative_path: &str) -> Result<Option<SyncRecord>> {
        let row = sqlx::query_as::<_, SyncRecordRow>(&format!(
            "{} WHERE route = ? AND relative_path = ?",
            SELECT_COLUMNS
        ))
        .bind(route)
        .bind(relative_path)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| SyncError::Database(e.to_string()))?;

        row.map(SyncRecord::try_from).transpose()
    }

    async fn upsert(&self, record: &SyncRecord) -> Result<()> {
        let media_json = serde_json::to_string(&record.media)
            .map_err(|e| SyncError::Serialization(e.to_string()))?;
        let pending_json = serde_json::to_string(&record.pending_recreations)
            .map_err(|e| SyncError::Serialization(e.to_string()))?;

        sqlx::query(
            r#"
            INSERT INTO sync_records (
                route, relative_path, source_path, structured_id, html_id,
                content_hash, last_direction, media_json, pending_json, last_synced_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT (route, relative_path) DO UPDATE SET
                source_path = excluded.source_path,
                structured_id = excluded.structured_id,
                html_id = excluded.html_id,
                content_hash = excluded.content_hash,
                last_direction = excluded.last_direction,
                media_json = excluded.media_json,
                pending_json = excluded.pending_json,
                last_synced_at = excluded.last_synced_at
            "#,
        )
        .bind(&record.route)
        .bind(&record.relative_path)
        .bind(record.source_path.to_string_lossy().into_owned())
        .bind(&record.structured_id)
        .bind(&record.html_id)
        .bind(&record.content_hash)
        .bind(record.last_direction.as_str())
        .bind(media_json)
        .bind(pending_json)
        .bind(record.last_synced_at.timestamp_millis())
        .execute(&self.pool)
        .await
        .map_err(|e| SyncError::Database(e.to_string()))?;

        Ok(())
    }

    async fn list_by_route(&self, route: &str) -> Result<Vec<SyncRecord>> {
        let rows = sqlx::query_as::<_, SyncRecordRow>(&format!(
            "{} WHERE route = ? ORDER BY relative_path",
            SELECT_COLUMNS
        ))
        .bind(route)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| SyncError::Database(e.to_string()))?;

        rows.into_iter()
            .map(SyncRecord::try_from)
            .collect::<Result<Vec<_>>>()
    }
}

// ============================================================================
// Tests
// ============================================================================
