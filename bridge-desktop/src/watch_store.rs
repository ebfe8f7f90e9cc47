//! Watch position and watch history storage using SQLite

use async_trait::async_trait;
use bridge_traits::{
    error::{BridgeError, Result},
    storage::{WatchHistoryEntry, WatchHistoryStore, WatchPositionStore},
};
use chrono::{DateTime, Utc};
use sqlx::{
    sqlite::{SqlitePool, SqlitePoolOptions},
    Row,
};
use std::path::PathBuf;
use std::time::Duration;
use tracing::debug;

const SCHEMA: [&str; 2] = [
    r#"
    CREATE TABLE IF NOT EXISTS watch_positions (
        video_id TEXT PRIMARY KEY,
        position_ms INTEGER NOT NULL,
        updated_at INTEGER NOT NULL
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS watch_history (
        video_id TEXT PRIMARY KEY,
        title TEXT NOT NULL,
        uploader TEXT NOT NULL,
        uploader_url TEXT,
        thumbnail_url TEXT,
        duration_secs INTEGER NOT NULL,
        upload_date TEXT,
        watched_at INTEGER NOT NULL
    )
    "#,
];

/// SQLite-backed store for playback positions and the watch history.
///
/// Positions are kept per video id with millisecond precision; the last write
/// wins. History rows are keyed by video id as well, so re-watching a video
/// moves it to the front instead of duplicating it.
pub struct SqliteWatchStore {
    pool: SqlitePool,
}

impl SqliteWatchStore {
    /// Open (or create) the store at the given database path
    pub async fn new(db_path: PathBuf) -> Result<Self> {
        if let Some(parent) = db_path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(BridgeError::Io)?;
        }

        // SQLite URLs use forward slashes on every platform
        let path_str = db_path.to_string_lossy().replace('\\', "/");
        let db_url = format!("sqlite://{}?mode=rwc", path_str);

        let pool = SqlitePool::connect(&db_url)
            .await
            .map_err(|e| BridgeError::DatabaseError(format!("Failed to connect to DB: {}", e)))?;

        Self::create_schema(&pool).await?;
        debug!(path = ?db_path, "Initialized watch store");

        Ok(Self { pool })
    }

    /// Create an in-memory store (for testing)
    pub async fn in_memory() -> Result<Self> {
        // Every pooled connection would get its own in-memory database
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .map_err(|e| BridgeError::DatabaseError(format!("Failed to connect to DB: {}", e)))?;

        Self::create_schema(&pool).await?;
        Ok(Self { pool })
    }

    async fn create_schema(pool: &SqlitePool) -> Result<()> {
        for statement in SCHEMA {
            sqlx::query(statement)
                .execute(pool)
                .await
                .map_err(|e| {
                    BridgeError::DatabaseError(format!("Failed to create table: {}", e))
                })?;
        }
        Ok(())
    }

    /// Most recently watched entries first.
    pub async fn recent_history(&self, limit: u32) -> Result<Vec<WatchHistoryEntry>> {
        let rows = sqlx::query(
            r#"
            SELECT video_id, title, uploader, uploader_url, thumbnail_url,
                   duration_secs, upload_date, watched_at
            FROM watch_history
            ORDER BY watched_at DESC
            LIMIT ?
            "#,
        )
        .bind(i64::from(limit))
        .fetch_all(&self.pool)
        .await
        .map_err(|e| BridgeError::DatabaseError(format!("Failed to read history: {}", e)))?;

        rows.into_iter()
            .map(|row| {
                let watched_at: i64 = row.get(7);
                let duration_secs: i64 = row.get(5);
                Ok(WatchHistoryEntry {
                    video_id: row.get(0),
                    title: row.get(1),
                    uploader: row.get(2),
                    uploader_url: row.get(3),
                    thumbnail_url: row.get(4),
                    duration_secs: duration_secs.max(0) as u64,
                    upload_date: row.get(6),
                    watched_at: DateTime::<Utc>::from_timestamp_millis(watched_at).ok_or_else(
                        || BridgeError::DatabaseError(format!("Bad timestamp: {}", watched_at)),
                    )?,
                })
            })
            .collect()
    }

    /// Forget the stored position of a video.
    pub async fn clear_position(&self, video_id: &str) -> Result<()> {
        sqlx::query("DELETE FROM watch_positions WHERE video_id = ?")
            .bind(video_id)
            .execute(&self.pool)
            .await
            .map_err(|e| {
                BridgeError::DatabaseError(format!("Failed to delete position: {}", e))
            })?;

        debug!(video_id, "Cleared watch position");
        Ok(())
    }
}

#[async_trait]
impl WatchPositionStore for SqliteWatchStore {
    async fn save_position(&self, video_id: &str, position: Duration) -> Result<()> {
        let position_ms = i64::try_from(position.as_millis()).unwrap_or(i64::MAX);

        sqlx::query(
            r#"
            INSERT INTO watch_positions (video_id, position_ms, updated_at)
            VALUES (?, ?, ?)
            ON CONFLICT(video_id) DO UPDATE SET
                position_ms = excluded.position_ms,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(video_id)
        .bind(position_ms)
        .bind(Utc::now().timestamp_millis())
        .execute(&self.pool)
        .await
        .map_err(|e| BridgeError::DatabaseError(format!("Failed to save position: {}", e)))?;

        debug!(video_id, position_ms, "Stored watch position");
        Ok(())
    }

    async fn find_position(&self, video_id: &str) -> Result<Option<Duration>> {
        let row = sqlx::query("SELECT position_ms FROM watch_positions WHERE video_id = ?")
            .bind(video_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| BridgeError::DatabaseError(format!("Failed to get position: {}", e)))?;

        Ok(row.map(|row| {
            let position_ms: i64 = row.get(0);
            Duration::from_millis(position_ms.max(0) as u64)
        }))
    }
}

#[async_trait]
impl WatchHistoryStore for SqliteWatchStore {
    async fn record_watched(&self, entry: WatchHistoryEntry) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO watch_history (
                video_id, title, uploader, uploader_url, thumbnail_url,
                duration_secs, upload_date, watched_at
            )
            VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(video_id) DO UPDATE SET
                title = excluded.title,
                uploader = excluded.uploader,
                uploader_url = excluded.uploader_url,
                thumbnail_url = excluded.thumbnail_url,
                duration_secs = excluded.duration_secs,
                upload_date = excluded.upload_date,
                watched_at = excluded.watched_at
            "#,
        )
        .bind(&entry.video_id)
        .bind(&entry.title)
        .bind(&entry.uploader)
        .bind(&entry.uploader_url)
        .bind(&entry.thumbnail_url)
        .bind(i64::try_from(entry.duration_secs).unwrap_or(i64::MAX))
        .bind(&entry.upload_date)
        .bind(entry.watched_at.timestamp_millis())
        .execute(&self.pool)
        .await
        .map_err(|e| BridgeError::DatabaseError(format!("Failed to record history: {}", e)))?;

        debug!(video_id = %entry.video_id, "Recorded watch history");
        Ok(())
    }
}
