//! Persistence bridges for watch positions and watch history.
//!
//! Storage engines are host-owned; the session only records positions and
//! watched videos through these traits.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::error::Result;

/// Fraction of the duration after which a stored position is considered
/// "finished" and playback restarts from the beginning.
pub const RESUME_THRESHOLD: f64 = 0.9;

/// Decide whether a stored position is worth resuming from.
///
/// Returns `None` when the duration is unknown or the position lies in the
/// final tenth of the video.
pub fn resumable_position(stored: Duration, duration: Option<Duration>) -> Option<Duration> {
    let duration = duration?;
    if duration.is_zero() {
        return None;
    }
    if stored.as_secs_f64() < duration.as_secs_f64() * RESUME_THRESHOLD {
        Some(stored)
    } else {
        None
    }
}

/// Watch position storage trait
///
/// Last writer wins; a position is written at most once per tracker tick and
/// once on clean pause/stop.
#[async_trait]
pub trait WatchPositionStore: Send + Sync {
    async fn save_position(&self, video_id: &str, position: Duration) -> Result<()>;

    /// Raw stored position, if any.
    async fn find_position(&self, video_id: &str) -> Result<Option<Duration>>;

    /// Stored position filtered through [`resumable_position`].
    async fn get_position(
        &self,
        video_id: &str,
        duration: Option<Duration>,
    ) -> Result<Option<Duration>> {
        Ok(self
            .find_position(video_id)
            .await?
            .and_then(|stored| resumable_position(stored, duration)))
    }
}

/// Row written to the watch history once per load.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WatchHistoryEntry {
    pub video_id: String,
    pub title: String,
    pub uploader: String,
    pub uploader_url: Option<String>,
    pub thumbnail_url: Option<String>,
    pub duration_secs: u64,
    pub upload_date: Option<String>,
    pub watched_at: DateTime<Utc>,
}

#[async_trait]
pub trait WatchHistoryStore: Send + Sync {
    async fn record_watched(&self, entry: WatchHistoryEntry) -> Result<()>;
}
