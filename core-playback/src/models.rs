//! # Playback Data Model
//!
//! Wire types of the streaming API (camelCase JSON) and the session-side
//! types derived from them.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;

// ============================================================================
// Stream Metadata
// ============================================================================

/// Everything the API knows about one video.
///
/// Immutable once fetched; a new load replaces it wholesale.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct StreamMetadata {
    pub title: String,
    pub description: String,
    /// ISO-8601 upload date as reported by the API.
    pub upload_date: Option<String>,
    /// Upload time in epoch millis, when the API provides it.
    pub uploaded: Option<i64>,
    pub uploader: String,
    pub uploader_url: Option<String>,
    pub uploader_avatar: Option<String>,
    pub uploader_verified: bool,
    pub thumbnail_url: Option<String>,
    pub category: Option<String>,
    pub hls: Option<String>,
    pub dash: Option<String>,
    /// Length in seconds; non-positive for livestreams.
    pub duration: i64,
    pub views: i64,
    pub likes: i64,
    pub livestream: bool,
    pub proxy_url: Option<String>,
    pub audio_streams: Vec<PipedStream>,
    pub video_streams: Vec<PipedStream>,
    pub related_streams: Vec<StreamItem>,
    pub subtitles: Vec<Subtitle>,
    pub chapters: Vec<ChapterSegment>,
}

impl StreamMetadata {
    /// Duration, `None` while unknown or live.
    pub fn duration(&self) -> Option<Duration> {
        u64::try_from(self.duration)
            .ok()
            .filter(|secs| *secs > 0)
            .map(Duration::from_secs)
    }

    fn parsed_upload_date(&self) -> Option<DateTime<Utc>> {
        self.upload_date
            .as_deref()
            .and_then(|raw| DateTime::parse_from_rfc3339(raw).ok())
            .map(|date| date.with_timezone(&Utc))
    }

    /// Queue entry describing this video.
    pub fn to_queue_entry(&self, video_id: &str) -> QueueEntry {
        let upload_date = self.parsed_upload_date();
        QueueEntry {
            id: video_id.to_string(),
            title: Some(self.title.clone()),
            thumbnail: self.thumbnail_url.clone(),
            uploader_name: Some(self.uploader.clone()),
            uploader_url: self.uploader_url.clone(),
            uploader_avatar: self.uploader_avatar.clone(),
            duration: Some(self.duration),
            views: Some(self.views),
            uploaded: self
                .uploaded
                .or_else(|| upload_date.map(|date| date.timestamp_millis()))
                .unwrap_or_default(),
            uploaded_date: upload_date.map(|date| date.format("%Y-%m-%d").to_string()),
            short_description: Some(self.description.clone()),
        }
    }

    /// Queue entries of every related item that carries a video id.
    pub fn related_entries(&self) -> Vec<QueueEntry> {
        self.related_streams
            .iter()
            .filter_map(StreamItem::to_queue_entry)
            .collect()
    }
}

/// One audio or video rendition.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PipedStream {
    pub url: Option<String>,
    pub format: Option<String>,
    pub quality: Option<String>,
    pub mime_type: Option<String>,
    pub codec: Option<String>,
    pub audio_track_id: Option<String>,
    pub audio_track_name: Option<String>,
    pub audio_track_locale: Option<String>,
    pub video_only: bool,
    pub itag: Option<i32>,
    pub bitrate: Option<i64>,
    pub init_start: Option<i64>,
    pub init_end: Option<i64>,
    pub index_start: Option<i64>,
    pub index_end: Option<i64>,
    pub width: Option<i32>,
    pub height: Option<i32>,
    pub fps: Option<i32>,
    pub content_length: Option<i64>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Subtitle {
    pub url: Option<String>,
    pub mime_type: Option<String>,
    pub name: Option<String>,
    pub code: Option<String>,
    pub auto_generated: bool,
}

/// Stub of a related video, playlist or channel.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct StreamItem {
    /// `/watch?v=<id>` for videos.
    pub url: Option<String>,
    #[serde(rename = "type")]
    pub item_type: Option<String>,
    pub title: Option<String>,
    pub thumbnail: Option<String>,
    pub uploader_name: Option<String>,
    pub uploader_url: Option<String>,
    pub uploader_avatar: Option<String>,
    pub uploaded_date: Option<String>,
    pub duration: Option<i64>,
    pub views: Option<i64>,
    pub uploader_verified: Option<bool>,
    pub uploaded: Option<i64>,
    pub short_description: Option<String>,
    pub is_short: bool,
}

impl StreamItem {
    /// Queue entry for this stub, `None` unless it points at a video.
    pub fn to_queue_entry(&self) -> Option<QueueEntry> {
        if matches!(self.item_type.as_deref(), Some(kind) if kind != "stream") {
            return None;
        }
        let id = video_id_from_url(self.url.as_deref()?)?;

        Some(QueueEntry {
            id,
            title: self.title.clone(),
            thumbnail: self.thumbnail.clone(),
            uploader_name: self.uploader_name.clone(),
            uploader_url: self.uploader_url.clone(),
            uploader_avatar: self.uploader_avatar.clone(),
            duration: self.duration,
            views: self.views,
            uploaded: self.uploaded.unwrap_or_default(),
            uploaded_date: self.uploaded_date.clone(),
            short_description: self.short_description.clone(),
        })
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ChapterSegment {
    pub title: String,
    pub image: Option<String>,
    /// Offset in seconds.
    pub start: i64,
}

/// Extract the video id from `/watch?v=<id>`, `/shorts/<id>` or a bare id.
pub fn video_id_from_url(url: &str) -> Option<String> {
    let url = url.trim();
    let id = if let Some((_, query)) = url.split_once('?') {
        query
            .split('&')
            .find_map(|pair| pair.strip_prefix("v="))
            .unwrap_or_default()
    } else {
        url.rsplit('/').next().unwrap_or_default()
    };

    if id.is_empty() {
        None
    } else {
        Some(id.to_string())
    }
}

// ============================================================================
// Queue Entries
// ============================================================================

/// One entry of the play queue.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueEntry {
    pub id: String,
    pub title: Option<String>,
    pub thumbnail: Option<String>,
    pub uploader_name: Option<String>,
    pub uploader_url: Option<String>,
    pub uploader_avatar: Option<String>,
    /// Seconds.
    pub duration: Option<i64>,
    pub views: Option<i64>,
    /// Epoch millis, 0 when unknown.
    pub uploaded: i64,
    pub uploaded_date: Option<String>,
    pub short_description: Option<String>,
}

impl QueueEntry {
    /// Bare entry carrying only an id.
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            ..Self::default()
        }
    }

    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }
}

// ============================================================================
// Segments
// ============================================================================

/// What should happen while playback is inside a segment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SegmentActionKind {
    Skip,
    Mute,
    Highlight,
}

impl SegmentActionKind {
    /// Map the API `actionType`; unknown values skip.
    pub fn from_api(action_type: &str) -> Self {
        match action_type {
            "mute" => SegmentActionKind::Mute,
            "poi" | "chapter" | "full" => SegmentActionKind::Highlight,
            _ => SegmentActionKind::Skip,
        }
    }
}

/// A categorized time range of a video, in seconds.
///
/// `start <= end` always holds; the range is half-open.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SegmentMarker {
    pub uuid: Option<String>,
    pub category: String,
    pub start: f64,
    pub end: f64,
    pub action: SegmentActionKind,
}

impl SegmentMarker {
    pub fn new(category: impl Into<String>, start: f64, end: f64, action: SegmentActionKind) -> Self {
        let start = if start.is_finite() { start.max(0.0) } else { 0.0 };
        let end = if end.is_finite() { end.max(0.0) } else { start };
        let (start, end) = if start <= end { (start, end) } else { (end, start) };

        Self {
            uuid: None,
            category: category.into(),
            start,
            end,
            action,
        }
    }

    pub fn with_uuid(mut self, uuid: impl Into<String>) -> Self {
        self.uuid = Some(uuid.into());
        self
    }

    /// Limit both bounds to `duration` seconds.
    pub fn clamped_to(mut self, duration: f64) -> Self {
        self.start = self.start.min(duration);
        self.end = self.end.min(duration);
        self
    }

    /// `true` when `position` lies in `[start, end)`.
    pub fn contains(&self, position: f64) -> bool {
        self.start <= position && position < self.end
    }
}

/// Segment as the segment API returns it.
#[derive(Debug, Clone, Deserialize)]
pub(crate) struct ApiSegment {
    #[serde(rename = "UUID", default)]
    pub uuid: Option<String>,
    #[serde(default)]
    pub category: String,
    #[serde(rename = "actionType", default)]
    pub action_type: Option<String>,
    pub segment: [f64; 2],
}

impl From<ApiSegment> for SegmentMarker {
    fn from(raw: ApiSegment) -> Self {
        let action = raw
            .action_type
            .as_deref()
            .map(SegmentActionKind::from_api)
            .unwrap_or(SegmentActionKind::Skip);
        let marker = SegmentMarker::new(raw.category, raw.segment[0], raw.segment[1], action);
        match raw.uuid {
            Some(uuid) => marker.with_uuid(uuid),
            None => marker,
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub(crate) struct SegmentsResponse {
    #[serde(default)]
    pub segments: Vec<ApiSegment>,
}

#[cfg(test)]
mod tests {
    use super::*;

    const STREAMS_JSON: &str = r#"{
        "title": "Rust in 100 Seconds",
        "description": "Fast and safe",
        "uploadDate": "2024-03-01T12:00:00Z",
        "uploader": "Fireship",
        "uploaderUrl": "/channel/UCsBjURrPoezykLs9EqgamOA",
        "thumbnailUrl": "https://img.example/abc.jpg",
        "hls": "https://proxy.example/hls/master.m3u8?host=manifest.googlevideo.com",
        "duration": 156,
        "views": 1000,
        "likes": 50,
        "livestream": false,
        "audioStreams": [{
            "url": "https://proxy.example/videoplayback?itag=140",
            "format": "M4A",
            "quality": "128 kbps",
            "mimeType": "audio/mp4",
            "codec": "mp4a.40.2",
            "videoOnly": false,
            "itag": 140,
            "bitrate": 130000,
            "initStart": 0,
            "initEnd": 722,
            "indexStart": 723,
            "indexEnd": 1050
        }],
        "videoStreams": [],
        "relatedStreams": [
            {"url": "/watch?v=def", "type": "stream", "title": "Related"},
            {"url": "/channel/UC1", "type": "channel", "title": "Channel"}
        ],
        "subtitles": [{"url": "https://subs.example/en", "code": "en", "autoGenerated": true}],
        "chapters": [{"title": "Intro", "image": "https://img.example/c.jpg", "start": 0}]
    }"#;

    #[test]
    fn test_stream_metadata_deserialization() {
        let streams: StreamMetadata = serde_json::from_str(STREAMS_JSON).unwrap();

        assert_eq!(streams.title, "Rust in 100 Seconds");
        assert_eq!(streams.duration(), Some(Duration::from_secs(156)));
        assert_eq!(streams.audio_streams.len(), 1);
        assert_eq!(streams.audio_streams[0].index_end, Some(1050));
        assert!(streams.subtitles[0].auto_generated);
        assert_eq!(streams.chapters[0].title, "Intro");
        assert!(streams.dash.is_none());
    }

    #[test]
    fn test_queue_entries() {
        let streams: StreamMetadata = serde_json::from_str(STREAMS_JSON).unwrap();

        let entry = streams.to_queue_entry("abc");
        assert_eq!(entry.id, "abc");
        assert_eq!(entry.uploaded_date.as_deref(), Some("2024-03-01"));
        assert_eq!(entry.uploaded, 1_709_294_400_000);

        let related = streams.related_entries();
        assert_eq!(related.len(), 1);
        assert_eq!(related[0].id, "def");
    }

    #[test]
    fn test_live_duration_is_unknown() {
        let streams = StreamMetadata {
            duration: -1,
            livestream: true,
            ..StreamMetadata::default()
        };
        assert_eq!(streams.duration(), None);
    }

    #[test]
    fn test_video_id_from_url() {
        assert_eq!(video_id_from_url("/watch?v=abc").as_deref(), Some("abc"));
        assert_eq!(
            video_id_from_url("/watch?list=PL1&v=xyz&t=3").as_deref(),
            Some("xyz")
        );
        assert_eq!(video_id_from_url("/shorts/s1").as_deref(), Some("s1"));
        assert_eq!(video_id_from_url("bare").as_deref(), Some("bare"));
        assert_eq!(video_id_from_url("/watch?list=PL1"), None);
        assert_eq!(video_id_from_url(""), None);
    }

    #[test]
    fn test_segment_marker_normalization() {
        let marker = SegmentMarker::new("sponsor", 20.0, 10.0, SegmentActionKind::Skip);
        assert_eq!((marker.start, marker.end), (10.0, 20.0));
        assert!(marker.contains(10.0));
        assert!(!marker.contains(20.0));

        let clamped = SegmentMarker::new("intro", -3.0, f64::NAN, SegmentActionKind::Mute);
        assert_eq!((clamped.start, clamped.end), (0.0, 0.0));
        assert!(!clamped.contains(0.0));
    }

    #[test]
    fn test_segment_marker_clamped_to_duration() {
        let marker =
            SegmentMarker::new("sponsor", 10.0, 1e30, SegmentActionKind::Skip).clamped_to(100.0);
        assert_eq!((marker.start, marker.end), (10.0, 100.0));

        let past_end =
            SegmentMarker::new("outro", 150.0, 200.0, SegmentActionKind::Skip).clamped_to(100.0);
        assert_eq!((past_end.start, past_end.end), (100.0, 100.0));
        assert!(!past_end.contains(100.0));
    }

    #[test]
    fn test_segments_response() {
        let json = r#"{"segments": [
            {"UUID": "u1", "category": "sponsor", "actionType": "skip", "segment": [12.5, 30.0]},
            {"UUID": "u2", "category": "music_offtopic", "actionType": "mute", "segment": [40, 35]}
        ]}"#;
        let response: SegmentsResponse = serde_json::from_str(json).unwrap();
        let markers: Vec<SegmentMarker> = response.segments.into_iter().map(Into::into).collect();

        assert_eq!(markers[0].uuid.as_deref(), Some("u1"));
        assert_eq!(markers[0].action, SegmentActionKind::Skip);
        assert_eq!(markers[1].action, SegmentActionKind::Mute);
        assert_eq!((markers[1].start, markers[1].end), (35.0, 40.0));
    }
}
