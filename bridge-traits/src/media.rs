//! Media engine bridge.
//!
//! The decode/render engine is owned by the host platform. The core only
//! hands it a [`MediaSource`], issues transport calls, and consumes the
//! [`EngineEvent`]s the engine reports back through an [`EngineEventSender`].

use async_trait::async_trait;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use crate::error::Result;

/// Content-type hint handed to the engine alongside the source address.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MimeType {
    /// MPEG-DASH manifest (`application/dash+xml`).
    Dash,
    /// HLS playlist (`application/x-mpegURL`).
    Hls,
    /// Single progressive file.
    Progressive,
}

impl MimeType {
    pub fn as_str(&self) -> &'static str {
        match self {
            MimeType::Dash => "application/dash+xml",
            MimeType::Hls => "application/x-mpegURL",
            MimeType::Progressive => "application/octet-stream",
        }
    }
}

/// Display metadata attached to a source so the engine can populate its own
/// media session if it has one.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MediaMetadata {
    pub title: Option<String>,
    pub artist: Option<String>,
    pub artwork_url: Option<String>,
}

/// Source descriptor: an address plus a content-type hint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MediaSource {
    pub uri: String,
    pub mime_type: MimeType,
    pub metadata: MediaMetadata,
}

impl MediaSource {
    pub fn new(uri: impl Into<String>, mime_type: MimeType) -> Self {
        Self {
            uri: uri.into(),
            mime_type,
            metadata: MediaMetadata::default(),
        }
    }

    pub fn with_metadata(mut self, metadata: MediaMetadata) -> Self {
        self.metadata = metadata;
        self
    }

    /// `true` when the manifest is inlined as a `data:` URI.
    pub fn is_inline(&self) -> bool {
        self.uri.starts_with("data:")
    }
}

/// Lifecycle and error signals emitted by the engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EngineEvent {
    /// The engine is waiting for data.
    Buffering,
    /// The prepared source can start rendering.
    Ready,
    /// The engine started or stopped actually producing output.
    IsPlayingChanged(bool),
    /// The current source played to its end.
    Ended,
    /// Unrecoverable playback failure, with a user-presentable message.
    Error(String),
}

/// Callback handle the engine uses to report [`EngineEvent`]s.
///
/// Cloneable and cheap; sending never blocks. Events sent after the owning
/// session discarded this engine are dropped by the session.
#[derive(Clone)]
pub struct EngineEventSender {
    deliver: Arc<dyn Fn(EngineEvent) + Send + Sync>,
}

impl EngineEventSender {
    pub fn new<F>(deliver: F) -> Self
    where
        F: Fn(EngineEvent) + Send + Sync + 'static,
    {
        Self {
            deliver: Arc::new(deliver),
        }
    }

    pub fn send(&self, event: EngineEvent) {
        (self.deliver)(event);
    }
}

impl fmt::Debug for EngineEventSender {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EngineEventSender").finish_non_exhaustive()
    }
}

/// Host media engine.
///
/// Transport calls should be quick and non-blocking; state changes are
/// reported asynchronously through the [`EngineEventSender`] the engine was
/// created with.
#[async_trait]
pub trait MediaEngine: Send + Sync {
    /// Replace the current source. Does not start loading until `prepare`.
    async fn set_source(&self, source: MediaSource) -> Result<()>;

    /// Start loading the current source.
    async fn prepare(&self) -> Result<()>;

    async fn play(&self) -> Result<()>;

    async fn pause(&self) -> Result<()>;

    async fn seek_to(&self, position: Duration) -> Result<()>;

    async fn set_muted(&self, muted: bool) -> Result<()>;

    /// Current playback offset.
    async fn position(&self) -> Result<Duration>;

    /// Duration of the current source, `None` while unknown.
    async fn duration(&self) -> Result<Option<Duration>>;

    async fn is_playing(&self) -> Result<bool>;

    /// Stop playback and free native resources. The engine is not reused.
    async fn release(&self) -> Result<()>;
}

/// Factory the session uses to create its engine lazily, on first load.
pub trait MediaEngineProvider: Send + Sync {
    fn create(&self, events: EngineEventSender) -> Result<Arc<dyn MediaEngine>>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[test]
    fn mime_type_strings() {
        assert_eq!(MimeType::Dash.as_str(), "application/dash+xml");
        assert_eq!(MimeType::Hls.as_str(), "application/x-mpegURL");
    }

    #[test]
    fn inline_sources_are_detected() {
        let inline = MediaSource::new("data:application/dash+xml;base64,AAAA", MimeType::Dash);
        let remote = MediaSource::new("https://cdn.example/master.m3u8", MimeType::Hls);

        assert!(inline.is_inline());
        assert!(!remote.is_inline());
    }

    #[test]
    fn event_sender_delivers_in_order() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let sender = EngineEventSender::new(move |event| sink.lock().unwrap().push(event));

        sender.send(EngineEvent::Buffering);
        sender.clone().send(EngineEvent::Ready);

        assert_eq!(
            *seen.lock().unwrap(),
            vec![EngineEvent::Buffering, EngineEvent::Ready]
        );
    }
}
