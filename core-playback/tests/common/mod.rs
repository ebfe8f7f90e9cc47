//! Mock bridges shared by the session integration tests.
#![allow(dead_code)]

use async_trait::async_trait;
use bridge_traits::error::{BridgeError, Result as BridgeResult};
use bridge_traits::{
    EngineEvent, EngineEventSender, FixedClock, HttpClient, HttpRequest, HttpResponse,
    MediaEngine, MediaEngineProvider, MediaSource, MimeType, NowPlayingInfo, NowPlayingPresenter,
    WatchHistoryEntry, WatchHistoryStore, WatchPositionStore,
};
use chrono::{TimeZone, Utc};
use core_playback::models::StreamItem;
use core_playback::{
    FetchError, PlaybackSessionController, SegmentMarker, SessionHandle, SessionStatus,
    StreamMetadata, StreamResolver,
};
use core_runtime::config::{CoreConfig, PlaybackPreferences};
use core_runtime::events::{CoreEvent, EventStream};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tokio::time::timeout;

pub const WAIT: Duration = Duration::from_secs(5);

// ============================================================================
// Media Engine
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EngineCall {
    SetSource(MimeType),
    Prepare,
    Play,
    Pause,
    SeekTo(Duration),
    SetMuted(bool),
    Release,
}

pub struct MockEngine {
    events: EngineEventSender,
    calls: Mutex<Vec<EngineCall>>,
    position: Mutex<Duration>,
    playing: Mutex<bool>,
}

impl MockEngine {
    fn new(events: EngineEventSender) -> Self {
        Self {
            events,
            calls: Mutex::new(Vec::new()),
            position: Mutex::new(Duration::ZERO),
            playing: Mutex::new(false),
        }
    }

    fn record(&self, call: EngineCall) {
        self.calls.lock().unwrap().push(call);
    }

    pub fn calls(&self) -> Vec<EngineCall> {
        self.calls.lock().unwrap().clone()
    }

    /// Report an event as the host engine would.
    pub fn emit(&self, event: EngineEvent) {
        self.events.send(event);
    }

    pub fn set_position(&self, position: Duration) {
        *self.position.lock().unwrap() = position;
    }
}

#[async_trait]
impl MediaEngine for MockEngine {
    async fn set_source(&self, source: MediaSource) -> BridgeResult<()> {
        self.record(EngineCall::SetSource(source.mime_type));
        Ok(())
    }

    async fn prepare(&self) -> BridgeResult<()> {
        self.record(EngineCall::Prepare);
        Ok(())
    }

    async fn play(&self) -> BridgeResult<()> {
        self.record(EngineCall::Play);
        *self.playing.lock().unwrap() = true;
        Ok(())
    }

    async fn pause(&self) -> BridgeResult<()> {
        self.record(EngineCall::Pause);
        *self.playing.lock().unwrap() = false;
        Ok(())
    }

    async fn seek_to(&self, position: Duration) -> BridgeResult<()> {
        self.record(EngineCall::SeekTo(position));
        self.set_position(position);
        Ok(())
    }

    async fn set_muted(&self, muted: bool) -> BridgeResult<()> {
        self.record(EngineCall::SetMuted(muted));
        Ok(())
    }

    async fn position(&self) -> BridgeResult<Duration> {
        Ok(*self.position.lock().unwrap())
    }

    async fn duration(&self) -> BridgeResult<Option<Duration>> {
        Ok(None)
    }

    async fn is_playing(&self) -> BridgeResult<bool> {
        Ok(*self.playing.lock().unwrap())
    }

    async fn release(&self) -> BridgeResult<()> {
        self.record(EngineCall::Release);
        Ok(())
    }
}

#[derive(Default)]
pub struct MockEngineProvider {
    engines: Mutex<Vec<Arc<MockEngine>>>,
}

impl MockEngineProvider {
    pub fn created(&self) -> usize {
        self.engines.lock().unwrap().len()
    }

    pub fn engine(&self, index: usize) -> Arc<MockEngine> {
        Arc::clone(&self.engines.lock().unwrap()[index])
    }
}

impl MediaEngineProvider for MockEngineProvider {
    fn create(&self, events: EngineEventSender) -> BridgeResult<Arc<dyn MediaEngine>> {
        let engine = Arc::new(MockEngine::new(events));
        self.engines.lock().unwrap().push(Arc::clone(&engine));
        Ok(engine)
    }
}

// ============================================================================
// Resolver
// ============================================================================

#[derive(Default)]
pub struct MockResolver {
    streams: HashMap<String, StreamMetadata>,
    segments: HashMap<String, Vec<SegmentMarker>>,
    gate: Option<Arc<Notify>>,
    calls: Mutex<Vec<String>>,
}

impl MockResolver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_video(mut self, video_id: &str, streams: StreamMetadata) -> Self {
        self.streams.insert(video_id.to_string(), streams);
        self
    }

    pub fn with_segments(mut self, video_id: &str, segments: Vec<SegmentMarker>) -> Self {
        self.segments.insert(video_id.to_string(), segments);
        self
    }

    /// Hold every `resolve` until the gate is notified.
    pub fn gated(mut self, gate: Arc<Notify>) -> Self {
        self.gate = Some(gate);
        self
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl StreamResolver for MockResolver {
    async fn resolve(&self, video_id: &str) -> Result<StreamMetadata, FetchError> {
        self.calls.lock().unwrap().push(video_id.to_string());
        if let Some(gate) = &self.gate {
            gate.notified().await;
        }
        self.streams
            .get(video_id)
            .cloned()
            .ok_or_else(|| FetchError::NotFound(video_id.to_string()))
    }

    async fn segments(
        &self,
        video_id: &str,
        _categories: &[String],
    ) -> Result<Vec<SegmentMarker>, FetchError> {
        Ok(self.segments.get(video_id).cloned().unwrap_or_default())
    }
}

/// Metadata with an HLS address and the given related videos.
pub fn streams(title: &str, related: &[&str]) -> StreamMetadata {
    StreamMetadata {
        title: title.to_string(),
        uploader: "Uploader".to_string(),
        duration: 100,
        hls: Some(format!("https://cdn.example/{}/master.m3u8", title)),
        related_streams: related
            .iter()
            .map(|id| StreamItem {
                url: Some(format!("/watch?v={}", id)),
                item_type: Some("stream".to_string()),
                title: Some(id.to_string()),
                ..StreamItem::default()
            })
            .collect(),
        ..StreamMetadata::default()
    }
}

// ============================================================================
// Stores & Presenter
// ============================================================================

#[derive(Default)]
pub struct MemoryStore {
    positions: Mutex<HashMap<String, Duration>>,
    history: Mutex<Vec<WatchHistoryEntry>>,
}

impl MemoryStore {
    pub fn position(&self, video_id: &str) -> Option<Duration> {
        self.positions.lock().unwrap().get(video_id).copied()
    }

    pub fn set_position(&self, video_id: &str, position: Duration) {
        self.positions
            .lock()
            .unwrap()
            .insert(video_id.to_string(), position);
    }

    pub fn history(&self) -> Vec<WatchHistoryEntry> {
        self.history.lock().unwrap().clone()
    }
}

#[async_trait]
impl WatchPositionStore for MemoryStore {
    async fn save_position(&self, video_id: &str, position: Duration) -> BridgeResult<()> {
        self.set_position(video_id, position);
        Ok(())
    }

    async fn find_position(&self, video_id: &str) -> BridgeResult<Option<Duration>> {
        Ok(self.position(video_id))
    }
}

#[async_trait]
impl WatchHistoryStore for MemoryStore {
    async fn record_watched(&self, entry: WatchHistoryEntry) -> BridgeResult<()> {
        self.history.lock().unwrap().push(entry);
        Ok(())
    }
}

#[derive(Default)]
pub struct RecordingPresenter {
    updates: Mutex<Vec<NowPlayingInfo>>,
    dismissed: Mutex<usize>,
}

impl RecordingPresenter {
    pub fn updates(&self) -> Vec<NowPlayingInfo> {
        self.updates.lock().unwrap().clone()
    }

    pub fn dismissed(&self) -> usize {
        *self.dismissed.lock().unwrap()
    }
}

#[async_trait]
impl NowPlayingPresenter for RecordingPresenter {
    async fn update_now_playing(&self, info: NowPlayingInfo) -> BridgeResult<()> {
        self.updates.lock().unwrap().push(info);
        Ok(())
    }

    async fn set_playing(&self, _is_playing: bool) -> BridgeResult<()> {
        Ok(())
    }

    async fn dismiss(&self) -> BridgeResult<()> {
        *self.dismissed.lock().unwrap() += 1;
        Ok(())
    }
}

struct OfflineHttp;

#[async_trait]
impl HttpClient for OfflineHttp {
    async fn execute(&self, _request: HttpRequest) -> BridgeResult<HttpResponse> {
        Err(BridgeError::NotAvailable("offline".to_string()))
    }
}

// ============================================================================
// Harness
// ============================================================================

pub struct Harness {
    pub handle: SessionHandle,
    pub provider: Arc<MockEngineProvider>,
    pub resolver: Arc<MockResolver>,
    pub store: Arc<MemoryStore>,
    pub presenter: Arc<RecordingPresenter>,
    pub task: JoinHandle<()>,
}

impl Harness {
    pub fn engine(&self) -> Arc<MockEngine> {
        self.provider.engine(0)
    }

    /// Wait until the session has processed everything submitted so far.
    pub async fn settle(&self) {
        self.handle.queue_snapshot().await.unwrap();
    }
}

/// Preferences with fast timers.
pub fn test_preferences() -> PlaybackPreferences {
    PlaybackPreferences {
        watch_position_interval: Duration::from_millis(20),
        segment_poll_interval: Duration::from_millis(10),
        ..PlaybackPreferences::default()
    }
}

pub fn spawn_session(preferences: PlaybackPreferences, resolver: MockResolver) -> Harness {
    spawn_session_with_store(preferences, resolver, MemoryStore::default())
}

pub fn spawn_session_with_store(
    preferences: PlaybackPreferences,
    resolver: MockResolver,
    store: MemoryStore,
) -> Harness {
    let provider = Arc::new(MockEngineProvider::default());
    let resolver = Arc::new(resolver);
    let store = Arc::new(store);
    let presenter = Arc::new(RecordingPresenter::default());

    let config = CoreConfig::builder()
        .http_client(Arc::new(OfflineHttp))
        .media_engine_provider(provider.clone())
        .position_store(store.clone())
        .history_store(store.clone())
        .presenter(presenter.clone())
        .clock(Arc::new(FixedClock(
            Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).unwrap(),
        )))
        .preferences(preferences)
        .build()
        .expect("valid config");

    let (controller, handle) = PlaybackSessionController::with_resolver(config, resolver.clone());
    let task = controller.spawn();

    Harness {
        handle,
        provider,
        resolver,
        store,
        presenter,
        task,
    }
}

// ============================================================================
// Waiting
// ============================================================================

pub async fn wait_for_status(
    handle: &SessionHandle,
    predicate: impl Fn(&SessionStatus) -> bool,
) -> SessionStatus {
    let mut status = handle.subscribe_status();
    let result = timeout(WAIT, status.wait_for(|s| predicate(s)))
        .await
        .expect("timed out waiting for status")
        .expect("session closed");
    result.clone()
}

pub async fn eventually(mut condition: impl FnMut() -> bool) {
    timeout(WAIT, async {
        while !condition() {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("condition not met in time");
}

pub async fn next_event(
    events: &mut EventStream,
    predicate: impl Fn(&CoreEvent) -> bool,
) -> CoreEvent {
    timeout(WAIT, async {
        loop {
            match events.recv().await {
                Ok(event) if predicate(&event) => return event,
                Ok(_) => continue,
                Err(_) => tokio::time::sleep(Duration::from_millis(1)).await,
            }
        }
    })
    .await
    .expect("timed out waiting for event")
}
