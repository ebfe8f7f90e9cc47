//! # Playback Session Controller
//!
//! One actor task per session owns the play queue, the media engine, the
//! timers and all session state. Callers talk to it through a cloneable
//! [`SessionHandle`]; engine events, fetch results and timer ticks re-enter
//! the same command channel, so everything the session reacts to is handled
//! in one order on one task.
//!
//! ## Loads
//!
//! Every load bumps a generation counter. Fetch results carry the generation
//! they were started under and are dropped when it no longer matches, which
//! covers both superseding loads and a stop during loading.
//!
//! ## Usage
//!
//! ```ignore
//! use core_playback::{PlaybackSessionController, StartRequest};
//!
//! let (controller, handle) = PlaybackSessionController::new(config);
//! controller.spawn();
//!
//! handle.start(StartRequest::new("dQw4w9WgXcQ"))?;
//! let mut status = handle.subscribe_status();
//! status.changed().await?;
//! ```

use crate::error::{FetchError, PlaybackError, Result};
use crate::models::{SegmentMarker, StreamMetadata};
use crate::queue::{PlayQueue, QueueSnapshot, RepeatMode};
use crate::resolver::{PipedStreamResolver, StreamResolver};
use crate::segments::{SegmentAction, SegmentSkipEngine};
use crate::source::select_media_source;
use crate::timer::PausableTimer;
use bridge_traits::error::BridgeError;
use bridge_traits::{
    Clock, EngineEvent, EngineEventSender, MediaEngine, MediaEngineProvider, MediaSource,
    NowPlayingInfo, NowPlayingPresenter, WatchHistoryEntry, WatchHistoryStore,
    WatchPositionStore,
};
use core_runtime::config::{CoreConfig, PlaybackPreferences};
use core_runtime::events::{CoreEvent, EventBus, EventStream, QueueEvent, SessionEvent};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender, WeakUnboundedSender};
use tokio::sync::{oneshot, watch};
use tokio::task::JoinHandle;
use tracing::{debug, debug_span, error, info, info_span, trace, warn, Instrument};
use uuid::Uuid;

// ============================================================================
// Public Types
// ============================================================================

/// Externally visible state of a session.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum SessionStatus {
    /// No video loaded.
    #[default]
    Idle,
    /// Stream metadata is being fetched.
    Loading,
    /// The engine received a source and is preparing it.
    Ready,
    Playing,
    Paused,
    /// The last video finished and nothing follows.
    Ended,
    /// The engine failed; the session stays alive.
    Error { message: String },
}

impl SessionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionStatus::Idle => "idle",
            SessionStatus::Loading => "loading",
            SessionStatus::Ready => "ready",
            SessionStatus::Playing => "playing",
            SessionStatus::Paused => "paused",
            SessionStatus::Ended => "ended",
            SessionStatus::Error { .. } => "error",
        }
    }
}

impl fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SessionStatus::Error { message } => write!(f, "error: {}", message),
            other => f.write_str(other.as_str()),
        }
    }
}

/// Request to play a video.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StartRequest {
    pub video_id: String,
    pub playlist_id: Option<String>,
    pub channel_id: Option<String>,
    /// Keep the current queue instead of rebuilding it around this video.
    pub keep_queue: bool,
    /// Start offset; zero or `None` falls back to the stored position.
    pub resume_at: Option<Duration>,
}

impl StartRequest {
    pub fn new(video_id: impl Into<String>) -> Self {
        Self {
            video_id: video_id.into(),
            playlist_id: None,
            channel_id: None,
            keep_queue: false,
            resume_at: None,
        }
    }

    pub fn with_playlist(mut self, playlist_id: impl Into<String>) -> Self {
        self.playlist_id = Some(playlist_id.into());
        self
    }

    pub fn with_channel(mut self, channel_id: impl Into<String>) -> Self {
        self.channel_id = Some(channel_id.into());
        self
    }

    pub fn keep_queue(mut self, keep: bool) -> Self {
        self.keep_queue = keep;
        self
    }

    pub fn resume_at(mut self, position: Duration) -> Self {
        self.resume_at = Some(position);
        self
    }
}

/// Transport controls, as sent by notification buttons or media keys.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlAction {
    Next,
    Prev,
    Stop,
    PlayPause,
    Seek(Duration),
    Rewind,
    Forward,
}

// ============================================================================
// Commands
// ============================================================================

enum SessionCommand {
    Start(StartRequest),
    Stop,
    SeekTo(Duration),
    Control(ControlAction),
    SelectQueueEntry(usize),
    SetRepeatMode(RepeatMode),
    CurrentPosition(oneshot::Sender<Option<Duration>>),
    CurrentDuration(oneshot::Sender<Option<Duration>>),
    Snapshot(oneshot::Sender<QueueSnapshot>),
    Metadata(oneshot::Sender<Option<Arc<StreamMetadata>>>),
    QueueTapped(String),
    StreamsFetched {
        generation: u64,
        result: std::result::Result<StreamMetadata, FetchError>,
    },
    SegmentsFetched {
        generation: u64,
        result: std::result::Result<Vec<SegmentMarker>, FetchError>,
    },
    Engine {
        epoch: u64,
        event: EngineEvent,
    },
    WatchPositionTick,
    SegmentTick,
    Shutdown(oneshot::Sender<()>),
}

// ============================================================================
// Session Handle
// ============================================================================

/// Cloneable handle to a running session.
///
/// The session shuts down once every handle is dropped.
#[derive(Clone)]
pub struct SessionHandle {
    commands: UnboundedSender<SessionCommand>,
    status: watch::Receiver<SessionStatus>,
    events: EventBus,
}

impl fmt::Debug for SessionHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionHandle")
            .field("status", &*self.status.borrow())
            .field("closed", &self.commands.is_closed())
            .finish()
    }
}

impl SessionHandle {
    fn send(&self, command: SessionCommand) -> Result<()> {
        self.commands
            .send(command)
            .map_err(|_| PlaybackError::SessionClosed)
    }

    async fn request<T>(
        &self,
        command: impl FnOnce(oneshot::Sender<T>) -> SessionCommand,
    ) -> Result<T> {
        let (reply, response) = oneshot::channel();
        self.send(command(reply))?;
        response.await.map_err(|_| PlaybackError::SessionClosed)
    }

    /// Load and play a video.
    pub fn start(&self, request: StartRequest) -> Result<()> {
        self.send(SessionCommand::Start(request))
    }

    /// Stop playback, release the engine and reset the queue.
    pub fn stop(&self) -> Result<()> {
        self.send(SessionCommand::Stop)
    }

    pub fn seek_to(&self, position: Duration) -> Result<()> {
        self.send(SessionCommand::SeekTo(position))
    }

    pub fn control(&self, action: ControlAction) -> Result<()> {
        self.send(SessionCommand::Control(action))
    }

    /// Play the queue entry at `index`.
    pub fn select_queue_entry(&self, index: usize) -> Result<()> {
        self.send(SessionCommand::SelectQueueEntry(index))
    }

    pub fn set_repeat_mode(&self, mode: RepeatMode) -> Result<()> {
        self.send(SessionCommand::SetRepeatMode(mode))
    }

    /// Engine position, `None` without an engine.
    pub async fn current_position(&self) -> Result<Option<Duration>> {
        self.request(SessionCommand::CurrentPosition).await
    }

    /// Duration of the current video, `None` while unknown.
    pub async fn duration(&self) -> Result<Option<Duration>> {
        self.request(SessionCommand::CurrentDuration).await
    }

    pub async fn queue_snapshot(&self) -> Result<QueueSnapshot> {
        self.request(SessionCommand::Snapshot).await
    }

    /// Metadata of the loaded video.
    pub async fn metadata(&self) -> Result<Option<Arc<StreamMetadata>>> {
        self.request(SessionCommand::Metadata).await
    }

    pub fn status(&self) -> SessionStatus {
        self.status.borrow().clone()
    }

    pub fn subscribe_status(&self) -> watch::Receiver<SessionStatus> {
        self.status.clone()
    }

    pub fn subscribe_events(&self) -> EventStream {
        self.events.stream()
    }

    /// Stop the session and wait for its task to exit.
    pub async fn shutdown(&self) -> Result<()> {
        self.request(SessionCommand::Shutdown).await
    }

    pub fn is_closed(&self) -> bool {
        self.commands.is_closed()
    }
}

// ============================================================================
// Controller
// ============================================================================

struct EngineSlot {
    engine: Arc<dyn MediaEngine>,
    epoch: u64,
}

struct SessionState {
    video_id: String,
    playlist_id: Option<String>,
    channel_id: Option<String>,
    metadata: Arc<StreamMetadata>,
    history_recorded: bool,
}

struct PendingLoad {
    request: StartRequest,
    generation: u64,
    previous_status: SessionStatus,
    previous_transitioning: bool,
}

fn loopback_tick(
    loopback: WeakUnboundedSender<SessionCommand>,
    command: fn() -> SessionCommand,
) -> impl Fn() + Send + Sync + 'static {
    move || {
        if let Some(commands) = loopback.upgrade() {
            let _ = commands.send(command());
        }
    }
}

fn millis(seconds: f64) -> u64 {
    (seconds.max(0.0) * 1000.0).round() as u64
}

/// The session actor. Create it with [`PlaybackSessionController::new`] and
/// drive it with [`run`](Self::run) or [`spawn`](Self::spawn).
pub struct PlaybackSessionController {
    session_id: Uuid,
    preferences: PlaybackPreferences,
    resolver: Arc<dyn StreamResolver>,
    engine_provider: Arc<dyn MediaEngineProvider>,
    position_store: Option<Arc<dyn WatchPositionStore>>,
    history_store: Option<Arc<dyn WatchHistoryStore>>,
    presenter: Option<Arc<dyn NowPlayingPresenter>>,
    clock: Arc<dyn Clock>,
    events: EventBus,
    commands: UnboundedReceiver<SessionCommand>,
    loopback: WeakUnboundedSender<SessionCommand>,
    status: watch::Sender<SessionStatus>,
    queue: PlayQueue,
    segments: SegmentSkipEngine,
    watch_timer: PausableTimer,
    segment_timer: PausableTimer,
    engine: Option<EngineSlot>,
    engine_epoch: u64,
    generation: u64,
    current: Option<SessionState>,
    pending: Option<PendingLoad>,
    transitioning: bool,
    is_playing: bool,
}

impl PlaybackSessionController {
    /// Session resolving streams through the configured streaming API.
    pub fn new(config: CoreConfig) -> (Self, SessionHandle) {
        let resolver = Arc::new(PipedStreamResolver::from_preferences(
            Arc::clone(&config.http_client),
            &config.preferences,
        ));
        Self::with_resolver(config, resolver)
    }

    /// Session using a custom stream resolver.
    pub fn with_resolver(
        config: CoreConfig,
        resolver: Arc<dyn StreamResolver>,
    ) -> (Self, SessionHandle) {
        let (commands_tx, commands) = mpsc::unbounded_channel();
        let (status, status_rx) = watch::channel(SessionStatus::Idle);
        let loopback = commands_tx.downgrade();
        let preferences = config.preferences;

        let watch_timer = PausableTimer::new(
            "watch_position",
            preferences.watch_position_interval,
            loopback_tick(loopback.clone(), || SessionCommand::WatchPositionTick),
        );
        let segment_timer = PausableTimer::new(
            "segment_poll",
            preferences.segment_poll_interval,
            loopback_tick(loopback.clone(), || SessionCommand::SegmentTick),
        );

        let controller = Self {
            session_id: Uuid::new_v4(),
            segments: SegmentSkipEngine::new(preferences.segment_categories.clone()),
            preferences,
            resolver,
            engine_provider: config.media_engine_provider,
            position_store: config.position_store,
            history_store: config.history_store,
            presenter: config.presenter,
            clock: config.clock,
            events: config.event_bus.clone(),
            commands,
            loopback,
            status,
            queue: PlayQueue::new(),
            watch_timer,
            segment_timer,
            engine: None,
            engine_epoch: 0,
            generation: 0,
            current: None,
            pending: None,
            transitioning: false,
            is_playing: false,
        };

        let handle = SessionHandle {
            commands: commands_tx,
            status: status_rx,
            events: config.event_bus,
        };

        (controller, handle)
    }

    /// Run the session on a new tokio task.
    pub fn spawn(self) -> JoinHandle<()> {
        tokio::spawn(self.run())
    }

    /// Process commands until shutdown or until every handle is dropped.
    pub async fn run(mut self) {
        let span = info_span!("playback_session", session_id = %self.session_id);
        async move {
            info!("Playback session started");
            while let Some(command) = self.commands.recv().await {
                if !self.handle(command).await {
                    return;
                }
            }
            debug!("All session handles dropped");
            self.shutdown().await;
        }
        .instrument(span)
        .await
    }

    /// Returns `false` once the loop should exit.
    async fn handle(&mut self, command: SessionCommand) -> bool {
        match command {
            SessionCommand::Start(request) => self.start(request).await,
            SessionCommand::Stop => self.stop().await,
            SessionCommand::SeekTo(position) => self.seek_to(position).await,
            SessionCommand::Control(action) => self.control(action).await,
            SessionCommand::SelectQueueEntry(index) => {
                if !self.queue.select(index) {
                    debug!(index, len = self.queue.len(), "Queue index out of range");
                }
            }
            SessionCommand::SetRepeatMode(mode) => {
                debug!(?mode, "Repeat mode changed");
                self.queue.set_repeat_mode(mode);
            }
            SessionCommand::CurrentPosition(reply) => {
                let position = match self.engine_handle() {
                    Some(engine) => engine.position().await.ok(),
                    None => None,
                };
                let _ = reply.send(position);
            }
            SessionCommand::CurrentDuration(reply) => {
                let engine_duration = match self.engine_handle() {
                    Some(engine) => engine.duration().await.ok().flatten(),
                    None => None,
                };
                let duration = engine_duration.or_else(|| {
                    self.current
                        .as_ref()
                        .and_then(|state| state.metadata.duration())
                });
                let _ = reply.send(duration);
            }
            SessionCommand::Snapshot(reply) => {
                let _ = reply.send(self.queue.snapshot());
            }
            SessionCommand::Metadata(reply) => {
                let _ = reply.send(
                    self.current
                        .as_ref()
                        .map(|state| Arc::clone(&state.metadata)),
                );
            }
            SessionCommand::QueueTapped(video_id) => self.play_queue_entry(video_id).await,
            SessionCommand::StreamsFetched { generation, result } => {
                self.on_streams_fetched(generation, result).await
            }
            SessionCommand::SegmentsFetched { generation, result } => {
                self.on_segments_fetched(generation, result)
            }
            SessionCommand::Engine { epoch, event } => self.on_engine_event(epoch, event).await,
            SessionCommand::WatchPositionTick => self.save_watch_position().await,
            SessionCommand::SegmentTick => self.poll_segments().await,
            SessionCommand::Shutdown(ack) => {
                self.shutdown().await;
                let _ = ack.send(());
                return false;
            }
        }
        true
    }

    // ========================================================================
    // Helpers
    // ========================================================================

    fn engine_handle(&self) -> Option<Arc<dyn MediaEngine>> {
        self.engine.as_ref().map(|slot| Arc::clone(&slot.engine))
    }

    fn current_status(&self) -> SessionStatus {
        self.status.borrow().clone()
    }

    /// Id of the video being loaded, else of the loaded one.
    fn active_video_id(&self) -> Option<String> {
        self.pending
            .as_ref()
            .map(|pending| pending.request.video_id.clone())
            .or_else(|| self.current.as_ref().map(|state| state.video_id.clone()))
    }

    fn is_alive(&self) -> bool {
        self.current.is_some() || self.pending.is_some()
    }

    fn emit(&self, event: SessionEvent) {
        // No subscribers is fine
        let _ = self.events.emit(CoreEvent::Session(event));
    }

    fn set_status(&self, status: SessionStatus) {
        if *self.status.borrow() == status {
            return;
        }
        debug!(status = %status, "Session status changed");
        self.emit(SessionEvent::StatusChanged {
            video_id: self.active_video_id(),
            status: status.as_str().to_string(),
        });
        self.status.send_replace(status);
    }

    fn pause_timers(&self) {
        self.watch_timer.pause();
        self.segment_timer.pause();
    }

    /// Run the timers only while actually playing a loaded video.
    fn sync_timers(&self) {
        let playing = !self.transitioning
            && self.pending.is_none()
            && self.current.is_some()
            && self.current_status() == SessionStatus::Playing;

        if playing {
            self.watch_timer.resume();
            if self.segments.is_active() {
                self.segment_timer.resume();
            } else {
                self.segment_timer.pause();
            }
        } else {
            self.pause_timers();
        }
    }

    fn register_queue_listeners(&mut self) {
        let loopback = self.loopback.clone();
        self.queue.set_on_queue_tap_listener(move |entry| {
            if let Some(commands) = loopback.upgrade() {
                let _ = commands.send(SessionCommand::QueueTapped(entry.id.clone()));
            }
        });
    }

    fn register_queue_change_listener(&mut self) {
        let events = self.events.clone();
        self.queue.add_queue_change_listener(move |snapshot| {
            let _ = events.emit(CoreEvent::Queue(QueueEvent::Changed {
                length: snapshot.entries.len(),
                current_index: snapshot.current_index,
                current_id: snapshot.current().map(|entry| entry.id.clone()),
            }));
        });
    }

    fn ensure_engine(&mut self) -> std::result::Result<Arc<dyn MediaEngine>, BridgeError> {
        if let Some(engine) = self.engine_handle() {
            return Ok(engine);
        }

        self.engine_epoch += 1;
        let epoch = self.engine_epoch;
        let loopback = self.loopback.clone();
        let events = EngineEventSender::new(move |event| {
            if let Some(commands) = loopback.upgrade() {
                let _ = commands.send(SessionCommand::Engine { epoch, event });
            }
        });

        let engine = self.engine_provider.create(events)?;
        info!(epoch, "Media engine created");
        self.engine = Some(EngineSlot {
            engine: Arc::clone(&engine),
            epoch,
        });
        Ok(engine)
    }

    /// Enter the error state; the session stays alive for a new start.
    fn fail(&mut self, message: String) {
        error!(video_id = ?self.active_video_id(), %message, "Playback failed");
        self.transitioning = false;
        self.pause_timers();
        self.emit(SessionEvent::Error {
            video_id: self.active_video_id(),
            message: message.clone(),
        });
        self.set_status(SessionStatus::Error { message });
    }

    // ========================================================================
    // Loading
    // ========================================================================

    async fn start(&mut self, request: StartRequest) {
        info!(
            video_id = %request.video_id,
            keep_queue = request.keep_queue,
            "Start requested"
        );
        if !self.is_alive() {
            self.queue.reset_to_defaults();
            self.register_queue_change_listener();
        }
        self.register_queue_listeners();
        self.load(request);
    }

    fn load(&mut self, request: StartRequest) {
        self.generation += 1;
        let generation = self.generation;

        let (previous_status, previous_transitioning) = match self.pending.take() {
            Some(superseded) => {
                debug!(video_id = %superseded.request.video_id, "Superseding pending load");
                (superseded.previous_status, superseded.previous_transitioning)
            }
            None => (self.current_status(), self.transitioning),
        };

        self.transitioning = true;
        self.pause_timers();
        self.pending = Some(PendingLoad {
            request: request.clone(),
            generation,
            previous_status,
            previous_transitioning,
        });
        self.set_status(SessionStatus::Loading);

        let resolver = Arc::clone(&self.resolver);
        let loopback = self.loopback.clone();
        let video_id = request.video_id;
        let span = debug_span!("fetch_streams", video_id = %video_id, generation);
        tokio::spawn(
            async move {
                let result = resolver.resolve(&video_id).await;
                if let Some(commands) = loopback.upgrade() {
                    let _ = commands.send(SessionCommand::StreamsFetched { generation, result });
                }
            }
            .instrument(span),
        );
    }

    /// Undo the bookkeeping of a load that will not happen.
    fn abort_load(&mut self, pending: PendingLoad) {
        self.transitioning = pending.previous_transitioning;
        self.set_status(pending.previous_status);
        self.sync_timers();
    }

    async fn on_streams_fetched(
        &mut self,
        generation: u64,
        result: std::result::Result<StreamMetadata, FetchError>,
    ) {
        if self.pending.as_ref().map(|pending| pending.generation) != Some(generation) {
            debug!(generation, current = self.generation, "Discarding stale stream fetch");
            return;
        }
        let Some(pending) = self.pending.take() else {
            return;
        };
        let video_id = pending.request.video_id.clone();

        let streams = match result {
            Ok(streams) => streams,
            Err(e) => {
                warn!(%video_id, error = %e, "Stream fetch failed, load aborted");
                self.abort_load(pending);
                return;
            }
        };

        let source = match select_media_source(&video_id, &streams, &self.preferences) {
            Ok(source) => source,
            Err(e) => {
                error!(%video_id, error = %e, "Load aborted");
                self.abort_load(pending);
                return;
            }
        };

        self.begin_playback(pending.request, streams, source).await;
    }

    async fn begin_playback(
        &mut self,
        request: StartRequest,
        streams: StreamMetadata,
        source: MediaSource,
    ) {
        let StartRequest {
            video_id,
            playlist_id,
            channel_id,
            keep_queue,
            resume_at,
        } = request;

        if !keep_queue {
            self.queue.clear();
        }
        let entry = streams.to_queue_entry(&video_id);
        if self.queue.is_empty() {
            self.queue.update_queue(
                entry.clone(),
                playlist_id.clone(),
                channel_id.clone(),
                streams.related_entries(),
            );
        } else if self.queue.is_last() && playlist_id.is_none() && channel_id.is_none() {
            let added = self.queue.insert_related_streams(streams.related_entries());
            debug!(added, "Extended queue with related videos");
        }
        self.queue.update_current(entry);

        if let Some(action) = self.segments.reset() {
            self.apply_segment_action(action).await;
        }
        self.segments.set_segments(Vec::new());

        let metadata = Arc::new(streams);
        self.current = Some(SessionState {
            video_id: video_id.clone(),
            playlist_id,
            channel_id,
            metadata: Arc::clone(&metadata),
            history_recorded: false,
        });

        let engine = match self.ensure_engine() {
            Ok(engine) => engine,
            Err(e) => {
                self.fail(format!("Media engine unavailable: {}", e));
                return;
            }
        };
        if let Err(e) = self
            .prepare_engine(&engine, &video_id, source, resume_at, metadata.duration())
            .await
        {
            self.fail(format!("Failed to start playback: {}", e));
            return;
        }

        self.present_now_playing(&video_id, &metadata).await;
        self.emit(SessionEvent::NewVideo {
            video_id: video_id.clone(),
            title: metadata.title.clone(),
            uploader: metadata.uploader.clone(),
            thumbnail_url: metadata.thumbnail_url.clone(),
            duration_secs: metadata.duration().map(|d| d.as_secs()).unwrap_or_default(),
        });
        info!(%video_id, title = %metadata.title, "Video loaded");

        self.set_status(SessionStatus::Ready);
        self.fetch_segments(&video_id);
    }

    async fn prepare_engine(
        &self,
        engine: &Arc<dyn MediaEngine>,
        video_id: &str,
        source: MediaSource,
        resume_at: Option<Duration>,
        duration: Option<Duration>,
    ) -> std::result::Result<(), BridgeError> {
        engine.set_source(source).await?;

        let start_at = match resume_at.filter(|position| !position.is_zero()) {
            Some(position) => Some(position),
            None => self.stored_position(video_id, duration).await,
        };
        if let Some(position) = start_at {
            debug!(video_id, position_ms = position.as_millis() as u64, "Resuming playback");
            engine.seek_to(position).await?;
        }

        engine.prepare().await?;
        if self.preferences.play_automatically {
            engine.play().await?;
        }
        Ok(())
    }

    async fn stored_position(&self, video_id: &str, duration: Option<Duration>) -> Option<Duration> {
        if !self.preferences.watch_positions_enabled {
            return None;
        }
        let store = self.position_store.as_ref()?;
        match store.get_position(video_id, duration).await {
            Ok(position) => position,
            Err(e) => {
                warn!(video_id, error = %e, "Failed to read watch position");
                None
            }
        }
    }

    async fn present_now_playing(&self, video_id: &str, metadata: &StreamMetadata) {
        let Some(presenter) = &self.presenter else {
            return;
        };
        let info = NowPlayingInfo {
            video_id: video_id.to_string(),
            title: Some(metadata.title.clone()),
            uploader: Some(metadata.uploader.clone()),
            thumbnail_url: metadata.thumbnail_url.clone(),
        };
        if let Err(e) = presenter.update_now_playing(info).await {
            warn!(error = %e, "Failed to update now playing");
        }
    }

    fn fetch_segments(&self, video_id: &str) {
        if !self.preferences.sponsor_block_enabled {
            return;
        }
        let categories = self.preferences.enabled_categories();
        if categories.is_empty() {
            return;
        }

        let generation = self.generation;
        let resolver = Arc::clone(&self.resolver);
        let loopback = self.loopback.clone();
        let video_id = video_id.to_string();
        let span = debug_span!("fetch_segments", video_id = %video_id, generation);
        tokio::spawn(
            async move {
                let result = resolver.segments(&video_id, &categories).await;
                if let Some(commands) = loopback.upgrade() {
                    let _ = commands.send(SessionCommand::SegmentsFetched { generation, result });
                }
            }
            .instrument(span),
        );
    }

    fn on_segments_fetched(
        &mut self,
        generation: u64,
        result: std::result::Result<Vec<SegmentMarker>, FetchError>,
    ) {
        if generation != self.generation || self.pending.is_some() {
            debug!(generation, current = self.generation, "Discarding stale segments");
            return;
        }
        match result {
            Ok(segments) => {
                debug!(count = segments.len(), "Segments loaded");
                let duration = self
                    .current
                    .as_ref()
                    .and_then(|state| state.metadata.duration())
                    .map(|duration| duration.as_secs_f64());
                let segments = match duration {
                    Some(duration) => segments
                        .into_iter()
                        .map(|segment| segment.clamped_to(duration))
                        .collect(),
                    None => segments,
                };
                self.segments.set_segments(segments);
                self.sync_timers();
            }
            Err(e) => warn!(error = %e, "Segment fetch failed"),
        }
    }

    async fn play_queue_entry(&mut self, video_id: String) {
        if !self.is_alive() {
            debug!(%video_id, "Ignoring queue tap without a session");
            return;
        }
        self.save_watch_position().await;

        let (playlist_id, channel_id) = self
            .current
            .as_ref()
            .map(|state| (state.playlist_id.clone(), state.channel_id.clone()))
            .unwrap_or_default();
        self.load(StartRequest {
            video_id,
            playlist_id,
            channel_id,
            keep_queue: true,
            resume_at: None,
        });
    }

    // ========================================================================
    // Engine Events
    // ========================================================================

    async fn on_engine_event(&mut self, epoch: u64, event: EngineEvent) {
        if self.engine.as_ref().map(|slot| slot.epoch) != Some(epoch) {
            debug!(epoch, ?event, "Dropping event from released engine");
            return;
        }

        match event {
            EngineEvent::Buffering => trace!("Engine buffering"),
            EngineEvent::Ready => self.on_ready().await,
            EngineEvent::IsPlayingChanged(playing) => self.on_playing_changed(playing).await,
            EngineEvent::Ended => self.on_ended().await,
            EngineEvent::Error(message) => self.fail(message),
        }
    }

    async fn on_ready(&mut self) {
        // Belongs to the source being replaced
        if self.pending.is_some() {
            return;
        }
        let Some(state) = self.current.as_mut() else {
            return;
        };
        self.transitioning = false;

        let history = if state.history_recorded {
            None
        } else {
            state.history_recorded = true;
            Some(WatchHistoryEntry {
                video_id: state.video_id.clone(),
                title: state.metadata.title.clone(),
                uploader: state.metadata.uploader.clone(),
                uploader_url: state.metadata.uploader_url.clone(),
                thumbnail_url: state.metadata.thumbnail_url.clone(),
                duration_secs: state
                    .metadata
                    .duration()
                    .map(|d| d.as_secs())
                    .unwrap_or_default(),
                upload_date: state.metadata.upload_date.clone(),
                watched_at: self.clock.now(),
            })
        };
        if let Some(entry) = history {
            self.record_history(entry).await;
        }

        let status = if self.current_status() == SessionStatus::Ready {
            self.preferences.play_automatically
        } else {
            self.is_playing
        };
        self.set_status(if status {
            SessionStatus::Playing
        } else {
            SessionStatus::Paused
        });
        self.sync_timers();
    }

    async fn record_history(&self, entry: WatchHistoryEntry) {
        if !self.preferences.watch_history_enabled {
            return;
        }
        let Some(store) = &self.history_store else {
            return;
        };
        let video_id = entry.video_id.clone();
        match store.record_watched(entry).await {
            Ok(()) => debug!(%video_id, "Recorded in watch history"),
            Err(e) => warn!(%video_id, error = %e, "Failed to record watch history"),
        }
    }

    async fn on_playing_changed(&mut self, playing: bool) {
        self.is_playing = playing;
        self.emit(SessionEvent::StateOrPlayingChanged {
            is_playing: playing,
        });
        if let Some(presenter) = &self.presenter {
            if let Err(e) = presenter.set_playing(playing).await {
                warn!(error = %e, "Failed to update presenter");
            }
        }

        if self.pending.is_none() && self.current.is_some() {
            let status = self.current_status();
            if playing && !matches!(status, SessionStatus::Idle | SessionStatus::Loading) {
                self.set_status(SessionStatus::Playing);
            } else if !playing && matches!(status, SessionStatus::Playing | SessionStatus::Ready) {
                self.set_status(SessionStatus::Paused);
                self.save_watch_position().await;
            }
        }
        self.sync_timers();
    }

    async fn on_ended(&mut self) {
        if self.transitioning || self.pending.is_some() {
            debug!("Ignoring end of stream while transitioning");
            return;
        }
        let Some(state) = &self.current else {
            return;
        };
        let has_playlist = state.playlist_id.is_some();
        let context = (state.playlist_id.clone(), state.channel_id.clone());

        if self.queue.repeat_mode() == RepeatMode::One {
            if let Some(engine) = self.engine_handle() {
                debug!("Repeating current video");
                if let Err(e) = engine.seek_to(Duration::ZERO).await {
                    warn!(error = %e, "Failed to rewind for repeat");
                } else if let Err(e) = engine.play().await {
                    warn!(error = %e, "Failed to restart video");
                }
            }
            return;
        }

        self.save_watch_position().await;

        if !self.preferences.autoplay_enabled(has_playlist) {
            info!("Autoplay disabled, session ended");
            self.finish();
            return;
        }

        match self.queue.get_next() {
            Some(next) => {
                info!(video_id = %next, "Advancing to next video");
                let (playlist_id, channel_id) = context;
                self.load(StartRequest {
                    video_id: next,
                    playlist_id,
                    channel_id,
                    keep_queue: true,
                    resume_at: None,
                });
            }
            None => {
                info!("Queue exhausted");
                self.finish();
            }
        }
    }

    fn finish(&self) {
        self.pause_timers();
        self.set_status(SessionStatus::Ended);
    }

    // ========================================================================
    // Controls
    // ========================================================================

    async fn control(&mut self, action: ControlAction) {
        debug!(?action, "Control action");
        match action {
            ControlAction::Stop => self.stop().await,
            ControlAction::Next => {
                if !self.queue.navigate_next() {
                    debug!("No next queue entry");
                }
            }
            ControlAction::Prev => {
                if !self.queue.navigate_prev() {
                    debug!("No previous queue entry");
                }
            }
            ControlAction::PlayPause => {
                let Some(engine) = self.engine_handle() else {
                    debug!("Ignoring play/pause without an engine");
                    return;
                };
                let result = if self.is_playing {
                    engine.pause().await
                } else {
                    engine.play().await
                };
                if let Err(e) = result {
                    warn!(error = %e, "Failed to toggle playback");
                }
            }
            ControlAction::Seek(position) => self.seek_to(position).await,
            ControlAction::Rewind | ControlAction::Forward => {
                let Some(engine) = self.engine_handle() else {
                    debug!("Ignoring seek without an engine");
                    return;
                };
                let position = match engine.position().await {
                    Ok(position) => position,
                    Err(e) => {
                        warn!(error = %e, "Failed to read position");
                        return;
                    }
                };
                let step = self.preferences.seek_increment;
                let target = if action == ControlAction::Rewind {
                    position.saturating_sub(step)
                } else {
                    let target = position + step;
                    match engine.duration().await.ok().flatten() {
                        Some(duration) => target.min(duration),
                        None => target,
                    }
                };
                self.seek_to(target).await;
            }
        }
    }

    async fn seek_to(&mut self, position: Duration) {
        let Some(engine) = self.engine_handle() else {
            debug!("Ignoring seek without an engine");
            return;
        };
        if let Err(e) = engine.seek_to(position).await {
            warn!(error = %e, "Seek failed");
            return;
        }
        if let Some(action) = self.segments.reset() {
            self.apply_segment_action(action).await;
        }
    }

    async fn stop(&mut self) {
        let video_id = self.active_video_id();
        info!(video_id = ?video_id, "Stopping session");

        self.save_watch_position().await;
        self.pause_timers();
        self.queue.reset_to_defaults();
        if let Some(action) = self.segments.clear() {
            self.apply_segment_action(action).await;
        }

        self.generation += 1;
        self.pending = None;
        self.current = None;
        self.transitioning = false;
        self.is_playing = false;

        if let Some(slot) = self.engine.take() {
            if let Err(e) = slot.engine.release().await {
                warn!(error = %e, "Failed to release media engine");
            }
            debug!(epoch = slot.epoch, "Media engine released");
        }
        if let Some(presenter) = &self.presenter {
            if let Err(e) = presenter.dismiss().await {
                warn!(error = %e, "Failed to dismiss presenter");
            }
        }

        self.set_status(SessionStatus::Idle);
        self.emit(SessionEvent::Stopped { video_id });
    }

    async fn shutdown(&mut self) {
        if self.is_alive() || self.engine.is_some() {
            self.stop().await;
        }
        self.watch_timer.destroy();
        self.segment_timer.destroy();
        info!("Playback session closed");
    }

    // ========================================================================
    // Timer Ticks
    // ========================================================================

    async fn save_watch_position(&self) {
        if self.transitioning || !self.preferences.watch_positions_enabled {
            return;
        }
        let (Some(state), Some(engine), Some(store)) =
            (&self.current, self.engine_handle(), &self.position_store)
        else {
            return;
        };

        match engine.position().await {
            Ok(position) => {
                if let Err(e) = store.save_position(&state.video_id, position).await {
                    warn!(video_id = %state.video_id, error = %e, "Failed to save watch position");
                } else {
                    trace!(
                        video_id = %state.video_id,
                        position_ms = position.as_millis() as u64,
                        "Saved watch position"
                    );
                }
            }
            Err(e) => debug!(error = %e, "Position unavailable"),
        }
    }

    async fn poll_segments(&mut self) {
        if self.transitioning || self.pending.is_some() {
            return;
        }
        let Some(engine) = self.engine_handle() else {
            return;
        };
        let position = match engine.position().await {
            Ok(position) => position,
            Err(e) => {
                debug!(error = %e, "Position unavailable");
                return;
            }
        };
        if let Some(action) = self.segments.evaluate(position.as_secs_f64()) {
            self.apply_segment_action(action).await;
        }
    }

    async fn apply_segment_action(&mut self, action: SegmentAction) {
        let Some(engine) = self.engine_handle() else {
            return;
        };
        let video_id = self
            .current
            .as_ref()
            .map(|state| state.video_id.clone())
            .unwrap_or_default();

        match action {
            SegmentAction::JumpTo { target, segment } => {
                let Ok(position) = Duration::try_from_secs_f64(target) else {
                    warn!(category = %segment.category, target, "Segment end out of range");
                    return;
                };
                if let Err(e) = engine.seek_to(position).await {
                    warn!(error = %e, "Segment skip failed");
                    return;
                }
                info!(
                    category = %segment.category,
                    from = segment.start,
                    to = target,
                    "Skipped segment"
                );
                self.emit(SessionEvent::SegmentSkipped {
                    video_id,
                    category: segment.category,
                    from_ms: millis(segment.start),
                    to_ms: millis(target),
                });
            }
            SegmentAction::MuteStart(segment) => {
                debug!(category = %segment.category, "Muting segment");
                if let Err(e) = engine.set_muted(true).await {
                    warn!(error = %e, "Failed to mute");
                }
            }
            SegmentAction::MuteEnd => {
                if let Err(e) = engine.set_muted(false).await {
                    warn!(error = %e, "Failed to unmute");
                }
            }
            SegmentAction::Highlight(segment) => {
                self.emit(SessionEvent::SegmentHighlighted {
                    video_id,
                    category: segment.category,
                    start_ms: millis(segment.start),
                    end_ms: millis(segment.end),
                });
            }
        }
    }
}
