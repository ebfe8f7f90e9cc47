//! # Core Configuration Module
//!
//! Configuration for a playback session: the host bridges it drives and the
//! user preferences that shape its behavior.
//!
//! ## Overview
//!
//! The configuration system uses a builder pattern to construct a `CoreConfig`
//! instance that holds all necessary dependencies and settings. It enforces
//! fail-fast validation so a session never starts with a missing bridge.
//!
//! ## Required Dependencies
//!
//! - `MediaEngineProvider` - Creates the host media engine
//! - `HttpClient` - Streaming API access (desktop default: reqwest)
//! - `WatchPositionStore` - Required while watch positions are enabled
//! - `WatchHistoryStore` - Required while watch history is enabled
//!
//! ## Optional Dependencies
//!
//! - `NowPlayingPresenter` - Notification / media session
//! - `Clock` - Wall clock for history timestamps (default: system clock)
//! - `LoggerSink` - Host log forwarding
//!
//! ## Usage
//!
//! ```ignore
//! use core_runtime::config::{CoreConfig, PlaybackPreferences};
//! use std::sync::Arc;
//!
//! let config = CoreConfig::builder()
//!     .media_engine_provider(Arc::new(MyEngineProvider))
//!     .position_store(store.clone())
//!     .history_store(store)
//!     .preferences(PlaybackPreferences::default())
//!     .build()?;
//! ```
//!
//! ## Error Handling
//!
//! The builder returns [`Error::CapabilityMissing`] with an actionable message
//! when a required bridge is absent and [`Error::Config`] for invalid values.

use crate::error::{Error, Result};
use crate::events::EventBus;
use bridge_traits::{
    Clock, HttpClient, LoggerSink, MediaEngineProvider, NowPlayingPresenter, SystemClock,
    WatchHistoryStore, WatchPositionStore,
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

// ============================================================================
// Preferences
// ============================================================================

/// How segments of one category are handled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SkipMode {
    /// Category is ignored.
    Off,
    /// Segments are skipped (or muted) without user interaction.
    Automatic,
    /// Segments are only surfaced to the user.
    Manual,
}

/// User preferences consulted by the playback session.
///
/// Every field has a serde default so partial preference files load.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlaybackPreferences {
    /// Base URL of the streaming API.
    ///
    /// Default: `https://pipedapi.kavin.rocks`.
    #[serde(default = "default_api_url")]
    pub api_url: String,

    /// Base URL of the segment API; the streaming API serves it by default.
    #[serde(default = "default_api_url")]
    pub sponsor_block_url: String,

    /// Advance to the next queue entry when a video ends.
    #[serde(default = "default_true")]
    pub autoplay: bool,

    /// Keep advancing inside a playlist even when `autoplay` is off.
    #[serde(default = "default_true")]
    pub autoplay_playlists: bool,

    /// Start playing as soon as the engine is ready.
    #[serde(default = "default_true")]
    pub play_automatically: bool,

    /// Persist and restore per-video playback positions.
    #[serde(default = "default_true")]
    pub watch_positions_enabled: bool,

    /// Record every loaded video into the watch history.
    #[serde(default = "default_true")]
    pub watch_history_enabled: bool,

    /// Prefer the HLS address over a generated DASH manifest.
    #[serde(default)]
    pub use_hls_over_dash: bool,

    /// Play directly from the origin instead of through the API proxy.
    #[serde(default)]
    pub disable_proxy: bool,

    /// Build audio-only manifests.
    #[serde(default = "default_true")]
    pub audio_only: bool,

    /// Fetch and evaluate segments at all.
    #[serde(default = "default_true")]
    pub sponsor_block_enabled: bool,

    /// Per-category handling. Categories absent from the map are off.
    ///
    /// Default: `sponsor` skipped automatically.
    #[serde(default = "default_segment_categories")]
    pub segment_categories: BTreeMap<String, SkipMode>,

    /// Step used by rewind / forward controls.
    ///
    /// Default: 10 seconds.
    #[serde(default = "default_seek_increment")]
    pub seek_increment: Duration,

    /// Cadence of watch position saves while playing.
    ///
    /// Default: 1 second.
    #[serde(default = "default_watch_position_interval")]
    pub watch_position_interval: Duration,

    /// Cadence of segment evaluation while playing.
    ///
    /// Default: 100 milliseconds.
    #[serde(default = "default_segment_poll_interval")]
    pub segment_poll_interval: Duration,
}

impl Default for PlaybackPreferences {
    fn default() -> Self {
        Self {
            api_url: default_api_url(),
            sponsor_block_url: default_api_url(),
            autoplay: true,
            autoplay_playlists: true,
            play_automatically: true,
            watch_positions_enabled: true,
            watch_history_enabled: true,
            use_hls_over_dash: false,
            disable_proxy: false,
            audio_only: true,
            sponsor_block_enabled: true,
            segment_categories: default_segment_categories(),
            seek_increment: default_seek_increment(),
            watch_position_interval: default_watch_position_interval(),
            segment_poll_interval: default_segment_poll_interval(),
        }
    }
}

impl PlaybackPreferences {
    /// Whether a finished video should advance to the next one.
    ///
    /// Playlists have their own switch so that a playlist keeps going even
    /// with general autoplay disabled.
    pub fn autoplay_enabled(&self, has_playlist: bool) -> bool {
        self.autoplay || (has_playlist && self.autoplay_playlists)
    }

    /// Skip mode for a category, `Off` when unlisted.
    pub fn skip_mode(&self, category: &str) -> SkipMode {
        self.segment_categories
            .get(category)
            .copied()
            .unwrap_or(SkipMode::Off)
    }

    /// Categories worth fetching segments for.
    pub fn enabled_categories(&self) -> Vec<String> {
        self.segment_categories
            .iter()
            .filter(|(_, mode)| **mode != SkipMode::Off)
            .map(|(category, _)| category.clone())
            .collect()
    }

    /// Validate preference values.
    pub fn validate(&self) -> Result<()> {
        if self.api_url.trim().is_empty() {
            return Err(Error::Config("api_url cannot be empty".to_string()));
        }

        if self.sponsor_block_enabled && self.sponsor_block_url.trim().is_empty() {
            return Err(Error::Config(
                "sponsor_block_url cannot be empty while segments are enabled".to_string(),
            ));
        }

        if self.watch_position_interval.is_zero() {
            return Err(Error::Config(
                "watch_position_interval must be > 0".to_string(),
            ));
        }

        if self.segment_poll_interval.is_zero() {
            return Err(Error::Config("segment_poll_interval must be > 0".to_string()));
        }

        Ok(())
    }
}

// ============================================================================
// Default Functions (for serde)
// ============================================================================

fn default_api_url() -> String {
    "https://pipedapi.kavin.rocks".to_string()
}

fn default_true() -> bool {
    true
}

fn default_segment_categories() -> BTreeMap<String, SkipMode> {
    BTreeMap::from([("sponsor".to_string(), SkipMode::Automatic)])
}

fn default_seek_increment() -> Duration {
    Duration::from_secs(10)
}

fn default_watch_position_interval() -> Duration {
    Duration::from_secs(1)
}

fn default_segment_poll_interval() -> Duration {
    Duration::from_millis(100)
}

// ============================================================================
// Core Configuration
// ============================================================================

/// Dependencies and settings of a playback session.
///
/// Use [`CoreConfigBuilder`] to construct instances.
#[derive(Clone)]
pub struct CoreConfig {
    /// HTTP client for the streaming API
    pub http_client: Arc<dyn HttpClient>,

    /// Factory for the host media engine (required)
    pub media_engine_provider: Arc<dyn MediaEngineProvider>,

    /// Playback position persistence
    pub position_store: Option<Arc<dyn WatchPositionStore>>,

    /// Watch history persistence
    pub history_store: Option<Arc<dyn WatchHistoryStore>>,

    /// Notification / media session presenter (optional)
    pub presenter: Option<Arc<dyn NowPlayingPresenter>>,

    /// Wall clock for history timestamps
    pub clock: Arc<dyn Clock>,

    /// Host log forwarding (optional)
    pub logger_sink: Option<Arc<dyn LoggerSink>>,

    /// Bus session and queue events are published on
    pub event_bus: EventBus,

    /// User preferences
    pub preferences: PlaybackPreferences,
}

impl std::fmt::Debug for CoreConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CoreConfig")
            .field("http_client", &"HttpClient { ... }")
            .field("media_engine_provider", &"MediaEngineProvider { ... }")
            .field(
                "position_store",
                &self
                    .position_store
                    .as_ref()
                    .map(|_| "WatchPositionStore { ... }"),
            )
            .field(
                "history_store",
                &self
                    .history_store
                    .as_ref()
                    .map(|_| "WatchHistoryStore { ... }"),
            )
            .field(
                "presenter",
                &self
                    .presenter
                    .as_ref()
                    .map(|_| "NowPlayingPresenter { ... }"),
            )
            .field(
                "logger_sink",
                &self.logger_sink.as_ref().map(|_| "LoggerSink { ... }"),
            )
            .field("event_bus", &self.event_bus)
            .field("preferences", &self.preferences)
            .finish()
    }
}

impl CoreConfig {
    /// Creates a new builder for constructing a `CoreConfig`.
    pub fn builder() -> CoreConfigBuilder {
        CoreConfigBuilder::default()
    }

    /// Validates the configuration and returns an error if invalid.
    ///
    /// This checks preference values and that every enabled persistence
    /// feature has a store to write to.
    pub fn validate(&self) -> Result<()> {
        self.preferences.validate()?;

        if self.preferences.watch_positions_enabled && self.position_store.is_none() {
            return Err(Error::CapabilityMissing {
                capability: "WatchPositionStore".to_string(),
                message: "Watch positions are enabled but no WatchPositionStore was provided. \
                          Disable watch_positions_enabled or inject a store \
                          (desktop: bridge_desktop::SqliteWatchStore)."
                    .to_string(),
            });
        }

        if self.preferences.watch_history_enabled && self.history_store.is_none() {
            return Err(Error::CapabilityMissing {
                capability: "WatchHistoryStore".to_string(),
                message: "Watch history is enabled but no WatchHistoryStore was provided. \
                          Disable watch_history_enabled or inject a store \
                          (desktop: bridge_desktop::SqliteWatchStore)."
                    .to_string(),
            });
        }

        Ok(())
    }

    /// Logging configuration carrying this config's logger sink, if any.
    pub fn logging_config(&self) -> crate::logging::LoggingConfig {
        let config = crate::logging::LoggingConfig::default();
        match &self.logger_sink {
            Some(sink) => config.with_logger_sink(Arc::clone(sink)),
            None => config,
        }
    }
}

fn media_engine_missing_error() -> Error {
    Error::CapabilityMissing {
        capability: "MediaEngineProvider".to_string(),
        message: "A MediaEngineProvider is required to play anything. \
                 Inject the platform media engine (ExoPlayer/AVPlayer/GStreamer wrapper)."
            .to_string(),
    }
}

#[cfg(not(feature = "desktop-shims"))]
fn provide_default_http_client() -> Result<Arc<dyn HttpClient>> {
    Err(Error::CapabilityMissing {
        capability: "HttpClient".to_string(),
        message: "HttpClient implementation is required for the streaming API. \
                 Desktop: enable the 'desktop-shims' feature to use the default ReqwestHttpClient. \
                 Mobile: inject the platform HTTP stack."
            .to_string(),
    })
}

#[cfg(feature = "desktop-shims")]
fn provide_default_http_client() -> Result<Arc<dyn HttpClient>> {
    use bridge_desktop::ReqwestHttpClient;

    Ok(Arc::new(ReqwestHttpClient::new()?))
}

/// Builder for constructing [`CoreConfig`] instances.
#[derive(Default)]
pub struct CoreConfigBuilder {
    http_client: Option<Arc<dyn HttpClient>>,
    media_engine_provider: Option<Arc<dyn MediaEngineProvider>>,
    position_store: Option<Arc<dyn WatchPositionStore>>,
    history_store: Option<Arc<dyn WatchHistoryStore>>,
    presenter: Option<Arc<dyn NowPlayingPresenter>>,
    clock: Option<Arc<dyn Clock>>,
    logger_sink: Option<Arc<dyn LoggerSink>>,
    event_bus: Option<EventBus>,
    preferences: Option<PlaybackPreferences>,
}

impl CoreConfigBuilder {
    /// Sets the HTTP client implementation.
    pub fn http_client(mut self, client: Arc<dyn HttpClient>) -> Self {
        self.http_client = Some(client);
        self
    }

    /// Sets the media engine factory (required).
    pub fn media_engine_provider(mut self, provider: Arc<dyn MediaEngineProvider>) -> Self {
        self.media_engine_provider = Some(provider);
        self
    }

    /// Sets the watch position store.
    pub fn position_store(mut self, store: Arc<dyn WatchPositionStore>) -> Self {
        self.position_store = Some(store);
        self
    }

    /// Sets the watch history store.
    pub fn history_store(mut self, store: Arc<dyn WatchHistoryStore>) -> Self {
        self.history_store = Some(store);
        self
    }

    /// Sets the now-playing presenter (optional).
    pub fn presenter(mut self, presenter: Arc<dyn NowPlayingPresenter>) -> Self {
        self.presenter = Some(presenter);
        self
    }

    /// Sets the wall clock (optional).
    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    /// Sets the host logger sink (optional).
    pub fn logger_sink(mut self, sink: Arc<dyn LoggerSink>) -> Self {
        self.logger_sink = Some(sink);
        self
    }

    /// Publishes session events on an existing bus instead of a fresh one.
    pub fn event_bus(mut self, bus: EventBus) -> Self {
        self.event_bus = Some(bus);
        self
    }

    /// Sets the user preferences.
    pub fn preferences(mut self, preferences: PlaybackPreferences) -> Self {
        self.preferences = Some(preferences);
        self
    }

    /// Builds the final `CoreConfig` instance.
    ///
    /// # Errors
    ///
    /// - [`Error::CapabilityMissing`] when a required bridge is absent
    /// - [`Error::Config`] when preference values are invalid
    pub fn build(self) -> Result<CoreConfig> {
        let media_engine_provider = self
            .media_engine_provider
            .ok_or_else(media_engine_missing_error)?;

        let http_client = match self.http_client {
            Some(client) => client,
            None => provide_default_http_client()?,
        };

        let config = CoreConfig {
            http_client,
            media_engine_provider,
            position_store: self.position_store,
            history_store: self.history_store,
            presenter: self.presenter,
            clock: self.clock.unwrap_or_else(|| Arc::new(SystemClock)),
            logger_sink: self.logger_sink,
            event_bus: self.event_bus.unwrap_or_default(),
            preferences: self.preferences.unwrap_or_default(),
        };

        config.validate()?;

        Ok(config)
    }
}
