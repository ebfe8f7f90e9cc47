//! # Host Bridge Traits
//!
//! Contracts between the playback session core and the collaborators it
//! orchestrates but does not own.
//!
//! ## Traits
//!
//! ### Playback
//! - [`MediaEngine`](media::MediaEngine) - Decode/render engine driven by the session
//! - [`MediaEngineProvider`](media::MediaEngineProvider) - Lazy engine construction
//! - [`NowPlayingPresenter`](presenter::NowPlayingPresenter) - Notification / media session
//!
//! ### Networking
//! - [`HttpClient`](http::HttpClient) - Async HTTP used by the stream resolver
//!
//! ### Persistence
//! - [`WatchPositionStore`](storage::WatchPositionStore) - Per-video playback offsets
//! - [`WatchHistoryStore`](storage::WatchHistoryStore) - Watched-video log
//!
//! ### Utilities
//! - [`Clock`](time::Clock) - Wall-clock source for history timestamps
//! - [`LoggerSink`](time::LoggerSink) - Forward structured logs to host logging
//!
//! ## Error Handling
//!
//! All bridge traits use [`BridgeError`](error::BridgeError). Implementations
//! should convert platform errors into it with an actionable message.
//!
//! ## Thread Safety
//!
//! Every trait requires `Send + Sync` so implementations can be shared across
//! the session task and the background fetch tasks.

pub mod error;
pub mod http;
pub mod media;
pub mod presenter;
pub mod storage;
pub mod time;

pub use error::BridgeError;

// Re-export commonly used types
pub use http::{HttpClient, HttpMethod, HttpRequest, HttpResponse, RetryPolicy};
pub use media::{
    EngineEvent, EngineEventSender, MediaEngine, MediaEngineProvider, MediaMetadata, MediaSource,
    MimeType,
};
pub use presenter::{NowPlayingInfo, NowPlayingPresenter};
pub use storage::{WatchHistoryEntry, WatchHistoryStore, WatchPositionStore};
pub use time::{Clock, FixedClock, LogEntry, LogLevel, LoggerSink, SystemClock};
