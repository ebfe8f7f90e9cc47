//! # Event Bus System
//!
//! Broadcasts playback session and queue notifications to any number of
//! observers using `tokio::sync::broadcast`.
//!
//! ## Overview
//!
//! - **Event Types**: [`SessionEvent`] for the playback lifecycle and
//!   [`QueueEvent`] for play-queue changes, wrapped in [`CoreEvent`]
//! - **EventBus**: Central broadcast channel for publishing events
//! - **EventStream**: Wrapper for consuming events with filtering
//!
//! ## Architecture
//!
//! ```text
//! ┌────────────────────┐  emit   ┌───────────┐  subscribe  ┌──────────────┐
//! │ Session controller ├────────>│ EventBus  ├────────────>│ Notification │
//! └────────────────────┘         │ (broadcast│             └──────────────┘
//!                                │  channel) │  subscribe  ┌──────────────┐
//!                                │           ├────────────>│ UI / logging │
//!                                └───────────┘             └──────────────┘
//! ```
//!
//! Observers are expected to resynchronize their whole display on each event
//! rather than diff incrementally; events carry enough data to do so.
//!
//! ## Usage
//!
//! ```rust
//! use core_runtime::events::{CoreEvent, EventBus, SessionEvent};
//!
//! # #[tokio::main]
//! # async fn main() {
//! let event_bus = EventBus::new(100);
//! let mut stream = event_bus.subscribe();
//!
//! event_bus
//!     .emit(CoreEvent::Session(SessionEvent::StateOrPlayingChanged {
//!         is_playing: true,
//!     }))
//!     .ok();
//!
//! let event = stream.recv().await.unwrap();
//! assert_eq!(event.description(), "Playing state changed");
//! # }
//! ```
//!
//! ## Error Handling
//!
//! - **`RecvError::Lagged(n)`**: Subscriber was too slow and missed `n` events.
//!   This is non-fatal; the subscriber can continue receiving new events.
//! - **`RecvError::Closed`**: All senders have been dropped. This indicates shutdown.
//!
//! Emitting with no subscribers returns an error that publishers ignore.

use serde::{Deserialize, Serialize};
use std::fmt;
use tokio::sync::broadcast;

// Re-export commonly used types
pub use tokio::sync::broadcast::error::{RecvError, SendError};
pub use tokio::sync::broadcast::Receiver;

/// Default buffer size for the event bus channel.
///
/// Subscribers that can't keep up will receive `RecvError::Lagged`.
pub const DEFAULT_EVENT_BUFFER_SIZE: usize = 100;

// ============================================================================
// Core Event Types
// ============================================================================

/// Top-level event enum published and received through the event bus.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", content = "payload")]
pub enum CoreEvent {
    /// Playback session lifecycle events
    Session(SessionEvent),
    /// Play queue events
    Queue(QueueEvent),
}

impl CoreEvent {
    /// Returns a human-readable description of the event.
    pub fn description(&self) -> &str {
        match self {
            CoreEvent::Session(e) => e.description(),
            CoreEvent::Queue(e) => e.description(),
        }
    }

    /// Returns the severity level of the event.
    pub fn severity(&self) -> EventSeverity {
        match self {
            CoreEvent::Session(SessionEvent::Error { .. }) => EventSeverity::Error,
            CoreEvent::Session(SessionEvent::NewVideo { .. }) => EventSeverity::Info,
            CoreEvent::Session(SessionEvent::SegmentSkipped { .. }) => EventSeverity::Info,
            CoreEvent::Session(SessionEvent::Stopped { .. }) => EventSeverity::Info,
            _ => EventSeverity::Debug,
        }
    }
}

/// Event severity levels for filtering and logging.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum EventSeverity {
    /// Debug-level events (verbose)
    Debug,
    /// Informational events
    Info,
    /// Warning events
    Warning,
    /// Error events
    Error,
}

// ============================================================================
// Session Events
// ============================================================================

/// Events emitted by a playback session.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "event")]
pub enum SessionEvent {
    /// The engine started or stopped producing output.
    StateOrPlayingChanged {
        is_playing: bool,
    },
    /// Metadata for a new video was loaded and handed to the engine.
    NewVideo {
        video_id: String,
        title: String,
        uploader: String,
        thumbnail_url: Option<String>,
        duration_secs: u64,
    },
    /// The session state machine moved to another status.
    StatusChanged {
        video_id: Option<String>,
        /// Lower-case status name (`idle`, `loading`, `ready`, ...).
        status: String,
    },
    /// Playback jumped over a segment.
    SegmentSkipped {
        video_id: String,
        category: String,
        from_ms: u64,
        to_ms: u64,
    },
    /// Playback entered a segment that is only highlighted.
    SegmentHighlighted {
        video_id: String,
        category: String,
        start_ms: u64,
        end_ms: u64,
    },
    /// The engine reported an unrecoverable error; shown to the user.
    Error {
        video_id: Option<String>,
        message: String,
    },
    /// The session was stopped and its resources released.
    Stopped {
        video_id: Option<String>,
    },
}

impl SessionEvent {
    fn description(&self) -> &str {
        match self {
            SessionEvent::StateOrPlayingChanged { .. } => "Playing state changed",
            SessionEvent::NewVideo { .. } => "New video loaded",
            SessionEvent::StatusChanged { .. } => "Session status changed",
            SessionEvent::SegmentSkipped { .. } => "Segment skipped",
            SessionEvent::SegmentHighlighted { .. } => "Segment highlighted",
            SessionEvent::Error { .. } => "Playback error",
            SessionEvent::Stopped { .. } => "Session stopped",
        }
    }
}

// ============================================================================
// Queue Events
// ============================================================================

/// Events related to the play queue.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "event")]
pub enum QueueEvent {
    /// Queue content or cursor changed.
    Changed {
        length: usize,
        current_index: Option<usize>,
        current_id: Option<String>,
    },
}

impl QueueEvent {
    fn description(&self) -> &str {
        match self {
            QueueEvent::Changed { .. } => "Queue changed",
        }
    }
}

// ============================================================================
// Event Bus
// ============================================================================

/// Central event bus for publishing and subscribing to events.
///
/// Uses `tokio::sync::broadcast` internally, which provides:
/// - Multiple producers (clone the `EventBus`)
/// - Multiple consumers (each `subscribe()` creates a new receiver)
/// - Non-blocking sends (events are cloned for each subscriber)
/// - Lagging detection (slow subscribers get `RecvError::Lagged`)
#[derive(Clone)]
pub struct EventBus {
    sender: broadcast::Sender<CoreEvent>,
}

impl EventBus {
    /// Creates a new event bus with the specified buffer size.
    ///
    /// # Arguments
    ///
    /// * `capacity` - Maximum number of events to buffer per subscriber.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Publishes an event to all subscribers.
    ///
    /// Returns the number of subscribers that received the event, or an
    /// error if there are no active subscribers.
    pub fn emit(&self, event: CoreEvent) -> Result<usize, SendError<CoreEvent>> {
        self.sender.send(event)
    }

    /// Creates a new subscriber. Past events are not replayed.
    pub fn subscribe(&self) -> Receiver<CoreEvent> {
        self.sender.subscribe()
    }

    /// Subscribes through an [`EventStream`].
    pub fn stream(&self) -> EventStream {
        EventStream::new(self.subscribe())
    }

    /// Returns the number of active subscribers.
    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(DEFAULT_EVENT_BUFFER_SIZE)
    }
}

impl fmt::Debug for EventBus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventBus")
            .field("subscriber_count", &self.subscriber_count())
            .finish()
    }
}

// ============================================================================
// Event Stream Wrapper
// ============================================================================

/// Type alias for event filter functions.
type EventFilter = Box<dyn Fn(&CoreEvent) -> bool + Send + Sync>;

/// A wrapper around `broadcast::Receiver` with optional filtering.
///
/// # Example
///
/// ```rust
/// use core_runtime::events::{CoreEvent, EventBus, EventSeverity};
///
/// let event_bus = EventBus::new(100);
/// let errors = event_bus
///     .stream()
///     .filter(|event| event.severity() == EventSeverity::Error);
/// ```
pub struct EventStream {
    receiver: Receiver<CoreEvent>,
    filter: Option<EventFilter>,
}

impl EventStream {
    /// Creates a new event stream from a receiver.
    pub fn new(receiver: Receiver<CoreEvent>) -> Self {
        Self {
            receiver,
            filter: None,
        }
    }

    /// Adds a filter function to this stream.
    ///
    /// Only events that match the filter will be returned by `recv()`.
    pub fn filter<F>(mut self, predicate: F) -> Self
    where
        F: Fn(&CoreEvent) -> bool + Send + Sync + 'static,
    {
        self.filter = Some(Box::new(predicate));
        self
    }

    fn accepts(&self, event: &CoreEvent) -> bool {
        self.filter.as_ref().map_or(true, |filter| filter(event))
    }

    /// Receives the next event that passes the filter (if any).
    ///
    /// # Errors
    ///
    /// Returns `RecvError::Lagged(n)` if the subscriber fell behind by `n` events.
    /// Returns `RecvError::Closed` if all senders have been dropped.
    pub async fn recv(&mut self) -> Result<CoreEvent, RecvError> {
        loop {
            let event = self.receiver.recv().await?;
            if self.accepts(&event) {
                return Ok(event);
            }
        }
    }

    /// Attempts to receive an event without blocking.
    ///
    /// Returns `None` if no matching events are currently available.
    pub fn try_recv(&mut self) -> Option<Result<CoreEvent, RecvError>> {
        loop {
            match self.receiver.try_recv() {
                Ok(event) => {
                    if self.accepts(&event) {
                        return Some(Ok(event));
                    }
                }
                Err(broadcast::error::TryRecvError::Empty) => return None,
                Err(broadcast::error::TryRecvError::Lagged(n)) => {
                    return Some(Err(RecvError::Lagged(n)))
                }
                Err(broadcast::error::TryRecvError::Closed) => return Some(Err(RecvError::Closed)),
            }
        }
    }
}

impl fmt::Debug for EventStream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventStream")
            .field("has_filter", &self.filter.is_some())
            .finish()
    }
}

// ============================================================================
// Tests
// ============================================================================
