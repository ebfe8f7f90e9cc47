//! # Playback Session Module
//!
//! Drives background playback of streamed videos.
//!
//! ## Overview
//!
//! This module handles:
//! - Stream metadata and segment resolution against the streaming API
//! - Media source selection, including inline DASH manifests
//! - The play queue with repeat modes and related-video autoplay
//! - Segment skipping, muting and highlighting
//! - Watch position tracking and watch history
//! - The session controller tying these to the host media engine

pub mod controller;
pub mod dash;
pub mod error;
pub mod models;
pub mod queue;
pub mod resolver;
pub mod segments;
pub mod source;
pub mod timer;

pub use controller::{
    ControlAction, PlaybackSessionController, SessionHandle, SessionStatus, StartRequest,
};
pub use error::{FetchError, PlaybackError, Result, SourceError};
pub use models::{QueueEntry, SegmentActionKind, SegmentMarker, StreamMetadata};
pub use queue::{PlayQueue, QueueSnapshot, RepeatMode};
pub use resolver::{PipedStreamResolver, StreamResolver};
pub use segments::{SegmentAction, SegmentSkipEngine, MAX_CHAIN_HOPS};
pub use source::select_media_source;
pub use timer::PausableTimer;
