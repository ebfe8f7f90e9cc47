//! # Playback Error Types
//!
//! Error types for stream resolution, source construction and the session.

use bridge_traits::error::BridgeError;
use thiserror::Error;

/// Failures of a stream or segment fetch.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FetchError {
    /// Transport failure or server-side error; worth retrying later.
    #[error("Network error: {0}")]
    Network(String),

    /// The API does not know the video, or reported an error payload for it.
    #[error("Not found: {0}")]
    NotFound(String),

    /// The response could not be decoded.
    #[error("Invalid response: {0}")]
    InvalidResponse(String),
}

/// Failures while turning stream metadata into something the engine can play.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SourceError {
    /// Neither a manifest nor an HLS address could be produced.
    #[error("No playable source for video {0}")]
    NoPlayableSource(String),

    /// No rendition carried enough information for a DASH manifest.
    #[error("Manifest generation failed: {0}")]
    Manifest(String),
}

/// Errors surfaced by the playback crate.
#[derive(Error, Debug)]
pub enum PlaybackError {
    // ========================================================================
    // Resolution Errors
    // ========================================================================
    /// Stream or segment fetch failed.
    #[error("Fetch failed: {0}")]
    Fetch(#[from] FetchError),

    /// No playable source could be built.
    #[error("Source error: {0}")]
    Source(#[from] SourceError),

    // ========================================================================
    // Engine Errors
    // ========================================================================
    /// The media engine reported or returned a failure.
    #[error("Media engine error: {0}")]
    Engine(String),

    /// A host bridge call failed.
    #[error("Bridge error: {0}")]
    Bridge(#[from] BridgeError),

    // ========================================================================
    // Session Errors
    // ========================================================================
    /// The session loop has exited; the handle can no longer be used.
    #[error("Playback session is closed")]
    SessionClosed,

    /// The requested operation is not valid in the current state.
    #[error("Invalid transition: {0}")]
    InvalidTransition(String),
}

impl PlaybackError {
    /// Returns `true` if this error is transient and the operation can be retried.
    pub fn is_transient(&self) -> bool {
        match self {
            PlaybackError::Fetch(FetchError::Network(_)) => true,
            PlaybackError::Bridge(BridgeError::Http { status, .. }) => {
                *status >= 500 || *status == 429
            }
            PlaybackError::Bridge(BridgeError::OperationFailed(_)) => true,
            _ => false,
        }
    }

    /// Returns `true` if this error is due to network issues.
    pub fn is_network_error(&self) -> bool {
        matches!(
            self,
            PlaybackError::Fetch(FetchError::Network(_))
                | PlaybackError::Bridge(BridgeError::Http { .. })
        )
    }
}

/// Result type for playback operations.
pub type Result<T> = std::result::Result<T, PlaybackError>;
