//! Now-playing presentation bridge (notification / media session).

use async_trait::async_trait;

use crate::error::Result;

/// Display data pushed to the presenter on every new video.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NowPlayingInfo {
    pub video_id: String,
    pub title: Option<String>,
    pub uploader: Option<String>,
    pub thumbnail_url: Option<String>,
}

/// Host notification or media-session presenter.
///
/// Presenters own their lifecycle and are expected to redraw their full
/// display on each call rather than diffing.
#[async_trait]
pub trait NowPlayingPresenter: Send + Sync {
    async fn update_now_playing(&self, info: NowPlayingInfo) -> Result<()>;

    async fn set_playing(&self, is_playing: bool) -> Result<()>;

    /// Remove the presentation; called once when the session stops.
    async fn dismiss(&self) -> Result<()>;
}
