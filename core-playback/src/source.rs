//! # Media Source Selection
//!
//! Chooses between an inline DASH manifest and the HLS address of a video,
//! and rewrites proxied addresses back to their origin when the proxy is
//! disabled.

use crate::dash;
use crate::error::SourceError;
use crate::models::StreamMetadata;
use bridge_traits::{MediaMetadata, MediaSource, MimeType};
use core_runtime::config::PlaybackPreferences;
use tracing::{debug, warn};
use url::Url;

/// Query parameters the proxy adds to every address.
const PROXY_PARAMS: [&str; 2] = ["host", "qhash"];

/// Rewrite a proxied url to the origin named by its `host` parameter.
///
/// Urls that do not parse or carry no `host` parameter are returned as is.
pub fn unwrap_url(url: &str) -> String {
    let Ok(mut parsed) = Url::parse(url) else {
        return url.to_string();
    };
    let Some(host) = parsed
        .query_pairs()
        .find(|(key, _)| key == "host")
        .map(|(_, value)| value.into_owned())
        .filter(|host| !host.is_empty())
    else {
        return url.to_string();
    };

    let kept: Vec<(String, String)> = parsed
        .query_pairs()
        .filter(|(key, _)| !PROXY_PARAMS.contains(&key.as_ref()))
        .map(|(key, value)| (key.into_owned(), value.into_owned()))
        .collect();

    if parsed.set_host(Some(&host)).is_err() {
        return url.to_string();
    }
    let _ = parsed.set_port(None);
    if kept.is_empty() {
        parsed.set_query(None);
    } else {
        parsed.query_pairs_mut().clear().extend_pairs(kept);
    }
    parsed.into()
}

/// [`unwrap_url`] applied only when the proxy is disabled.
pub fn unwrap_stream_url(url: &str, disable_proxy: bool) -> String {
    if disable_proxy {
        unwrap_url(url)
    } else {
        url.to_string()
    }
}

fn media_metadata(streams: &StreamMetadata) -> MediaMetadata {
    MediaMetadata {
        title: Some(streams.title.clone()),
        artist: Some(streams.uploader.clone()),
        artwork_url: streams.thumbnail_url.clone(),
    }
}

/// Pick the source the engine should play for `video_id`.
///
/// A generated DASH manifest is preferred while audio renditions exist and
/// the proxy is in use; otherwise, or when no manifest can be built, the HLS
/// address is used.
pub fn select_media_source(
    video_id: &str,
    streams: &StreamMetadata,
    preferences: &PlaybackPreferences,
) -> Result<MediaSource, SourceError> {
    let metadata = media_metadata(streams);

    if !preferences.use_hls_over_dash
        && !streams.audio_streams.is_empty()
        && !preferences.disable_proxy
    {
        match dash::build_manifest(streams, preferences.audio_only) {
            Ok(manifest) => {
                debug!(video_id, bytes = manifest.len(), "Selected DASH manifest");
                return Ok(MediaSource::new(dash::to_data_uri(&manifest), MimeType::Dash)
                    .with_metadata(metadata));
            }
            Err(e) => warn!(video_id, error = %e, "Falling back to HLS"),
        }
    }

    match streams.hls.as_deref().filter(|hls| !hls.is_empty()) {
        Some(hls) => {
            debug!(video_id, "Selected HLS source");
            Ok(
                MediaSource::new(unwrap_stream_url(hls, preferences.disable_proxy), MimeType::Hls)
                    .with_metadata(metadata),
            )
        }
        None => Err(SourceError::NoPlayableSource(video_id.to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::PipedStream;

    const PROXIED: &str =
        "https://proxy.example:8443/api/manifest/hls?id=abc&host=manifest.googlevideo.com&qhash=1f";

    fn audio_stream() -> PipedStream {
        PipedStream {
            url: Some("https://proxy.example/videoplayback?itag=140".into()),
            mime_type: Some("audio/mp4".into()),
            codec: Some("mp4a.40.2".into()),
            itag: Some(140),
            init_start: Some(0),
            init_end: Some(500),
            index_start: Some(501),
            index_end: Some(900),
            ..PipedStream::default()
        }
    }

    fn streams() -> StreamMetadata {
        StreamMetadata {
            title: "Title".into(),
            uploader: "Uploader".into(),
            duration: 120,
            hls: Some(PROXIED.to_string()),
            audio_streams: vec![audio_stream()],
            ..StreamMetadata::default()
        }
    }

    #[test]
    fn test_unwrap_url() {
        assert_eq!(
            unwrap_url(PROXIED),
            "https://manifest.googlevideo.com/api/manifest/hls?id=abc"
        );
        assert_eq!(
            unwrap_url("https://proxy.example/a?host=origin.example"),
            "https://origin.example/a"
        );
        assert_eq!(unwrap_url("https://origin.example/a?x=1"), "https://origin.example/a?x=1");
        assert_eq!(unwrap_url("not a url"), "not a url");
    }

    #[test]
    fn test_dash_preferred_by_default() {
        let source = select_media_source("abc", &streams(), &PlaybackPreferences::default()).unwrap();

        assert_eq!(source.mime_type, MimeType::Dash);
        assert!(source.is_inline());
        assert_eq!(source.metadata.title.as_deref(), Some("Title"));
    }

    #[test]
    fn test_hls_when_preferred_or_proxy_disabled() {
        let preferences = PlaybackPreferences {
            use_hls_over_dash: true,
            ..PlaybackPreferences::default()
        };
        let source = select_media_source("abc", &streams(), &preferences).unwrap();
        assert_eq!(source.mime_type, MimeType::Hls);
        assert_eq!(source.uri, PROXIED);

        let preferences = PlaybackPreferences {
            disable_proxy: true,
            ..PlaybackPreferences::default()
        };
        let source = select_media_source("abc", &streams(), &preferences).unwrap();
        assert_eq!(source.mime_type, MimeType::Hls);
        assert_eq!(
            source.uri,
            "https://manifest.googlevideo.com/api/manifest/hls?id=abc"
        );
    }

    #[test]
    fn test_hls_fallback_when_manifest_impossible() {
        let mut streams = streams();
        streams.audio_streams[0].index_end = None;

        let source = select_media_source("abc", &streams, &PlaybackPreferences::default()).unwrap();
        assert_eq!(source.mime_type, MimeType::Hls);
    }

    #[test]
    fn test_no_playable_source() {
        let streams = StreamMetadata {
            hls: Some(String::new()),
            ..StreamMetadata::default()
        };

        assert_eq!(
            select_media_source("abc", &streams, &PlaybackPreferences::default()),
            Err(SourceError::NoPlayableSource("abc".to_string()))
        );
    }
}
