//! # DASH Manifest Generation
//!
//! Builds a static MPEG-DASH manifest from the renditions of a video so the
//! engine can play separate audio and video streams. Only renditions with
//! known init/index byte ranges can be described.

use crate::error::SourceError;
use crate::models::{PipedStream, StreamMetadata};
use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use quick_xml::escape::escape;
use std::collections::BTreeMap;
use std::fmt::Write as _;

const DATA_URI_PREFIX: &str = "data:application/dash+xml;charset=utf-8;base64,";

#[derive(Debug, PartialEq, Eq, PartialOrd, Ord)]
struct AdaptationKey {
    content_type: &'static str,
    mime_type: String,
    audio_track_id: Option<String>,
}

fn byte_range(start: Option<i64>, end: Option<i64>) -> Option<(i64, i64)> {
    match (start, end) {
        (Some(start), Some(end)) if start >= 0 && end > start => Some((start, end)),
        _ => None,
    }
}

/// A rendition that can be listed in the manifest.
fn describable(stream: &PipedStream) -> bool {
    stream.url.is_some()
        && stream.mime_type.is_some()
        && byte_range(stream.init_start, stream.init_end).is_some()
        && byte_range(stream.index_start, stream.index_end).is_some()
}

fn group<'a>(
    sets: &mut BTreeMap<AdaptationKey, Vec<&'a PipedStream>>,
    content_type: &'static str,
    streams: impl Iterator<Item = &'a PipedStream>,
) {
    for stream in streams.filter(|s| describable(s)) {
        let key = AdaptationKey {
            content_type,
            mime_type: stream.mime_type.clone().unwrap_or_default(),
            audio_track_id: stream.audio_track_id.clone(),
        };
        sets.entry(key).or_default().push(stream);
    }
}

fn write_representation(out: &mut String, stream: &PipedStream, index: usize, audio: bool) {
    let id = stream
        .itag
        .map(|itag| itag.to_string())
        .unwrap_or_else(|| index.to_string());
    let codecs = stream.codec.as_deref().unwrap_or_default();
    let bandwidth = stream.bitrate.unwrap_or_default().max(0);
    // describable() guarantees both ranges
    let (init_start, init_end) = byte_range(stream.init_start, stream.init_end).unwrap_or_default();
    let (index_start, index_end) =
        byte_range(stream.index_start, stream.index_end).unwrap_or_default();
    let url = stream.url.as_deref().unwrap_or_default();

    let _ = write!(
        out,
        r#"<Representation id="{}" codecs="{}" bandwidth="{}""#,
        escape(id.as_str()),
        escape(codecs),
        bandwidth
    );
    if !audio {
        if let (Some(width), Some(height)) = (stream.width, stream.height) {
            let _ = write!(out, r#" width="{}" height="{}""#, width, height);
        }
        if let Some(fps) = stream.fps {
            let _ = write!(out, r#" frameRate="{}""#, fps);
        }
    }
    out.push('>');
    if audio {
        out.push_str(
            r#"<AudioChannelConfiguration schemeIdUri="urn:mpeg:dash:23003:3:audio_channel_configuration:2011" value="2"/>"#,
        );
    }
    let _ = write!(
        out,
        r#"<BaseURL>{}</BaseURL><SegmentBase indexRange="{}-{}"><Initialization range="{}-{}"/></SegmentBase></Representation>"#,
        escape(url),
        index_start,
        index_end,
        init_start,
        init_end
    );
}

/// Manifest XML for the renditions of `streams`.
///
/// Video renditions are left out when `audio_only` is set; muxed (non
/// video-only) video streams are never listed.
pub fn build_manifest(streams: &StreamMetadata, audio_only: bool) -> Result<String, SourceError> {
    let mut sets = BTreeMap::new();
    group(&mut sets, "audio", streams.audio_streams.iter());
    if !audio_only {
        group(
            &mut sets,
            "video",
            streams.video_streams.iter().filter(|s| s.video_only),
        );
    }

    if sets.is_empty() {
        return Err(SourceError::Manifest(
            "no rendition carries init and index ranges".to_string(),
        ));
    }

    let duration = streams.duration.max(0);
    let mut out = String::new();
    out.push_str(r#"<?xml version="1.0" encoding="UTF-8"?>"#);
    let _ = write!(
        out,
        r#"<MPD xmlns="urn:mpeg:dash:schema:mpd:2011" profiles="urn:mpeg:dash:profile:full:2011" minBufferTime="PT1.5S" type="static" mediaPresentationDuration="PT{}S"><Period>"#,
        duration
    );

    for (set_id, (key, members)) in sets.iter().enumerate() {
        let audio = key.content_type == "audio";
        let _ = write!(
            out,
            r#"<AdaptationSet id="{}" contentType="{}" mimeType="{}" subsegmentAlignment="true""#,
            set_id,
            key.content_type,
            escape(key.mime_type.as_str())
        );
        let locale = members.iter().find_map(|s| s.audio_track_locale.as_deref());
        if let (true, Some(lang)) = (audio, locale) {
            let _ = write!(out, r#" lang="{}""#, escape(lang));
        }
        out.push('>');
        if let Some(name) = members.iter().find_map(|s| s.audio_track_name.as_deref()) {
            let _ = write!(out, r#"<Label>{}</Label>"#, escape(name));
        }
        for (index, stream) in members.iter().enumerate() {
            write_representation(&mut out, stream, index, audio);
        }
        out.push_str("</AdaptationSet>");
    }

    out.push_str("</Period></MPD>");
    Ok(out)
}

/// Inline a manifest as a base64 `data:` URI.
pub fn to_data_uri(manifest: &str) -> String {
    format!("{}{}", DATA_URI_PREFIX, STANDARD.encode(manifest.as_bytes()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn audio(itag: i32, track: Option<&str>) -> PipedStream {
        PipedStream {
            url: Some(format!("https://proxy.example/videoplayback?itag={}&a=1", itag)),
            mime_type: Some("audio/mp4".into()),
            codec: Some("mp4a.40.2".into()),
            itag: Some(itag),
            bitrate: Some(130_000),
            audio_track_id: track.map(String::from),
            audio_track_locale: track.map(|_| "en".to_string()),
            init_start: Some(0),
            init_end: Some(722),
            index_start: Some(723),
            index_end: Some(1050),
            ..PipedStream::default()
        }
    }

    fn video(itag: i32) -> PipedStream {
        PipedStream {
            mime_type: Some("video/webm".into()),
            codec: Some("vp9".into()),
            video_only: true,
            width: Some(1920),
            height: Some(1080),
            fps: Some(30),
            ..audio(itag, None)
        }
    }

    #[test]
    fn test_audio_only_manifest() {
        let streams = StreamMetadata {
            duration: 156,
            audio_streams: vec![audio(140, None), audio(251, None)],
            video_streams: vec![video(248)],
            ..StreamMetadata::default()
        };

        let manifest = build_manifest(&streams, true).unwrap();
        assert!(manifest.contains(r#"mediaPresentationDuration="PT156S""#));
        assert_eq!(manifest.matches("<AdaptationSet").count(), 1);
        assert_eq!(manifest.matches("<Representation").count(), 2);
        assert!(manifest.contains(r#"<SegmentBase indexRange="723-1050"><Initialization range="0-722"/>"#));
        // Query separators must be escaped
        assert!(manifest.contains("itag=140&amp;a=1"));
        assert!(!manifest.contains("video/webm"));
    }

    #[test]
    fn test_video_and_track_grouping() {
        let streams = StreamMetadata {
            duration: 60,
            audio_streams: vec![audio(140, Some("en.4")), audio(141, Some("de.3"))],
            video_streams: vec![video(248)],
            ..StreamMetadata::default()
        };

        let manifest = build_manifest(&streams, false).unwrap();
        assert_eq!(manifest.matches("<AdaptationSet").count(), 3);
        assert!(manifest.contains(r#"width="1920" height="1080" frameRate="30""#));
        assert!(manifest.contains(r#"lang="en""#));
    }

    #[test]
    fn test_streams_without_ranges_are_rejected() {
        let streams = StreamMetadata {
            audio_streams: vec![PipedStream {
                init_end: None,
                ..audio(140, None)
            }],
            ..StreamMetadata::default()
        };

        assert!(matches!(
            build_manifest(&streams, true),
            Err(SourceError::Manifest(_))
        ));
    }

    #[test]
    fn test_data_uri() {
        let uri = to_data_uri("<MPD/>");
        assert_eq!(uri, "data:application/dash+xml;charset=utf-8;base64,PE1QRC8+");
    }
}
