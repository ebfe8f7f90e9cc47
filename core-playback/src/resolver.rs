//! # Stream Resolver
//!
//! Fetches stream metadata and segments for a video id. [`PipedStreamResolver`]
//! talks to a Piped-compatible API through the host [`HttpClient`].

use crate::error::FetchError;
use crate::models::{SegmentMarker, SegmentsResponse, StreamMetadata};
use async_trait::async_trait;
use bridge_traits::error::BridgeError;
use bridge_traits::{HttpClient, HttpRequest, HttpResponse, RetryPolicy};
use core_runtime::config::PlaybackPreferences;
use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, instrument, warn};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(20);

/// Source of stream metadata and segments.
#[async_trait]
pub trait StreamResolver: Send + Sync {
    /// Full metadata of a video.
    async fn resolve(&self, video_id: &str) -> Result<StreamMetadata, FetchError>;

    /// Segments of the given categories; empty when there are none.
    async fn segments(
        &self,
        video_id: &str,
        categories: &[String],
    ) -> Result<Vec<SegmentMarker>, FetchError>;
}

#[derive(Deserialize)]
struct ApiError {
    error: String,
    #[serde(default)]
    message: Option<String>,
}

/// Resolver backed by the Piped REST API.
pub struct PipedStreamResolver {
    http: Arc<dyn HttpClient>,
    api_url: String,
    sponsor_block_url: String,
    retry_policy: RetryPolicy,
}

impl PipedStreamResolver {
    pub fn new(
        http: Arc<dyn HttpClient>,
        api_url: impl Into<String>,
        sponsor_block_url: impl Into<String>,
    ) -> Self {
        Self {
            http,
            api_url: api_url.into().trim_end_matches('/').to_string(),
            sponsor_block_url: sponsor_block_url.into().trim_end_matches('/').to_string(),
            retry_policy: RetryPolicy::default(),
        }
    }

    /// Resolver using the API addresses from the preferences.
    pub fn from_preferences(http: Arc<dyn HttpClient>, preferences: &PlaybackPreferences) -> Self {
        Self::new(
            http,
            preferences.api_url.clone(),
            preferences.sponsor_block_url.clone(),
        )
    }

    pub fn with_retry_policy(mut self, policy: RetryPolicy) -> Self {
        self.retry_policy = policy;
        self
    }

    async fn get(&self, request: HttpRequest) -> Result<HttpResponse, FetchError> {
        self.http
            .execute_with_retry(request.timeout(REQUEST_TIMEOUT), self.retry_policy.clone())
            .await
            .map_err(map_bridge_error)
    }
}

fn map_bridge_error(error: BridgeError) -> FetchError {
    match error {
        BridgeError::Http { status: 404, message } => FetchError::NotFound(message),
        other => FetchError::Network(other.to_string()),
    }
}

/// Error payload carried by the body, whatever the status.
fn api_error(response: &HttpResponse) -> Option<String> {
    let payload: ApiError = serde_json::from_slice(&response.body).ok()?;
    Some(match payload.message {
        Some(message) if !message.is_empty() => format!("{}: {}", payload.error, message),
        _ => payload.error,
    })
}

fn check_status(response: &HttpResponse) -> Result<(), FetchError> {
    if response.is_success() {
        return Ok(());
    }
    if let Some(message) = api_error(response) {
        return Err(FetchError::NotFound(message));
    }
    if response.status == 404 {
        Err(FetchError::NotFound(format!("HTTP {}", response.status)))
    } else if response.is_server_error() || response.status == 429 {
        Err(FetchError::Network(format!("HTTP {}", response.status)))
    } else {
        Err(FetchError::InvalidResponse(format!(
            "Unexpected HTTP {}",
            response.status
        )))
    }
}

#[async_trait]
impl StreamResolver for PipedStreamResolver {
    #[instrument(skip(self), fields(api = %self.api_url))]
    async fn resolve(&self, video_id: &str) -> Result<StreamMetadata, FetchError> {
        let url = format!("{}/streams/{}", self.api_url, urlencoding::encode(video_id));
        let response = self.get(HttpRequest::get(url)).await?;

        check_status(&response)?;
        if let Some(message) = api_error(&response) {
            return Err(FetchError::NotFound(message));
        }

        let streams: StreamMetadata = serde_json::from_slice(&response.body)
            .map_err(|e| FetchError::InvalidResponse(e.to_string()))?;

        debug!(
            title = %streams.title,
            audio_streams = streams.audio_streams.len(),
            related = streams.related_streams.len(),
            "Resolved streams"
        );
        Ok(streams)
    }

    #[instrument(skip(self, categories), fields(categories = categories.len()))]
    async fn segments(
        &self,
        video_id: &str,
        categories: &[String],
    ) -> Result<Vec<SegmentMarker>, FetchError> {
        if categories.is_empty() {
            return Ok(Vec::new());
        }

        let category_json = serde_json::to_string(categories)
            .map_err(|e| FetchError::InvalidResponse(e.to_string()))?;
        let url = format!(
            "{}/sponsors/{}",
            self.sponsor_block_url,
            urlencoding::encode(video_id)
        );
        let response = match self.get(HttpRequest::get(url).query("category", &category_json)).await {
            Err(FetchError::NotFound(_)) => return Ok(Vec::new()),
            other => other?,
        };

        // No segments for this video
        if response.status == 404 {
            return Ok(Vec::new());
        }
        if let Err(e) = check_status(&response) {
            warn!(status = response.status, "Segment request failed");
            return Err(e);
        }

        let payload: SegmentsResponse = serde_json::from_slice(&response.body)
            .map_err(|e| FetchError::InvalidResponse(e.to_string()))?;
        let segments: Vec<SegmentMarker> = payload.segments.into_iter().map(Into::into).collect();

        debug!(count = segments.len(), "Resolved segments");
        Ok(segments)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bridge_traits::error::Result as BridgeResult;
    use bytes::Bytes;
    use mockall::mock;
    use std::collections::HashMap;

    mock! {
        Http {}

        #[async_trait]
        impl HttpClient for Http {
            async fn execute(&self, request: HttpRequest) -> BridgeResult<HttpResponse>;
        }
    }

    fn response(status: u16, body: &str) -> HttpResponse {
        HttpResponse {
            status,
            headers: HashMap::new(),
            body: Bytes::from(body.to_string()),
        }
    }

    fn resolver(http: MockHttp) -> PipedStreamResolver {
        PipedStreamResolver::new(Arc::new(http), "https://api.example/", "https://sb.example")
            .with_retry_policy(RetryPolicy::none())
    }

    #[tokio::test]
    async fn test_resolve_decodes_streams() {
        let mut http = MockHttp::new();
        http.expect_execute()
            .withf(|request| request.url == "https://api.example/streams/abc")
            .times(1)
            .returning(|_| Ok(response(200, r#"{"title": "Hello", "duration": 60}"#)));

        let streams = resolver(http).resolve("abc").await.unwrap();
        assert_eq!(streams.title, "Hello");
        assert_eq!(streams.duration, 60);
    }

    #[tokio::test]
    async fn test_resolve_error_payload_is_not_found() {
        let mut http = MockHttp::new();
        http.expect_execute().returning(|_| {
            Ok(response(
                500,
                r#"{"error": "ContentNotAvailableException", "message": "Video unavailable"}"#,
            ))
        });

        let result = resolver(http).resolve("gone").await;
        assert_eq!(
            result,
            Err(FetchError::NotFound(
                "ContentNotAvailableException: Video unavailable".to_string()
            ))
        );
    }

    #[tokio::test]
    async fn test_resolve_status_mapping() {
        let mut http = MockHttp::new();
        http.expect_execute()
            .withf(|request| request.url.ends_with("/missing"))
            .returning(|_| Ok(response(404, "")));
        http.expect_execute()
            .withf(|request| request.url.ends_with("/garbled"))
            .returning(|_| Ok(response(200, "<html>")));
        http.expect_execute()
            .withf(|request| request.url.ends_with("/down"))
            .returning(|_| {
                Err(BridgeError::Http {
                    status: 502,
                    message: "Bad Gateway".into(),
                })
            });

        let resolver = resolver(http);
        assert!(matches!(
            resolver.resolve("missing").await,
            Err(FetchError::NotFound(_))
        ));
        assert!(matches!(
            resolver.resolve("garbled").await,
            Err(FetchError::InvalidResponse(_))
        ));
        assert!(matches!(
            resolver.resolve("down").await,
            Err(FetchError::Network(_))
        ));
    }

    #[tokio::test]
    async fn test_segments_request_and_decoding() {
        let mut http = MockHttp::new();
        http.expect_execute()
            .withf(|request| {
                request.url
                    == "https://sb.example/sponsors/abc?category=%5B%22sponsor%22%2C%22intro%22%5D"
            })
            .times(1)
            .returning(|_| {
                Ok(response(
                    200,
                    r#"{"segments": [{"UUID": "u1", "category": "sponsor", "actionType": "skip", "segment": [5, 15]}]}"#,
                ))
            });

        let categories = vec!["sponsor".to_string(), "intro".to_string()];
        let segments = resolver(http).segments("abc", &categories).await.unwrap();
        assert_eq!(segments.len(), 1);
        assert_eq!(segments[0].end, 15.0);
    }

    #[tokio::test]
    async fn test_segments_without_categories_or_results() {
        let mut http = MockHttp::new();
        http.expect_execute()
            .times(1)
            .returning(|_| Ok(response(404, "Not Found")));

        let resolver = resolver(http);
        assert!(resolver.segments("abc", &[]).await.unwrap().is_empty());
        assert!(resolver
            .segments("abc", &["sponsor".to_string()])
            .await
            .unwrap()
            .is_empty());
    }
}
