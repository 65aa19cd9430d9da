use crate::feed::parser::{decode_offloaded, DecodedFeed};
use crate::feed::registry::Source;
use chrono::{DateTime, Utc};
use futures::StreamExt;
use std::time::Duration;
use thiserror::Error;

pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);
pub const DEFAULT_MAX_FEED_SIZE: usize = 10 * 1024 * 1024; // 10MB
pub const DEFAULT_USER_AGENT: &str = concat!("newsroll/", env!("CARGO_PKG_VERSION"));

/// Errors that end a single source's fetch+decode task.
///
/// None of these ever reach the caller of an aggregation: a failed source
/// is simply absent from the result.
#[derive(Debug, Error)]
pub enum FetchError {
    /// Request plus body read exceeded the per-source timeout
    #[error("Request timed out")]
    Timeout,
    /// Any response status other than 200 OK
    #[error("HTTP error: status {0}")]
    BadStatus(u16),
    /// Network-level error (DNS, connection, TLS, etc.)
    #[error("Request failed: {0}")]
    Transport(#[source] reqwest::Error),
    /// Response body exceeded the configured size limit
    #[error("Response too large")]
    ResponseTooLarge,
    /// Response was incomplete (received fewer bytes than Content-Length)
    #[error("Incomplete response: expected {expected} bytes, received {received}")]
    IncompleteResponse { expected: u64, received: usize },
    /// Payload yielded no entries and was not a well-formed feed
    #[error("Invalid feed format")]
    MalformedFeed,
    /// The task running this source panicked or was cancelled
    #[error("Source task failed: {0}")]
    TaskFailed(String),
}

/// Coarse failure category used as a structured log field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    Timeout,
    BadStatus,
    TransportError,
    TooLarge,
    MalformedFeed,
    TaskFailed,
}

impl FetchError {
    pub fn kind(&self) -> FailureKind {
        match self {
            FetchError::Timeout => FailureKind::Timeout,
            FetchError::BadStatus(_) => FailureKind::BadStatus,
            FetchError::Transport(_) | FetchError::IncompleteResponse { .. } => {
                FailureKind::TransportError
            }
            FetchError::ResponseTooLarge => FailureKind::TooLarge,
            FetchError::MalformedFeed => FailureKind::MalformedFeed,
            FetchError::TaskFailed(_) => FailureKind::TaskFailed,
        }
    }

    fn from_reqwest(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            FetchError::Timeout
        } else {
            FetchError::Transport(e)
        }
    }
}

/// Per-request knobs shared by every fetch in an aggregation.
#[derive(Debug, Clone)]
pub struct FetchSettings {
    pub timeout: Duration,
    /// `false` accepts invalid and self-signed certificates.
    pub verify_ssl: bool,
    pub max_feed_size: usize,
    pub user_agent: String,
}

impl Default for FetchSettings {
    fn default() -> Self {
        Self {
            timeout: DEFAULT_TIMEOUT,
            verify_ssl: false,
            max_feed_size: DEFAULT_MAX_FEED_SIZE,
            user_agent: DEFAULT_USER_AGENT.to_string(),
        }
    }
}

/// Raw bytes of one successful fetch. Owned by the task that fetched it and
/// consumed by decoding.
#[derive(Debug)]
pub struct RawFeedPayload {
    pub source_name: String,
    pub bytes: Vec<u8>,
    pub fetched_at: DateTime<Utc>,
}

/// Builds the HTTP client shared read-only by all fetch tasks.
///
/// The TLS verification policy is fixed here; timeouts are applied per
/// request in [`fetch`] so one client can serve every source.
pub fn build_client(settings: &FetchSettings) -> Result<reqwest::Client, reqwest::Error> {
    reqwest::Client::builder()
        .user_agent(settings.user_agent.as_str())
        .danger_accept_invalid_certs(!settings.verify_ssl)
        .build()
}

/// Fetches one source's feed bytes.
///
/// Issues exactly one GET with no retries. Retry policy, if any, belongs to
/// the caller.
///
/// # Errors
///
/// - [`FetchError::Timeout`] - request and body read exceeded `settings.timeout`
/// - [`FetchError::BadStatus`] - any status other than 200
/// - [`FetchError::Transport`] - connection, DNS or TLS failure
/// - [`FetchError::ResponseTooLarge`] - body exceeded `settings.max_feed_size`
pub async fn fetch(
    client: &reqwest::Client,
    source: &Source,
    settings: &FetchSettings,
) -> Result<RawFeedPayload, FetchError> {
    let result = match tokio::time::timeout(
        settings.timeout,
        fetch_bytes(client, &source.url, settings.max_feed_size),
    )
    .await
    {
        Ok(inner) => inner,
        Err(_) => Err(FetchError::Timeout),
    };

    match result {
        Ok(bytes) => {
            tracing::debug!(source = %source.name, bytes = bytes.len(), "Fetched feed");
            Ok(RawFeedPayload {
                source_name: source.name.clone(),
                bytes,
                fetched_at: Utc::now(),
            })
        }
        Err(e) => {
            tracing::warn!(
                source = %source.name,
                url = %source.url,
                kind = ?e.kind(),
                error = %e,
                "Feed fetch failed"
            );
            Err(e)
        }
    }
}

/// Fetches and decodes one source, the full unit of work of a source task.
///
/// A payload that decodes to zero entries without being well-formed is a
/// source failure; a well-formed empty feed is a success.
pub async fn fetch_one(
    client: &reqwest::Client,
    source: &Source,
    settings: &FetchSettings,
) -> Result<DecodedFeed, FetchError> {
    let payload = fetch(client, source, settings).await?;
    let feed = decode_offloaded(payload).await?;

    if !feed.well_formed && feed.entries.is_empty() {
        tracing::warn!(source = %source.name, kind = ?FailureKind::MalformedFeed, "Invalid feed format");
        return Err(FetchError::MalformedFeed);
    }

    tracing::info!(
        source = %source.name,
        entries = feed.entries.len(),
        well_formed = feed.well_formed,
        "Successfully fetched feed"
    );
    Ok(feed)
}

async fn fetch_bytes(
    client: &reqwest::Client,
    url: &str,
    limit: usize,
) -> Result<Vec<u8>, FetchError> {
    let response = client
        .get(url)
        .send()
        .await
        .map_err(FetchError::from_reqwest)?;

    if response.status() != reqwest::StatusCode::OK {
        return Err(FetchError::BadStatus(response.status().as_u16()));
    }

    read_limited_bytes(response, limit).await
}

async fn read_limited_bytes(
    response: reqwest::Response,
    limit: usize,
) -> Result<Vec<u8>, FetchError> {
    let expected_length = response.content_length();

    // Fast path: check Content-Length header
    if let Some(len) = expected_length {
        if len > limit as u64 {
            return Err(FetchError::ResponseTooLarge);
        }
    }

    let mut bytes = Vec::new();
    let mut stream = response.bytes_stream();

    while let Some(chunk) = stream.next().await {
        let chunk = chunk.map_err(FetchError::from_reqwest)?;
        if bytes.len().saturating_add(chunk.len()) > limit {
            return Err(FetchError::ResponseTooLarge);
        }
        bytes.extend_from_slice(&chunk);
    }

    if let Some(expected) = expected_length {
        if (bytes.len() as u64) < expected {
            return Err(FetchError::IncompleteResponse {
                expected,
                received: bytes.len(),
            });
        }
    }

    Ok(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const VALID_RSS: &str = r#"<?xml version="1.0"?>
<rss version="2.0"><channel>
    <title>Test</title>
    <item><guid>1</guid><title>Test</title><link>https://example.com/1</link></item>
</channel></rss>"#;

    fn source_for(server: &MockServer) -> Source {
        Source::new("Test", format!("{}/feed", server.uri()))
    }

    fn settings() -> FetchSettings {
        FetchSettings {
            timeout: Duration::from_secs(5),
            ..FetchSettings::default()
        }
    }

    #[tokio::test]
    async fn test_fetch_success() {
        let mock_server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/feed"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_string(VALID_RSS)
                    .insert_header("Content-Type", "application/xml"),
            )
            .expect(1)
            .mount(&mock_server)
            .await;

        let client = build_client(&settings()).unwrap();
        let payload = fetch(&client, &source_for(&mock_server), &settings())
            .await
            .unwrap();
        assert_eq!(payload.source_name, "Test");
        assert_eq!(payload.bytes, VALID_RSS.as_bytes());
    }

    #[tokio::test]
    async fn test_fetch_404_is_bad_status() {
        let mock_server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&mock_server)
            .await;

        let client = build_client(&settings()).unwrap();
        let result = fetch(&client, &source_for(&mock_server), &settings()).await;
        match result.unwrap_err() {
            FetchError::BadStatus(404) => {}
            e => panic!("Expected BadStatus(404), got {:?}", e),
        }
    }

    #[tokio::test]
    async fn test_fetch_non_200_success_is_bad_status() {
        let mock_server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(204))
            .mount(&mock_server)
            .await;

        let client = build_client(&settings()).unwrap();
        let err = fetch(&client, &source_for(&mock_server), &settings())
            .await
            .unwrap_err();
        assert_eq!(err.kind(), FailureKind::BadStatus);
    }

    #[tokio::test]
    async fn test_fetch_500_does_not_retry() {
        let mock_server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(500))
            .expect(1)
            .mount(&mock_server)
            .await;

        let client = build_client(&settings()).unwrap();
        let err = fetch(&client, &source_for(&mock_server), &settings())
            .await
            .unwrap_err();
        assert!(matches!(err, FetchError::BadStatus(500)));
    }

    #[tokio::test]
    async fn test_fetch_timeout() {
        let mock_server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_string(VALID_RSS)
                    .set_delay(Duration::from_secs(3)),
            )
            .mount(&mock_server)
            .await;

        let settings = FetchSettings {
            timeout: Duration::from_millis(200),
            ..FetchSettings::default()
        };
        let client = build_client(&settings).unwrap();
        let err = fetch(&client, &source_for(&mock_server), &settings)
            .await
            .unwrap_err();
        assert!(matches!(err, FetchError::Timeout));
        assert_eq!(err.kind(), FailureKind::Timeout);
    }

    #[tokio::test]
    async fn test_fetch_connection_refused_is_transport_error() {
        // Nothing listens on the TCP port 1 of loopback
        let client = build_client(&settings()).unwrap();
        let source = Source::new("Gone", "http://127.0.0.1:1/feed");
        let err = fetch(&client, &source, &settings()).await.unwrap_err();
        assert_eq!(err.kind(), FailureKind::TransportError);
    }

    #[tokio::test]
    async fn test_fetch_too_large() {
        let mock_server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_string("x".repeat(2048)))
            .mount(&mock_server)
            .await;

        let settings = FetchSettings {
            max_feed_size: 1024,
            ..settings()
        };
        let client = build_client(&settings).unwrap();
        let err = fetch(&client, &source_for(&mock_server), &settings)
            .await
            .unwrap_err();
        assert!(matches!(err, FetchError::ResponseTooLarge));
    }

    #[tokio::test]
    async fn test_fetch_one_decodes_entries() {
        let mock_server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_string(VALID_RSS))
            .mount(&mock_server)
            .await;

        let client = build_client(&settings()).unwrap();
        let feed = fetch_one(&client, &source_for(&mock_server), &settings())
            .await
            .unwrap();
        assert!(feed.well_formed);
        assert_eq!(feed.entries.len(), 1);
        assert_eq!(feed.entries[0].get("title"), Some("Test"));
    }

    #[tokio::test]
    async fn test_fetch_one_unparseable_is_malformed() {
        let mock_server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_string("<not valid xml"))
            .mount(&mock_server)
            .await;

        let client = build_client(&settings()).unwrap();
        let err = fetch_one(&client, &source_for(&mock_server), &settings())
            .await
            .unwrap_err();
        assert!(matches!(err, FetchError::MalformedFeed));
    }

    #[tokio::test]
    async fn test_fetch_one_empty_feed_is_success() {
        let empty_rss = r#"<?xml version="1.0"?>
<rss version="2.0"><channel><title>Empty</title></channel></rss>"#;

        let mock_server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_string(empty_rss))
            .mount(&mock_server)
            .await;

        let client = build_client(&settings()).unwrap();
        let feed = fetch_one(&client, &source_for(&mock_server), &settings())
            .await
            .unwrap();
        assert!(feed.well_formed);
        assert!(feed.entries.is_empty());
    }
}
