use crate::feed::types::LoadError;
use crate::util::validate_feed_url;
use async_trait::async_trait;
use futures::StreamExt;
use std::time::Duration;

pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(15);
pub const DEFAULT_READ_TIMEOUT: Duration = Duration::from_secs(10);
pub const DEFAULT_MAX_PAYLOAD_BYTES: usize = 10 * 1024 * 1024; // 10MB

/// Anything that can produce a raw feed payload for a URL.
///
/// [`HttpFetcher`] is the production implementation; the loader only depends
/// on this trait so hosts can substitute their own transport.
#[async_trait]
pub trait FeedSource: Send + Sync {
    /// Fetches the payload at `url` as text.
    async fn fetch(&self, url: &str) -> Result<String, LoadError>;
}

/// Tunables for [`HttpFetcher`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FetchOptions {
    pub connect_timeout: Duration,
    pub read_timeout: Duration,
    pub max_payload_bytes: usize,
}

impl Default for FetchOptions {
    fn default() -> Self {
        Self {
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            read_timeout: DEFAULT_READ_TIMEOUT,
            max_payload_bytes: DEFAULT_MAX_PAYLOAD_BYTES,
        }
    }
}

/// Single-attempt HTTP GET with connect and read timeouts.
///
/// Cloning is cheap: the underlying `reqwest::Client` shares its pool.
#[derive(Debug, Clone)]
pub struct HttpFetcher {
    client: reqwest::Client,
    options: FetchOptions,
}

impl HttpFetcher {
    /// Builds a fetcher with its own HTTP client.
    ///
    /// # Errors
    ///
    /// Returns [`LoadError::TransportFailure`] if the TLS backend or resolver
    /// cannot be initialized.
    pub fn new(options: FetchOptions) -> Result<Self, LoadError> {
        let client = reqwest::Client::builder()
            .connect_timeout(options.connect_timeout)
            .read_timeout(options.read_timeout)
            .user_agent(concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| LoadError::TransportFailure(e.to_string()))?;

        Ok(Self { client, options })
    }

    pub fn options(&self) -> &FetchOptions {
        &self.options
    }

    /// Performs one GET against `url` and returns the body as text.
    ///
    /// Only status 200 counts as success. No retry is attempted. The response
    /// and its connection are owned by this call and dropped on every return
    /// path, including cancellation of the returned future.
    ///
    /// # Errors
    ///
    /// - [`LoadError::InvalidUrl`] - `url` is not an absolute http(s) URL
    /// - [`LoadError::Timeout`] - connect or read timeout elapsed
    /// - [`LoadError::HttpStatus`] - any status other than 200
    /// - [`LoadError::TransportFailure`] - connection errors, bodies over the
    ///   size limit, truncated bodies, or bodies that are not UTF-8
    pub async fn fetch(&self, url: &str) -> Result<String, LoadError> {
        let url = validate_feed_url(url).map_err(|e| LoadError::InvalidUrl(e.to_string()))?;

        tracing::debug!(url = %url, "Fetching feed");

        // Headers must arrive within connect + read; body chunks are bounded
        // by the client's read timeout.
        let header_deadline = self.options.connect_timeout + self.options.read_timeout;
        let response = tokio::time::timeout(header_deadline, self.client.get(url.clone()).send())
            .await
            .map_err(|_| LoadError::Timeout)?
            .map_err(classify)?;

        let status = response.status();
        if status != reqwest::StatusCode::OK {
            tracing::warn!(url = %url, status = %status, "Feed request failed");
            return Err(LoadError::HttpStatus(status.as_u16()));
        }

        let bytes = read_limited_bytes(response, self.options.max_payload_bytes).await?;
        tracing::debug!(url = %url, bytes = bytes.len(), "Feed fetched");

        String::from_utf8(bytes).map_err(|e| {
            LoadError::TransportFailure(format!("response body is not valid UTF-8: {e}"))
        })
    }
}

#[async_trait]
impl FeedSource for HttpFetcher {
    async fn fetch(&self, url: &str) -> Result<String, LoadError> {
        HttpFetcher::fetch(self, url).await
    }
}

fn classify(err: reqwest::Error) -> LoadError {
    if err.is_timeout() {
        LoadError::Timeout
    } else if err.is_builder() {
        LoadError::InvalidUrl(err.to_string())
    } else {
        LoadError::TransportFailure(err.to_string())
    }
}

async fn read_limited_bytes(response: reqwest::Response, limit: usize) -> Result<Vec<u8>, LoadError> {
    let expected_length = response.content_length();

    // Fast path: check Content-Length header
    if let Some(len) = expected_length {
        if len > limit as u64 {
            return Err(too_large(limit));
        }
    }

    let mut bytes = Vec::new();
    let mut stream = response.bytes_stream();

    while let Some(chunk) = stream.next().await {
        let chunk = chunk.map_err(classify)?;
        if bytes.len().saturating_add(chunk.len()) > limit {
            return Err(too_large(limit));
        }
        bytes.extend_from_slice(&chunk);
    }

    if let Some(expected) = expected_length {
        if (bytes.len() as u64) < expected {
            return Err(LoadError::TransportFailure(format!(
                "incomplete response: expected {} bytes, received {}",
                expected,
                bytes.len()
            )));
        }
    }

    Ok(bytes)
}

fn too_large(limit: usize) -> LoadError {
    LoadError::TransportFailure(format!("response exceeds {limit} bytes"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::feed::types::ErrorKind;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const BODY: &str = r#"{"features": []}"#;

    fn fetcher() -> HttpFetcher {
        HttpFetcher::new(FetchOptions::default()).unwrap()
    }

    fn fast_timeouts() -> FetchOptions {
        FetchOptions {
            connect_timeout: Duration::from_millis(200),
            read_timeout: Duration::from_millis(200),
            ..FetchOptions::default()
        }
    }

    #[tokio::test]
    async fn test_fetch_success_returns_body() {
        let mock_server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/query"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_string(BODY)
                    .insert_header("Content-Type", "application/json"),
            )
            .expect(1)
            .mount(&mock_server)
            .await;

        let body = fetcher()
            .fetch(&format!("{}/query", mock_server.uri()))
            .await
            .unwrap();
        assert_eq!(body, BODY);
    }

    #[tokio::test]
    async fn test_fetch_404_error() {
        let mock_server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&mock_server)
            .await;

        match fetcher().fetch(&mock_server.uri()).await.unwrap_err() {
            LoadError::HttpStatus(404) => {}
            e => panic!("Expected HttpStatus(404), got {:?}", e),
        }
    }

    #[tokio::test]
    async fn test_fetch_500_is_not_retried() {
        let mock_server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(500))
            .expect(1)
            .mount(&mock_server)
            .await;

        let err = fetcher().fetch(&mock_server.uri()).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::HttpStatus(500));
    }

    #[tokio::test]
    async fn test_fetch_non_200_success_status_rejected() {
        let mock_server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(204))
            .mount(&mock_server)
            .await;

        let err = fetcher().fetch(&mock_server.uri()).await.unwrap_err();
        assert_eq!(err, LoadError::HttpStatus(204));
    }

    #[tokio::test]
    async fn test_fetch_empty_body_is_not_a_fetch_error() {
        let mock_server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200))
            .mount(&mock_server)
            .await;

        let body = fetcher().fetch(&mock_server.uri()).await.unwrap();
        assert!(body.is_empty());
    }

    #[tokio::test]
    async fn test_fetch_slow_server_times_out() {
        let mock_server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_string(BODY)
                    .set_delay(Duration::from_secs(3)),
            )
            .mount(&mock_server)
            .await;

        let fetcher = HttpFetcher::new(fast_timeouts()).unwrap();
        let err = fetcher.fetch(&mock_server.uri()).await.unwrap_err();
        assert_eq!(err, LoadError::Timeout);
    }

    #[tokio::test]
    async fn test_fetch_invalid_url() {
        let err = fetcher().fetch("not a url").await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidUrl);

        let err = fetcher().fetch("ftp://example.com/feed").await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidUrl);
    }

    #[tokio::test]
    async fn test_fetch_connection_refused_is_transport_failure() {
        // Grab a free port, then release it so nothing is listening
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);

        let fetcher = HttpFetcher::new(fast_timeouts()).unwrap();
        let err = fetcher
            .fetch(&format!("http://127.0.0.1:{}/query", port))
            .await
            .unwrap_err();
        assert!(
            matches!(err.kind(), ErrorKind::TransportFailure | ErrorKind::Timeout),
            "unexpected error: {:?}",
            err
        );
    }

    #[tokio::test]
    async fn test_fetch_oversized_body_rejected() {
        let mock_server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_string("x".repeat(2048)))
            .mount(&mock_server)
            .await;

        let fetcher = HttpFetcher::new(FetchOptions {
            max_payload_bytes: 1024,
            ..FetchOptions::default()
        })
        .unwrap();
        let err = fetcher.fetch(&mock_server.uri()).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::TransportFailure);
        assert!(err.to_string().contains("exceeds 1024 bytes"));
    }

    #[tokio::test]
    async fn test_fetch_non_utf8_body_rejected() {
        let mock_server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(vec![0xff, 0xfe, 0x00, 0x7b]))
            .mount(&mock_server)
            .await;

        let err = fetcher().fetch(&mock_server.uri()).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::TransportFailure);
        assert!(err.to_string().contains("UTF-8"));
    }

    #[tokio::test]
    async fn test_fetch_through_trait_object() {
        let mock_server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_string(BODY))
            .mount(&mock_server)
            .await;

        let source: std::sync::Arc<dyn FeedSource> = std::sync::Arc::new(fetcher());
        assert_eq!(source.fetch(&mock_server.uri()).await.unwrap(), BODY);
    }

    #[tokio::test]
    async fn test_new_keeps_configured_options() {
        let fetcher = HttpFetcher::new(FetchOptions {
            max_payload_bytes: 4096,
            ..fast_timeouts()
        })
        .unwrap();

        let options = fetcher.options();
        assert_eq!(options.connect_timeout, Duration::from_millis(200));
        assert_eq!(options.read_timeout, Duration::from_millis(200));
        assert_eq!(options.max_payload_bytes, 4096);
    }
}
