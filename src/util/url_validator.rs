use thiserror::Error;
use url::Url;

/// Errors that can occur while turning a string into a fetchable feed URL.
#[derive(Error, Debug)]
pub enum UrlValidationError {
    /// The URL string could not be parsed.
    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),
    /// The URL uses a scheme other than http or https.
    #[error("Unsupported scheme: {0} (only http/https allowed)")]
    UnsupportedScheme(String),
    /// The URL has no host to connect to.
    #[error("URL has no host")]
    MissingHost,
}

/// Validates a URL string for use as a feed source.
///
/// Accepts absolute `http` and `https` URLs with a host. Loopback and
/// private addresses are allowed: the feed location is chosen by the
/// operator, not by remote content.
///
/// # Errors
///
/// Returns [`UrlValidationError`] if:
/// - The URL cannot be parsed ([`UrlValidationError::InvalidUrl`])
/// - The scheme is not `http` or `https` ([`UrlValidationError::UnsupportedScheme`])
/// - The host is empty ([`UrlValidationError::MissingHost`])
///
/// # Examples
///
/// ```
/// use quakefeed::util::validate_feed_url;
///
/// let url = validate_feed_url("https://earthquake.usgs.gov/fdsnws/event/1/query").unwrap();
/// assert_eq!(url.host_str(), Some("earthquake.usgs.gov"));
///
/// assert!(validate_feed_url("not a url").is_err());
/// assert!(validate_feed_url("file:///etc/passwd").is_err());
/// ```
pub fn validate_feed_url(url_str: &str) -> Result<Url, UrlValidationError> {
    let url = Url::parse(url_str.trim())?;

    match url.scheme() {
        "http" | "https" => {}
        scheme => return Err(UrlValidationError::UnsupportedScheme(scheme.to_owned())),
    }

    match url.host_str() {
        Some(host) if !host.is_empty() => Ok(url),
        _ => Err(UrlValidationError::MissingHost),
    }
}
