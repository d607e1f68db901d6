use serde::Serialize;
use std::sync::Arc;
use thiserror::Error;

// ============================================================================
// Records
// ============================================================================

/// One display-ready event record, derived from a single feature entry.
///
/// Every field is a finished string. Records are delivered inside an
/// `Arc<[FeedRecord]>` and never mutated after delivery.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FeedRecord {
    /// Magnitude with exactly one decimal digit (e.g. `"6.1"`)
    pub magnitude_display: String,
    /// Location description with the offset prefix removed
    pub primary_location: String,
    /// Offset prefix such as `"5km N of"`, or `"Near by"`
    pub offset_display: String,
    /// Date rendered as `MMM dd, yyyy`
    pub date_display: String,
    /// Time rendered as `h:mm a`
    pub time_display: String,
    /// Detail page link, passed through untouched
    pub detail_url: String,
}

/// Outcome of one load episode.
///
/// `Ok` holds the records in feed order; `Err` holds the failure.
pub type LoadResult = Result<Arc<[FeedRecord]>, LoadError>;

// ============================================================================
// Error Types
// ============================================================================

/// Failures that can end a load episode.
///
/// All failures are plain values: they are delivered to the observer as the
/// `Err` side of a [`LoadResult`], never raised past the loader.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LoadError {
    /// The feed URL could not be parsed or uses an unsupported scheme
    #[error("Invalid URL: {0}")]
    InvalidUrl(String),
    /// Connect or read timeout elapsed
    #[error("Request timed out")]
    Timeout,
    /// Server answered with anything other than 200
    #[error("HTTP error: status {0}")]
    HttpStatus(u16),
    /// Response body was empty or whitespace only
    #[error("Empty payload")]
    EmptyPayload,
    /// Body is not JSON, or the feature collection is absent
    #[error("Malformed payload: {0}")]
    MalformedPayload(String),
    /// A feature entry lacks a required field or has it with the wrong type
    #[error("Feature {index}: missing or invalid field `{field}`")]
    MissingField { index: usize, field: String },
    /// Lower-level I/O fault (connection reset, DNS, oversized or truncated body)
    #[error("Transport failure: {0}")]
    TransportFailure(String),
    /// The background unit panicked before producing a result
    #[error("Background load panicked: {0}")]
    WorkerPanicked(String),
}

/// Message-free discriminant of a [`LoadError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    InvalidUrl,
    Timeout,
    HttpStatus(u16),
    EmptyPayload,
    MalformedPayload,
    MissingField,
    TransportFailure,
    WorkerPanicked,
}

impl LoadError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            LoadError::InvalidUrl(_) => ErrorKind::InvalidUrl,
            LoadError::Timeout => ErrorKind::Timeout,
            LoadError::HttpStatus(code) => ErrorKind::HttpStatus(*code),
            LoadError::EmptyPayload => ErrorKind::EmptyPayload,
            LoadError::MalformedPayload(_) => ErrorKind::MalformedPayload,
            LoadError::MissingField { .. } => ErrorKind::MissingField,
            LoadError::TransportFailure(_) => ErrorKind::TransportFailure,
            LoadError::WorkerPanicked(_) => ErrorKind::WorkerPanicked,
        }
    }

    pub(crate) fn missing_field(index: usize, field: &str) -> Self {
        LoadError::MissingField {
            index,
            field: field.to_string(),
        }
    }
}
