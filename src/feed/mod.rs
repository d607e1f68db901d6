//! Feed retrieval and record derivation.
//!
//! This module provides the pipeline stages driven by [`FeedLoader`](crate::loader::FeedLoader):
//!
//! - **Fetching**: Single-attempt HTTP GET with connect/read timeouts
//! - **Parsing**: GeoJSON-style payload into an ordered list of records
//! - **Transforming**: Display-ready magnitude, location, date and time strings
//!
//! # Architecture
//!
//! - [`fetcher`] - `reqwest`-based [`HttpFetcher`] behind the [`FeedSource`] trait
//! - [`parser`] - `serde_json` payload parsing with a configurable [`FeedSchema`]
//! - [`transform`] - pure per-field formatting
//! - [`types`] - [`FeedRecord`], [`LoadError`] and [`LoadResult`]
//!
//! # Example
//!
//! ```ignore
//! use quakefeed::feed::{parse_feed, HttpFetcher, FetchOptions, ParseOptions};
//!
//! let fetcher = HttpFetcher::new(FetchOptions::default())?;
//! let payload = fetcher.fetch(url).await?;
//! let parsed = parse_feed(&payload, &ParseOptions::default())?;
//! ```

pub mod fetcher;
pub mod parser;
pub mod transform;
pub mod types;

pub use fetcher::{FeedSource, FetchOptions, HttpFetcher};
pub use parser::{parse_feed, FeedSchema, ParseOptions, ParsePolicy, ParsedFeed};
pub use transform::{
    format_date, format_magnitude, format_time, split_location, LocationParts, TimeZonePolicy,
    NEAR_BY,
};
pub use types::{ErrorKind, FeedRecord, LoadError, LoadResult};
