//! # quakefeed
//!
//! Loads a time-ordered earthquake feed over HTTP and turns every feature
//! entry into a display-ready [`FeedRecord`](feed::FeedRecord).
//!
//! ```text
//! FeedLoader → HttpFetcher → parse_feed → transform
//! ```
//!
//! - [`feed`]: fetching, parsing and per-field formatting
//! - [`loader`]: single-flight load state machine with cached results
//! - [`config`]: optional TOML configuration file
//! - [`util`]: URL validation

pub mod config;
pub mod feed;
pub mod loader;
pub mod util;

pub use feed::{ErrorKind, FeedRecord, LoadError, LoadResult};
pub use loader::{FeedLoader, LoadObserver, LoaderEvent, LoaderStatus};
