//! Configuration file parser for ~/.config/quakefeed/config.toml.
//!
//! The config file is optional: a missing file yields `Config::default()`.
//! Unknown keys are accepted by serde, though we log a warning when the file
//! contains potential typos.
use crate::feed::{FeedSchema, FetchOptions, ParseOptions, ParsePolicy, TimeZonePolicy};
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

/// USGS feed of recent events, newest first.
pub const DEFAULT_FEED_URL: &str =
    "https://earthquake.usgs.gov/fdsnws/event/1/query?format=geojson&orderby=time";

// ============================================================================
// Error Types
// ============================================================================

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid TOML in config file: {0}")]
    Parse(#[from] toml::de::Error),

    /// Config file exceeds maximum allowed size.
    #[error("Config file too large: {0}")]
    TooLarge(String),

    /// Well-formed TOML with an unusable value.
    #[error("Invalid config value: {0}")]
    Invalid(String),
}

// ============================================================================
// Configuration Structs
// ============================================================================

/// Top-level application configuration.
///
/// All fields use `#[serde(default)]` so any subset of keys can be specified.
/// Missing keys fall back to `Default::default()`.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Feed to load.
    pub feed_url: String,

    /// Seconds allowed to establish the connection.
    pub connect_timeout_secs: u64,

    /// Seconds allowed between reads once connected.
    pub read_timeout_secs: u64,

    /// Responses larger than this fail with a transport error.
    pub max_payload_bytes: usize,

    /// Zone used for date and time strings: "utc", "local" or "+HH:MM".
    pub timezone: TimeZonePolicy,

    /// "fail_fast" or "skip_malformed".
    pub parse_policy: ParsePolicy,

    /// Field names of the remote feed.
    pub schema: FeedSchema,
}

impl Default for Config {
    fn default() -> Self {
        let fetch = FetchOptions::default();
        Self {
            feed_url: DEFAULT_FEED_URL.to_string(),
            connect_timeout_secs: fetch.connect_timeout.as_secs(),
            read_timeout_secs: fetch.read_timeout.as_secs(),
            max_payload_bytes: fetch.max_payload_bytes,
            timezone: TimeZonePolicy::default(),
            parse_policy: ParsePolicy::default(),
            schema: FeedSchema::default(),
        }
    }
}

impl Config {
    /// Maximum config file size (1 MB).
    const MAX_FILE_SIZE: u64 = 1_048_576;

    const KNOWN_KEYS: [&'static str; 7] = [
        "feed_url",
        "connect_timeout_secs",
        "read_timeout_secs",
        "max_payload_bytes",
        "timezone",
        "parse_policy",
        "schema",
    ];

    /// Load configuration from a TOML file.
    ///
    /// - Missing file → `Ok(Config::default())`
    /// - Empty file → `Ok(Config::default())`
    /// - Invalid TOML or wrong value types → `Err(ConfigError::Parse)`
    /// - Zero timeouts, zero size limit or empty field names → `Err(ConfigError::Invalid)`
    /// - Unknown keys → silently accepted, logged as warning
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        // Check file size before reading to avoid loading a huge file
        match std::fs::metadata(path) {
            Ok(meta) if meta.len() > Self::MAX_FILE_SIZE => {
                return Err(ConfigError::TooLarge(format!(
                    "Config file is {} bytes (max {} bytes)",
                    meta.len(),
                    Self::MAX_FILE_SIZE
                )));
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!(path = %path.display(), "No config file found, using defaults");
                return Ok(Self::default());
            }
            Err(e) => return Err(ConfigError::Io(e)),
            Ok(_) => {}
        }

        let content = match std::fs::read_to_string(path) {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                // File deleted between metadata and read
                tracing::debug!(path = %path.display(), "Config file disappeared, using defaults");
                return Ok(Self::default());
            }
            Err(e) => return Err(ConfigError::Io(e)),
        };

        Self::from_toml(&content).inspect(|config| {
            tracing::info!(
                path = %path.display(),
                feed_url = %config.feed_url,
                timezone = %config.timezone,
                "Loaded configuration"
            );
        })
    }

    /// Parse configuration from TOML text. Blank text yields defaults.
    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        if content.trim().is_empty() {
            return Ok(Self::default());
        }

        if let Ok(raw) = content.parse::<toml::Table>() {
            for key in raw.keys() {
                if !Self::KNOWN_KEYS.iter().any(|known| *known == key.as_str()) {
                    tracing::warn!(key = %key, "Unknown key in config file, ignoring");
                }
            }
        }

        let config: Config = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.connect_timeout_secs == 0 {
            return Err(ConfigError::Invalid("connect_timeout_secs must be at least 1".into()));
        }
        if self.read_timeout_secs == 0 {
            return Err(ConfigError::Invalid("read_timeout_secs must be at least 1".into()));
        }
        if self.max_payload_bytes == 0 {
            return Err(ConfigError::Invalid("max_payload_bytes must be positive".into()));
        }

        let schema = &self.schema;
        let required = [
            ("schema.features", &schema.features),
            ("schema.magnitude", &schema.magnitude),
            ("schema.location", &schema.location),
            ("schema.time", &schema.time),
            ("schema.url", &schema.url),
        ];
        if let Some((key, _)) = required.iter().find(|(_, value)| value.trim().is_empty()) {
            return Err(ConfigError::Invalid(format!("{key} must not be empty")));
        }
        Ok(())
    }

    pub fn fetch_options(&self) -> FetchOptions {
        FetchOptions {
            connect_timeout: Duration::from_secs(self.connect_timeout_secs),
            read_timeout: Duration::from_secs(self.read_timeout_secs),
            max_payload_bytes: self.max_payload_bytes,
        }
    }

    pub fn parse_options(&self) -> ParseOptions {
        ParseOptions {
            schema: self.schema.clone(),
            policy: self.parse_policy,
            timezone: self.timezone,
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
