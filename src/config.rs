//! Configuration file parser for ~/.config/newsroll/config.toml.
//!
//! The config file is optional — a missing file yields `Config::default()`.
//! Unknown keys are accepted by serde but logged as likely typos.
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

use crate::aggregate::{AggregateOptions, Quota, DEFAULT_LIMIT};
use crate::feed::fetcher::{DEFAULT_MAX_FEED_SIZE, DEFAULT_USER_AGENT};
use crate::feed::{default_sources, sources_from_map, FetchSettings, Source};

// ============================================================================
// Error Types
// ============================================================================

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid TOML in config file: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Config file too large: {0}")]
    TooLarge(String),
}

// ============================================================================
// Configuration Structs
// ============================================================================

/// Top-level configuration.
///
/// All fields use `#[serde(default)]` so any subset of keys can be specified.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Per-source request timeout in seconds.
    pub timeout_secs: u64,

    /// Verify TLS certificates. Off by default: several news sites serve
    /// broken chains.
    pub verify_ssl: bool,

    /// Limit for sources not named in a per-source `limits` table.
    pub default_limit: usize,

    /// Either `limits = 5` or a `[limits]` table of `name = n`.
    pub limits: Quota,

    /// Optional cap on sources fetched at once. Unset fetches all at once.
    pub max_concurrent: Option<usize>,

    /// Response bodies above this size are rejected.
    pub max_feed_size_bytes: usize,

    pub user_agent: String,

    /// `name = "url"` pairs. Empty means the built-in registry.
    pub sources: BTreeMap<String, String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            timeout_secs: 10,
            verify_ssl: false,
            default_limit: DEFAULT_LIMIT,
            limits: Quota::default(),
            max_concurrent: None,
            max_feed_size_bytes: DEFAULT_MAX_FEED_SIZE,
            user_agent: DEFAULT_USER_AGENT.to_string(),
            sources: BTreeMap::new(),
        }
    }
}

impl Config {
    /// Maximum config file size (1 MB).
    const MAX_FILE_SIZE: u64 = 1_048_576;

    const KNOWN_KEYS: [&'static str; 8] = [
        "timeout_secs",
        "verify_ssl",
        "default_limit",
        "limits",
        "max_concurrent",
        "max_feed_size_bytes",
        "user_agent",
        "sources",
    ];

    /// Load configuration from a TOML file.
    ///
    /// - Missing file → `Ok(Config::default())`
    /// - Empty file → `Ok(Config::default())`
    /// - Invalid TOML or a malformed quota → `Err(ConfigError::Parse)`
    /// - Unknown keys → accepted, logged as warning
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
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
                // Race condition: file deleted between metadata and read
                tracing::debug!(path = %path.display(), "Config file disappeared, using defaults");
                return Ok(Self::default());
            }
            Err(e) => return Err(ConfigError::Io(e)),
        };

        Self::from_toml(&content)
    }

    /// Parses configuration from TOML text.
    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        if content.trim().is_empty() {
            return Ok(Self::default());
        }

        if let Ok(raw) = content.parse::<toml::Table>() {
            for key in raw.keys() {
                if !Self::KNOWN_KEYS.contains(&key.as_str()) {
                    tracing::warn!(key = %key, "Unknown key in config file, ignoring");
                }
            }
        }

        let config: Config = toml::from_str(content)?;
        tracing::info!(
            sources = config.sources.len(),
            timeout_secs = config.timeout_secs,
            verify_ssl = config.verify_ssl,
            "Loaded configuration"
        );
        Ok(config)
    }

    /// Configured sources, or the built-in registry when none are listed.
    pub fn sources(&self) -> Vec<Source> {
        if self.sources.is_empty() {
            default_sources()
        } else {
            sources_from_map(&self.sources)
        }
    }

    pub fn aggregate_options(&self) -> AggregateOptions {
        AggregateOptions {
            default_limit: self.default_limit,
            max_concurrent: self.max_concurrent,
            fetch: FetchSettings {
                timeout: Duration::from_secs(self.timeout_secs),
                verify_ssl: self.verify_ssl,
                max_feed_size: self.max_feed_size_bytes,
                user_agent: self.user_agent.clone(),
            },
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
