//! Configuration file parser for the feed pipeline.
//!
//! The config file is optional; a missing file yields `Config::default()`.
//! Unknown keys are silently ignored by serde (with `deny_unknown_fields` off),
//! though we log a warning when the file contains potential typos.
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

use crate::translate::LanguageCode;
use crate::util::{validate_base_url, UrlValidationError};

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

    #[error("Invalid API base URL: {0}")]
    InvalidBaseUrl(#[from] UrlValidationError),
}

// ============================================================================
// Configuration Structs
// ============================================================================

/// Top-level pipeline configuration.
///
/// All fields use `#[serde(default)]` so any subset of keys can be specified.
/// Missing keys fall back to `Default::default()`.
///
/// Custom Debug impl masks `api_token` to prevent secret leakage in logs.
#[derive(Clone, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Base endpoint of the news API.
    pub api_base_url: String,

    /// Bearer token sent with every request. Token refresh is not handled.
    pub api_token: Option<String>,

    /// Articles requested per page.
    pub page_size: usize,

    /// Retries per logical request, shared between 429s and transport failures.
    pub max_retries: u32,

    /// Timeout for a single attempt (send + body).
    pub attempt_timeout_ms: u64,

    /// Ceiling for a whole request resource.
    pub resource_timeout_ms: u64,

    /// Fixed delay between attempts after a 429.
    pub rate_limit_delay_ms: u64,

    /// Quiet period before a typed search query is issued.
    pub search_debounce_ms: u64,

    /// Fraction of the loaded list at which the next page is prefetched.
    pub prefetch_threshold: f64,

    pub feed_cache_capacity: usize,

    /// Lifetime of a cached first page. 0 = no expiry.
    pub feed_cache_ttl_secs: u64,

    pub translation_cache_capacity: usize,

    /// Default translation target until the preference store says otherwise.
    pub preferred_language: LanguageCode,

    pub auto_translate: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            api_base_url: "https://api.matchday.news".to_string(),
            api_token: None,
            page_size: 20,
            max_retries: 3,
            attempt_timeout_ms: 5_000,
            resource_timeout_ms: 10_000,
            rate_limit_delay_ms: 1_000,
            search_debounce_ms: 500,
            prefetch_threshold: 0.8,
            feed_cache_capacity: 100,
            feed_cache_ttl_secs: 300,
            translation_cache_capacity: 500,
            preferred_language: LanguageCode::new("en"),
            auto_translate: true,
        }
    }
}

/// Mask api_token in Debug output to prevent secret leakage.
impl std::fmt::Debug for Config {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Config")
            .field("api_base_url", &self.api_base_url)
            .field("api_token", &self.api_token.as_ref().map(|_| "[REDACTED]"))
            .field("page_size", &self.page_size)
            .field("max_retries", &self.max_retries)
            .field("attempt_timeout_ms", &self.attempt_timeout_ms)
            .field("resource_timeout_ms", &self.resource_timeout_ms)
            .field("rate_limit_delay_ms", &self.rate_limit_delay_ms)
            .field("search_debounce_ms", &self.search_debounce_ms)
            .field("prefetch_threshold", &self.prefetch_threshold)
            .field("feed_cache_capacity", &self.feed_cache_capacity)
            .field("feed_cache_ttl_secs", &self.feed_cache_ttl_secs)
            .field(
                "translation_cache_capacity",
                &self.translation_cache_capacity,
            )
            .field("preferred_language", &self.preferred_language)
            .field("auto_translate", &self.auto_translate)
            .finish()
    }
}

impl Config {
    /// Maximum config file size (1 MB).
    const MAX_FILE_SIZE: u64 = 1_048_576;

    const KNOWN_KEYS: [&'static str; 14] = [
        "api_base_url",
        "api_token",
        "page_size",
        "max_retries",
        "attempt_timeout_ms",
        "resource_timeout_ms",
        "rate_limit_delay_ms",
        "search_debounce_ms",
        "prefetch_threshold",
        "feed_cache_capacity",
        "feed_cache_ttl_secs",
        "translation_cache_capacity",
        "preferred_language",
        "auto_translate",
    ];

    /// Load configuration from a TOML file.
    ///
    /// - Missing file → `Ok(Config::default())`
    /// - Empty file → `Ok(Config::default())`
    /// - Invalid TOML → `Err(ConfigError::Parse)` with line number info
    /// - Unknown keys → silently accepted (serde default behavior), logged as warning
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
                // File deleted between metadata and read
                tracing::debug!(path = %path.display(), "Config file disappeared, using defaults");
                return Ok(Self::default());
            }
            Err(e) => return Err(ConfigError::Io(e)),
        };

        Self::from_toml_str(&content)
    }

    /// Parse configuration from TOML text.
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        if content.trim().is_empty() {
            tracing::debug!("Config is empty, using defaults");
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
            base_url = %config.api_base_url,
            page_size = config.page_size,
            language = %config.preferred_language,
            "Loaded configuration"
        );
        Ok(config)
    }

    /// Check values that serde cannot: the base URL policy.
    pub fn validate(&self) -> Result<(), ConfigError> {
        validate_base_url(&self.api_base_url)?;
        Ok(())
    }

    pub fn attempt_timeout(&self) -> Duration {
        Duration::from_millis(self.attempt_timeout_ms)
    }

    pub fn resource_timeout(&self) -> Duration {
        Duration::from_millis(self.resource_timeout_ms)
    }

    pub fn rate_limit_delay(&self) -> Duration {
        Duration::from_millis(self.rate_limit_delay_ms)
    }

    pub fn search_debounce(&self) -> Duration {
        Duration::from_millis(self.search_debounce_ms)
    }

    /// `None` when cached pages never expire.
    pub fn feed_cache_ttl(&self) -> Option<Duration> {
        (self.feed_cache_ttl_secs > 0).then(|| Duration::from_secs(self.feed_cache_ttl_secs))
    }
}

// ============================================================================
// Tests
// ============================================================================
