//! TOML configuration for the aggregator.
//!
//! The embedding application supplies the text; this module never touches
//! the filesystem or the environment. An empty document yields
//! `Config::default()`. Unknown keys are accepted and logged as warnings so a
//! typo does not silently disable a setting.
use serde::Deserialize;
use std::time::Duration;
use thiserror::Error;

use crate::feed::ProxyConfig;
use crate::registry::{FeedSource, Registry};

// ============================================================================
// Error Types
// ============================================================================

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Invalid TOML in config: {0}")]
    Parse(#[from] toml::de::Error),

    /// SEC-014: Config text exceeds maximum allowed size.
    #[error("Config too large: {0} bytes")]
    TooLarge(usize),

    #[error("Invalid value for `{key}`: {reason}")]
    InvalidValue { key: &'static str, reason: String },

    #[error("Invalid feed source '{id}': {reason}")]
    InvalidSource { id: String, reason: String },
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
    /// Hours between scheduled refresh cycles; also the staleness threshold
    /// of the due-check.
    pub refresh_interval_hours: u64,

    /// Bound on each proxy attempt, request and body included.
    pub request_timeout_secs: u64,

    /// Response size cap per proxy attempt.
    pub max_feed_bytes: usize,

    /// Drop incoming items whose feed date is older than this many hours.
    /// `None` keeps everything the feed returns.
    pub max_item_age_hours: Option<u64>,

    /// Default level passed to [`crate::logging::init_logging`].
    pub log_level: String,

    pub primary_proxy: ProxyConfig,
    pub fallback_proxy: ProxyConfig,

    /// Replaces the built-in registry when present.
    pub sources: Option<Vec<FeedSource>>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            refresh_interval_hours: 24,
            request_timeout_secs: 20,
            max_feed_bytes: 10 * 1024 * 1024,
            max_item_age_hours: None,
            log_level: "info".to_string(),
            primary_proxy: ProxyConfig::allorigins(),
            fallback_proxy: ProxyConfig::corsproxy(),
            sources: None,
        }
    }
}

impl Config {
    /// SEC-014: Maximum config text size (1 MB).
    const MAX_LEN: usize = 1_048_576;

    const KNOWN_KEYS: [&'static str; 8] = [
        "refresh_interval_hours",
        "request_timeout_secs",
        "max_feed_bytes",
        "max_item_age_hours",
        "log_level",
        "primary_proxy",
        "fallback_proxy",
        "sources",
    ];

    /// Parse configuration from TOML text.
    ///
    /// - Empty text → `Ok(Config::default())`
    /// - Invalid TOML or wrong types → `Err(ConfigError::Parse)`
    /// - Zero interval/timeout/size, or an unparseable proxy base URL →
    ///   `Err(ConfigError::InvalidValue)`
    /// - Unknown keys → accepted, logged as warning
    pub fn parse(content: &str) -> Result<Self, ConfigError> {
        if content.len() > Self::MAX_LEN {
            return Err(ConfigError::TooLarge(content.len()));
        }
        if content.trim().is_empty() {
            tracing::debug!("Config is empty, using defaults");
            return Ok(Self::default());
        }

        if let Ok(raw) = content.parse::<toml::Table>() {
            for key in raw.keys() {
                if !Self::KNOWN_KEYS.contains(&key.as_str()) {
                    tracing::warn!(key = %key, "Unknown key in config, ignoring");
                }
            }
        }

        let config: Config = toml::from_str(content)?;
        config.validate()?;
        tracing::info!(
            refresh_interval_hours = config.refresh_interval_hours,
            custom_sources = config.sources.is_some(),
            "Loaded configuration"
        );
        Ok(config)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        let positive = [
            ("refresh_interval_hours", self.refresh_interval_hours),
            ("request_timeout_secs", self.request_timeout_secs),
            ("max_feed_bytes", self.max_feed_bytes as u64),
        ];
        for (key, value) in positive {
            if value == 0 {
                return Err(ConfigError::InvalidValue {
                    key,
                    reason: "must be greater than zero".into(),
                });
            }
        }

        for (key, proxy) in [
            ("primary_proxy", &self.primary_proxy),
            ("fallback_proxy", &self.fallback_proxy),
        ] {
            url::Url::parse(&proxy.base_url).map_err(|e| ConfigError::InvalidValue {
                key,
                reason: format!("base_url: {e}"),
            })?;
        }
        Ok(())
    }

    /// The configured registry, or the built-in one.
    pub fn registry(&self) -> Result<Registry, ConfigError> {
        match &self.sources {
            Some(sources) => Registry::new(sources.clone()),
            None => Ok(Registry::builtin()),
        }
    }

    pub fn refresh_interval(&self) -> Duration {
        Duration::from_secs(self.refresh_interval_hours.saturating_mul(3600))
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn max_item_age(&self) -> Option<chrono::Duration> {
        self.max_item_age_hours
            .and_then(|h| i64::try_from(h).ok())
            .and_then(chrono::Duration::try_hours)
    }
}

/// Error building the runtime pieces described by a [`Config`].
#[derive(Debug, Error)]
pub enum SetupError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("Failed to build HTTP client: {0}")]
    Http(#[from] reqwest::Error),
}

// ============================================================================
// Tests
// ============================================================================
