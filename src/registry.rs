//! Feed source registry.
//!
//! The registry is fixed for the lifetime of the process. It is either the
//! built-in list or a list supplied through [`crate::config::Config`], in
//! which case every entry is validated before use.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;

use crate::config::ConfigError;
use crate::util::validate_url;

/// Tab names that a source id may not shadow.
const RESERVED_IDS: [&str; 2] = ["all", "saved"];

/// One registered RSS endpoint plus its display metadata.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeedSource {
    pub id: String,
    pub label: String,
    pub url: String,
    #[serde(default)]
    pub color: String,
    #[serde(default)]
    pub icon: String,
    #[serde(default)]
    pub description: String,
}

impl FeedSource {
    fn new(id: &str, label: &str, url: &str, color: &str, icon: &str, description: &str) -> Self {
        Self {
            id: id.to_string(),
            label: label.to_string(),
            url: url.to_string(),
            color: color.to_string(),
            icon: icon.to_string(),
            description: description.to_string(),
        }
    }
}

/// Ordered, validated set of feed sources.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Registry {
    sources: Vec<FeedSource>,
}

impl Registry {
    /// The built-in sources.
    pub fn builtin() -> Self {
        Self {
            sources: vec![
                FeedSource::new(
                    "bensbites",
                    "Ben's Bites",
                    "https://bensbites.substack.com/feed",
                    "#818cf8",
                    "🍔",
                    "AI tools, startups & investing insights",
                ),
                FeedSource::new(
                    "rundown_ai",
                    "The AI Rundown",
                    "https://rss.beehiiv.com/feeds/2R3C6Bt5wj.xml",
                    "#fb923c",
                    "⚡",
                    "Daily AI news briefing for professionals",
                ),
            ],
        }
    }

    /// Builds a registry from configured sources.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidSource`] for an empty, duplicate or
    /// reserved id, an empty label, or a URL that is not a public http(s)
    /// address.
    pub fn new(sources: Vec<FeedSource>) -> Result<Self, ConfigError> {
        let mut seen = HashSet::new();
        for source in &sources {
            let invalid = |reason: String| ConfigError::InvalidSource {
                id: source.id.clone(),
                reason,
            };

            if source.id.trim().is_empty() {
                return Err(invalid("id must not be empty".into()));
            }
            if RESERVED_IDS.contains(&source.id.as_str()) {
                return Err(invalid(format!("'{}' is a reserved tab name", source.id)));
            }
            if !seen.insert(source.id.as_str()) {
                return Err(invalid("duplicate id".into()));
            }
            if source.label.trim().is_empty() {
                return Err(invalid("label must not be empty".into()));
            }
            validate_url(&source.url).map_err(|e| invalid(e.to_string()))?;
        }
        Ok(Self { sources })
    }

    pub fn sources(&self) -> &[FeedSource] {
        &self.sources
    }

    pub fn get(&self, id: &str) -> Option<&FeedSource> {
        self.sources.iter().find(|s| s.id == id)
    }

    pub fn len(&self) -> usize {
        self.sources.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sources.is_empty()
    }
}

impl Default for Registry {
    fn default() -> Self {
        Self::builtin()
    }
}
