use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Number of hex characters kept from the URL digest.
const ID_HEX_LEN: usize = 16;

/// A normalised feed entry.
///
/// Serialises to the persisted cache schema:
/// `{ id, title, summary, url, source, source_label, published_at,
///    fetched_at, image_url, tags, is_saved }`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Article {
    /// [`article_id`] of `url`.
    pub id: String,
    pub title: String,
    /// Plain text, at most 300 characters plus an ellipsis marker.
    #[serde(default)]
    pub summary: String,
    pub url: String,
    /// Registry id of the feed this entry came from.
    pub source: String,
    pub source_label: String,
    pub published_at: DateTime<Utc>,
    pub fetched_at: DateTime<Utc>,
    #[serde(default)]
    pub image_url: Option<String>,
    #[serde(default)]
    pub tags: Vec<String>,
    /// The only field carried across fetches; see [`crate::articles::merge`].
    #[serde(default, rename = "is_saved")]
    pub saved: bool,
}

/// Deterministic identifier for an article URL.
///
/// The first 16 hex characters of the SHA-256 digest of the URL bytes. The
/// same URL always yields the same id, across runs and platforms.
///
/// # Examples
///
/// ```
/// use scruper::feed::article_id;
///
/// let id = article_id("https://example.com/post");
/// assert_eq!(id.len(), 16);
/// assert_eq!(id, article_id("https://example.com/post"));
/// ```
pub fn article_id(url: &str) -> String {
    let digest = Sha256::digest(url.as_bytes());
    let mut hex = format!("{:x}", digest);
    hex.truncate(ID_HEX_LEN);
    hex
}
