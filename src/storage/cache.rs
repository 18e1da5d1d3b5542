//! Persisted layout of the aggregator state.
//!
//! | key                  | value                                   |
//! |----------------------|-----------------------------------------|
//! | `scruper_cache`      | `{"articles": [Article, ...]}`          |
//! | `scruper_saved`      | `["<id>", ...]` (sorted)                |
//! | `scruper_last_fetch` | RFC 3339 timestamp, or `""` when never  |
//!
//! Loading never fails: a missing, unreadable or corrupt value is logged and
//! replaced by its empty default, so a damaged store degrades to a fresh
//! start instead of blocking the aggregator.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

use super::{KeyValueStore, StorageError};
use crate::feed::Article;

pub const CACHE_KEY: &str = "scruper_cache";
pub const SAVED_KEY: &str = "scruper_saved";
pub const LAST_FETCH_KEY: &str = "scruper_last_fetch";

#[derive(Serialize)]
struct CacheBlobRef<'a> {
    articles: &'a [Article],
}

#[derive(Deserialize)]
struct CacheBlob {
    #[serde(default)]
    articles: Vec<Article>,
}

/// Everything the aggregator persists.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Snapshot {
    pub articles: Vec<Article>,
    pub saved_ids: BTreeSet<String>,
    pub last_fetch: Option<DateTime<Utc>>,
}

impl Snapshot {
    /// Reads all three keys, degrading each one independently.
    pub async fn load<S: KeyValueStore>(store: &S) -> Self {
        let articles = read(store, CACHE_KEY, decode_articles).await.unwrap_or_default();
        let saved_ids = read(store, SAVED_KEY, decode_saved_ids).await.unwrap_or_default();
        let last_fetch = read(store, LAST_FETCH_KEY, decode_last_fetch).await.flatten();

        tracing::debug!(
            articles = articles.len(),
            saved = saved_ids.len(),
            last_fetch = ?last_fetch,
            "Loaded cached state"
        );

        Self {
            articles,
            saved_ids,
            last_fetch,
        }
    }
}

async fn read<S, T, E>(store: &S, key: &str, decode: fn(&str) -> Result<T, E>) -> Option<T>
where
    S: KeyValueStore,
    E: std::fmt::Display,
{
    let raw = match store.get(key).await {
        Ok(Some(raw)) => raw,
        Ok(None) => return None,
        Err(e) => {
            tracing::warn!(key = key, error = %e, "Failed to read from store, starting empty");
            return None;
        }
    };

    match decode(&raw) {
        Ok(value) => Some(value),
        Err(e) => {
            tracing::warn!(key = key, error = %e, "Corrupt value in store, starting empty");
            None
        }
    }
}

pub fn encode_articles(articles: &[Article]) -> Result<String, StorageError> {
    Ok(serde_json::to_string(&CacheBlobRef { articles })?)
}

pub fn decode_articles(raw: &str) -> Result<Vec<Article>, serde_json::Error> {
    serde_json::from_str::<CacheBlob>(raw).map(|blob| blob.articles)
}

pub fn encode_saved_ids(ids: &BTreeSet<String>) -> Result<String, StorageError> {
    Ok(serde_json::to_string(ids)?)
}

pub fn decode_saved_ids(raw: &str) -> Result<BTreeSet<String>, serde_json::Error> {
    serde_json::from_str(raw)
}

pub fn encode_last_fetch(at: Option<DateTime<Utc>>) -> String {
    at.map(|t| t.to_rfc3339()).unwrap_or_default()
}

pub fn decode_last_fetch(raw: &str) -> Result<Option<DateTime<Utc>>, chrono::ParseError> {
    let raw = raw.trim();
    if raw.is_empty() {
        return Ok(None);
    }
    DateTime::parse_from_rfc3339(raw).map(|t| Some(t.with_timezone(&Utc)))
}

pub async fn store_articles<S: KeyValueStore>(
    store: &S,
    articles: &[Article],
) -> Result<(), StorageError> {
    store.set(CACHE_KEY, &encode_articles(articles)?).await
}

pub async fn store_saved_ids<S: KeyValueStore>(
    store: &S,
    ids: &BTreeSet<String>,
) -> Result<(), StorageError> {
    store.set(SAVED_KEY, &encode_saved_ids(ids)?).await
}

pub async fn store_last_fetch<S: KeyValueStore>(
    store: &S,
    at: Option<DateTime<Utc>>,
) -> Result<(), StorageError> {
    store.set(LAST_FETCH_KEY, &encode_last_fetch(at)).await
}
