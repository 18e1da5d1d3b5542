use chrono::{DateTime, Duration, Utc};
use std::collections::{BTreeMap, BTreeSet};
use std::convert::Infallible;
use std::fmt;
use std::str::FromStr;

use crate::feed::Article;
use crate::registry::FeedSource;

/// Length of the freshness window, in hours.
pub const FRESHNESS_WINDOW_HOURS: i64 = 24;

/// Which slice of the cache the presentation layer is showing.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub enum Tab {
    #[default]
    All,
    Saved,
    /// Articles of one registry source, by source id.
    Source(String),
}

impl FromStr for Tab {
    type Err = Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s {
            "all" => Tab::All,
            "saved" => Tab::Saved,
            other => Tab::Source(other.to_string()),
        })
    }
}

impl fmt::Display for Tab {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Tab::All => f.write_str("all"),
            Tab::Saved => f.write_str("saved"),
            Tab::Source(id) => f.write_str(id),
        }
    }
}

/// Badge counts for every tab.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct TabCounts {
    /// Fresh articles across all sources.
    pub all: usize,
    /// Size of the saved-id set.
    pub saved: usize,
    /// Fresh articles per registry source id.
    pub per_source: BTreeMap<String, usize>,
}

/// True when `article` was published within the window ending at `now`.
/// The boundary itself (exactly 24h old) still counts as fresh.
pub fn is_fresh(article: &Article, now: DateTime<Utc>) -> bool {
    article.published_at >= now - Duration::hours(FRESHNESS_WINDOW_HOURS)
}

/// Visible articles for `tab`, in the order of `articles`.
///
/// - [`Tab::Saved`]: exactly the articles whose id is in `saved_ids`,
///   regardless of age.
/// - [`Tab::All`]: fresh articles plus saved ones of any age.
/// - [`Tab::Source`]: as `All`, restricted to that source id.
///
/// `now` is supplied by the caller; this function never reads the clock.
pub fn filter<'a>(
    articles: &'a [Article],
    tab: &Tab,
    saved_ids: &BTreeSet<String>,
    now: DateTime<Utc>,
) -> Vec<&'a Article> {
    let is_saved = |a: &Article| saved_ids.contains(&a.id);

    articles
        .iter()
        .filter(|&a| match tab {
            Tab::Saved => is_saved(a),
            Tab::All => is_fresh(a, now) || is_saved(a),
            Tab::Source(id) => a.source == *id && (is_fresh(a, now) || is_saved(a)),
        })
        .collect()
}

/// Counts for the tab badges: `all` and each source count fresh articles
/// only; `saved` is the size of the saved set.
pub fn tab_counts(
    articles: &[Article],
    sources: &[FeedSource],
    saved_ids: &BTreeSet<String>,
    now: DateTime<Utc>,
) -> TabCounts {
    let mut per_source: BTreeMap<String, usize> =
        sources.iter().map(|s| (s.id.clone(), 0)).collect();
    let mut all = 0;

    for article in articles.iter().filter(|a| is_fresh(a, now)) {
        all += 1;
        if let Some(count) = per_source.get_mut(&article.source) {
            *count += 1;
        }
    }

    TabCounts {
        all,
        saved: saved_ids.len(),
        per_source,
    }
}
