//! Cache/fetch orchestration.
//!
//! [`Aggregator`] owns the in-memory state (articles, saved ids, per-source
//! status, last fetch time) and is the only writer of the persistent store.
//! A refresh cycle fetches every registered source concurrently; each source
//! is merged and persisted as soon as it settles, so a crash mid-cycle keeps
//! the sources that already finished.
//!
//! All mutation goes through one async mutex. Fetches run outside of it;
//! only the merge-and-persist step of each source takes the lock, which
//! serialises settling sources and overlapping cycles.

use chrono::{DateTime, Duration, Utc};
use futures::stream::{self, StreamExt};
use std::collections::{BTreeSet, HashMap};
use std::fmt;
use std::sync::Arc;
use tokio::sync::Mutex;

use crate::articles::{self, Tab, TabCounts};
use crate::clock::{Clock, SystemClock};
use crate::config::{Config, SetupError};
use crate::feed::{Article, ProxyFetcher, SourceError};
use crate::registry::{FeedSource, Registry};
use crate::storage::{cache, KeyValueStore, Snapshot};

/// Per-source fetch state. Not persisted.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum FetchStatus {
    #[default]
    Idle,
    Loading,
    Loaded,
    /// Message names the source and the final failure reason.
    Error(String),
}

impl FetchStatus {
    pub fn is_error(&self) -> bool {
        matches!(self, FetchStatus::Error(_))
    }

    pub fn message(&self) -> Option<&str> {
        match self {
            FetchStatus::Error(msg) => Some(msg),
            _ => None,
        }
    }
}

impl fmt::Display for FetchStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FetchStatus::Idle => f.write_str("idle"),
            FetchStatus::Loading => f.write_str("loading"),
            FetchStatus::Loaded => f.write_str("loaded"),
            FetchStatus::Error(_) => f.write_str("error"),
        }
    }
}

/// Result of [`Aggregator::refresh`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CycleOutcome {
    /// Cache was fresh and the cycle was not forced.
    Skipped,
    Completed(CycleReport),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CycleReport {
    pub loaded: usize,
    pub failed: usize,
    /// Articles accepted from all sources this cycle, before merge.
    pub fetched_articles: usize,
    /// The new last-fetch time.
    pub finished_at: DateTime<Utc>,
}

#[derive(Debug, Default)]
struct State {
    articles: Vec<Article>,
    saved_ids: BTreeSet<String>,
    active_tab: Tab,
    statuses: HashMap<String, FetchStatus>,
    last_fetch: Option<DateTime<Utc>>,
}

/// The feed aggregator: registry, fetcher, store and state in one place.
pub struct Aggregator<S: KeyValueStore> {
    store: S,
    fetcher: ProxyFetcher,
    registry: Registry,
    clock: Arc<dyn Clock>,
    refresh_interval: Duration,
    max_item_age: Option<Duration>,
    state: Mutex<State>,
}

impl<S: KeyValueStore> Aggregator<S> {
    /// Loads persisted state from `store` and returns a ready aggregator.
    ///
    /// Unreadable or corrupt stored values start empty (see
    /// [`crate::storage::cache`]). Each cached article's saved flag is
    /// reconciled with the stored saved-id set, which is authoritative.
    pub async fn open(
        store: S,
        fetcher: ProxyFetcher,
        registry: Registry,
        clock: Arc<dyn Clock>,
        config: &Config,
    ) -> Self {
        let snapshot = Snapshot::load(&store).await;

        let mut articles = articles::merge(&snapshot.articles, &[]);
        sync_saved_flags(&mut articles, &snapshot.saved_ids);

        let statuses = registry
            .sources()
            .iter()
            .map(|s| (s.id.clone(), FetchStatus::Idle))
            .collect();

        tracing::info!(
            sources = registry.len(),
            cached_articles = articles.len(),
            saved = snapshot.saved_ids.len(),
            "Aggregator opened"
        );

        Self {
            store,
            fetcher,
            registry,
            clock,
            refresh_interval: Duration::from_std(config.refresh_interval())
                .unwrap_or_else(|_| Duration::hours(24)),
            max_item_age: config.max_item_age(),
            state: Mutex::new(State {
                articles,
                saved_ids: snapshot.saved_ids,
                active_tab: Tab::All,
                statuses,
                last_fetch: snapshot.last_fetch,
            }),
        }
    }

    /// Wires everything from `config`: its registry, a proxy fetcher with a
    /// fresh HTTP client, and the system clock.
    pub async fn from_config(store: S, config: &Config) -> Result<Self, SetupError> {
        let registry = config.registry()?;
        let fetcher = ProxyFetcher::from_config(config)?;
        Ok(Self::open(store, fetcher, registry, Arc::new(SystemClock), config).await)
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// True when nothing was ever fetched, or the last fetch is older than
    /// the refresh interval.
    pub async fn is_refresh_due(&self) -> bool {
        let now = self.clock.now();
        let state = self.state.lock().await;
        match state.last_fetch {
            None => true,
            Some(last) => now - last > self.refresh_interval,
        }
    }

    /// Runs one fetch cycle over every registered source.
    ///
    /// Without `force`, returns [`CycleOutcome::Skipped`] when the cache is
    /// still fresh. Source failures are recorded as [`FetchStatus::Error`]
    /// and never abort the cycle; the last-fetch time is updated even when
    /// every source failed.
    pub async fn refresh(&self, force: bool) -> CycleOutcome {
        if !force && !self.is_refresh_due().await {
            tracing::debug!("Cache is fresh, skipping fetch");
            return CycleOutcome::Skipped;
        }

        let fetched_at = self.clock.now();
        {
            let mut state = self.state.lock().await;
            for source in self.registry.sources() {
                state
                    .statuses
                    .insert(source.id.clone(), FetchStatus::Loading);
            }
        }

        let concurrency = self.registry.len().max(1);
        let settled: Vec<Option<usize>> = stream::iter(self.registry.sources().to_vec())
            .map(|source| async move {
                let result = self.fetcher.fetch_articles(&source, fetched_at).await;
                self.settle(&source, result, fetched_at).await
            })
            .buffer_unordered(concurrency)
            .collect()
            .await;

        let finished_at = self.clock.now();
        {
            let mut state = self.state.lock().await;
            state.last_fetch = Some(finished_at);
            if let Err(e) = cache::store_last_fetch(&self.store, state.last_fetch).await {
                tracing::warn!(error = %e, "Failed to persist last fetch time");
            }
        }

        let report = CycleReport {
            loaded: settled.iter().filter(|s| s.is_some()).count(),
            failed: settled.iter().filter(|s| s.is_none()).count(),
            fetched_articles: settled.iter().flatten().sum(),
            finished_at,
        };
        tracing::info!(
            loaded = report.loaded,
            failed = report.failed,
            articles = report.fetched_articles,
            "Refresh cycle complete"
        );
        CycleOutcome::Completed(report)
    }

    /// Refresh regardless of cache age.
    pub async fn force_refresh(&self) -> CycleOutcome {
        self.refresh(true).await
    }

    /// Records one source's outcome, merging and persisting on success.
    /// Returns the number of accepted articles, or `None` on failure.
    async fn settle(
        &self,
        source: &FeedSource,
        result: Result<Vec<Article>, SourceError>,
        fetched_at: DateTime<Utc>,
    ) -> Option<usize> {
        let mut state = self.state.lock().await;

        let mut incoming = match result {
            Ok(incoming) => incoming,
            Err(e) => {
                tracing::warn!(source = %source.id, error = %e, "Feed refresh failed");
                state
                    .statuses
                    .insert(source.id.clone(), FetchStatus::Error(e.to_string()));
                return None;
            }
        };

        if let Some(max_age) = self.max_item_age {
            let cutoff = fetched_at - max_age;
            let before = incoming.len();
            incoming.retain(|a| a.published_at >= cutoff);
            if incoming.len() < before {
                tracing::debug!(
                    source = %source.id,
                    dropped = before - incoming.len(),
                    "Dropped items older than look-back window"
                );
            }
        }

        let count = incoming.len();
        let mut merged = articles::merge(&state.articles, &incoming);
        sync_saved_flags(&mut merged, &state.saved_ids);
        state.articles = merged;
        state
            .statuses
            .insert(source.id.clone(), FetchStatus::Loaded);
        tracing::info!(source = %source.id, articles = count, "Feed refreshed");

        if let Err(e) = cache::store_articles(&self.store, &state.articles).await {
            tracing::warn!(source = %source.id, error = %e, "Failed to persist article cache");
        }
        Some(count)
    }

    pub async fn set_active_tab(&self, tab: Tab) {
        if let Tab::Source(id) = &tab {
            if self.registry.get(id).is_none() {
                tracing::debug!(tab = %tab, "Active tab names an unregistered source");
            }
        }
        self.state.lock().await.active_tab = tab;
    }

    pub async fn active_tab(&self) -> Tab {
        self.state.lock().await.active_tab.clone()
    }

    /// Flips the saved state of `id`, persists it, and returns the new state.
    pub async fn toggle_saved(&self, id: &str) -> bool {
        let mut state = self.state.lock().await;

        let saved = if state.saved_ids.remove(id) {
            false
        } else {
            state.saved_ids.insert(id.to_string());
            true
        };
        for article in state.articles.iter_mut().filter(|a| a.id == id) {
            article.saved = saved;
        }

        if let Err(e) = cache::store_saved_ids(&self.store, &state.saved_ids).await {
            tracing::warn!(id = %id, error = %e, "Failed to persist saved ids");
        }
        if let Err(e) = cache::store_articles(&self.store, &state.articles).await {
            tracing::warn!(id = %id, error = %e, "Failed to persist article cache");
        }
        saved
    }

    /// Articles for the active tab at the current time.
    pub async fn visible_articles(&self) -> Vec<Article> {
        let now = self.clock.now();
        let state = self.state.lock().await;
        articles::filter(&state.articles, &state.active_tab, &state.saved_ids, now)
            .into_iter()
            .cloned()
            .collect()
    }

    /// Every cached article, newest first.
    pub async fn articles(&self) -> Vec<Article> {
        self.state.lock().await.articles.clone()
    }

    pub async fn saved_ids(&self) -> BTreeSet<String> {
        self.state.lock().await.saved_ids.clone()
    }

    /// Status of each source, in registry order.
    pub async fn statuses(&self) -> Vec<(String, FetchStatus)> {
        let state = self.state.lock().await;
        self.registry
            .sources()
            .iter()
            .map(|s| {
                let status = state.statuses.get(&s.id).cloned().unwrap_or_default();
                (s.id.clone(), status)
            })
            .collect()
    }

    pub async fn status(&self, source_id: &str) -> Option<FetchStatus> {
        self.state.lock().await.statuses.get(source_id).cloned()
    }

    pub async fn last_fetch(&self) -> Option<DateTime<Utc>> {
        self.state.lock().await.last_fetch
    }

    pub async fn tab_counts(&self) -> TabCounts {
        let now = self.clock.now();
        let state = self.state.lock().await;
        articles::tab_counts(&state.articles, self.registry.sources(), &state.saved_ids, now)
    }
}

fn sync_saved_flags(articles: &mut [Article], saved_ids: &BTreeSet<String>) {
    for article in articles {
        article.saved = saved_ids.contains(&article.id);
    }
}
