//! End-to-end refresh cycles against mocked proxies.
//!
//! Both intermediaries are served by one wiremock server (`/a` JSON
//! envelope, `/b` raw body) and matched on the encoded feed URL, so each
//! test decides per source which proxy succeeds.

use chrono::{DateTime, Duration, TimeZone, Utc};
use pretty_assertions::assert_eq;
use std::sync::Arc;
use std::time::Duration as StdDuration;
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

use scruper::feed::{Envelope, ProxyConfig, ProxyFetcher};
use scruper::storage::{cache, KeyValueStore};
use scruper::{
    spawn_refresh_loop, Aggregator, Config, CycleOutcome, FeedSource, FetchStatus, ManualClock,
    MemoryStore, Registry, SqliteStore, Tab,
};

const ALPHA_URL: &str = "https://alpha.example.com/feed";
const BETA_URL: &str = "https://beta.example.com/rss.xml";

fn now() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 2, 21, 12, 0, 0).unwrap()
}

fn registry() -> Registry {
    let source = |id: &str, label: &str, url: &str| FeedSource {
        id: id.into(),
        label: label.into(),
        url: url.into(),
        color: "#000000".into(),
        icon: "*".into(),
        description: String::new(),
    };
    Registry::new(vec![
        source("alpha", "Alpha Weekly", ALPHA_URL),
        source("beta", "Beta Daily", BETA_URL),
    ])
    .unwrap()
}

fn fetcher(server: &MockServer) -> ProxyFetcher {
    ProxyFetcher::new(
        reqwest::Client::new(),
        ProxyConfig::new(format!("{}/a?url=", server.uri()), Envelope::JsonContents),
        ProxyConfig::new(format!("{}/b?url=", server.uri()), Envelope::Raw),
        StdDuration::from_secs(5),
        1024 * 1024,
    )
}

async fn open<S: KeyValueStore>(
    store: S,
    server: &MockServer,
    clock: &Arc<ManualClock>,
    config: &Config,
) -> Aggregator<S> {
    Aggregator::open(store, fetcher(server), registry(), clock.clone(), config).await
}

/// RSS document with `(title, link, hours before now)` items. An empty title
/// omits the `<title>` element.
fn rss(items: &[(&str, &str, i64)]) -> String {
    let body: String = items
        .iter()
        .map(|(title, link, hours)| {
            let title = if title.is_empty() {
                String::new()
            } else {
                format!("<title>{title}</title>")
            };
            let date = (now() - Duration::hours(*hours)).to_rfc2822();
            format!("<item>{title}<link>{link}</link><pubDate>{date}</pubDate></item>")
        })
        .collect();
    format!(r#"<?xml version="1.0"?><rss version="2.0"><channel>{body}</channel></rss>"#)
}

async fn mount(server: &MockServer, proxy: &str, feed_url: &str, response: ResponseTemplate) {
    Mock::given(method("GET"))
        .and(path(proxy))
        .and(query_param("url", feed_url))
        .respond_with(response)
        .mount(server)
        .await;
}

fn json_envelope(xml: &str) -> ResponseTemplate {
    ResponseTemplate::new(200).set_body_json(serde_json::json!({
        "contents": xml,
        "status": { "http_code": 200 }
    }))
}

fn raw(xml: &str) -> ResponseTemplate {
    ResponseTemplate::new(200).set_body_string(xml.to_string())
}

fn titles(articles: &[scruper::Article]) -> Vec<String> {
    articles.iter().map(|a| a.title.clone()).collect()
}

fn completed(outcome: CycleOutcome) -> scruper::CycleReport {
    match outcome {
        CycleOutcome::Completed(report) => report,
        CycleOutcome::Skipped => panic!("Expected a completed cycle"),
    }
}

#[tokio::test]
async fn test_primary_failure_falls_back_without_error() {
    let server = MockServer::start().await;
    mount(&server, "/a", ALPHA_URL, ResponseTemplate::new(500)).await;
    mount(
        &server,
        "/b",
        ALPHA_URL,
        raw(&rss(&[("Alpha one", "https://alpha.example.com/1", 1), ("", "https://alpha.example.com/untitled", 2)])),
    )
    .await;
    mount(
        &server,
        "/a",
        BETA_URL,
        json_envelope(&rss(&[("Beta one", "https://beta.example.com/1", 3)])),
    )
    .await;

    let clock = Arc::new(ManualClock::new(now()));
    let agg = open(MemoryStore::new(), &server, &clock, &Config::default()).await;
    let report = completed(agg.refresh(false).await);

    assert_eq!(report.loaded, 2);
    assert_eq!(report.failed, 0);
    assert_eq!(report.fetched_articles, 2);
    assert_eq!(
        agg.statuses().await,
        vec![
            ("alpha".to_string(), FetchStatus::Loaded),
            ("beta".to_string(), FetchStatus::Loaded),
        ]
    );
    assert_eq!(titles(&agg.visible_articles().await), vec!["Alpha one", "Beta one"]);
}

#[tokio::test]
async fn test_both_proxies_failing_isolates_the_source() {
    let server = MockServer::start().await;
    mount(&server, "/a", ALPHA_URL, ResponseTemplate::new(500)).await;
    mount(&server, "/b", ALPHA_URL, ResponseTemplate::new(502)).await;
    mount(
        &server,
        "/a",
        BETA_URL,
        json_envelope(&rss(&[("Beta one", "https://beta.example.com/1", 1)])),
    )
    .await;

    let clock = Arc::new(ManualClock::new(now()));
    let agg = open(MemoryStore::new(), &server, &clock, &Config::default()).await;
    let report = completed(agg.refresh(false).await);
    assert_eq!((report.loaded, report.failed), (1, 1));

    let alpha = agg.status("alpha").await.unwrap();
    assert!(alpha.is_error());
    assert!(alpha.message().unwrap().contains("Alpha Weekly"), "{alpha:?}");
    assert_eq!(agg.status("beta").await, Some(FetchStatus::Loaded));
    assert_eq!(titles(&agg.visible_articles().await), vec!["Beta one"]);
}

#[tokio::test]
async fn test_parse_failure_is_a_source_error() {
    let server = MockServer::start().await;
    mount(&server, "/a", ALPHA_URL, json_envelope("<html><body>Blocked<br></body></html>")).await;
    mount(
        &server,
        "/a",
        BETA_URL,
        json_envelope(&rss(&[("Beta one", "https://beta.example.com/1", 1)])),
    )
    .await;

    let clock = Arc::new(ManualClock::new(now()));
    let agg = open(MemoryStore::new(), &server, &clock, &Config::default()).await;
    completed(agg.refresh(false).await);

    let alpha = agg.status("alpha").await.unwrap();
    assert!(alpha.message().unwrap().contains("Alpha Weekly"));
    assert_eq!(agg.status("beta").await, Some(FetchStatus::Loaded));
}

#[tokio::test]
async fn test_all_sources_failing_still_records_the_attempt() {
    // Nothing mounted: every proxy request gets wiremock's 404.
    let server = MockServer::start().await;
    let clock = Arc::new(ManualClock::new(now()));
    let store = MemoryStore::new();

    let agg = open(store.clone(), &server, &clock, &Config::default()).await;
    let report = completed(agg.refresh(false).await);
    assert_eq!((report.loaded, report.failed), (0, 2));
    assert_eq!(agg.last_fetch().await, Some(now()));
    assert!(agg.statuses().await.iter().all(|(_, s)| s.is_error()));

    // The attempt counts: a reopened aggregator sees a fresh cache.
    let reopened = open(store, &server, &clock, &Config::default()).await;
    assert_eq!(reopened.last_fetch().await, Some(now()));
    assert_eq!(reopened.refresh(false).await, CycleOutcome::Skipped);

    clock.advance(Duration::hours(24) + Duration::seconds(1));
    assert!(reopened.is_refresh_due().await);
}

#[tokio::test]
async fn test_saved_state_survives_refetch_and_aging() {
    let server = MockServer::start().await;
    let feed = rss(&[
        ("Keep me", "https://alpha.example.com/keep", 2),
        ("Let me go", "https://alpha.example.com/go", 3),
    ]);
    mount(&server, "/a", ALPHA_URL, json_envelope(&feed)).await;
    mount(&server, "/a", BETA_URL, json_envelope(&rss(&[]))).await;

    let clock = Arc::new(ManualClock::new(now()));
    let store = MemoryStore::new();
    let agg = open(store.clone(), &server, &clock, &Config::default()).await;
    completed(agg.refresh(false).await);

    let keep = agg.articles().await[0].clone();
    assert_eq!(keep.title, "Keep me");
    assert!(agg.toggle_saved(&keep.id).await);

    // Same items again: nothing duplicated, saved flag carried forward.
    completed(agg.force_refresh().await);
    let articles = agg.articles().await;
    assert_eq!(titles(&articles), vec!["Keep me", "Let me go"]);
    assert!(articles[0].saved);
    assert!(!articles[1].saved);

    // Two days later only the saved article is still visible.
    clock.advance(Duration::days(2));
    assert_eq!(titles(&agg.visible_articles().await), vec!["Keep me"]);
    agg.set_active_tab(Tab::Source("beta".into())).await;
    assert!(agg.visible_articles().await.is_empty());
    agg.set_active_tab(Tab::Saved).await;
    assert_eq!(titles(&agg.visible_articles().await), vec!["Keep me"]);

    let counts = agg.tab_counts().await;
    assert_eq!((counts.all, counts.saved), (0, 1));

    // Persisted: a new process sees the same cache and saved set.
    let reopened = open(store, &server, &clock, &Config::default()).await;
    assert_eq!(reopened.articles().await, agg.articles().await);
    assert!(reopened.saved_ids().await.contains(&keep.id));
}

#[tokio::test]
async fn test_look_back_window_drops_old_items() {
    let server = MockServer::start().await;
    mount(
        &server,
        "/a",
        ALPHA_URL,
        json_envelope(&rss(&[
            ("Recent", "https://alpha.example.com/recent", 5),
            ("Archive", "https://alpha.example.com/archive", 24 * 30),
        ])),
    )
    .await;
    mount(&server, "/a", BETA_URL, json_envelope(&rss(&[]))).await;

    let config = Config::parse("max_item_age_hours = 48").unwrap();
    let clock = Arc::new(ManualClock::new(now()));
    let agg = open(MemoryStore::new(), &server, &clock, &config).await;
    let report = completed(agg.refresh(false).await);

    assert_eq!(report.fetched_articles, 1);
    assert_eq!(titles(&agg.articles().await), vec!["Recent"]);
}

#[tokio::test]
async fn test_corrupt_store_starts_empty_and_recovers() {
    let server = MockServer::start().await;
    mount(
        &server,
        "/a",
        ALPHA_URL,
        json_envelope(&rss(&[("Alpha one", "https://alpha.example.com/1", 1)])),
    )
    .await;
    mount(&server, "/a", BETA_URL, json_envelope(&rss(&[]))).await;

    let store = MemoryStore::new();
    store.set(cache::CACHE_KEY, "\u{0}garbage").await.unwrap();
    store.set(cache::SAVED_KEY, "{\"not\": \"a list\"}").await.unwrap();
    store.set(cache::LAST_FETCH_KEY, "soon").await.unwrap();

    let clock = Arc::new(ManualClock::new(now()));
    let agg = open(store.clone(), &server, &clock, &Config::default()).await;
    assert!(agg.articles().await.is_empty());
    assert!(agg.saved_ids().await.is_empty());
    assert!(agg.is_refresh_due().await);

    completed(agg.refresh(false).await);
    let snapshot = scruper::storage::Snapshot::load(&store).await;
    assert_eq!(titles(&snapshot.articles), vec!["Alpha one"]);
    assert_eq!(snapshot.last_fetch, Some(now()));
}

#[tokio::test]
async fn test_sqlite_store_round_trip() {
    let server = MockServer::start().await;
    mount(
        &server,
        "/a",
        ALPHA_URL,
        json_envelope(&rss(&[("Persisted", "https://alpha.example.com/p", 1)])),
    )
    .await;
    mount(&server, "/a", BETA_URL, json_envelope(&rss(&[]))).await;

    let dir = std::env::temp_dir().join(format!("scruper_sqlite_test_{}", std::process::id()));
    std::fs::create_dir_all(&dir).unwrap();
    let db_path = dir.join("state.db");
    let db_path = db_path.to_str().unwrap();

    let clock = Arc::new(ManualClock::new(now()));
    {
        let store = SqliteStore::open(db_path).await.unwrap();
        let agg = open(store, &server, &clock, &Config::default()).await;
        completed(agg.refresh(false).await);
        let id = agg.articles().await[0].id.clone();
        agg.toggle_saved(&id).await;
    }

    let store = SqliteStore::open(db_path).await.unwrap();
    let agg = open(store, &server, &clock, &Config::default()).await;
    let articles = agg.articles().await;
    assert_eq!(titles(&articles), vec!["Persisted"]);
    assert!(articles[0].saved);
    assert_eq!(agg.last_fetch().await, Some(now()));
    assert_eq!(agg.refresh(false).await, CycleOutcome::Skipped);

    std::fs::remove_dir_all(&dir).ok();
}

#[tokio::test]
async fn test_refresh_loop_runs_until_shutdown() {
    let server = MockServer::start().await;
    mount(
        &server,
        "/a",
        ALPHA_URL,
        json_envelope(&rss(&[("Alpha one", "https://alpha.example.com/1", 1)])),
    )
    .await;
    mount(&server, "/a", BETA_URL, json_envelope(&rss(&[]))).await;

    let clock = Arc::new(ManualClock::new(now()));
    let agg = Arc::new(open(MemoryStore::new(), &server, &clock, &Config::default()).await);

    let handle = spawn_refresh_loop(agg.clone(), StdDuration::from_millis(150));
    tokio::time::sleep(StdDuration::from_millis(500)).await;
    handle.shutdown().await;

    let requests = server.received_requests().await.unwrap().len();
    // Startup cycle plus at least one periodic cycle, two sources each.
    assert!(requests >= 4, "only {requests} proxy requests");
    assert_eq!(agg.last_fetch().await, Some(now()));
    assert_eq!(titles(&agg.articles().await), vec!["Alpha one"]);

    tokio::time::sleep(StdDuration::from_millis(300)).await;
    assert_eq!(server.received_requests().await.unwrap().len(), requests);
}
