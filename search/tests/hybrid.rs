use async_trait::async_trait;
use axum::extract::Query;
use axum::http::StatusCode;
use axum::routing::get;
use axum::{Json, Router};
use hybrid_search::{
    Filters, GoogleConfig, HealthState, ProviderPage, SearchConfig, SearchError, SearchManager, SearchMode, SearchProvider, SerpApiConfig,
};
use search_core::{Document, InvertedIndex, SearchResult, Source};
use serde_json::{json, Value};
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

fn index() -> Arc<InvertedIndex> {
    let index = Arc::new(InvertedIndex::in_memory());
    index.upsert(Document::new("https://rust-lang.org/learn", "Learn Rust", "learn rust with the book")).unwrap();
    index.upsert(Document::new("https://local.test/rust", "Local Rust", "rust notes and rust links")).unwrap();
    index.upsert(Document::new("https://local.test/go", "Go", "go notes")).unwrap();
    index
}

/// SerpAPI stand-in: 25 results for any query, 10 per `start` page.
async fn serpapi_mock(Query(params): Query<HashMap<String, String>>) -> (StatusCode, Json<Value>) {
    if params.get("api_key").map(String::as_str) != Some("serp-key") {
        return (StatusCode::UNAUTHORIZED, Json(json!({"error": "Invalid API key."})));
    }
    assert_eq!(params.get("engine").map(String::as_str), Some("duckduckgo"));
    let start: usize = params.get("start").and_then(|s| s.parse().ok()).unwrap_or(0);
    let end = (start + 10).min(25);
    let mut items: Vec<Value> = (start..end)
        .map(|i| json!({"position": i + 1, "title": format!("Serp {i}"), "link": format!("https://serp.test/{i}"), "snippet": "from serp"}))
        .collect();
    if start == 0 {
        // same page as the local document, dressed differently
        items[0] = json!({"position": 1, "title": "Learn", "link": "https://Rust-Lang.org/learn/?utm_source=ddg", "snippet": "dup"});
    }
    let pagination = if end < 25 { json!({"next": "https://serpapi.com/next"}) } else { json!({}) };
    (StatusCode::OK, Json(json!({"organic_results": items, "serpapi_pagination": pagination})))
}

/// Google CSE stand-in: quota exhausted.
async fn google_quota() -> (StatusCode, Json<Value>) {
    (StatusCode::TOO_MANY_REQUESTS, Json(json!({"error": {"code": 429, "message": "Quota exceeded"}})))
}

async fn serve(app: Router) -> SocketAddr {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    addr
}

async fn mock_providers() -> SocketAddr {
    let app = Router::new().route("/search.json", get(serpapi_mock)).route("/customsearch/v1", get(google_quota));
    serve(app).await
}

fn config_for(addr: SocketAddr) -> SearchConfig {
    let mut serpapi = SerpApiConfig::new("serp-key");
    serpapi.base_url = format!("http://{addr}");
    let mut google = GoogleConfig::new("g-key", "cx-id");
    google.base_url = format!("http://{addr}");
    SearchConfig { serpapi: Some(serpapi), google: Some(google), ..Default::default() }
}

#[tokio::test]
async fn serpapi_mode_paginates_and_positions() {
    let addr = mock_providers().await;
    let manager = SearchManager::new(config_for(addr), index()).unwrap();

    let resp = manager.search("rust", Some(SearchMode::Serpapi), 20, &Filters::default()).await.unwrap();

    assert_eq!(resp.results.len(), 20);
    assert!(resp.results.iter().all(|r| r.source == Source::Serpapi));
    assert_eq!(resp.results.iter().map(|r| r.position).collect::<Vec<_>>(), (1..=20).collect::<Vec<_>>());
    assert_eq!(resp.metadata.api_count, 20);
    assert_eq!(resp.metadata.local_count, 0);
    assert!(resp.metadata.errors.is_empty());
}

#[tokio::test]
async fn hybrid_merges_and_local_wins_duplicates() {
    let addr = mock_providers().await;
    let manager = SearchManager::new(config_for(addr), index()).unwrap();

    let resp = manager.search("rust", None, 10, &Filters::default()).await.unwrap();
    let meta = &resp.metadata;

    assert_eq!(meta.mode, Some(SearchMode::Hybrid));
    assert_eq!(meta.local_count, 2);
    assert_eq!(meta.api_count, 10);
    assert_eq!(meta.source_counts.get(&Source::Google), Some(&0));
    assert!(meta.errors.get(&Source::Google).unwrap().contains("quota"));
    assert_eq!(resp.results.len(), 10);

    let learn: Vec<&SearchResult> = resp.results.iter().filter(|r| r.url.to_lowercase().contains("rust-lang.org/learn")).collect();
    assert_eq!(learn.len(), 1);
    assert_eq!(learn[0].source, Source::Local);
    assert_eq!(resp.results[0].source, Source::Local);

    // a failed source keeps the result set out of the cache
    let again = manager.search("rust", None, 10, &Filters::default()).await.unwrap();
    assert!(!again.metadata.cache_hit);
}

#[tokio::test]
async fn source_filter_limits_fan_out() {
    let addr = mock_providers().await;
    let manager = SearchManager::new(config_for(addr), index()).unwrap();
    let filters = Filters { sources: Some([Source::Local, Source::Serpapi].into()), ..Default::default() };

    let first = manager.search("rust", None, 5, &filters).await.unwrap();
    assert!(first.metadata.errors.is_empty());
    assert!(!first.metadata.source_counts.contains_key(&Source::Google));

    let second = manager.search("rust", None, 5, &filters).await.unwrap();
    assert!(second.metadata.cache_hit);
    assert_eq!(first.results, second.results);
}

#[tokio::test]
async fn bad_key_is_a_provider_error() {
    let addr = mock_providers().await;
    let mut config = config_for(addr);
    config.google = None;
    if let Some(serpapi) = config.serpapi.as_mut() {
        serpapi.api_key = "wrong".into();
    }
    let manager = SearchManager::new(config, index()).unwrap();

    let resp = manager.search("rust", Some(SearchMode::Serpapi), 10, &Filters::default()).await.unwrap();
    assert!(resp.results.is_empty());
    assert_eq!(resp.metadata.errors.get(&Source::Serpapi).map(String::as_str), Some("serpapi error: Invalid API key."));
    assert_eq!(manager.stats().provider_failures.get(&Source::Serpapi), Some(&1));
}

/// Provider that sleeps past any reasonable timeout.
struct Stalled;

#[async_trait]
impl SearchProvider for Stalled {
    fn source(&self) -> Source { Source::Google }

    async fn search_page(&self, _query: &str, _filters: &Filters, _page_size: usize, _offset: usize) -> Result<ProviderPage, SearchError> {
        tokio::time::sleep(Duration::from_secs(30)).await;
        Ok(ProviderPage::default())
    }
}

#[tokio::test]
async fn hybrid_survives_provider_timeout() {
    let config = SearchConfig { source_timeout: Duration::from_millis(100), ..Default::default() };
    let manager = SearchManager::with_providers(config, index(), vec![Arc::new(Stalled)]).unwrap();

    let started = std::time::Instant::now();
    let resp = manager.search("rust", None, 10, &Filters::default()).await.unwrap();

    assert!(started.elapsed() < Duration::from_secs(5));
    assert_eq!(resp.metadata.api_count, 0);
    assert_eq!(resp.metadata.local_count, 2);
    assert_eq!(resp.results.len(), 2);
    assert!(resp.results.iter().all(|r| r.source == Source::Local));
    assert_eq!(resp.metadata.errors.get(&Source::Google).map(String::as_str), Some("google timed out"));
}

/// Fails until told otherwise; counts calls.
struct Flaky {
    calls: AtomicUsize,
    healthy_after: usize,
}

#[async_trait]
impl SearchProvider for Flaky {
    fn source(&self) -> Source { Source::Serpapi }

    async fn search_page(&self, _query: &str, _filters: &Filters, _page_size: usize, offset: usize) -> Result<ProviderPage, SearchError> {
        let n = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        if n <= self.healthy_after {
            return Err(SearchError::Http("connection refused".into()));
        }
        let hit = SearchResult {
            title: "Back".into(),
            url: "https://back.test/".into(),
            snippet: String::new(),
            score: 0.0,
            source: Source::Serpapi,
            position: offset + 1,
        };
        Ok(ProviderPage::complete(vec![hit], false))
    }
}

#[tokio::test]
async fn demoted_provider_is_skipped_then_recovers() {
    let provider = Arc::new(Flaky { calls: AtomicUsize::new(0), healthy_after: 3 });
    let config = SearchConfig { cooldown: Duration::from_millis(200), cache_ttl: Duration::ZERO, ..Default::default() };
    let manager = SearchManager::with_providers(config, index(), vec![provider.clone()]).unwrap();

    for _ in 0..3 {
        manager.search("rust", None, 10, &Filters::default()).await.unwrap();
    }
    assert_eq!(provider.calls.load(Ordering::SeqCst), 3);
    assert_eq!(manager.stats().providers[0].state, HealthState::Demoted);

    // skipped while cooling down
    let skipped = manager.search("rust", None, 10, &Filters::default()).await.unwrap();
    assert_eq!(provider.calls.load(Ordering::SeqCst), 3);
    assert!(skipped.metadata.errors.contains_key(&Source::Serpapi));
    assert_eq!(skipped.metadata.local_count, 2);

    tokio::time::sleep(Duration::from_millis(250)).await;
    let probed = manager.search("rust", None, 10, &Filters::default()).await.unwrap();
    assert_eq!(provider.calls.load(Ordering::SeqCst), 4);
    assert_eq!(probed.metadata.api_count, 1);
    assert_eq!(manager.stats().providers[0].state, HealthState::Healthy);
}

#[tokio::test]
async fn set_mode_validates_against_configured_providers() {
    let manager = SearchManager::with_providers(SearchConfig::default(), index(), vec![Arc::new(Stalled)]).unwrap();
    assert!(manager.set_mode(SearchMode::Google).is_ok());
    assert_eq!(manager.mode(), SearchMode::Google);
    assert_eq!(manager.set_mode(SearchMode::Serpapi), Err(SearchError::SourceUnavailable(Source::Serpapi)));
    assert_eq!(manager.mode(), SearchMode::Google);
    assert!(matches!("yahoo".parse::<SearchMode>(), Err(SearchError::InvalidMode(_))));
    assert_eq!(manager.stats().current_mode, SearchMode::Google);
}
