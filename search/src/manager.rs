//! Search manager: mode state, fan-out, blending, caching and statistics.

use crate::blend::blend;
use crate::cache::{CacheKey, ResultCache};
use crate::config::SearchConfig;
use crate::error::SearchError;
use crate::health::ProviderHealth;
use crate::provider::{build_client, SearchProvider};
use crate::providers::{GoogleClient, SerpApiClient};
use crate::searcher::{ExternalSearcher, LocalSearcher, Searcher};
use crate::types::{Filters, SearchMetadata, SearchMode, SearchResponse, StatsSnapshot};
use parking_lot::{Mutex, RwLock};
use search_core::{InvertedIndex, Ranker, SearchResult, Source};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use time::format_description::well_known::Rfc3339;

#[derive(Debug, Default)]
struct Counters {
    total: u64,
    by_mode: BTreeMap<SearchMode, u64>,
    cache_hits: u64,
    cache_misses: u64,
    provider_failures: BTreeMap<Source, u64>,
    elapsed: Duration,
}

type Outcome = (Source, Result<Vec<SearchResult>, SearchError>);

pub struct SearchManager {
    config: SearchConfig,
    searchers: Vec<Searcher>,
    mode: RwLock<SearchMode>,
    cache: ResultCache,
    health: ProviderHealth,
    counters: Mutex<Counters>,
}

impl SearchManager {
    /// Local searcher plus one external searcher per configured provider.
    pub fn new(config: SearchConfig, index: Arc<InvertedIndex>) -> Result<Self, SearchError> {
        config.validate()?;
        let client = build_client(config.source_timeout, &config.user_agent)?;
        let mut providers: Vec<Arc<dyn SearchProvider>> = Vec::new();
        if let Some(serpapi) = &config.serpapi {
            providers.push(Arc::new(SerpApiClient::new(client.clone(), serpapi.clone(), config.safe_search)));
        }
        if let Some(google) = &config.google {
            providers.push(Arc::new(GoogleClient::new(client, google.clone(), config.safe_search)));
        }
        Self::with_providers(config, index, providers)
    }

    pub fn with_providers(config: SearchConfig, index: Arc<InvertedIndex>, providers: Vec<Arc<dyn SearchProvider>>) -> Result<Self, SearchError> {
        config.validate()?;
        let mut searchers = vec![Searcher::Local(LocalSearcher::new(Ranker::new(index), config.source_timeout))];
        for provider in providers {
            if searchers.iter().any(|s| s.source() == provider.source()) {
                return Err(SearchError::Config(format!("{} configured twice", provider.source())));
            }
            searchers.push(Searcher::External(ExternalSearcher::new(provider, config.page_size, config.source_timeout)));
        }

        if let Some(source) = config.default_mode.single_source() {
            if !searchers.iter().any(|s| s.source() == source) {
                return Err(SearchError::SourceUnavailable(source));
            }
        }

        let manager = Self {
            mode: RwLock::new(config.default_mode),
            cache: ResultCache::new(config.cache_ttl, config.cache_capacity),
            health: ProviderHealth::new(config.failure_threshold, config.cooldown),
            counters: Mutex::new(Counters::default()),
            searchers,
            config,
        };
        tracing::info!(
            mode = %manager.mode(),
            sources = ?manager.sources(),
            cache = manager.cache.is_enabled(),
            "search manager ready"
        );
        Ok(manager)
    }

    pub fn mode(&self) -> SearchMode { *self.mode.read() }

    /// Sources with a searcher, local first.
    pub fn sources(&self) -> Vec<Source> { self.searchers.iter().map(Searcher::source).collect() }

    pub fn is_available(&self, mode: SearchMode) -> bool {
        match mode.single_source() {
            Some(source) => self.searcher(source).is_some(),
            None => true,
        }
    }

    pub fn set_mode(&self, mode: SearchMode) -> Result<(), SearchError> {
        if let Some(source) = mode.single_source() {
            if self.searcher(source).is_none() {
                return Err(SearchError::SourceUnavailable(source));
            }
        }
        let previous = std::mem::replace(&mut *self.mode.write(), mode);
        if previous != mode {
            tracing::info!(from = %previous, to = %mode, "search mode changed");
        }
        Ok(())
    }

    /// Drop every cached result set, e.g. after the local index changed.
    pub fn clear_cache(&self) { self.cache.invalidate_all(); }

    fn searcher(&self, source: Source) -> Option<&Searcher> {
        self.searchers.iter().find(|s| s.source() == source)
    }

    /// Run `query` in `mode` (the current mode when `None`).
    ///
    /// Source failures never fail the call; they are reported in
    /// `metadata.errors` and keep the result set out of the cache.
    pub async fn search(&self, query: &str, mode: Option<SearchMode>, max_results: usize, filters: &Filters) -> Result<SearchResponse, SearchError> {
        if max_results == 0 {
            return Err(SearchError::Config("max_results must be greater than 0".into()));
        }
        let mode = mode.unwrap_or_else(|| self.mode());
        if let Some(source) = mode.single_source() {
            if self.searcher(source).is_none() {
                return Err(SearchError::SourceUnavailable(source));
            }
        }
        let started = Instant::now();
        tracing::debug!(query, %mode, max_results, "search");

        let query = query.trim();
        if query.is_empty() {
            return Ok(SearchResponse { results: Vec::new(), metadata: self.metadata(mode, &[], 0, started, false) });
        }

        let key = CacheKey::new(query, mode, max_results, filters);
        if let Some(mut cached) = self.cache.get(&key).await {
            cached.metadata.cache_hit = true;
            cached.metadata.elapsed_ms = started.elapsed().as_millis() as u64;
            cached.metadata.timestamp = now_rfc3339();
            self.record(mode, Some(true), &cached.metadata, started.elapsed());
            tracing::debug!(%mode, results = cached.results.len(), "cache hit");
            return Ok(cached);
        }

        let (outcomes, results) = match mode.single_source() {
            Some(source) => self.search_single(source, query, max_results, filters).await,
            None => self.search_hybrid(query, max_results, filters).await,
        };

        let metadata = self.metadata(mode, &outcomes, results.len(), started, false);
        let response = SearchResponse { results, metadata };
        if response.metadata.errors.is_empty() {
            self.cache.insert(key, response.clone()).await;
        }
        let cache_state = self.cache.is_enabled().then_some(false);
        self.record(mode, cache_state, &response.metadata, started.elapsed());
        Ok(response)
    }

    async fn search_single(&self, source: Source, query: &str, max_results: usize, filters: &Filters) -> (Vec<Outcome>, Vec<SearchResult>) {
        let Some(searcher) = self.searcher(source) else {
            return (vec![(source, Err(SearchError::SourceUnavailable(source)))], Vec::new());
        };
        let outcome = searcher.search(query, max_results, filters).await;
        self.observe(source, &outcome);
        let results = match &outcome {
            Ok(hits) if source == Source::Local => hits.clone(),
            // provider order becomes the score, duplicates collapse
            Ok(hits) => blend(Vec::new(), vec![hits.clone()], max_results, self.config.local_boost, 1.0),
            Err(_) => Vec::new(),
        };
        (vec![(source, outcome)], results)
    }

    async fn search_hybrid(&self, query: &str, max_results: usize, filters: &Filters) -> (Vec<Outcome>, Vec<SearchResult>) {
        let mut outcomes: Vec<Outcome> = Vec::new();
        let mut calls = Vec::new();
        for searcher in self.searchers.iter().filter(|s| filters.allows(s.source())) {
            let source = searcher.source();
            if source.is_external() && !self.health.should_attempt(source) {
                tracing::debug!(%source, "skipping demoted provider");
                outcomes.push((source, Err(SearchError::Provider { provider: source, message: "demoted after repeated failures".into() })));
                continue;
            }
            calls.push(async move { (source, searcher.search(query, max_results, filters).await) });
        }

        let mut local = Vec::new();
        let mut external = Vec::new();
        for (source, outcome) in futures::future::join_all(calls).await {
            self.observe(source, &outcome);
            match &outcome {
                Ok(hits) if source == Source::Local => local = hits.clone(),
                Ok(hits) => external.push(hits.clone()),
                Err(_) => {}
            }
            outcomes.push((source, outcome));
        }

        let results = blend(local, external, max_results, self.config.local_boost, self.config.external_boost);
        (outcomes, results)
    }

    fn observe(&self, source: Source, outcome: &Result<Vec<SearchResult>, SearchError>) {
        match outcome {
            Ok(hits) => {
                if source.is_external() {
                    self.health.record_success(source);
                }
                tracing::debug!(%source, count = hits.len(), "source returned results");
            }
            Err(err) => {
                if source.is_external() {
                    self.health.record_failure(source);
                }
                *self.counters.lock().provider_failures.entry(source).or_insert(0) += 1;
                tracing::warn!(%source, error = %err, "source failed");
            }
        }
    }

    fn metadata(&self, mode: SearchMode, outcomes: &[Outcome], blended: usize, started: Instant, cache_hit: bool) -> SearchMetadata {
        let mut meta = SearchMetadata { mode: Some(mode), blended_count: blended, cache_hit, timestamp: now_rfc3339(), ..Default::default() };
        for (source, outcome) in outcomes {
            match outcome {
                Ok(hits) => {
                    meta.source_counts.insert(*source, hits.len());
                    if source.is_external() {
                        meta.api_count += hits.len();
                    } else {
                        meta.local_count += hits.len();
                    }
                }
                Err(err) => {
                    meta.source_counts.insert(*source, 0);
                    meta.errors.insert(*source, err.to_string());
                }
            }
        }
        meta.elapsed_ms = started.elapsed().as_millis() as u64;
        meta
    }

    /// `cache_hit` is `None` when the cache is off.
    fn record(&self, mode: SearchMode, cache_hit: Option<bool>, meta: &SearchMetadata, elapsed: Duration) {
        let mut c = self.counters.lock();
        c.total += 1;
        *c.by_mode.entry(mode).or_insert(0) += 1;
        match cache_hit {
            Some(true) => c.cache_hits += 1,
            Some(false) => c.cache_misses += 1,
            None => {}
        }
        c.elapsed += elapsed;
        drop(c);
        tracing::info!(
            %mode,
            local = meta.local_count,
            api = meta.api_count,
            blended = meta.blended_count,
            errors = meta.errors.len(),
            cache_hit = meta.cache_hit,
            elapsed_ms = elapsed.as_millis() as u64,
            "search complete"
        );
    }

    pub fn stats(&self) -> StatsSnapshot {
        let c = self.counters.lock();
        let lookups = c.cache_hits + c.cache_misses;
        let externals: Vec<Source> = self.sources().into_iter().filter(Source::is_external).collect();
        StatsSnapshot {
            total_searches: c.total,
            searches_by_mode: c.by_mode.clone(),
            cache_hits: c.cache_hits,
            cache_misses: c.cache_misses,
            cache_hit_rate: if lookups == 0 { 0.0 } else { c.cache_hits as f64 / lookups as f64 },
            provider_failures: c.provider_failures.clone(),
            avg_response_ms: if c.total == 0 { 0.0 } else { c.elapsed.as_secs_f64() * 1000.0 / c.total as f64 },
            current_mode: self.mode(),
            providers: self.health.report(&externals),
        }
    }
}

fn now_rfc3339() -> String {
    time::OffsetDateTime::now_utc().format(&Rfc3339).unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use search_core::Document;

    fn manager(config: SearchConfig) -> SearchManager {
        let index = Arc::new(InvertedIndex::in_memory());
        index.upsert(Document::new("https://py.test/", "Python", "python scripting language")).unwrap();
        index.upsert(Document::new("https://rs.test/", "Rust", "rust systems language")).unwrap();
        SearchManager::new(config, index).unwrap()
    }

    #[test]
    fn default_mode_is_hybrid() {
        assert_eq!(manager(SearchConfig::default()).mode(), SearchMode::Hybrid);
    }

    #[test]
    fn unconfigured_provider_mode_rejected() {
        let m = manager(SearchConfig::default());
        assert_eq!(m.set_mode(SearchMode::Google), Err(SearchError::SourceUnavailable(Source::Google)));
        assert_eq!(m.mode(), SearchMode::Hybrid);
        m.set_mode(SearchMode::Local).unwrap();
        assert_eq!(m.mode(), SearchMode::Local);
        assert!(!m.is_available(SearchMode::Serpapi));
    }

    #[test]
    fn default_mode_must_be_available() {
        let config = SearchConfig { default_mode: SearchMode::Serpapi, ..Default::default() };
        let result = SearchManager::new(config, Arc::new(InvertedIndex::in_memory()));
        assert!(matches!(result, Err(SearchError::SourceUnavailable(Source::Serpapi))));
    }

    #[tokio::test]
    async fn zero_max_results_rejected() {
        let m = manager(SearchConfig::default());
        assert!(matches!(m.search("python", None, 0, &Filters::default()).await, Err(SearchError::Config(_))));
    }

    #[tokio::test]
    async fn local_mode_keeps_tfidf_scores() {
        let m = manager(SearchConfig::default());
        let resp = m.search("python", Some(SearchMode::Local), 10, &Filters::default()).await.unwrap();
        assert_eq!(resp.results.len(), 1);
        assert_eq!(resp.metadata.local_count, 1);
        assert_eq!(resp.metadata.api_count, 0);
        assert!(resp.results[0].score < 1.0);
    }

    #[tokio::test]
    async fn blank_query_returns_nothing() {
        let m = manager(SearchConfig::default());
        let resp = m.search("   ", None, 10, &Filters::default()).await.unwrap();
        assert!(resp.results.is_empty());
        assert_eq!(resp.metadata.mode, Some(SearchMode::Hybrid));
    }

    #[tokio::test]
    async fn second_identical_search_hits_cache() {
        let m = manager(SearchConfig::default());
        let first = m.search("Python", None, 10, &Filters::default()).await.unwrap();
        assert!(!first.metadata.cache_hit);
        let second = m.search("  python ", None, 10, &Filters::default()).await.unwrap();
        assert!(second.metadata.cache_hit);
        assert_eq!(first.results, second.results);

        let stats = m.stats();
        assert_eq!(stats.total_searches, 2);
        assert_eq!(stats.cache_hits, 1);
        assert_eq!(stats.cache_misses, 1);
        assert!((stats.cache_hit_rate - 0.5).abs() < f64::EPSILON);
        assert_eq!(stats.searches_by_mode.get(&SearchMode::Hybrid), Some(&2));
    }
}
