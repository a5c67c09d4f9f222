//! Result-set cache owned by the search manager.
//!
//! Keyed by normalized query, mode, result count and filters. Entries expire
//! after the configured TTL; a zero TTL turns the cache off.

use crate::types::{Filters, SearchMode, SearchResponse};
use moka::future::Cache;
use std::time::Duration;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    query: String,
    mode: SearchMode,
    max_results: usize,
    filters: Filters,
}

impl CacheKey {
    pub fn new(query: &str, mode: SearchMode, max_results: usize, filters: &Filters) -> Self {
        Self { query: normalize_query(query), mode, max_results, filters: filters.clone() }
    }
}

/// Trim, lowercase and collapse inner whitespace.
pub fn normalize_query(query: &str) -> String {
    query.split_whitespace().collect::<Vec<_>>().join(" ").to_lowercase()
}

#[derive(Clone)]
pub struct ResultCache {
    inner: Option<Cache<CacheKey, SearchResponse>>,
}

impl ResultCache {
    pub fn new(ttl: Duration, capacity: u64) -> Self {
        let inner = (!ttl.is_zero() && capacity > 0).then(|| Cache::builder().max_capacity(capacity).time_to_live(ttl).build());
        Self { inner }
    }

    pub fn is_enabled(&self) -> bool { self.inner.is_some() }

    pub async fn get(&self, key: &CacheKey) -> Option<SearchResponse> {
        self.inner.as_ref()?.get(key).await
    }

    pub async fn insert(&self, key: CacheKey, response: SearchResponse) {
        if let Some(cache) = &self.inner {
            cache.insert(key, response).await;
        }
    }

    pub fn invalidate_all(&self) {
        if let Some(cache) = &self.inner {
            cache.invalidate_all();
        }
    }
}
