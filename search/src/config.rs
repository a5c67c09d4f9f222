//! Search configuration with defaults.
//!
//! Providers are optional: a provider without credentials is simply not
//! part of the fan-out, and single-provider modes for it are refused.

use crate::error::SearchError;
use crate::types::SearchMode;
use std::time::Duration;

pub const SERPAPI_BASE_URL: &str = "https://serpapi.com";
pub const GOOGLE_BASE_URL: &str = "https://www.googleapis.com";

#[derive(Debug, Clone)]
pub struct SerpApiConfig {
    pub api_key: String,
    pub base_url: String,
    /// DuckDuckGo region code (`kl`).
    pub region: String,
}

impl SerpApiConfig {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self { api_key: api_key.into(), base_url: SERPAPI_BASE_URL.into(), region: "us-en".into() }
    }
}

#[derive(Debug, Clone)]
pub struct GoogleConfig {
    pub api_key: String,
    /// Custom Search Engine id (`cx`).
    pub cse_id: String,
    pub base_url: String,
}

impl GoogleConfig {
    pub fn new(api_key: impl Into<String>, cse_id: impl Into<String>) -> Self {
        Self { api_key: api_key.into(), cse_id: cse_id.into(), base_url: GOOGLE_BASE_URL.into() }
    }
}

#[derive(Debug, Clone)]
pub struct SearchConfig {
    /// Mode used when a request names none.
    pub default_mode: SearchMode,
    /// Results per provider request.
    pub page_size: usize,
    /// Bound on one source's whole contribution to a search.
    pub source_timeout: Duration,
    pub safe_search: bool,
    pub local_boost: f64,
    pub external_boost: f64,
    /// Zero disables caching.
    pub cache_ttl: Duration,
    pub cache_capacity: u64,
    /// Consecutive failures before a provider is demoted.
    pub failure_threshold: u32,
    pub cooldown: Duration,
    pub user_agent: String,
    pub serpapi: Option<SerpApiConfig>,
    pub google: Option<GoogleConfig>,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            default_mode: SearchMode::Hybrid,
            page_size: 10,
            source_timeout: Duration::from_secs(5),
            safe_search: true,
            local_boost: 1.2,
            external_boost: 1.1,
            cache_ttl: Duration::from_secs(3600),
            cache_capacity: 1_000,
            failure_threshold: 3,
            cooldown: Duration::from_secs(60),
            user_agent: "search-engine-rs/0.1".into(),
            serpapi: None,
            google: None,
        }
    }
}

impl SearchConfig {
    pub fn validate(&self) -> Result<(), SearchError> {
        if self.page_size == 0 {
            return Err(SearchError::Config("page_size must be greater than 0".into()));
        }
        if self.source_timeout.is_zero() {
            return Err(SearchError::Config("source_timeout must be greater than 0".into()));
        }
        if self.failure_threshold == 0 {
            return Err(SearchError::Config("failure_threshold must be greater than 0".into()));
        }
        for (name, boost) in [("local_boost", self.local_boost), ("external_boost", self.external_boost)] {
            if !boost.is_finite() || boost <= 0.0 {
                return Err(SearchError::Config(format!("{name} must be a positive number")));
            }
        }
        if self.serpapi.as_ref().is_some_and(|c| c.api_key.trim().is_empty()) {
            return Err(SearchError::Config("serpapi api_key is empty".into()));
        }
        if self.google.as_ref().is_some_and(|c| c.api_key.trim().is_empty() || c.cse_id.trim().is_empty()) {
            return Err(SearchError::Config("google needs both api_key and cse_id".into()));
        }
        Ok(())
    }
}
