//! Request, response and statistics types shared by the manager and the
//! HTTP boundary.

use crate::error::SearchError;
use crate::health::ProviderReport;
use search_core::{now_millis, LocalFilter, SearchResult, Source};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::str::FromStr;

/// Which sources a search is served from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SearchMode {
    Local,
    Serpapi,
    Google,
    Hybrid,
}

impl SearchMode {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Local => "local",
            Self::Serpapi => "serpapi",
            Self::Google => "google",
            Self::Hybrid => "hybrid",
        }
    }

    /// The one source a single-source mode reads from.
    pub fn single_source(&self) -> Option<Source> {
        match self {
            Self::Local => Some(Source::Local),
            Self::Serpapi => Some(Source::Serpapi),
            Self::Google => Some(Source::Google),
            Self::Hybrid => None,
        }
    }

    pub fn all() -> &'static [SearchMode] { &[Self::Local, Self::Serpapi, Self::Google, Self::Hybrid] }
}

impl fmt::Display for SearchMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { f.write_str(self.name()) }
}

impl FromStr for SearchMode {
    type Err = SearchError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "local" => Ok(Self::Local),
            "serpapi" => Ok(Self::Serpapi),
            "google" => Ok(Self::Google),
            "hybrid" => Ok(Self::Hybrid),
            other => Err(SearchError::InvalidMode(other.to_string())),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TimeRange {
    Day,
    Week,
    Month,
    Year,
}

impl TimeRange {
    /// Single-letter code used by both providers (`df`, `dateRestrict`).
    pub fn code(&self) -> &'static str {
        match self {
            Self::Day => "d",
            Self::Week => "w",
            Self::Month => "m",
            Self::Year => "y",
        }
    }

    pub fn millis(&self) -> i64 {
        const DAY: i64 = 24 * 60 * 60 * 1000;
        match self {
            Self::Day => DAY,
            Self::Week => 7 * DAY,
            Self::Month => 30 * DAY,
            Self::Year => 365 * DAY,
        }
    }
}

impl FromStr for TimeRange {
    type Err = SearchError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "d" | "day" => Ok(Self::Day),
            "w" | "week" => Ok(Self::Week),
            "m" | "month" => Ok(Self::Month),
            "y" | "year" => Ok(Self::Year),
            other => Err(SearchError::Config(format!("unknown time range: {other}"))),
        }
    }
}

/// Optional restrictions applied to a search.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Filters {
    pub time_range: Option<TimeRange>,
    /// Domain; subdomains match too.
    pub site: Option<String>,
    /// Limits hybrid fan-out to these sources.
    pub sources: Option<BTreeSet<Source>>,
}

impl Filters {
    pub fn allows(&self, source: Source) -> bool {
        self.sources.as_ref().map_or(true, |s| s.contains(&source))
    }

    pub fn site(&self) -> Option<&str> {
        self.site.as_deref().map(str::trim).filter(|s| !s.is_empty())
    }

    pub(crate) fn local_filter(&self) -> LocalFilter {
        LocalFilter {
            crawled_since: self.time_range.map(|r| now_millis() - r.millis()),
            site: self.site().map(str::to_string),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SearchMetadata {
    pub mode: Option<SearchMode>,
    pub source_counts: BTreeMap<Source, usize>,
    pub local_count: usize,
    /// Sum over external providers.
    pub api_count: usize,
    pub blended_count: usize,
    pub elapsed_ms: u64,
    /// RFC3339
    pub timestamp: String,
    pub cache_hit: bool,
    pub errors: BTreeMap<Source, String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SearchResponse {
    pub results: Vec<SearchResult>,
    pub metadata: SearchMetadata,
}

#[derive(Debug, Clone, Serialize)]
pub struct StatsSnapshot {
    pub total_searches: u64,
    pub searches_by_mode: BTreeMap<SearchMode, u64>,
    pub cache_hits: u64,
    pub cache_misses: u64,
    pub cache_hit_rate: f64,
    pub provider_failures: BTreeMap<Source, u64>,
    pub avg_response_ms: f64,
    pub current_mode: SearchMode,
    pub providers: Vec<ProviderReport>,
}
