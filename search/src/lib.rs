//! Hybrid search over the local index and external web-search providers.
//!
//! [`SearchManager`] owns one [`Searcher`] per source, fans a query out to
//! them concurrently, blends and deduplicates the results by normalized URL
//! and caches complete result sets. Provider failures degrade a search, they
//! never fail it.

pub mod blend;
pub mod cache;
pub mod config;
pub mod error;
pub mod health;
pub mod manager;
pub mod provider;
pub mod providers;
pub mod searcher;
pub mod types;

pub use blend::normalize_url;
pub use config::{GoogleConfig, SearchConfig, SerpApiConfig};
pub use error::{Result, SearchError};
pub use health::{HealthState, ProviderReport};
pub use manager::SearchManager;
pub use provider::{ProviderPage, SearchProvider};
pub use providers::{GoogleClient, SerpApiClient};
pub use searcher::{ExternalSearcher, LocalSearcher, Searcher};
pub use types::{Filters, SearchMetadata, SearchMode, SearchResponse, StatsSnapshot, TimeRange};
