//! Interface every external web-search backend implements.

use crate::error::SearchError;
use crate::types::Filters;
use async_trait::async_trait;
use search_core::{SearchResult, Source};
use std::time::Duration;

/// One page of provider results.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ProviderPage {
    pub results: Vec<SearchResult>,
    /// The provider reports results beyond this page.
    pub has_more: bool,
    /// Items the provider sent, counting ones dropped while parsing.
    pub fetched: usize,
}

impl ProviderPage {
    /// A page where every item the provider sent became a result.
    pub fn complete(results: Vec<SearchResult>, has_more: bool) -> Self {
        Self { fetched: results.len(), results, has_more }
    }
}

/// An external search backend queried one page at a time.
///
/// `offset` is zero-based; implementations translate it to their own
/// pagination scheme. Result positions are absolute (`offset + i + 1`).
#[async_trait]
pub trait SearchProvider: Send + Sync {
    fn source(&self) -> Source;

    async fn search_page(&self, query: &str, filters: &Filters, page_size: usize, offset: usize) -> Result<ProviderPage, SearchError>;
}

/// HTTP client shared by every provider.
pub fn build_client(timeout: Duration, user_agent: &str) -> Result<reqwest::Client, SearchError> {
    reqwest::Client::builder()
        .timeout(timeout)
        .user_agent(user_agent.to_string())
        .redirect(reqwest::redirect::Policy::limited(5))
        .build()
        .map_err(|e| SearchError::Http(format!("failed to build HTTP client: {e}")))
}

pub(crate) fn result(source: Source, title: Option<String>, url: String, snippet: Option<String>, position: usize) -> SearchResult {
    SearchResult {
        title: title.unwrap_or_default().trim().to_string(),
        url,
        snippet: snippet.unwrap_or_default().trim().to_string(),
        score: 0.0,
        source,
        position,
    }
}
