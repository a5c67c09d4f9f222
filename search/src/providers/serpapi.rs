//! DuckDuckGo results through the SerpAPI JSON endpoint.

use crate::config::SerpApiConfig;
use crate::error::SearchError;
use crate::provider::{result, ProviderPage, SearchProvider};
use crate::types::Filters;
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use search_core::Source;
use serde::Deserialize;

#[derive(Debug, Deserialize)]
struct SerpResponse {
    #[serde(default)]
    organic_results: Vec<SerpItem>,
    error: Option<String>,
    serpapi_pagination: Option<SerpPagination>,
}

#[derive(Debug, Deserialize)]
struct SerpItem {
    title: Option<String>,
    link: Option<String>,
    snippet: Option<String>,
}

#[derive(Debug, Deserialize)]
struct SerpPagination {
    next: Option<String>,
}

pub struct SerpApiClient {
    client: Client,
    config: SerpApiConfig,
    safe_search: bool,
}

impl SerpApiClient {
    pub fn new(client: Client, config: SerpApiConfig, safe_search: bool) -> Self {
        Self { client, config, safe_search }
    }

    fn endpoint(&self) -> String {
        format!("{}/search.json", self.config.base_url.trim_end_matches('/'))
    }
}

/// Site restriction goes into the query text for DuckDuckGo.
fn query_text(query: &str, filters: &Filters) -> String {
    match filters.site() {
        Some(site) => format!("{query} site:{site}"),
        None => query.to_string(),
    }
}

#[async_trait]
impl SearchProvider for SerpApiClient {
    fn source(&self) -> Source { Source::Serpapi }

    async fn search_page(&self, query: &str, filters: &Filters, page_size: usize, offset: usize) -> Result<ProviderPage, SearchError> {
        let start = offset.to_string();
        let mut params: Vec<(&str, String)> = vec![
            ("engine", "duckduckgo".into()),
            ("q", query_text(query, filters)),
            ("kl", self.config.region.clone()),
            ("safe", if self.safe_search { "1" } else { "-1" }.into()),
            ("start", start),
            ("api_key", self.config.api_key.clone()),
        ];
        if let Some(range) = filters.time_range {
            params.push(("df", range.code().into()));
        }

        tracing::debug!(offset, page_size, "serpapi request");
        let resp = self.client.get(self.endpoint()).query(&params).send().await?;
        let status = resp.status();
        let body = resp.text().await?;
        if status == StatusCode::TOO_MANY_REQUESTS {
            return Err(SearchError::Quota(Source::Serpapi));
        }
        let parsed: SerpResponse = match serde_json::from_str(&body) {
            Ok(parsed) => parsed,
            Err(_) if !status.is_success() => return Err(SearchError::Http(format!("serpapi returned HTTP {status}"))),
            Err(e) => return Err(SearchError::Parse(format!("serpapi response: {e}"))),
        };
        if let Some(message) = parsed.error {
            // SerpAPI reports "no results" as an error string
            if status.is_success() && message.to_ascii_lowercase().contains("hasn't returned any results") {
                return Ok(ProviderPage::default());
            }
            return Err(SearchError::Provider { provider: Source::Serpapi, message });
        }
        if !status.is_success() {
            return Err(SearchError::Http(format!("serpapi returned HTTP {status}")));
        }

        let fetched = parsed.organic_results.len();
        let results: Vec<_> = parsed
            .organic_results
            .into_iter()
            .filter_map(|item| Some((item.link.filter(|l| !l.is_empty())?, item.title, item.snippet)))
            .take(page_size)
            .enumerate()
            .map(|(i, (link, title, snippet))| result(Source::Serpapi, title, link, snippet, offset + i + 1))
            .collect();
        let has_more = match parsed.serpapi_pagination {
            Some(p) => p.next.is_some(),
            None => fetched >= page_size,
        };
        Ok(ProviderPage { results, has_more, fetched })
    }
}
