//! Google Custom Search JSON API client.

use crate::config::GoogleConfig;
use crate::error::SearchError;
use crate::provider::{result, ProviderPage, SearchProvider};
use crate::types::Filters;
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use search_core::Source;
use serde::Deserialize;

/// The API refuses `num` above ten.
const MAX_NUM: usize = 10;

#[derive(Debug, Deserialize)]
struct CseResponse {
    #[serde(default)]
    items: Vec<CseItem>,
    queries: Option<CseQueries>,
    error: Option<CseError>,
}

#[derive(Debug, Deserialize)]
struct CseItem {
    title: Option<String>,
    link: Option<String>,
    snippet: Option<String>,
}

#[derive(Debug, Deserialize)]
struct CseQueries {
    #[serde(rename = "nextPage")]
    next_page: Option<Vec<serde_json::Value>>,
}

#[derive(Debug, Deserialize)]
struct CseError {
    code: Option<u16>,
    #[serde(default)]
    message: String,
}

impl CseError {
    fn is_quota(&self) -> bool {
        self.code == Some(429) || self.message.contains("quota") || self.message.contains("Quota")
    }
}

pub struct GoogleClient {
    client: Client,
    config: GoogleConfig,
    safe_search: bool,
}

impl GoogleClient {
    pub fn new(client: Client, config: GoogleConfig, safe_search: bool) -> Self {
        Self { client, config, safe_search }
    }

    fn endpoint(&self) -> String {
        format!("{}/customsearch/v1", self.config.base_url.trim_end_matches('/'))
    }
}

#[async_trait]
impl SearchProvider for GoogleClient {
    fn source(&self) -> Source { Source::Google }

    async fn search_page(&self, query: &str, filters: &Filters, page_size: usize, offset: usize) -> Result<ProviderPage, SearchError> {
        let num = page_size.clamp(1, MAX_NUM);
        let mut params: Vec<(&str, String)> = vec![
            ("key", self.config.api_key.clone()),
            ("cx", self.config.cse_id.clone()),
            ("q", query.to_string()),
            ("num", num.to_string()),
            // 1-based
            ("start", (offset + 1).to_string()),
            ("safe", if self.safe_search { "active" } else { "off" }.into()),
        ];
        if let Some(range) = filters.time_range {
            params.push(("dateRestrict", format!("{}1", range.code())));
        }
        if let Some(site) = filters.site() {
            params.push(("siteSearch", site.to_string()));
        }

        tracing::debug!(offset, num, "google request");
        let resp = self.client.get(self.endpoint()).query(&params).send().await?;
        let status = resp.status();
        if status == StatusCode::TOO_MANY_REQUESTS {
            return Err(SearchError::Quota(Source::Google));
        }
        let body = resp.text().await?;
        let parsed: CseResponse = match serde_json::from_str(&body) {
            Ok(parsed) => parsed,
            Err(_) if !status.is_success() => return Err(SearchError::Http(format!("google returned HTTP {status}"))),
            Err(e) => return Err(SearchError::Parse(format!("google response: {e}"))),
        };
        if let Some(err) = parsed.error {
            if err.is_quota() {
                return Err(SearchError::Quota(Source::Google));
            }
            return Err(SearchError::Provider { provider: Source::Google, message: err.message });
        }
        if !status.is_success() {
            return Err(SearchError::Http(format!("google returned HTTP {status}")));
        }

        let fetched = parsed.items.len();
        let results: Vec<_> = parsed
            .items
            .into_iter()
            .filter_map(|item| Some((item.link.filter(|l| !l.is_empty())?, item.title, item.snippet)))
            .take(num)
            .enumerate()
            .map(|(i, (link, title, snippet))| result(Source::Google, title, link, snippet, offset + i + 1))
            .collect();
        let has_more = parsed.queries.and_then(|q| q.next_page).is_some_and(|p| !p.is_empty());
        Ok(ProviderPage { results, has_more, fetched })
    }
}
