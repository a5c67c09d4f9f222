//! Concurrent crawler feeding a shared [`InvertedIndex`].
//!
//! A bounded pool of tokio tasks pulls `(url, depth)` pairs from a frontier,
//! fetches and parses each page and upserts the result. A page that fails is
//! counted and logged; it never stops the crawl.

pub mod error;
pub mod page;
pub mod robots;

pub use error::CrawlError;
pub use page::{canonical, parse_page, ParsedPage};

use parking_lot::Mutex;
use reqwest::{Client, Url};
use robots::RobotsCache;
use search_core::{Document, IndexError, InvertedIndex};
use serde::Serialize;
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Arc;
use std::time::{Duration, Instant};
use time::format_description::well_known::Rfc3339;
use tokio::task::JoinSet;

#[derive(Debug, Clone)]
pub struct CrawlConfig {
    /// Worker pool width.
    pub concurrency: usize,
    /// Pages fetched per host in one crawl; the rest are skipped.
    pub max_per_host: usize,
    /// Pages attempted in one crawl.
    pub max_pages: usize,
    pub timeout: Duration,
    pub user_agent: String,
    pub same_host_only: bool,
    /// When false no robots.txt is fetched or checked.
    pub respect_robots: bool,
    /// Upper bound on any robots.txt `Crawl-delay`.
    pub max_crawl_delay: Duration,
    pub max_body_bytes: usize,
}

impl Default for CrawlConfig {
    fn default() -> Self {
        Self {
            concurrency: 16,
            max_per_host: 10,
            max_pages: 1_000,
            timeout: Duration::from_secs(12),
            user_agent: "search-engine-rs-bot/0.1 (+https://example.com/bot)".into(),
            same_host_only: true,
            respect_robots: true,
            max_crawl_delay: Duration::from_secs(10),
            max_body_bytes: 2 * 1024 * 1024,
        }
    }
}

impl CrawlConfig {
    pub fn validate(&self) -> Result<(), CrawlError> {
        if self.concurrency == 0 {
            return Err(CrawlError::Config("concurrency must be greater than 0".into()));
        }
        if self.max_per_host == 0 {
            return Err(CrawlError::Config("max_per_host must be greater than 0".into()));
        }
        if self.timeout.is_zero() {
            return Err(CrawlError::Config("timeout must be greater than 0".into()));
        }
        Ok(())
    }

    /// Longest sleep a robots.txt `Crawl-delay` may impose on one page.
    pub fn crawl_delay_cap(&self) -> Duration { self.max_crawl_delay.min(self.timeout) }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CrawlReport {
    pub indexed: usize,
    pub failed: usize,
    /// Over the per-host cap or excluded by robots.txt.
    pub skipped: usize,
    #[serde(skip)]
    pub elapsed: Duration,
}

/// Totals across every crawl this crawler has run.
#[derive(Debug, Clone, Default, Serialize)]
pub struct CrawlerStats {
    pub crawls: u64,
    pub indexed: u64,
    pub failed: u64,
    pub skipped: u64,
    pub last_crawl: Option<String>,
    pub max_workers: usize,
}

#[derive(Default)]
struct Seen { urls: HashSet<String>, per_host: HashMap<String, usize> }

enum PageOutcome {
    Fetched { url: Url, depth: usize, doc: Document, links: Vec<Url> },
    Failed(CrawlError),
    Disallowed(Url),
}

pub struct Crawler {
    client: Client,
    config: CrawlConfig,
    index: Arc<InvertedIndex>,
    robots: Arc<RobotsCache>,
    stats: Mutex<CrawlerStats>,
}

impl Crawler {
    pub fn new(index: Arc<InvertedIndex>, config: CrawlConfig) -> Result<Self, CrawlError> {
        config.validate()?;
        let client = Client::builder()
            .user_agent(config.user_agent.clone())
            .redirect(reqwest::redirect::Policy::limited(5))
            .timeout(config.timeout)
            .build()
            .map_err(|e| CrawlError::Config(format!("failed to build HTTP client: {e}")))?;
        let stats = Mutex::new(CrawlerStats { max_workers: config.concurrency, ..Default::default() });
        Ok(Self { client, config, index, robots: Arc::new(RobotsCache::default()), stats })
    }

    pub fn index(&self) -> &Arc<InvertedIndex> { &self.index }

    pub fn stats(&self) -> CrawlerStats { self.stats.lock().clone() }

    /// Crawl from `seeds`, following links up to `max_depth` hops away.
    pub async fn crawl(&self, seeds: &[String], max_depth: usize) -> CrawlReport {
        let started = Instant::now();
        let mut report = CrawlReport::default();
        let mut frontier: VecDeque<(Url, usize)> = VecDeque::new();
        for s in seeds {
            let s = s.trim();
            if s.is_empty() || s.starts_with('#') { continue; }
            match Url::parse(s).or_else(|_| Url::parse(&format!("https://{s}"))) {
                Ok(u) if matches!(u.scheme(), "http" | "https") => frontier.push_back((u, 0)),
                _ => {
                    tracing::warn!(seed = s, "invalid seed url");
                    report.failed += 1;
                }
            }
        }
        tracing::info!(
            seeds = frontier.len(),
            max_depth,
            concurrency = self.config.concurrency,
            same_host_only = self.config.same_host_only,
            respect_robots = self.config.respect_robots,
            "crawl started"
        );

        let mut seen = Seen::default();
        let mut inflight: JoinSet<PageOutcome> = JoinSet::new();
        let mut attempted = 0usize;

        loop {
            // Fill workers
            while inflight.len() < self.config.concurrency && attempted < self.config.max_pages {
                let Some((url, depth)) = frontier.pop_front() else { break };
                if !seen.urls.insert(canonical(&url)) { continue; }
                let host = url.host_str().unwrap_or_default().to_string();
                let count = seen.per_host.entry(host).or_insert(0);
                if *count >= self.config.max_per_host {
                    tracing::debug!(%url, "per-host cap reached, skipping");
                    report.skipped += 1;
                    continue;
                }
                *count += 1;
                attempted += 1;
                inflight.spawn(self.visit(url, depth));
            }

            let Some(joined) = inflight.join_next().await else { break };
            match joined {
                Ok(PageOutcome::Fetched { url, depth, doc, links }) => {
                    if depth < max_depth {
                        for link in links {
                            if self.config.same_host_only && link.host_str() != url.host_str() { continue; }
                            if !seen.urls.contains(&canonical(&link)) {
                                frontier.push_back((link, depth + 1));
                            }
                        }
                    }
                    match self.index.upsert(doc) {
                        Ok(out) => {
                            report.indexed += 1;
                            tracing::debug!(%url, doc_id = out.doc_id, replaced = out.replaced, "page indexed");
                        }
                        Err(IndexError::EmptyDocument(_)) => {
                            report.failed += 1;
                            tracing::warn!(error = %CrawlError::parse(&url, "no indexable terms"), "page skipped");
                        }
                        Err(err) => {
                            report.failed += 1;
                            tracing::error!(%url, error = %err, "index upsert failed");
                        }
                    }
                    if report.indexed > 0 && report.indexed % 100 == 0 {
                        tracing::info!(indexed = report.indexed, visited = seen.urls.len(), frontier = frontier.len(), "progress");
                    }
                }
                Ok(PageOutcome::Failed(err)) => {
                    report.failed += 1;
                    tracing::warn!(error = %err, "page failed");
                }
                Ok(PageOutcome::Disallowed(url)) => {
                    report.skipped += 1;
                    tracing::debug!(%url, "disallowed by robots.txt");
                }
                Err(err) => {
                    report.failed += 1;
                    tracing::error!(error = %err, "crawl worker panicked");
                }
            }
        }

        report.elapsed = started.elapsed();
        {
            let mut stats = self.stats.lock();
            stats.crawls += 1;
            stats.indexed += report.indexed as u64;
            stats.failed += report.failed as u64;
            stats.skipped += report.skipped as u64;
            stats.last_crawl = time::OffsetDateTime::now_utc().format(&Rfc3339).ok();
        }
        tracing::info!(
            indexed = report.indexed,
            failed = report.failed,
            skipped = report.skipped,
            visited = seen.urls.len(),
            frontier = frontier.len(),
            elapsed_ms = report.elapsed.as_millis() as u64,
            "crawl finished"
        );
        report
    }

    fn visit(&self, url: Url, depth: usize) -> impl std::future::Future<Output = PageOutcome> + Send + 'static {
        let client = self.client.clone();
        let robots = self.robots.clone();
        let ua = self.config.user_agent.clone();
        let respect_robots = self.config.respect_robots;
        let max_delay = self.config.crawl_delay_cap();
        let max_bytes = self.config.max_body_bytes;
        async move {
            if respect_robots {
                let rules = robots.rules(&client, &url, &ua).await;
                if !robots::path_allowed(url.path(), &rules) {
                    return PageOutcome::Disallowed(url);
                }
                if let Some(delay) = rules.crawl_delay(max_delay) {
                    tokio::time::sleep(delay).await;
                }
            }
            tracing::debug!(%url, depth, "fetching");
            let html = match page::fetch(&client, &url, max_bytes).await {
                Ok(html) => html,
                Err(err) => return PageOutcome::Failed(err),
            };
            match parse_page(&url, &html) {
                Ok(parsed) => {
                    let doc = Document::new(canonical(&url), parsed.title, parsed.text);
                    PageOutcome::Fetched { url, depth, doc, links: parsed.links }
                }
                Err(err) => PageOutcome::Failed(err),
            }
        }
    }
}
