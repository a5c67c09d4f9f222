//! The sources a search can be served from.
//!
//! [`Searcher`] is a closed set: the local index, or an external provider
//! behind [`SearchProvider`]. The manager only talks to `Searcher`.

use crate::error::SearchError;
use crate::provider::SearchProvider;
use crate::types::Filters;
use search_core::{Ranker, SearchResult, Source};
use std::sync::Arc;
use std::time::Duration;

pub enum Searcher {
    Local(LocalSearcher),
    External(ExternalSearcher),
}

impl Searcher {
    pub fn source(&self) -> Source {
        match self {
            Self::Local(_) => Source::Local,
            Self::External(s) => s.provider.source(),
        }
    }

    /// Up to `max_results` hits, bounded by this source's timeout.
    pub async fn search(&self, query: &str, max_results: usize, filters: &Filters) -> Result<Vec<SearchResult>, SearchError> {
        let (timeout, fut) = match self {
            Self::Local(s) => (s.timeout, futures::future::Either::Left(s.search(query, max_results, filters))),
            Self::External(s) => (s.timeout, futures::future::Either::Right(s.search(query, max_results, filters))),
        };
        tokio::time::timeout(timeout, fut).await.map_err(|_| SearchError::Timeout(self.source()))?
    }
}

pub struct LocalSearcher {
    ranker: Ranker,
    timeout: Duration,
}

impl LocalSearcher {
    pub fn new(ranker: Ranker, timeout: Duration) -> Self { Self { ranker, timeout } }

    /// Ranks on the blocking pool so index lock waits never stall the runtime.
    async fn search(&self, query: &str, max_results: usize, filters: &Filters) -> Result<Vec<SearchResult>, SearchError> {
        let ranker = self.ranker.clone();
        let query = query.to_string();
        let filter = filters.local_filter();
        tokio::task::spawn_blocking(move || ranker.search(&query, max_results, &filter))
            .await
            .map_err(|e| SearchError::Provider { provider: Source::Local, message: e.to_string() })
    }
}

pub struct ExternalSearcher {
    provider: Arc<dyn SearchProvider>,
    page_size: usize,
    timeout: Duration,
}

impl ExternalSearcher {
    pub fn new(provider: Arc<dyn SearchProvider>, page_size: usize, timeout: Duration) -> Self {
        Self { provider, page_size: page_size.max(1), timeout }
    }

    /// Fetch `ceil(max_results / page_size)` pages in order, stopping at the
    /// first short page or when the provider reports nothing further. A page
    /// is short when the provider sent fewer items, not when some were unusable.
    async fn search(&self, query: &str, max_results: usize, filters: &Filters) -> Result<Vec<SearchResult>, SearchError> {
        let pages = max_results.div_ceil(self.page_size);
        let mut results = Vec::with_capacity(max_results);
        for page in 0..pages {
            let offset = page * self.page_size;
            let fetched = self.provider.search_page(query, filters, self.page_size, offset).await?;
            let short = fetched.fetched < self.page_size;
            results.extend(fetched.results);
            if short || !fetched.has_more {
                break;
            }
        }
        results.truncate(max_results);
        Ok(results)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::ProviderPage;
    use async_trait::async_trait;
    use parking_lot::Mutex;
    use search_core::{Document, InvertedIndex};

    /// Serves `total` numbered results and records every requested offset.
    struct Paged {
        total: usize,
        offsets: Mutex<Vec<usize>>,
        delay: Duration,
    }

    impl Paged {
        fn new(total: usize) -> Self { Self { total, offsets: Mutex::new(Vec::new()), delay: Duration::ZERO } }
    }

    #[async_trait]
    impl SearchProvider for Paged {
        fn source(&self) -> Source { Source::Serpapi }

        async fn search_page(&self, _query: &str, _filters: &Filters, page_size: usize, offset: usize) -> Result<ProviderPage, SearchError> {
            self.offsets.lock().push(offset);
            tokio::time::sleep(self.delay).await;
            let end = (offset + page_size).min(self.total);
            let results = (offset..end)
                .map(|i| crate::provider::result(Source::Serpapi, Some(format!("r{i}")), format!("https://r{i}.test/"), None, i + 1))
                .collect();
            Ok(ProviderPage::complete(results, end < self.total))
        }
    }

    /// Full pages where the first item of each had no usable link.
    struct Linkless {
        offsets: Mutex<Vec<usize>>,
    }

    #[async_trait]
    impl SearchProvider for Linkless {
        fn source(&self) -> Source { Source::Google }

        async fn search_page(&self, _query: &str, _filters: &Filters, page_size: usize, offset: usize) -> Result<ProviderPage, SearchError> {
            self.offsets.lock().push(offset);
            let results = (offset + 1..offset + page_size)
                .map(|i| crate::provider::result(Source::Google, None, format!("https://g{i}.test/"), None, i + 1))
                .collect();
            Ok(ProviderPage { results, has_more: true, fetched: page_size })
        }
    }

    fn external(provider: Arc<Paged>) -> Searcher {
        Searcher::External(ExternalSearcher::new(provider, 10, Duration::from_secs(5)))
    }

    #[tokio::test]
    async fn twenty_results_take_two_pages() {
        let provider = Arc::new(Paged::new(100));
        let results = external(provider.clone()).search("q", 20, &Filters::default()).await.unwrap();
        assert_eq!(results.len(), 20);
        assert_eq!(*provider.offsets.lock(), vec![0, 10]);
    }

    #[tokio::test]
    async fn short_first_page_stops_pagination() {
        let provider = Arc::new(Paged::new(7));
        let results = external(provider.clone()).search("q", 20, &Filters::default()).await.unwrap();
        assert_eq!(results.len(), 7);
        assert_eq!(*provider.offsets.lock(), vec![0]);
    }

    #[tokio::test]
    async fn dropped_items_do_not_end_pagination() {
        let provider = Arc::new(Linkless { offsets: Mutex::new(Vec::new()) });
        let searcher = Searcher::External(ExternalSearcher::new(provider.clone(), 10, Duration::from_secs(5)));
        let results = searcher.search("q", 20, &Filters::default()).await.unwrap();
        assert_eq!(*provider.offsets.lock(), vec![0, 10]);
        assert_eq!(results.len(), 18);
    }

    #[tokio::test]
    async fn partial_last_page_is_truncated() {
        let provider = Arc::new(Paged::new(100));
        let results = external(provider.clone()).search("q", 15, &Filters::default()).await.unwrap();
        assert_eq!(results.len(), 15);
        assert_eq!(results[14].position, 15);
    }

    #[tokio::test]
    async fn slow_provider_times_out() {
        let provider = Arc::new(Paged { delay: Duration::from_millis(200), ..Paged::new(10) });
        let searcher = Searcher::External(ExternalSearcher::new(provider, 10, Duration::from_millis(20)));
        let err = searcher.search("q", 10, &Filters::default()).await.unwrap_err();
        assert_eq!(err, SearchError::Timeout(Source::Serpapi));
    }

    #[tokio::test]
    async fn local_searcher_ranks_index() {
        let index = Arc::new(InvertedIndex::in_memory());
        index.upsert(Document::new("https://py.test/", "Python", "python scripting")).unwrap();
        index.upsert(Document::new("https://rs.test/", "Rust", "rust systems")).unwrap();
        let searcher = Searcher::Local(LocalSearcher::new(Ranker::new(index), Duration::from_secs(1)));
        assert_eq!(searcher.source(), Source::Local);
        let results = searcher.search("python", 10, &Filters::default()).await.unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].url, "https://py.test/");
    }
}
