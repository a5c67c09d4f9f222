//! TF-IDF ranking over the shared [`InvertedIndex`].
//!
//! Score per document is `sum(tf(t, d) * ln(N / df(t)))` over distinct query
//! terms, with `tf` normalized by document length. Documents sharing no term
//! with the query never appear. Equal scores keep insertion (doc id) order.
//! [`Ranker::search`] also understands the operators in [`crate::query`].

use crate::index::{DocId, DocMeta, InvertedIndex};
use crate::query::{parse_query, ParsedQuery};
use crate::result::{SearchResult, Source};
use crate::snippet::snippet;
use std::cmp::Ordering;
use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

/// Restricts which documents may be scored.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct LocalFilter {
    /// Only documents crawled at or after this unix-millis timestamp.
    pub crawled_since: Option<i64>,
    /// Only documents whose host is this domain or a subdomain of it.
    pub site: Option<String>,
}

impl LocalFilter {
    pub fn is_empty(&self) -> bool { self.crawled_since.is_none() && self.site.is_none() }

    pub fn matches(&self, meta: &DocMeta) -> bool {
        if self.crawled_since.is_some_and(|since| meta.crawled_at < since) {
            return false;
        }
        if let Some(site) = &self.site {
            let site = site.trim().trim_start_matches("www.").to_ascii_lowercase();
            let host = url::Url::parse(&meta.url).ok().and_then(|u| u.host_str().map(str::to_ascii_lowercase));
            let Some(host) = host else { return false };
            let host = host.trim_start_matches("www.");
            if host != site && !host.ends_with(&format!(".{site}")) {
                return false;
            }
        }
        true
    }
}

#[derive(Clone)]
pub struct Ranker {
    index: Arc<InvertedIndex>,
}

impl Ranker {
    pub fn new(index: Arc<InvertedIndex>) -> Self { Self { index } }

    pub fn index(&self) -> &Arc<InvertedIndex> { &self.index }

    /// Rank already-tokenized query terms.
    pub fn rank(&self, query_terms: &[String], top_n: usize) -> Vec<SearchResult> {
        self.rank_filtered(query_terms, top_n, &LocalFilter::default(), query_terms, None)
    }

    /// Parse `query` (operators included), rank it and highlight the raw
    /// positive query words in snippets.
    pub fn search(&self, query: &str, top_n: usize, filter: &LocalFilter) -> Vec<SearchResult> {
        let parsed = parse_query(query);
        let operators = (!parsed.is_simple()).then_some(&parsed);
        self.rank_filtered(&parsed.terms, top_n, filter, &parsed.words, operators)
    }

    fn rank_filtered(
        &self,
        query_terms: &[String],
        top_n: usize,
        filter: &LocalFilter,
        highlight: &[String],
        operators: Option<&ParsedQuery>,
    ) -> Vec<SearchResult> {
        if top_n == 0 || query_terms.is_empty() {
            return Vec::new();
        }
        let inline_site = operators.and_then(|q| q.site.clone()).map(|site| LocalFilter { site: Some(site), ..Default::default() });
        let unique: BTreeSet<&str> = query_terms.iter().map(String::as_str).collect();
        self.index.with_state(|state| {
            let n = state.docs.len() as f64;
            let mut scores: HashMap<DocId, f64> = HashMap::new();
            for term in unique {
                let Some(postings) = state.terms.get(term) else { continue };
                if postings.is_empty() { continue; }
                let idf = (n / postings.len() as f64).ln();
                for p in postings {
                    let Some(meta) = state.docs.get(&p.doc_id) else { continue };
                    if !filter.matches(meta) { continue; }
                    let tf = p.tf as f64 / meta.length.max(1) as f64;
                    *scores.entry(p.doc_id).or_insert(0.0) += tf * idf;
                }
            }
            if let Some(q) = operators {
                scores.retain(|id, _| {
                    state.docs.get(id).is_some_and(|meta| {
                        q.admits_terms(meta) && inline_site.as_ref().map_or(true, |f| f.matches(meta)) && q.admits_phrases(meta)
                    })
                });
            }

            let mut scored: Vec<(DocId, f64)> = scores.into_iter().collect();
            scored.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(Ordering::Equal).then(a.0.cmp(&b.0)));
            scored.truncate(top_n);

            scored
                .into_iter()
                .enumerate()
                .filter_map(|(i, (doc_id, score))| {
                    let meta = state.docs.get(&doc_id)?;
                    Some(SearchResult {
                        title: if meta.title.trim().is_empty() { meta.url.clone() } else { meta.title.clone() },
                        url: meta.url.clone(),
                        snippet: snippet(&meta.text, highlight),
                        score,
                        source: Source::Local,
                        position: i + 1,
                    })
                })
                .collect()
        })
    }
}
