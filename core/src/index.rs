use crate::persist::{encode_snapshot, SnapshotStore};
use crate::tokenizer;
use crate::IndexError;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

pub type DocId = u64;

/// Milliseconds since the unix epoch, the unit of every crawl timestamp.
pub fn now_millis() -> i64 {
    (time::OffsetDateTime::now_utc().unix_timestamp_nanos() / 1_000_000) as i64
}

/// A parsed page on its way into the index.
#[derive(Debug, Clone)]
pub struct Document {
    /// Canonical URL; doubles as the document identifier.
    pub url: String,
    pub title: String,
    pub text: String,
    /// Token multiset; repeats carry the term frequency.
    pub terms: Vec<String>,
    pub crawled_at: i64,
}

impl Document {
    /// Builds a document stamped now, tokenizing title and text together.
    pub fn new(url: impl Into<String>, title: impl Into<String>, text: impl Into<String>) -> Self {
        let title = title.into();
        let text = text.into();
        let terms = tokenizer::terms(&format!("{title}\n{text}"));
        Self { url: url.into(), title, text, terms, crawled_at: now_millis() }
    }

    pub fn with_crawled_at(mut self, crawled_at: i64) -> Self {
        self.crawled_at = crawled_at;
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Posting {
    pub doc_id: DocId,
    /// Raw occurrences of the term in the document.
    pub tf: u32,
}

/// Registry entry for an indexed document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocMeta {
    pub url: String,
    pub title: String,
    /// Full text, kept for snippet extraction.
    pub text: String,
    /// Total term count, the TF normalizer.
    pub length: u32,
    pub crawled_at: i64,
    /// Distinct terms, sorted; lets removal touch only the affected postings.
    pub terms: Vec<String>,
}

#[derive(Debug, Clone, Default)]
pub struct IndexConfig {
    /// Where snapshots live. `None` keeps the index memory-only.
    pub snapshot_path: Option<PathBuf>,
    pub max_documents: Option<usize>,
    pub max_terms: Option<usize>,
}

impl IndexConfig {
    pub fn persistent(path: impl Into<PathBuf>) -> Self {
        Self { snapshot_path: Some(path.into()), ..Default::default() }
    }

    pub fn validate(&self) -> Result<(), IndexError> {
        if self.max_documents == Some(0) {
            return Err(IndexError::Config("max_documents must be greater than 0".into()));
        }
        if self.max_terms == Some(0) {
            return Err(IndexError::Config("max_terms must be greater than 0".into()));
        }
        Ok(())
    }
}

/// Default interval for the background flusher.
pub const DEFAULT_FLUSH_INTERVAL: Duration = Duration::from_secs(5);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct UpsertOutcome {
    pub doc_id: DocId,
    /// A previous version of the URL was replaced.
    pub replaced: bool,
    /// Documents evicted to get back under the cap.
    pub evicted: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct IndexStats {
    pub documents: usize,
    pub terms: usize,
    pub postings: usize,
    pub generation: u64,
    pub oldest_crawl: Option<i64>,
    pub newest_crawl: Option<i64>,
}

#[derive(Default)]
pub(crate) struct IndexState {
    pub next_doc_id: DocId,
    pub terms: BTreeMap<String, Vec<Posting>>,
    pub docs: BTreeMap<DocId, DocMeta>,
    by_url: HashMap<String, DocId>,
    /// (crawled_at, url): the eviction order, oldest first.
    by_age: BTreeSet<(i64, String)>,
}

impl IndexState {
    fn remove_doc(&mut self, doc_id: DocId) -> Option<DocMeta> {
        let meta = self.docs.remove(&doc_id)?;
        for term in &meta.terms {
            if let Some(list) = self.terms.get_mut(term) {
                if let Ok(pos) = list.binary_search_by_key(&doc_id, |p| p.doc_id) {
                    list.remove(pos);
                }
                if list.is_empty() {
                    self.terms.remove(term);
                }
            }
        }
        self.by_url.remove(&meta.url);
        self.by_age.remove(&(meta.crawled_at, meta.url.clone()));
        Some(meta)
    }

    fn over_cap(&self, cfg: &IndexConfig) -> bool {
        cfg.max_documents.is_some_and(|m| self.docs.len() > m) || cfg.max_terms.is_some_and(|m| self.terms.len() > m)
    }

    fn rebuild_lookups(&mut self) {
        self.by_url = self.docs.iter().map(|(id, m)| (m.url.clone(), *id)).collect();
        self.by_age = self.docs.values().map(|m| (m.crawled_at, m.url.clone())).collect();
    }

    /// Every posting points at a registered document and every document has postings.
    fn check_consistency(&self) -> Result<(), String> {
        let mut seen: BTreeSet<DocId> = BTreeSet::new();
        for (term, list) in &self.terms {
            for p in list {
                if !self.docs.contains_key(&p.doc_id) {
                    return Err(format!("term {term:?} references unknown document {}", p.doc_id));
                }
                seen.insert(p.doc_id);
            }
        }
        if seen.len() != self.docs.len() {
            return Err(format!("{} documents registered, {} referenced by postings", self.docs.len(), seen.len()));
        }
        if self.by_url.len() != self.docs.len() {
            return Err("duplicate URLs in document registry".into());
        }
        Ok(())
    }
}

/// Thread-safe term -> postings map with a document registry.
///
/// Writers take the exclusive lock; lookups and ranking share the read lock.
pub struct InvertedIndex {
    state: RwLock<IndexState>,
    config: IndexConfig,
    store: Option<SnapshotStore>,
    generation: AtomicU64,
}

impl InvertedIndex {
    pub fn new(config: IndexConfig) -> Result<Self, IndexError> {
        config.validate()?;
        let store = config.snapshot_path.as_ref().map(SnapshotStore::new);
        Ok(Self { state: RwLock::new(IndexState::default()), config, store, generation: AtomicU64::new(0) })
    }

    pub fn in_memory() -> Self {
        Self {
            state: RwLock::new(IndexState::default()),
            config: IndexConfig::default(),
            store: None,
            generation: AtomicU64::new(0),
        }
    }

    pub fn config(&self) -> &IndexConfig { &self.config }

    /// Insert or replace the document stored under `doc.url`.
    pub fn upsert(&self, doc: Document) -> Result<UpsertOutcome, IndexError> {
        let mut tf: BTreeMap<String, u32> = BTreeMap::new();
        for term in doc.terms {
            *tf.entry(term).or_insert(0) += 1;
        }

        if let Some(max) = self.config.max_terms.filter(|m| tf.len() > *m) {
            tracing::error!(url = %doc.url, terms = tf.len(), max_terms = max, "document alone exceeds the term cap");
            return Err(IndexError::EvictionPolicyViolation { documents: 1, terms: tf.len() });
        }

        let mut state = self.state.write();
        let replaced = match state.by_url.get(&doc.url).copied() {
            Some(old) => state.remove_doc(old).is_some(),
            None => false,
        };
        if tf.is_empty() {
            if replaced {
                self.generation.fetch_add(1, Ordering::Relaxed);
            }
            return Err(IndexError::EmptyDocument(doc.url));
        }

        let doc_id = state.next_doc_id;
        state.next_doc_id += 1;
        let length: u32 = tf.values().sum();
        for (term, count) in &tf {
            // ids only grow, so pushing keeps each list sorted by doc_id
            state.terms.entry(term.clone()).or_default().push(Posting { doc_id, tf: *count });
        }
        state.by_url.insert(doc.url.clone(), doc_id);
        state.by_age.insert((doc.crawled_at, doc.url.clone()));
        state.docs.insert(
            doc_id,
            DocMeta {
                url: doc.url,
                title: doc.title,
                text: doc.text,
                length,
                crawled_at: doc.crawled_at,
                terms: tf.into_keys().collect(),
            },
        );

        let evicted = self.evict(&mut state, doc_id);
        self.generation.fetch_add(1, Ordering::Relaxed);
        if state.over_cap(&self.config) {
            state.remove_doc(doc_id);
            let (documents, terms) = (state.docs.len(), state.terms.len());
            tracing::error!(documents, terms, "index still over capacity after eviction, upsert rolled back");
            return Err(IndexError::EvictionPolicyViolation { documents, terms });
        }
        Ok(UpsertOutcome { doc_id, replaced, evicted })
    }

    /// Evict oldest-first until under the caps. `keep` is never a candidate.
    fn evict(&self, state: &mut IndexState, keep: DocId) -> usize {
        let mut evicted = 0;
        while state.over_cap(&self.config) {
            let victim = state.by_age.iter().filter_map(|(_, url)| state.by_url.get(url).copied()).find(|id| *id != keep);
            let Some(id) = victim else { break };
            state.remove_doc(id);
            evicted += 1;
        }
        if evicted > 0 {
            tracing::info!(evicted, documents = state.docs.len(), terms = state.terms.len(), "evicted oldest documents");
        }
        evicted
    }

    /// Drop a URL and all of its postings. Returns whether it was present.
    pub fn remove(&self, url: &str) -> bool {
        let mut state = self.state.write();
        let Some(id) = state.by_url.get(url).copied() else { return false };
        state.remove_doc(id);
        self.generation.fetch_add(1, Ordering::Relaxed);
        true
    }

    pub fn lookup(&self, term: &str) -> Vec<Posting> {
        self.state.read().terms.get(term).cloned().unwrap_or_default()
    }

    pub fn get(&self, url: &str) -> Option<DocMeta> {
        let state = self.state.read();
        state.by_url.get(url).and_then(|id| state.docs.get(id)).cloned()
    }

    pub fn contains(&self, url: &str) -> bool { self.state.read().by_url.contains_key(url) }

    pub fn len(&self) -> usize { self.state.read().docs.len() }

    pub fn is_empty(&self) -> bool { self.len() == 0 }

    pub fn term_count(&self) -> usize { self.state.read().terms.len() }

    /// Bumped on every mutation; the flusher skips ticks where it has not moved.
    pub fn generation(&self) -> u64 { self.generation.load(Ordering::Relaxed) }

    pub fn stats(&self) -> IndexStats {
        let state = self.state.read();
        IndexStats {
            documents: state.docs.len(),
            terms: state.terms.len(),
            postings: state.terms.values().map(Vec::len).sum(),
            generation: self.generation(),
            oldest_crawl: state.by_age.iter().next().map(|(t, _)| *t),
            newest_crawl: state.by_age.iter().next_back().map(|(t, _)| *t),
        }
    }

    pub(crate) fn with_state<R>(&self, f: impl FnOnce(&IndexState) -> R) -> R {
        let state = self.state.read();
        f(&state)
    }

    /// Snapshot to disk. Only serialization happens under the read lock.
    pub fn flush(&self) -> Result<(), IndexError> {
        self.flush_generation().map(|_| ())
    }

    /// Like [`flush`](Self::flush), returning the generation that was written.
    pub fn flush_generation(&self) -> Result<u64, IndexError> {
        let Some(store) = &self.store else {
            return Ok(self.generation());
        };
        let (bytes, generation) = store.write_with(|| {
            let state = self.state.read();
            Ok((encode_snapshot(state.next_doc_id, &state.terms, &state.docs)?, self.generation()))
        })?;
        tracing::debug!(path = %store.path().display(), bytes, generation, "index flushed");
        Ok(generation)
    }

    /// Replace in-memory state with the snapshot. A missing snapshot loads as empty.
    ///
    /// On error the in-memory state is left untouched and the unreadable file is
    /// renamed to `<file>.corrupt`, so later flushes start a fresh snapshot
    /// instead of overwriting it.
    pub fn load(&self) -> Result<usize, IndexError> {
        let Some(store) = &self.store else { return Ok(self.len()) };
        let loaded = self.load_from(store);
        if loaded.is_err() {
            match store.quarantine() {
                Ok(aside) => tracing::warn!(path = %store.path().display(), moved_to = %aside.display(), "unreadable snapshot moved aside"),
                Err(err) => tracing::error!(path = %store.path().display(), error = %err, "could not move unreadable snapshot aside"),
            }
        }
        loaded
    }

    fn load_from(&self, store: &SnapshotStore) -> Result<usize, IndexError> {
        let Some(snap) = store.read()? else {
            tracing::info!(path = %store.path().display(), "no snapshot found, starting empty");
            return Ok(0);
        };
        let mut loaded = IndexState { next_doc_id: snap.next_doc_id, terms: snap.terms, docs: snap.docs, ..Default::default() };
        loaded.rebuild_lookups();
        loaded.check_consistency().map_err(IndexError::Corruption)?;
        if loaded.docs.keys().next_back().is_some_and(|max| *max >= loaded.next_doc_id) {
            return Err(IndexError::Corruption("document ids exceed allocator state".into()));
        }
        let count = loaded.docs.len();
        *self.state.write() = loaded;
        self.generation.fetch_add(1, Ordering::Relaxed);
        tracing::info!(path = %store.path().display(), documents = count, "index loaded");
        Ok(count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn doc(url: &str, text: &str, at: i64) -> Document {
        Document::new(url, "", text).with_crawled_at(at)
    }

    #[test]
    fn upsert_registers_postings() {
        let idx = InvertedIndex::in_memory();
        let out = idx.upsert(doc("https://a.test/", "rust rust tokio", 1)).unwrap();
        assert!(!out.replaced);
        assert_eq!(idx.lookup("rust"), vec![Posting { doc_id: out.doc_id, tf: 2 }]);
        assert_eq!(idx.get("https://a.test/").unwrap().length, 3);
    }

    #[test]
    fn reindex_replaces_postings() {
        let idx = InvertedIndex::in_memory();
        idx.upsert(doc("https://a.test/", "rust tokio", 1)).unwrap();
        let out = idx.upsert(doc("https://a.test/", "python", 2)).unwrap();
        assert!(out.replaced);
        assert!(idx.lookup("rust").is_empty());
        assert!(idx.lookup("tokio").is_empty());
        assert_eq!(idx.lookup("python").len(), 1);
        assert_eq!(idx.len(), 1);
    }

    #[test]
    fn empty_document_is_rejected_and_clears_prior_version() {
        let idx = InvertedIndex::in_memory();
        idx.upsert(doc("https://a.test/", "rust", 1)).unwrap();
        let err = idx.upsert(doc("https://a.test/", "the and of", 2)).unwrap_err();
        assert!(matches!(err, IndexError::EmptyDocument(_)));
        assert!(idx.is_empty());
        assert_eq!(idx.term_count(), 0);
    }

    #[test]
    fn remove_drops_everything_for_url() {
        let idx = InvertedIndex::in_memory();
        idx.upsert(doc("https://a.test/", "rust tokio", 1)).unwrap();
        idx.upsert(doc("https://b.test/", "rust", 1)).unwrap();
        assert!(idx.remove("https://a.test/"));
        assert!(!idx.remove("https://a.test/"));
        assert_eq!(idx.lookup("rust").len(), 1);
        assert!(idx.lookup("tokio").is_empty());
        assert_eq!(idx.len(), 1);
    }

    #[test]
    fn evicts_oldest_then_by_url() {
        let cfg = IndexConfig { max_documents: Some(2), ..Default::default() };
        let idx = InvertedIndex::new(cfg).unwrap();
        idx.upsert(doc("https://b.test/", "beta", 10)).unwrap();
        idx.upsert(doc("https://a.test/", "alpha", 10)).unwrap();
        let out = idx.upsert(doc("https://c.test/", "gamma", 20)).unwrap();
        assert_eq!(out.evicted, 1);
        assert!(!idx.contains("https://a.test/"));
        assert!(idx.contains("https://b.test/"));
        assert!(idx.contains("https://c.test/"));
    }

    #[test]
    fn term_cap_evicts_until_under() {
        let cfg = IndexConfig { max_terms: Some(3), ..Default::default() };
        let idx = InvertedIndex::new(cfg).unwrap();
        idx.upsert(doc("https://a.test/", "alpha beta", 1)).unwrap();
        let out = idx.upsert(doc("https://b.test/", "gamma delta", 2)).unwrap();
        assert_eq!(out.evicted, 1);
        assert_eq!(idx.term_count(), 2);
    }

    #[test]
    fn incoming_document_is_never_evicted() {
        let cfg = IndexConfig { max_documents: Some(1), ..Default::default() };
        let idx = InvertedIndex::new(cfg).unwrap();
        idx.upsert(doc("https://new.test/", "fresh", 20)).unwrap();
        let out = idx.upsert(doc("https://old.test/", "stale", 10)).unwrap();
        assert_eq!(out.evicted, 1);
        assert!(idx.contains("https://old.test/"));
        assert!(!idx.contains("https://new.test/"));
    }

    #[test]
    fn document_over_term_cap_is_rejected_and_index_kept() {
        let cfg = IndexConfig { max_terms: Some(3), ..Default::default() };
        let idx = InvertedIndex::new(cfg).unwrap();
        idx.upsert(doc("https://a.test/", "alpha beta", 1)).unwrap();
        let g = idx.generation();
        let err = idx.upsert(doc("https://b.test/", "gamma delta epsilon zeta", 2)).unwrap_err();
        assert!(matches!(err, IndexError::EvictionPolicyViolation { documents: 1, terms: 4 }));
        assert!(idx.contains("https://a.test/"));
        assert!(!idx.contains("https://b.test/"));
        assert_eq!(idx.term_count(), 2);
        assert_eq!(idx.generation(), g);
    }

    #[test]
    fn zero_caps_rejected() {
        let cfg = IndexConfig { max_documents: Some(0), ..Default::default() };
        assert!(matches!(InvertedIndex::new(cfg), Err(IndexError::Config(_))));
    }

    #[test]
    fn generation_moves_on_writes_only() {
        let idx = InvertedIndex::in_memory();
        let g0 = idx.generation();
        idx.upsert(doc("https://a.test/", "rust", 1)).unwrap();
        let g1 = idx.generation();
        assert!(g1 > g0);
        idx.lookup("rust");
        idx.stats();
        assert_eq!(idx.generation(), g1);
    }
}
