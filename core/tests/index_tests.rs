use search_core::tokenizer::terms;
use search_core::{Document, IndexConfig, IndexError, InvertedIndex, Ranker};
use std::fs;
use std::sync::Arc;
use std::thread;
use tempfile::tempdir;

fn persistent(path: &std::path::Path) -> InvertedIndex {
    InvertedIndex::new(IndexConfig::persistent(path)).unwrap()
}

#[test]
fn reindexed_url_keeps_a_single_posting_set() {
    let idx = InvertedIndex::in_memory();
    idx.upsert(Document::new("https://a.test/", "v1", "rust memory safety")).unwrap();
    idx.upsert(Document::new("https://a.test/", "v2", "rust fearless concurrency")).unwrap();

    assert_eq!(idx.len(), 1);
    assert_eq!(idx.lookup("rust").len(), 1);
    assert!(idx.lookup(&terms("safety")[0]).is_empty());
    assert_eq!(idx.get("https://a.test/").unwrap().title, "v2");
}

#[test]
fn disjoint_query_ranks_nothing() {
    let idx = Arc::new(InvertedIndex::in_memory());
    idx.upsert(Document::new("https://a.test/", "", "rust tokio")).unwrap();
    idx.upsert(Document::new("https://b.test/", "", "serde bincode")).unwrap();
    let ranker = Ranker::new(idx);
    assert!(ranker.rank(&["haskell".to_string(), "ocaml".to_string()], 10).is_empty());
}

#[test]
fn python_corpus_ranks_both_matches_by_tfidf() {
    let idx = Arc::new(InvertedIndex::in_memory());
    idx.upsert(Document::new("https://one.test/", "", "python python scripting language")).unwrap();
    idx.upsert(Document::new("https://two.test/", "", "python snakes live in warm jungles near rivers")).unwrap();
    idx.upsert(Document::new("https://three.test/", "", "rust systems programming")).unwrap();

    let hits = Ranker::new(idx).rank(&["python".to_string()], 10);
    let urls: Vec<&str> = hits.iter().map(|h| h.url.as_str()).collect();
    assert_eq!(urls, vec!["https://one.test/", "https://two.test/"]);
    assert!(hits[0].score > hits[1].score);
    assert!(hits[1].score > 0.0);
}

#[test]
fn consecutive_flushes_are_byte_identical() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("index.bin");
    let idx = persistent(&path);
    for i in 0..20 {
        idx.upsert(Document::new(format!("https://site{i}.test/"), "", format!("term{i} shared words here"))).unwrap();
    }
    idx.flush().unwrap();
    let first = fs::read(&path).unwrap();
    idx.flush().unwrap();
    let second = fs::read(&path).unwrap();
    assert_eq!(first, second);
}

#[test]
fn concurrent_upserts_survive_flush_and_reload() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("index.bin");
    let idx = Arc::new(persistent(&path));

    let handles: Vec<_> = (0..16)
        .map(|i| {
            let idx = idx.clone();
            thread::spawn(move || {
                idx.upsert(Document::new(format!("https://w{i}.test/"), "", format!("common unique{i}"))).unwrap();
            })
        })
        .collect();
    for h in handles {
        h.join().unwrap();
    }
    idx.flush().unwrap();

    let reloaded = Arc::new(persistent(&path));
    assert_eq!(reloaded.load().unwrap(), 16);
    assert_eq!(reloaded.lookup(&terms("common")[0]).len(), 16);

    let ranker = Ranker::new(reloaded);
    for i in 0..16 {
        let hits = ranker.rank(&terms(&format!("unique{i}")), 5);
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].url, format!("https://w{i}.test/"));
        assert!(hits[0].score > 0.0);
    }
}

#[test]
fn reload_continues_id_allocation() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("index.bin");
    let idx = persistent(&path);
    let first = idx.upsert(Document::new("https://a.test/", "", "alpha")).unwrap();
    idx.flush().unwrap();

    let reloaded = persistent(&path);
    reloaded.load().unwrap();
    let second = reloaded.upsert(Document::new("https://b.test/", "", "beta")).unwrap();
    assert!(second.doc_id > first.doc_id);
}

#[test]
fn corrupt_snapshot_leaves_index_empty() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("index.bin");
    fs::write(&path, [0xffu8; 64]).unwrap();

    let idx = persistent(&path);
    let err = idx.load().unwrap_err();
    assert!(matches!(err, IndexError::Corruption(_)));
    assert!(idx.is_empty());

    // the bad file is kept aside and the index stays usable
    let aside = dir.path().join("index.bin.corrupt");
    assert_eq!(fs::read(&aside).unwrap(), vec![0xffu8; 64]);
    idx.upsert(Document::new("https://a.test/", "", "recovered")).unwrap();
    idx.flush().unwrap();
    assert_eq!(persistent(&path).load().unwrap(), 1);
    assert_eq!(fs::read(&aside).unwrap(), vec![0xffu8; 64]);
}

#[test]
fn concurrent_flushes_leave_the_newest_snapshot() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("index.bin");
    let idx = Arc::new(persistent(&path));

    let handles: Vec<_> = (0..8)
        .map(|w| {
            let idx = idx.clone();
            thread::spawn(move || {
                for i in 0..20 {
                    idx.upsert(Document::new(format!("https://w{w}-{i}.test/"), "", format!("page{w}x{i} shared"))).unwrap();
                    idx.flush().unwrap();
                }
            })
        })
        .collect();
    for h in handles {
        h.join().unwrap();
    }

    assert_eq!(persistent(&path).load().unwrap(), 160);
}
