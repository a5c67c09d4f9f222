//! URL normalization, deduplication and score blending across sources.

use search_core::SearchResult;
use std::cmp::Ordering;
use std::collections::HashSet;
use url::Url;

const TRACKING_PARAMS: &[&str] = &[
    "utm_source",
    "utm_medium",
    "utm_campaign",
    "utm_term",
    "utm_content",
    "fbclid",
    "gclid",
    "ref",
    "si",
    "feature",
];

/// Canonical form used to compare URLs across sources.
///
/// Lowercases scheme and host, drops default ports, fragments and tracking
/// parameters, sorts the remaining query and strips a trailing slash. Input
/// that does not parse is returned unchanged.
pub fn normalize_url(raw: &str) -> String {
    let Ok(mut parsed) = Url::parse(raw.trim()) else {
        return raw.to_string();
    };
    parsed.set_fragment(None);
    if matches!((parsed.scheme(), parsed.port()), ("http", Some(80)) | ("https", Some(443))) {
        let _ = parsed.set_port(None);
    }

    let mut params: Vec<(String, String)> = parsed
        .query_pairs()
        .filter(|(k, _)| !TRACKING_PARAMS.contains(&k.to_ascii_lowercase().as_str()))
        .map(|(k, v)| (k.into_owned(), v.into_owned()))
        .collect();
    params.sort();
    if params.is_empty() {
        parsed.set_query(None);
    } else {
        parsed.query_pairs_mut().clear().extend_pairs(params);
    }

    let path = parsed.path().to_string();
    if path.len() > 1 && path.ends_with('/') {
        parsed.set_path(path.trim_end_matches('/'));
    }

    let mut out = parsed.to_string();
    // root path
    if out.ends_with('/') {
        out.pop();
    }
    out
}

/// Drop later results whose normalized URL was already seen.
pub fn dedup(results: Vec<SearchResult>) -> Vec<SearchResult> {
    let mut seen = HashSet::new();
    results.into_iter().filter(|r| seen.insert(normalize_url(&r.url))).collect()
}

fn by_score_desc(a: &SearchResult, b: &SearchResult) -> Ordering {
    b.score.partial_cmp(&a.score).unwrap_or(Ordering::Equal)
}

/// Merge local and per-provider result lists into one ranked list.
///
/// Local scores are scaled so the best local hit scores `local_boost`; a
/// provider's `i`-th of `n` results scores `(1 - i/n) * external_boost`.
/// Local results come first in the dedup pass so a local hit always wins
/// over the same page from a provider. Equal blended scores keep merge order.
pub fn blend(local: Vec<SearchResult>, external: Vec<Vec<SearchResult>>, max_results: usize, local_boost: f64, external_boost: f64) -> Vec<SearchResult> {
    let top_local = local.iter().map(|r| r.score).fold(0.0_f64, f64::max);
    let mut merged: Vec<SearchResult> = local
        .into_iter()
        .map(|mut r| {
            let relative = if top_local > 0.0 { r.score / top_local } else { 1.0 };
            r.score = relative * local_boost;
            r
        })
        .collect();
    for list in external {
        let n = list.len() as f64;
        merged.extend(list.into_iter().enumerate().map(|(i, mut r)| {
            r.score = (1.0 - i as f64 / n) * external_boost;
            r
        }));
    }

    let mut merged = dedup(merged);
    merged.sort_by(by_score_desc);
    merged.truncate(max_results);
    renumber(&mut merged);
    merged
}

pub fn renumber(results: &mut [SearchResult]) {
    for (i, r) in results.iter_mut().enumerate() {
        r.position = i + 1;
    }
}
