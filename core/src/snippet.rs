use regex::{Regex, RegexBuilder};

const CONTEXT_BEFORE: usize = 100;
const CONTEXT_AFTER: usize = 200;
const FALLBACK_CHARS: usize = 200;

fn match_any(words: &[String]) -> Option<Regex> {
    let mut words: Vec<&str> = words.iter().map(|w| w.trim()).filter(|w| !w.is_empty()).collect();
    if words.is_empty() { return None; }
    // longest first so "python" beats "py" inside the alternation
    words.sort_by_key(|w| std::cmp::Reverse(w.len()));
    let pattern = words.iter().map(|w| regex::escape(w)).collect::<Vec<_>>().join("|");
    RegexBuilder::new(&pattern).case_insensitive(true).build().ok()
}

fn floor_boundary(s: &str, mut i: usize) -> usize {
    i = i.min(s.len());
    while !s.is_char_boundary(i) { i -= 1; }
    i
}

fn ceil_boundary(s: &str, mut i: usize) -> usize {
    i = i.min(s.len());
    while !s.is_char_boundary(i) { i += 1; }
    i
}

/// Window of `text` around the first occurrence of any of `words`, with matches wrapped in `<em>`.
/// Falls back to the leading characters when nothing matches.
pub fn snippet(text: &str, words: &[String]) -> String {
    let text = text.split_whitespace().collect::<Vec<_>>().join(" ");
    if text.is_empty() { return String::new(); }
    let re = match_any(words);
    let window = match re.as_ref().and_then(|re| re.find(&text)) {
        Some(m) => {
            let start = floor_boundary(&text, m.start().saturating_sub(CONTEXT_BEFORE));
            let end = ceil_boundary(&text, m.start() + CONTEXT_AFTER);
            &text[start..end]
        }
        None => {
            let end = text.char_indices().nth(FALLBACK_CHARS).map_or(text.len(), |(i, _)| i);
            &text[..end]
        }
    };
    match re {
        Some(re) => re.replace_all(window, |caps: &regex::Captures| format!("<em>{}</em>", &caps[0])).into_owned(),
        None => window.to_string(),
    }
}
