//! Query operators for local search.
//!
//! Supported syntax, mixed freely with plain words:
//!
//! - `"exact phrase"`: the words must appear consecutively (stopwords inside
//!   the quotes keep their slot).
//! - `-word` or `NOT word`: documents containing the word are dropped.
//! - `+word` or `a AND b`: every such word must be present.
//! - `site:example.com`: host restriction, same rule as [`LocalFilter::site`].
//! - `OR` is accepted and ignored; plain words are already optional.
//!
//! Operators only decide which documents are candidates. Scoring still uses
//! every positive term (plain, required and phrase words).
//!
//! [`LocalFilter::site`]: crate::LocalFilter

use crate::index::DocMeta;
use crate::tokenizer;
use lazy_static::lazy_static;
use regex::Regex;

lazy_static! {
    static ref PHRASE: Regex = Regex::new(r#""([^"]*)""#).expect("valid regex");
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ParsedQuery {
    /// Positive terms used for scoring.
    pub terms: Vec<String>,
    pub required: Vec<String>,
    pub excluded: Vec<String>,
    /// Phrase terms with their offsets from the first phrase word.
    pub phrases: Vec<Vec<(String, usize)>>,
    pub site: Option<String>,
    /// Raw positive words, for snippet highlighting.
    pub words: Vec<String>,
}

impl ParsedQuery {
    /// No operator beyond plain words.
    pub fn is_simple(&self) -> bool {
        self.required.is_empty() && self.excluded.is_empty() && self.phrases.is_empty() && self.site.is_none()
    }

    /// Term-set constraints: required present, excluded absent.
    pub(crate) fn admits_terms(&self, meta: &DocMeta) -> bool {
        let has = |t: &String| meta.terms.binary_search(t).is_ok();
        self.required.iter().all(has) && !self.excluded.iter().any(has)
    }

    /// Every phrase occurs in the title or text.
    pub(crate) fn admits_phrases(&self, meta: &DocMeta) -> bool {
        if self.phrases.is_empty() {
            return true;
        }
        let tokens = tokenizer::tokenize(&format!("{}\n{}", meta.title, meta.text));
        self.phrases.iter().all(|phrase| contains_phrase(&tokens, phrase))
    }
}

fn contains_phrase(tokens: &[(String, usize)], phrase: &[(String, usize)]) -> bool {
    let Some((first, _)) = phrase.first() else { return true };
    tokens.iter().filter(|(t, _)| t == first).any(|(_, start)| {
        phrase[1..].iter().all(|(term, offset)| tokens.iter().any(|(t, p)| t == term && *p == start + offset))
    })
}

fn strip_word(word: &str) -> &str {
    word.trim_matches(|c: char| !c.is_alphanumeric())
}

pub fn parse_query(query: &str) -> ParsedQuery {
    let mut parsed = ParsedQuery::default();

    for cap in PHRASE.captures_iter(query) {
        let text = cap.get(1).map_or("", |m| m.as_str());
        let tokens = tokenizer::tokenize(text);
        let Some(base) = tokens.first().map(|(_, p)| *p) else { continue };
        parsed.phrases.push(tokens.iter().map(|(t, p)| (t.clone(), p - base)).collect());
        parsed.terms.extend(tokens.into_iter().map(|(t, _)| t));
        parsed.words.extend(text.split_whitespace().map(str::to_string));
    }
    let rest = PHRASE.replace_all(query, " ");
    // an unmatched quote is just punctuation
    let words: Vec<&str> = rest.split_whitespace().map(|w| w.trim_matches('"')).filter(|w| !w.is_empty()).collect();

    let mut i = 0;
    while i < words.len() {
        let word = words[i];
        let next = words.get(i + 1).copied();
        match word {
            "NOT" if next.is_some() => {
                parsed.excluded.extend(tokenizer::terms(next.unwrap_or_default()));
                i += 2;
                continue;
            }
            "AND" => {
                if let Some(next) = next {
                    parsed.add_required(next);
                    i += 2;
                    continue;
                }
            }
            "OR" | "NOT" => {}
            _ if words.get(i + 1) == Some(&"AND") => parsed.add_required(word),
            _ => parsed.add_word(word),
        }
        i += 1;
    }

    parsed.terms.sort();
    parsed.terms.dedup();
    parsed.required.sort();
    parsed.required.dedup();
    parsed.excluded.sort();
    parsed.excluded.dedup();
    // a term both required and excluded can never match; exclusion wins
    parsed.required.retain(|t| parsed.excluded.binary_search(t).is_err());
    parsed
}

impl ParsedQuery {
    fn add_required(&mut self, word: &str) {
        let word = strip_word(word.trim_start_matches('+'));
        let terms = tokenizer::terms(word);
        self.required.extend(terms.iter().cloned());
        self.terms.extend(terms);
        if !word.is_empty() {
            self.words.push(word.to_string());
        }
    }

    fn add_word(&mut self, word: &str) {
        if let Some(site) = word.strip_prefix("site:") {
            let site = site.trim().trim_end_matches('/');
            if !site.is_empty() {
                self.site = Some(site.to_ascii_lowercase());
            }
        } else if let Some(excluded) = word.strip_prefix('-').filter(|w| !w.is_empty()) {
            self.excluded.extend(tokenizer::terms(excluded));
        } else if word.starts_with('+') {
            self.add_required(word);
        } else {
            self.terms.extend(tokenizer::terms(word));
            let word = strip_word(word);
            if !word.is_empty() {
                self.words.push(word.to_string());
            }
        }
    }
}
