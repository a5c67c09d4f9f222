//! Local search substrate: tokenizer, thread-safe inverted index with atomic
//! snapshots and a background flusher, and a TF-IDF ranker with query operators.

pub mod error;
pub mod flush;
pub mod index;
pub mod persist;
pub mod query;
pub mod ranker;
pub mod result;
pub mod snippet;
pub mod tokenizer;

pub use error::IndexError;
pub use flush::Flusher;
pub use index::{now_millis, DocId, DocMeta, Document, IndexConfig, IndexStats, InvertedIndex, Posting, UpsertOutcome, DEFAULT_FLUSH_INTERVAL};
pub use query::{parse_query, ParsedQuery};
pub use ranker::{LocalFilter, Ranker};
pub use result::{SearchResult, Source};
