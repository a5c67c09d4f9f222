//! Error types for the index, its snapshots and the ranker.

/// Errors raised by [`crate::InvertedIndex`] and its persistence layer.
#[derive(Debug, thiserror::Error)]
pub enum IndexError {
    /// Writing a snapshot (or its temporary file) failed.
    #[error("snapshot I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The snapshot on disk could not be read or decoded.
    #[error("index snapshot is corrupt: {0}")]
    Corruption(String),

    /// Encoding the in-memory index failed.
    #[error("snapshot encoding failed: {0}")]
    Encode(String),

    /// The document produced no terms after tokenization.
    #[error("document has no indexable terms: {0}")]
    EmptyDocument(String),

    /// The index is still above its configured cap after evicting.
    #[error("index exceeds its cap after eviction: {documents} documents, {terms} terms")]
    EvictionPolicyViolation { documents: usize, terms: usize },

    /// Invalid index configuration.
    #[error("config error: {0}")]
    Config(String),
}
