//! Error types for search orchestration and provider clients.
//!
//! Messages never include API keys.

use search_core::Source;

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum SearchError {
    /// The provider answered but reported an error in its payload.
    #[error("{provider} error: {message}")]
    Provider { provider: Source, message: String },

    #[error("HTTP error: {0}")]
    Http(String),

    #[error("{0} timed out")]
    Timeout(Source),

    #[error("{0} quota exceeded")]
    Quota(Source),

    #[error("parse error: {0}")]
    Parse(String),

    #[error("config error: {0}")]
    Config(String),

    #[error("invalid search mode: {0}")]
    InvalidMode(String),

    /// The mode needs a provider that is not configured.
    #[error("{0} is not configured")]
    SourceUnavailable(Source),
}

pub type Result<T> = std::result::Result<T, SearchError>;

impl From<reqwest::Error> for SearchError {
    fn from(err: reqwest::Error) -> Self {
        // without_url keeps query strings (and keys) out of messages
        Self::Http(err.without_url().to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_messages() {
        let err = SearchError::Provider { provider: Source::Serpapi, message: "Invalid API key".into() };
        assert_eq!(err.to_string(), "serpapi error: Invalid API key");
        assert_eq!(SearchError::Timeout(Source::Google).to_string(), "google timed out");
        assert_eq!(SearchError::Quota(Source::Google).to_string(), "google quota exceeded");
        assert_eq!(SearchError::InvalidMode("bing".into()).to_string(), "invalid search mode: bing");
        assert_eq!(SearchError::SourceUnavailable(Source::Serpapi).to_string(), "serpapi is not configured");
    }

    #[test]
    fn error_is_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<SearchError>();
    }
}
