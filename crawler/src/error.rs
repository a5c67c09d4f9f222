/// Why a single page did not make it into the index. Never aborts a crawl.
#[derive(Debug, thiserror::Error)]
pub enum CrawlError {
    /// Network failure, timeout or non-2xx status.
    #[error("fetch failed for {url}: {reason}")]
    Fetch { url: String, reason: String },

    /// The response was not usable HTML or had no indexable text.
    #[error("parse failed for {url}: {reason}")]
    Parse { url: String, reason: String },

    #[error("config error: {0}")]
    Config(String),
}

impl CrawlError {
    pub(crate) fn fetch(url: &url::Url, reason: impl ToString) -> Self {
        Self::Fetch { url: url.to_string(), reason: reason.to_string() }
    }

    pub(crate) fn parse(url: &url::Url, reason: impl ToString) -> Self {
        Self::Parse { url: url.to_string(), reason: reason.to_string() }
    }
}
