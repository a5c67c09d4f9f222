use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Where a search result came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Source {
    Local,
    Serpapi,
    Google,
}

impl Source {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Local => "local",
            Self::Serpapi => "serpapi",
            Self::Google => "google",
        }
    }

    pub fn is_external(&self) -> bool { !matches!(self, Self::Local) }

    pub fn all() -> &'static [Source] { &[Self::Local, Self::Serpapi, Self::Google] }
}

impl fmt::Display for Source {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { f.write_str(self.name()) }
}

impl FromStr for Source {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "local" => Ok(Self::Local),
            "serpapi" => Ok(Self::Serpapi),
            "google" => Ok(Self::Google),
            other => Err(format!("unknown source: {other}")),
        }
    }
}

/// A single ranked hit, produced per query and never persisted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchResult {
    pub title: String,
    pub url: String,
    pub snippet: String,
    pub score: f64,
    pub source: Source,
    /// 1-based rank within the list it was returned in.
    pub position: usize,
}
