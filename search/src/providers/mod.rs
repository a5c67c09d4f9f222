//! External provider clients.

pub mod google;
pub mod serpapi;

pub use google::GoogleClient;
pub use serpapi::SerpApiClient;
