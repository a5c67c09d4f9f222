use anyhow::Result;
use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use crawler::{CrawlConfig, CrawlReport, Crawler};
use hybrid_search::{Filters, SearchConfig, SearchError, SearchManager, SearchMode, SearchResponse, TimeRange};
use parking_lot::Mutex;
use search_core::{Flusher, InvertedIndex, SearchResult, Source};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tower_http::trace::TraceLayer;

const MAX_K: usize = 100;

/// Everything a request handler needs, built once at startup.
pub struct SearchContext {
    pub index: Arc<InvertedIndex>,
    pub manager: SearchManager,
    pub crawler: Crawler,
    flusher: Mutex<Option<Flusher>>,
}

impl SearchContext {
    pub fn new(index: Arc<InvertedIndex>, search: SearchConfig, crawl: CrawlConfig) -> Result<Self> {
        let manager = SearchManager::new(search, index.clone())?;
        let crawler = Crawler::new(index.clone(), crawl)?;
        Ok(Self { index, manager, crawler, flusher: Mutex::new(None) })
    }

    /// Start periodic snapshotting of the index.
    pub fn start_flusher(&self, interval: Duration) -> Result<()> {
        let mut slot = self.flusher.lock();
        if slot.is_none() {
            *slot = Some(Flusher::spawn(self.index.clone(), interval)?);
        }
        Ok(())
    }

    /// Stop the flusher and write the final snapshot.
    pub fn shutdown(&self) -> Result<()> {
        let flusher = self.flusher.lock().take();
        match flusher {
            Some(flusher) => flusher.shutdown()?,
            None => self.index.flush()?,
        }
        tracing::info!(documents = self.index.len(), "index flushed on shutdown");
        Ok(())
    }
}

#[derive(Debug)]
pub struct ApiError(StatusCode, String);

impl ApiError {
    fn bad_request(message: impl Into<String>) -> Self { Self(StatusCode::BAD_REQUEST, message.into()) }
}

impl From<SearchError> for ApiError {
    fn from(err: SearchError) -> Self {
        let status = match err {
            SearchError::InvalidMode(_) | SearchError::Config(_) => StatusCode::BAD_REQUEST,
            SearchError::SourceUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            _ => StatusCode::BAD_GATEWAY,
        };
        Self(status, err.to_string())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.0, Json(json!({ "error": self.1 }))).into_response()
    }
}

#[derive(Deserialize)]
pub struct SearchParams {
    pub q: String,
    pub mode: Option<String>,
    #[serde(default = "default_k")]
    pub k: usize,
    pub site: Option<String>,
    /// `d`, `w`, `m` or `y`
    pub since: Option<String>,
    /// Comma-separated source names.
    pub sources: Option<String>,
}
fn default_k() -> usize { 10 }

impl SearchParams {
    fn filters(&self) -> Result<Filters, ApiError> {
        let time_range = match self.since.as_deref().map(str::trim).filter(|s| !s.is_empty()) {
            Some(s) => Some(s.parse::<TimeRange>()?),
            None => None,
        };
        let sources = match self.sources.as_deref().map(str::trim).filter(|s| !s.is_empty()) {
            Some(list) => Some(
                list.split(',')
                    .filter(|s| !s.trim().is_empty())
                    .map(|s| s.parse::<Source>().map_err(ApiError::bad_request))
                    .collect::<Result<BTreeSet<Source>, ApiError>>()?,
            ),
            None => None,
        };
        Ok(Filters { time_range, site: self.site.clone(), sources })
    }
}

#[derive(Serialize)]
pub struct SearchBody {
    pub query: String,
    pub took_s: f64,
    pub total_hits: usize,
    pub results: Vec<SearchResult>,
    pub metadata: hybrid_search::SearchMetadata,
}

#[derive(Deserialize)]
pub struct ModeRequest {
    pub mode: String,
}

#[derive(Deserialize)]
pub struct CrawlRequest {
    pub urls: Vec<String>,
    #[serde(default = "default_depth")]
    pub max_depth: usize,
}
fn default_depth() -> usize { 1 }

#[derive(Deserialize)]
pub struct DocParams {
    pub url: String,
}

fn cors_layer() -> CorsLayer {
    // CORS: read CORS_ALLOW_ORIGIN (comma-separated) or allow Any by default
    match std::env::var("CORS_ALLOW_ORIGIN") {
        Ok(val) => {
            let origins: Vec<_> = val.split(',').filter_map(|s| s.trim().parse().ok()).collect();
            if origins.is_empty() {
                CorsLayer::new().allow_origin(Any).allow_methods(Any).allow_headers(Any)
            } else {
                CorsLayer::new().allow_origin(AllowOrigin::list(origins)).allow_methods(Any).allow_headers(Any)
            }
        }
        Err(_) => CorsLayer::new().allow_origin(Any).allow_methods(Any).allow_headers(Any),
    }
}

pub fn build_app(ctx: Arc<SearchContext>) -> Router {
    Router::new()
        .route("/health", get(health_handler))
        .route("/search", get(search_handler))
        .route("/stats", get(stats_handler))
        .route("/mode", post(mode_handler))
        .route("/crawl", post(crawl_handler))
        .route("/doc", get(doc_handler))
        .with_state(ctx)
        .layer(TraceLayer::new_for_http())
        .layer(cors_layer())
}

async fn health_handler(State(ctx): State<Arc<SearchContext>>) -> Json<Value> {
    Json(json!({ "status": "ok", "documents": ctx.index.len(), "mode": ctx.manager.mode() }))
}

pub async fn search_handler(State(ctx): State<Arc<SearchContext>>, Query(params): Query<SearchParams>) -> Result<Json<SearchBody>, ApiError> {
    let start = std::time::Instant::now();
    let mode = match params.mode.as_deref().map(str::trim).filter(|s| !s.is_empty()) {
        Some(m) => Some(m.parse::<SearchMode>()?),
        None => None,
    };
    let filters = params.filters()?;
    let k = params.k.clamp(1, MAX_K);

    let SearchResponse { results, metadata } = ctx.manager.search(&params.q, mode, k, &filters).await?;
    Ok(Json(SearchBody { query: params.q, took_s: start.elapsed().as_secs_f64(), total_hits: results.len(), results, metadata }))
}

async fn stats_handler(State(ctx): State<Arc<SearchContext>>) -> Json<Value> {
    Json(json!({
        "search": ctx.manager.stats(),
        "index": ctx.index.stats(),
        "crawler": ctx.crawler.stats(),
    }))
}

async fn mode_handler(State(ctx): State<Arc<SearchContext>>, Json(req): Json<ModeRequest>) -> Result<Json<Value>, ApiError> {
    let mode: SearchMode = req.mode.parse()?;
    ctx.manager.set_mode(mode)?;
    Ok(Json(json!({ "mode": ctx.manager.mode() })))
}

async fn crawl_handler(State(ctx): State<Arc<SearchContext>>, Json(req): Json<CrawlRequest>) -> Result<Json<CrawlReport>, ApiError> {
    if req.urls.iter().all(|u| u.trim().is_empty()) {
        return Err(ApiError::bad_request("urls must not be empty"));
    }
    let report = ctx.crawler.crawl(&req.urls, req.max_depth).await;
    if report.indexed > 0 {
        // cached local hits are stale now
        ctx.manager.clear_cache();
    }
    Ok(Json(report))
}

async fn doc_handler(State(ctx): State<Arc<SearchContext>>, Query(params): Query<DocParams>) -> Result<Json<Value>, ApiError> {
    match ctx.index.get(&params.url) {
        Some(meta) => Ok(Json(json!({
            "url": meta.url,
            "title": meta.title,
            "text": meta.text,
            "length": meta.length,
            "crawled_at": meta.crawled_at,
        }))),
        None => Err(ApiError(StatusCode::NOT_FOUND, "not found".into())),
    }
}
