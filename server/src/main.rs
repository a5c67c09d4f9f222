use anyhow::Result;
use axum::Router;
use clap::Parser;
use crawler::CrawlConfig;
use hybrid_search::{GoogleConfig, SearchConfig, SearchMode, SerpApiConfig};
use search_core::{IndexConfig, InvertedIndex, DEFAULT_FLUSH_INTERVAL};
use server::{build_app, SearchContext};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tracing_subscriber::{fmt, EnvFilter};

#[derive(Parser)]
struct Args {
    /// Index snapshot file
    #[arg(long, default_value = "./data/index.bin")]
    snapshot: String,
    /// Host to bind
    #[arg(long, default_value = "0.0.0.0")]
    host: String,
    /// Port to bind
    #[arg(long, default_value_t = 8080)]
    port: u16,
    /// Initial search mode: local, serpapi, google or hybrid
    #[arg(long, default_value = "hybrid")]
    mode: SearchMode,
    /// Background flush interval in seconds
    #[arg(long, default_value_t = DEFAULT_FLUSH_INTERVAL.as_secs())]
    flush_secs: u64,
    /// Per-source timeout in seconds
    #[arg(long, default_value_t = 5)]
    source_timeout_secs: u64,
    /// Result cache TTL in seconds, 0 disables the cache
    #[arg(long, default_value_t = 3600)]
    cache_ttl_secs: u64,
    /// Evict oldest documents beyond this many
    #[arg(long)]
    max_documents: Option<usize>,
    /// Evict oldest documents while the index holds more distinct terms
    #[arg(long)]
    max_terms: Option<usize>,
    /// Crawl worker pool width
    #[arg(long, default_value_t = 16)]
    concurrency: usize,
    /// Maximum pages per host in one crawl
    #[arg(long, default_value_t = 10)]
    max_per_host: usize,
}

fn env_key(name: &str) -> Option<String> {
    std::env::var(name).ok().map(|v| v.trim().to_string()).filter(|v| !v.is_empty())
}

fn search_config(args: &Args) -> SearchConfig {
    let serpapi = env_key("SERPAPI_KEY").map(SerpApiConfig::new);
    let google = match (env_key("GOOGLE_API_KEY"), env_key("GOOGLE_CSE_ID")) {
        (Some(key), Some(cx)) => Some(GoogleConfig::new(key, cx)),
        (Some(_), None) | (None, Some(_)) => {
            tracing::warn!("google needs both GOOGLE_API_KEY and GOOGLE_CSE_ID, provider disabled");
            None
        }
        (None, None) => None,
    };
    SearchConfig {
        default_mode: args.mode,
        source_timeout: Duration::from_secs(args.source_timeout_secs),
        cache_ttl: Duration::from_secs(args.cache_ttl_secs),
        serpapi,
        google,
        ..Default::default()
    }
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %err, "failed to listen for shutdown signal");
    }
    tracing::info!("shutting down");
}

#[tokio::main]
async fn main() -> Result<()> {
    fmt().with_env_filter(EnvFilter::from_default_env()).init();
    let args = Args::parse();

    let index = Arc::new(InvertedIndex::new(IndexConfig {
        snapshot_path: Some(args.snapshot.clone().into()),
        max_documents: args.max_documents,
        max_terms: args.max_terms,
    })?);
    match index.load() {
        Ok(documents) => tracing::info!(documents, snapshot = %args.snapshot, "index loaded"),
        Err(err) => tracing::error!(error = %err, snapshot = %args.snapshot, "could not load snapshot, starting with an empty index"),
    }

    let crawl = CrawlConfig { concurrency: args.concurrency, max_per_host: args.max_per_host, ..Default::default() };
    let ctx = Arc::new(SearchContext::new(index, search_config(&args), crawl)?);
    ctx.start_flusher(Duration::from_secs(args.flush_secs))?;
    let app: Router = build_app(ctx.clone());

    let addr: SocketAddr = format!("{}:{}", args.host, args.port).parse()?;
    let listener = TcpListener::bind(addr).await?;
    tracing::info!(%addr, mode = %ctx.manager.mode(), "server listening");
    axum::serve(listener, app).with_graceful_shutdown(shutdown_signal()).await?;

    ctx.shutdown()?;
    Ok(())
}
