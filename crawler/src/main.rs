use anyhow::{anyhow, Result};
use clap::{ArgAction, Parser};
use crawler::{CrawlConfig, Crawler};
use search_core::{Flusher, IndexConfig, InvertedIndex, DEFAULT_FLUSH_INTERVAL};
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::{fmt, EnvFilter};

#[derive(Parser, Debug)]
#[command(name = "crawler")]
#[command(about = "Crawl the web straight into the search index snapshot")]
struct Cli {
    /// Path to a file with seed URLs (one per line)
    #[arg(long)]
    seeds: String,
    /// Index snapshot file, loaded first and rewritten on exit
    #[arg(long, default_value = "./data/index.bin")]
    snapshot: String,
    /// How many link hops to follow from the seeds
    #[arg(long, default_value_t = 2)]
    max_depth: usize,
    /// Maximum number of pages to fetch
    #[arg(long, default_value_t = 1_000)]
    max_pages: usize,
    /// Maximum pages to crawl per host (politeness)
    #[arg(long, default_value_t = 10)]
    max_per_host: usize,
    /// Concurrency (number of workers)
    #[arg(long, default_value_t = 16)]
    concurrency: usize,
    /// Request timeout seconds
    #[arg(long, default_value_t = 12)]
    timeout_secs: u64,
    /// User-Agent string to use for robots.txt and crawling
    #[arg(long, default_value = "search-engine-rs-bot/0.1 (+https://example.com/bot)")]
    user_agent: String,
    /// Only follow links that remain on the same host as the page
    #[arg(long, action = ArgAction::Set, default_value_t = true)]
    same_host_only: bool,
    /// Check robots.txt before fetching
    #[arg(long, action = ArgAction::Set, default_value_t = true)]
    respect_robots: bool,
    /// Longest robots.txt Crawl-delay to honor, in seconds (capped at the timeout)
    #[arg(long, default_value_t = 10)]
    max_crawl_delay_secs: u64,
    /// Evict oldest documents beyond this many
    #[arg(long)]
    max_documents: Option<usize>,
    /// Background flush interval in seconds
    #[arg(long, default_value_t = DEFAULT_FLUSH_INTERVAL.as_secs())]
    flush_secs: u64,
}

fn read_seeds(path: &str) -> Result<Vec<String>> {
    let mut seeds = Vec::new();
    for line in BufReader::new(File::open(path)?).lines() {
        let s = line?.trim().to_string();
        if s.is_empty() || s.starts_with('#') { continue; }
        seeds.push(s);
    }
    Ok(seeds)
}

#[tokio::main]
async fn main() -> Result<()> {
    fmt().with_env_filter(EnvFilter::from_default_env()).init();
    let args = Cli::parse();

    let seeds = read_seeds(&args.seeds)?;
    if seeds.is_empty() { return Err(anyhow!("no valid seeds")); }

    let index = Arc::new(InvertedIndex::new(IndexConfig {
        snapshot_path: Some(args.snapshot.clone().into()),
        max_documents: args.max_documents,
        max_terms: None,
    })?);
    if let Err(err) = index.load() {
        tracing::error!(error = %err, snapshot = %args.snapshot, "could not load snapshot, starting with an empty index");
    }
    let flusher = Flusher::spawn(index.clone(), Duration::from_secs(args.flush_secs))?;

    let config = CrawlConfig {
        concurrency: args.concurrency,
        max_per_host: args.max_per_host,
        max_pages: args.max_pages,
        timeout: Duration::from_secs(args.timeout_secs),
        user_agent: args.user_agent,
        same_host_only: args.same_host_only,
        respect_robots: args.respect_robots,
        max_crawl_delay: Duration::from_secs(args.max_crawl_delay_secs),
        ..Default::default()
    };
    let crawler = Crawler::new(index.clone(), config)?;
    let report = crawler.crawl(&seeds, args.max_depth).await;

    flusher.shutdown()?;
    tracing::info!(
        indexed = report.indexed,
        failed = report.failed,
        skipped = report.skipped,
        documents = index.len(),
        snapshot = %args.snapshot,
        "done"
    );
    Ok(())
}
