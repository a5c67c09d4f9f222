use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use search_core::{now_millis, Document, IndexConfig, IndexError, InvertedIndex};
use serde::Deserialize;
use time::format_description::well_known::Rfc3339;
use tracing_subscriber::{fmt, EnvFilter};
use walkdir::WalkDir;

use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};

#[derive(Debug, Deserialize)]
struct InputDoc {
    id: String,
    #[serde(default)]
    title: String,
    body: String,
    url: Option<String>,
    /// RFC3339; documents without one are stamped at ingest time
    timestamp: Option<String>,
}

impl InputDoc {
    fn into_document(self) -> Document {
        let crawled_at = self
            .timestamp
            .as_deref()
            .and_then(|ts| time::OffsetDateTime::parse(ts, &Rfc3339).ok())
            .map(|t| (t.unix_timestamp_nanos() / 1_000_000) as i64)
            .unwrap_or_else(now_millis);
        let url = self.url.unwrap_or(self.id);
        Document::new(url, self.title, self.body).with_crawled_at(crawled_at)
    }
}

#[derive(Parser)]
#[command(name = "indexer")]
#[command(about = "Add, remove and inspect documents in the search index snapshot", long_about = None)]
struct Cli {
    /// Index snapshot file
    #[arg(long, global = true, default_value = "./data/index.bin")]
    snapshot: String,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Upsert documents from JSON/JSONL files or a directory of them
    Add {
        /// Input path (file or directory)
        #[arg(long)]
        input: String,
        /// Evict oldest documents beyond this many
        #[arg(long)]
        max_documents: Option<usize>,
    },
    /// Remove a document by URL
    Remove {
        #[arg(long)]
        url: String,
    },
    /// Print index statistics as JSON
    Stats,
}

#[derive(Debug, Default, PartialEq, Eq)]
struct IngestReport {
    upserted: usize,
    replaced: usize,
    empty: usize,
}

fn main() -> Result<()> {
    fmt().with_env_filter(EnvFilter::from_default_env()).init();
    let cli = Cli::parse();

    match cli.command {
        Commands::Add { input, max_documents } => {
            let index = open(&cli.snapshot, max_documents)?;
            let report = ingest_path(&index, Path::new(&input))?;
            index.flush()?;
            tracing::info!(upserted = report.upserted, replaced = report.replaced, empty = report.empty, documents = index.len(), "ingest complete");
        }
        Commands::Remove { url } => {
            let index = open(&cli.snapshot, None)?;
            if index.remove(&url) {
                index.flush()?;
                tracing::info!(%url, "document removed");
            } else {
                tracing::warn!(%url, "document not in index");
            }
        }
        Commands::Stats => {
            let index = open(&cli.snapshot, None)?;
            println!("{}", serde_json::to_string_pretty(&index.stats())?);
        }
    }
    Ok(())
}

fn open(snapshot: &str, max_documents: Option<usize>) -> Result<InvertedIndex> {
    let index = InvertedIndex::new(IndexConfig { snapshot_path: Some(snapshot.into()), max_documents, max_terms: None })?;
    index.load().with_context(|| format!("loading snapshot {snapshot}"))?;
    Ok(index)
}

fn collect_files(input_path: &Path) -> Vec<PathBuf> {
    let mut files: Vec<PathBuf> = Vec::new();
    if input_path.is_dir() {
        for entry in WalkDir::new(input_path).sort_by_file_name().into_iter().filter_map(|e| e.ok()) {
            let p = entry.path();
            if p.is_file() && matches!(p.extension().and_then(|s| s.to_str()), Some("json" | "jsonl")) {
                files.push(p.to_path_buf());
            }
        }
    } else if input_path.is_file() {
        files.push(input_path.to_path_buf());
    }
    files
}

fn ingest_path(index: &InvertedIndex, input_path: &Path) -> Result<IngestReport> {
    let mut report = IngestReport::default();
    for file in collect_files(input_path) {
        let docs = if file.extension().and_then(|s| s.to_str()) == Some("jsonl") { read_jsonl(&file)? } else { read_json(&file)? };
        for doc in docs {
            ingest_doc(index, doc, &mut report)?;
        }
    }
    Ok(report)
}

fn read_jsonl(file: &Path) -> Result<Vec<InputDoc>> {
    let reader = BufReader::new(File::open(file)?);
    let mut docs = Vec::new();
    for (n, line) in reader.lines().enumerate() {
        let line = line?;
        if line.trim().is_empty() { continue; }
        let doc: InputDoc = serde_json::from_str(&line).with_context(|| format!("{}:{}", file.display(), n + 1))?;
        docs.push(doc);
    }
    Ok(docs)
}

fn read_json(file: &Path) -> Result<Vec<InputDoc>> {
    let reader = BufReader::new(File::open(file)?);
    let json: serde_json::Value = serde_json::from_reader(reader).with_context(|| file.display().to_string())?;
    let docs = match json {
        serde_json::Value::Array(arr) => arr.into_iter().map(serde_json::from_value).collect::<Result<Vec<InputDoc>, _>>()?,
        serde_json::Value::Object(_) => vec![serde_json::from_value(json)?],
        _ => Vec::new(),
    };
    Ok(docs)
}

fn ingest_doc(index: &InvertedIndex, doc: InputDoc, report: &mut IngestReport) -> Result<()> {
    let id = doc.id.clone();
    match index.upsert(doc.into_document()) {
        Ok(out) => {
            report.upserted += 1;
            if out.replaced { report.replaced += 1; }
        }
        Err(IndexError::EmptyDocument(url)) => {
            tracing::warn!(%id, %url, "document has no indexable terms, skipped");
            report.empty += 1;
        }
        Err(err) => return Err(err.into()),
    }
    Ok(())
}
