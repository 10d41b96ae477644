//! pdfdex CLI: create PDF bots and query their indexes.
//!
//! ```bash
//! pdfdex create --name "Menu" --model gemma2-9b-it --system-prompt "..." --pdf menu.pdf
//! pdfdex query menu "vegetarian dishes" -k 5
//! pdfdex show menu
//! pdfdex models
//! ```

mod bots;

use anyhow::{Context, Result};
use chrono::Utc;
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::time::Instant;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use pdfdex_core::config::{Config, Settings};
use pdfdex_hybrid::{BuildRequest, HybridQueryEngine, Indexer};

use crate::bots::{BotConfig, DOCUMENT_FILE};

#[derive(Parser)]
#[command(name = "pdfdex", version, about = "Index PDFs into hybrid dense + BM25 retrieval bundles")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Create a bot from a PDF and build its index
    Create {
        #[arg(long)]
        name: String,
        #[arg(long)]
        model: String,
        #[arg(long)]
        system_prompt: String,
        /// Greeting shown when a conversation starts
        #[arg(long, default_value = "")]
        initial_line: String,
        #[arg(long)]
        pdf: PathBuf,
        /// One chunk per paragraph instead of overlapping windows
        #[arg(long)]
        no_split: bool,
    },
    /// Retrieve the passages most relevant to a query
    Query {
        folder: String,
        text: String,
        #[arg(short, long, default_value = "5")]
        k: usize,
        /// Print hits as JSON with scores and pages
        #[arg(long)]
        json: bool,
    },
    /// Print a bot's configuration
    Show { folder: String },
    /// List supported chat models
    Models,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let settings = Config::load().context("loading configuration")?.settings()?;

    match cli.command {
        Command::Create { name, model, system_prompt, initial_line, pdf, no_split } => {
            create(&settings, &name, &model, &system_prompt, &initial_line, &pdf, !no_split).await
        }
        Command::Query { folder, text, k, json } => query(&settings, &folder, &text, k, json).await,
        Command::Show { folder } => show(&settings, &folder),
        Command::Models => {
            for m in bots::SUPPORTED_MODELS {
                println!("{m}");
            }
            Ok(())
        }
    }
}

async fn create(settings: &Settings, name: &str, model: &str, system_prompt: &str, initial_line: &str, pdf: &Path, split: bool) -> Result<()> {
    let pdf_filename = pdf.file_name().map(|f| f.to_string_lossy().into_owned()).unwrap_or_default();
    bots::validate_new_bot(name, &pdf_filename)?;
    if !bots::SUPPORTED_MODELS.contains(&model) {
        warn!(model, "model is not in the supported list");
    }
    let bytes = std::fs::read(pdf).with_context(|| format!("reading {}", pdf.display()))?;

    let bots_root = settings.paths.bots_root();
    std::fs::create_dir_all(&bots_root).with_context(|| format!("creating {}", bots_root.display()))?;
    let folder = bots::unique_folder(&bots_root, &bots::slugify(name));
    let bot_dir = bots_root.join(&folder);
    std::fs::create_dir_all(&bot_dir).with_context(|| format!("creating {}", bot_dir.display()))?;

    let config = BotConfig {
        folder_name: folder.clone(),
        name: name.trim().to_string(),
        model: model.to_string(),
        system_prompt: system_prompt.trim().to_string(),
        initial_line: initial_line.trim().to_string(),
        pdf_filename,
        split,
        created_at: Utc::now(),
    };
    bots::write_config(&bot_dir, &config)?;

    let bundle_dir = settings.paths.vector_root().join(&folder);
    let document_path = bot_dir.join(DOCUMENT_FILE);
    let started = Instant::now();
    let indexer = Indexer::from_settings(settings)?;
    let built = indexer
        .build(BuildRequest { document: &bytes, document_path: Some(&document_path), bundle_dir: &bundle_dir, split })
        .await;
    let report = match built {
        Ok(report) => report,
        Err(e) => {
            if let Err(rm) = std::fs::remove_dir_all(&bot_dir) {
                warn!(error = %rm, dir = %bot_dir.display(), "could not remove bot folder after failed build");
            }
            return Err(e.into());
        }
    };
    info!(folder = %folder, chunks = report.manifest.chunk_count, ms = started.elapsed().as_millis() as u64, "bot created");

    println!("folder_name: {folder}");
    println!("index_dir:   {}", bundle_dir.display());
    println!("chunks:      {}", report.manifest.chunk_count);
    println!("build_id:    {}", report.manifest.build_id);
    Ok(())
}

async fn query(settings: &Settings, folder: &str, text: &str, k: usize, json: bool) -> Result<()> {
    bots::validate_folder_name(folder)?;
    let bundle_dir = settings.paths.vector_root().join(folder);
    let engine = HybridQueryEngine::from_settings(settings)?;
    let hits = engine.query_hits(&bundle_dir, text, k).await?;

    if json {
        let rows: Vec<serde_json::Value> = hits
            .iter()
            .map(|h| {
                serde_json::json!({
                    "chunk_id": h.id,
                    "score": h.score,
                    "page": h.page,
                    "dense_rank": h.dense_rank,
                    "sparse_rank": h.sparse_rank,
                    "text": h.text,
                })
            })
            .collect();
        println!("{}", serde_json::to_string_pretty(&serde_json::json!({ "query": text, "results": rows }))?);
        return Ok(());
    }
    if hits.is_empty() {
        println!("No passages found.");
    }
    for (i, h) in hits.iter().enumerate() {
        println!("{}. [page {}, score {:.4}]\n{}\n", i + 1, h.page, h.score, h.text);
    }
    Ok(())
}

fn show(settings: &Settings, folder: &str) -> Result<()> {
    let config = bots::read_config(&settings.paths.bots_root(), folder)?;
    println!("{}", serde_json::to_string_pretty(&config)?);
    Ok(())
}
