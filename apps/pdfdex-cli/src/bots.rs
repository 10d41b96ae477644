//! Bot folders: one directory per bot under the bots root holding the
//! uploaded document and its `config.json`.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Component, Path, PathBuf};

use pdfdex_core::Error;

pub const DOCUMENT_FILE: &str = "document.pdf";
pub const CONFIG_FILE: &str = "config.json";

/// Chat models a bot can be configured with.
pub const SUPPORTED_MODELS: &[&str] = &[
    "openai/gpt-oss-20b",
    "deepseek-r1-distill-llama-70b",
    "gemma2-9b-it",
    "llama-3.3-70b-versatile",
    "openai/gpt-oss-120b",
    "meta-llama/llama-4-maverick-17b-128e-instruct",
];

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BotConfig {
    pub folder_name: String,
    pub name: String,
    pub model: String,
    pub system_prompt: String,
    #[serde(default)]
    pub initial_line: String,
    pub pdf_filename: String,
    pub split: bool,
    pub created_at: DateTime<Utc>,
}

/// Lowercase, whitespace and `_` runs to `-`, drop anything outside
/// `[a-z0-9-]`, collapse dashes. Empty results fall back to `bot`.
pub fn slugify(name: &str) -> String {
    let mut slug = String::with_capacity(name.len());
    let mut pending_dash = false;
    for c in name.trim().to_lowercase().chars() {
        if c.is_whitespace() || c == '_' || c == '-' {
            pending_dash = true;
        } else if c.is_ascii_lowercase() || c.is_ascii_digit() {
            if pending_dash && !slug.is_empty() {
                slug.push('-');
            }
            pending_dash = false;
            slug.push(c);
        }
    }
    if slug.is_empty() { "bot".to_string() } else { slug }
}

/// First of `slug`, `slug-001`, `slug-002`, ... not present under `root`.
pub fn unique_folder(root: &Path, slug: &str) -> String {
    let mut candidate = slug.to_string();
    let mut counter = 1u32;
    while root.join(&candidate).exists() {
        candidate = format!("{slug}-{counter:03}");
        counter += 1;
    }
    candidate
}

pub fn validate_new_bot(name: &str, pdf_filename: &str) -> Result<(), Error> {
    if name.trim().is_empty() {
        return Err(Error::InvalidInput("bot name cannot be empty".into()));
    }
    let is_pdf = Path::new(pdf_filename)
        .extension()
        .is_some_and(|ext| ext.eq_ignore_ascii_case("pdf"));
    if !is_pdf {
        return Err(Error::InvalidInput(format!("only PDF files are allowed (got: {pdf_filename})")));
    }
    Ok(())
}

/// Rejects folder names that would escape the root they are joined to.
pub fn validate_folder_name(folder: &str) -> Result<(), Error> {
    let mut components = Path::new(folder).components();
    match (components.next(), components.next()) {
        (Some(Component::Normal(_)), None) => Ok(()),
        _ => Err(Error::InvalidInput(format!("invalid bot folder name '{folder}'"))),
    }
}

pub fn write_config(bot_dir: &Path, config: &BotConfig) -> Result<PathBuf> {
    let path = bot_dir.join(CONFIG_FILE);
    let json = serde_json::to_string_pretty(config)?;
    std::fs::write(&path, json).with_context(|| format!("writing {}", path.display()))?;
    Ok(path)
}

pub fn read_config(bots_root: &Path, folder: &str) -> Result<BotConfig> {
    validate_folder_name(folder)?;
    let path = bots_root.join(folder).join(CONFIG_FILE);
    let raw = std::fs::read_to_string(&path).with_context(|| format!("reading {}", path.display()))?;
    serde_json::from_str(&raw).with_context(|| format!("parsing {}", path.display()))
}
