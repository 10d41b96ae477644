//! Splits paragraph units into retrieval-sized chunks.
//!
//! With `split = false` every paragraph becomes one chunk. With `split = true`
//! the paragraphs of a page are joined with a blank line and the page text is
//! cut into overlapping windows. Chunks never span pages; a page shorter than
//! the window yields a single chunk. Ids are assigned in output order.

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::types::{Chunk, ChunkId, TextUnit};

const PARAGRAPH_SEPARATOR: &str = "\n\n";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SizeUnit {
    #[default]
    Chars,
    Words,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChunkingConfig {
    pub split: bool,
    pub target_size: usize,
    pub overlap: usize,
    pub unit: SizeUnit,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self { split: true, target_size: 1000, overlap: 200, unit: SizeUnit::Chars }
    }
}

impl ChunkingConfig {
    pub fn validate(&self) -> Result<()> {
        if self.target_size == 0 {
            return Err(Error::InvalidConfig("chunking.target_size must be positive".into()));
        }
        if self.overlap >= self.target_size {
            return Err(Error::InvalidConfig(format!(
                "chunking.overlap ({}) must be smaller than chunking.target_size ({})",
                self.overlap, self.target_size
            )));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Default)]
pub struct Chunker {
    config: ChunkingConfig,
}

impl Chunker {
    pub fn new(config: ChunkingConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self { config })
    }

    pub fn config(&self) -> &ChunkingConfig { &self.config }

    pub fn chunk(&self, units: &[TextUnit]) -> Vec<Chunk> {
        let mut chunks = Vec::new();
        let mut next_id: ChunkId = 0;
        let mut push = |text: String, page: u32, offset: usize| {
            chunks.push(Chunk { id: next_id, text, page, offset });
            next_id += 1;
        };

        if !self.config.split {
            for unit in units.iter().filter(|u| !u.text.trim().is_empty()) {
                push(unit.text.clone(), unit.page, 0);
            }
            return chunks;
        }

        for (page, page_text) in pages_of(units) {
            let windows = match self.config.unit {
                SizeUnit::Chars => char_windows(&page_text, self.config.target_size, self.config.overlap),
                SizeUnit::Words => word_windows(&page_text, self.config.target_size, self.config.overlap),
            };
            for (offset, text) in windows {
                push(text, page, offset);
            }
        }
        chunks
    }
}

/// Chunk `units` with explicit parameters; see [`Chunker`].
pub fn chunk(units: &[TextUnit], split: bool, target_size: usize, overlap: usize) -> Result<Vec<Chunk>> {
    let chunker = Chunker::new(ChunkingConfig { split, target_size, overlap, unit: SizeUnit::Chars })?;
    Ok(chunker.chunk(units))
}

/// Groups consecutive units of the same page into one text block.
fn pages_of(units: &[TextUnit]) -> Vec<(u32, String)> {
    let mut pages: Vec<(u32, String)> = Vec::new();
    for unit in units.iter().filter(|u| !u.text.trim().is_empty()) {
        match pages.last_mut() {
            Some((page, text)) if *page == unit.page => {
                text.push_str(PARAGRAPH_SEPARATOR);
                text.push_str(&unit.text);
            }
            _ => pages.push((unit.page, unit.text.clone())),
        }
    }
    pages
}

/// Fixed windows of `size` chars advancing by `size - overlap`.
/// Returns `(char_offset, text)` pairs; the last window ends at the text end.
fn char_windows(text: &str, size: usize, overlap: usize) -> Vec<(usize, String)> {
    let bounds: Vec<usize> = text.char_indices().map(|(i, _)| i).chain(std::iter::once(text.len())).collect();
    let total = bounds.len() - 1;
    if total == 0 { return Vec::new(); }
    let stride = size - overlap;
    let mut windows = Vec::new();
    let mut start = 0;
    loop {
        let end = (start + size).min(total);
        windows.push((start, text[bounds[start]..bounds[end]].to_string()));
        if end >= total { break; }
        start += stride;
    }
    windows
}

/// Windows of `size` whitespace-separated words, re-joined with single spaces.
fn word_windows(text: &str, size: usize, overlap: usize) -> Vec<(usize, String)> {
    let words: Vec<&str> = text.split_whitespace().collect();
    let char_offset = |w: &str| {
        let byte = w.as_ptr() as usize - text.as_ptr() as usize;
        text[..byte].chars().count()
    };
    let mut windows = Vec::new();
    let mut start = 0;
    while start < words.len() {
        let end = (start + size).min(words.len());
        windows.push((char_offset(words[start]), words[start..end].join(" ")));
        if end >= words.len() { break; }
        start = end - overlap;
    }
    windows
}
