use std::path::PathBuf;
use thiserror::Error;

/// Error kinds surfaced to callers of the indexing and query entry points.
///
/// Each variant is a distinct condition the calling layer may want to map
/// differently (for instance "bot never built" versus "index engine failed").
#[derive(Debug, Error)]
pub enum Error {
    #[error("Extraction failed: {0}")]
    Extraction(String),

    #[error("Index build failed: {0}")]
    IndexBuild(String),

    #[error("Index bundle not found at {}", .0.display())]
    StoreNotFound(PathBuf),

    #[error("Index bundle write failed: {0}")]
    StoreWrite(String),

    #[error("Index bundle is corrupt: {0}")]
    StoreCorrupt(String),

    #[error("Embedding failed: {0}")]
    Embedding(String),

    #[error("Search failed: {0}")]
    Search(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),
}

impl Error {
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::StoreNotFound(_))
    }

    pub fn index_build(err: &anyhow::Error) -> Self {
        Self::IndexBuild(format!("{err:#}"))
    }

    pub fn store_write(err: &anyhow::Error) -> Self {
        Self::StoreWrite(format!("{err:#}"))
    }

    pub fn store_corrupt(err: &anyhow::Error) -> Self {
        Self::StoreCorrupt(format!("{err:#}"))
    }
}

pub type Result<T> = std::result::Result<T, Error>;
