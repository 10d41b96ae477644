use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use tracing::info;

use pdfdex_core::chunker::{Chunker, ChunkingConfig};
use pdfdex_core::config::Settings;
use pdfdex_core::error::{Error, Result};
use pdfdex_core::extract::{extract_units, PdfExtractor};
use pdfdex_core::traits::{Embedder, TextExtractor};
use pdfdex_vector::DenseBuildOptions;

use crate::store::{self, BundleContents, Manifest};

/// Inputs of one bot build. The caller owns both paths.
#[derive(Debug, Clone)]
pub struct BuildRequest<'a> {
    pub document: &'a [u8],
    /// Where to keep a copy of the source document; skipped when `None`.
    pub document_path: Option<&'a Path>,
    pub bundle_dir: &'a Path,
    pub split: bool,
}

#[derive(Debug, Clone)]
pub struct BuildReport {
    pub manifest: Manifest,
    pub units: usize,
}

/// Extract, chunk, index and publish. Builds of the same bundle directory
/// are serialized; builds of different directories run concurrently.
pub struct Indexer {
    extractor: Arc<dyn TextExtractor>,
    embedder: Arc<dyn Embedder>,
    chunking: ChunkingConfig,
    dense: DenseBuildOptions,
    retain_builds: usize,
    locks: Mutex<HashMap<PathBuf, Arc<tokio::sync::Mutex<()>>>>,
}

impl Indexer {
    pub fn new(extractor: Arc<dyn TextExtractor>, embedder: Arc<dyn Embedder>, chunking: ChunkingConfig) -> Result<Self> {
        chunking.validate()?;
        Ok(Self {
            extractor,
            embedder,
            chunking,
            dense: DenseBuildOptions::default(),
            retain_builds: 2,
            locks: Mutex::new(HashMap::new()),
        })
    }

    /// PDF extractor plus the configured embedder, batch sizes and retention.
    pub fn from_settings(settings: &Settings) -> Result<Self> {
        settings.validate()?;
        let embedder = pdfdex_embed::embedder_from_settings(&settings.embedding).map_err(|e| Error::InvalidConfig(format!("{e:#}")))?;
        let dense = DenseBuildOptions { batch_size: settings.embedding.batch_size, ann_min_rows: settings.dense.ann_min_rows };
        Ok(Self::new(Arc::new(PdfExtractor::new()), embedder, settings.chunking.clone())?
            .with_dense_options(dense)
            .with_retain_builds(settings.store.retain_builds))
    }

    #[must_use]
    pub fn with_dense_options(mut self, dense: DenseBuildOptions) -> Self {
        self.dense = dense;
        self
    }

    #[must_use]
    pub fn with_retain_builds(mut self, retain: usize) -> Self {
        self.retain_builds = retain.max(1);
        self
    }

    pub fn embedder(&self) -> &Arc<dyn Embedder> { &self.embedder }

    pub async fn build(&self, req: BuildRequest<'_>) -> Result<BuildReport> {
        std::fs::create_dir_all(req.bundle_dir)
            .map_err(|e| Error::StoreWrite(format!("creating {}: {e}", req.bundle_dir.display())))?;
        let lock = self.lock_for(req.bundle_dir);
        let _guard = lock.lock().await;

        if let Some(path) = req.document_path {
            copy_document(path, req.document)?;
        }

        let extractor = Arc::clone(&self.extractor);
        let bytes = req.document.to_vec();
        let units = tokio::task::spawn_blocking(move || extract_units(extractor.as_ref(), &bytes))
            .await
            .map_err(|e| Error::Extraction(format!("extraction task failed: {e}")))??;

        let chunking = ChunkingConfig { split: req.split, ..self.chunking.clone() };
        let chunks = Chunker::new(chunking.clone())?.chunk(&units);
        if chunks.is_empty() {
            return Err(Error::IndexBuild("document produced no text chunks".into()));
        }
        info!(units = units.len(), chunks = chunks.len(), split = req.split, "document chunked");

        let contents = BundleContents { chunks: &chunks, document_hash: store::document_hash(req.document), chunking };
        let manifest = store::save(req.bundle_dir, contents, &self.embedder, &self.dense, self.retain_builds).await?;
        Ok(BuildReport { manifest, units: units.len() })
    }

    fn lock_for(&self, dir: &Path) -> Arc<tokio::sync::Mutex<()>> {
        let key = dir.canonicalize().unwrap_or_else(|_| dir.to_path_buf());
        let mut locks = self.locks.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        // An entry only the map references has no holder and no waiter.
        locks.retain(|_, lock| Arc::strong_count(lock) > 1);
        Arc::clone(locks.entry(key).or_default())
    }

    /// Bundle directories currently holding a lock entry.
    pub fn tracked_dirs(&self) -> usize {
        self.locks.lock().unwrap_or_else(std::sync::PoisonError::into_inner).len()
    }
}

fn copy_document(path: &Path, bytes: &[u8]) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(|e| Error::StoreWrite(format!("creating {}: {e}", parent.display())))?;
    }
    std::fs::write(path, bytes).map_err(|e| Error::StoreWrite(format!("writing {}: {e}", path.display())))
}
