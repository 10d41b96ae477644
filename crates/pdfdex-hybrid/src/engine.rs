use std::num::NonZeroUsize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use lru::LruCache;
use tokio::sync::Mutex;
use tracing::{debug, warn};

use pdfdex_core::config::{FusionSettings, Settings};
use pdfdex_core::error::{Error, Result};
use pdfdex_core::traits::Embedder;
use pdfdex_core::types::ChunkId;
use pdfdex_vector::embed_blocking;

use crate::fusion::fuse;
use crate::store::{self, IndexBundle};

/// A fused result resolved against the chunk table.
#[derive(Debug, Clone, PartialEq)]
pub struct RetrievedChunk {
    pub id: ChunkId,
    pub score: f32,
    pub dense_rank: Option<usize>,
    pub sparse_rank: Option<usize>,
    pub page: u32,
    pub text: String,
}

/// Answers `(bundle dir, query, k)` requests against published bundles.
///
/// Loaded bundles are cached per canonical directory and tagged with their
/// build id; each query re-reads `CURRENT`, so a rebuild is picked up on the
/// next call. The cache holds at most `cache_capacity` bundles (LRU).
pub struct HybridQueryEngine {
    embedder: Arc<dyn Embedder>,
    fusion: FusionSettings,
    embed_timeout: Duration,
    cache: Mutex<LruCache<PathBuf, Arc<IndexBundle>>>,
}

const DEFAULT_CACHE_CAPACITY: NonZeroUsize = match NonZeroUsize::new(16) {
    Some(n) => n,
    None => NonZeroUsize::MIN,
};

impl HybridQueryEngine {
    pub fn new(embedder: Arc<dyn Embedder>, fusion: FusionSettings, embed_timeout: Duration) -> Self {
        Self { embedder, fusion, embed_timeout, cache: Mutex::new(LruCache::new(DEFAULT_CACHE_CAPACITY)) }
    }

    pub fn from_settings(settings: &Settings) -> Result<Self> {
        settings.validate()?;
        let embedder = pdfdex_embed::embedder_from_settings(&settings.embedding).map_err(|e| Error::InvalidConfig(format!("{e:#}")))?;
        Ok(Self::new(embedder, settings.fusion.clone(), Duration::from_millis(settings.embedding.timeout_ms))
            .with_cache_capacity(settings.store.cache_capacity))
    }

    /// Bounds the number of open bundles; `0` is treated as `1`.
    #[must_use]
    pub fn with_cache_capacity(self, capacity: usize) -> Self {
        let capacity = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
        Self { cache: Mutex::new(LruCache::new(capacity)), ..self }
    }

    /// Number of bundles currently held open.
    pub async fn cached_bundles(&self) -> usize {
        self.cache.lock().await.len()
    }

    /// Top `k` chunk texts for `query`, best first.
    pub async fn query(&self, bundle_dir: &Path, query: &str, k: usize) -> Result<Vec<String>> {
        Ok(self.query_hits(bundle_dir, query, k).await?.into_iter().map(|c| c.text).collect())
    }

    /// Like [`HybridQueryEngine::query`] but keeps scores, ranks and pages.
    pub async fn query_hits(&self, bundle_dir: &Path, query: &str, k: usize) -> Result<Vec<RetrievedChunk>> {
        let bundle = self.bundle(bundle_dir).await?;
        if k == 0 {
            return Ok(Vec::new());
        }
        if bundle.manifest.dim != self.embedder.dim() {
            return Err(Error::InvalidConfig(format!(
                "bundle was built with {}-dim embeddings ({}), query embedder produces {}",
                bundle.manifest.dim,
                bundle.manifest.embedder_id,
                self.embedder.dim()
            )));
        }
        if bundle.manifest.embedder_id != self.embedder.embedder_id() {
            warn!(built = %bundle.manifest.embedder_id, query = %self.embedder.embedder_id(), "embedder differs from build");
        }

        let k = k.min(bundle.chunks.len());
        let candidates = k.saturating_mul(self.fusion.over_fetch).min(bundle.chunks.len());
        let q_vec = self.embed_query(query).await?;
        let dense = bundle.dense.search_vec(&q_vec, candidates).await.map_err(|e| Error::Search(format!("dense: {e:#}")))?;
        let sparse = bundle.sparse.search(query, candidates).map_err(|e| Error::Search(format!("sparse: {e:#}")))?;
        // Non-finite distances get no rank credit.
        let dense: Vec<_> = dense.into_iter().filter(|h| h.score.is_finite()).collect();
        let fused = fuse(&dense, &sparse, &self.fusion, k);
        debug!(k, dense = dense.len(), sparse = sparse.len(), fused = fused.len(), "hybrid query");

        fused
            .into_iter()
            .map(|h| {
                let chunk = bundle
                    .chunk(h.id)
                    .ok_or_else(|| Error::StoreCorrupt(format!("index returned unknown chunk id {}", h.id)))?;
                Ok(RetrievedChunk {
                    id: h.id,
                    score: h.score,
                    dense_rank: h.dense_rank,
                    sparse_rank: h.sparse_rank,
                    page: chunk.page,
                    text: chunk.text.clone(),
                })
            })
            .collect()
    }

    async fn embed_query(&self, query: &str) -> Result<Vec<f32>> {
        let embedded = tokio::time::timeout(self.embed_timeout, embed_blocking(&self.embedder, vec![query.to_string()]))
            .await
            .map_err(|_| Error::Embedding(format!("query embedding timed out after {:?}", self.embed_timeout)))?
            .map_err(|e| Error::Embedding(format!("{e:#}")))?;
        embedded.into_iter().next().ok_or_else(|| Error::Embedding("embedder returned no vector".into()))
    }

    /// Cached bundle for `bundle_dir` if its build id is still current.
    async fn bundle(&self, bundle_dir: &Path) -> Result<Arc<IndexBundle>> {
        let key = bundle_dir.canonicalize().map_err(|_| Error::StoreNotFound(bundle_dir.to_path_buf()))?;
        let current = store::current_build_id(&key)?.ok_or_else(|| Error::StoreNotFound(bundle_dir.to_path_buf()))?;
        if let Some(hit) = self.cache.lock().await.get(&key) {
            if hit.build_id() == current {
                return Ok(Arc::clone(hit));
            }
        }
        let loaded = Arc::new(store::load(&key).await?);
        debug!(dir = %key.display(), build_id = %loaded.build_id(), "caching bundle");
        if let Some((evicted, _)) = self.cache.lock().await.push(key.clone(), Arc::clone(&loaded)) {
            if evicted != key {
                debug!(dir = %evicted.display(), "evicted cached bundle");
            }
        }
        Ok(loaded)
    }

    /// Drops every cached bundle.
    pub async fn clear_cache(&self) {
        self.cache.lock().await.clear();
    }
}
