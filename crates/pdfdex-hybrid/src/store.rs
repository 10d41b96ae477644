//! On-disk index bundles with atomic publication.
//!
//! ```text
//! <bundle_dir>/
//!   CURRENT                 build id of the published build
//!   builds/<build_id>/
//!     chunks.json           chunk table
//!     sparse/               tantivy index
//!     dense/                LanceDB database
//!     manifest.json         written last; a build without it is incomplete
//! ```
//!
//! Builds are staged in their own directory and only become visible when
//! `CURRENT` is replaced by rename. Readers resolve `CURRENT` first, so they
//! see either the previous build or the new one, never a mix.

use anyhow::{Context, Result as AnyResult};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info, warn};

use pdfdex_core::chunker::ChunkingConfig;
use pdfdex_core::error::{Error, Result};
use pdfdex_core::traits::Embedder;
use pdfdex_core::types::{Chunk, ChunkId};
use pdfdex_text::SparseIndex;
use pdfdex_vector::{DenseBuildOptions, DenseIndex};

pub const CURRENT_FILE: &str = "CURRENT";
pub const BUILDS_DIR: &str = "builds";
pub const CHUNKS_FILE: &str = "chunks.json";
pub const MANIFEST_FILE: &str = "manifest.json";
pub const SPARSE_DIR: &str = "sparse";
pub const DENSE_DIR: &str = "dense";
pub const FORMAT_VERSION: u32 = 1;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Manifest {
    pub format_version: u32,
    pub build_id: String,
    pub chunk_count: usize,
    pub embedder_id: String,
    pub dim: usize,
    pub chunking: ChunkingConfig,
    /// BLAKE3 hex digest of the source document bytes.
    pub document_hash: String,
    pub created_at: DateTime<Utc>,
}

/// Everything a build persists besides the indexes derived from it.
#[derive(Debug, Clone)]
pub struct BundleContents<'a> {
    pub chunks: &'a [Chunk],
    pub document_hash: String,
    pub chunking: ChunkingConfig,
}

/// A loaded, read-only bundle.
pub struct IndexBundle {
    pub manifest: Manifest,
    pub chunks: Vec<Chunk>,
    pub sparse: SparseIndex,
    pub dense: DenseIndex,
}

impl IndexBundle {
    pub fn build_id(&self) -> &str { &self.manifest.build_id }

    pub fn chunk(&self, id: ChunkId) -> Option<&Chunk> {
        self.chunks.get(usize::try_from(id).ok()?)
    }
}

pub fn document_hash(bytes: &[u8]) -> String {
    blake3::hash(bytes).to_hex().to_string()
}

/// Persists a new build under `bundle_dir` and publishes it.
///
/// Write order is chunk table, sparse index, dense index, manifest; `CURRENT`
/// is flipped only after the manifest is on disk. A failure at any step
/// removes the staged build and leaves the previously published one live.
pub async fn save(
    bundle_dir: &Path,
    contents: BundleContents<'_>,
    embedder: &Arc<dyn Embedder>,
    dense_opts: &DenseBuildOptions,
    retain_builds: usize,
) -> Result<Manifest> {
    if contents.chunks.is_empty() {
        return Err(Error::IndexBuild("no chunks to index".into()));
    }
    let (build_id, build_dir) = stage_build_dir(bundle_dir, &contents.document_hash).map_err(|e| Error::store_write(&e))?;
    info!(build_id = %build_id, chunks = contents.chunks.len(), "staging build");

    match write_build(&build_dir, &build_id, &contents, embedder, dense_opts).await {
        Ok(manifest) => {
            publish(bundle_dir, &build_id).map_err(|e| Error::store_write(&e))?;
            if let Err(e) = collect_garbage(bundle_dir, &build_id, retain_builds) {
                warn!(error = %format!("{e:#}"), "removing old builds failed");
            }
            info!(build_id = %build_id, dir = %bundle_dir.display(), "build published");
            Ok(manifest)
        }
        Err(err) => {
            if let Err(e) = std::fs::remove_dir_all(&build_dir) {
                warn!(error = %e, dir = %build_dir.display(), "could not remove failed build");
            }
            Err(err)
        }
    }
}

async fn write_build(
    build_dir: &Path,
    build_id: &str,
    contents: &BundleContents<'_>,
    embedder: &Arc<dyn Embedder>,
    dense_opts: &DenseBuildOptions,
) -> Result<Manifest> {
    write_json(&build_dir.join(CHUNKS_FILE), contents.chunks).map_err(|e| Error::store_write(&e))?;

    let sparse_dir = build_dir.join(SPARSE_DIR);
    let owned: Vec<Chunk> = contents.chunks.to_vec();
    tokio::task::spawn_blocking(move || SparseIndex::build(&sparse_dir, &owned).map(drop))
        .await
        .map_err(|e| Error::IndexBuild(format!("sparse build task failed: {e}")))?
        .map_err(|e| Error::index_build(&e))?;

    DenseIndex::build(&build_dir.join(DENSE_DIR), contents.chunks, embedder, dense_opts)
        .await
        .map_err(|e| Error::index_build(&e))?;

    let manifest = Manifest {
        format_version: FORMAT_VERSION,
        build_id: build_id.to_string(),
        chunk_count: contents.chunks.len(),
        embedder_id: embedder.embedder_id().to_string(),
        dim: embedder.dim(),
        chunking: contents.chunking.clone(),
        document_hash: contents.document_hash.clone(),
        created_at: Utc::now(),
    };
    write_json(&build_dir.join(MANIFEST_FILE), &manifest).map_err(|e| Error::store_write(&e))?;
    Ok(manifest)
}

/// Loads the published build of `bundle_dir`.
///
/// No `CURRENT`, or a `CURRENT` naming a build without manifest, is
/// [`Error::StoreNotFound`]. A manifest whose build cannot be read back is
/// [`Error::StoreCorrupt`].
pub async fn load(bundle_dir: &Path) -> Result<IndexBundle> {
    let build_id = current_build_id(bundle_dir)?.ok_or_else(|| Error::StoreNotFound(bundle_dir.to_path_buf()))?;
    let build_dir = bundle_dir.join(BUILDS_DIR).join(&build_id);
    let manifest_path = build_dir.join(MANIFEST_FILE);
    if !manifest_path.is_file() {
        return Err(Error::StoreNotFound(bundle_dir.to_path_buf()));
    }
    let manifest: Manifest = read_json(&manifest_path).map_err(|e| Error::store_corrupt(&e))?;
    let chunks: Vec<Chunk> = read_json(&build_dir.join(CHUNKS_FILE)).map_err(|e| Error::store_corrupt(&e))?;
    validate_chunks(&chunks, manifest.chunk_count)?;

    let sparse = SparseIndex::open(&build_dir.join(SPARSE_DIR)).map_err(|e| Error::store_corrupt(&e))?;
    let dense = DenseIndex::open(&build_dir.join(DENSE_DIR), manifest.dim).await.map_err(|e| Error::store_corrupt(&e))?;
    if sparse.num_chunks() != chunks.len() as u64 || dense.num_rows() != chunks.len() {
        return Err(Error::StoreCorrupt(format!(
            "index row counts (sparse {}, dense {}) differ from the chunk table ({})",
            sparse.num_chunks(),
            dense.num_rows(),
            chunks.len()
        )));
    }
    debug!(build_id = %build_id, chunks = chunks.len(), "bundle loaded");
    Ok(IndexBundle { manifest, chunks, sparse, dense })
}

/// Reads `CURRENT`; `None` when nothing was ever published.
pub fn current_build_id(bundle_dir: &Path) -> Result<Option<String>> {
    match std::fs::read_to_string(bundle_dir.join(CURRENT_FILE)) {
        Ok(s) => {
            let id = s.trim();
            if id.is_empty() { Ok(None) } else { Ok(Some(id.to_string())) }
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(Error::StoreCorrupt(format!("reading {}: {e}", bundle_dir.join(CURRENT_FILE).display()))),
    }
}

fn validate_chunks(chunks: &[Chunk], expected: usize) -> Result<()> {
    if chunks.len() != expected {
        return Err(Error::StoreCorrupt(format!("chunk table has {} rows, manifest says {expected}", chunks.len())));
    }
    if let Some((pos, c)) = chunks.iter().enumerate().find(|(pos, c)| usize::try_from(c.id).ok() != Some(*pos)) {
        return Err(Error::StoreCorrupt(format!("chunk at row {pos} has id {}", c.id)));
    }
    Ok(())
}

/// Creates `builds/<timestamp>-<hash prefix>` (suffixed if taken).
fn stage_build_dir(bundle_dir: &Path, document_hash: &str) -> AnyResult<(String, PathBuf)> {
    let builds = bundle_dir.join(BUILDS_DIR);
    std::fs::create_dir_all(&builds).with_context(|| format!("creating {}", builds.display()))?;
    let prefix: String = document_hash.chars().take(8).collect();
    let base = format!("{}-{prefix}", Utc::now().format("%Y%m%dT%H%M%S%3fZ"));
    for attempt in 0..100u32 {
        let id = attempt_id(&base, attempt);
        let dir = builds.join(&id);
        match std::fs::create_dir(&dir) {
            Ok(()) => return Ok((id, dir)),
            Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => continue,
            Err(e) => return Err(e).with_context(|| format!("creating {}", dir.display())),
        }
    }
    anyhow::bail!("could not allocate a build directory under {}", builds.display())
}

/// `base` for the first attempt, then `base-01`, `base-02`, ... so collision
/// suffixes keep lexical order equal to creation order.
fn attempt_id(base: &str, attempt: u32) -> String {
    if attempt == 0 { base.to_string() } else { format!("{base}-{attempt:02}") }
}

/// Atomically points `CURRENT` at `build_id`.
fn publish(bundle_dir: &Path, build_id: &str) -> AnyResult<()> {
    let mut tmp = tempfile::NamedTempFile::new_in(bundle_dir).context("creating CURRENT temp file")?;
    tmp.write_all(build_id.as_bytes())?;
    tmp.as_file().sync_all()?;
    tmp.persist(bundle_dir.join(CURRENT_FILE)).map_err(|e| e.error).context("replacing CURRENT")?;
    Ok(())
}

/// Keeps the live build plus the newest `retain - 1` other complete builds.
fn collect_garbage(bundle_dir: &Path, current: &str, retain: usize) -> AnyResult<()> {
    let builds = bundle_dir.join(BUILDS_DIR);
    let mut others: Vec<(String, bool)> = Vec::new();
    for entry in std::fs::read_dir(&builds)? {
        let entry = entry?;
        if !entry.file_type()?.is_dir() { continue; }
        let name = entry.file_name().to_string_lossy().into_owned();
        if name == current { continue; }
        let complete = entry.path().join(MANIFEST_FILE).is_file();
        others.push((name, complete));
    }
    // Build ids start with a timestamp, so lexical order is age order.
    others.sort_by(|a, b| b.0.cmp(&a.0));
    let mut kept = 1usize;
    for (name, complete) in others {
        if complete && kept < retain {
            kept += 1;
            continue;
        }
        let dir = builds.join(&name);
        std::fs::remove_dir_all(&dir).with_context(|| format!("removing {}", dir.display()))?;
        debug!(build_id = %name, "removed old build");
    }
    Ok(())
}

fn write_json<T: Serialize + ?Sized>(path: &Path, value: &T) -> AnyResult<()> {
    let file = std::fs::File::create(path).with_context(|| format!("creating {}", path.display()))?;
    let mut w = std::io::BufWriter::new(file);
    serde_json::to_writer(&mut w, value)?;
    w.flush()?;
    w.get_ref().sync_all()?;
    Ok(())
}

fn read_json<T: serde::de::DeserializeOwned>(path: &Path) -> AnyResult<T> {
    let bytes = std::fs::read(path).with_context(|| format!("reading {}", path.display()))?;
    serde_json::from_slice(&bytes).with_context(|| format!("parsing {}", path.display()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chunk(id: ChunkId) -> Chunk {
        Chunk { id, text: format!("chunk {id}"), page: 1, offset: 0 }
    }

    #[test]
    fn chunk_table_must_be_dense() {
        assert!(validate_chunks(&[chunk(0), chunk(1)], 2).is_ok());
        assert!(matches!(validate_chunks(&[chunk(0), chunk(2)], 2), Err(Error::StoreCorrupt(_))));
        assert!(matches!(validate_chunks(&[chunk(0)], 2), Err(Error::StoreCorrupt(_))));
    }

    #[test]
    fn current_is_replaced_atomically() {
        let dir = tempfile::tempdir().expect("tmp");
        assert_eq!(current_build_id(dir.path()).expect("read"), None);
        publish(dir.path(), "a").expect("publish a");
        publish(dir.path(), "b").expect("publish b");
        assert_eq!(current_build_id(dir.path()).expect("read").as_deref(), Some("b"));
    }

    #[test]
    fn staged_ids_are_unique_and_carry_the_hash_prefix() {
        let dir = tempfile::tempdir().expect("tmp");
        let (a, _) = stage_build_dir(dir.path(), "0123456789abcdef").expect("stage");
        let (b, _) = stage_build_dir(dir.path(), "0123456789abcdef").expect("stage");
        assert_ne!(a, b);
        assert!(a.contains("-01234567"));
    }

    #[test]
    fn collision_suffixes_sort_in_creation_order() {
        let ids: Vec<String> = (0..12).map(|n| attempt_id("20250101T000000000Z-01234567", n)).collect();
        let mut sorted = ids.clone();
        sorted.sort();
        assert_eq!(sorted, ids);
        assert!(ids[10].ends_with("-10"));
    }

    #[test]
    fn garbage_collection_keeps_newest_complete_builds() {
        let dir = tempfile::tempdir().expect("tmp");
        let builds = dir.path().join(BUILDS_DIR);
        for (name, complete) in [("20250101", true), ("20250102", true), ("20250103", false), ("20250104", true)] {
            std::fs::create_dir_all(builds.join(name)).expect("mkdir");
            if complete {
                std::fs::write(builds.join(name).join(MANIFEST_FILE), "{}").expect("manifest");
            }
        }
        collect_garbage(dir.path(), "20250104", 2).expect("gc");
        let mut left: Vec<String> = std::fs::read_dir(&builds)
            .expect("read")
            .map(|e| e.expect("entry").file_name().to_string_lossy().into_owned())
            .collect();
        left.sort();
        assert_eq!(left, vec!["20250102".to_string(), "20250104".to_string()]);
    }
}
