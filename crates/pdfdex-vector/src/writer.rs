use anyhow::{anyhow, bail, Context, Result};
use arrow_array::{FixedSizeListArray, Int64Array, RecordBatch, RecordBatchIterator};
use arrow_schema::ArrowError;
use indicatif::{ProgressBar, ProgressStyle};
use lancedb::{Connection, Table};
use std::path::Path;
use std::sync::Arc;
use tracing::info;

use pdfdex_core::traits::Embedder;
use pdfdex_core::types::Chunk;

use crate::index_build::{build_ivfpq_index, compute_ivfpq_params, should_build_ann};
use crate::schema::{build_arrow_schema, TABLE_NAME};
use crate::table::{open_db, open_embeddings};

#[derive(Debug, Clone)]
pub struct DenseBuildOptions {
	pub batch_size: usize,
	pub ann_min_rows: usize,
}

impl Default for DenseBuildOptions {
	fn default() -> Self { Self { batch_size: 32, ann_min_rows: 4096 } }
}

/// Nearest-neighbour index over chunk embeddings stored in one LanceDB table.
pub struct DenseIndex {
	pub(crate) conn: Connection,
	pub(crate) table: Table,
	pub(crate) dim: usize,
	pub(crate) rows: usize,
}

impl DenseIndex {
	/// Embeds every chunk and writes `(chunk_id, vector)` rows under `dir`.
	pub async fn build(dir: &Path, chunks: &[Chunk], embedder: &Arc<dyn Embedder>, opts: &DenseBuildOptions) -> Result<Self> {
		if chunks.is_empty() { bail!("refusing to build a dense index over zero chunks"); }
		let dim = embedder.dim();
		let dim_i32 = i32::try_from(dim).context("embedding dimension too large")?;
		let schema = build_arrow_schema(dim_i32);
		std::fs::create_dir_all(dir).with_context(|| format!("creating {}", dir.display()))?;

		let pb = ProgressBar::new(chunks.len() as u64);
		pb.set_style(ProgressStyle::default_bar().template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} chunks ({percent}%) {msg}")?.progress_chars("#>-"));
		pb.set_message(embedder.embedder_id().to_string());

		let mut batches: Vec<std::result::Result<RecordBatch, ArrowError>> = Vec::new();
		for group in chunks.chunks(opts.batch_size.max(1)) {
			let texts: Vec<String> = group.iter().map(|c| c.text.clone()).collect();
			let vectors = embed_blocking(embedder, texts).await?;
			if vectors.len() != group.len() { bail!("embedder returned {} vectors for {} texts", vectors.len(), group.len()); }
			if let Some(bad) = vectors.iter().find(|v| v.len() != dim) { bail!("dim mismatch: got {} expected {dim}", bad.len()); }
			let ids = Int64Array::from(group.iter().map(|c| i64::from(c.id)).collect::<Vec<_>>());
			let vecs = FixedSizeListArray::from_iter_primitive::<arrow_array::types::Float32Type, _, _>(
				vectors.into_iter().map(|v| Some(v.into_iter().map(Some).collect::<Vec<_>>())),
				dim_i32,
			);
			batches.push(Ok(RecordBatch::try_new(schema.clone(), vec![Arc::new(ids), Arc::new(vecs)])?));
			pb.inc(group.len() as u64);
		}
		pb.finish_and_clear();

		let conn = open_db(dir).await?;
		let reader = Box::new(RecordBatchIterator::new(batches.into_iter(), schema));
		let table = conn.create_table(TABLE_NAME, reader).execute().await?;

		if should_build_ann(chunks.len(), opts.ann_min_rows) {
			build_ivfpq_index(&table, &compute_ivfpq_params(chunks.len(), dim)).await?;
		}
		info!(chunks = chunks.len(), dim, dir = %dir.display(), "dense index built");
		Ok(Self { conn, table, dim, rows: chunks.len() })
	}

	pub async fn open(dir: &Path, dim: usize) -> Result<Self> {
		let conn = open_db(dir).await?;
		let table = open_embeddings(&conn).await?;
		let rows = table.count_rows(None).await?;
		Ok(Self { conn, table, dim, rows })
	}

	pub fn dim(&self) -> usize { self.dim }

	pub fn uri(&self) -> &str { self.conn.uri() }

	pub fn num_rows(&self) -> usize { self.rows }
}

/// Runs the embedder on the blocking pool; model inference is CPU bound.
pub async fn embed_blocking(embedder: &Arc<dyn Embedder>, texts: Vec<String>) -> Result<Vec<Vec<f32>>> {
	let embedder = Arc::clone(embedder);
	tokio::task::spawn_blocking(move || embedder.embed_batch(&texts))
		.await
		.map_err(|e| anyhow!("embedding task failed: {e}"))?
}
