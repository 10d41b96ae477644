use anyhow::{bail, Context, Result};
use arrow_array::{Float32Array, Int64Array};
use futures::TryStreamExt;
use lancedb::query::{ExecutableQuery, QueryBase};
use lancedb::DistanceType;
use std::sync::Arc;
use tracing::debug;

use pdfdex_core::traits::Embedder;
use pdfdex_core::types::{ChunkId, SearchHit, SourceKind};

use crate::schema::{CHUNK_ID_COLUMN, DISTANCE_COLUMN};
use crate::writer::{embed_blocking, DenseIndex};

/// Extra rows fetched past `k` so equal distances at the cut can be resolved by id.
const TIE_SLACK: usize = 8;

impl DenseIndex {
	/// Nearest chunks to `q_vec` by cosine distance, closest first.
	///
	/// Equal distances order by chunk id, including at the `k` boundary: the
	/// fetch widens until the last fetched distance differs from the k-th.
	/// Rows without a finite distance (zero vectors) are never returned, so a
	/// zero query vector yields no hits.
	pub async fn search_vec(&self, q_vec: &[f32], k: usize) -> Result<Vec<SearchHit>> {
		if q_vec.len() != self.dim { bail!("query vector has {} dims, index has {}", q_vec.len(), self.dim); }
		let k = k.min(self.rows);
		if k == 0 { return Ok(Vec::new()); }
		if q_vec.iter().all(|x| *x == 0.0) {
			debug!("zero query vector, no dense hits");
			return Ok(Vec::new());
		}

		let mut limit = k.saturating_add(TIE_SLACK).min(self.rows);
		let mut hits = loop {
			let mut hits = self.fetch(q_vec, limit).await?;
			hits.sort_by(|a, b| a.score.total_cmp(&b.score).then(a.id.cmp(&b.id)));
			let tied_at_cut = hits.len() > k && hits.last().map(|h| h.score) == Some(hits[k - 1].score);
			if !tied_at_cut || limit >= self.rows { break hits; }
			limit = limit.saturating_mul(2).min(self.rows);
		};
		hits.truncate(k);
		debug!(k, limit, hits = hits.len(), "dense search");
		Ok(hits)
	}

	/// Embeds `query` with `embedder` and searches; see [`DenseIndex::search_vec`].
	pub async fn search(&self, embedder: &Arc<dyn Embedder>, query: &str, k: usize) -> Result<Vec<SearchHit>> {
		if k == 0 { return Ok(Vec::new()); }
		let q = embed_blocking(embedder, vec![query.to_string()]).await?.pop().context("embedder returned no vector")?;
		self.search_vec(&q, k).await
	}

	async fn fetch(&self, q_vec: &[f32], limit: usize) -> Result<Vec<SearchHit>> {
		let mut stream = self.table.vector_search(q_vec.to_vec())?.distance_type(DistanceType::Cosine).limit(limit).execute().await?;
		let mut hits = Vec::with_capacity(limit);
		while let Some(batch) = stream.try_next().await? {
			let ids = batch.column_by_name(CHUNK_ID_COLUMN).and_then(|c| c.as_any().downcast_ref::<Int64Array>()).context("missing chunk_id column")?;
			let dists = batch.column_by_name(DISTANCE_COLUMN).and_then(|c| c.as_any().downcast_ref::<Float32Array>()).context("missing _distance column")?;
			for i in 0..batch.num_rows() {
				let score = dists.value(i);
				if !score.is_finite() { continue; }
				let id = ChunkId::try_from(ids.value(i)).context("chunk_id out of range")?;
				hits.push(SearchHit { id, score, source: SourceKind::Dense });
			}
		}
		Ok(hits)
	}
}
