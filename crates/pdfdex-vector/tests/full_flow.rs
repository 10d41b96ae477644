use std::sync::Arc;

use pdfdex_core::traits::Embedder;
use pdfdex_core::types::{Chunk, SourceKind};
use pdfdex_embed::HashEmbedder;
use pdfdex_vector::{DenseBuildOptions, DenseIndex};
use tempfile::TempDir;

fn chunks(texts: &[&str]) -> Vec<Chunk> {
	texts.iter().zip(0u32..).map(|(t, id)| Chunk { id, text: (*t).to_string(), page: 1, offset: 0 }).collect()
}

fn embedder() -> Arc<dyn Embedder> { Arc::new(HashEmbedder::new(64)) }

#[tokio::test]
async fn lancedb_full_flow() -> anyhow::Result<()> {
	let tmp = TempDir::new()?;
	let docs = chunks(&[
		"harbor opens at dawn",
		"lighthouse keepers log tankers",
		"winter storms close the pier",
		"lighthouse lamp lit at dusk",
	]);
	let emb = embedder();
	let opts = DenseBuildOptions { batch_size: 3, ..DenseBuildOptions::default() };
	let built = DenseIndex::build(tmp.path(), &docs, &emb, &opts).await?;
	assert_eq!(built.num_rows(), 4);
	drop(built);

	let index = DenseIndex::open(tmp.path(), emb.dim()).await?;
	let hits = index.search(&emb, "lighthouse keepers log tankers", 4).await?;
	assert_eq!(hits.len(), 4);
	assert_eq!(hits[0].id, 1, "identical text is nearest");
	assert!(hits[0].score.abs() < 1e-4);
	assert!(hits.iter().all(|h| h.source == SourceKind::Dense));
	for pair in hits.windows(2) {
		let (a, b) = (pair[0].score, pair[1].score);
		assert!(b.is_nan() || a <= b, "distances ascend: {a} then {b}");
	}
	Ok(())
}

#[tokio::test]
async fn search_is_bounded_by_k_and_table_size() -> anyhow::Result<()> {
	let tmp = TempDir::new()?;
	let emb = embedder();
	let index = DenseIndex::build(tmp.path(), &chunks(&["alpha beta", "gamma delta"]), &emb, &DenseBuildOptions::default()).await?;
	assert!(index.search(&emb, "alpha", 0).await?.is_empty());
	assert_eq!(index.search(&emb, "alpha", 1).await?.len(), 1);
	assert_eq!(index.search(&emb, "alpha", 10).await?.len(), 2);
	Ok(())
}

#[tokio::test]
async fn empty_chunk_list_and_wrong_query_dim_fail() -> anyhow::Result<()> {
	let tmp = TempDir::new()?;
	let emb = embedder();
	assert!(DenseIndex::build(&tmp.path().join("empty"), &[], &emb, &DenseBuildOptions::default()).await.is_err());
	let index = DenseIndex::build(&tmp.path().join("one"), &chunks(&["only chunk"]), &emb, &DenseBuildOptions::default()).await?;
	assert!(index.search_vec(&[0.5; 3], 1).await.is_err());
	Ok(())
}

#[tokio::test]
async fn repeated_text_ties_resolve_to_lowest_ids() -> anyhow::Result<()> {
	let tmp = TempDir::new()?;
	let emb = embedder();
	let texts: Vec<String> = (0..24)
		.map(|i| if i % 2 == 1 { "quarterly report running header".to_string() } else { format!("distinct passage {i} on orchard {}", i * 7) })
		.collect();
	let docs: Vec<Chunk> = texts.iter().zip(0u32..).map(|(t, id)| Chunk { id, text: t.clone(), page: 1, offset: 0 }).collect();
	let index = DenseIndex::build(tmp.path(), &docs, &emb, &DenseBuildOptions::default()).await?;

	let top = index.search(&emb, "quarterly report running header", 1).await?;
	assert_eq!(top.iter().map(|h| h.id).collect::<Vec<_>>(), vec![1]);
	let top3 = index.search(&emb, "quarterly report running header", 3).await?;
	assert_eq!(top3.iter().map(|h| h.id).collect::<Vec<_>>(), vec![1, 3, 5]);
	Ok(())
}

#[tokio::test]
async fn zero_query_vector_and_huge_k() -> anyhow::Result<()> {
	let tmp = TempDir::new()?;
	let emb = embedder();
	let index = DenseIndex::build(tmp.path(), &chunks(&["alpha beta", "gamma delta", "epsilon"]), &emb, &DenseBuildOptions::default()).await?;
	assert!(index.search(&emb, "?!", 3).await?.is_empty());
	assert_eq!(index.search(&emb, "alpha", usize::MAX).await?.len(), 3);
	Ok(())
}

#[tokio::test]
#[ignore = "trains IVF-PQ over a few thousand rows"]
async fn large_tables_train_ivfpq() -> anyhow::Result<()> {
	let tmp = TempDir::new()?;
	let emb = embedder();
	let texts: Vec<String> = (0..1200).map(|i| format!("passage {i} about topic {}", i % 37)).collect();
	let docs: Vec<Chunk> = texts.iter().zip(0u32..).map(|(t, id)| Chunk { id, text: t.clone(), page: 1, offset: 0 }).collect();
	let opts = DenseBuildOptions { batch_size: 256, ann_min_rows: 1000 };
	let index = DenseIndex::build(tmp.path(), &docs, &emb, &opts).await?;
	let hits = index.search(&emb, "topic 5", 10).await?;
	assert!(!hits.is_empty() && hits.len() <= 10);
	Ok(())
}
