use pdfdex_core::types::{Chunk, SourceKind};
use pdfdex_text::SparseIndex;
use tempfile::TempDir;

fn corpus() -> Vec<Chunk> {
	[
		"The harbor opens at dawn for fishing boats.",
		"Lighthouse keepers log every passing tanker in the ledger.",
		"Winter storms close the northern pier until March. Storms also flood the harbor road.",
		"Tanker crews report to the harbor master, and the harbor master reports to the port authority.",
	]
	.iter()
	.zip(0u32..)
	.map(|(t, id)| Chunk { id, text: (*t).to_string(), page: 1, offset: 0 })
	.collect()
}

#[test]
fn tantivy_full_flow() {
	let tmp = TempDir::new().expect("tmp");
	let chunks = corpus();
	let built = SparseIndex::build(tmp.path(), &chunks).expect("build");
	assert_eq!(built.num_chunks(), 4);
	drop(built);

	let index = SparseIndex::open(tmp.path()).expect("open");
	let hits = index.search("harbor", 10).expect("search");
	assert_eq!(hits.len(), 3, "three chunks mention the harbor");
	assert_eq!(hits[0].id, 3, "two occurrences outrank one");
	assert!(hits.iter().all(|h| h.source == SourceKind::Sparse));
	for pair in hits.windows(2) {
		assert!(pair[0].score >= pair[1].score);
		if pair[0].score == pair[1].score { assert!(pair[0].id < pair[1].id); }
	}
}

#[test]
fn queries_are_analyzed_like_documents() {
	let tmp = TempDir::new().expect("tmp");
	let index = SparseIndex::build(tmp.path(), &corpus()).expect("build");
	let hits = index.search("LIGHTHOUSE?!", 5).expect("search");
	assert_eq!(hits.iter().map(|h| h.id).collect::<Vec<_>>(), vec![1]);
	assert!(index.search("the and of", 5).expect("search").is_empty(), "stop words only");
	assert!(index.search("   ", 5).expect("search").is_empty());
	assert!(index.search("volcano", 5).expect("search").is_empty());
}

#[test]
fn k_bounds_the_result_list() {
	let tmp = TempDir::new().expect("tmp");
	let index = SparseIndex::build(tmp.path(), &corpus()).expect("build");
	assert!(index.search("harbor", 0).expect("search").is_empty());
	assert_eq!(index.search("harbor tanker", 1).expect("search").len(), 1);
	assert_eq!(index.search("harbor tanker storms lighthouse", 50).expect("search").len(), 4);
}

#[test]
fn huge_k_returns_every_match() {
	let tmp = TempDir::new().expect("tmp");
	let index = SparseIndex::build(tmp.path(), &corpus()).expect("build");
	assert_eq!(index.search("harbor", 2_000_000_000).expect("search").len(), 3);
	assert_eq!(index.search("harbor tanker storms lighthouse", usize::MAX).expect("search").len(), 4);
}

#[test]
fn repeated_text_ties_resolve_to_lowest_ids() {
	let tmp = TempDir::new().expect("tmp");
	let chunks: Vec<Chunk> = (0..30u32)
		.map(|id| {
			let text = if id % 2 == 1 { "Annual report running header".to_string() } else { format!("Orchard note {id} about cider") };
			Chunk { id, text, page: id / 3 + 1, offset: 0 }
		})
		.collect();
	let index = SparseIndex::build(tmp.path(), &chunks).expect("build");
	let top: Vec<u32> = index.search("running header", 1).expect("search").iter().map(|h| h.id).collect();
	assert_eq!(top, vec![1]);
	let top3: Vec<u32> = index.search("running header", 3).expect("search").iter().map(|h| h.id).collect();
	assert_eq!(top3, vec![1, 3, 5]);
}
