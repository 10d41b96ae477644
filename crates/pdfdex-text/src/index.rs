use anyhow::{Context, Result, bail};
use std::path::Path;
use tantivy::collector::TopDocs;
use tantivy::query::{BooleanQuery, Occur, Query, TermQuery};
use tantivy::schema::{Field, IndexRecordOption, Value};
use tantivy::tokenizer::TokenStream;
use tantivy::{doc, Index, IndexReader, IndexWriter, ReloadPolicy, TantivyDocument, Term};
use tracing::{debug, info};

use pdfdex_core::types::{Chunk, ChunkId, SearchHit, SourceKind};

use crate::tantivy_utils::{build_schema, register_tokenizer, CHUNK_ID_FIELD, TEXT_FIELD};

const WRITER_MEMORY_BYTES: usize = 50_000_000;
/// Extra hits collected past `k` so equal scores at the cut can be resolved by id.
const TIE_SLACK: usize = 8;

/// BM25 index over chunk text, keyed by chunk id. Read-only once built.
pub struct SparseIndex {
	index: Index,
	reader: IndexReader,
	chunk_id_field: Field,
	text_field: Field,
}

impl SparseIndex {
	/// Indexes `chunks` into a fresh tantivy index under `index_dir`.
	///
	/// A single writer thread keeps documents in one segment in chunk order.
	pub fn build(index_dir: &Path, chunks: &[Chunk]) -> Result<Self> {
		if chunks.is_empty() { bail!("refusing to build a sparse index over zero chunks"); }
		std::fs::create_dir_all(index_dir).with_context(|| format!("creating {}", index_dir.display()))?;
		let index = Index::create_in_dir(index_dir, build_schema())?;
		register_tokenizer(&index);
		let (chunk_id_field, text_field) = fields(&index)?;

		let mut writer: IndexWriter = index.writer_with_num_threads(1, WRITER_MEMORY_BYTES)?;
		for c in chunks {
			writer.add_document(doc!(
				chunk_id_field => u64::from(c.id),
				text_field => c.text.clone(),
			))?;
		}
		writer.commit()?;
		writer.wait_merging_threads()?;
		info!(chunks = chunks.len(), dir = %index_dir.display(), "sparse index built");
		Self::from_index(index)
	}

	pub fn open(index_dir: &Path) -> Result<Self> {
		let index = Index::open_in_dir(index_dir).with_context(|| format!("opening sparse index at {}", index_dir.display()))?;
		register_tokenizer(&index);
		Self::from_index(index)
	}

	fn from_index(index: Index) -> Result<Self> {
		let (chunk_id_field, text_field) = fields(&index)?;
		let reader = index.reader_builder().reload_policy(ReloadPolicy::Manual).try_into()?;
		Ok(Self { index, reader, chunk_id_field, text_field })
	}

	pub fn num_chunks(&self) -> u64 {
		self.reader.searcher().num_docs()
	}

	/// Runs `text` through the analyzer registered for the text field.
	pub fn analyze(&self, text: &str) -> Result<Vec<String>> {
		let mut analyzer = self.index.tokenizer_for_field(self.text_field)?;
		let mut stream = analyzer.token_stream(text);
		let mut terms: Vec<String> = Vec::new();
		while stream.advance() {
			let term = &stream.token().text;
			if !terms.contains(term) { terms.push(term.clone()); }
		}
		Ok(terms)
	}

	/// Top `k` chunks by BM25, best first; equal scores order by chunk id.
	///
	/// Query terms are OR-ed, so free text never fails to parse. A query with
	/// no indexable terms (only stop words or punctuation) matches nothing.
	/// `k` is capped at the number of indexed chunks, and the collector limit
	/// widens past `k` while the score at the cut is tied.
	pub fn search(&self, query: &str, k: usize) -> Result<Vec<SearchHit>> {
		let searcher = self.reader.searcher();
		let total = usize::try_from(searcher.num_docs()).unwrap_or(usize::MAX);
		let k = k.min(total);
		if k == 0 { return Ok(Vec::new()); }
		let terms = self.analyze(query)?;
		if terms.is_empty() { debug!(query, "query has no indexable terms"); return Ok(Vec::new()); }
		let clauses: Vec<(Occur, Box<dyn Query>)> = terms
			.iter()
			.map(|t| {
				let q: Box<dyn Query> = Box::new(TermQuery::new(Term::from_field_text(self.text_field, t), IndexRecordOption::WithFreqs));
				(Occur::Should, q)
			})
			.collect();
		let q = BooleanQuery::new(clauses);

		let mut limit = k.saturating_add(TIE_SLACK).min(total);
		let mut hits = loop {
			let mut hits = Vec::with_capacity(limit);
			for (score, addr) in searcher.search(&q, &TopDocs::with_limit(limit))? {
				let doc: TantivyDocument = searcher.doc(addr)?;
				let raw = doc.get_first(self.chunk_id_field).and_then(|v| v.as_u64()).context("document without chunk_id")?;
				let id = ChunkId::try_from(raw).context("chunk_id out of range")?;
				hits.push(SearchHit { id, score, source: SourceKind::Sparse });
			}
			hits.sort_by(|a, b| b.score.total_cmp(&a.score).then(a.id.cmp(&b.id)));
			let tied_at_cut = hits.len() == limit && hits.len() > k && hits[limit - 1].score == hits[k - 1].score;
			if !tied_at_cut || limit >= total { break hits; }
			limit = limit.saturating_mul(2).min(total);
		};
		hits.truncate(k);
		debug!(query, terms = terms.len(), hits = hits.len(), "sparse search");
		Ok(hits)
	}
}

fn fields(index: &Index) -> Result<(Field, Field)> {
	let schema = index.schema();
	Ok((schema.get_field(CHUNK_ID_FIELD)?, schema.get_field(TEXT_FIELD)?))
}

#[cfg(test)]
mod tests {
	use super::*;

	fn chunks(texts: &[&str]) -> Vec<Chunk> {
		texts.iter().zip(0u32..).map(|(t, id)| Chunk { id, text: (*t).to_string(), page: 1, offset: 0 }).collect()
	}

	#[test]
	fn analyzer_lowercases_and_drops_stop_words() -> Result<()> {
		let dir = tempfile::tempdir()?;
		let idx = SparseIndex::build(dir.path(), &chunks(&["x"]))?;
		assert_eq!(idx.analyze("The Harbor, and THE pier!")?, vec!["harbor".to_string(), "pier".to_string()]);
		Ok(())
	}

	#[test]
	fn zero_chunks_are_rejected() {
		let dir = tempfile::tempdir().expect("tmp");
		assert!(SparseIndex::build(dir.path(), &[]).is_err());
	}
}
