//! Domain types shared by the extractor, chunker, and both index engines.

use serde::{Deserialize, Serialize};

/// Dense 0-based chunk number; the join key between the dense and sparse index.
pub type ChunkId = u32;

/// Raw text of one document page as returned by an extractor.
///
/// `page` is 1-based and follows reading order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageText {
    pub page: u32,
    pub text: String,
}

/// A paragraph of normalized text on a given page.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TextUnit {
    pub page: u32,
    pub paragraph: u32,
    pub text: String,
}

/// A retrievable span of document text.
///
/// - `id`: position in the chunk table, dense over `0..N`
/// - `text`: the payload handed to the caller on retrieval
/// - `page`/`offset`: source page and char offset of the span within that page's text
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Chunk {
    pub id: ChunkId,
    pub text: String,
    pub page: u32,
    pub offset: usize,
}

/// Indicates which engine produced a result.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum SourceKind {
    Dense,
    Sparse,
}

/// The minimal surface returned by both engines.
///
/// `score` is engine-specific: cosine distance for [`SourceKind::Dense`]
/// (lower is better) and BM25 for [`SourceKind::Sparse`] (higher is better).
/// Lists of hits are always ordered best first.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SearchHit {
    pub id: ChunkId,
    pub score: f32,
    pub source: SourceKind,
}
