use crate::types::PageText;

/// Maps text to fixed-dimension vectors.
///
/// Implementations must be deterministic (or near enough that the same text
/// lands on the same neighbours) and must return exactly `dim()` values per
/// input, in input order.
pub trait Embedder: Send + Sync {
    /// Stable identifier for the provider/model (e.g. `hash:xxh64:d384`).
    fn embedder_id(&self) -> &str;
    fn dim(&self) -> usize;
    fn max_len(&self) -> usize;
    fn embed_batch(&self, texts: &[String]) -> anyhow::Result<Vec<Vec<f32>>>;
}

/// Turns raw document bytes into pages of text in reading order.
pub trait TextExtractor: Send + Sync {
    fn extract(&self, bytes: &[u8]) -> crate::Result<Vec<PageText>>;
}
