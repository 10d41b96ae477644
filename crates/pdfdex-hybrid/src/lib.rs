//! pdfdex-hybrid
//!
//! Ties the pieces together: the build pipeline (extract, chunk, index,
//! publish), the on-disk index store, rank fusion, and the query engine that
//! answers `(bundle dir, query, k)` with ranked chunk texts.

pub mod engine;
pub mod fusion;
pub mod pipeline;
pub mod store;

pub use engine::{HybridQueryEngine, RetrievedChunk};
pub use fusion::{fuse, FusedHit};
pub use pipeline::{BuildReport, BuildRequest, Indexer};
pub use store::{IndexBundle, Manifest};
