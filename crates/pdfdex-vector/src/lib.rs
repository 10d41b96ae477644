//! pdfdex-vector
//!
//! Dense retrieval on LanceDB: one `embeddings(chunk_id, vector)` table per
//! build, cosine distance, exact search for small documents and IVF-PQ once a
//! document is large enough to train one.

pub mod index_build;
pub mod schema;
pub mod search;
pub mod table;
pub mod writer;

pub use writer::{embed_blocking, DenseBuildOptions, DenseIndex};
