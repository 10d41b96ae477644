//! pdfdex-core
//!
//! Shared domain types, the error taxonomy, provider traits, configuration,
//! and the first two build stages (text extraction and chunking).

pub mod chunker;
pub mod config;
pub mod error;
pub mod extract;
pub mod traits;
pub mod types;

pub use error::{Error, Result};
