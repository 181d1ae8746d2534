//! Cosine similarity and brute-force top-K retrieval over embedding vectors.
//!
//! Everything here is a pure function over its inputs: no shared state, safe
//! to call from any number of concurrent readers.

mod cosine;
mod error;
mod index;

pub use cosine::cosine_similarity;
pub use error::{Result, SimilarityError};
pub use index::SimilarityIndex;
