//! Multimodal search over acquired pages.
//!
//! - `embeddings`: client for the remote embedding service
//! - `fusion`: cosine similarity, normalization and weighted fusion
//! - `preprocess`: text input for an item
//! - `ranker`: corpus embedding and ranking

pub mod embeddings;
pub mod fusion;
mod preprocess;
pub mod ranker;

pub use embeddings::EmbeddingClient;
pub use ranker::{CorpusItem, SearchRanker};
