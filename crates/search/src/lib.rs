// crates/search/src/lib.rs
//! The search engine facade (C5, §4.5): dense + lexical + hybrid search over
//! an external vector-and-lexical index, consumed through `VectorStoreClient`
//! and `EmbeddingClient` rather than embedded directly in this crate.

pub mod embed;
pub mod engine;
pub mod error;
pub mod store;

pub use embed::{EmbeddingClient, HttpEmbeddingClient};
pub use engine::{SearchEngine, Weights};
pub use error::SearchError;
pub use store::{DenseHit, Facet, HttpVectorStoreClient, LexicalHit, VectorStoreClient};
