//! Embedding pipeline and vector index for Vitrine.
//!
//! This crate turns product snapshots into embeddings and keeps them in a
//! partitioned in-memory index that the retrieval service queries.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                     vitrine-vector                          │
//! ├─────────────────────────────────────────────────────────────┤
//! │  EmbeddingProvider trait                                    │
//! │  ├── MockEmbeddingProvider (deterministic, for tests)       │
//! │  └── RetryingProvider (exponential backoff wrapper)         │
//! ├─────────────────────────────────────────────────────────────┤
//! │  embedding_text (HTML → text, canonical specs/FAQ, cut)     │
//! │  EmbeddingStore trait + MemoryEmbeddingStore                │
//! │  EmbeddingPipeline::ensure (hash-gated embed + index)       │
//! ├─────────────────────────────────────────────────────────────┤
//! │  VectorIndex (per shop+language partitions, ArcSwap reads)  │
//! │  cosine_similarity / cosine_distance                        │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Example
//!
//! ```rust,ignore
//! use vitrine_vector::{
//!     EmbeddingPipeline, MemoryEmbeddingStore, MockEmbeddingProvider,
//!     RetryingProvider, VectorIndex,
//! };
//! use std::sync::Arc;
//!
//! let provider = Arc::new(RetryingProvider::new(Arc::new(MockEmbeddingProvider::new(384))));
//! let index = Arc::new(VectorIndex::new());
//! let pipeline = EmbeddingPipeline::new(provider, Arc::new(MemoryEmbeddingStore::new()), index.clone());
//!
//! let report = pipeline.ensure(&shop, &snapshot, pipeline.model()).await?;
//! let hits = index.query(&shop, &snapshot.lang, &query_vector, 10)?;
//! ```

pub mod embedding;
pub mod index;
pub mod pipeline;
pub mod records;
pub mod retry;
pub mod similarity;
pub mod text;
pub mod types;

// Re-exports: types
pub use types::{EmbeddingRecord, IndexEntry, IndexHit, IndexWrite, PartitionKey};

// Re-exports: providers
pub use embedding::{EmbeddingProvider, MockEmbeddingProvider};
pub use retry::RetryingProvider;

// Re-exports: pipeline
pub use pipeline::{EmbeddingPipeline, EnsureOutcome, EnsureReport};
pub use records::{EmbeddingStore, MemoryEmbeddingStore};
pub use text::{MAX_EMBEDDING_CHARS, TEXT_RULES_VERSION, embedding_text, html_to_text};

// Re-exports: index
pub use index::VectorIndex;
pub use similarity::{cosine_distance, cosine_similarity};
