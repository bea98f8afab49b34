//! Vitrine: multi-lingual product retrieval core.
//!
//! Keeps per-language content snapshots of catalog products, keeps their
//! embeddings fresh, and serves similarity-ranked retrieval that falls back
//! to a shop's default language when a translation is missing.
//!
//! This crate re-exports the component crates:
//!
//! | Module        | Crate               | Contents                                   |
//! |---------------|---------------------|--------------------------------------------|
//! | [`core`]      | `vitrine-core`      | errors, identifiers, hashing, configuration |
//! | [`catalog`]   | `vitrine-catalog`   | snapshot store, shop settings resolver     |
//! | [`vector`]    | `vitrine-vector`    | providers, embedding pipeline, vector index |
//! | [`sync`]      | `vitrine-sync`      | freshness ledger, sync orchestrator        |
//! | [`retrieval`] | `vitrine-retrieval` | retrieval service                          |
//!
//! # Features
//!
//! - `sync` (default): the sync orchestrator
//! - `retrieval` (default): the retrieval service

pub use vitrine_catalog as catalog;
pub use vitrine_core as core;
pub use vitrine_vector as vector;

#[cfg(feature = "retrieval")]
pub use vitrine_retrieval as retrieval;
#[cfg(feature = "sync")]
pub use vitrine_sync as sync;

pub use vitrine_catalog::{
    MemorySnapshotStore, ShopSettings, ShopSettingsResolver, SnapshotContent, SnapshotStore,
};
pub use vitrine_core::{Error, Lang, ModelVersion, ProductId, Result, ShopId, VitrineConfig};
pub use vitrine_vector::{
    EmbeddingPipeline, EmbeddingProvider, MemoryEmbeddingStore, RetryingProvider, VectorIndex,
};

#[cfg(feature = "retrieval")]
pub use vitrine_retrieval::{RetrievalResponse, RetrievalResult, RetrievalService};
#[cfg(feature = "sync")]
pub use vitrine_sync::{FreshnessObserver, LoggingObserver, SyncOrchestrator};
