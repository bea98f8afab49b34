//! Vitrine Core: shared types, errors, canonical hashing, and configuration.
//!
//! This crate provides the foundational types used across all Vitrine crates.
//! It has no internal Vitrine dependencies (dependency level 0).
//!
//! # Modules
//!
//! - [`error`]: Error taxonomy and Result alias
//! - [`types`]: Identifiers, model versions, freshness states
//! - [`canonical`]: Canonical documents and content hashing
//! - [`config`]: File + environment configuration loading

pub mod canonical;
pub mod config;
pub mod error;
pub mod types;

// Re-export key types at crate root for convenience
pub use canonical::{CanonicalDocument, content_hash};
pub use config::VitrineConfig;
pub use error::{Error, Result};
pub use types::{ContentHash, FreshnessState, Lang, ModelVersion, ProductId, ShopId};
