//! Language-aware product retrieval for Vitrine.
//!
//! [`RetrievalService`] embeds a query, searches the (shop, language)
//! partition of the vector index and tops sparse results up from the shop's
//! default language when the shop allows it. Results carry the language that
//! actually matched, so a consumer can tell translated facts from fallback
//! ones.
//!
//! # Example
//!
//! ```rust,ignore
//! use vitrine_retrieval::RetrievalService;
//!
//! let service = RetrievalService::from_config(resolver, index, snapshots, provider, &config.retrieval);
//! let response = service.retrieve(&shop, &settings, "merino sweater", &Lang::from("hu"), 5).await?;
//! for result in &response.results {
//!     println!("{} [{}] {:.3}", result.product_id, result.lang, result.similarity);
//! }
//! ```

pub mod service;
pub mod types;

pub use service::{RetrievalService, merge_with_fallback};
pub use types::{RetrievalResponse, RetrievalResult};
