//! Retrieval result types.

use serde::{Deserialize, Serialize};
use vitrine_core::{Lang, ProductId};

/// One retrieved product.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RetrievalResult {
    /// Product identifier.
    pub product_id: ProductId,

    /// Language of the partition that matched.
    pub lang: Lang,

    /// Cosine similarity to the query.
    pub similarity: f32,

    /// `1 - similarity`.
    pub distance: f32,

    /// Display name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    /// Snapshot title.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,

    /// Plain-text description.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl RetrievalResult {
    /// Whether display fields were filled in.
    pub fn is_hydrated(&self) -> bool {
        self.title.is_some()
    }
}

/// The answer to one retrieval call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RetrievalResponse {
    /// Results, similarity descending, ties by product id ascending.
    pub results: Vec<RetrievalResult>,

    /// True when the requested language was substituted or results were
    /// topped up from the default language.
    pub fallback_applied: bool,

    /// Language the caller asked for.
    pub requested_lang: Lang,

    /// Language whose partition was queried first.
    pub resolved_lang: Lang,
}

impl RetrievalResponse {
    /// A response with no results.
    pub fn empty(requested_lang: Lang, resolved_lang: Lang, fallback_applied: bool) -> Self {
        Self {
            results: Vec::new(),
            fallback_applied,
            requested_lang,
            resolved_lang,
        }
    }

    /// Number of results.
    pub fn len(&self) -> usize {
        self.results.len()
    }

    /// Whether there are no results.
    pub fn is_empty(&self) -> bool {
        self.results.is_empty()
    }

    /// Product ids in result order.
    pub fn product_ids(&self) -> Vec<&ProductId> {
        self.results.iter().map(|r| &r.product_id).collect()
    }
}
