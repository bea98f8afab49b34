//! Common types for the embedding pipeline and vector index.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use vitrine_core::{ContentHash, FreshnessState, Lang, ModelVersion, ProductId, ShopId};

// ============================================================================
// Embedding records
// ============================================================================

/// The embedding of one product's content in one language under one model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmbeddingRecord {
    /// Shop the product belongs to.
    pub shop: ShopId,

    /// Product identifier.
    pub product_id: ProductId,

    /// Content language.
    pub lang: Lang,

    /// Model that produced `vector`.
    pub model: ModelVersion,

    /// The embedding; `model.dimension` components.
    pub vector: Vec<f32>,

    /// Snapshot hash the vector was computed from.
    pub content_hash: ContentHash,

    /// Snapshot revision the vector was computed from.
    pub source_revision: u64,

    /// Freshness of this record.
    pub state: FreshnessState,

    /// When the vector was last written.
    pub updated_at: DateTime<Utc>,

    /// Set while the record is soft-deleted.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tombstoned_at: Option<DateTime<Utc>>,
}

impl EmbeddingRecord {
    /// Whether the record is soft-deleted.
    pub fn is_tombstoned(&self) -> bool {
        self.tombstoned_at.is_some()
    }

    /// Whether the record is FRESH for `hash`.
    pub fn is_fresh_for(&self, hash: &ContentHash) -> bool {
        self.state == FreshnessState::Fresh && &self.content_hash == hash
    }

    /// The index entry carrying this record's vector.
    pub fn to_index_entry(&self) -> IndexEntry {
        IndexEntry {
            product_id: self.product_id.clone(),
            lang: self.lang.clone(),
            model: self.model.clone(),
            vector: self.vector.clone(),
            content_hash: self.content_hash.clone(),
            revision: self.source_revision,
        }
    }
}

// ============================================================================
// Index types
// ============================================================================

/// Identifies one index partition.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PartitionKey {
    /// Shop.
    pub shop: ShopId,
    /// Language.
    pub lang: Lang,
}

impl PartitionKey {
    /// Create a partition key.
    pub fn new(shop: ShopId, lang: Lang) -> Self {
        Self { shop, lang }
    }
}

impl fmt::Display for PartitionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.shop, self.lang)
    }
}

/// A vector stored in the index.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexEntry {
    /// Product identifier; unique within a partition.
    pub product_id: ProductId,

    /// Language of the partition the entry belongs to.
    pub lang: Lang,

    /// Model that produced `vector`.
    pub model: ModelVersion,

    /// The embedding.
    pub vector: Vec<f32>,

    /// Snapshot hash the vector was computed from.
    pub content_hash: ContentHash,

    /// Snapshot revision; orders concurrent writes.
    pub revision: u64,
}

/// A nearest-neighbour hit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexHit {
    /// Product identifier.
    pub product_id: ProductId,

    /// Partition language the hit came from.
    pub lang: Lang,

    /// Cosine similarity to the query vector.
    pub similarity: f32,

    /// `1 - similarity`.
    pub distance: f32,
}

/// What an index write did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IndexWrite {
    /// No entry existed for the product.
    Inserted,
    /// An older or equal-revision entry was replaced.
    Replaced,
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn record() -> EmbeddingRecord {
        EmbeddingRecord {
            shop: ShopId::from("shop"),
            product_id: ProductId::from("p1"),
            lang: Lang::from("en"),
            model: ModelVersion::new("mock", 2),
            vector: vec![0.6, 0.8],
            content_hash: ContentHash::from_hex("abc"),
            source_revision: 3,
            state: FreshnessState::Fresh,
            updated_at: Utc::now(),
            tombstoned_at: None,
        }
    }

    #[test]
    fn test_is_fresh_for() {
        let rec = record();
        assert!(rec.is_fresh_for(&ContentHash::from_hex("abc")));
        assert!(!rec.is_fresh_for(&ContentHash::from_hex("def")));

        let failed = EmbeddingRecord {
            state: FreshnessState::Failed,
            ..record()
        };
        assert!(!failed.is_fresh_for(&ContentHash::from_hex("abc")));
    }

    #[test]
    fn test_to_index_entry() {
        let entry = record().to_index_entry();
        assert_eq!(entry.product_id, ProductId::from("p1"));
        assert_eq!(entry.revision, 3);
        assert_eq!(entry.vector, vec![0.6, 0.8]);
    }

    #[test]
    fn test_record_serialization_skips_empty_tombstone() {
        let json = serde_json::to_string(&record()).unwrap();
        assert!(json.contains("\"state\":\"FRESH\""));
        assert!(!json.contains("tombstoned_at"));
    }

    #[test]
    fn test_partition_key_display() {
        let key = PartitionKey::new(ShopId::from("s"), Lang::from("hu"));
        assert_eq!(key.to_string(), "s/hu");
    }
}
