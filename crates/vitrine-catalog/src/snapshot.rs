//! Snapshot store: the latest content per (product, language).
//!
//! A snapshot is what the upstream content/translation collaborator knows
//! about one product in one language. The store validates it, hashes it
//! canonically, and reports whether the hash moved. It never schedules
//! embedding work itself.
//!
//! Tombstoned snapshots stay in the store (so a language can be re-enabled
//! cheaply) but are invisible to `get` and `list_languages` until restored
//! or purged.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};
use tokio::sync::RwLock;
use vitrine_core::{CanonicalDocument, ContentHash, Error, Lang, ProductId, Result, content_hash};

// ============================================================================
// Types
// ============================================================================

/// Content fields of a snapshot as delivered by the content collaborator.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SnapshotContent {
    /// Product title. Required, must not be blank.
    pub title: String,

    /// Rich-text (HTML) description.
    #[serde(default)]
    pub description: String,

    /// Structured specification document.
    #[serde(default)]
    pub specs: CanonicalDocument,

    /// Structured FAQ document.
    #[serde(default)]
    pub faq: CanonicalDocument,
}

impl SnapshotContent {
    /// Create content with a title and no other fields.
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            ..Default::default()
        }
    }

    /// Set the rich-text description.
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    /// Set the specs document.
    pub fn with_specs(mut self, specs: impl Into<CanonicalDocument>) -> Self {
        self.specs = specs.into();
        self
    }

    /// Set the FAQ document.
    pub fn with_faq(mut self, faq: impl Into<CanonicalDocument>) -> Self {
        self.faq = faq.into();
        self
    }

    /// Reject content that cannot be stored.
    pub fn validate(&self) -> Result<()> {
        if self.title.trim().is_empty() {
            return Err(Error::validation("snapshot title must not be empty"));
        }
        Ok(())
    }

    /// Canonical hash over every content field.
    pub fn content_hash(&self) -> ContentHash {
        content_hash(&self.title, &self.description, &self.specs, &self.faq)
    }
}

/// A stored snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProductSnapshot {
    /// Product identifier.
    pub product_id: ProductId,

    /// Content language.
    pub lang: Lang,

    /// Content as last upserted.
    pub content: SnapshotContent,

    /// Hash of `content`.
    pub content_hash: ContentHash,

    /// Starts at 1 and increases on every content change.
    pub revision: u64,

    /// When the content last changed.
    pub updated_at: DateTime<Utc>,

    /// Set while the snapshot is soft-deleted.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tombstoned_at: Option<DateTime<Utc>>,
}

impl ProductSnapshot {
    /// Whether the snapshot is soft-deleted.
    pub fn is_tombstoned(&self) -> bool {
        self.tombstoned_at.is_some()
    }
}

/// How an upsert compared with the previously stored snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UpsertOutcome {
    /// No snapshot existed for the key.
    New,
    /// The content hash differs from the stored one.
    Changed,
    /// Same hash; nothing was rewritten.
    Unchanged,
}

impl UpsertOutcome {
    /// Whether the content needs (re-)embedding.
    pub fn needs_embedding(self) -> bool {
        !matches!(self, Self::Unchanged)
    }
}

/// Result of [`SnapshotStore::upsert`].
#[derive(Debug, Clone)]
pub struct UpsertResult {
    /// Change classification.
    pub outcome: UpsertOutcome,

    /// The snapshot as stored after the upsert.
    pub snapshot: ProductSnapshot,
}

// ============================================================================
// Store trait
// ============================================================================

/// Storage for per-language product snapshots.
///
/// Point lookups are keyed by (product, language). Implementations must be
/// safe to share across tasks.
#[async_trait]
pub trait SnapshotStore: Send + Sync {
    /// Validate, hash, and store content for (product, lang).
    ///
    /// Upserting over a tombstoned snapshot updates its content but keeps the
    /// tombstone; only [`SnapshotStore::restore`] revives it.
    async fn upsert(
        &self,
        product_id: &ProductId,
        lang: &Lang,
        content: SnapshotContent,
    ) -> Result<UpsertResult>;

    /// Fetch the live snapshot for (product, lang).
    async fn get(&self, product_id: &ProductId, lang: &Lang) -> Result<ProductSnapshot>;

    /// Fetch a snapshot whether or not it is tombstoned.
    async fn get_any(&self, product_id: &ProductId, lang: &Lang) -> Result<ProductSnapshot>;

    /// Languages with a live snapshot for the product.
    async fn list_languages(&self, product_id: &ProductId) -> Result<BTreeSet<Lang>>;

    /// Soft-delete one snapshot. Returns `false` if it was absent or
    /// already tombstoned.
    async fn tombstone(&self, product_id: &ProductId, lang: &Lang, at: DateTime<Utc>)
    -> Result<bool>;

    /// Soft-delete every language of a product. Returns the number tombstoned.
    async fn tombstone_product(&self, product_id: &ProductId, at: DateTime<Utc>) -> Result<usize>;

    /// Reverse a tombstone. Returns `false` if there was nothing to restore.
    async fn restore(&self, product_id: &ProductId, lang: &Lang) -> Result<bool>;

    /// Hard-delete snapshots tombstoned before `older_than`.
    async fn purge_tombstoned(&self, older_than: DateTime<Utc>) -> Result<usize>;
}

// ============================================================================
// In-memory implementation
// ============================================================================

type SnapshotKey = (ProductId, Lang);

/// In-memory [`SnapshotStore`].
#[derive(Debug, Default)]
pub struct MemorySnapshotStore {
    snapshots: RwLock<HashMap<SnapshotKey, ProductSnapshot>>,
}

impl MemorySnapshotStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored snapshots, tombstoned ones included.
    pub async fn len(&self) -> usize {
        self.snapshots.read().await.len()
    }

    /// Whether the store holds no snapshots at all.
    pub async fn is_empty(&self) -> bool {
        self.snapshots.read().await.is_empty()
    }
}

fn not_found(product_id: &ProductId, lang: &Lang) -> Error {
    Error::not_found(format!("snapshot {product_id}/{lang}"))
}

#[async_trait]
impl SnapshotStore for MemorySnapshotStore {
    async fn upsert(
        &self,
        product_id: &ProductId,
        lang: &Lang,
        content: SnapshotContent,
    ) -> Result<UpsertResult> {
        content.validate()?;
        let hash = content.content_hash();
        let key = (product_id.clone(), lang.clone());

        let mut snapshots = self.snapshots.write().await;
        let result = match snapshots.get_mut(&key) {
            Some(existing) if existing.content_hash == hash => UpsertResult {
                outcome: UpsertOutcome::Unchanged,
                snapshot: existing.clone(),
            },
            Some(existing) => {
                existing.content = content;
                existing.content_hash = hash;
                existing.revision += 1;
                existing.updated_at = Utc::now();
                UpsertResult {
                    outcome: UpsertOutcome::Changed,
                    snapshot: existing.clone(),
                }
            }
            None => {
                let snapshot = ProductSnapshot {
                    product_id: product_id.clone(),
                    lang: lang.clone(),
                    content,
                    content_hash: hash,
                    revision: 1,
                    updated_at: Utc::now(),
                    tombstoned_at: None,
                };
                snapshots.insert(key, snapshot.clone());
                UpsertResult {
                    outcome: UpsertOutcome::New,
                    snapshot,
                }
            }
        };

        log::debug!(
            "Snapshot {}/{} upserted: {:?} (rev {}, hash {})",
            product_id,
            lang,
            result.outcome,
            result.snapshot.revision,
            result.snapshot.content_hash.short()
        );
        Ok(result)
    }

    async fn get(&self, product_id: &ProductId, lang: &Lang) -> Result<ProductSnapshot> {
        let snapshots = self.snapshots.read().await;
        snapshots
            .get(&(product_id.clone(), lang.clone()))
            .filter(|s| !s.is_tombstoned())
            .cloned()
            .ok_or_else(|| not_found(product_id, lang))
    }

    async fn get_any(&self, product_id: &ProductId, lang: &Lang) -> Result<ProductSnapshot> {
        let snapshots = self.snapshots.read().await;
        snapshots
            .get(&(product_id.clone(), lang.clone()))
            .cloned()
            .ok_or_else(|| not_found(product_id, lang))
    }

    async fn list_languages(&self, product_id: &ProductId) -> Result<BTreeSet<Lang>> {
        let snapshots = self.snapshots.read().await;
        Ok(snapshots
            .values()
            .filter(|s| &s.product_id == product_id && !s.is_tombstoned())
            .map(|s| s.lang.clone())
            .collect())
    }

    async fn tombstone(
        &self,
        product_id: &ProductId,
        lang: &Lang,
        at: DateTime<Utc>,
    ) -> Result<bool> {
        let mut snapshots = self.snapshots.write().await;
        match snapshots.get_mut(&(product_id.clone(), lang.clone())) {
            Some(snapshot) if !snapshot.is_tombstoned() => {
                snapshot.tombstoned_at = Some(at);
                log::debug!("Snapshot {product_id}/{lang} tombstoned");
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn tombstone_product(&self, product_id: &ProductId, at: DateTime<Utc>) -> Result<usize> {
        let mut snapshots = self.snapshots.write().await;
        let mut count = 0;
        for snapshot in snapshots.values_mut() {
            if &snapshot.product_id == product_id && !snapshot.is_tombstoned() {
                snapshot.tombstoned_at = Some(at);
                count += 1;
            }
        }
        log::debug!("Tombstoned {count} snapshot(s) of product {product_id}");
        Ok(count)
    }

    async fn restore(&self, product_id: &ProductId, lang: &Lang) -> Result<bool> {
        let mut snapshots = self.snapshots.write().await;
        match snapshots.get_mut(&(product_id.clone(), lang.clone())) {
            Some(snapshot) if snapshot.is_tombstoned() => {
                snapshot.tombstoned_at = None;
                log::debug!("Snapshot {product_id}/{lang} restored");
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn purge_tombstoned(&self, older_than: DateTime<Utc>) -> Result<usize> {
        let mut snapshots = self.snapshots.write().await;
        let before = snapshots.len();
        snapshots.retain(|_, s| s.tombstoned_at.is_none_or(|at| at >= older_than));
        let purged = before - snapshots.len();
        if purged > 0 {
            log::info!("Purged {purged} tombstoned snapshot(s)");
        }
        Ok(purged)
    }
}

// ============================================================================
// Tests
// ============================================================================
