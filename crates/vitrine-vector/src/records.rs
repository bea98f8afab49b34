//! Embedding record storage.
//!
//! Records are keyed by (shop, product, language, model version). A record
//! carries the content hash and revision it was computed from, which is what
//! lets the pipeline skip the provider when content has not moved.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use tokio::sync::RwLock;
use vitrine_core::{FreshnessState, Lang, ModelVersion, ProductId, Result, ShopId};

use crate::types::EmbeddingRecord;

/// Storage for embedding records.
#[async_trait]
pub trait EmbeddingStore: Send + Sync {
    /// Fetch a record, tombstoned or not.
    async fn get(
        &self,
        shop: &ShopId,
        product_id: &ProductId,
        lang: &Lang,
        model: &ModelVersion,
    ) -> Result<Option<EmbeddingRecord>>;

    /// Insert or replace a record.
    async fn put(&self, record: EmbeddingRecord) -> Result<()>;

    /// Mark an existing record FAILED. Returns `false` when no record exists.
    async fn mark_failed(
        &self,
        shop: &ShopId,
        product_id: &ProductId,
        lang: &Lang,
        model: &ModelVersion,
    ) -> Result<bool>;

    /// Soft-delete the records of (shop, product, lang) under every model.
    async fn tombstone(
        &self,
        shop: &ShopId,
        product_id: &ProductId,
        lang: &Lang,
        at: DateTime<Utc>,
    ) -> Result<usize>;

    /// Soft-delete every record of a shop's product.
    async fn tombstone_product(
        &self,
        shop: &ShopId,
        product_id: &ProductId,
        at: DateTime<Utc>,
    ) -> Result<usize>;

    /// Reverse a tombstone. Returns the restored record, if any.
    async fn restore(
        &self,
        shop: &ShopId,
        product_id: &ProductId,
        lang: &Lang,
        model: &ModelVersion,
    ) -> Result<Option<EmbeddingRecord>>;

    /// Hard-delete records tombstoned before `older_than`.
    async fn purge_tombstoned(&self, older_than: DateTime<Utc>) -> Result<usize>;
}

type RecordKey = (ShopId, ProductId, Lang, ModelVersion);

/// In-memory [`EmbeddingStore`].
#[derive(Debug, Default)]
pub struct MemoryEmbeddingStore {
    records: RwLock<HashMap<RecordKey, EmbeddingRecord>>,
}

impl MemoryEmbeddingStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored records, tombstoned ones included.
    pub async fn len(&self) -> usize {
        self.records.read().await.len()
    }

    /// Whether the store is empty.
    pub async fn is_empty(&self) -> bool {
        self.records.read().await.is_empty()
    }

    fn key(shop: &ShopId, product_id: &ProductId, lang: &Lang, model: &ModelVersion) -> RecordKey {
        (shop.clone(), product_id.clone(), lang.clone(), model.clone())
    }
}

#[async_trait]
impl EmbeddingStore for MemoryEmbeddingStore {
    async fn get(
        &self,
        shop: &ShopId,
        product_id: &ProductId,
        lang: &Lang,
        model: &ModelVersion,
    ) -> Result<Option<EmbeddingRecord>> {
        let records = self.records.read().await;
        Ok(records.get(&Self::key(shop, product_id, lang, model)).cloned())
    }

    async fn put(&self, record: EmbeddingRecord) -> Result<()> {
        let key = Self::key(&record.shop, &record.product_id, &record.lang, &record.model);
        self.records.write().await.insert(key, record);
        Ok(())
    }

    async fn mark_failed(
        &self,
        shop: &ShopId,
        product_id: &ProductId,
        lang: &Lang,
        model: &ModelVersion,
    ) -> Result<bool> {
        let mut records = self.records.write().await;
        match records.get_mut(&Self::key(shop, product_id, lang, model)) {
            Some(record) => {
                record.state = FreshnessState::Failed;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn tombstone(
        &self,
        shop: &ShopId,
        product_id: &ProductId,
        lang: &Lang,
        at: DateTime<Utc>,
    ) -> Result<usize> {
        let mut records = self.records.write().await;
        let mut count = 0;
        for ((s, p, l, _), record) in records.iter_mut() {
            if s == shop && p == product_id && l == lang && !record.is_tombstoned() {
                record.tombstoned_at = Some(at);
                count += 1;
            }
        }
        Ok(count)
    }

    async fn tombstone_product(
        &self,
        shop: &ShopId,
        product_id: &ProductId,
        at: DateTime<Utc>,
    ) -> Result<usize> {
        let mut records = self.records.write().await;
        let mut count = 0;
        for ((s, p, _, _), record) in records.iter_mut() {
            if s == shop && p == product_id && !record.is_tombstoned() {
                record.tombstoned_at = Some(at);
                count += 1;
            }
        }
        Ok(count)
    }

    async fn restore(
        &self,
        shop: &ShopId,
        product_id: &ProductId,
        lang: &Lang,
        model: &ModelVersion,
    ) -> Result<Option<EmbeddingRecord>> {
        let mut records = self.records.write().await;
        match records.get_mut(&Self::key(shop, product_id, lang, model)) {
            Some(record) if record.is_tombstoned() => {
                record.tombstoned_at = None;
                Ok(Some(record.clone()))
            }
            _ => Ok(None),
        }
    }

    async fn purge_tombstoned(&self, older_than: DateTime<Utc>) -> Result<usize> {
        let mut records = self.records.write().await;
        let before = records.len();
        records.retain(|_, r| r.tombstoned_at.is_none_or(|at| at >= older_than));
        let purged = before - records.len();
        if purged > 0 {
            log::info!("Purged {purged} tombstoned embedding record(s)");
        }
        Ok(purged)
    }
}

// ============================================================================
// Tests
// ============================================================================
