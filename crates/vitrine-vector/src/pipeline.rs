//! The embedding pipeline.
//!
//! [`EmbeddingPipeline::ensure`] brings the embedding of one snapshot up to
//! date under one model version, calling the provider only when the stored
//! record does not already match the snapshot's content hash. Records and
//! index entries are written together, index first, so a stale write
//! rejected by the index never reaches the record store.

use chrono::{DateTime, Utc};
use std::sync::Arc;
use vitrine_catalog::ProductSnapshot;
use vitrine_core::{Error, FreshnessState, Lang, ModelVersion, ProductId, Result, ShopId};

use crate::embedding::EmbeddingProvider;
use crate::index::VectorIndex;
use crate::records::EmbeddingStore;
use crate::text::embedding_text;
use crate::types::EmbeddingRecord;

/// What [`EmbeddingPipeline::ensure`] had to do.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnsureOutcome {
    /// A FRESH record with the same hash existed; nothing was recomputed.
    Reused,
    /// A tombstoned FRESH record with the same hash was revived.
    Restored,
    /// The provider was called and a new record stored.
    Embedded,
}

impl EnsureOutcome {
    /// Whether the provider was called.
    pub fn called_provider(self) -> bool {
        matches!(self, Self::Embedded)
    }
}

/// Result of [`EmbeddingPipeline::ensure`].
#[derive(Debug, Clone)]
pub struct EnsureReport {
    /// What happened.
    pub outcome: EnsureOutcome,
    /// The record as stored afterwards.
    pub record: EmbeddingRecord,
}

/// Derives, stores and indexes embeddings for product snapshots.
pub struct EmbeddingPipeline {
    provider: Arc<dyn EmbeddingProvider>,
    records: Arc<dyn EmbeddingStore>,
    index: Arc<VectorIndex>,
}

impl std::fmt::Debug for EmbeddingPipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EmbeddingPipeline")
            .field("provider", &self.provider.name())
            .field("model", self.provider.model())
            .finish_non_exhaustive()
    }
}

impl EmbeddingPipeline {
    /// Create a pipeline.
    ///
    /// `provider` is used as given; wrap it in a
    /// [`RetryingProvider`](crate::retry::RetryingProvider) for retries.
    pub fn new(
        provider: Arc<dyn EmbeddingProvider>,
        records: Arc<dyn EmbeddingStore>,
        index: Arc<VectorIndex>,
    ) -> Self {
        Self {
            provider,
            records,
            index,
        }
    }

    /// The model version the provider produces.
    pub fn model(&self) -> &ModelVersion {
        self.provider.model()
    }

    /// The record store.
    pub fn records(&self) -> &Arc<dyn EmbeddingStore> {
        &self.records
    }

    /// The vector index.
    pub fn index(&self) -> &Arc<VectorIndex> {
        &self.index
    }

    /// Make sure `snapshot` has a FRESH embedding under `model` in both the
    /// record store and the (shop, lang) index partition.
    ///
    /// On a provider or dimension failure an existing record is marked
    /// FAILED and the error is returned.
    pub async fn ensure(
        &self,
        shop: &ShopId,
        snapshot: &ProductSnapshot,
        model: &ModelVersion,
    ) -> Result<EnsureReport> {
        if self.provider.model() != model {
            return Err(Error::config(format!(
                "pipeline provider produces {}, asked for {model}",
                self.provider.model()
            )));
        }
        let (product_id, lang) = (&snapshot.product_id, &snapshot.lang);

        if let Some(existing) = self.records.get(shop, product_id, lang, model).await? {
            if existing.is_fresh_for(&snapshot.content_hash) {
                return self.reuse(shop, existing).await;
            }
        }

        match self.embed(shop, snapshot, model).await {
            Ok(record) => {
                log::debug!(
                    "Embedded {product_id}/{lang} for {shop} (rev {}, hash {})",
                    record.source_revision,
                    record.content_hash.short()
                );
                Ok(EnsureReport {
                    outcome: EnsureOutcome::Embedded,
                    record,
                })
            }
            Err(e @ Error::Conflict(_)) => Err(e),
            Err(e) => {
                log::warn!("Embedding {product_id}/{lang} for {shop} failed: {e}");
                self.records.mark_failed(shop, product_id, lang, model).await?;
                Err(e)
            }
        }
    }

    async fn reuse(&self, shop: &ShopId, existing: EmbeddingRecord) -> Result<EnsureReport> {
        let (outcome, record) = if existing.is_tombstoned() {
            let restored = self
                .records
                .restore(shop, &existing.product_id, &existing.lang, &existing.model)
                .await?
                .unwrap_or(EmbeddingRecord {
                    tombstoned_at: None,
                    ..existing
                });
            (EnsureOutcome::Restored, restored)
        } else {
            (EnsureOutcome::Reused, existing)
        };

        let restored_in_index =
            self.index
                .restore(shop, &record.lang, &record.product_id, &record.model)?;
        if !restored_in_index
            && self
                .index
                .get(shop, &record.lang, &record.product_id)
                .is_none()
        {
            self.index.upsert(shop, record.to_index_entry())?;
        }

        log::debug!(
            "{outcome:?} embedding {}/{} for {shop} without a provider call",
            record.product_id,
            record.lang
        );
        Ok(EnsureReport { outcome, record })
    }

    async fn embed(
        &self,
        shop: &ShopId,
        snapshot: &ProductSnapshot,
        model: &ModelVersion,
    ) -> Result<EmbeddingRecord> {
        let text = embedding_text(&snapshot.content);
        let vector = self.provider.embed(&text).await?;
        if vector.len() != model.dimension {
            return Err(Error::dimension_mismatch(model.dimension, vector.len()));
        }

        let record = EmbeddingRecord {
            shop: shop.clone(),
            product_id: snapshot.product_id.clone(),
            lang: snapshot.lang.clone(),
            model: model.clone(),
            vector,
            content_hash: snapshot.content_hash.clone(),
            source_revision: snapshot.revision,
            state: FreshnessState::Fresh,
            updated_at: Utc::now(),
            tombstoned_at: None,
        };
        self.index.upsert(shop, record.to_index_entry())?;
        self.records.put(record.clone()).await?;
        Ok(record)
    }

    /// Tombstone the record and index entry of (product, lang).
    pub async fn tombstone(
        &self,
        shop: &ShopId,
        product_id: &ProductId,
        lang: &Lang,
        at: DateTime<Utc>,
    ) -> Result<()> {
        self.records.tombstone(shop, product_id, lang, at).await?;
        self.index.tombstone(shop, lang, product_id, at)?;
        Ok(())
    }

    /// Tombstone every record and index entry of a product.
    pub async fn tombstone_product(
        &self,
        shop: &ShopId,
        product_id: &ProductId,
        at: DateTime<Utc>,
    ) -> Result<()> {
        self.records.tombstone_product(shop, product_id, at).await?;
        self.index.tombstone_product(shop, product_id, at)?;
        Ok(())
    }

    /// Hard-delete records and index entries tombstoned before `older_than`.
    /// Returns the number of records removed.
    pub async fn purge_tombstoned(&self, older_than: DateTime<Utc>) -> Result<usize> {
        let purged = self.records.purge_tombstoned(older_than).await?;
        self.index.purge_tombstoned(older_than)?;
        Ok(purged)
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::embedding::MockEmbeddingProvider;
    use crate::records::MemoryEmbeddingStore;
    use vitrine_catalog::{MemorySnapshotStore, SnapshotContent, SnapshotStore};

    struct Fixture {
        mock: Arc<MockEmbeddingProvider>,
        records: Arc<MemoryEmbeddingStore>,
        index: Arc<VectorIndex>,
        pipeline: EmbeddingPipeline,
        snapshots: MemorySnapshotStore,
    }

    fn fixture_with(mock: MockEmbeddingProvider) -> Fixture {
        let mock = Arc::new(mock);
        let records = Arc::new(MemoryEmbeddingStore::new());
        let index = Arc::new(VectorIndex::new());
        let pipeline = EmbeddingPipeline::new(mock.clone(), records.clone(), index.clone());
        Fixture {
            mock,
            records,
            index,
            pipeline,
            snapshots: MemorySnapshotStore::new(),
        }
    }

    fn fixture() -> Fixture {
        fixture_with(MockEmbeddingProvider::new(8))
    }

    fn shop() -> ShopId {
        ShopId::from("shop")
    }

    async fn snapshot(f: &Fixture, title: &str) -> ProductSnapshot {
        f.snapshots
            .upsert(&ProductId::from("p1"), &Lang::from("en"), SnapshotContent::new(title))
            .await
            .unwrap()
            .snapshot
    }

    #[tokio::test]
    async fn test_ensure_embeds_then_reuses() {
        let f = fixture();
        let snap = snapshot(&f, "Mug").await;
        let model = f.pipeline.model().clone();

        let first = f.pipeline.ensure(&shop(), &snap, &model).await.unwrap();
        assert_eq!(first.outcome, EnsureOutcome::Embedded);
        assert_eq!(first.record.state, FreshnessState::Fresh);
        assert_eq!(f.index.len(&shop(), &Lang::from("en")), 1);

        let second = f.pipeline.ensure(&shop(), &snap, &model).await.unwrap();
        assert_eq!(second.outcome, EnsureOutcome::Reused);
        assert_eq!(second.record.updated_at, first.record.updated_at);
        assert_eq!(f.mock.calls(), 1);
    }

    #[tokio::test]
    async fn test_ensure_keeps_records_per_shop() {
        let f = fixture();
        let snap = snapshot(&f, "Mug").await;
        let model = f.pipeline.model().clone();
        let other = ShopId::from("other");

        f.pipeline.ensure(&shop(), &snap, &model).await.unwrap();
        let report = f.pipeline.ensure(&other, &snap, &model).await.unwrap();

        assert_eq!(report.outcome, EnsureOutcome::Embedded);
        assert_eq!(report.record.shop, other);
        assert_eq!(f.records.len().await, 2);
        assert_eq!(f.index.len(&other, &snap.lang), 1);
    }

    #[tokio::test]
    async fn test_ensure_reembeds_changed_content() {
        let f = fixture();
        let model = f.pipeline.model().clone();
        let v1 = snapshot(&f, "Mug").await;
        f.pipeline.ensure(&shop(), &v1, &model).await.unwrap();

        let v2 = snapshot(&f, "Big Mug").await;
        let report = f.pipeline.ensure(&shop(), &v2, &model).await.unwrap();

        assert_eq!(report.outcome, EnsureOutcome::Embedded);
        assert_eq!(report.record.source_revision, 2);
        assert_eq!(f.mock.calls(), 2);
        let entry = f
            .index
            .get(&shop(), &Lang::from("en"), &ProductId::from("p1"))
            .unwrap();
        assert_eq!(entry.content_hash, v2.content_hash);
    }

    #[tokio::test]
    async fn test_ensure_restores_tombstoned_without_provider_call() {
        let f = fixture();
        let model = f.pipeline.model().clone();
        let snap = snapshot(&f, "Mug").await;
        let first = f.pipeline.ensure(&shop(), &snap, &model).await.unwrap();

        f.pipeline
            .tombstone(&shop(), &snap.product_id, &snap.lang, Utc::now())
            .await
            .unwrap();
        assert!(f.index.is_empty(&shop(), &snap.lang));

        let report = f.pipeline.ensure(&shop(), &snap, &model).await.unwrap();
        assert_eq!(report.outcome, EnsureOutcome::Restored);
        assert_eq!(report.record.updated_at, first.record.updated_at);
        assert_eq!(f.mock.calls(), 1);
        assert_eq!(f.index.len(&shop(), &snap.lang), 1);
    }

    #[tokio::test]
    async fn test_ensure_reindexes_after_partition_reset() {
        let f = fixture();
        let model = f.pipeline.model().clone();
        let snap = snapshot(&f, "Mug").await;
        f.pipeline.ensure(&shop(), &snap, &model).await.unwrap();

        f.index
            .reset_partition(&shop(), &snap.lang, model.clone())
            .unwrap();
        let report = f.pipeline.ensure(&shop(), &snap, &model).await.unwrap();

        assert_eq!(report.outcome, EnsureOutcome::Reused);
        assert_eq!(f.index.len(&shop(), &snap.lang), 1);
        assert_eq!(f.mock.calls(), 1);
    }

    #[tokio::test]
    async fn test_ensure_failure_marks_existing_record_failed() {
        let f = fixture();
        let model = f.pipeline.model().clone();
        let v1 = snapshot(&f, "Mug").await;
        f.pipeline.ensure(&shop(), &v1, &model).await.unwrap();

        let failing = fixture_with(MockEmbeddingProvider::new(8).always_failing());
        let pipeline = EmbeddingPipeline::new(
            failing.mock.clone(),
            f.records.clone(),
            f.index.clone(),
        );
        let v2 = snapshot(&f, "Changed").await;
        let err = pipeline.ensure(&shop(), &v2, &model).await.unwrap_err();
        assert!(matches!(err, Error::Provider(_)));

        let record = f
            .records
            .get(&shop(), &v2.product_id, &v2.lang, &model)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(record.state, FreshnessState::Failed);
        // The previous vector keeps serving queries.
        assert_eq!(f.index.len(&shop(), &v2.lang), 1);
    }

    #[tokio::test]
    async fn test_ensure_failure_without_record_returns_error() {
        let f = fixture_with(MockEmbeddingProvider::new(8).always_failing());
        let model = f.pipeline.model().clone();
        let snap = snapshot(&f, "Mug").await;

        assert!(f.pipeline.ensure(&shop(), &snap, &model).await.is_err());
        assert!(f.records.is_empty().await);
        assert!(f.index.is_empty(&shop(), &snap.lang));
    }

    #[tokio::test]
    async fn test_ensure_rejects_wrong_output_dimension() {
        let f = fixture_with(MockEmbeddingProvider::new(8).with_output_dimension(5));
        let model = f.pipeline.model().clone();
        let snap = snapshot(&f, "Mug").await;

        let err = f.pipeline.ensure(&shop(), &snap, &model).await.unwrap_err();
        assert!(matches!(err, Error::DimensionMismatch { expected: 8, actual: 5 }));
        assert!(f.index.is_empty(&shop(), &snap.lang));
    }

    #[tokio::test]
    async fn test_ensure_rejects_model_mismatch() {
        let f = fixture();
        let snap = snapshot(&f, "Mug").await;
        let err = f
            .pipeline
            .ensure(&shop(), &snap, &ModelVersion::new("other", 8))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Config(_)));
        assert_eq!(f.mock.calls(), 0);
    }

    #[tokio::test]
    async fn test_purge_tombstoned() {
        let f = fixture();
        let model = f.pipeline.model().clone();
        let snap = snapshot(&f, "Mug").await;
        f.pipeline.ensure(&shop(), &snap, &model).await.unwrap();

        let old = Utc::now() - chrono::Duration::days(30);
        f.pipeline
            .tombstone_product(&shop(), &snap.product_id, old)
            .await
            .unwrap();
        assert_eq!(f.pipeline.purge_tombstoned(Utc::now()).await.unwrap(), 1);
        assert!(f.records.is_empty().await);
    }
}
