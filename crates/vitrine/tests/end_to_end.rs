//! End-to-end tests across the snapshot store, sync orchestrator, embedding
//! pipeline, vector index and retrieval service.

#![allow(clippy::unwrap_used)]

use std::sync::Arc;
use std::time::Duration;
use vitrine::catalog::StaticSettingsSource;
use vitrine::core::FreshnessState;
use vitrine::sync::KeyOutcome;
use vitrine::vector::{EmbeddingStore, EnsureOutcome, IndexEntry, MockEmbeddingProvider};
use vitrine::{
    EmbeddingPipeline, EmbeddingProvider, Error, Lang, MemoryEmbeddingStore, MemorySnapshotStore,
    ProductId, RetrievalService, RetryingProvider, ShopId, ShopSettings, ShopSettingsResolver,
    SnapshotContent, SnapshotStore, SyncOrchestrator, VectorIndex,
};

const DIM: usize = 16;

struct Harness {
    mock: Arc<MockEmbeddingProvider>,
    snapshots: Arc<MemorySnapshotStore>,
    records: Arc<MemoryEmbeddingStore>,
    index: Arc<VectorIndex>,
    settings_source: Arc<StaticSettingsSource>,
    orchestrator: SyncOrchestrator,
    retrieval: RetrievalService,
}

fn harness_with(mock: MockEmbeddingProvider) -> Harness {
    let mock = Arc::new(mock);
    let provider = Arc::new(
        RetryingProvider::new(mock.clone())
            .with_max_attempts(2)
            .with_initial_delay(Duration::from_millis(1))
            .with_max_delay(Duration::from_millis(2)),
    );
    let snapshots = Arc::new(MemorySnapshotStore::new());
    let records = Arc::new(MemoryEmbeddingStore::new());
    let index = Arc::new(VectorIndex::new());
    let pipeline = Arc::new(EmbeddingPipeline::new(
        provider.clone(),
        records.clone(),
        index.clone(),
    ));
    let settings_source = Arc::new(StaticSettingsSource::new());
    let resolver = ShopSettingsResolver::new(settings_source.clone(), Lang::from("en"));

    Harness {
        orchestrator: SyncOrchestrator::new(snapshots.clone(), pipeline),
        retrieval: RetrievalService::new(resolver, index.clone(), snapshots.clone(), provider),
        mock,
        snapshots,
        records,
        index,
        settings_source,
    }
}

fn harness() -> Harness {
    harness_with(MockEmbeddingProvider::new(DIM))
}

fn shop() -> ShopId {
    ShopId::from("demo-shop")
}

fn lang(code: &str) -> Lang {
    Lang::from(code)
}

fn pid(id: &str) -> ProductId {
    ProductId::from(id)
}

fn en_hu() -> ShopSettings {
    ShopSettings::multi_language(shop(), lang("en"), [lang("hu")])
}

fn en_only() -> ShopSettings {
    ShopSettings::multi_language(shop(), lang("en"), Vec::new())
}

async fn publish(
    h: &Harness,
    settings: &ShopSettings,
    id: &str,
    code: &str,
    content: SnapshotContent,
) {
    h.snapshots.upsert(&pid(id), &lang(code), content).await.unwrap();
    let report = h
        .orchestrator
        .on_snapshot_changed(&shop(), settings, &pid(id))
        .await
        .unwrap();
    assert!(report.is_success(), "sync failed: {report:?}");
}

fn sweater(title: &str) -> SnapshotContent {
    SnapshotContent::new(title)
        .with_description("<p>Soft <strong>merino</strong> wool.</p>")
        .with_specs(serde_json::json!({"material": "merino", "sizes": ["S", "M", "L"]}))
        .with_faq(serde_json::json!([{"question": "Washable?", "answer": "Hand wash"}]))
}

// ============================================================================
// Fallback correctness
// ============================================================================

#[tokio::test]
async fn test_missing_translation_falls_back_to_default_language() {
    let h = harness();
    publish(&h, &en_hu(), "P", "en", sweater("Merino Sweater")).await;

    let response = h
        .retrieval
        .retrieve(&shop(), &en_hu(), "Merino Sweater", &lang("hu"), 5)
        .await
        .unwrap();

    assert!(response.fallback_applied);
    assert_eq!(response.len(), 1);
    let result = &response.results[0];
    assert_eq!(result.product_id, pid("P"));
    assert_eq!(result.lang, lang("en"));
    assert_eq!(result.title.as_deref(), Some("Merino Sweater"));
    assert_eq!(result.description.as_deref(), Some("Soft merino wool."));
}

#[tokio::test]
async fn test_translated_product_is_served_in_target_language_once() {
    let h = harness();
    publish(&h, &en_hu(), "P", "en", sweater("Merino Sweater")).await;
    publish(&h, &en_hu(), "P", "hu", sweater("Merinó pulóver")).await;
    publish(&h, &en_hu(), "Q", "en", sweater("Wool Scarf")).await;

    let response = h
        .retrieval
        .retrieve(&shop(), &en_hu(), "Merinó pulóver", &lang("hu"), 5)
        .await
        .unwrap();

    let ids = response.product_ids();
    assert_eq!(ids.len(), 2);
    assert_eq!(ids.iter().filter(|id| ***id == pid("P")).count(), 1);
    let p = response.results.iter().find(|r| r.product_id == pid("P")).unwrap();
    assert_eq!(p.lang, lang("hu"));
    assert!(response.fallback_applied);
}

#[tokio::test]
async fn test_settings_from_resolver() {
    let h = harness();
    h.settings_source.set(en_hu()).await;
    publish(&h, &en_hu(), "P", "hu", sweater("Merinó pulóver")).await;

    let response = h
        .retrieval
        .retrieve_for_shop(&shop(), "Merinó pulóver", &lang("hu"), Some(3))
        .await
        .unwrap();
    assert!(!response.fallback_applied);
    assert_eq!(response.results[0].lang, lang("hu"));
}

// ============================================================================
// Determinism and distance law
// ============================================================================

#[tokio::test]
async fn test_retrieval_is_deterministic_with_ties_by_product_id() {
    let h = harness();
    for id in ["c", "a", "b"] {
        publish(&h, &en_hu(), id, "en", sweater("Identical")).await;
    }
    publish(&h, &en_hu(), "z", "en", sweater("Something else")).await;

    // Query with the exact embedded text so a, b and c tie at the top.
    let query = vitrine::vector::embedding_text(&sweater("Identical"));
    let first = h
        .retrieval
        .retrieve(&shop(), &en_hu(), &query, &lang("en"), 4)
        .await
        .unwrap();
    let second = h
        .retrieval
        .retrieve(&shop(), &en_hu(), &query, &lang("en"), 4)
        .await
        .unwrap();

    assert_eq!(first, second);
    let ids: Vec<&str> = first.results.iter().map(|r| r.product_id.as_str()).collect();
    assert_eq!(&ids[..3], &["a", "b", "c"]);
    for result in &first.results {
        assert_eq!(result.distance, 1.0 - result.similarity);
    }
}

// ============================================================================
// Idempotence and round-trip
// ============================================================================

#[tokio::test]
async fn test_unchanged_content_is_never_reembedded() {
    let h = harness();
    publish(&h, &en_hu(), "P", "en", sweater("Merino Sweater")).await;
    let calls = h.mock.calls();

    let again = h
        .snapshots
        .upsert(&pid("P"), &lang("en"), sweater("Merino Sweater"))
        .await
        .unwrap();
    assert!(!again.outcome.needs_embedding());

    let report = h
        .orchestrator
        .on_snapshot_changed(&shop(), &en_hu(), &pid("P"))
        .await
        .unwrap();
    assert!(matches!(
        report.outcome_for(&lang("en")),
        Some(KeyOutcome::Synced(EnsureOutcome::Reused))
    ));
    assert_eq!(h.mock.calls(), calls);
}

#[tokio::test]
async fn test_snapshot_round_trip() {
    let h = harness();
    let content = sweater("Merino Sweater");
    h.snapshots
        .upsert(&pid("P"), &lang("en"), content.clone())
        .await
        .unwrap();

    let stored = h.snapshots.get(&pid("P"), &lang("en")).await.unwrap();
    assert_eq!(stored.content, content);
    assert_eq!(
        serde_json::to_string(&stored.content).unwrap(),
        serde_json::to_string(&content).unwrap()
    );
}

// ============================================================================
// Tombstones
// ============================================================================

#[tokio::test]
async fn test_disable_and_reenable_language_restores_without_provider_call() {
    let h = harness();
    publish(&h, &en_hu(), "P", "en", sweater("Merino Sweater")).await;
    publish(&h, &en_hu(), "P", "hu", sweater("Merinó pulóver")).await;

    let model = h.mock.model().clone();
    let before = h
        .records
        .get(&shop(), &pid("P"), &lang("hu"), &model)
        .await
        .unwrap()
        .unwrap();
    let calls = h.mock.calls();

    h.orchestrator
        .on_settings_changed(&shop(), &en_hu(), &en_only(), &[pid("P")])
        .await
        .unwrap();
    let hidden = h
        .retrieval
        .retrieve(&shop(), &en_hu(), "Merinó pulóver", &lang("hu"), 5)
        .await
        .unwrap();
    assert!(hidden.results.iter().all(|r| r.lang == lang("en")));

    h.orchestrator
        .on_settings_changed(&shop(), &en_only(), &en_hu(), &[pid("P")])
        .await
        .unwrap();

    let after = h
        .records
        .get(&shop(), &pid("P"), &lang("hu"), &model)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(after.state, FreshnessState::Fresh);
    assert_eq!(after.updated_at, before.updated_at);
    assert!(!after.is_tombstoned());
    // Only the retrieval query above reached the provider.
    assert_eq!(h.mock.calls(), calls + 1);
    assert_eq!(
        h.orchestrator.state(&shop(), &pid("P"), &lang("hu")),
        FreshnessState::Fresh
    );
}

#[tokio::test]
async fn test_removed_product_disappears_and_is_purged_after_retention() {
    let h = harness();
    publish(&h, &en_hu(), "P", "en", sweater("Merino Sweater")).await;
    h.orchestrator.remove_product(&shop(), &pid("P")).await.unwrap();

    let response = h
        .retrieval
        .retrieve(&shop(), &en_hu(), "Merino Sweater", &lang("en"), 5)
        .await
        .unwrap();
    assert!(response.is_empty());

    let purged = h
        .orchestrator
        .purge_expired(chrono::Utc::now() + chrono::Duration::days(30))
        .await
        .unwrap();
    assert_eq!(purged.snapshots, 1);
    assert_eq!(purged.records, 1);
    assert!(h.records.is_empty().await);
}

#[tokio::test]
async fn test_removed_product_is_not_revived_by_reenabling_a_language() {
    let h = harness();
    publish(&h, &en_hu(), "P", "en", sweater("Merino Sweater")).await;
    publish(&h, &en_hu(), "P", "hu", sweater("Merinó pulóver")).await;
    h.orchestrator.remove_product(&shop(), &pid("P")).await.unwrap();

    h.orchestrator
        .on_settings_changed(&shop(), &en_hu(), &en_only(), &[pid("P")])
        .await
        .unwrap();
    h.orchestrator
        .on_settings_changed(&shop(), &en_only(), &en_hu(), &[pid("P")])
        .await
        .unwrap();

    let response = h
        .retrieval
        .retrieve(&shop(), &en_hu(), "Merinó pulóver", &lang("hu"), 5)
        .await
        .unwrap();
    assert!(response.is_empty());
    assert!(h.snapshots.get(&pid("P"), &lang("hu")).await.is_err());
}

// ============================================================================
// Failures and rejection
// ============================================================================

#[tokio::test]
async fn test_exhausted_retries_mark_failed_then_recover() {
    // Two attempts per embedding; the first two calls fail.
    let h = harness_with(MockEmbeddingProvider::new(DIM).failing_first(2));
    h.snapshots
        .upsert(&pid("P"), &lang("en"), sweater("Merino Sweater"))
        .await
        .unwrap();

    let report = h
        .orchestrator
        .on_snapshot_changed(&shop(), &en_hu(), &pid("P"))
        .await
        .unwrap();
    assert!(matches!(
        report.outcome_for(&lang("en")),
        Some(KeyOutcome::Failed(Error::Provider(_)))
    ));
    assert_eq!(
        h.orchestrator.state(&shop(), &pid("P"), &lang("en")),
        FreshnessState::Failed
    );

    let retry = h.orchestrator.retry_failed(&shop(), &en_hu()).await.unwrap();
    assert!(retry.is_success());
    assert_eq!(h.index.len(&shop(), &lang("en")), 1);
}

#[tokio::test]
async fn test_wrong_dimension_is_rejected_everywhere() {
    let h = harness();
    publish(&h, &en_hu(), "P", "en", sweater("Merino Sweater")).await;

    let mut entry = h.index.get(&shop(), &lang("en"), &pid("P")).unwrap();
    entry.product_id = pid("Q");
    entry.vector.push(0.0);
    let err = h.index.upsert(&shop(), entry).unwrap_err();
    assert!(matches!(err, Error::DimensionMismatch { .. }));

    let query = vec![0.5; DIM + 1];
    let err = h.index.query(&shop(), &lang("en"), &query, 5).unwrap_err();
    assert!(matches!(err, Error::DimensionMismatch { expected: DIM, .. }));
    assert_eq!(h.index.len(&shop(), &lang("en")), 1);
}

#[tokio::test]
async fn test_retrieval_rejects_partition_from_other_model() {
    let h = harness();
    let wide = vitrine::ModelVersion::new("mock", DIM * 2);
    h.index
        .upsert(
            &shop(),
            IndexEntry {
                product_id: pid("P"),
                lang: lang("en"),
                model: wide,
                vector: vec![0.1; DIM * 2],
                content_hash: vitrine::core::ContentHash::from_hex("00"),
                revision: 1,
            },
        )
        .unwrap();

    let err = h
        .retrieval
        .retrieve(&shop(), &en_hu(), "anything", &lang("en"), 5)
        .await
        .unwrap_err();
    assert!(matches!(err, Error::DimensionMismatch { .. }));
}
