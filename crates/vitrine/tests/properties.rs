//! Property tests over whole catalogs: merged retrieval never repeats a
//! product, stays within `k`, and orders results deterministically.

#![allow(clippy::unwrap_used)]

use proptest::prelude::*;
use std::collections::HashSet;
use std::sync::Arc;
use vitrine::catalog::StaticSettingsSource;
use vitrine::vector::MockEmbeddingProvider;
use vitrine::{
    EmbeddingPipeline, Lang, MemoryEmbeddingStore, MemorySnapshotStore, ProductId,
    RetrievalResponse, RetrievalService, ShopId, ShopSettings, ShopSettingsResolver,
    SnapshotContent, SnapshotStore, SyncOrchestrator, VectorIndex,
};

/// For each product: does it have an English snapshot, a Hungarian one.
type Catalog = Vec<(bool, bool)>;

async fn run(catalog: &Catalog, query: &str, k: usize) -> RetrievalResponse {
    let provider = Arc::new(MockEmbeddingProvider::new(12));
    let snapshots = Arc::new(MemorySnapshotStore::new());
    let index = Arc::new(VectorIndex::new());
    let pipeline = Arc::new(EmbeddingPipeline::new(
        provider.clone(),
        Arc::new(MemoryEmbeddingStore::new()),
        index.clone(),
    ));
    let orchestrator = SyncOrchestrator::new(snapshots.clone(), pipeline);
    let resolver =
        ShopSettingsResolver::new(Arc::new(StaticSettingsSource::new()), Lang::from("en"));
    let retrieval = RetrievalService::new(resolver, index, snapshots.clone(), provider);

    let shop = ShopId::from("shop");
    let settings = ShopSettings::multi_language(shop.clone(), Lang::from("en"), [Lang::from("hu")]);

    for (i, (has_en, has_hu)) in catalog.iter().enumerate() {
        let pid = ProductId::new(format!("p{i:02}"));
        if *has_en {
            let content = SnapshotContent::new(format!("Product {i} item"));
            snapshots.upsert(&pid, &Lang::from("en"), content).await.unwrap();
        }
        if *has_hu {
            let content = SnapshotContent::new(format!("Termék {i} tétel"));
            snapshots.upsert(&pid, &Lang::from("hu"), content).await.unwrap();
        }
        orchestrator
            .on_snapshot_changed(&shop, &settings, &pid)
            .await
            .unwrap();
    }

    retrieval
        .retrieve(&shop, &settings, query, &Lang::from("hu"), k)
        .await
        .unwrap()
}

fn block_on<F: std::future::Future>(future: F) -> F::Output {
    tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .unwrap()
        .block_on(future)
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    #[test]
    fn prop_merged_results_have_no_duplicates(
        catalog in prop::collection::vec((any::<bool>(), any::<bool>()), 0..12),
        query in "[a-z ]{1,20}",
        k in 1usize..10,
    ) {
        let response = block_on(run(&catalog, &query, k));

        prop_assert!(response.len() <= k);
        let ids: HashSet<&ProductId> = response.results.iter().map(|r| &r.product_id).collect();
        prop_assert_eq!(ids.len(), response.len());

        for pair in response.results.windows(2) {
            let (a, b) = (&pair[0], &pair[1]);
            prop_assert!(
                a.similarity > b.similarity
                    || (a.similarity == b.similarity && a.product_id < b.product_id)
            );
        }

        // Products with a Hungarian snapshot are never served from English.
        for result in &response.results {
            let i: usize = result.product_id.as_str()[1..].parse().unwrap();
            if catalog[i].1 {
                prop_assert_eq!(&result.lang, &Lang::from("hu"));
            }
        }

        let used_english = response.results.iter().any(|r| r.lang == Lang::from("en"));
        prop_assert_eq!(response.fallback_applied, used_english);
    }

    #[test]
    fn prop_retrieval_is_repeatable(
        catalog in prop::collection::vec((any::<bool>(), any::<bool>()), 1..8),
        query in "[a-z]{1,10}",
    ) {
        let first = block_on(run(&catalog, &query, 5));
        let second = block_on(run(&catalog, &query, 5));
        prop_assert_eq!(first, second);
    }
}
