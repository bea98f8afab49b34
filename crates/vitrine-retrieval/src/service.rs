//! The retrieval service.
//!
//! Answers a query in a target language:
//!
//! 1. Resolve the language. A language that is not effective for the shop
//!    is replaced by the shop's default source language.
//! 2. Embed the query. Every partition consulted must be bound to the
//!    provider's model version.
//! 3. Query the resolved language's partition.
//! 4. If that yields fewer than `k` hits and the shop allows it, top up from
//!    the default language's partition. Hits from the resolved language win
//!    over fallback hits for the same product.
//! 5. Hydrate display fields from the snapshot of the matched language.
//!
//! Everything runs under one deadline. Only [`Error::DimensionMismatch`],
//! [`Error::Conflict`] (partition bound to another model) and
//! [`Error::RetrievalTimeout`] reach the caller; any other failure degrades
//! to fewer results or unhydrated fields.

use futures::future::join_all;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use vitrine_catalog::{ShopSettings, ShopSettingsResolver, SnapshotStore};
use vitrine_core::config::RetrievalConfig;
use vitrine_core::{Error, Lang, ProductId, Result, ShopId};
use vitrine_vector::{EmbeddingProvider, IndexHit, VectorIndex, html_to_text};

use crate::types::{RetrievalResponse, RetrievalResult};

/// Merge primary hits with fallback hits.
///
/// Products already present in `primary` are dropped from `fallback`. The
/// result is ordered by similarity descending, then product id ascending,
/// and capped at `k`. The flag tells whether any fallback hit survived.
pub fn merge_with_fallback(
    primary: Vec<IndexHit>,
    fallback: Vec<IndexHit>,
    k: usize,
) -> (Vec<IndexHit>, bool) {
    let seen: HashSet<ProductId> = primary.iter().map(|h| h.product_id.clone()).collect();
    let mut merged: Vec<(IndexHit, bool)> = primary.into_iter().map(|h| (h, false)).collect();
    merged.extend(
        fallback
            .into_iter()
            .filter(|h| !seen.contains(&h.product_id))
            .map(|h| (h, true)),
    );

    merged.sort_by(|(a, _), (b, _)| {
        b.similarity
            .total_cmp(&a.similarity)
            .then_with(|| a.product_id.cmp(&b.product_id))
    });
    merged.truncate(k);

    let used_fallback = merged.iter().any(|(_, from_fallback)| *from_fallback);
    (merged.into_iter().map(|(h, _)| h).collect(), used_fallback)
}

/// Read-only, deadline-bounded product retrieval.
pub struct RetrievalService {
    resolver: ShopSettingsResolver,
    index: Arc<VectorIndex>,
    snapshots: Arc<dyn SnapshotStore>,
    provider: Arc<dyn EmbeddingProvider>,
    deadline: Duration,
    default_limit: usize,
}

impl std::fmt::Debug for RetrievalService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RetrievalService")
            .field("resolver", &self.resolver)
            .field("provider", &self.provider.name())
            .field("deadline", &self.deadline)
            .field("default_limit", &self.default_limit)
            .finish_non_exhaustive()
    }
}

impl RetrievalService {
    /// Create a service with the default deadline and limit.
    pub fn new(
        resolver: ShopSettingsResolver,
        index: Arc<VectorIndex>,
        snapshots: Arc<dyn SnapshotStore>,
        provider: Arc<dyn EmbeddingProvider>,
    ) -> Self {
        Self::from_config(resolver, index, snapshots, provider, &RetrievalConfig::default())
    }

    /// Create a service from the retrieval configuration section.
    pub fn from_config(
        resolver: ShopSettingsResolver,
        index: Arc<VectorIndex>,
        snapshots: Arc<dyn SnapshotStore>,
        provider: Arc<dyn EmbeddingProvider>,
        config: &RetrievalConfig,
    ) -> Self {
        Self {
            resolver,
            index,
            snapshots,
            provider,
            deadline: config.deadline(),
            default_limit: config.default_limit,
        }
    }

    /// Override the deadline.
    pub fn with_deadline(mut self, deadline: Duration) -> Self {
        self.deadline = deadline;
        self
    }

    /// The deadline applied to every call.
    pub fn deadline(&self) -> Duration {
        self.deadline
    }

    /// The result limit used when callers pass none.
    pub fn default_limit(&self) -> usize {
        self.default_limit
    }

    /// Retrieve up to `k` products for `query` in `target`.
    pub async fn retrieve(
        &self,
        shop: &ShopId,
        settings: &ShopSettings,
        query: &str,
        target: &Lang,
        k: usize,
    ) -> Result<RetrievalResponse> {
        self.with_deadline_applied(self.run(shop, settings, query, target, k))
            .await
    }

    /// Resolve the shop's settings, then [`retrieve`](Self::retrieve).
    ///
    /// `k` defaults to the configured limit. Settings resolution counts
    /// against the deadline.
    pub async fn retrieve_for_shop(
        &self,
        shop: &ShopId,
        query: &str,
        target: &Lang,
        k: Option<usize>,
    ) -> Result<RetrievalResponse> {
        let k = k.unwrap_or(self.default_limit);
        self.with_deadline_applied(async {
            let settings = self.resolver.resolve(shop).await;
            self.run(shop, &settings, query, target, k).await
        })
        .await
    }

    async fn with_deadline_applied(
        &self,
        work: impl Future<Output = Result<RetrievalResponse>>,
    ) -> Result<RetrievalResponse> {
        match tokio::time::timeout(self.deadline, work).await {
            Ok(result) => result,
            Err(_) => {
                log::warn!("Retrieval exceeded its {:?} deadline", self.deadline);
                Err(Error::RetrievalTimeout(self.deadline))
            }
        }
    }

    async fn run(
        &self,
        shop: &ShopId,
        settings: &ShopSettings,
        query: &str,
        target: &Lang,
        k: usize,
    ) -> Result<RetrievalResponse> {
        let settings = match settings.validate() {
            Ok(()) => settings.clone(),
            Err(e) => {
                log::warn!("{e}; retrieving as single-language");
                settings.fail_closed()
            }
        };
        let resolution = settings.resolve_language(target);
        let resolved = resolution.lang.clone();
        let mut fallback_applied = resolution.fallback_applied;
        if fallback_applied {
            log::debug!("Retrieval for {shop}: '{target}' not effective, using '{resolved}'");
        }

        if k == 0 {
            return Ok(RetrievalResponse::empty(target.clone(), resolved, fallback_applied));
        }

        let vector = match self.provider.embed(query).await {
            Ok(vector) => vector,
            Err(e) => {
                log::warn!("Retrieval for {shop}: query embedding failed: {e}");
                return Ok(RetrievalResponse::empty(target.clone(), resolved, fallback_applied));
            }
        };
        if vector.len() != self.provider.dimension() {
            return Err(Error::dimension_mismatch(self.provider.dimension(), vector.len()));
        }
        self.check_partition_model(shop, &resolved, vector.len())?;

        let primary = self.query_partition(shop, &resolved, &vector, k)?;
        let hits = if primary.len() < k && settings.fallback_permitted(&resolved) {
            let default_lang = &settings.default_source_lang;
            self.check_partition_model(shop, default_lang, vector.len())?;
            let fallback = self.query_partition(shop, default_lang, &vector, k)?;
            let (merged, used_fallback) = merge_with_fallback(primary, fallback, k);
            if used_fallback {
                log::debug!("Retrieval for {shop}: topped up '{resolved}' from '{default_lang}'");
                fallback_applied = true;
            }
            merged
        } else {
            primary
        };

        let results = join_all(hits.into_iter().map(|hit| self.hydrate(hit))).await;
        Ok(RetrievalResponse {
            results,
            fallback_applied,
            requested_lang: target.clone(),
            resolved_lang: resolved,
        })
    }

    /// A partition is only comparable with the query when it is bound to the
    /// provider's model version.
    fn check_partition_model(&self, shop: &ShopId, lang: &Lang, dimension: usize) -> Result<()> {
        let Some(model) = self.index.partition_model(shop, lang) else {
            return Ok(());
        };
        if model.dimension != dimension {
            return Err(Error::dimension_mismatch(model.dimension, dimension));
        }
        let expected = self.provider.model();
        if model.id != expected.id {
            return Err(Error::conflict(format!(
                "partition {shop}/{lang} is bound to model {model}, queries use {expected}"
            )));
        }
        Ok(())
    }

    fn query_partition(
        &self,
        shop: &ShopId,
        lang: &Lang,
        vector: &[f32],
        k: usize,
    ) -> Result<Vec<IndexHit>> {
        match self.index.query(shop, lang, vector, k) {
            Ok(hits) => Ok(hits),
            Err(e @ Error::DimensionMismatch { .. }) => Err(e),
            Err(e) => {
                log::warn!("Retrieval for {shop}: partition '{lang}' lookup failed: {e}");
                Ok(Vec::new())
            }
        }
    }

    async fn hydrate(&self, hit: IndexHit) -> RetrievalResult {
        let mut result = RetrievalResult {
            product_id: hit.product_id,
            lang: hit.lang,
            similarity: hit.similarity,
            distance: hit.distance,
            name: None,
            title: None,
            description: None,
        };

        match self.snapshots.get(&result.product_id, &result.lang).await {
            Ok(snapshot) => {
                let content = snapshot.content;
                result.name = content
                    .specs
                    .as_value()
                    .get("name")
                    .and_then(serde_json::Value::as_str)
                    .map(str::to_string)
                    .or_else(|| Some(content.title.trim().to_string()));
                result.title = Some(content.title);
                let description = html_to_text(&content.description);
                result.description = (!description.is_empty()).then_some(description);
            }
            Err(e) => {
                log::debug!(
                    "No hydration for {}/{}: {e}",
                    result.product_id,
                    result.lang
                );
            }
        }
        result
    }
}

// ============================================================================
// Tests
// ============================================================================
