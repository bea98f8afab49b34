//! Sync orchestrator.
//!
//! Reacts to snapshot and settings changes by driving the embedding pipeline
//! for every affected (shop, product, language) key. Keys run concurrently;
//! one key never runs twice at the same time. A failure on one key is
//! recorded in the ledger and the report and does not stop the others.

use chrono::{DateTime, Utc};
use futures::future::join_all;
use std::collections::BTreeSet;
use std::sync::Arc;
use vitrine_catalog::{ShopSettings, SnapshotStore};
use vitrine_core::config::SyncConfig;
use vitrine_core::{Error, FreshnessState, Lang, ProductId, Result, ShopId};
use vitrine_vector::{EmbeddingPipeline, EnsureOutcome};

use crate::freshness::{FreshnessLedger, FreshnessObserver, SyncKey};
use crate::locks::KeyLocks;

// ============================================================================
// Reports
// ============================================================================

/// Result of syncing one key.
#[derive(Debug)]
pub enum KeyOutcome {
    /// The key is FRESH.
    Synced(EnsureOutcome),
    /// The key is FAILED.
    Failed(Error),
    /// The key was tombstoned.
    Tombstoned,
}

/// Per-key results of one orchestrator call, in key order.
#[derive(Debug, Default)]
pub struct SyncReport {
    /// One entry per key touched.
    pub results: Vec<(SyncKey, KeyOutcome)>,
}

impl SyncReport {
    fn push(&mut self, key: SyncKey, outcome: KeyOutcome) {
        self.results.push((key, outcome));
    }

    fn sorted(mut self) -> Self {
        self.results.sort_by(|a, b| a.0.cmp(&b.0));
        self
    }

    /// Number of provider calls that produced a new embedding.
    pub fn embedded(&self) -> usize {
        self.results
            .iter()
            .filter(|(_, o)| matches!(o, KeyOutcome::Synced(EnsureOutcome::Embedded)))
            .count()
    }

    /// Keys that ended FAILED.
    pub fn failed(&self) -> Vec<&SyncKey> {
        self.results
            .iter()
            .filter(|(_, o)| matches!(o, KeyOutcome::Failed(_)))
            .map(|(k, _)| k)
            .collect()
    }

    /// Whether no key failed.
    pub fn is_success(&self) -> bool {
        self.failed().is_empty()
    }

    /// Outcome for `lang`, for single-product reports.
    pub fn outcome_for(&self, lang: &Lang) -> Option<&KeyOutcome> {
        self.results
            .iter()
            .find(|(k, _)| &k.lang == lang)
            .map(|(_, o)| o)
    }
}

/// Counts from [`SyncOrchestrator::purge_expired`].
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct PurgeReport {
    /// Snapshots hard-deleted.
    pub snapshots: usize,
    /// Embedding records hard-deleted.
    pub records: usize,
    /// Ledger keys forgotten.
    pub ledger: usize,
}

// ============================================================================
// Orchestrator
// ============================================================================

/// Keeps embeddings in step with snapshots and shop settings.
pub struct SyncOrchestrator {
    snapshots: Arc<dyn SnapshotStore>,
    pipeline: Arc<EmbeddingPipeline>,
    ledger: FreshnessLedger,
    locks: KeyLocks,
    retention: chrono::Duration,
}

impl std::fmt::Debug for SyncOrchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SyncOrchestrator")
            .field("pipeline", &self.pipeline)
            .field("ledger", &self.ledger)
            .field("retention", &self.retention)
            .finish_non_exhaustive()
    }
}

/// Settings that fail validation are handled as single-language.
fn checked(settings: &ShopSettings) -> ShopSettings {
    match settings.validate() {
        Ok(()) => settings.clone(),
        Err(e) => {
            log::warn!("{e}; syncing as single-language");
            settings.fail_closed()
        }
    }
}

impl SyncOrchestrator {
    /// Create an orchestrator with the default retention window.
    pub fn new(snapshots: Arc<dyn SnapshotStore>, pipeline: Arc<EmbeddingPipeline>) -> Self {
        Self::from_config(snapshots, pipeline, &SyncConfig::default())
    }

    /// Create an orchestrator from the sync configuration section.
    pub fn from_config(
        snapshots: Arc<dyn SnapshotStore>,
        pipeline: Arc<EmbeddingPipeline>,
        config: &SyncConfig,
    ) -> Self {
        Self {
            snapshots,
            pipeline,
            ledger: FreshnessLedger::new(),
            locks: KeyLocks::new(),
            retention: config.retention(),
        }
    }

    /// Register a freshness observer.
    pub fn with_observer(mut self, observer: Arc<dyn FreshnessObserver>) -> Self {
        self.ledger = self.ledger.with_observer(observer);
        self
    }

    /// Override the tombstone retention window.
    pub fn with_retention(mut self, retention: chrono::Duration) -> Self {
        self.retention = retention;
        self
    }

    /// The freshness ledger.
    pub fn ledger(&self) -> &FreshnessLedger {
        &self.ledger
    }

    /// Freshness of one key.
    pub fn state(&self, shop: &ShopId, product_id: &ProductId, lang: &Lang) -> FreshnessState {
        self.ledger
            .state(&SyncKey::new(shop.clone(), product_id.clone(), lang.clone()))
    }

    /// Keys that exhausted their retries.
    pub fn failed(&self) -> Vec<SyncKey> {
        self.ledger.failed()
    }

    // ------------------------------------------------------------------------
    // Change handlers
    // ------------------------------------------------------------------------

    /// Re-embed every effective language of a product whose snapshot exists.
    pub async fn on_snapshot_changed(
        &self,
        shop: &ShopId,
        settings: &ShopSettings,
        product_id: &ProductId,
    ) -> Result<SyncReport> {
        if self.ledger.is_removed(shop, product_id) {
            log::debug!("Ignoring snapshot change for removed product {shop}:{product_id}");
            return Ok(SyncReport::default());
        }
        let settings = checked(settings);
        let languages = self.snapshots.list_languages(product_id).await?;
        let keys: Vec<SyncKey> = languages
            .into_iter()
            .filter(|lang| settings.is_effective(lang))
            .map(|lang| SyncKey::new(shop.clone(), product_id.clone(), lang))
            .collect();

        log::debug!(
            "Snapshot change for {shop}:{product_id}: syncing {} language(s)",
            keys.len()
        );
        Ok(self.sync_all(keys).await)
    }

    /// Apply a settings change to `products`.
    ///
    /// Languages that stop being effective are tombstoned in the snapshot
    /// store, the record store and the index. Languages that become
    /// effective are restored and brought to FRESH, reusing the stored
    /// vector when the content hash did not move.
    pub async fn on_settings_changed(
        &self,
        shop: &ShopId,
        previous: &ShopSettings,
        current: &ShopSettings,
        products: &[ProductId],
    ) -> Result<SyncReport> {
        let before = checked(previous).effective_languages();
        let after = checked(current).effective_languages();
        let disabled: BTreeSet<&Lang> = before.difference(&after).collect();
        let enabled: BTreeSet<&Lang> = after.difference(&before).collect();

        log::info!(
            "Settings change for {shop}: disabling {:?}, enabling {:?} across {} product(s)",
            disabled,
            enabled,
            products.len()
        );

        let products: Vec<&ProductId> = products
            .iter()
            .filter(|product_id| {
                let removed = self.ledger.is_removed(shop, product_id);
                if removed {
                    log::debug!("Skipping removed product {shop}:{product_id}");
                }
                !removed
            })
            .collect();

        let mut report = SyncReport::default();
        let now = Utc::now();
        for &product_id in &products {
            for lang in &disabled {
                let key = SyncKey::new(shop.clone(), product_id.clone(), (*lang).clone());
                self.tombstone_key(&key, now).await?;
                report.push(key, KeyOutcome::Tombstoned);
            }
        }

        let mut restore_keys = Vec::new();
        for &product_id in &products {
            for lang in &enabled {
                self.snapshots.restore(product_id, lang).await?;
                if self.snapshots.get(product_id, lang).await.is_ok() {
                    let key = SyncKey::new(shop.clone(), product_id.clone(), (*lang).clone());
                    self.ledger.restore(&key);
                    restore_keys.push(key);
                }
            }
        }
        report.results.extend(self.sync_all(restore_keys).await.results);
        Ok(report.sorted())
    }

    /// Tombstone every language of a product.
    ///
    /// Removal is terminal: later snapshot or settings changes leave the
    /// product alone until [`purge_expired`](Self::purge_expired) deletes it.
    pub async fn remove_product(&self, shop: &ShopId, product_id: &ProductId) -> Result<usize> {
        let now = Utc::now();
        let mut keys: BTreeSet<SyncKey> = self
            .snapshots
            .list_languages(product_id)
            .await?
            .into_iter()
            .map(|lang| SyncKey::new(shop.clone(), product_id.clone(), lang))
            .collect();
        keys.extend(self.ledger.keys_for_product(shop, product_id));

        let mut guards = Vec::with_capacity(keys.len());
        for key in &keys {
            guards.push(self.locks.lock(key).await);
        }

        let count = self.snapshots.tombstone_product(product_id, now).await?;
        self.pipeline.tombstone_product(shop, product_id, now).await?;
        for key in &keys {
            self.ledger.tombstone(key, now);
        }
        self.ledger.mark_removed(shop, product_id, now);
        drop(guards);

        log::info!("Removed {shop}:{product_id}: {count} snapshot(s) tombstoned");
        Ok(count)
    }

    /// Re-arm and re-run every FAILED key of a shop that is still effective.
    pub async fn retry_failed(&self, shop: &ShopId, settings: &ShopSettings) -> Result<SyncReport> {
        let settings = checked(settings);
        let keys: Vec<SyncKey> = self
            .ledger
            .failed()
            .into_iter()
            .filter(|k| &k.shop == shop && settings.is_effective(&k.lang))
            .collect();
        log::info!("Retrying {} failed key(s) for {shop}", keys.len());
        Ok(self.sync_all(keys).await)
    }

    /// Hard-delete everything tombstoned longer than the retention window.
    pub async fn purge_expired(&self, now: DateTime<Utc>) -> Result<PurgeReport> {
        let cutoff = now - self.retention;
        let report = PurgeReport {
            snapshots: self.snapshots.purge_tombstoned(cutoff).await?,
            records: self.pipeline.purge_tombstoned(cutoff).await?,
            ledger: self.ledger.purge_tombstoned(cutoff),
        };
        self.ledger.purge_removed(cutoff);
        self.locks.prune();
        log::info!("Purged tombstones older than {cutoff}: {report:?}");
        Ok(report)
    }

    // ------------------------------------------------------------------------
    // Per-key work
    // ------------------------------------------------------------------------

    async fn sync_all(&self, keys: Vec<SyncKey>) -> SyncReport {
        let outcomes = join_all(keys.iter().map(|key| self.sync_key(key))).await;
        let mut report = SyncReport::default();
        for (key, outcome) in keys.into_iter().zip(outcomes) {
            report.push(key, outcome);
        }
        report.sorted()
    }

    async fn sync_key(&self, key: &SyncKey) -> KeyOutcome {
        let _guard = self.locks.lock(key).await;
        match self.run_key(key).await {
            Ok(outcome) => KeyOutcome::Synced(outcome),
            Err(e) => {
                if let Err(transition_err) = self.ledger.transition(key, FreshnessState::Failed) {
                    log::warn!("{transition_err}");
                }
                log::warn!("Sync of {key} failed: {e}");
                KeyOutcome::Failed(e)
            }
        }
    }

    async fn run_key(&self, key: &SyncKey) -> Result<EnsureOutcome> {
        let snapshot = self.snapshots.get(&key.product_id, &key.lang).await?;
        self.ledger.transition(key, FreshnessState::Stale)?;
        let model = self.pipeline.model().clone();
        let report = self.pipeline.ensure(&key.shop, &snapshot, &model).await?;
        self.ledger.transition(key, FreshnessState::Fresh)?;
        Ok(report.outcome)
    }

    async fn tombstone_key(&self, key: &SyncKey, at: DateTime<Utc>) -> Result<()> {
        let _guard = self.locks.lock(key).await;
        self.snapshots.tombstone(&key.product_id, &key.lang, at).await?;
        self.pipeline
            .tombstone(&key.shop, &key.product_id, &key.lang, at)
            .await?;
        self.ledger.tombstone(key, at);
        log::debug!("Tombstoned {key}");
        Ok(())
    }
}

// ============================================================================
// Tests
// ============================================================================
