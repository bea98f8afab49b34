//! Freshness ledger.
//!
//! Tracks the [`FreshnessState`] of every (shop, product, language) key the
//! orchestrator has touched and reports each transition to the registered
//! [`FreshnessObserver`]s. Keys the ledger has never seen are MISSING.
//!
//! Removed products are tracked separately from per-key tombstones: a
//! language disabled by settings can come back, a removed product cannot.

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use vitrine_core::{Error, FreshnessState, Lang, ProductId, Result, ShopId};

// ============================================================================
// Keys and transitions
// ============================================================================

/// The unit of sync work.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SyncKey {
    /// Shop.
    pub shop: ShopId,
    /// Product.
    pub product_id: ProductId,
    /// Language.
    pub lang: Lang,
}

impl SyncKey {
    /// Create a key.
    pub fn new(shop: ShopId, product_id: ProductId, lang: Lang) -> Self {
        Self {
            shop,
            product_id,
            lang,
        }
    }
}

impl fmt::Display for SyncKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}/{}", self.shop, self.product_id, self.lang)
    }
}

/// A recorded state change.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transition {
    /// Key that changed.
    pub key: SyncKey,
    /// State before.
    pub from: FreshnessState,
    /// State after.
    pub to: FreshnessState,
    /// When it happened.
    pub at: DateTime<Utc>,
}

/// Receives every freshness transition.
pub trait FreshnessObserver: Send + Sync {
    /// Called after the ledger has applied `transition`.
    fn on_transition(&self, transition: &Transition);
}

/// Observer that writes transitions to the log.
#[derive(Debug, Default, Clone, Copy)]
pub struct LoggingObserver;

impl FreshnessObserver for LoggingObserver {
    fn on_transition(&self, t: &Transition) {
        match t.to {
            FreshnessState::Failed => {
                log::warn!("Freshness {}: {} -> {}", t.key, t.from, t.to)
            }
            _ => log::debug!("Freshness {}: {} -> {}", t.key, t.from, t.to),
        }
    }
}

// ============================================================================
// Ledger
// ============================================================================

#[derive(Debug, Clone)]
struct LedgerEntry {
    state: FreshnessState,
    tombstoned_at: Option<DateTime<Utc>>,
}

/// Per-key freshness state.
#[derive(Default)]
pub struct FreshnessLedger {
    entries: DashMap<SyncKey, LedgerEntry>,
    removed: DashMap<(ShopId, ProductId), DateTime<Utc>>,
    observers: Vec<Arc<dyn FreshnessObserver>>,
}

impl fmt::Debug for FreshnessLedger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FreshnessLedger")
            .field("keys", &self.entries.len())
            .field("removed", &self.removed.len())
            .field("observers", &self.observers.len())
            .finish()
    }
}

impl FreshnessLedger {
    /// Create an empty ledger with no observers.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an observer.
    pub fn with_observer(mut self, observer: Arc<dyn FreshnessObserver>) -> Self {
        self.observers.push(observer);
        self
    }

    /// Current state of `key`.
    pub fn state(&self, key: &SyncKey) -> FreshnessState {
        self.entries
            .get(key)
            .map(|e| e.state)
            .unwrap_or(FreshnessState::Missing)
    }

    /// Whether `key` is tombstoned.
    pub fn is_tombstoned(&self, key: &SyncKey) -> bool {
        self.entries
            .get(key)
            .is_some_and(|e| e.tombstoned_at.is_some())
    }

    /// Move `key` to `to`.
    ///
    /// Illegal transitions are rejected with a validation error and leave
    /// the state untouched.
    pub fn transition(&self, key: &SyncKey, to: FreshnessState) -> Result<()> {
        let transition = {
            let mut entry = self.entries.entry(key.clone()).or_insert(LedgerEntry {
                state: FreshnessState::Missing,
                tombstoned_at: None,
            });
            let from = entry.state;
            if !from.can_transition_to(to) {
                return Err(Error::validation(format!(
                    "illegal freshness transition for {key}: {from} -> {to}"
                )));
            }
            entry.state = to;
            Transition {
                key: key.clone(),
                from,
                to,
                at: Utc::now(),
            }
        };

        if transition.from != transition.to {
            for observer in &self.observers {
                observer.on_transition(&transition);
            }
        }
        Ok(())
    }

    /// Mark `key` tombstoned, keeping its state.
    pub fn tombstone(&self, key: &SyncKey, at: DateTime<Utc>) {
        if let Some(mut entry) = self.entries.get_mut(key) {
            entry.tombstoned_at = Some(at);
        }
    }

    /// Clear the tombstone of `key`.
    pub fn restore(&self, key: &SyncKey) {
        if let Some(mut entry) = self.entries.get_mut(key) {
            entry.tombstoned_at = None;
        }
    }

    /// Keys of a shop/product, sorted.
    pub fn keys_for_product(&self, shop: &ShopId, product_id: &ProductId) -> Vec<SyncKey> {
        let mut keys: Vec<SyncKey> = self
            .entries
            .iter()
            .filter(|e| &e.key().shop == shop && &e.key().product_id == product_id)
            .map(|e| e.key().clone())
            .collect();
        keys.sort();
        keys
    }

    /// Live FAILED keys, sorted.
    pub fn failed(&self) -> Vec<SyncKey> {
        let mut keys: Vec<SyncKey> = self
            .entries
            .iter()
            .filter(|e| e.state == FreshnessState::Failed && e.tombstoned_at.is_none())
            .map(|e| e.key().clone())
            .collect();
        keys.sort();
        keys
    }

    /// Forget keys tombstoned before `older_than`.
    pub fn purge_tombstoned(&self, older_than: DateTime<Utc>) -> usize {
        let before = self.entries.len();
        self.entries
            .retain(|_, e| e.tombstoned_at.is_none_or(|at| at >= older_than));
        before - self.entries.len()
    }

    /// Record that a product was removed from a shop.
    pub fn mark_removed(&self, shop: &ShopId, product_id: &ProductId, at: DateTime<Utc>) {
        self.removed.insert((shop.clone(), product_id.clone()), at);
    }

    /// Whether the product was removed and not yet purged.
    pub fn is_removed(&self, shop: &ShopId, product_id: &ProductId) -> bool {
        self.removed.contains_key(&(shop.clone(), product_id.clone()))
    }

    /// Forget product removals recorded before `older_than`.
    pub fn purge_removed(&self, older_than: DateTime<Utc>) -> usize {
        let before = self.removed.len();
        self.removed.retain(|_, at| *at >= older_than);
        before - self.removed.len()
    }

    /// Number of tracked keys.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether no key is tracked.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

// ============================================================================
// Tests
// ============================================================================
