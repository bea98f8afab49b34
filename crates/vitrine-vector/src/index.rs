//! Partitioned in-memory vector index.
//!
//! One partition per (shop, language), each bound to a single
//! [`ModelVersion`]. Readers load the current partition snapshot through
//! [`ArcSwap`] and never block; writers to the same partition are serialized
//! by a mutex, copy the snapshot, modify the copy and publish it with a swap.
//!
//! Write ordering is optimistic: every entry carries the snapshot revision it
//! was computed from, and a write whose revision is lower than the stored
//! one is rejected with [`Error::Conflict`].

use arc_swap::ArcSwap;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};
use vitrine_core::{Error, Lang, ModelVersion, ProductId, Result, ShopId};

use crate::similarity::{cosine_distance, cosine_similarity};
use crate::types::{IndexEntry, IndexHit, IndexWrite, PartitionKey};

#[derive(Debug, Clone)]
struct StoredEntry {
    entry: IndexEntry,
    tombstoned_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone)]
struct PartitionData {
    model: ModelVersion,
    entries: BTreeMap<ProductId, StoredEntry>,
}

impl PartitionData {
    fn new(model: ModelVersion) -> Self {
        Self {
            model,
            entries: BTreeMap::new(),
        }
    }
}

#[derive(Debug)]
struct Partition {
    data: ArcSwap<PartitionData>,
    write: Mutex<()>,
}

impl Partition {
    fn new(model: ModelVersion) -> Self {
        Self {
            data: ArcSwap::from_pointee(PartitionData::new(model)),
            write: Mutex::new(()),
        }
    }

    /// Run `f` on a private copy of the partition and publish the result.
    fn update<T>(&self, f: impl FnOnce(&mut PartitionData) -> Result<T>) -> Result<T> {
        // The mutex only orders writers; the data lives in the swap.
        let _guard = self.write.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        let mut next = self.data.load().as_ref().clone();
        let value = f(&mut next)?;
        self.data.store(Arc::new(next));
        Ok(value)
    }
}

/// Vector index partitioned by (shop, language).
#[derive(Debug, Default)]
pub struct VectorIndex {
    partitions: DashMap<PartitionKey, Arc<Partition>>,
}

impl VectorIndex {
    /// Create an empty index.
    pub fn new() -> Self {
        Self::default()
    }

    fn partition(&self, shop: &ShopId, lang: &Lang) -> Option<Arc<Partition>> {
        self.partitions
            .get(&PartitionKey::new(shop.clone(), lang.clone()))
            .map(|p| Arc::clone(p.value()))
    }

    fn partition_or_create(&self, shop: &ShopId, lang: &Lang, model: &ModelVersion) -> Arc<Partition> {
        let key = PartitionKey::new(shop.clone(), lang.clone());
        let partition = self
            .partitions
            .entry(key)
            .or_insert_with(|| Arc::new(Partition::new(model.clone())));
        Arc::clone(partition.value())
    }

    /// Insert or replace the vector for `entry.product_id` in the
    /// (shop, `entry.lang`) partition.
    ///
    /// An empty partition is rebound to the entry's model. A non-empty one
    /// rejects a different dimension with [`Error::DimensionMismatch`] and a
    /// different model id with [`Error::Conflict`].
    pub fn upsert(&self, shop: &ShopId, entry: IndexEntry) -> Result<IndexWrite> {
        if entry.vector.len() != entry.model.dimension {
            return Err(Error::dimension_mismatch(entry.model.dimension, entry.vector.len()));
        }

        let partition = self.partition_or_create(shop, &entry.lang, &entry.model);
        let product_id = entry.product_id.clone();
        let lang = entry.lang.clone();
        let result = partition.update(|data| {
            if data.entries.is_empty() {
                data.model = entry.model.clone();
            } else if data.model.dimension != entry.model.dimension {
                return Err(Error::dimension_mismatch(
                    data.model.dimension,
                    entry.model.dimension,
                ));
            } else if data.model.id != entry.model.id {
                return Err(Error::conflict(format!(
                    "partition {shop}/{} is bound to model {}, got {}",
                    entry.lang, data.model, entry.model
                )));
            }

            let write = match data.entries.get(&entry.product_id) {
                Some(stored) if stored.entry.revision > entry.revision => {
                    return Err(Error::conflict(format!(
                        "stale write for {}: revision {} < stored {}",
                        entry.product_id, entry.revision, stored.entry.revision
                    )));
                }
                Some(_) => IndexWrite::Replaced,
                None => IndexWrite::Inserted,
            };
            data.entries.insert(
                entry.product_id.clone(),
                StoredEntry {
                    entry,
                    tombstoned_at: None,
                },
            );
            Ok(write)
        });

        match &result {
            Ok(write) => log::debug!("Index {shop}/{lang}: {write:?} {product_id}"),
            Err(e) => log::warn!("Index {shop}/{lang}: rejected write for {product_id}: {e}"),
        }
        result
    }

    /// The up-to-`k` nearest live entries to `vector`.
    ///
    /// Hits are ordered by similarity descending, ties by product id
    /// ascending. A missing partition yields no hits.
    pub fn query(&self, shop: &ShopId, lang: &Lang, vector: &[f32], k: usize) -> Result<Vec<IndexHit>> {
        let Some(partition) = self.partition(shop, lang) else {
            return Ok(Vec::new());
        };
        let data = partition.data.load();
        if vector.len() != data.model.dimension {
            return Err(Error::dimension_mismatch(data.model.dimension, vector.len()));
        }

        let mut hits: Vec<IndexHit> = data
            .entries
            .values()
            .filter(|stored| stored.tombstoned_at.is_none())
            .map(|stored| {
                let similarity = cosine_similarity(vector, &stored.entry.vector);
                IndexHit {
                    product_id: stored.entry.product_id.clone(),
                    lang: lang.clone(),
                    similarity,
                    distance: cosine_distance(similarity),
                }
            })
            .collect();

        hits.sort_by(|a, b| {
            b.similarity
                .total_cmp(&a.similarity)
                .then_with(|| a.product_id.cmp(&b.product_id))
        });
        hits.truncate(k);
        Ok(hits)
    }

    /// The model a partition is bound to.
    pub fn partition_model(&self, shop: &ShopId, lang: &Lang) -> Option<ModelVersion> {
        self.partition(shop, lang)
            .map(|p| p.data.load().model.clone())
    }

    /// A live entry.
    pub fn get(&self, shop: &ShopId, lang: &Lang, product_id: &ProductId) -> Option<IndexEntry> {
        let partition = self.partition(shop, lang)?;
        let data = partition.data.load();
        data.entries
            .get(product_id)
            .filter(|stored| stored.tombstoned_at.is_none())
            .map(|stored| stored.entry.clone())
    }

    /// Hide an entry from queries. Returns `false` if it was absent or
    /// already tombstoned.
    pub fn tombstone(
        &self,
        shop: &ShopId,
        lang: &Lang,
        product_id: &ProductId,
        at: DateTime<Utc>,
    ) -> Result<bool> {
        let Some(partition) = self.partition(shop, lang) else {
            return Ok(false);
        };
        partition.update(|data| match data.entries.get_mut(product_id) {
            Some(stored) if stored.tombstoned_at.is_none() => {
                stored.tombstoned_at = Some(at);
                Ok(true)
            }
            _ => Ok(false),
        })
    }

    /// Tombstone a product in every language partition of a shop.
    pub fn tombstone_product(
        &self,
        shop: &ShopId,
        product_id: &ProductId,
        at: DateTime<Utc>,
    ) -> Result<usize> {
        let mut count = 0;
        for lang in self.languages(shop) {
            if self.tombstone(shop, &lang, product_id, at)? {
                count += 1;
            }
        }
        Ok(count)
    }

    /// Make a tombstoned entry visible again, provided it still carries
    /// `model`. Returns `false` if there was nothing to restore.
    pub fn restore(
        &self,
        shop: &ShopId,
        lang: &Lang,
        product_id: &ProductId,
        model: &ModelVersion,
    ) -> Result<bool> {
        let Some(partition) = self.partition(shop, lang) else {
            return Ok(false);
        };
        partition.update(|data| match data.entries.get_mut(product_id) {
            Some(stored) if stored.tombstoned_at.is_some() && &stored.entry.model == model => {
                stored.tombstoned_at = None;
                Ok(true)
            }
            _ => Ok(false),
        })
    }

    /// Hard-delete an entry.
    pub fn remove(&self, shop: &ShopId, lang: &Lang, product_id: &ProductId) -> Result<bool> {
        let Some(partition) = self.partition(shop, lang) else {
            return Ok(false);
        };
        partition.update(|data| Ok(data.entries.remove(product_id).is_some()))
    }

    /// Hard-delete entries tombstoned before `older_than`, in every partition.
    pub fn purge_tombstoned(&self, older_than: DateTime<Utc>) -> Result<usize> {
        let partitions: Vec<Arc<Partition>> = self
            .partitions
            .iter()
            .map(|p| Arc::clone(p.value()))
            .collect();

        let mut purged = 0;
        for partition in partitions {
            purged += partition.update(|data| {
                let before = data.entries.len();
                data.entries
                    .retain(|_, s| s.tombstoned_at.is_none_or(|at| at >= older_than));
                Ok(before - data.entries.len())
            })?;
        }
        if purged > 0 {
            log::info!("Purged {purged} tombstoned index entries");
        }
        Ok(purged)
    }

    /// Drop every entry of a partition and bind it to `model`.
    ///
    /// Used for a full reindex after a model upgrade. Returns the number of
    /// entries dropped.
    pub fn reset_partition(&self, shop: &ShopId, lang: &Lang, model: ModelVersion) -> Result<usize> {
        let partition = self.partition_or_create(shop, lang, &model);
        let dropped = partition.update(|data| {
            let dropped = data.entries.len();
            *data = PartitionData::new(model.clone());
            Ok(dropped)
        })?;
        log::info!("Index {shop}/{lang} reset to {model}: dropped {dropped} entries");
        Ok(dropped)
    }

    /// Number of live entries in a partition.
    pub fn len(&self, shop: &ShopId, lang: &Lang) -> usize {
        self.partition(shop, lang)
            .map(|p| {
                p.data
                    .load()
                    .entries
                    .values()
                    .filter(|s| s.tombstoned_at.is_none())
                    .count()
            })
            .unwrap_or(0)
    }

    /// Whether a partition has no live entries.
    pub fn is_empty(&self, shop: &ShopId, lang: &Lang) -> bool {
        self.len(shop, lang) == 0
    }

    /// Languages with a partition for the shop, sorted.
    pub fn languages(&self, shop: &ShopId) -> Vec<Lang> {
        let mut langs: Vec<Lang> = self
            .partitions
            .iter()
            .filter(|p| &p.key().shop == shop)
            .map(|p| p.key().lang.clone())
            .collect();
        langs.sort();
        langs
    }
}

// ============================================================================
// Tests
// ============================================================================
