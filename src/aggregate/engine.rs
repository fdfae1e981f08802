use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, PoisonError, RwLock};
use std::time::{Duration, Instant};

use dashmap::DashMap;
use rayon::prelude::*;
use tokio_util::sync::CancellationToken;

use crate::aggregate::reduce::Reduction;
use crate::attributes::cache::PerItemAttributeCache;
use crate::foundation::{
    core::ItemId,
    error::{OverlayError, OverlayResult},
    hash::{Fingerprint, fingerprint_sorted},
};
use crate::library::MediaLibrary;
use crate::model::{
    attributes::AttributeSet,
    item::LibraryItem,
    profile::{AggregationMode, Profile},
};

/// What is true across all leaves of one parent.
#[derive(Clone, Debug, PartialEq)]
pub struct AggregatedResult {
    pub parent: ItemId,
    /// Stream-derived fields only.
    pub attributes: AttributeSet,
    /// Digest over sorted `child_id:child_attribute_hash` strings.
    pub fingerprint: Fingerprint,
    pub child_count: usize,
    pub mode: AggregationMode,
    pub cached_at: Instant,
    profile: Fingerprint,
}

impl AggregatedResult {
    pub fn age(&self) -> Duration {
        self.cached_at.elapsed()
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, serde::Serialize)]
pub struct AggregationStats {
    pub entries: usize,
    pub hits: u64,
    pub computed: u64,
    pub pruned: u64,
}

/// Lazily computed, push-invalidated cache of per-parent aggregates.
///
/// A result is only stored if no invalidation of its parent (and no `clear`) happened
/// between reading the children and the insert.
pub struct AggregationEngine {
    results: DashMap<ItemId, Arc<AggregatedResult>>,
    generations: DashMap<ItemId, u64>,
    /// Bumped by `clear`; held for reading while a result is stored.
    epoch: RwLock<u64>,
    attributes: Arc<PerItemAttributeCache>,
    library: Arc<dyn MediaLibrary>,
    hits: AtomicU64,
    computed: AtomicU64,
    pruned: AtomicU64,
}

impl AggregationEngine {
    pub fn new(attributes: Arc<PerItemAttributeCache>, library: Arc<dyn MediaLibrary>) -> Self {
        Self {
            results: DashMap::new(),
            generations: DashMap::new(),
            epoch: RwLock::new(0),
            attributes,
            library,
            hits: AtomicU64::new(0),
            computed: AtomicU64::new(0),
            pruned: AtomicU64::new(0),
        }
    }

    /// Aggregate for `parent`, from cache when present.
    ///
    /// Placeholders are resolved first so results are always keyed by the durable id.
    #[tracing::instrument(level = "debug", skip_all, fields(parent = %parent.id))]
    pub fn aggregate(
        &self,
        parent: &LibraryItem,
        profile: &Profile,
        cancel: &CancellationToken,
    ) -> OverlayResult<Arc<AggregatedResult>> {
        let parent = self.library.resolve(parent).ok_or_else(|| {
            OverlayError::Unresolved(format!("placeholder {} has no durable item", parent.id))
        })?;
        if cancel.is_cancelled() {
            return Err(OverlayError::Cancelled);
        }

        let profile_hash = profile.content_hash();
        let mode = profile.aggregation.mode;
        if let Some(hit) = self.results.get(&parent.id)
            && hit.profile == profile_hash
            && hit.mode == mode
        {
            self.hits.fetch_add(1, Ordering::Relaxed);
            tracing::debug!(fingerprint = %hit.fingerprint, "aggregate cache hit");
            return Ok(hit.value().clone());
        }

        let stamp = self.stamp(parent.id);
        let mut children = self.library.leaf_children(parent.id);
        children.sort_by_key(LibraryItem::stable_order_key);

        let (attributes, fingerprint) = match mode {
            AggregationMode::Lite => self.reduce_lite(&children, profile, cancel)?,
            AggregationMode::Full => self.reduce_full(&children, profile, cancel)?,
        };

        let result = Arc::new(AggregatedResult {
            parent: parent.id,
            attributes,
            fingerprint,
            child_count: children.len(),
            mode,
            cached_at: Instant::now(),
            profile: profile_hash,
        });
        self.computed.fetch_add(1, Ordering::Relaxed);
        tracing::debug!(
            children = children.len(),
            ?mode,
            %fingerprint,
            "aggregate computed"
        );
        if !self.store_if_current(parent.id, stamp, &result) {
            tracing::debug!("parent invalidated while aggregating, result not cached");
        }
        Ok(result)
    }

    fn stamp(&self, parent: ItemId) -> (u64, u64) {
        let epoch = *self.epoch.read().unwrap_or_else(PoisonError::into_inner);
        let generation = self.generations.get(&parent).map_or(0, |g| *g);
        (epoch, generation)
    }

    fn store_if_current(
        &self,
        parent: ItemId,
        (epoch, generation): (u64, u64),
        result: &Arc<AggregatedResult>,
    ) -> bool {
        let current_epoch = self.epoch.read().unwrap_or_else(PoisonError::into_inner);
        if *current_epoch != epoch {
            return false;
        }
        // The generation guard is held across the insert so `invalidate` orders after it.
        let current = self.generations.entry(parent).or_insert(0);
        if *current != generation {
            return false;
        }
        self.results.insert(parent, result.clone());
        true
    }

    /// First child by `(sort_index, id)` stands in for all of them.
    fn reduce_lite(
        &self,
        children: &[LibraryItem],
        profile: &Profile,
        cancel: &CancellationToken,
    ) -> OverlayResult<(AttributeSet, Fingerprint)> {
        let Some(rep) = children.first() else {
            return Ok((AttributeSet::default(), fingerprint_sorted(Vec::<String>::new())));
        };
        if cancel.is_cancelled() {
            return Err(OverlayError::Cancelled);
        }
        let attrs = self
            .attributes
            .resolve_streams(rep, profile, self.library.as_ref());

        // Other children contribute their ids only, so membership changes still show.
        let entries = children.iter().map(|c| {
            if c.id == rep.id {
                format!("{}:{}", c.id, attrs.content_hash())
            } else {
                format!("{}:-", c.id)
            }
        });
        let fingerprint = fingerprint_sorted(entries);

        let mut r = Reduction::new(profile);
        r.fold(&attrs);
        Ok((r.finish(), fingerprint))
    }

    /// Every child, resolved in parallel and folded in stable order.
    fn reduce_full(
        &self,
        children: &[LibraryItem],
        profile: &Profile,
        cancel: &CancellationToken,
    ) -> OverlayResult<(AttributeSet, Fingerprint)> {
        let library = self.library.as_ref();
        let resolved = children
            .par_iter()
            .map(|child| -> OverlayResult<Arc<AttributeSet>> {
                if cancel.is_cancelled() {
                    return Err(OverlayError::Cancelled);
                }
                Ok(self.attributes.resolve_streams(child, profile, library))
            })
            .collect::<OverlayResult<Vec<_>>>()?;

        let fingerprint = fingerprint_sorted(
            children
                .iter()
                .zip(&resolved)
                .map(|(c, a)| format!("{}:{}", c.id, a.content_hash())),
        );

        let mut r = Reduction::new(profile);
        for attrs in &resolved {
            if r.is_settled() {
                break;
            }
            r.fold(attrs);
        }
        Ok((r.finish(), fingerprint))
    }

    pub fn cached(&self, parent: ItemId) -> Option<Arc<AggregatedResult>> {
        self.results.get(&parent).map(|r| r.value().clone())
    }

    /// Drop one parent's aggregate. Returns whether one was cached.
    pub fn invalidate(&self, parent: ItemId) -> bool {
        let mut generation = self.generations.entry(parent).or_insert(0);
        *generation += 1;
        self.results.remove(&parent).is_some()
    }

    pub fn clear(&self) {
        let mut epoch = self.epoch.write().unwrap_or_else(PoisonError::into_inner);
        *epoch += 1;
        self.generations.clear();
        self.results.clear();
    }

    /// Sweep aggregates older than `max_age`. Returns how many were dropped.
    pub fn prune_older_than(&self, max_age: Duration) -> usize {
        let before = self.results.len();
        self.results.retain(|_, r| r.age() < max_age);
        let pruned = before.saturating_sub(self.results.len());
        self.pruned.fetch_add(pruned as u64, Ordering::Relaxed);
        if pruned > 0 {
            tracing::debug!(pruned, "aggregate cache swept");
        }
        pruned
    }

    pub fn len(&self) -> usize {
        self.results.len()
    }

    pub fn is_empty(&self) -> bool {
        self.results.is_empty()
    }

    pub fn stats(&self) -> AggregationStats {
        AggregationStats {
            entries: self.results.len(),
            hits: self.hits.load(Ordering::Relaxed),
            computed: self.computed.load(Ordering::Relaxed),
            pruned: self.pruned.load(Ordering::Relaxed),
        }
    }
}

#[cfg(test)]
#[path = "../../tests/unit/aggregate/engine.rs"]
mod tests;
