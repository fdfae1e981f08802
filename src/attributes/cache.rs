use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::time::Instant;

use dashmap::DashMap;

use crate::attributes::extract::{extract_metadata, extract_streams};
use crate::foundation::{
    core::{ItemId, Ticks},
    hash::Fingerprint,
};
use crate::library::MediaLibrary;
use crate::model::{attributes::AttributeSet, item::LibraryItem, profile::Profile};

/// Which slice of an item's attributes an entry holds.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Facet {
    /// Fields read from media streams.
    Streams,
    /// Parental rating and tags.
    Metadata,
}

impl Facet {
    pub const ALL: [Facet; 2] = [Facet::Streams, Facet::Metadata];
}

#[derive(Clone, Debug)]
struct Entry {
    attrs: Arc<AttributeSet>,
    ticks: Ticks,
    profile: Fingerprint,
    seq: u64,
    inserted: Instant,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, serde::Serialize)]
pub struct AttributeCacheStats {
    pub entries: usize,
    pub capacity: usize,
    pub hits: u64,
    pub misses: u64,
    pub evicted: u64,
}

type Entries = DashMap<(ItemId, Facet), Entry>;

/// Bounded per-item attribute cache, stale when the item's modification tick moves.
pub struct PerItemAttributeCache {
    entries: Arc<Entries>,
    capacity: AtomicUsize,
    seq: AtomicU64,
    evicting: Arc<AtomicBool>,
    hits: AtomicU64,
    misses: AtomicU64,
    evicted: Arc<AtomicU64>,
}

impl PerItemAttributeCache {
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: Arc::new(DashMap::new()),
            capacity: AtomicUsize::new(capacity.max(1)),
            seq: AtomicU64::new(0),
            evicting: Arc::new(AtomicBool::new(false)),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            evicted: Arc::new(AtomicU64::new(0)),
        }
    }

    pub fn set_capacity(&self, capacity: usize) {
        self.capacity.store(capacity.max(1), Ordering::Relaxed);
        self.schedule_eviction();
    }

    /// Cached facet for `item`, recomputed when its tick or the profile changed.
    pub fn get_or_compute(
        &self,
        item: &LibraryItem,
        facet: Facet,
        profile: Fingerprint,
        compute: impl FnOnce() -> AttributeSet,
    ) -> Arc<AttributeSet> {
        let key = (item.id, facet);
        if let Some(e) = self.entries.get(&key)
            && e.ticks == item.date_modified
            && e.profile == profile
        {
            self.hits.fetch_add(1, Ordering::Relaxed);
            tracing::debug!(item = %item.id, ?facet, "attribute cache hit");
            return e.attrs.clone();
        }

        self.misses.fetch_add(1, Ordering::Relaxed);
        tracing::debug!(item = %item.id, ?facet, "attribute cache miss");
        let attrs = Arc::new(compute());
        self.entries.insert(
            key,
            Entry {
                attrs: attrs.clone(),
                ticks: item.date_modified,
                profile,
                seq: self.seq.fetch_add(1, Ordering::Relaxed),
                inserted: Instant::now(),
            },
        );
        if self.entries.len() > self.capacity.load(Ordering::Relaxed) {
            self.schedule_eviction();
        }
        attrs
    }

    /// Full attribute set of a leaf: streams facet (one scan per miss) plus metadata facet.
    pub fn resolve(
        &self,
        item: &LibraryItem,
        profile: &Profile,
        library: &dyn MediaLibrary,
    ) -> AttributeSet {
        let streams = self.resolve_streams(item, profile, library);
        let meta = self.resolve_metadata(item, profile);
        (*streams).clone().merge_missing(&meta)
    }

    pub fn resolve_streams(
        &self,
        item: &LibraryItem,
        profile: &Profile,
        library: &dyn MediaLibrary,
    ) -> Arc<AttributeSet> {
        self.get_or_compute(item, Facet::Streams, profile.content_hash(), || {
            extract_streams(&library.media_streams(item.id), profile)
        })
    }

    pub fn resolve_metadata(&self, item: &LibraryItem, profile: &Profile) -> Arc<AttributeSet> {
        self.get_or_compute(item, Facet::Metadata, profile.content_hash(), || {
            extract_metadata(item, profile)
        })
    }

    /// Drop every facet of one item.
    pub fn invalidate_item(&self, id: ItemId) {
        for facet in Facet::ALL {
            self.entries.remove(&(id, facet));
        }
    }

    pub fn clear(&self) {
        self.entries.clear();
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Age of the oldest entry, if any.
    pub fn oldest_age(&self) -> Option<std::time::Duration> {
        self.entries
            .iter()
            .map(|e| e.inserted)
            .min()
            .map(|t| t.elapsed())
    }

    pub fn stats(&self) -> AttributeCacheStats {
        AttributeCacheStats {
            entries: self.entries.len(),
            capacity: self.capacity.load(Ordering::Relaxed),
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            evicted: self.evicted.load(Ordering::Relaxed),
        }
    }

    /// Trim to capacity on the blocking pool when a runtime is around, inline otherwise.
    fn schedule_eviction(&self) {
        let capacity = self.capacity.load(Ordering::Relaxed);
        if self.entries.len() <= capacity {
            return;
        }
        if self.evicting.swap(true, Ordering::AcqRel) {
            return;
        }
        let entries = self.entries.clone();
        let evicting = self.evicting.clone();
        let evicted = self.evicted.clone();
        let run = move || trim_to_capacity(&entries, &evicting, &evicted, capacity);
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                handle.spawn_blocking(run);
            }
            Err(_) => run(),
        }
    }
}

/// Evict until within `capacity`, then release the `evicting` flag.
///
/// Inserts that found the flag taken skipped scheduling, so the length is checked again
/// after releasing it and the pass repeats while still over.
fn trim_to_capacity(entries: &Entries, evicting: &AtomicBool, evicted: &AtomicU64, capacity: usize) {
    loop {
        let n = evict_oldest(entries, capacity);
        evicted.fetch_add(n as u64, Ordering::Relaxed);
        evicting.store(false, Ordering::Release);
        if n > 0 {
            tracing::debug!(evicted = n, capacity, "attribute cache trimmed");
        }
        if entries.len() <= capacity || evicting.swap(true, Ordering::AcqRel) {
            return;
        }
    }
}

/// Remove oldest-inserted entries until at most `capacity` remain. Returns how many went.
fn evict_oldest(entries: &Entries, capacity: usize) -> usize {
    let len = entries.len();
    if len <= capacity {
        return 0;
    }
    let mut order: Vec<((ItemId, Facet), u64)> =
        entries.iter().map(|e| (*e.key(), e.seq)).collect();
    order.sort_by_key(|(_, seq)| *seq);

    let mut removed = 0;
    for (key, seq) in order.into_iter().take(len - capacity) {
        // Skip entries replaced since the snapshot.
        if entries.remove_if(&key, |_, e| e.seq == seq).is_some() {
            removed += 1;
        }
    }
    removed
}

#[cfg(test)]
#[path = "../../tests/unit/attributes/cache.rs"]
mod tests;
