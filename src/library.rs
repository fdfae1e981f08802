use std::sync::atomic::{AtomicUsize, Ordering};

use dashmap::DashMap;

use crate::foundation::{
    core::{ItemId, Ticks},
    error::{OverlayError, OverlayResult},
};
use crate::model::item::{LibraryItem, MediaStream};

/// Read access to the host's media library.
pub trait MediaLibrary: Send + Sync {
    fn get(&self, id: ItemId) -> Option<LibraryItem>;

    /// Durable form of `item`. Placeholders are fetched again; `None` if the host cannot.
    fn resolve(&self, item: &LibraryItem) -> Option<LibraryItem> {
        if !item.placeholder {
            return Some(item.clone());
        }
        self.get(item.id).filter(|i| !i.placeholder)
    }

    /// Every leaf below `parent` (episodes of all seasons for a series).
    fn leaf_children(&self, parent: ItemId) -> Vec<LibraryItem>;

    /// Parent chain of `id`, nearest first.
    fn ancestors(&self, id: ItemId) -> Vec<ItemId>;

    fn media_streams(&self, id: ItemId) -> Vec<MediaStream>;
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LibraryEventKind {
    Added,
    Updated,
    Removed,
}

/// Structural change notification from the host.
#[derive(Clone, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct LibraryEvent {
    pub kind: LibraryEventKind,
    pub item_id: ItemId,
    #[serde(default)]
    pub ancestor_ids: Vec<ItemId>,
}

/// One item of a serialized library snapshot.
#[derive(Clone, Debug, serde::Serialize, serde::Deserialize)]
pub struct SnapshotEntry {
    pub item: LibraryItem,
    #[serde(default)]
    pub parent: Option<ItemId>,
    #[serde(default)]
    pub streams: Vec<MediaStream>,
}

/// Thread-safe library held in memory. Counts stream scans so callers can observe cache hits.
#[derive(Default)]
pub struct InMemoryLibrary {
    items: DashMap<ItemId, LibraryItem>,
    parents: DashMap<ItemId, ItemId>,
    children: DashMap<ItemId, Vec<ItemId>>,
    streams: DashMap<ItemId, Vec<MediaStream>>,
    aliases: DashMap<ItemId, ItemId>,
    stream_scans: AtomicUsize,
}

impl InMemoryLibrary {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build from a JSON array of [`SnapshotEntry`].
    pub fn from_json(s: &str) -> OverlayResult<Self> {
        let entries: Vec<SnapshotEntry> = serde_json::from_str(s)
            .map_err(|e| OverlayError::validation(format!("library snapshot: {e}")))?;
        let lib = Self::new();
        for e in entries {
            let id = e.item.id;
            lib.insert(e.item, e.parent);
            if !e.streams.is_empty() {
                lib.set_streams(id, e.streams);
            }
        }
        Ok(lib)
    }

    pub fn insert(&self, item: LibraryItem, parent: Option<ItemId>) {
        let id = item.id;
        self.items.insert(id, item);
        if let Some(parent) = parent {
            self.parents.insert(id, parent);
            let mut kids = self.children.entry(parent).or_default();
            if !kids.contains(&id) {
                kids.push(id);
            }
        }
    }

    pub fn set_streams(&self, id: ItemId, streams: Vec<MediaStream>) {
        self.streams.insert(id, streams);
    }

    /// Make `placeholder` resolve to the durable item `target`.
    pub fn alias(&self, placeholder: ItemId, target: ItemId) {
        self.aliases.insert(placeholder, target);
    }

    /// Bump an item's modification tick, as a host would after a metadata refresh.
    pub fn touch(&self, id: ItemId, ticks: Ticks) {
        if let Some(mut item) = self.items.get_mut(&id) {
            item.date_modified = ticks;
        }
    }

    pub fn update(&self, item: LibraryItem) {
        self.items.insert(item.id, item);
    }

    pub fn remove(&self, id: ItemId) {
        self.items.remove(&id);
        self.streams.remove(&id);
        if let Some((_, parent)) = self.parents.remove(&id)
            && let Some(mut kids) = self.children.get_mut(&parent)
        {
            kids.retain(|k| *k != id);
        }
    }

    /// Event describing a change to `id`, ancestors filled in from the current tree.
    pub fn event(&self, kind: LibraryEventKind, id: ItemId) -> LibraryEvent {
        LibraryEvent {
            kind,
            item_id: id,
            ancestor_ids: self.ancestors(id),
        }
    }

    pub fn stream_scans(&self) -> usize {
        self.stream_scans.load(Ordering::Relaxed)
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    fn collect_leaves(&self, parent: ItemId, out: &mut Vec<LibraryItem>, depth: usize) {
        // Guard against cycles in hand-built snapshots.
        if depth > 16 {
            return;
        }
        let Some(kids) = self.children.get(&parent).map(|k| k.value().clone()) else {
            return;
        };
        for kid in kids {
            let Some(item) = self.items.get(&kid).map(|i| i.value().clone()) else {
                continue;
            };
            if item.kind.is_leaf() {
                out.push(item);
            } else {
                self.collect_leaves(kid, out, depth + 1);
            }
        }
    }
}

impl MediaLibrary for InMemoryLibrary {
    fn get(&self, id: ItemId) -> Option<LibraryItem> {
        self.items.get(&id).map(|i| i.value().clone())
    }

    fn resolve(&self, item: &LibraryItem) -> Option<LibraryItem> {
        if !item.placeholder {
            return Some(item.clone());
        }
        let target = self.aliases.get(&item.id).map(|t| *t).unwrap_or(item.id);
        self.get(target).filter(|i| !i.placeholder)
    }

    fn leaf_children(&self, parent: ItemId) -> Vec<LibraryItem> {
        let mut out = Vec::new();
        self.collect_leaves(parent, &mut out, 0);
        out
    }

    fn ancestors(&self, id: ItemId) -> Vec<ItemId> {
        let mut out = Vec::new();
        let mut cur = id;
        while let Some(p) = self.parents.get(&cur).map(|p| *p) {
            if out.contains(&p) || p == id {
                break;
            }
            out.push(p);
            cur = p;
        }
        out
    }

    fn media_streams(&self, id: ItemId) -> Vec<MediaStream> {
        self.stream_scans.fetch_add(1, Ordering::Relaxed);
        self.streams.get(&id).map(|s| s.value().clone()).unwrap_or_default()
    }
}

#[cfg(test)]
#[path = "../tests/unit/library.rs"]
mod tests;
