use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError, RwLock};
use std::time::{Duration, Instant, UNIX_EPOCH};

use dashmap::DashMap;
use tokio::sync::watch;

use crate::foundation::hash::{Fingerprint, StableHasher};
use crate::icons::decode::{IconImage, decode_icon_file};
use crate::icons::vocab::{IconClass, classify};
use crate::model::profile::OverlayCategory;

type TableKey = (OverlayCategory, String);

/// Result of a refresh request.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RefreshOutcome {
    /// Folder contents matched the last snapshot; tables kept.
    Unchanged,
    /// Tables were rebuilt. `changed` is whether the version moved.
    Rebuilt { version: Fingerprint, changed: bool },
}

/// Point-in-time counters of the icon cache.
#[derive(Clone, Debug, PartialEq, Eq, serde::Serialize)]
pub struct IconCacheStats {
    pub folder: Option<PathBuf>,
    pub files: usize,
    pub indexed_names: usize,
    pub aliases: usize,
    pub decoded: usize,
    pub rejected: usize,
    pub version: Fingerprint,
    pub epoch: u64,
    pub decodes: u64,
}

/// One generation of lookup tables. Replaced as a whole on every folder change.
#[derive(Default)]
struct IconTables {
    paths: DashMap<TableKey, PathBuf>,
    /// Fallback resolutions (three-letter to two-letter language).
    aliases: DashMap<TableKey, PathBuf>,
    decoded: DashMap<PathBuf, Arc<IconImage>>,
    rejected: DashMap<PathBuf, ()>,
}

#[derive(Default)]
struct FolderState {
    folder: Option<PathBuf>,
    snapshot: Vec<(PathBuf, u128)>,
    last_refresh: Option<Instant>,
}

/// Name-to-image index over a flat icon folder, with lazy decoding.
pub struct IconFileCache {
    ttl: RwLock<Duration>,
    state: Mutex<FolderState>,
    tables: RwLock<Arc<IconTables>>,
    version_tx: watch::Sender<Fingerprint>,
    epoch: AtomicU64,
    decodes: AtomicU64,
}

impl IconFileCache {
    pub fn new(ttl: Duration) -> Self {
        let (version_tx, _) = watch::channel(Fingerprint::EMPTY);
        Self {
            ttl: RwLock::new(ttl),
            state: Mutex::new(FolderState::default()),
            tables: RwLock::new(Arc::new(IconTables::default())),
            version_tx,
            epoch: AtomicU64::new(0),
            decodes: AtomicU64::new(0),
        }
    }

    pub fn set_ttl(&self, ttl: Duration) {
        *self.ttl.write().unwrap_or_else(PoisonError::into_inner) = ttl;
    }

    /// Point the cache at `folder`, refreshing when the folder changed or the TTL lapsed.
    pub fn initialize(&self, folder: &Path) -> RefreshOutcome {
        let ttl = *self.ttl.read().unwrap_or_else(PoisonError::into_inner);
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        if state.folder.as_deref() != Some(folder) {
            tracing::info!(folder = %folder.display(), "icon folder set");
            state.folder = Some(folder.to_path_buf());
            return self.refresh_locked(&mut state, true);
        }
        let expired = state.last_refresh.is_none_or(|t| t.elapsed() >= ttl);
        if expired {
            return self.refresh_locked(&mut state, false);
        }
        RefreshOutcome::Unchanged
    }

    /// Rescan the folder. Without `force`, an unchanged `(path, mtime)` snapshot is a no-op.
    pub fn refresh(&self, force: bool) -> RefreshOutcome {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        self.refresh_locked(&mut state, force)
    }

    fn refresh_locked(&self, state: &mut FolderState, force: bool) -> RefreshOutcome {
        let snapshot = state
            .folder
            .as_deref()
            .map(list_icon_files)
            .unwrap_or_default();
        state.last_refresh = Some(Instant::now());

        if !force && state.snapshot == snapshot && self.epoch.load(Ordering::Acquire) > 0 {
            tracing::debug!(files = snapshot.len(), "icon folder unchanged");
            return RefreshOutcome::Unchanged;
        }

        let tables = IconTables::default();
        for (path, _) in &snapshot {
            let Some(class) = classify(path) else {
                continue;
            };
            match class {
                IconClass::Subtitle(lang) => {
                    tables
                        .paths
                        .insert((OverlayCategory::SubtitleLanguage, lang), path.clone());
                }
                IconClass::Fixed(category, name) => {
                    tables.paths.insert((category, name), path.clone());
                }
                IconClass::LanguageOrTag { lower, exact } => {
                    tables
                        .paths
                        .insert((OverlayCategory::AudioLanguage, lower), path.clone());
                    tables
                        .paths
                        .insert((OverlayCategory::Tag, exact), path.clone());
                }
            }
        }

        let version = snapshot_version(&snapshot);
        *self.tables.write().unwrap_or_else(PoisonError::into_inner) = Arc::new(tables);
        state.snapshot = snapshot;
        let epoch = self.epoch.fetch_add(1, Ordering::AcqRel) + 1;

        let changed = self.version_tx.send_if_modified(|v| {
            if *v == version {
                return false;
            }
            *v = version;
            true
        });
        tracing::info!(
            files = state.snapshot.len(),
            %version,
            epoch,
            changed,
            "icon tables rebuilt"
        );
        RefreshOutcome::Rebuilt { version, changed }
    }

    fn tables(&self) -> Arc<IconTables> {
        self.tables
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Decoded icon for `name` in `category`, or `None` when there is no usable file.
    pub fn get_cached_icon(&self, name: &str, category: OverlayCategory) -> Option<Arc<IconImage>> {
        let tables = self.tables();
        let path = lookup_path(&tables, name, category)?;
        self.decode_cached(&tables, &path)
    }

    /// Any decodable icon of `category`, in name order. Used for previews.
    pub fn get_first_available_icon(&self, category: OverlayCategory) -> Option<Arc<IconImage>> {
        let tables = self.tables();
        let table = table_category(category);
        let mut candidates: Vec<(String, PathBuf)> = tables
            .paths
            .iter()
            .filter(|e| e.key().0 == table)
            .map(|e| (e.key().1.clone(), e.value().clone()))
            .collect();
        candidates.sort();
        candidates
            .into_iter()
            .find_map(|(_, path)| self.decode_cached(&tables, &path))
    }

    fn decode_cached(&self, tables: &IconTables, path: &Path) -> Option<Arc<IconImage>> {
        if let Some(img) = tables.decoded.get(path) {
            return Some(img.value().clone());
        }
        if tables.rejected.contains_key(path) {
            return None;
        }
        self.decodes.fetch_add(1, Ordering::Relaxed);
        match decode_icon_file(path) {
            Ok(img) => {
                let img = tables
                    .decoded
                    .entry(path.to_path_buf())
                    .or_insert_with(|| Arc::new(img))
                    .value()
                    .clone();
                tracing::debug!(path = %path.display(), w = img.width, h = img.height, "icon decoded");
                Some(img)
            }
            Err(err) => {
                tracing::warn!(path = %path.display(), error = %err, "skipping unusable icon");
                tables.rejected.insert(path.to_path_buf(), ());
                None
            }
        }
    }

    pub fn version(&self) -> Fingerprint {
        *self.version_tx.borrow()
    }

    /// Receiver notified whenever the version fingerprint changes.
    pub fn subscribe(&self) -> watch::Receiver<Fingerprint> {
        self.version_tx.subscribe()
    }

    /// Number of table generations built so far.
    pub fn epoch(&self) -> u64 {
        self.epoch.load(Ordering::Acquire)
    }

    pub fn stats(&self) -> IconCacheStats {
        let (folder, files) = {
            let state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
            (state.folder.clone(), state.snapshot.len())
        };
        let tables = self.tables();
        IconCacheStats {
            folder,
            files,
            indexed_names: tables.paths.len(),
            aliases: tables.aliases.len(),
            decoded: tables.decoded.len(),
            rejected: tables.rejected.len(),
            version: self.version(),
            epoch: self.epoch(),
            decodes: self.decodes.load(Ordering::Relaxed),
        }
    }
}

/// Rating badges are free-form names, indexed with the audio-language candidates.
fn table_category(category: OverlayCategory) -> OverlayCategory {
    match category {
        OverlayCategory::Rating => OverlayCategory::AudioLanguage,
        c => c,
    }
}

fn lookup_path(tables: &IconTables, name: &str, category: OverlayCategory) -> Option<PathBuf> {
    let table = table_category(category);
    let key = if category.is_case_sensitive() {
        name.trim().to_string()
    } else {
        name.trim().to_ascii_lowercase()
    };
    if key.is_empty() {
        return None;
    }
    let exact = (table, key);
    if let Some(p) = tables.paths.get(&exact) {
        return Some(p.value().clone());
    }
    if let Some(p) = tables.aliases.get(&exact) {
        return Some(p.value().clone());
    }

    let is_language = matches!(
        table,
        OverlayCategory::AudioLanguage | OverlayCategory::SubtitleLanguage
    );
    let (table, key) = exact;
    if is_language && key.len() == 3 && key.is_ascii() {
        let short = (table, key[..2].to_string());
        let path = tables.paths.get(&short)?.value().clone();
        tracing::debug!(from = %key, to = %short.1, "language icon alias");
        tables.aliases.insert((table, key), path.clone());
        return Some(path);
    }
    None
}

fn list_icon_files(folder: &Path) -> Vec<(PathBuf, u128)> {
    let entries = match std::fs::read_dir(folder) {
        Ok(entries) => entries,
        Err(err) => {
            tracing::warn!(folder = %folder.display(), error = %err, "icon folder unreadable");
            return Vec::new();
        }
    };
    let mut out: Vec<(PathBuf, u128)> = entries
        .filter_map(Result::ok)
        .filter_map(|entry| {
            let meta = entry.metadata().ok()?;
            if !meta.is_file() {
                return None;
            }
            let path = entry.path();
            classify(&path)?;
            let mtime = meta
                .modified()
                .ok()
                .and_then(|t| t.duration_since(UNIX_EPOCH).ok())
                .map_or(0, |d| d.as_nanos());
            Some((path, mtime))
        })
        .collect();
    out.sort();
    out
}

fn snapshot_version(snapshot: &[(PathBuf, u128)]) -> Fingerprint {
    let mut h = StableHasher::new();
    h.write_u64(snapshot.len() as u64);
    for (path, mtime) in snapshot {
        h.write_str(&path.to_string_lossy());
        h.write_bytes(&mtime.to_le_bytes());
    }
    h.finish()
}

#[cfg(test)]
#[path = "../../tests/unit/icons/cache.rs"]
mod tests;
