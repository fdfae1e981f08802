use std::future::Future;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Arc, OnceLock, PoisonError, RwLock};
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::aggregate::engine::{AggregationEngine, AggregationStats};
use crate::attributes::cache::{AttributeCacheStats, PerItemAttributeCache};
use crate::config::OverlayConfig;
use crate::foundation::{
    error::{OverlayError, OverlayResult},
    hash::{Fingerprint, StableHasher},
};
use crate::gate::{ConcurrencyGate, permits_for};
use crate::icons::cache::{IconCacheStats, IconFileCache, RefreshOutcome};
use crate::layout::solver::{GroupPlacement, IconRef, OverlayContent, OverlayDescriptor};
use crate::library::{LibraryEvent, MediaLibrary};
use crate::model::{
    attributes::AttributeSet,
    item::{ImageKind, LibraryItem},
    profile::{OverlayCategory, Profile},
};
use crate::render::compositor::render_overlays;
use crate::render::text::{FontFace, discover_font};

/// Write attempts before a transient IO failure becomes a fallback.
pub const WRITE_ATTEMPTS: u32 = 3;
const WRITE_BACKOFF: Duration = Duration::from_millis(50);

/// Bumped whenever the key layout or the drawing code changes pixels.
const KEY_SCHEME: &str = "po1";

/// Score drawn by [`OverlayService::render_preview`].
pub const PREVIEW_SCORE: f32 = 8.5;

/// What [`OverlayService::enhance`] did with the destination.
#[derive(Clone, Copy, Debug, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EnhanceOutcome {
    /// Overlays were drawn and the composite written.
    Composited,
    /// Nothing to draw, or compositing failed: the source bytes were copied unchanged.
    CopiedOriginal,
    /// The cancellation signal fired and `dest` already held earlier output, which was kept.
    Cancelled,
    /// Neither the composite nor the original could be written.
    Failed,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, serde::Serialize)]
pub struct MaintenanceReport {
    pub aggregates_pruned: usize,
    pub locks_pruned: usize,
    pub icons_rebuilt: bool,
}

#[derive(Clone, Debug, PartialEq, Eq, serde::Serialize)]
pub struct ServiceStats {
    pub icons: IconCacheStats,
    pub attributes: AttributeCacheStats,
    pub aggregates: AggregationStats,
    pub permits: usize,
    pub available_permits: usize,
    pub item_locks: usize,
}

/// An item ready to draw: durable identity, its profile and resolved attributes.
struct Resolved {
    item: LibraryItem,
    profile: Profile,
    attributes: AttributeSet,
    /// Attribute hash for leaves, aggregate fingerprint plus metadata hash for parents.
    content: Fingerprint,
}

type FontSlot = Arc<OnceLock<Option<FontFace>>>;

struct Inner {
    config: RwLock<Arc<OverlayConfig>>,
    library: Arc<dyn MediaLibrary>,
    icons: IconFileCache,
    attributes: Arc<PerItemAttributeCache>,
    aggregates: AggregationEngine,
    gate: RwLock<Arc<ConcurrencyGate>>,
    font: RwLock<FontSlot>,
}

/// Entry point for the host's image pipeline.
///
/// Cheap to clone; clones share caches, gates and the configuration snapshot.
#[derive(Clone)]
pub struct OverlayService {
    inner: Arc<Inner>,
}

impl OverlayService {
    pub fn new(config: OverlayConfig, library: Arc<dyn MediaLibrary>) -> OverlayResult<Self> {
        config.validate()?;
        let attributes = Arc::new(PerItemAttributeCache::new(config.attribute_cache_capacity));
        let aggregates = AggregationEngine::new(attributes.clone(), library.clone());
        let gate = ConcurrencyGate::with_multiplier(config.concurrency_multiplier);
        tracing::info!(
            profiles = config.profiles.len(),
            permits = gate.permits(),
            icons = %config.icons_folder.display(),
            "overlay service ready"
        );
        Ok(Self {
            inner: Arc::new(Inner {
                icons: IconFileCache::new(config.icon_refresh_ttl()),
                config: RwLock::new(Arc::new(config)),
                library,
                attributes,
                aggregates,
                gate: RwLock::new(Arc::new(gate)),
                font: RwLock::new(Arc::new(OnceLock::new())),
            }),
        })
    }

    /// Current configuration snapshot.
    pub fn config(&self) -> Arc<OverlayConfig> {
        self.inner
            .config
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn icons(&self) -> &IconFileCache {
        &self.inner.icons
    }

    pub fn attributes(&self) -> &PerItemAttributeCache {
        &self.inner.attributes
    }

    pub fn aggregates(&self) -> &AggregationEngine {
        &self.inner.aggregates
    }

    pub fn gate(&self) -> Arc<ConcurrencyGate> {
        self.inner
            .gate
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn stats(&self) -> ServiceStats {
        let gate = self.gate();
        ServiceStats {
            icons: self.inner.icons.stats(),
            attributes: self.inner.attributes.stats(),
            aggregates: self.inner.aggregates.stats(),
            permits: gate.permits(),
            available_permits: gate.available_permits(),
            item_locks: gate.item_locks(),
        }
    }

    /// Primary images of leaves and parents whose library maps to a profile.
    pub fn supports(&self, item: &LibraryItem, image: ImageKind) -> bool {
        if image != ImageKind::Primary || !(item.kind.is_leaf() || item.kind.is_parent()) {
            return false;
        }
        let library_id = match &item.library_id {
            Some(id) => Some(id.clone()),
            None => self
                .inner
                .library
                .resolve(item)
                .and_then(|i| i.library_id),
        };
        let config = self.config();
        library_id.is_some_and(|id| config.profile_for_library(&id).is_some())
    }

    /// Key under which the host may cache this item's composite.
    ///
    /// Covers the profile, the icon folder version, the item's attributes (or its children's
    /// fingerprint), the rating score and the output settings.
    pub fn cache_key(&self, item: &LibraryItem) -> String {
        let config = self.config();
        let output = config.output_hash();
        let resolved = match self.resolve(item, &config, &CancellationToken::new()) {
            Ok(Some(r)) => r,
            Ok(None) => return format!("{KEY_SCHEME}-passthrough-{output}"),
            Err(err) => {
                tracing::warn!(item = %item.id, error = %err, "cache key without attributes");
                return format!("{KEY_SCHEME}-unresolved-{}-{output}", item.id);
            }
        };
        self.ensure_icons(&config);
        let rating = match rating_score(&resolved.item, &resolved.profile) {
            Some(score) => resolved.profile.rating.format_score(score),
            None => "-".to_string(),
        };
        format!(
            "{KEY_SCHEME}-{}-{}-{}-{rating}-{output}",
            resolved.profile.content_hash(),
            self.inner.icons.version(),
            resolved.content,
        )
    }

    /// Composite overlays onto `source` and write the result to `dest`.
    ///
    /// Never fails: any error falls back to copying the source unchanged. A cancelled call
    /// never promotes the composite; it keeps earlier output at `dest`, or copies the source
    /// there when there is none.
    #[tracing::instrument(level = "debug", skip_all, fields(item = %item.id))]
    pub async fn enhance(
        &self,
        item: &LibraryItem,
        source: &Path,
        dest: &Path,
        cancel: &CancellationToken,
    ) -> EnhanceOutcome {
        let key = self
            .inner
            .library
            .resolve(item)
            .map_or(item.id, |durable| durable.id);
        let gate = self.gate();
        let _guard = match gate.acquire(key, cancel).await {
            Ok(guard) => guard,
            Err(err) if err.is_cancelled() => return self.cancelled(item, source, dest).await,
            Err(err) => {
                tracing::warn!(item = %item.id, error = %err, "gate unavailable, copying original");
                return self.fallback(item, source, dest, cancel).await;
            }
        };

        match self.composite(item, source, dest, cancel).await {
            Ok(outcome) => outcome,
            Err(err) if err.is_cancelled() => self.cancelled(item, source, dest).await,
            Err(err) => {
                tracing::warn!(
                    item = %item.id,
                    source = %source.display(),
                    error = %err,
                    "overlay failed, copying original"
                );
                self.fallback(item, source, dest, cancel).await
            }
        }
    }

    async fn composite(
        &self,
        item: &LibraryItem,
        source: &Path,
        dest: &Path,
        cancel: &CancellationToken,
    ) -> OverlayResult<EnhanceOutcome> {
        let this = self.clone();
        let config = self.config();
        let (item_owned, source_owned, cancel_owned) =
            (item.clone(), source.to_path_buf(), cancel.clone());
        let rendered = tokio::task::spawn_blocking(move || {
            this.render_item(&item_owned, &source_owned, &config, &cancel_owned)
        })
        .await
        .map_err(|e| OverlayError::render(format!("render task failed: {e}")))??;

        match rendered {
            Some(bytes) => {
                write_atomic(dest, Arc::new(bytes), cancel, Persist::Replace).await?;
                tracing::debug!(dest = %dest.display(), "composite written");
                Ok(EnhanceOutcome::Composited)
            }
            None => {
                copy_original(source, dest, cancel, Persist::Replace).await?;
                Ok(EnhanceOutcome::CopiedOriginal)
            }
        }
    }

    async fn fallback(
        &self,
        item: &LibraryItem,
        source: &Path,
        dest: &Path,
        cancel: &CancellationToken,
    ) -> EnhanceOutcome {
        match copy_original(source, dest, cancel, Persist::Replace).await {
            Ok(()) => EnhanceOutcome::CopiedOriginal,
            Err(err) if err.is_cancelled() => self.cancelled(item, source, dest).await,
            Err(err) => {
                tracing::error!(
                    item = %item.id,
                    source = %source.display(),
                    dest = %dest.display(),
                    error = %err,
                    "could not copy original poster"
                );
                EnhanceOutcome::Failed
            }
        }
    }

    /// Leave earlier output at `dest` alone, or put the untouched source there.
    async fn cancelled(&self, item: &LibraryItem, source: &Path, dest: &Path) -> EnhanceOutcome {
        let copied =
            copy_original(source, dest, &CancellationToken::new(), Persist::KeepExisting).await;
        match copied {
            Ok(()) => {
                tracing::debug!("enhance cancelled, original copied");
                EnhanceOutcome::CopiedOriginal
            }
            Err(OverlayError::Io { source: err, .. })
                if err.kind() == std::io::ErrorKind::AlreadyExists =>
            {
                tracing::debug!("enhance cancelled, earlier output kept");
                EnhanceOutcome::Cancelled
            }
            Err(err) => {
                tracing::error!(
                    item = %item.id,
                    source = %source.display(),
                    dest = %dest.display(),
                    error = %err,
                    "cancelled and could not copy original poster"
                );
                EnhanceOutcome::Failed
            }
        }
    }

    /// Encoded composite, or `None` when there is nothing to draw. Blocking.
    fn render_item(
        &self,
        item: &LibraryItem,
        source: &Path,
        config: &OverlayConfig,
        cancel: &CancellationToken,
    ) -> OverlayResult<Option<Vec<u8>>> {
        let Some(resolved) = self.resolve(item, config, cancel)? else {
            tracing::debug!("no profile for item");
            return Ok(None);
        };
        self.ensure_icons(config);
        let descriptors = build_descriptors(
            &resolved.item,
            &resolved.attributes,
            &resolved.profile,
            &self.inner.icons,
        );
        if descriptors.is_empty() {
            tracing::debug!("nothing to draw");
            return Ok(None);
        }
        if cancel.is_cancelled() {
            return Err(OverlayError::Cancelled);
        }

        let bytes = std::fs::read(source).map_err(|e| OverlayError::io(source, e))?;
        let font = self.font_for(&descriptors, config);
        let rendered = render_overlays(
            &bytes,
            &descriptors,
            &resolved.profile,
            &config.output,
            font.as_ref(),
        )?;
        if cancel.is_cancelled() {
            return Err(OverlayError::Cancelled);
        }
        Ok(Some(rendered.bytes))
    }

    fn resolve(
        &self,
        item: &LibraryItem,
        config: &OverlayConfig,
        cancel: &CancellationToken,
    ) -> OverlayResult<Option<Resolved>> {
        let inner = &self.inner;
        let durable = inner.library.resolve(item).ok_or_else(|| {
            OverlayError::Unresolved(format!("placeholder {} has no durable item", item.id))
        })?;
        let Some(profile) = durable
            .library_id
            .as_ref()
            .and_then(|id| config.profile_for_library(id))
        else {
            return Ok(None);
        };

        let (attributes, content) = if durable.kind.is_leaf() {
            let attrs = inner
                .attributes
                .resolve(&durable, profile, inner.library.as_ref());
            let hash = attrs.content_hash();
            (attrs, hash)
        } else if durable.kind.is_parent() {
            let meta = inner.attributes.resolve_metadata(&durable, profile);
            if profile.aggregation.enabled {
                let agg = inner.aggregates.aggregate(&durable, profile, cancel)?;
                let mut h = StableHasher::new();
                h.write_u64(agg.fingerprint.as_u64());
                h.write_u64(meta.content_hash().as_u64());
                (agg.attributes.clone().merge_missing(&meta), h.finish())
            } else {
                ((*meta).clone(), meta.content_hash())
            }
        } else {
            return Ok(None);
        };

        Ok(Some(Resolved {
            profile: profile.clone(),
            item: durable,
            attributes,
            content,
        }))
    }

    fn ensure_icons(&self, config: &OverlayConfig) {
        if let RefreshOutcome::Rebuilt { version, changed } =
            self.inner.icons.initialize(&config.icons_folder)
        {
            tracing::debug!(%version, changed, "icon tables rebuilt");
        }
    }

    /// Rating face, discovered once per configuration. `None` when no rating is drawn.
    fn font_for(
        &self,
        descriptors: &[OverlayDescriptor],
        config: &OverlayConfig,
    ) -> Option<FontFace> {
        let wants_text = descriptors
            .iter()
            .any(|d| matches!(d.content, OverlayContent::Rating { .. }));
        if !wants_text {
            return None;
        }
        let slot = self
            .inner
            .font
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        slot.get_or_init(|| discover_font(config.rating_font.as_deref()))
            .clone()
    }

    /// Drop cached facets of the changed item and every aggregate above it.
    pub fn handle_event(&self, event: &LibraryEvent) {
        let inner = &self.inner;
        inner.attributes.invalidate_item(event.item_id);
        let mut dropped = usize::from(inner.aggregates.invalidate(event.item_id));

        let ancestors = if event.ancestor_ids.is_empty() {
            inner.library.ancestors(event.item_id)
        } else {
            event.ancestor_ids.clone()
        };
        for id in ancestors {
            dropped += usize::from(inner.aggregates.invalidate(id));
        }
        tracing::debug!(
            kind = ?event.kind,
            item = %event.item_id,
            aggregates = dropped,
            "library event applied"
        );
    }

    /// Apply events until every sender is dropped.
    pub fn spawn_event_listener(&self, mut events: mpsc::Receiver<LibraryEvent>) -> JoinHandle<()> {
        let this = self.clone();
        tokio::spawn(async move {
            while let Some(event) = events.recv().await {
                this.handle_event(&event);
            }
            tracing::debug!("library event channel closed");
        })
    }

    /// One maintenance pass: age out aggregates, drop idle item locks, rescan icons past
    /// their TTL. Blocking.
    pub fn run_maintenance(&self) -> MaintenanceReport {
        let config = self.config();
        let aggregates_pruned = self
            .inner
            .aggregates
            .prune_older_than(config.aggregate_max_age());
        let locks_pruned = self.gate().prune_idle();
        let icons_rebuilt = matches!(
            self.inner.icons.initialize(&config.icons_folder),
            RefreshOutcome::Rebuilt { .. }
        );
        let report = MaintenanceReport {
            aggregates_pruned,
            locks_pruned,
            icons_rebuilt,
        };
        tracing::debug!(?report, "maintenance pass");
        report
    }

    /// Run [`Self::run_maintenance`] every `interval` until `shutdown` fires.
    pub fn spawn_maintenance(
        &self,
        interval: Duration,
        shutdown: CancellationToken,
    ) -> JoinHandle<()> {
        let this = self.clone();
        tokio::spawn(async move {
            let mut ticks = tokio::time::interval(interval.max(Duration::from_millis(1)));
            // The first tick completes immediately.
            ticks.tick().await;
            loop {
                tokio::select! {
                    _ = shutdown.cancelled() => break,
                    _ = ticks.tick() => {
                        let pass = this.clone();
                        if let Err(e) = tokio::task::spawn_blocking(move || pass.run_maintenance()).await {
                            tracing::error!(error = %e, "maintenance pass panicked");
                        }
                    }
                }
            }
            tracing::debug!("maintenance stopped");
        })
    }

    /// Swap in a new configuration and forget everything derived from the old one.
    pub fn reload(&self, config: OverlayConfig) -> OverlayResult<()> {
        config.validate()?;
        let inner = &self.inner;
        let previous = self.config();

        inner.attributes.set_capacity(config.attribute_cache_capacity);
        inner.icons.set_ttl(config.icon_refresh_ttl());

        let permits = permits_for(num_cpus::get(), config.concurrency_multiplier);
        if permits != self.gate().permits() {
            // In-flight guards keep the old gate alive until they drop.
            *inner.gate.write().unwrap_or_else(PoisonError::into_inner) =
                Arc::new(ConcurrencyGate::new(permits));
        }
        if previous.rating_font != config.rating_font {
            *inner.font.write().unwrap_or_else(PoisonError::into_inner) = Arc::new(OnceLock::new());
        }

        let same_folder = previous.icons_folder == config.icons_folder;
        let folder = config.icons_folder.clone();
        *inner.config.write().unwrap_or_else(PoisonError::into_inner) = Arc::new(config);

        inner.attributes.clear();
        inner.aggregates.clear();
        let icons = if same_folder {
            inner.icons.refresh(true)
        } else {
            inner.icons.initialize(&folder)
        };
        tracing::info!(
            permits,
            icons_version = %inner.icons.version(),
            rebuilt = matches!(icons, RefreshOutcome::Rebuilt { .. }),
            "configuration reloaded"
        );
        Ok(())
    }

    /// Draw the first available icon of every enabled category of `profile` onto `source`.
    pub async fn render_preview(
        &self,
        profile: &Profile,
        source: &Path,
        dest: &Path,
    ) -> OverlayResult<Vec<GroupPlacement>> {
        profile.validate()?;
        let this = self.clone();
        let config = self.config();
        let (profile, source_owned) = (profile.clone(), source.to_path_buf());
        let rendered = tokio::task::spawn_blocking(move || {
            this.ensure_icons(&config);
            let descriptors = preview_descriptors(&profile, &this.inner.icons);
            let bytes =
                std::fs::read(&source_owned).map_err(|e| OverlayError::io(&source_owned, e))?;
            let font = this.font_for(&descriptors, &config);
            render_overlays(&bytes, &descriptors, &profile, &config.output, font.as_ref())
        })
        .await
        .map_err(|e| OverlayError::render(format!("preview task failed: {e}")))??;

        write_atomic(
            dest,
            Arc::new(rendered.bytes),
            &CancellationToken::new(),
            Persist::Replace,
        )
        .await?;
        tracing::info!(dest = %dest.display(), groups = rendered.placements.len(), "preview written");
        Ok(rendered.placements)
    }
}

fn rating_score(item: &LibraryItem, profile: &Profile) -> Option<f32> {
    if !profile.is_enabled(OverlayCategory::Rating) {
        return None;
    }
    item.community_rating.filter(|s| s.is_finite())
}

/// Icon names an attribute set asks for in `category`, in drawing order.
pub(crate) fn category_names(attrs: &AttributeSet, category: OverlayCategory) -> Vec<String> {
    fn one(v: &Option<String>) -> Vec<String> {
        v.iter().cloned().collect()
    }
    match category {
        OverlayCategory::AudioLanguage => attrs.audio_languages.iter().cloned().collect(),
        OverlayCategory::SubtitleLanguage => attrs.subtitle_languages.iter().cloned().collect(),
        OverlayCategory::AudioCodec => attrs.audio_codecs.iter().cloned().collect(),
        OverlayCategory::VideoCodec => attrs.video_codecs.iter().cloned().collect(),
        OverlayCategory::Tag => attrs.tags.iter().cloned().collect(),
        OverlayCategory::ChannelLayout => one(&attrs.channel_layout),
        OverlayCategory::Resolution => one(&attrs.resolution),
        OverlayCategory::AspectRatio => one(&attrs.aspect_ratio),
        OverlayCategory::ParentalRating => one(&attrs.parental_rating),
        OverlayCategory::VideoFormat => attrs
            .video_format()
            .map(|f| f.label().to_string())
            .into_iter()
            .collect(),
        OverlayCategory::Rating => Vec::new(),
    }
}

/// One descriptor per enabled category that has something to draw. Names without a usable
/// icon are skipped.
pub(crate) fn build_descriptors(
    item: &LibraryItem,
    attrs: &AttributeSet,
    profile: &Profile,
    icons: &IconFileCache,
) -> Vec<OverlayDescriptor> {
    let mut out = Vec::new();
    for category in profile.enabled_categories() {
        let content = if category == OverlayCategory::Rating {
            let Some(score) = rating_score(item, profile) else {
                continue;
            };
            OverlayContent::Rating {
                score,
                badge: badge_icon(profile, icons),
            }
        } else {
            OverlayContent::Icons(
                category_names(attrs, category)
                    .into_iter()
                    .filter_map(|name| {
                        let image = icons.get_cached_icon(&name, category)?;
                        Some(IconRef::new(name, image))
                    })
                    .collect(),
            )
        };
        if !content.is_empty() {
            out.push(OverlayDescriptor::new(
                category,
                profile.settings(category),
                content,
            ));
        }
    }
    out
}

fn badge_icon(profile: &Profile, icons: &IconFileCache) -> Option<IconRef> {
    let name = profile.rating.badge_icon.as_deref()?;
    let image = icons.get_cached_icon(name, OverlayCategory::Rating)?;
    Some(IconRef::new(name, image))
}

fn preview_descriptors(profile: &Profile, icons: &IconFileCache) -> Vec<OverlayDescriptor> {
    profile
        .enabled_categories()
        .filter_map(|category| {
            let content = if category == OverlayCategory::Rating {
                OverlayContent::Rating {
                    score: PREVIEW_SCORE,
                    badge: badge_icon(profile, icons),
                }
            } else {
                let image = icons.get_first_available_icon(category)?;
                OverlayContent::Icons(vec![IconRef::new(category.label(), image)])
            };
            Some(OverlayDescriptor::new(
                category,
                profile.settings(category),
                content,
            ))
        })
        .collect()
}

/// Run `op` until it succeeds, fails for good, or `cancel` fires during a backoff.
/// Transient IO errors are retried up to [`WRITE_ATTEMPTS`] times with doubling delays.
pub(crate) async fn retry_transient<T, F, Fut>(
    cancel: &CancellationToken,
    mut op: F,
) -> OverlayResult<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = OverlayResult<T>>,
{
    let mut delay = WRITE_BACKOFF;
    let mut attempt = 1;
    loop {
        match op().await {
            Err(err) if err.is_transient() && attempt < WRITE_ATTEMPTS => {
                tracing::warn!(attempt, error = %err, "transient write failure, retrying");
                tokio::select! {
                    biased;
                    _ = cancel.cancelled() => return Err(OverlayError::Cancelled),
                    _ = tokio::time::sleep(delay) => {}
                }
                delay *= 2;
                attempt += 1;
            }
            result => return result,
        }
    }
}

/// Replace `dest` with `bytes` via a temp file in the same directory, so readers never see
/// a partial image.
/// How a finished temp file takes the destination's place.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Persist {
    Replace,
    /// Fail with `AlreadyExists` rather than overwrite.
    KeepExisting,
}

async fn write_atomic(
    dest: &Path,
    bytes: Arc<Vec<u8>>,
    cancel: &CancellationToken,
    mode: Persist,
) -> OverlayResult<()> {
    retry_transient(cancel, || {
        let (dest, bytes, cancel) = (dest.to_path_buf(), bytes.clone(), cancel.clone());
        async move {
            tokio::task::spawn_blocking(move || persist_bytes(&dest, &bytes, &cancel, mode))
                .await
                .map_err(|e| OverlayError::render(format!("write task failed: {e}")))?
        }
    })
    .await
}

async fn copy_original(
    source: &Path,
    dest: &Path,
    cancel: &CancellationToken,
    mode: Persist,
) -> OverlayResult<()> {
    if cancel.is_cancelled() {
        return Err(OverlayError::Cancelled);
    }
    let bytes = tokio::fs::read(source)
        .await
        .map_err(|e| OverlayError::io(source, e))?;
    write_atomic(dest, Arc::new(bytes), cancel, mode).await?;
    tracing::debug!(dest = %dest.display(), "original copied");
    Ok(())
}

fn persist_bytes(
    dest: &Path,
    bytes: &[u8],
    cancel: &CancellationToken,
    mode: Persist,
) -> OverlayResult<()> {
    let dir: PathBuf = match dest.parent() {
        Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
        _ => PathBuf::from("."),
    };
    std::fs::create_dir_all(&dir).map_err(|e| OverlayError::io(&dir, e))?;
    let mut tmp = tempfile::NamedTempFile::new_in(&dir).map_err(|e| OverlayError::io(&dir, e))?;
    tmp.write_all(bytes)
        .and_then(|()| tmp.as_file().sync_all())
        .map_err(|e| OverlayError::io(dest, e))?;
    // Dropping the temp file removes it.
    if cancel.is_cancelled() {
        return Err(OverlayError::Cancelled);
    }
    let persisted = match mode {
        Persist::Replace => tmp.persist(dest),
        Persist::KeepExisting => tmp.persist_noclobber(dest),
    };
    persisted.map_err(|e| OverlayError::io(dest, e.error))?;
    Ok(())
}

#[cfg(test)]
#[path = "../tests/unit/service.rs"]
mod tests;
