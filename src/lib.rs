//! Poster badge overlays for media libraries.
//!
//! The engine reads what an item contains (audio and subtitle languages, codecs, resolution,
//! HDR format, parental rating, tags, community rating), finds matching icons in a flat icon
//! folder and composites them into the corners of the item's poster:
//!
//! - [`IconFileCache`] indexes and lazily decodes the icon folder
//! - [`PerItemAttributeCache`] and [`AggregationEngine`] resolve attributes of leaves and of
//!   series, seasons and box sets
//! - [`layout()`] places groups per corner; [`render_overlays`] draws and encodes
//! - [`OverlayService`] ties it together behind the host's `supports` / `cache_key` /
//!   `enhance` calls
#![forbid(unsafe_code)]

mod foundation;

pub(crate) mod aggregate;
pub(crate) mod attributes;
pub mod config;
pub(crate) mod gate;
pub(crate) mod icons;
pub(crate) mod layout;
pub mod library;
pub(crate) mod model;
pub(crate) mod render;
pub(crate) mod service;

pub use crate::foundation::core::{Canvas, ItemId, LibraryId, Rect, Size, Ticks};
pub use crate::foundation::error::{OverlayError, OverlayResult};
pub use crate::foundation::hash::Fingerprint;

pub use crate::aggregate::engine::{AggregatedResult, AggregationEngine, AggregationStats};
pub use crate::attributes::cache::{AttributeCacheStats, Facet, PerItemAttributeCache};
pub use crate::config::{OutputFormat, OutputSettings, OverlayConfig};
pub use crate::gate::{ConcurrencyGate, GateGuard, permits_for};
pub use crate::icons::cache::{IconCacheStats, IconFileCache, RefreshOutcome};
pub use crate::icons::decode::IconImage;
pub use crate::layout::solver::{
    GroupPlacement, IconRef, MAX_ICON_PX, MIN_ICON_PX, OverlayContent, OverlayDescriptor,
    PlacedItem, TextMeasure, icon_height, layout,
};
pub use crate::library::{InMemoryLibrary, LibraryEvent, LibraryEventKind, MediaLibrary};
pub use crate::model::attributes::{AttributeSet, HdrFormat};
pub use crate::model::item::{ImageKind, ItemKind, LibraryItem, MediaStream, StreamKind};
pub use crate::model::profile::{
    AggregationMode, AggregationSettings, Alignment, BackgroundShape, CategorySettings,
    LayoutSettings, OverlayCategory, Orientation, Profile, RatingAppearance, Rgba8,
};
pub use crate::render::compositor::{Poster, RenderedPoster, encode, render_overlays};
pub use crate::render::text::{FontFace, discover_font};
pub use crate::service::{
    EnhanceOutcome, MaintenanceReport, OverlayService, PREVIEW_SCORE, ServiceStats,
    WRITE_ATTEMPTS,
};
