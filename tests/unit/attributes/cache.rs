use std::time::Duration;

use super::*;
use crate::library::InMemoryLibrary;
use crate::model::{
    item::{ItemKind, MediaStream},
    profile::{Alignment, CategorySettings, OverlayCategory, Orientation},
};

fn audio_profile() -> Profile {
    Profile::new("p")
        .with_category(
            OverlayCategory::AudioLanguage,
            CategorySettings::at(Alignment::TopLeft, 1, Orientation::Horizontal),
        )
        .with_category(
            OverlayCategory::ParentalRating,
            CategorySettings::at(Alignment::BottomLeft, 1, Orientation::Horizontal),
        )
}

fn movie(lib: &InMemoryLibrary, langs: &[&str]) -> LibraryItem {
    let item = LibraryItem::new(ItemId::new_v4(), ItemKind::Movie).with_official_rating("R");
    lib.insert(item.clone(), None);
    lib.set_streams(
        item.id,
        langs
            .iter()
            .map(|l| MediaStream::audio(l, "aac", 2))
            .collect(),
    );
    item
}

#[test]
fn second_resolve_does_not_rescan() {
    let lib = InMemoryLibrary::new();
    let item = movie(&lib, &["eng", "fre"]);
    let cache = PerItemAttributeCache::new(100);
    let profile = audio_profile();

    let a = cache.resolve(&item, &profile, &lib);
    let b = cache.resolve(&item, &profile, &lib);
    assert_eq!(a, b);
    assert_eq!(lib.stream_scans(), 1);
    assert_eq!(a.audio_languages.len(), 2);
    assert_eq!(a.parental_rating.as_deref(), Some("R"));

    let stats = cache.stats();
    assert_eq!(stats.misses, 2);
    assert_eq!(stats.hits, 2);
}

#[test]
fn tick_change_forces_recompute() {
    let lib = InMemoryLibrary::new();
    let item = movie(&lib, &["eng"]);
    let cache = PerItemAttributeCache::new(100);
    let profile = audio_profile();

    cache.resolve(&item, &profile, &lib);
    lib.set_streams(item.id, vec![MediaStream::audio("ger", "aac", 2)]);
    let touched = item.clone().with_date_modified(Ticks(7));
    let a = cache.resolve(&touched, &profile, &lib);
    assert_eq!(lib.stream_scans(), 2);
    assert!(a.audio_languages.contains("ger"));
    assert_eq!(cache.len(), 2);
}

#[test]
fn profile_change_forces_recompute() {
    let lib = InMemoryLibrary::new();
    let item = movie(&lib, &["eng"]);
    let cache = PerItemAttributeCache::new(100);

    cache.resolve(&item, &audio_profile(), &lib);
    let other = audio_profile().with_category(
        OverlayCategory::AudioCodec,
        CategorySettings::at(Alignment::TopRight, 1, Orientation::Horizontal),
    );
    let a = cache.resolve(&item, &other, &lib);
    assert_eq!(lib.stream_scans(), 2);
    assert!(a.audio_codecs.contains("aac"));
}

#[test]
fn invalidate_item_leaves_others() {
    let lib = InMemoryLibrary::new();
    let a = movie(&lib, &["eng"]);
    let b = movie(&lib, &["fre"]);
    let cache = PerItemAttributeCache::new(100);
    let profile = audio_profile();
    cache.resolve(&a, &profile, &lib);
    cache.resolve(&b, &profile, &lib);
    assert_eq!(cache.len(), 4);

    cache.invalidate_item(a.id);
    assert_eq!(cache.len(), 2);
    cache.resolve(&b, &profile, &lib);
    assert_eq!(lib.stream_scans(), 2);
    cache.resolve(&a, &profile, &lib);
    assert_eq!(lib.stream_scans(), 3);
}

#[test]
fn eviction_without_runtime_is_inline_and_oldest_first() {
    let cache = PerItemAttributeCache::new(2);
    let items: Vec<_> = (0..3)
        .map(|_| LibraryItem::new(ItemId::new_v4(), ItemKind::Movie))
        .collect();
    for item in &items {
        cache.get_or_compute(item, Facet::Streams, Fingerprint::EMPTY, AttributeSet::default);
    }
    assert_eq!(cache.len(), 2);
    assert_eq!(cache.stats().evicted, 1);

    let mut computed = false;
    cache.get_or_compute(&items[0], Facet::Streams, Fingerprint::EMPTY, || {
        computed = true;
        AttributeSet::default()
    });
    assert!(computed, "oldest entry should have been evicted");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn eviction_with_runtime_runs_in_background() {
    let cache = PerItemAttributeCache::new(3);
    for _ in 0..10 {
        let item = LibraryItem::new(ItemId::new_v4(), ItemKind::Movie);
        cache.get_or_compute(&item, Facet::Metadata, Fingerprint::EMPTY, AttributeSet::default);
    }
    for _ in 0..200 {
        if cache.len() <= 3 {
            break;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
        cache.set_capacity(3);
    }
    assert!(cache.len() <= 3);
}

#[test]
fn inserts_during_a_running_trim_are_caught_by_it() {
    let cache = PerItemAttributeCache::new(2);
    // A pass is in flight: further misses skip scheduling their own.
    cache.evicting.store(true, Ordering::Release);
    for _ in 0..5 {
        let item = LibraryItem::new(ItemId::new_v4(), ItemKind::Movie);
        cache.get_or_compute(&item, Facet::Streams, Fingerprint::EMPTY, AttributeSet::default);
    }
    assert_eq!(cache.len(), 5);

    trim_to_capacity(&cache.entries, &cache.evicting, &cache.evicted, 2);
    assert_eq!(cache.len(), 2);
    assert_eq!(cache.stats().evicted, 3);
    assert!(!cache.evicting.load(Ordering::Acquire));
}

#[test]
fn clear_empties_everything() {
    let cache = PerItemAttributeCache::new(10);
    let item = LibraryItem::new(ItemId::new_v4(), ItemKind::Episode);
    cache.get_or_compute(&item, Facet::Streams, Fingerprint::EMPTY, AttributeSet::default);
    assert!(cache.oldest_age().is_some());
    cache.clear();
    assert!(cache.is_empty());
    assert!(cache.oldest_age().is_none());
}
