use std::io::Cursor;

use super::*;

fn png_bytes(w: u32, h: u32) -> Vec<u8> {
    let img = image::RgbaImage::from_pixel(w, h, image::Rgba([10, 20, 30, 255]));
    let mut buf = Vec::new();
    image::DynamicImage::ImageRgba8(img)
        .write_to(&mut Cursor::new(&mut buf), image::ImageFormat::Png)
        .unwrap();
    buf
}

fn folder_with(names: &[&str]) -> tempfile::TempDir {
    let dir = tempfile::tempdir().unwrap();
    for name in names {
        std::fs::write(dir.path().join(name), png_bytes(24, 16)).unwrap();
    }
    dir
}

fn cache_for(dir: &tempfile::TempDir) -> IconFileCache {
    let cache = IconFileCache::new(Duration::from_secs(3600));
    cache.initialize(dir.path());
    cache
}

#[test]
fn unchanged_refresh_keeps_decoded_instances() {
    let dir = folder_with(&["eng.png", "srt.eng.png"]);
    let cache = cache_for(&dir);

    let first = cache
        .get_cached_icon("eng", OverlayCategory::AudioLanguage)
        .unwrap();
    let decodes = cache.stats().decodes;

    assert_eq!(cache.refresh(false), RefreshOutcome::Unchanged);
    let second = cache
        .get_cached_icon("eng", OverlayCategory::AudioLanguage)
        .unwrap();
    assert!(Arc::ptr_eq(&first, &second));
    assert_eq!(cache.stats().decodes, decodes);
}

#[test]
fn new_icon_changes_version_and_notifies() {
    let dir = folder_with(&["eng.png"]);
    let cache = cache_for(&dir);
    let mut rx = cache.subscribe();
    let before = cache.version();

    std::fs::write(dir.path().join("fre.png"), png_bytes(16, 16)).unwrap();
    let outcome = cache.refresh(true);
    let RefreshOutcome::Rebuilt { version, changed } = outcome else {
        panic!("expected rebuild, got {outcome:?}");
    };
    assert!(changed);
    assert_ne!(version, before);
    assert_eq!(cache.version(), version);
    assert!(rx.has_changed().unwrap());
    assert_eq!(*rx.borrow_and_update(), version);
    assert!(cache
        .get_cached_icon("fre", OverlayCategory::AudioLanguage)
        .is_some());
}

#[test]
fn forced_refresh_without_changes_keeps_version() {
    let dir = folder_with(&["eng.png"]);
    let cache = cache_for(&dir);
    let before = cache.version();
    let epoch = cache.epoch();
    assert_eq!(
        cache.refresh(true),
        RefreshOutcome::Rebuilt {
            version: before,
            changed: false
        }
    );
    assert_eq!(cache.epoch(), epoch + 1);
}

#[test]
fn mtime_change_is_detected_without_force() {
    let dir = folder_with(&["hevc.png"]);
    let cache = cache_for(&dir);
    let before = cache.version();

    let path = dir.path().join("hevc.png");
    filetime::set_file_mtime(&path, filetime::FileTime::from_unix_time(1_000_000, 0)).unwrap();
    assert!(matches!(
        cache.refresh(false),
        RefreshOutcome::Rebuilt { changed: true, .. }
    ));
    assert_ne!(cache.version(), before);
}

#[test]
fn lookups_ignore_case_except_tags() {
    let dir = folder_with(&["ENG.png", "Favorite.png", "1080p.png"]);
    let cache = cache_for(&dir);

    assert!(cache
        .get_cached_icon("eng", OverlayCategory::AudioLanguage)
        .is_some());
    assert!(cache
        .get_cached_icon("1080P", OverlayCategory::Resolution)
        .is_some());
    assert!(cache.get_cached_icon("Favorite", OverlayCategory::Tag).is_some());
    assert!(cache.get_cached_icon("favorite", OverlayCategory::Tag).is_none());
    assert!(cache
        .get_cached_icon("favorite", OverlayCategory::Rating)
        .is_some());
    // Closed-vocabulary names are not tags.
    assert!(cache.get_cached_icon("1080p", OverlayCategory::Tag).is_none());
}

#[test]
fn three_letter_language_falls_back_to_prefix() {
    let dir = folder_with(&["en.png", "srt.de.png"]);
    let cache = cache_for(&dir);

    assert!(cache
        .get_cached_icon("eng", OverlayCategory::AudioLanguage)
        .is_some());
    assert_eq!(cache.stats().aliases, 1);
    assert!(cache
        .get_cached_icon("eng", OverlayCategory::AudioLanguage)
        .is_some());
    assert_eq!(cache.stats().aliases, 1);

    assert!(cache
        .get_cached_icon("deu", OverlayCategory::SubtitleLanguage)
        .is_some());
    assert!(cache
        .get_cached_icon("fre", OverlayCategory::AudioLanguage)
        .is_none());
}

#[test]
fn corrupt_icon_is_skipped() {
    let dir = folder_with(&["eng.png"]);
    std::fs::write(dir.path().join("fre.png"), b"definitely not a png, but long enough").unwrap();
    std::fs::write(dir.path().join("ger.png"), b"tiny").unwrap();
    let cache = cache_for(&dir);

    assert!(cache
        .get_cached_icon("fre", OverlayCategory::AudioLanguage)
        .is_none());
    assert!(cache
        .get_cached_icon("ger", OverlayCategory::AudioLanguage)
        .is_none());
    assert!(cache
        .get_cached_icon("eng", OverlayCategory::AudioLanguage)
        .is_some());
    let stats = cache.stats();
    assert_eq!(stats.rejected, 2);
    assert_eq!(stats.decoded, 1);

    // Rejections are remembered until the next rebuild.
    cache.get_cached_icon("fre", OverlayCategory::AudioLanguage);
    assert_eq!(cache.stats().decodes, stats.decodes);
}

#[test]
fn missing_folder_means_no_icons() {
    let cache = IconFileCache::new(Duration::from_secs(60));
    let outcome = cache.initialize(Path::new("/no/such/icon/folder"));
    assert!(matches!(outcome, RefreshOutcome::Rebuilt { .. }));
    assert!(cache
        .get_cached_icon("eng", OverlayCategory::AudioLanguage)
        .is_none());
    assert_eq!(cache.stats().files, 0);
}

#[test]
fn first_available_icon_is_name_ordered() {
    let dir = folder_with(&["srt.fre.png", "srt.eng.png"]);
    std::fs::write(dir.path().join("srt.abc.png"), b"broken broken broken broken broken").unwrap();
    let cache = cache_for(&dir);

    assert!(cache
        .get_first_available_icon(OverlayCategory::SubtitleLanguage)
        .is_some());
    assert_eq!(cache.stats().rejected, 1);
    assert!(cache
        .get_first_available_icon(OverlayCategory::Resolution)
        .is_none());
}

#[test]
fn initialize_respects_folder_and_ttl() {
    let a = folder_with(&["eng.png"]);
    let b = folder_with(&["fre.png"]);
    let cache = IconFileCache::new(Duration::from_secs(3600));

    assert!(matches!(
        cache.initialize(a.path()),
        RefreshOutcome::Rebuilt { .. }
    ));
    assert_eq!(cache.initialize(a.path()), RefreshOutcome::Unchanged);
    let epoch = cache.epoch();

    assert!(matches!(
        cache.initialize(b.path()),
        RefreshOutcome::Rebuilt { changed: true, .. }
    ));
    assert_eq!(cache.epoch(), epoch + 1);
    assert!(cache
        .get_cached_icon("eng", OverlayCategory::AudioLanguage)
        .is_none());

    cache.set_ttl(Duration::ZERO);
    std::fs::write(b.path().join("ger.png"), png_bytes(8, 8)).unwrap();
    assert!(matches!(
        cache.initialize(b.path()),
        RefreshOutcome::Rebuilt { changed: true, .. }
    ));
}

#[test]
fn non_icon_files_are_not_indexed() {
    let dir = folder_with(&["eng.png"]);
    std::fs::write(dir.path().join("readme.txt"), "hello hello hello hello hello").unwrap();
    std::fs::create_dir(dir.path().join("nested.png")).unwrap();
    let cache = cache_for(&dir);
    assert_eq!(cache.stats().files, 1);
}
