use super::*;
use crate::model::profile::{Alignment, CategorySettings, OverlayCategory, Orientation};

const SAMPLE: &str = r#"
icons_folder = "/srv/icons"
concurrency_multiplier = 0.5

[output]
jpeg_quality = 80
format = "png"

[[profiles]]
name = "Movies"

[profiles.categories.audio_language]
alignment = "top_left"
priority = 1

[profiles.categories.resolution]
alignment = "bottom_right"
orientation = "vertical"

[library_profiles]
lib-movies = "Movies"
"#;

#[test]
fn defaults_are_valid() {
    let cfg = OverlayConfig::default();
    cfg.validate().unwrap();
    assert_eq!(cfg.attribute_cache_capacity, 5000);
    assert_eq!(cfg.icon_refresh_ttl(), Duration::from_secs(60));
    assert_eq!(cfg.aggregate_max_age(), Duration::from_secs(3600));
}

#[test]
fn toml_layers_over_defaults() {
    let cfg = OverlayConfig::from_toml_str(SAMPLE).unwrap();
    assert_eq!(cfg.icons_folder, PathBuf::from("/srv/icons"));
    assert_eq!(cfg.output.jpeg_quality, 80);
    assert_eq!(cfg.output.format, OutputFormat::Png);
    assert_eq!(cfg.concurrency_multiplier, 0.5);
    assert_eq!(cfg.maintenance_interval_secs, 300);

    let p = cfg
        .profile_for_library(&LibraryId::new("lib-movies"))
        .unwrap();
    assert_eq!(p.name, "Movies");
    assert_eq!(
        p.settings(OverlayCategory::Resolution),
        CategorySettings::at(Alignment::BottomRight, 1, Orientation::Vertical)
    );
    assert!(cfg.profile_for_library(&LibraryId::new("other")).is_none());
}

#[test]
fn rejects_duplicate_profiles() {
    let mut cfg = OverlayConfig::default();
    cfg.profiles = vec![Profile::new("a"), Profile::new("a")];
    let err = cfg.validate().unwrap_err();
    assert!(err.to_string().contains("duplicate"));
}

#[test]
fn rejects_mapping_to_unknown_profile() {
    let mut cfg = OverlayConfig::default();
    cfg.library_profiles
        .insert(LibraryId::new("lib"), "missing".to_string());
    assert!(cfg.validate().is_err());
}

#[test]
fn rejects_out_of_range_numbers() {
    let mut cfg = OverlayConfig::default();
    cfg.output.jpeg_quality = 0;
    assert!(cfg.validate().is_err());

    let mut cfg = OverlayConfig::default();
    cfg.concurrency_multiplier = 0.0;
    assert!(cfg.validate().is_err());
}

#[test]
fn invalid_toml_type_is_a_config_error() {
    let err = OverlayConfig::from_toml_str("attribute_cache_capacity = \"lots\"").unwrap_err();
    assert!(matches!(err, OverlayError::Config(_)));
}

#[test]
fn missing_file_is_a_config_error() {
    let err = OverlayConfig::load(Some(Path::new("/definitely/not/here.toml"))).unwrap_err();
    assert!(matches!(err, OverlayError::Config(_)));
}

#[test]
fn output_hash_changes_with_quality() {
    let a = OverlayConfig::default();
    let mut b = a.clone();
    b.output.jpeg_quality = 50;
    assert_ne!(a.output_hash(), b.output_hash());
}
