use super::*;
use crate::foundation::core::ItemId;
use crate::model::{
    item::ItemKind,
    profile::{Alignment, CategorySettings, Orientation},
};

fn all_enabled() -> Profile {
    OverlayCategory::ALL
        .into_iter()
        .fold(Profile::new("all"), |p, c| {
            p.with_category(
                c,
                CategorySettings::at(Alignment::TopLeft, 1, Orientation::Horizontal),
            )
        })
}

#[test]
fn collects_languages_and_codecs() {
    let streams = vec![
        MediaStream::video("AVC", 1920, 1080),
        MediaStream::audio("ENG", "dca", 6).with_profile("DTS-HD MA"),
        MediaStream::audio("fre", "ac3", 2),
        MediaStream::audio("und", "aac", 2),
        MediaStream::subtitle("eng"),
    ];
    let a = extract_streams(&streams, &all_enabled());

    assert_eq!(a.audio_languages, ["eng", "fre"].map(String::from).into());
    assert_eq!(a.subtitle_languages, ["eng"].map(String::from).into());
    assert_eq!(a.audio_codecs, ["aac", "ac3", "dtshd"].map(String::from).into());
    assert_eq!(a.video_codecs, ["h264"].map(String::from).into());
    assert_eq!(a.channel_layout.as_deref(), Some("5.1"));
    assert_eq!(a.resolution.as_deref(), Some("1080p"));
    assert_eq!(a.aspect_ratio.as_deref(), Some("1.78"));
    assert!(a.video_formats.is_empty());
}

#[test]
fn disabled_categories_are_not_computed() {
    let profile = Profile::new("p").with_category(
        OverlayCategory::SubtitleLanguage,
        CategorySettings::at(Alignment::TopRight, 1, Orientation::Vertical),
    );
    let streams = vec![
        MediaStream::audio("eng", "aac", 2),
        MediaStream::subtitle("ger"),
        MediaStream::video("hevc", 3840, 2160),
    ];
    let a = extract_streams(&streams, &profile);
    assert!(a.audio_languages.is_empty());
    assert!(a.resolution.is_none());
    assert_eq!(a.subtitle_languages.len(), 1);
}

#[test]
fn hdr_flags_imply_plain_hdr() {
    let dv = MediaStream::video("hevc", 3840, 2160).with_video_range("DOVIWithHDR10");
    assert_eq!(
        hdr_formats(&dv),
        vec![HdrFormat::Hdr, HdrFormat::DolbyVision]
    );
    let plus = MediaStream::video("hevc", 3840, 2160).with_video_range("HDR10+");
    assert_eq!(
        hdr_formats(&plus),
        vec![HdrFormat::Hdr, HdrFormat::Hdr10Plus]
    );
    let hlg = MediaStream::video("hevc", 3840, 2160).with_video_range("HLG");
    assert_eq!(hdr_formats(&hlg), vec![HdrFormat::Hdr]);
    let flagged = MediaStream::video("hevc", 3840, 2160).with_dolby_vision();
    assert!(hdr_formats(&flagged).contains(&HdrFormat::DolbyVision));
    let sdr = MediaStream::video("h264", 1280, 720).with_video_range("SDR");
    assert!(hdr_formats(&sdr).is_empty());
}

#[test]
fn channel_layout_prefers_richest_stream() {
    let streams = vec![
        MediaStream::audio("eng", "aac", 2),
        MediaStream::audio("eng", "truehd", 8).with_channel_layout("7.1(wide)"),
    ];
    let a = extract_streams(&streams, &all_enabled());
    assert_eq!(a.channel_layout.as_deref(), Some("7.1"));
}

#[test]
fn resolution_and_aspect_classes() {
    let scope = MediaStream::video("hevc", 3840, 1600).with_aspect_ratio("2.40:1");
    let a = extract_streams(&[scope], &all_enabled());
    assert_eq!(a.resolution.as_deref(), Some("4k"));
    assert_eq!(a.aspect_ratio.as_deref(), Some("2.40"));

    let dvd = MediaStream::video("mpeg2video", 720, 576).with_aspect_ratio("16:9");
    let a = extract_streams(&[dvd], &all_enabled());
    assert_eq!(a.resolution.as_deref(), Some("576p"));
    assert_eq!(a.aspect_ratio.as_deref(), Some("16x9"));
    assert!(a.video_codecs.contains("mpeg2"));
}

#[test]
fn metadata_facet_reads_rating_and_tags() {
    let item = LibraryItem::new(ItemId::new_v4(), ItemKind::Movie)
        .with_official_rating(" PG-13 ")
        .with_tags(["Favorite", "", "Kids"]);
    let a = extract_metadata(&item, &all_enabled());
    assert_eq!(a.parental_rating.as_deref(), Some("PG-13"));
    assert_eq!(a.tags.len(), 2);
    assert!(a.tags.contains("Favorite"));

    let none = extract_metadata(&item, &Profile::new("off"));
    assert!(none.is_empty());
}
