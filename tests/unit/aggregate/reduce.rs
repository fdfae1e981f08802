use proptest::prelude::*;

use super::*;
use crate::model::profile::{Alignment, CategorySettings, Orientation};

fn enabled(cats: &[OverlayCategory]) -> Profile {
    cats.iter().fold(Profile::new("p"), |p, c| {
        p.with_category(
            *c,
            CategorySettings::at(Alignment::TopLeft, 1, Orientation::Horizontal),
        )
    })
}

fn all() -> Profile {
    enabled(&OverlayCategory::ALL)
}

fn langs(v: &[&str]) -> AttributeSet {
    AttributeSet::default().with_audio_languages(v.iter().copied())
}

#[test]
fn zero_children_is_empty() {
    assert!(reduce_all(&all(), []).is_empty());
}

#[test]
fn languages_intersect() {
    let out = reduce_all(
        &all(),
        &[langs(&["eng", "fre"]), langs(&["eng", "ger"]), langs(&["eng"])],
    );
    assert_eq!(out.audio_languages, ["eng"].map(String::from).into());
}

#[test]
fn single_values_need_unanimity() {
    let a = AttributeSet::default().with_resolution(Some("1080p"));
    let b = AttributeSet::default().with_resolution(Some("720p"));
    assert_eq!(
        reduce_all(&all(), &[a.clone(), a.clone()]).resolution.as_deref(),
        Some("1080p")
    );
    assert_eq!(reduce_all(&all(), &[a.clone(), b]).resolution, None);
    // A child with no value breaks agreement too.
    assert_eq!(
        reduce_all(&all(), &[a, AttributeSet::default()]).resolution,
        None
    );
}

#[test]
fn two_of_three_hdr_children_yield_no_format() {
    let hdr = AttributeSet::default().with_video_formats([HdrFormat::Hdr]);
    let sdr = AttributeSet::default();
    let out = reduce_all(&all(), &[hdr.clone(), hdr, sdr]);
    assert!(out.video_formats.is_empty());
}

#[test]
fn hdr_precedence_over_shared_flags() {
    let dv = AttributeSet::default().with_video_formats([HdrFormat::Hdr, HdrFormat::DolbyVision]);
    let plus = AttributeSet::default().with_video_formats([HdrFormat::Hdr, HdrFormat::Hdr10Plus]);

    let out = reduce_all(&all(), &[dv.clone(), dv.clone()]);
    assert_eq!(
        out.video_formats,
        [HdrFormat::DolbyVision].into_iter().collect()
    );
    // Mixed DV / HDR10+ still all share plain HDR.
    let out = reduce_all(&all(), &[dv, plus]);
    assert_eq!(out.video_formats, [HdrFormat::Hdr].into_iter().collect());
}

#[test]
fn disabled_categories_stay_empty() {
    let profile = enabled(&[OverlayCategory::SubtitleLanguage]);
    let child = langs(&["eng"]).with_video_formats([HdrFormat::DolbyVision, HdrFormat::Hdr]);
    let out = reduce_all(&profile, &[child.clone(), child]);
    assert!(out.audio_languages.is_empty());
    assert!(out.video_formats.is_empty());
}

#[test]
fn settles_once_everything_is_empty() {
    let mut r = Reduction::new(&enabled(&[OverlayCategory::AudioLanguage]));
    r.fold(&langs(&["eng"]));
    assert!(!r.is_settled());
    r.fold(&langs(&["fre"]));
    assert!(r.is_settled());
    r.fold(&langs(&["fre"]));
    assert_eq!(r.children(), 3);
    assert!(r.finish().audio_languages.is_empty());
}

#[test]
fn metadata_fields_are_not_aggregated() {
    let child = AttributeSet::default()
        .with_parental_rating(Some("R"))
        .with_tags(["Favorite"]);
    let out = reduce_all(&all(), &[child.clone(), child]);
    assert!(out.parental_rating.is_none());
    assert!(out.tags.is_empty());
}

proptest! {
    #[test]
    fn audio_languages_equal_intersection(
        children in prop::collection::vec(
            prop::collection::btree_set(prop::sample::select(vec!["eng", "fre", "ger", "spa", "jpn"]), 0..5),
            1..8,
        )
    ) {
        let sets: Vec<AttributeSet> = children
            .iter()
            .map(|s| AttributeSet::default().with_audio_languages(s.iter().copied()))
            .collect();
        let out = reduce_all(&all(), &sets);

        let mut expected: BTreeSet<String> = sets[0].audio_languages.clone();
        for s in &sets[1..] {
            expected = expected.intersection(&s.audio_languages).cloned().collect();
        }
        prop_assert_eq!(out.audio_languages, expected);
    }
}
