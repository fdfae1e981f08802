use proptest::prelude::*;

use super::*;

struct FixedAdvance;

impl TextMeasure for FixedAdvance {
    fn measure(&mut self, text: &str, font_px: f32) -> Size {
        let px = f64::from(font_px);
        Size::new(text.chars().count() as f64 * px * 0.5, px * 1.2)
    }
}

const POSTER: Canvas = Canvas {
    width: 1000,
    height: 1500,
};

fn icon(name: &str, w: u32, h: u32) -> IconRef {
    IconRef::new(
        name,
        Arc::new(IconImage {
            width: w,
            height: h,
            rgba8_premul: Arc::new(vec![0; (w * h * 4) as usize]),
        }),
    )
}

fn icons(
    category: OverlayCategory,
    alignment: Alignment,
    priority: u32,
    orientation: Orientation,
    names: &[&str],
) -> OverlayDescriptor {
    OverlayDescriptor::new(
        category,
        CategorySettings::at(alignment, priority, orientation),
        OverlayContent::Icons(names.iter().map(|n| icon(n, 100, 100)).collect()),
    )
}

fn run(groups: &[OverlayDescriptor]) -> Vec<GroupPlacement> {
    layout(
        POSTER,
        groups,
        &LayoutSettings::default(),
        &RatingAppearance::default(),
        &mut FixedAdvance,
    )
}

fn icon_rects(g: &GroupPlacement) -> Vec<(String, Rect)> {
    g.items
        .iter()
        .filter_map(|i| match i {
            PlacedItem::Icon { icon, rect } => Some((icon.name.clone(), *rect)),
            _ => None,
        })
        .collect()
}

fn inside(outer: Rect, inner: Rect) -> bool {
    let eps = 1e-6;
    inner.x0 >= outer.x0 - eps
        && inner.y0 >= outer.y0 - eps
        && inner.x1 <= outer.x1 + eps
        && inner.y1 <= outer.y1 + eps
}

fn overlaps(a: Rect, b: Rect) -> bool {
    let i = a.intersect(b);
    i.width() > 1e-9 && i.height() > 1e-9
}

#[test]
fn audio_then_subtitle_left_to_right() {
    let out = run(&[
        icons(
            OverlayCategory::SubtitleLanguage,
            Alignment::TopLeft,
            2,
            Orientation::Horizontal,
            &["srt.eng"],
        ),
        icons(
            OverlayCategory::AudioLanguage,
            Alignment::TopLeft,
            1,
            Orientation::Horizontal,
            &["eng", "fre"],
        ),
    ]);
    let flat: Vec<(String, Rect)> = out.iter().flat_map(icon_rects).collect();
    let names: Vec<&str> = flat.iter().map(|(n, _)| n.as_str()).collect();
    assert_eq!(names, ["eng", "fre", "srt.eng"]);

    // 8% of 1000 = 80px icons, 2% margin = 20px, 1% padding = 10px.
    assert_eq!(flat[0].1, Rect::new(20.0, 20.0, 100.0, 100.0));
    assert_eq!(flat[1].1, Rect::new(110.0, 20.0, 190.0, 100.0));
    assert_eq!(flat[2].1, Rect::new(200.0, 20.0, 280.0, 100.0));
}

#[test]
fn right_corners_mirror_the_running_offset() {
    let out = run(&[
        icons(
            OverlayCategory::Resolution,
            Alignment::TopRight,
            1,
            Orientation::Horizontal,
            &["4k"],
        ),
        icons(
            OverlayCategory::VideoCodec,
            Alignment::TopRight,
            2,
            Orientation::Horizontal,
            &["hevc"],
        ),
    ]);
    assert_eq!(out[0].category, OverlayCategory::Resolution);
    assert_eq!(out[0].bounds, Rect::new(900.0, 20.0, 980.0, 100.0));
    assert_eq!(out[1].bounds, Rect::new(810.0, 20.0, 890.0, 100.0));
}

#[test]
fn bottom_corners_sit_on_the_bottom_margin() {
    let out = run(&[icons(
        OverlayCategory::ParentalRating,
        Alignment::BottomLeft,
        1,
        Orientation::Horizontal,
        &["pg-13"],
    )]);
    assert_eq!(out[0].bounds, Rect::new(20.0, 1400.0, 100.0, 1480.0));
}

#[test]
fn vertical_lane_starts_after_horizontal_lane() {
    let out = run(&[
        icons(
            OverlayCategory::AudioCodec,
            Alignment::TopLeft,
            5,
            Orientation::Vertical,
            &["aac", "ac3"],
        ),
        icons(
            OverlayCategory::AudioLanguage,
            Alignment::TopLeft,
            9,
            Orientation::Horizontal,
            &["eng"],
        ),
    ]);
    // Horizontal first regardless of priority.
    assert_eq!(out[0].category, OverlayCategory::AudioLanguage);
    let column = &out[1];
    assert_eq!(column.bounds, Rect::new(20.0, 110.0, 100.0, 280.0));
    let rects = icon_rects(column);
    assert_eq!(rects[0].1.y0, 110.0);
    assert_eq!(rects[1].1.y0, 200.0);
}

#[test]
fn bottom_vertical_lane_stacks_upward() {
    let out = run(&[
        icons(
            OverlayCategory::Tag,
            Alignment::BottomRight,
            1,
            Orientation::Vertical,
            &["Favorite"],
        ),
        icons(
            OverlayCategory::AspectRatio,
            Alignment::BottomRight,
            2,
            Orientation::Vertical,
            &["16x9"],
        ),
    ]);
    assert_eq!(out[0].bounds, Rect::new(900.0, 1400.0, 980.0, 1480.0));
    assert_eq!(out[1].bounds, Rect::new(900.0, 1310.0, 980.0, 1390.0));
}

#[test]
fn wide_icons_keep_aspect_and_right_column_hugs_edge() {
    let wide = OverlayDescriptor::new(
        OverlayCategory::ChannelLayout,
        CategorySettings::at(Alignment::TopRight, 1, Orientation::Vertical),
        OverlayContent::Icons(vec![icon("5.1", 200, 100), icon("7.1", 100, 100)]),
    );
    let out = run(&[wide]);
    let rects = icon_rects(&out[0]);
    assert_eq!(rects[0].1.width(), 160.0);
    assert_eq!(rects[1].1.x1, 980.0);
    assert_eq!(out[0].bounds.width(), 160.0);
}

#[test]
fn disabled_and_empty_groups_are_dropped() {
    let out = run(&[
        icons(
            OverlayCategory::AudioLanguage,
            Alignment::Disabled,
            1,
            Orientation::Horizontal,
            &["eng"],
        ),
        icons(
            OverlayCategory::SubtitleLanguage,
            Alignment::TopLeft,
            1,
            Orientation::Horizontal,
            &[],
        ),
        OverlayDescriptor::new(
            OverlayCategory::AudioCodec,
            CategorySettings::at(Alignment::TopLeft, 1, Orientation::Horizontal),
            OverlayContent::Icons(vec![icon("broken", 0, 0)]),
        ),
    ]);
    assert!(out.is_empty());
}

#[test]
fn ties_break_by_category_order() {
    let out = run(&[
        icons(
            OverlayCategory::VideoCodec,
            Alignment::TopLeft,
            1,
            Orientation::Horizontal,
            &["hevc"],
        ),
        icons(
            OverlayCategory::AudioCodec,
            Alignment::TopLeft,
            1,
            Orientation::Horizontal,
            &["aac"],
        ),
    ]);
    assert_eq!(out[0].category, OverlayCategory::AudioCodec);
    assert!(out[0].bounds.x0 < out[1].bounds.x0);
}

#[test]
fn icon_height_is_clamped() {
    assert_eq!(icon_height(8.0, 1000), 80.0);
    assert_eq!(icon_height(0.1, 1000), MIN_ICON_PX);
    assert_eq!(icon_height(100.0, 4000), MAX_ICON_PX);
    // Never taller than a tiny poster.
    assert!(icon_height(50.0, 20) <= 20.0);
}

fn rating(badge: Option<IconRef>) -> OverlayDescriptor {
    OverlayDescriptor::new(
        OverlayCategory::Rating,
        CategorySettings::at(Alignment::BottomRight, 1, Orientation::Horizontal),
        OverlayContent::Rating { score: 7.84, badge },
    )
}

fn rating_item(g: &GroupPlacement) -> (String, Rect, Option<Rect>, Option<Rect>) {
    match &g.items[0] {
        PlacedItem::Rating {
            text,
            text_rect,
            badge,
            background,
            ..
        } => (text.clone(), *text_rect, badge.as_ref().map(|b| b.1), *background),
        other => panic!("expected rating, got {other:?}"),
    }
}

#[test]
fn rating_width_is_badge_pad_and_text() {
    let out = run(&[rating(Some(icon("imdb", 200, 100)))]);
    let (text, text_rect, badge, background) = rating_item(&out[0]);
    assert_eq!(text, "7.8");
    // 5% of 1000 = 50px font; line 60px; badge 120px wide; text 3 * 25 = 75px.
    assert_eq!(text_rect.width(), 75.0);
    assert_eq!(badge.map(|b| b.width()), Some(120.0));
    assert!(background.is_none());
    assert_eq!(out[0].bounds.width(), 120.0 + 10.0 + 75.0);
    assert_eq!(out[0].bounds.x1, 980.0);
}

#[test]
fn rating_background_adds_padding_and_circle_is_square() {
    let mut appearance = RatingAppearance {
        background: BackgroundShape::RoundedRect,
        ..RatingAppearance::default()
    };
    let plain = layout(
        POSTER,
        &[rating(None)],
        &LayoutSettings::default(),
        &RatingAppearance::default(),
        &mut FixedAdvance,
    );
    let boxed = layout(
        POSTER,
        &[rating(None)],
        &LayoutSettings::default(),
        &appearance,
        &mut FixedAdvance,
    );
    assert!(boxed[0].bounds.width() > plain[0].bounds.width());
    assert_eq!(rating_item(&boxed[0]).3, Some(boxed[0].bounds));

    appearance.background = BackgroundShape::Circle;
    let circle = layout(
        POSTER,
        &[rating(None)],
        &LayoutSettings::default(),
        &appearance,
        &mut FixedAdvance,
    );
    let b = circle[0].bounds;
    assert_eq!(b.width(), b.height());
    let (_, text_rect, _, _) = rating_item(&circle[0]);
    assert!(b.contains(text_rect.center()));
}

#[test]
fn layout_is_deterministic() {
    let groups = [
        icons(
            OverlayCategory::AudioLanguage,
            Alignment::TopLeft,
            1,
            Orientation::Horizontal,
            &["eng", "fre"],
        ),
        rating(None),
    ];
    let a: Vec<Rect> = run(&groups).iter().map(|g| g.bounds).collect();
    let b: Vec<Rect> = run(&groups).iter().map(|g| g.bounds).collect();
    assert_eq!(a, b);
}

fn arb_group() -> impl Strategy<Value = (usize, u32, bool, usize)> {
    (0usize..10, 1u32..6, any::<bool>(), 1usize..=20)
}

proptest! {
    #[test]
    fn same_corner_groups_never_intersect(
        corner in 0usize..4,
        specs in prop::collection::vec(arb_group(), 1..8),
    ) {
        let alignment = Alignment::CORNERS[corner];
        let groups: Vec<OverlayDescriptor> = specs
            .iter()
            .enumerate()
            .map(|(i, (cat, priority, vertical, count))| {
                let names: Vec<String> = (0..*count).map(|n| format!("i{i}_{n}")).collect();
                let refs: Vec<&str> = names.iter().map(String::as_str).collect();
                let orientation = if *vertical { Orientation::Vertical } else { Orientation::Horizontal };
                icons(OverlayCategory::ALL[*cat], alignment, *priority, orientation, &refs)
                    .with_icon_size_pct(2.0)
            })
            .collect();
        let out = layout(
            Canvas { width: 20_000, height: 20_000 },
            &groups,
            &LayoutSettings::default(),
            &RatingAppearance::default(),
            &mut FixedAdvance,
        );
        prop_assert_eq!(out.len(), groups.len());
        for (i, a) in out.iter().enumerate() {
            for b in &out[i + 1..] {
                prop_assert!(!overlaps(a.bounds, b.bounds), "{:?} overlaps {:?}", a.bounds, b.bounds);
            }
            for item in &a.items {
                let r = item.rect();
                prop_assert!(inside(a.bounds, r));
            }
        }
    }

    #[test]
    fn lower_priority_sits_nearer_the_corner(
        corner in 0usize..4,
        vertical in any::<bool>(),
        first in 1usize..6,
        second in 1usize..6,
    ) {
        let alignment = Alignment::CORNERS[corner];
        let orientation = if vertical { Orientation::Vertical } else { Orientation::Horizontal };
        let a = icons(OverlayCategory::AudioLanguage, alignment, 1, orientation,
            &(0..first).map(|n| format!("a{n}")).collect::<Vec<_>>().iter().map(String::as_str).collect::<Vec<_>>());
        let b = icons(OverlayCategory::Tag, alignment, 2, orientation,
            &(0..second).map(|n| format!("b{n}")).collect::<Vec<_>>().iter().map(String::as_str).collect::<Vec<_>>());
        let out = run(&[b, a]);
        let p1 = out.iter().find(|g| g.priority == 1).map(|g| g.bounds);
        let p2 = out.iter().find(|g| g.priority == 2).map(|g| g.bounds);
        let (p1, p2) = (p1.unwrap(), p2.unwrap());

        let nearer = match (vertical, alignment.is_right(), alignment.is_bottom()) {
            (false, false, _) => p1.x0 < p2.x0,
            (false, true, _) => p1.x1 > p2.x1,
            (true, _, false) => p1.y0 < p2.y0,
            (true, _, true) => p1.y1 > p2.y1,
        };
        prop_assert!(nearer, "p1 {:?} p2 {:?}", p1, p2);
    }
}
