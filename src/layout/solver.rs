use std::sync::Arc;

use crate::foundation::core::{Canvas, Rect, Size, Vec2};
use crate::icons::decode::IconImage;
use crate::model::profile::{
    Alignment, BackgroundShape, CategorySettings, LayoutSettings, OverlayCategory, Orientation,
    RatingAppearance,
};

/// Smallest icon height drawn, in pixels.
pub const MIN_ICON_PX: f64 = 12.0;
/// Largest icon height drawn, in pixels.
pub const MAX_ICON_PX: f64 = 400.0;

/// A decoded icon and the name it was looked up by.
#[derive(Clone, Debug)]
pub struct IconRef {
    pub name: String,
    pub image: Arc<IconImage>,
}

impl IconRef {
    pub fn new(name: impl Into<String>, image: Arc<IconImage>) -> Self {
        Self {
            name: name.into(),
            image,
        }
    }
}

#[derive(Clone, Debug)]
pub enum OverlayContent {
    /// Drawn in order; callers pass them sorted.
    Icons(Vec<IconRef>),
    Rating {
        score: f32,
        badge: Option<IconRef>,
    },
}

impl OverlayContent {
    pub fn is_empty(&self) -> bool {
        matches!(self, Self::Icons(v) if v.is_empty())
    }
}

/// One category's resolved content plus where the profile wants it.
#[derive(Clone, Debug)]
pub struct OverlayDescriptor {
    pub category: OverlayCategory,
    pub alignment: Alignment,
    pub priority: u32,
    pub orientation: Orientation,
    pub icon_size_pct: f32,
    pub content: OverlayContent,
}

impl OverlayDescriptor {
    pub fn new(category: OverlayCategory, settings: CategorySettings, content: OverlayContent) -> Self {
        Self {
            category,
            alignment: settings.alignment,
            priority: settings.priority,
            orientation: settings.orientation,
            icon_size_pct: settings.icon_size_pct,
            content,
        }
    }

    /// Copy with a different corner.
    pub fn with_alignment(mut self, alignment: Alignment) -> Self {
        self.alignment = alignment;
        self
    }

    pub fn with_priority(mut self, priority: u32) -> Self {
        self.priority = priority;
        self
    }

    pub fn with_orientation(mut self, orientation: Orientation) -> Self {
        self.orientation = orientation;
        self
    }

    pub fn with_icon_size_pct(mut self, pct: f32) -> Self {
        self.icon_size_pct = pct;
        self
    }
}

/// Measures single-line text. Implemented by the font engine; tests use fixed advances.
pub trait TextMeasure {
    /// Advance width and line height of `text` at `font_px`.
    fn measure(&mut self, text: &str, font_px: f32) -> Size;
}

#[derive(Clone, Debug)]
pub enum PlacedItem {
    Icon {
        icon: IconRef,
        rect: Rect,
    },
    Rating {
        text: String,
        font_px: f32,
        /// Box the text line occupies; baseline handling is the renderer's.
        text_rect: Rect,
        badge: Option<(IconRef, Rect)>,
        /// Background shape bounds, when one is drawn.
        background: Option<Rect>,
    },
}

impl PlacedItem {
    pub fn rect(&self) -> Rect {
        match self {
            Self::Icon { rect, .. } => *rect,
            Self::Rating {
                text_rect,
                badge,
                background,
                ..
            } => {
                let r = background.unwrap_or(*text_rect);
                badge.as_ref().map_or(r, |(_, b)| r.union(*b))
            }
        }
    }
}

/// Final position of one category's group.
#[derive(Clone, Debug)]
pub struct GroupPlacement {
    pub category: OverlayCategory,
    pub alignment: Alignment,
    pub orientation: Orientation,
    pub priority: u32,
    pub bounds: Rect,
    pub items: Vec<PlacedItem>,
}

/// A group measured but not yet positioned. Item rects are relative to the group origin.
struct Measured {
    category: OverlayCategory,
    alignment: Alignment,
    orientation: Orientation,
    priority: u32,
    size: Size,
    items: Vec<PlacedItem>,
}

/// Spacing resolved to pixels for one canvas.
#[derive(Clone, Copy, Debug)]
struct Metrics {
    canvas: Size,
    shorter: f64,
    margin: f64,
    pad: f64,
}

impl Metrics {
    fn new(canvas: Canvas, settings: &LayoutSettings) -> Self {
        let shorter = f64::from(canvas.shorter_side());
        Self {
            canvas: canvas.size(),
            shorter,
            margin: pct_of(settings.margin_pct, shorter),
            pad: pct_of(settings.padding_pct, shorter),
        }
    }
}

fn pct_of(pct: f32, of: f64) -> f64 {
    (f64::from(pct) * of / 100.0).max(0.0)
}

/// Icon height for a category's size percentage on a poster with this shorter side.
pub fn icon_height(icon_size_pct: f32, shorter_side: u32) -> f64 {
    let shorter = f64::from(shorter_side);
    let upper = MAX_ICON_PX.min(shorter.max(MIN_ICON_PX));
    pct_of(icon_size_pct, shorter).clamp(MIN_ICON_PX, upper)
}

/// Place every non-empty, enabled group into its corner.
///
/// Pure: the same inputs give the same rects. Output is ordered by corner, then lane
/// (horizontal before vertical), then priority.
pub fn layout(
    canvas: Canvas,
    groups: &[OverlayDescriptor],
    settings: &LayoutSettings,
    rating: &RatingAppearance,
    text: &mut dyn TextMeasure,
) -> Vec<GroupPlacement> {
    let m = Metrics::new(canvas, settings);
    let mut out = Vec::new();
    for corner in Alignment::CORNERS {
        let mut horizontal = Vec::new();
        let mut vertical = Vec::new();
        for g in groups.iter().filter(|g| g.alignment == corner) {
            let Some(measured) = measure_group(g, &m, canvas, rating, text) else {
                continue;
            };
            match g.orientation {
                Orientation::Horizontal => horizontal.push(measured),
                Orientation::Vertical => vertical.push(measured),
            }
        }
        horizontal.sort_by_key(|g| (g.priority, g.category));
        vertical.sort_by_key(|g| (g.priority, g.category));

        let lane_h = place_horizontal_lane(corner, horizontal, &m, &mut out);
        let start = if lane_h > 0.0 { lane_h + m.pad } else { 0.0 };
        place_vertical_lane(corner, vertical, start, &m, &mut out);
    }
    out
}

/// Returns the lane height (tallest group), 0 when empty.
fn place_horizontal_lane(
    corner: Alignment,
    groups: Vec<Measured>,
    m: &Metrics,
    out: &mut Vec<GroupPlacement>,
) -> f64 {
    let mut offset = 0.0;
    let mut lane_h = 0.0f64;
    for g in groups {
        let x = if corner.is_right() {
            m.canvas.width - m.margin - offset - g.size.width
        } else {
            m.margin + offset
        };
        let y = if corner.is_bottom() {
            m.canvas.height - m.margin - g.size.height
        } else {
            m.margin
        };
        offset += g.size.width + m.pad;
        lane_h = lane_h.max(g.size.height);
        out.push(finish(g, x, y));
    }
    lane_h
}

fn place_vertical_lane(
    corner: Alignment,
    groups: Vec<Measured>,
    start: f64,
    m: &Metrics,
    out: &mut Vec<GroupPlacement>,
) {
    let mut offset = start;
    for mut g in groups {
        let x = if corner.is_right() {
            m.canvas.width - m.margin - g.size.width
        } else {
            m.margin
        };
        let y = if corner.is_bottom() {
            m.canvas.height - m.margin - offset - g.size.height
        } else {
            m.margin + offset
        };
        offset += g.size.height + m.pad;
        if corner.is_right() {
            align_items_right(&mut g);
        }
        out.push(finish(g, x, y));
    }
}

/// Narrow icons in a right-corner column hug the poster edge.
fn align_items_right(g: &mut Measured) {
    let w = g.size.width;
    for item in &mut g.items {
        if let PlacedItem::Icon { rect, .. } = item {
            let dx = w - rect.width();
            *rect = *rect + Vec2::new(dx, 0.0);
        }
    }
}

fn finish(g: Measured, x: f64, y: f64) -> GroupPlacement {
    let shift = Vec2::new(x, y);
    let items = g
        .items
        .into_iter()
        .map(|item| translate(item, shift))
        .collect();
    GroupPlacement {
        category: g.category,
        alignment: g.alignment,
        orientation: g.orientation,
        priority: g.priority,
        bounds: Rect::from_origin_size((x, y), g.size),
        items,
    }
}

fn translate(item: PlacedItem, by: Vec2) -> PlacedItem {
    match item {
        PlacedItem::Icon { icon, rect } => PlacedItem::Icon {
            icon,
            rect: rect + by,
        },
        PlacedItem::Rating {
            text,
            font_px,
            text_rect,
            badge,
            background,
        } => PlacedItem::Rating {
            text,
            font_px,
            text_rect: text_rect + by,
            badge: badge.map(|(i, r)| (i, r + by)),
            background: background.map(|r| r + by),
        },
    }
}

fn measure_group(
    g: &OverlayDescriptor,
    m: &Metrics,
    canvas: Canvas,
    rating: &RatingAppearance,
    text: &mut dyn TextMeasure,
) -> Option<Measured> {
    if !g.alignment.is_enabled() {
        return None;
    }
    let (size, items) = match &g.content {
        OverlayContent::Icons(icons) => {
            let h = icon_height(g.icon_size_pct, canvas.shorter_side());
            measure_icons(icons, h, g.orientation, m.pad)?
        }
        OverlayContent::Rating { score, badge } => {
            measure_rating(*score, badge.as_ref(), m, rating, text)
        }
    };
    Some(Measured {
        category: g.category,
        alignment: g.alignment,
        orientation: g.orientation,
        priority: g.priority,
        size,
        items,
    })
}

fn measure_icons(
    icons: &[IconRef],
    h: f64,
    orientation: Orientation,
    pad: f64,
) -> Option<(Size, Vec<PlacedItem>)> {
    let mut items = Vec::with_capacity(icons.len());
    let mut cursor = 0.0;
    let mut cross = 0.0f64;
    for icon in icons {
        if icon.image.width == 0 || icon.image.height == 0 {
            continue;
        }
        let w = h * icon.image.aspect();
        let rect = match orientation {
            Orientation::Horizontal => Rect::new(cursor, 0.0, cursor + w, h),
            Orientation::Vertical => Rect::new(0.0, cursor, w, cursor + h),
        };
        cursor += match orientation {
            Orientation::Horizontal => w + pad,
            Orientation::Vertical => h + pad,
        };
        cross = cross.max(match orientation {
            Orientation::Horizontal => h,
            Orientation::Vertical => w,
        });
        items.push(PlacedItem::Icon {
            icon: icon.clone(),
            rect,
        });
    }
    if items.is_empty() {
        return None;
    }
    let main = cursor - pad;
    let size = match orientation {
        Orientation::Horizontal => Size::new(main, cross),
        Orientation::Vertical => Size::new(cross, main),
    };
    Some((size, items))
}

/// `[bg pad] [badge] [pad] text [bg pad]`, vertically centred; circles get a square box.
fn measure_rating(
    score: f32,
    badge: Option<&IconRef>,
    m: &Metrics,
    rating: &RatingAppearance,
    text: &mut dyn TextMeasure,
) -> (Size, Vec<PlacedItem>) {
    let font_px = pct_of(rating.font_size_pct, m.shorter).max(MIN_ICON_PX) as f32;
    let label = rating.format_score(score);
    let measured = text.measure(&label, font_px);
    let (text_w, line_h) = (measured.width.max(0.0), measured.height.max(f64::from(font_px)));

    let bg_pad = if rating.has_background() { m.pad.max(line_h * 0.25) } else { 0.0 };
    let badge_w = badge
        .filter(|b| b.image.width > 0 && b.image.height > 0)
        .map(|b| line_h * b.image.aspect());
    let inner_w = badge_w.map_or(0.0, |w| w + m.pad) + text_w;
    let mut size = Size::new(inner_w + 2.0 * bg_pad, line_h + 2.0 * bg_pad);
    if rating.background == BackgroundShape::Circle && rating.has_background() {
        let side = size.width.max(size.height);
        size = Size::new(side, side);
    }

    let x0 = (size.width - inner_w) / 2.0;
    let y0 = (size.height - line_h) / 2.0;
    let badge_placed = match (badge, badge_w) {
        (Some(b), Some(w)) => Some((b.clone(), Rect::new(x0, y0, x0 + w, y0 + line_h))),
        _ => None,
    };
    let text_x = x0 + badge_w.map_or(0.0, |w| w + m.pad);
    let item = PlacedItem::Rating {
        text: label,
        font_px,
        text_rect: Rect::new(text_x, y0, text_x + text_w, y0 + line_h),
        badge: badge_placed,
        background: rating
            .has_background()
            .then(|| Rect::from_origin_size((0.0, 0.0), size)),
    };
    (size, vec![item])
}

#[cfg(test)]
#[path = "../../tests/unit/layout/solver.rs"]
mod tests;
