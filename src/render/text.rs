use std::path::Path;
use std::sync::Arc;

use crate::foundation::core::Size;
use crate::foundation::error::{OverlayError, OverlayResult};
use crate::layout::solver::TextMeasure;
use crate::model::profile::Rgba8;

/// Font file bytes plus the face index inside a collection.
#[derive(Clone)]
pub struct FontFace {
    pub bytes: Arc<Vec<u8>>,
    pub index: u32,
}

impl std::fmt::Debug for FontFace {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FontFace")
            .field("bytes", &self.bytes.len())
            .field("index", &self.index)
            .finish()
    }
}

impl FontFace {
    pub fn from_file(path: &Path) -> OverlayResult<Self> {
        let bytes = std::fs::read(path).map_err(|e| OverlayError::io(path, e))?;
        Ok(Self {
            bytes: Arc::new(bytes),
            index: 0,
        })
    }
}

/// Face for the rating badge: the configured file if it loads, else a bold system sans-serif.
pub fn discover_font(configured: Option<&Path>) -> Option<FontFace> {
    if let Some(path) = configured {
        match FontFace::from_file(path) {
            Ok(face) => return Some(face),
            Err(e) => tracing::warn!(error = %e, "rating font unreadable, falling back to system fonts"),
        }
    }

    let mut db = usvg::fontdb::Database::new();
    db.load_system_fonts();
    let families = [
        usvg::fontdb::Family::SansSerif,
        usvg::fontdb::Family::Serif,
        usvg::fontdb::Family::Monospace,
    ];
    let query = usvg::fontdb::Query {
        families: &families,
        weight: usvg::fontdb::Weight::BOLD,
        ..Default::default()
    };
    let id = db.query(&query).or_else(|| db.faces().next().map(|f| f.id))?;
    let face = db.with_face_data(id, |data, index| FontFace {
        bytes: Arc::new(data.to_vec()),
        index,
    });
    if face.is_none() {
        tracing::warn!("no usable system font; rating text will not be drawn");
    }
    face
}

/// RGBA8 brush colour carried through Parley layouts.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub(crate) struct TextBrushRgba8 {
    pub(crate) r: u8,
    pub(crate) g: u8,
    pub(crate) b: u8,
    pub(crate) a: u8,
}

impl From<Rgba8> for TextBrushRgba8 {
    fn from(c: Rgba8) -> Self {
        Self {
            r: c.r,
            g: c.g,
            b: c.b,
            a: c.a,
        }
    }
}

struct LoadedFace {
    family: String,
    data: vello_cpu::peniko::FontData,
}

/// Parley contexts bound to one face. Not `Sync`; build one per render.
pub(crate) struct TextLayoutEngine {
    font_ctx: parley::FontContext,
    layout_ctx: parley::LayoutContext<TextBrushRgba8>,
    face: Option<LoadedFace>,
}

impl TextLayoutEngine {
    pub(crate) fn new(face: Option<&FontFace>) -> Self {
        let mut font_ctx = parley::FontContext::default();
        let face = face.and_then(|f| {
            let families = font_ctx
                .collection
                .register_fonts(parley::fontique::Blob::from(f.bytes.to_vec()), None);
            let family_id = families.first().map(|(id, _)| *id)?;
            let family = font_ctx.collection.family_name(family_id)?.to_string();
            Some(LoadedFace {
                family,
                data: vello_cpu::peniko::FontData::new(
                    vello_cpu::peniko::Blob::from(f.bytes.to_vec()),
                    f.index,
                ),
            })
        });
        Self {
            font_ctx,
            layout_ctx: parley::LayoutContext::new(),
            face,
        }
    }

    pub(crate) fn has_font(&self) -> bool {
        self.face.is_some()
    }

    pub(crate) fn font_data(&self) -> Option<&vello_cpu::peniko::FontData> {
        self.face.as_ref().map(|f| &f.data)
    }

    /// Shape one unwrapped line.
    pub(crate) fn layout_line(
        &mut self,
        text: &str,
        size_px: f32,
        brush: TextBrushRgba8,
    ) -> OverlayResult<parley::Layout<TextBrushRgba8>> {
        if !size_px.is_finite() || size_px <= 0.0 {
            return Err(OverlayError::validation("text size must be finite and > 0"));
        }
        let family = self
            .face
            .as_ref()
            .map(|f| f.family.clone())
            .ok_or_else(|| OverlayError::render("no font loaded"))?;

        let mut builder = self
            .layout_ctx
            .ranged_builder(&mut self.font_ctx, text, 1.0, true);
        builder.push_default(parley::style::StyleProperty::FontStack(
            parley::style::FontStack::Source(std::borrow::Cow::Owned(family)),
        ));
        builder.push_default(parley::style::StyleProperty::FontSize(size_px));
        builder.push_default(parley::style::StyleProperty::Brush(brush));

        let mut layout: parley::Layout<TextBrushRgba8> = builder.build(text);
        layout.break_all_lines(None);
        Ok(layout)
    }
}

/// Width and height of a laid-out block, summed over lines.
pub(crate) fn layout_extent(layout: &parley::Layout<TextBrushRgba8>) -> Size {
    let mut w = 0.0f64;
    let mut h = 0.0f64;
    for line in layout.lines() {
        let m = line.metrics();
        w = w.max(f64::from(m.advance));
        h += f64::from(m.ascent + m.descent + m.leading);
    }
    Size::new(w, h)
}

/// Rough metrics when no face is available, so layout still reserves space.
pub(crate) fn approximate_extent(text: &str, font_px: f32) -> Size {
    let px = f64::from(font_px);
    Size::new(text.chars().count() as f64 * px * 0.55, px * 1.2)
}

impl TextMeasure for TextLayoutEngine {
    fn measure(&mut self, text: &str, font_px: f32) -> Size {
        if !self.has_font() {
            return approximate_extent(text, font_px);
        }
        match self.layout_line(text, font_px, TextBrushRgba8::default()) {
            Ok(layout) => layout_extent(&layout),
            Err(e) => {
                tracing::debug!(error = %e, "text measure fell back to approximation");
                approximate_extent(text, font_px)
            }
        }
    }
}

#[cfg(test)]
#[path = "../../tests/unit/render/text.rs"]
mod tests;
