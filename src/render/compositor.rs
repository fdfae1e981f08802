use std::io::Cursor;
use std::sync::Arc;

use kurbo::Shape;

use crate::config::{OutputFormat, OutputSettings};
use crate::foundation::core::{Affine, Canvas, Point, Rect};
use crate::foundation::error::{OverlayError, OverlayResult};
use crate::icons::decode::{IconImage, premultiply_rgba8_in_place};
use crate::layout::solver::{self, GroupPlacement, OverlayDescriptor, PlacedItem};
use crate::model::profile::{BackgroundShape, Profile, RatingAppearance, Rgba8};
use crate::render::text::{FontFace, TextBrushRgba8, TextLayoutEngine};

/// Decoded poster, premultiplied RGBA8.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Poster {
    pub width: u32,
    pub height: u32,
    pub rgba8_premul: Vec<u8>,
}

impl Poster {
    pub fn decode(bytes: &[u8]) -> OverlayResult<Self> {
        let rgba = image::load_from_memory(bytes)
            .map_err(|e| OverlayError::decode(format!("decode poster: {e}")))?
            .to_rgba8();
        let (width, height) = rgba.dimensions();
        let mut data = rgba.into_raw();
        premultiply_rgba8_in_place(&mut data);
        Self::from_premul(width, height, data)
    }

    pub fn from_premul(width: u32, height: u32, rgba8_premul: Vec<u8>) -> OverlayResult<Self> {
        if width == 0 || height == 0 {
            return Err(OverlayError::decode("poster has zero size"));
        }
        if u16::try_from(width).is_err() || u16::try_from(height).is_err() {
            return Err(OverlayError::decode(format!(
                "poster {width}x{height} exceeds the drawable size"
            )));
        }
        if rgba8_premul.len() != (width as usize) * (height as usize) * 4 {
            return Err(OverlayError::decode("poster byte length mismatch"));
        }
        Ok(Self {
            width,
            height,
            rgba8_premul,
        })
    }

    pub fn canvas(&self) -> Canvas {
        Canvas {
            width: self.width,
            height: self.height,
        }
    }

    /// Premultiplied pixel at `(x, y)`.
    pub fn pixel(&self, x: u32, y: u32) -> Option<[u8; 4]> {
        if x >= self.width || y >= self.height {
            return None;
        }
        let i = ((y as usize) * (self.width as usize) + x as usize) * 4;
        self.rgba8_premul
            .get(i..i + 4)
            .and_then(|p| p.try_into().ok())
    }
}

/// Composite result plus the placements that produced it.
#[derive(Clone, Debug)]
pub struct RenderedPoster {
    pub bytes: Vec<u8>,
    pub placements: Vec<GroupPlacement>,
}

/// Decode, lay out, draw and encode in one go. CPU-bound; run off the async workers.
#[tracing::instrument(level = "debug", skip_all, fields(groups = descriptors.len()))]
pub fn render_overlays(
    source: &[u8],
    descriptors: &[OverlayDescriptor],
    profile: &Profile,
    output: &OutputSettings,
    font: Option<&FontFace>,
) -> OverlayResult<RenderedPoster> {
    let poster = Poster::decode(source)?;
    let mut text = TextLayoutEngine::new(font);
    let placements = solver::layout(
        poster.canvas(),
        descriptors,
        &profile.layout,
        &profile.rating,
        &mut text,
    );
    let drawn = draw(&poster, &placements, &profile.rating, &mut text)?;
    let bytes = encode(&drawn, output)?;
    Ok(RenderedPoster { bytes, placements })
}

/// Draw placements into an overlay layer and blend it over the poster.
pub(crate) fn draw(
    poster: &Poster,
    placements: &[GroupPlacement],
    rating: &RatingAppearance,
    text: &mut TextLayoutEngine,
) -> OverlayResult<Poster> {
    if placements.is_empty() {
        return Ok(poster.clone());
    }
    let w = u16::try_from(poster.width).map_err(|_| OverlayError::render("width exceeds u16"))?;
    let h = u16::try_from(poster.height).map_err(|_| OverlayError::render("height exceeds u16"))?;

    let mut ctx = vello_cpu::RenderContext::new(w, h);
    ctx.set_blend_mode(vello_cpu::peniko::BlendMode::default());
    ctx.set_paint_transform(vello_cpu::kurbo::Affine::IDENTITY);

    for group in placements {
        for item in &group.items {
            match item {
                PlacedItem::Icon { icon, rect } => draw_icon(&mut ctx, &icon.image, *rect)?,
                PlacedItem::Rating {
                    text: label,
                    font_px,
                    text_rect,
                    badge,
                    background,
                } => {
                    if let Some(bg) = background {
                        draw_background(&mut ctx, rating, *bg);
                    }
                    if let Some((icon, r)) = badge {
                        draw_icon(&mut ctx, &icon.image, *r)?;
                    }
                    draw_score(&mut ctx, text, rating, label, *font_px, *text_rect)?;
                }
            }
        }
    }

    ctx.flush();
    let mut layer = vello_cpu::Pixmap::new(w, h);
    ctx.render_to_pixmap(&mut layer);

    let mut out = poster.rgba8_premul.clone();
    over_in_place(&mut out, layer.data_as_u8_slice())?;
    Poster::from_premul(poster.width, poster.height, out)
}

fn draw_icon(ctx: &mut vello_cpu::RenderContext, icon: &IconImage, rect: Rect) -> OverlayResult<()> {
    if icon.width == 0 || icon.height == 0 || rect.width() <= 0.0 || rect.height() <= 0.0 {
        return Ok(());
    }
    let paint = image_paint(icon)?;
    let tr = Affine::translate((rect.x0, rect.y0))
        * Affine::scale_non_uniform(
            rect.width() / f64::from(icon.width),
            rect.height() / f64::from(icon.height),
        );
    ctx.set_transform(affine_to_cpu(tr));
    ctx.set_paint(paint);
    ctx.fill_rect(&vello_cpu::kurbo::Rect::new(
        0.0,
        0.0,
        f64::from(icon.width),
        f64::from(icon.height),
    ));
    Ok(())
}

fn draw_background(ctx: &mut vello_cpu::RenderContext, rating: &RatingAppearance, bounds: Rect) {
    let c = rating.background_color;
    ctx.set_transform(vello_cpu::kurbo::Affine::IDENTITY);
    ctx.set_paint(color(c));
    let path = match rating.background {
        BackgroundShape::None => return,
        BackgroundShape::Circle => {
            let r = bounds.width().min(bounds.height()) / 2.0;
            kurbo::Circle::new(bounds.center(), r).to_path(0.1)
        }
        BackgroundShape::RoundedRect => {
            let radius = bounds.width().min(bounds.height()) * 0.25;
            kurbo::RoundedRect::from_rect(bounds, radius).to_path(0.1)
        }
    };
    ctx.fill_path(&bezpath_to_cpu(&path));
}

/// Outline stroke first (unless the background is opaque enough), then the fill.
fn draw_score(
    ctx: &mut vello_cpu::RenderContext,
    engine: &mut TextLayoutEngine,
    rating: &RatingAppearance,
    label: &str,
    font_px: f32,
    rect: Rect,
) -> OverlayResult<()> {
    if !engine.has_font() {
        tracing::warn!("no font available; rating badge drawn without text");
        return Ok(());
    }
    let layout = engine.layout_line(label, font_px, TextBrushRgba8::from(rating.text_color))?;
    let Some(font) = engine.font_data().cloned() else {
        return Ok(());
    };

    ctx.set_transform(affine_to_cpu(Affine::translate((rect.x0, rect.y0))));
    let outline = rating.needs_outline();
    let stroke_w = f64::from(font_px) * f64::from(rating.outline_width_pct) / 100.0;

    for line in layout.lines() {
        for item in line.items() {
            let parley::layout::PositionedLayoutItem::GlyphRun(run) = item else {
                continue;
            };
            let baseline = run.baseline();
            let mut x = run.offset();
            let glyphs: Vec<vello_cpu::Glyph> = run
                .glyphs()
                .map(|g| {
                    let glyph = vello_cpu::Glyph {
                        id: g.id,
                        x: x + g.x,
                        y: baseline - g.y,
                    };
                    x += g.advance;
                    glyph
                })
                .collect();
            let size = run.run().font_size();

            if outline && stroke_w > 0.0 {
                ctx.set_paint(color(rating.outline_color));
                ctx.set_stroke(vello_cpu::kurbo::Stroke::new(stroke_w));
                ctx.glyph_run(&font)
                    .font_size(size)
                    .stroke_glyphs(glyphs.clone().into_iter());
            }
            let brush = run.style().brush;
            ctx.set_paint(vello_cpu::peniko::Color::from_rgba8(
                brush.r, brush.g, brush.b, brush.a,
            ));
            ctx.glyph_run(&font)
                .font_size(size)
                .fill_glyphs(glyphs.into_iter());
        }
    }
    Ok(())
}

fn color(c: Rgba8) -> vello_cpu::peniko::Color {
    vello_cpu::peniko::Color::from_rgba8(c.r, c.g, c.b, c.a)
}

fn image_paint(icon: &IconImage) -> OverlayResult<vello_cpu::Image> {
    let pixmap = pixmap_from_premul_bytes(&icon.rgba8_premul, icon.width, icon.height)?;
    Ok(vello_cpu::Image {
        image: vello_cpu::ImageSource::Pixmap(Arc::new(pixmap)),
        sampler: vello_cpu::peniko::ImageSampler::default(),
    })
}

fn pixmap_from_premul_bytes(bytes: &[u8], width: u32, height: u32) -> OverlayResult<vello_cpu::Pixmap> {
    let w: u16 = width
        .try_into()
        .map_err(|_| OverlayError::render("icon width exceeds u16"))?;
    let h: u16 = height
        .try_into()
        .map_err(|_| OverlayError::render("icon height exceeds u16"))?;
    if bytes.len() != (width as usize) * (height as usize) * 4 {
        return Err(OverlayError::render("icon byte len mismatch"));
    }
    let pixels = bytes
        .chunks_exact(4)
        .map(|px| vello_cpu::peniko::color::PremulRgba8::from_u8_array([px[0], px[1], px[2], px[3]]))
        .collect::<Vec<_>>();
    Ok(vello_cpu::Pixmap::from_parts_with_opacity(pixels, w, h, true))
}

fn affine_to_cpu(a: Affine) -> vello_cpu::kurbo::Affine {
    vello_cpu::kurbo::Affine::new(a.as_coeffs())
}

fn bezpath_to_cpu(path: &kurbo::BezPath) -> vello_cpu::kurbo::BezPath {
    use kurbo::PathEl;

    let pt = |p: Point| vello_cpu::kurbo::Point::new(p.x, p.y);
    let mut out = vello_cpu::kurbo::BezPath::new();
    for &el in path.elements() {
        match el {
            PathEl::MoveTo(p) => out.move_to(pt(p)),
            PathEl::LineTo(p) => out.line_to(pt(p)),
            PathEl::QuadTo(p1, p2) => out.quad_to(pt(p1), pt(p2)),
            PathEl::CurveTo(p1, p2, p3) => out.curve_to(pt(p1), pt(p2), pt(p3)),
            PathEl::ClosePath => out.close_path(),
        }
    }
    out
}

/// Source-over of premultiplied `src` onto premultiplied `dst`.
fn over(dst: [u8; 4], src: [u8; 4]) -> [u8; 4] {
    if src[3] == 0 {
        return dst;
    }
    let inv = 255u16 - u16::from(src[3]);
    let mut out = [0u8; 4];
    for i in 0..4 {
        out[i] = src[i].saturating_add(mul_div255(u16::from(dst[i]), inv));
    }
    out
}

pub(crate) fn over_in_place(dst: &mut [u8], src: &[u8]) -> OverlayResult<()> {
    if dst.len() != src.len() || !dst.len().is_multiple_of(4) {
        return Err(OverlayError::render(
            "over_in_place expects equal-length rgba8 buffers",
        ));
    }
    for (d, s) in dst.chunks_exact_mut(4).zip(src.chunks_exact(4)) {
        let out = over([d[0], d[1], d[2], d[3]], [s[0], s[1], s[2], s[3]]);
        d.copy_from_slice(&out);
    }
    Ok(())
}

fn mul_div255(x: u16, y: u16) -> u8 {
    (((u32::from(x) * u32::from(y)) + 127) / 255) as u8
}

fn unpremultiply_rgba8_in_place(rgba: &mut [u8]) {
    for px in rgba.chunks_exact_mut(4) {
        let a = u16::from(px[3]);
        if a == 0 || a == 255 {
            continue;
        }
        for c in &mut px[..3] {
            *c = ((u16::from(*c) * 255 + a / 2) / a).min(255) as u8;
        }
    }
}

/// Encode in the configured format. JPEG drops alpha, which flattens onto black.
pub fn encode(poster: &Poster, output: &OutputSettings) -> OverlayResult<Vec<u8>> {
    let mut buf = Vec::new();
    match output.format {
        OutputFormat::Jpeg => {
            let rgb: Vec<u8> = poster
                .rgba8_premul
                .chunks_exact(4)
                .flat_map(|px| [px[0], px[1], px[2]])
                .collect();
            let img = image::RgbImage::from_raw(poster.width, poster.height, rgb)
                .ok_or_else(|| OverlayError::render("rgb buffer size mismatch"))?;
            let quality = output.jpeg_quality.clamp(1, 100);
            image::codecs::jpeg::JpegEncoder::new_with_quality(&mut buf, quality)
                .encode_image(&img)
                .map_err(|e| OverlayError::render(format!("encode jpeg: {e}")))?;
        }
        OutputFormat::Png => {
            let mut rgba = poster.rgba8_premul.clone();
            unpremultiply_rgba8_in_place(&mut rgba);
            let img = image::RgbaImage::from_raw(poster.width, poster.height, rgba)
                .ok_or_else(|| OverlayError::render("rgba buffer size mismatch"))?;
            img.write_to(&mut Cursor::new(&mut buf), image::ImageFormat::Png)
                .map_err(|e| OverlayError::render(format!("encode png: {e}")))?;
        }
    }
    Ok(buf)
}

#[cfg(test)]
#[path = "../../tests/unit/render/compositor.rs"]
mod tests;
