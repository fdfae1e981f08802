use std::path::Path;
use std::sync::Arc;

use anyhow::Context;

use crate::foundation::error::{OverlayError, OverlayResult};

/// Files smaller than this are treated as broken placeholders, not icons.
pub const MIN_ICON_BYTES: u64 = 32;

/// Height SVG icons are rasterized at; they are scaled down at draw time.
pub const SVG_RASTER_HEIGHT: u32 = 512;

const MAX_DIM: u32 = 16_384;

/// Decoded raster in premultiplied RGBA8.
#[derive(Clone, Debug)]
pub struct IconImage {
    pub width: u32,
    pub height: u32,
    /// Row-major premultiplied RGBA8.
    pub rgba8_premul: Arc<Vec<u8>>,
}

impl IconImage {
    /// Width over height; 1.0 for degenerate images.
    pub fn aspect(&self) -> f64 {
        if self.height == 0 {
            return 1.0;
        }
        f64::from(self.width) / f64::from(self.height)
    }
}

/// Read and decode one icon file; SVG is rasterized.
pub fn decode_icon_file(path: &Path) -> OverlayResult<IconImage> {
    let bytes = std::fs::read(path).map_err(|e| OverlayError::io(path, e))?;
    if (bytes.len() as u64) < MIN_ICON_BYTES {
        return Err(OverlayError::decode(format!(
            "'{}' is {} bytes, below the {MIN_ICON_BYTES}-byte minimum",
            path.display(),
            bytes.len()
        )));
    }
    let is_svg = path
        .extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e.eq_ignore_ascii_case("svg"));
    if is_svg {
        rasterize_svg(&bytes, SVG_RASTER_HEIGHT)
    } else {
        decode_raster(&bytes)
    }
}

pub fn decode_raster(bytes: &[u8]) -> OverlayResult<IconImage> {
    let dyn_img = image::load_from_memory(bytes)
        .map_err(|e| OverlayError::decode(format!("decode image from memory: {e}")))?;
    let rgba = dyn_img.to_rgba8();
    let (width, height) = rgba.dimensions();
    if width == 0 || height == 0 {
        return Err(OverlayError::decode("image has zero size"));
    }

    let mut rgba8_premul = rgba.into_raw();
    premultiply_rgba8_in_place(&mut rgba8_premul);

    Ok(IconImage {
        width,
        height,
        rgba8_premul: Arc::new(rgba8_premul),
    })
}

/// Parse an SVG document and rasterize it at `target_height`, keeping its aspect ratio.
pub fn rasterize_svg(bytes: &[u8], target_height: u32) -> OverlayResult<IconImage> {
    let opts = usvg::Options::default();
    let tree = usvg::Tree::from_data(bytes, &opts)
        .context("parse svg tree")
        .map_err(|e| OverlayError::decode(format!("{e:#}")))?;

    let size = tree.size();
    if !size.width().is_finite() || size.width() <= 0.0 || size.height() <= 0.0 {
        return Err(OverlayError::decode("svg has invalid width/height"));
    }
    let scale = target_height as f32 / size.height();
    let width = ((size.width() * scale).ceil() as u32).clamp(1, MAX_DIM);
    let height = target_height.clamp(1, MAX_DIM);

    let mut pixmap = resvg::tiny_skia::Pixmap::new(width, height)
        .ok_or_else(|| OverlayError::decode("failed to allocate svg pixmap"))?;
    let xform = resvg::tiny_skia::Transform::from_scale(
        width as f32 / size.width(),
        height as f32 / size.height(),
    );
    resvg::render(&tree, xform, &mut pixmap.as_mut());

    // tiny-skia pixmaps are already premultiplied RGBA8.
    Ok(IconImage {
        width,
        height,
        rgba8_premul: Arc::new(pixmap.data().to_vec()),
    })
}

pub(crate) fn premultiply_rgba8_in_place(rgba: &mut [u8]) {
    for px in rgba.chunks_exact_mut(4) {
        let a = px[3] as u16;
        if a == 0 {
            px[0] = 0;
            px[1] = 0;
            px[2] = 0;
            continue;
        }
        px[0] = ((px[0] as u16 * a + 127) / 255) as u8;
        px[1] = ((px[1] as u16 * a + 127) / 255) as u8;
        px[2] = ((px[2] as u16 * a + 127) / 255) as u8;
    }
}

#[cfg(test)]
#[path = "../../tests/unit/icons/decode.rs"]
mod tests;
