//! SVG rasterization using resvg/usvg.

use std::path::Path;

use image::{Rgba, RgbaImage};
use resvg::tiny_skia::{Pixmap, Transform};
use resvg::usvg::{Options, Tree};

use super::{Rasterizer, composite_over, tint};
use crate::error::RenderError;

/// Renders SVG icons with resvg.
#[derive(Debug, Clone, Copy, Default)]
pub struct SvgRasterizer;

impl SvgRasterizer {
    pub fn new() -> Self {
        Self
    }

    /// Renders SVG markup so that its larger side is `size` pixels.
    ///
    /// Returns `None` for an unparsable document or a zero-sized target.
    pub fn render_str(&self, svg_data: &str, size: u32) -> Option<RgbaImage> {
        let tree = Tree::from_str(svg_data, &Options::default()).ok()?;
        render_tree(&tree, size)
    }
}

impl Rasterizer for SvgRasterizer {
    fn rasterize(
        &self,
        source: &Path,
        color: Rgba<u8>,
        canvas: u32,
        scale: f32,
    ) -> Result<RgbaImage, RenderError> {
        let data = std::fs::read(source).map_err(|e| RenderError::Read(source.to_path_buf(), e))?;
        let tree = Tree::from_data(&data, &Options::default()).map_err(|e| RenderError::Parse {
            path: source.to_path_buf(),
            message: e.to_string(),
        })?;

        let actual = (canvas as f32 * scale) as u32;
        let icon = render_tree(&tree, actual).ok_or(RenderError::Canvas(actual))?;

        let mut result = RgbaImage::new(canvas, canvas);
        let x = (canvas as i32 - icon.width() as i32) / 2;
        let y = (canvas as i32 - icon.height() as i32) / 2;
        composite_over(&mut result, &icon, x, y);
        tint(&mut result, color);

        Ok(result)
    }
}

/// Renders a parsed tree so it fits within `size`×`size`, keeping aspect ratio.
fn render_tree(tree: &Tree, size: u32) -> Option<RgbaImage> {
    let svg_size = tree.size();
    let scale = (size as f32) / svg_size.width().max(svg_size.height());
    let width = (svg_size.width() * scale).ceil() as u32;
    let height = (svg_size.height() * scale).ceil() as u32;

    let mut pixmap = Pixmap::new(width, height)?;
    let transform = Transform::from_scale(scale, scale);
    resvg::render(tree, transform, &mut pixmap.as_mut());

    Some(pixmap_to_rgba_image(&pixmap))
}

/// Converts a tiny_skia Pixmap to an image::RgbaImage.
fn pixmap_to_rgba_image(pixmap: &Pixmap) -> RgbaImage {
    let mut img = RgbaImage::new(pixmap.width(), pixmap.height());

    for (dst, pixel) in img.pixels_mut().zip(pixmap.pixels()) {
        // tiny_skia uses premultiplied alpha, we need to unpremultiply
        let c = pixel.demultiply();
        *dst = Rgba([c.red(), c.green(), c.blue(), c.alpha()]);
    }

    img
}
