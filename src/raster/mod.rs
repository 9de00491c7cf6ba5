//! Rasterization of vector icons and RGBA compositing helpers.
//!
//! The rest of the crate only sees the [`Rasterizer`] trait: a source file,
//! a tint and a canvas size go in, a centered, tinted raster on a
//! transparent canvas comes out. [`SvgRasterizer`] is the `resvg`-backed
//! implementation used in production.

pub mod svg;

pub use svg::SvgRasterizer;

use std::path::Path;

use image::{Rgba, RgbaImage};

use crate::error::RenderError;

// ============================================================================
// Rasterizer
// ============================================================================

/// Converts a vector icon into a raster.
pub trait Rasterizer: Send + Sync {
    /// Renders `source` onto a transparent `canvas`×`canvas` raster.
    ///
    /// The artwork is scaled to `canvas * scale` pixels, centered, and every
    /// visible pixel takes the colour of `tint` while keeping its coverage
    /// as alpha.
    fn rasterize(
        &self,
        source: &Path,
        tint: Rgba<u8>,
        canvas: u32,
        scale: f32,
    ) -> Result<RgbaImage, RenderError>;
}

/// Recolours every non-transparent pixel, keeping alpha.
pub fn tint(image: &mut RgbaImage, color: Rgba<u8>) {
    for pixel in image.pixels_mut() {
        if pixel[3] != 0 {
            *pixel = Rgba([color[0], color[1], color[2], pixel[3]]);
        }
    }
}

// ============================================================================
// Compositing
// ============================================================================

/// Composites a source image onto a destination image at the specified position.
///
/// Uses standard alpha blending (source over destination).
pub fn composite_over(dest: &mut RgbaImage, src: &RgbaImage, x: i32, y: i32) {
    let dest_width = dest.width() as i32;
    let dest_height = dest.height() as i32;

    for (sx, sy, src_pixel) in src.enumerate_pixels() {
        let dx = x + sx as i32;
        let dy = y + sy as i32;

        if dx < 0 || dy < 0 || dx >= dest_width || dy >= dest_height {
            continue;
        }
        if src_pixel[3] == 0 {
            continue;
        }

        let dst_pixel = dest.get_pixel_mut(dx as u32, dy as u32);
        *dst_pixel = alpha_blend(*src_pixel, *dst_pixel);
    }
}

/// Alpha blends two RGBA pixels (source over destination).
fn alpha_blend(src: Rgba<u8>, dst: Rgba<u8>) -> Rgba<u8> {
    let sa = src[3] as f32 / 255.0;
    let da = dst[3] as f32 / 255.0;

    let out_a = sa + da * (1.0 - sa);

    if out_a == 0.0 {
        return Rgba([0, 0, 0, 0]);
    }

    let blend = |s: u8, d: u8| -> u8 {
        let sf = s as f32 / 255.0;
        let df = d as f32 / 255.0;
        let out = (sf * sa + df * da * (1.0 - sa)) / out_a;
        (out * 255.0).round() as u8
    };

    Rgba([
        blend(src[0], dst[0]),
        blend(src[1], dst[1]),
        blend(src[2], dst[2]),
        (out_a * 255.0).round() as u8,
    ])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn composite_simple() {
        let mut dest = RgbaImage::from_pixel(10, 10, Rgba([255, 0, 0, 255]));
        let src = RgbaImage::from_pixel(4, 4, Rgba([0, 0, 255, 255]));

        composite_over(&mut dest, &src, 3, 3);

        assert_eq!(dest.get_pixel(5, 5).0, [0, 0, 255, 255]);
        assert_eq!(dest.get_pixel(0, 0).0, [255, 0, 0, 255]);
    }

    #[test]
    fn composite_onto_transparent_keeps_source() {
        let mut dest = RgbaImage::new(4, 4);
        let src = RgbaImage::from_pixel(4, 4, Rgba([10, 20, 30, 128]));

        composite_over(&mut dest, &src, 0, 0);

        assert_eq!(dest.get_pixel(1, 1).0, [10, 20, 30, 128]);
    }

    #[test]
    fn composite_clips_to_destination() {
        let mut dest = RgbaImage::new(4, 4);
        let src = RgbaImage::from_pixel(4, 4, Rgba([0, 255, 0, 255]));

        composite_over(&mut dest, &src, -2, 2);

        assert_eq!(dest.get_pixel(1, 3).0, [0, 255, 0, 255]);
        assert_eq!(dest.get_pixel(3, 3).0, [0, 0, 0, 0]);
        assert_eq!(dest.get_pixel(0, 0).0, [0, 0, 0, 0]);
    }

    #[test]
    fn tint_keeps_alpha_and_skips_transparent() {
        let mut img = RgbaImage::new(2, 1);
        img.put_pixel(0, 0, Rgba([0, 0, 0, 90]));
        tint(&mut img, Rgba([1, 2, 3, 255]));
        assert_eq!(img.get_pixel(0, 0).0, [1, 2, 3, 90]);
        assert_eq!(img.get_pixel(1, 0).0, [0, 0, 0, 0]);
    }
}
