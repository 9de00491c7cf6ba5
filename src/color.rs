//! Theme colour helpers.

use image::Rgba;
use palette::{Hsl, IntoColor, Srgb};

use crate::error::ConfigError;

/// Lightness distance between the background and the derived fill colour.
const FILL_LIGHTNESS_SHIFT: f32 = 0.12;

/// Parses a `#rrggbb` (or `#rgb`) colour into an opaque RGBA pixel.
pub fn parse_hex(value: &str) -> Result<Rgba<u8>, ConfigError> {
    let rgb: Srgb<u8> = value
        .trim()
        .parse()
        .map_err(|_| ConfigError::Color(value.to_string()))?;
    Ok(Rgba([rgb.red, rgb.green, rgb.blue, 255]))
}

/// Formats an RGBA pixel as `#rrggbb`, dropping alpha.
pub fn to_hex(color: Rgba<u8>) -> String {
    format!("#{:02x}{:02x}{:02x}", color[0], color[1], color[2])
}

/// Derives the silhouette fill colour from the canvas background.
///
/// Dark backgrounds get a slightly lighter fill, light backgrounds a
/// slightly darker one, so the filled shape stays visible without
/// competing with the line art.
pub fn fill_from_background(background: Rgba<u8>) -> Rgba<u8> {
    let [r, g, b, a] = background.0;
    let rgb = Srgb::new(r as f32 / 255.0, g as f32 / 255.0, b as f32 / 255.0);
    let mut hsl: Hsl = rgb.into_color();
    if hsl.lightness < 0.5 {
        hsl.lightness = (hsl.lightness + FILL_LIGHTNESS_SHIFT).min(1.0);
    } else {
        hsl.lightness = (hsl.lightness - FILL_LIGHTNESS_SHIFT).max(0.0);
    }
    let shifted: Srgb = hsl.into_color();
    Rgba([
        (shifted.red * 255.0).round().clamp(0.0, 255.0) as u8,
        (shifted.green * 255.0).round().clamp(0.0, 255.0) as u8,
        (shifted.blue * 255.0).round().clamp(0.0, 255.0) as u8,
        a,
    ])
}
