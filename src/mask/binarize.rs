//! Silhouette extraction: line-art raster to binary ink mask.
//!
//! The ink test is the same for every strategy:
//!
//! 1. take the alpha plane of the tinted raster (the tint is uniform, so
//!    alpha alone carries the shape),
//! 2. smooth it with a 5-tap Gaussian (σ = 0.8), edges clamped,
//! 3. mark every pixel brighter than [`INK_THRESHOLD`],
//! 4. close the result with a 3×3 square (dilate, then erode; neighbours
//!    outside the image are ignored) so one-pixel breaks in the line art
//!    cannot let the later flood fill leak into the interior.
//!
//! How those steps are executed is a [`BinarizationStrategy`], chosen once
//! by [`detect_strategy`] and injected into the [`SilhouetteExtractor`].

use std::sync::Arc;

use image::RgbaImage;
use rayon::prelude::*;

use super::Mask;
use crate::error::MaskError;
use crate::pool::PixelBuffer;

/// Smoothed intensity a pixel must exceed to count as ink.
pub const INK_THRESHOLD: f32 = 20.0;

const BLUR_SIGMA: f32 = 0.8;
const BLUR_RADIUS: usize = 2;

/// Normalised 1-D Gaussian taps.
fn gaussian_kernel() -> [f32; 2 * BLUR_RADIUS + 1] {
    let mut taps = [0.0f32; 2 * BLUR_RADIUS + 1];
    let denom = 2.0 * BLUR_SIGMA * BLUR_SIGMA;
    for (i, tap) in taps.iter_mut().enumerate() {
        let d = i as f32 - BLUR_RADIUS as f32;
        *tap = (-(d * d) / denom).exp();
    }
    let sum: f32 = taps.iter().sum();
    for tap in &mut taps {
        *tap /= sum;
    }
    taps
}

#[inline]
fn clamp_offset(pos: usize, tap: usize, len: usize) -> usize {
    (pos + tap).saturating_sub(BLUR_RADIUS).min(len - 1)
}

#[inline]
fn ink_value(smoothed: f32) -> u8 {
    if smoothed > INK_THRESHOLD { Mask::ON } else { Mask::OFF }
}

// ============================================================================
// BinarizationStrategy
// ============================================================================

/// An implementation of the ink test.
///
/// `binarize` receives the intensity plane in `plane` and overwrites it in
/// place with [`Mask::ON`]/[`Mask::OFF`] values.
pub trait BinarizationStrategy: Send + Sync {
    /// Short name for logs.
    fn name(&self) -> &'static str;

    /// Whether this is the accelerated implementation. Drives batch sizing.
    fn is_accelerated(&self) -> bool;

    fn binarize(&self, plane: &mut [u8], width: u32, height: u32);
}

/// Picks the best strategy for the current machine.
pub fn detect_strategy() -> Arc<dyn BinarizationStrategy> {
    let parallel = std::thread::available_parallelism()
        .map(|n| n.get() > 1)
        .unwrap_or(false);

    let strategy: Arc<dyn BinarizationStrategy> = if parallel {
        Arc::new(SeparableBinarizer)
    } else {
        Arc::new(NaiveBinarizer)
    };
    log::info!("binarization: using the {} strategy", strategy.name());
    strategy
}

// ============================================================================
// SeparableBinarizer
// ============================================================================

/// Separable blur and separable min/max closing, rows processed in parallel.
#[derive(Debug, Clone, Copy, Default)]
pub struct SeparableBinarizer;

impl BinarizationStrategy for SeparableBinarizer {
    fn name(&self) -> &'static str {
        "separable"
    }

    fn is_accelerated(&self) -> bool {
        true
    }

    fn binarize(&self, plane: &mut [u8], width: u32, height: u32) {
        let w = width as usize;
        let h = height as usize;
        let taps = gaussian_kernel();

        let mut horizontal = vec![0.0f32; w * h];
        horizontal
            .par_chunks_mut(w)
            .zip(plane.par_chunks(w))
            .for_each(|(out, row)| {
                for (x, value) in out.iter_mut().enumerate() {
                    *value = taps
                        .iter()
                        .enumerate()
                        .map(|(i, k)| k * row[clamp_offset(x, i, w)] as f32)
                        .sum();
                }
            });

        plane.par_chunks_mut(w).enumerate().for_each(|(y, out)| {
            for (x, value) in out.iter_mut().enumerate() {
                let smoothed: f32 = taps
                    .iter()
                    .enumerate()
                    .map(|(j, k)| k * horizontal[clamp_offset(y, j, h) * w + x])
                    .sum();
                *value = ink_value(smoothed);
            }
        });

        let mut scratch = vec![0u8; w * h];
        morph_separable(plane, &mut scratch, w, h, |a, b| a.max(b));
        morph_separable(plane, &mut scratch, w, h, |a, b| a.min(b));
    }
}

/// One 3×3 morphology pass, split into a row pass and a column pass.
fn morph_separable<F>(plane: &mut [u8], scratch: &mut [u8], w: usize, h: usize, op: F)
where
    F: Fn(u8, u8) -> u8 + Sync,
{
    scratch
        .par_chunks_mut(w)
        .zip(plane.par_chunks(w))
        .for_each(|(out, row)| {
            for (x, value) in out.iter_mut().enumerate() {
                let lo = x.saturating_sub(1);
                let hi = (x + 1).min(w - 1);
                *value = row[lo..=hi].iter().fold(row[x], |acc, &v| op(acc, v));
            }
        });

    let scratch = &*scratch;
    plane.par_chunks_mut(w).enumerate().for_each(|(y, out)| {
        let lo = y.saturating_sub(1);
        let hi = (y + 1).min(h - 1);
        for (x, value) in out.iter_mut().enumerate() {
            *value = (lo..=hi).fold(scratch[y * w + x], |acc, yy| op(acc, scratch[yy * w + x]));
        }
    });
}

// ============================================================================
// NaiveBinarizer
// ============================================================================

/// Direct per-pixel loops. Used where parallelism is unavailable.
#[derive(Debug, Clone, Copy, Default)]
pub struct NaiveBinarizer;

impl BinarizationStrategy for NaiveBinarizer {
    fn name(&self) -> &'static str {
        "naive"
    }

    fn is_accelerated(&self) -> bool {
        false
    }

    fn binarize(&self, plane: &mut [u8], width: u32, height: u32) {
        let w = width as usize;
        let h = height as usize;
        let taps = gaussian_kernel();
        let source = plane.to_vec();

        for y in 0..h {
            for x in 0..w {
                let mut smoothed = 0.0f32;
                for (j, ky) in taps.iter().enumerate() {
                    let sy = clamp_offset(y, j, h);
                    for (i, kx) in taps.iter().enumerate() {
                        let sx = clamp_offset(x, i, w);
                        smoothed += ky * kx * source[sy * w + sx] as f32;
                    }
                }
                plane[y * w + x] = ink_value(smoothed);
            }
        }

        let dilated = morph_naive(plane, w, h, |a, b| a.max(b));
        let closed = morph_naive(&dilated, w, h, |a, b| a.min(b));
        plane.copy_from_slice(&closed);
    }
}

fn morph_naive(src: &[u8], w: usize, h: usize, op: impl Fn(u8, u8) -> u8) -> Vec<u8> {
    let mut out = vec![0u8; w * h];
    for y in 0..h {
        for x in 0..w {
            let mut value = src[y * w + x];
            for ny in y.saturating_sub(1)..=(y + 1).min(h - 1) {
                for nx in x.saturating_sub(1)..=(x + 1).min(w - 1) {
                    value = op(value, src[ny * w + nx]);
                }
            }
            out[y * w + x] = value;
        }
    }
    out
}

// ============================================================================
// SilhouetteExtractor
// ============================================================================

/// Turns a rendered line-art raster into an ink [`Mask`].
#[derive(Clone)]
pub struct SilhouetteExtractor {
    strategy: Arc<dyn BinarizationStrategy>,
}

impl SilhouetteExtractor {
    pub fn new(strategy: Arc<dyn BinarizationStrategy>) -> Self {
        Self { strategy }
    }

    pub fn strategy(&self) -> &dyn BinarizationStrategy {
        self.strategy.as_ref()
    }

    /// Extracts the ink mask of `raster`, storing it in `buf`.
    ///
    /// `buf` should come from the pool with the raster's shape; a buffer
    /// of any other shape is discarded and replaced.
    pub fn extract(&self, raster: &RgbaImage, buf: PixelBuffer) -> Result<Mask, MaskError> {
        let (width, height) = raster.dimensions();
        if width == 0 || height == 0 {
            return Err(MaskError::InvalidMask { width, height });
        }

        let mut buf = if buf.shape() == (width, height) {
            buf
        } else {
            PixelBuffer::zeroed(width, height)
        };

        for (dst, pixel) in buf.as_mut_slice().iter_mut().zip(raster.pixels()) {
            *dst = pixel[3];
        }
        self.strategy.binarize(buf.as_mut_slice(), width, height);

        Ok(Mask::from_buffer(buf))
    }
}

impl std::fmt::Debug for SilhouetteExtractor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SilhouetteExtractor")
            .field("strategy", &self.strategy.name())
            .finish()
    }
}
