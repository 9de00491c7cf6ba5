//! Binary masks and the two stages that produce them.
//!
//! A [`Mask`] is the one representation shared by the silhouette
//! extractor, the region filler and the mask cache: a row-major byte grid
//! whose pixels are either [`Mask::ON`] or [`Mask::OFF`]. Conversions to
//! and from `image` types only happen at the edges of this module.
//!
//! ```text
//! RGBA line art ──► SilhouetteExtractor ──► ink Mask ──► RegionFiller ──► fill Mask
//! ```

pub mod binarize;
pub mod fill;

pub use binarize::{
    BinarizationStrategy, NaiveBinarizer, SeparableBinarizer, SilhouetteExtractor, detect_strategy,
};
pub use fill::RegionFiller;

use image::{GrayImage, Luma};

use crate::error::MaskError;
use crate::pool::PixelBuffer;

// ============================================================================
// Mask
// ============================================================================

/// A binary 2-D grid.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Mask {
    width: u32,
    height: u32,
    data: Vec<u8>,
}

impl Mask {
    /// Value of a set pixel.
    pub const ON: u8 = 255;
    /// Value of a cleared pixel.
    pub const OFF: u8 = 0;

    /// Creates an all-off mask.
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            data: vec![Self::OFF; width as usize * height as usize],
        }
    }

    /// Creates a square mask from raw bytes.
    ///
    /// Returns `None` unless `data.len() == side * side`.
    pub fn from_raw(side: u32, data: Vec<u8>) -> Option<Self> {
        (data.len() == side as usize * side as usize).then_some(Self {
            width: side,
            height: side,
            data,
        })
    }

    /// Reinterprets a pooled buffer as a mask without copying.
    ///
    /// The buffer contents are kept as-is; callers that need a clean mask
    /// get one because the pool zeroes buffers on checkout.
    pub fn from_buffer(buf: PixelBuffer) -> Self {
        let (width, height) = buf.shape();
        Self {
            width,
            height,
            data: buf.into_vec(),
        }
    }

    /// Gives the storage back so it can be returned to the pool.
    pub fn into_buffer(self) -> PixelBuffer {
        PixelBuffer::from_parts(self.width, self.height, self.data)
    }

    /// Builds a mask from a grayscale image, treating values above 127 as set.
    pub fn from_gray(img: &GrayImage) -> Self {
        let data = img
            .as_raw()
            .iter()
            .map(|&v| if v > 127 { Self::ON } else { Self::OFF })
            .collect();
        Self {
            width: img.width(),
            height: img.height(),
            data,
        }
    }

    /// Converts to a grayscale image (set pixels are white).
    pub fn to_gray(&self) -> GrayImage {
        GrayImage::from_fn(self.width, self.height, |x, y| Luma([self.get(x, y)]))
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    /// Returns true for a square grid of non-zero size.
    pub fn is_valid_square(&self) -> bool {
        self.width > 0 && self.width == self.height
    }

    /// Fails with [`MaskError::InvalidMask`] unless the mask is a non-empty square.
    pub fn ensure_square(&self) -> Result<u32, MaskError> {
        if self.is_valid_square() {
            Ok(self.width)
        } else {
            Err(MaskError::InvalidMask {
                width: self.width,
                height: self.height,
            })
        }
    }

    #[inline]
    pub fn index(&self, x: u32, y: u32) -> usize {
        y as usize * self.width as usize + x as usize
    }

    #[inline]
    pub fn get(&self, x: u32, y: u32) -> u8 {
        self.data[self.index(x, y)]
    }

    #[inline]
    pub fn is_on(&self, x: u32, y: u32) -> bool {
        self.get(x, y) == Self::ON
    }

    #[inline]
    pub fn set(&mut self, x: u32, y: u32, on: bool) {
        let idx = self.index(x, y);
        self.data[idx] = if on { Self::ON } else { Self::OFF };
    }

    /// Number of set pixels.
    pub fn count_on(&self) -> usize {
        self.data.iter().filter(|&&v| v == Self::ON).count()
    }

    /// Returns true if no pixel is set.
    pub fn is_empty(&self) -> bool {
        self.data.iter().all(|&v| v != Self::ON)
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }
}
